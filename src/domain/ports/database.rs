//! Database Port
//!
//! Defines the interface to one PostgreSQL connection. The production
//! implementation speaks tokio-postgres; tests use an in-memory fake.
//!
//! Every method is one catalog query or one control-plane statement, with
//! the row decoded into an explicit struct before it crosses this
//! boundary. Identifier quoting and value parameterization are the
//! adapter's responsibility; callers pass plain names.

use crate::domain::entities::{
    DatabaseOptions, HbaRule, PublicationInfo, ReplicationStats, RoleInfo, SlotInfo,
    SubscribedTable, SubscriptionInfo,
};
use crate::domain::value_objects::Lsn;
use async_trait::async_trait;
use std::net::IpAddr;

/// A statement the engine rejected, tagged with the statement's intent.
///
/// Engine faults are always fatal and never retried; operations are
/// designed to be re-invoked by the operator instead.
#[derive(Debug, thiserror::Error)]
#[error("{intent}: {message}")]
pub struct DatabaseError {
    /// What the failing statement was trying to do
    pub intent: &'static str,
    /// Driver-reported detail
    pub message: String,
}

impl DatabaseError {
    pub fn new(intent: &'static str, message: impl Into<String>) -> Self {
        Self {
            intent,
            message: message.into(),
        }
    }
}

/// One live connection to a source or target cluster.
#[async_trait]
pub trait Database: Send + Sync {
    // --- server-wide facts ---

    /// The `wal_level` setting.
    async fn wal_level(&self) -> Result<String, DatabaseError>;

    /// `server_version_num`, for per-connection capability resolution.
    async fn server_version_num(&self) -> Result<i64, DatabaseError>;

    /// The server's apparent address on this connection (loopback when the
    /// connection does not travel over IP).
    async fn server_address(&self) -> Result<IpAddr, DatabaseError>;

    /// Host-based access rules whose database scope covers `replication`.
    async fn replication_hba_rules(&self) -> Result<Vec<HbaRule>, DatabaseError>;

    /// Fully qualified ordinary tables in non-system schemas lacking a
    /// unique, valid, ready, live primary-key index, in catalog scan
    /// order.
    async fn tables_without_replica_identity(&self) -> Result<Vec<String>, DatabaseError>;

    /// Database-level settings for the connected database.
    async fn database_options(&self) -> Result<DatabaseOptions, DatabaseError>;

    // --- replication role ---

    async fn role(&self, name: &str) -> Result<Option<RoleInfo>, DatabaseError>;

    /// Create the role with replication capability and annotate it, both
    /// inside a single transaction.
    async fn create_replication_role(&self, name: &str, password: &str)
        -> Result<(), DatabaseError>;

    /// Grant schema usage and table read access on every non-system
    /// schema. Safe to re-run.
    async fn grant_read_access(&self, role: &str) -> Result<(), DatabaseError>;

    /// Revoke everything the role was granted or owns.
    async fn revoke_role_grants(&self, name: &str) -> Result<(), DatabaseError>;

    async fn drop_role(&self, name: &str) -> Result<(), DatabaseError>;

    // --- publication ---

    async fn publication(&self, name: &str) -> Result<Option<PublicationInfo>, DatabaseError>;

    /// Create an all-tables publication and annotate it.
    async fn create_publication_for_all_tables(&self, name: &str) -> Result<(), DatabaseError>;

    async fn drop_publication(&self, name: &str) -> Result<(), DatabaseError>;

    // --- subscription ---

    async fn subscription(&self, name: &str) -> Result<Option<SubscriptionInfo>, DatabaseError>;

    /// Create a subscription bound to the given connection string and
    /// publication, and annotate it.
    async fn create_subscription(
        &self,
        name: &str,
        conninfo: &str,
        publication: &str,
    ) -> Result<(), DatabaseError>;

    /// Point an existing subscription at a new connection string.
    async fn set_subscription_connection(
        &self,
        name: &str,
        conninfo: &str,
    ) -> Result<(), DatabaseError>;

    /// Replace an existing subscription's publication set.
    async fn set_subscription_publication(
        &self,
        name: &str,
        publication: &str,
    ) -> Result<(), DatabaseError>;

    async fn enable_subscription(&self, name: &str) -> Result<(), DatabaseError>;

    async fn disable_subscription(&self, name: &str) -> Result<(), DatabaseError>;

    /// `ALTER SUBSCRIPTION ... REFRESH PUBLICATION`, picking up newly
    /// added tables.
    async fn refresh_subscription_publication(&self, name: &str) -> Result<(), DatabaseError>;

    async fn drop_subscription(&self, name: &str) -> Result<(), DatabaseError>;

    /// Tables under a subscription with their per-relation sync state.
    async fn subscribed_tables(
        &self,
        subscription: &str,
    ) -> Result<Vec<SubscribedTable>, DatabaseError>;

    /// Total relation size in bytes.
    async fn relation_size(&self, schema: &str, table: &str) -> Result<i64, DatabaseError>;

    // --- replication progress (source side) ---

    /// Streaming/catch-up statistics for the given application name.
    async fn replication_stats(
        &self,
        application_name: &str,
        with_replay_lag: bool,
    ) -> Result<Option<ReplicationStats>, DatabaseError>;

    async fn current_wal_lsn(&self) -> Result<Lsn, DatabaseError>;

    async fn replication_slot(&self, name: &str) -> Result<Option<SlotInfo>, DatabaseError>;

    /// An active transient tablesync slot belonging to the subscription,
    /// if one exists. Name-pattern heuristic, isolated here so it can be
    /// updated independently of the status logic.
    async fn active_tablesync_slot(
        &self,
        subscription: &str,
    ) -> Result<Option<SlotInfo>, DatabaseError>;

    // --- sequences ---

    /// Names of all sequence relations.
    async fn sequence_names(&self) -> Result<Vec<String>, DatabaseError>;

    /// Advance and return the sequence's next value. Consumptive; there is
    /// no way to peek without consuming.
    async fn next_sequence_value(&self, sequence: &str) -> Result<i64, DatabaseError>;

    /// Set a sequence's value. With `is_called` false the value itself is
    /// returned by the next `nextval` call.
    async fn set_sequence_value(
        &self,
        sequence: &str,
        value: i64,
        is_called: bool,
    ) -> Result<(), DatabaseError>;
}
