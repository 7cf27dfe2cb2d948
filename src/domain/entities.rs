//! Domain Entities - Catalog snapshots and reports
//!
//! Each struct mirrors one catalog query and is decoded immediately after
//! the fetch. None of these are persisted; every operation re-derives them
//! from the live clusters.

use crate::domain::value_objects::Lsn;
use chrono::{DateTime, Utc};

/// Outcome of a single readiness probe.
///
/// `error` is `None` when the probe passed. A probe that could not even
/// query the catalog does not produce a `CheckResult` at all - that is an
/// engine fault and surfaces as an `Err` on the check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Short identifier of the probe (stable, used in log output)
    pub name: &'static str,
    /// Human-readable description of what the probe verifies
    pub description: &'static str,
    /// Failure detail, or `None` on a pass
    pub error: Option<String>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Replication role as found in `pg_roles` on the source cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    /// `rolreplication` - an adopted role must have this set
    pub can_replicate: bool,
}

/// Publication as found in `pg_publication` on the source cluster.
///
/// An adopted publication must cover all tables and have every DML flag
/// enabled; pgferry never narrows an existing publication's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationInfo {
    pub name: String,
    pub all_tables: bool,
    pub inserts: bool,
    pub updates: bool,
    pub deletes: bool,
    pub truncates: bool,
}

impl PublicationInfo {
    /// First scope flag that is disabled, if any.
    pub fn disabled_flag(&self) -> Option<&'static str> {
        if !self.all_tables {
            Some("puballtables")
        } else if !self.inserts {
            Some("pubinsert")
        } else if !self.updates {
            Some("pubupdate")
        } else if !self.deletes {
            Some("pubdelete")
        } else if !self.truncates {
            Some("pubtruncate")
        } else {
            None
        }
    }
}

/// Subscription as found in `pg_subscription` on the target cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub name: String,
    pub enabled: bool,
    /// Stored libpq connection string (`subconninfo`)
    pub connection_info: String,
    /// Publication names the subscription consumes (`subpublications`)
    pub publications: Vec<String>,
}

/// Replication slot snapshot from `pg_replication_slots` (inspected, never
/// owned - the engine creates and drops slots with the subscription).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub name: String,
    pub active: bool,
}

/// One row of `pg_stat_replication`, filtered to pgferry's application name
/// and an active streaming/catch-up state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationStats {
    pub application_name: String,
    pub state: String,
    /// Last acknowledged standby reply, timezone-normalized by the driver
    pub reply_time: Option<DateTime<Utc>>,
    /// Server-reported replay lag in seconds; only populated on servers
    /// that expose the column (see `Capabilities`)
    pub replay_lag_secs: Option<f64>,
    /// Replicated flush position
    pub flush_lsn: Option<Lsn>,
}

/// Per-connection capability flags, resolved once from
/// `server_version_num` instead of re-probed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `pg_stat_replication.replay_lag` exists (PostgreSQL 10+)
    pub replay_lag: bool,
}

impl Capabilities {
    pub fn from_version_num(version_num: i64) -> Self {
        Self {
            replay_lag: version_num >= 100_000,
        }
    }
}

/// Synchronization state of one table under a subscription
/// (`pg_subscription_rel.srsubstate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationSyncState {
    Init,
    DataCopy,
    FinishedCopy,
    Synchronized,
    Ready,
}

impl RelationSyncState {
    /// Decode the single-character catalog code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'i' => Some(Self::Init),
            'd' => Some(Self::DataCopy),
            'f' => Some(Self::FinishedCopy),
            's' => Some(Self::Synchronized),
            'r' => Some(Self::Ready),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Init => "initializing",
            Self::DataCopy => "data being copied",
            Self::FinishedCopy => "finished copy",
            Self::Synchronized => "synchronized",
            Self::Ready => "ready",
        }
    }
}

/// One table under a subscription, with its sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribedTable {
    pub schema: String,
    pub name: String,
    pub state: RelationSyncState,
}

impl SubscribedTable {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Fixed set of database-level settings compared by the option-parity
/// probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    pub connection_limit: i32,
    pub encoding: String,
    pub owner: String,
    pub collation: String,
    pub ctype: String,
}

impl DatabaseOptions {
    /// First mismatching key between two option sets, with both values.
    pub fn first_mismatch(&self, other: &Self) -> Option<(&'static str, String, String)> {
        if self.connection_limit != other.connection_limit {
            return Some((
                "connection limit",
                self.connection_limit.to_string(),
                other.connection_limit.to_string(),
            ));
        }
        if self.encoding != other.encoding {
            return Some(("encoding", self.encoding.clone(), other.encoding.clone()));
        }
        if self.owner != other.owner {
            return Some(("owner", self.owner.clone(), other.owner.clone()));
        }
        if self.collation != other.collation {
            return Some((
                "collation",
                self.collation.clone(),
                other.collation.clone(),
            ));
        }
        if self.ctype != other.ctype {
            return Some(("ctype", self.ctype.clone(), other.ctype.clone()));
        }
        None
    }
}

/// One `pg_hba_file_rules` row scoped to the `replication` keyword.
///
/// `address` is the textual form reported by the catalog: an IP address
/// (with its mask in `netmask` or appended as `/n`), or a keyword such as
/// `all` or a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbaRule {
    pub address: String,
    pub netmask: Option<String>,
}

/// Severity of a single status finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One observation from the `replication status` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFinding {
    pub severity: Severity,
    pub message: String,
}

/// Full outcome of a status inspection. `healthy()` drives the exit code;
/// the findings carry the detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub findings: Vec<StatusFinding>,
}

impl StatusReport {
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.findings.push(StatusFinding {
            severity,
            message: message.into(),
        });
    }

    pub fn healthy(&self) -> bool {
        self.findings
            .iter()
            .all(|finding| finding.severity != Severity::Error)
    }
}
