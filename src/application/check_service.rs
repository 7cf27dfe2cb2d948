//! Check Service - Pre-flight readiness probes
//!
//! Runs a fixed, ordered battery of independent probes against both
//! databases. A failing probe never prevents the remaining probes from
//! running: operators need the full readiness picture in one pass.
//! Lifecycle-create iterates the probe list itself and short-circuits on
//! the first failure instead.

use crate::domain::entities::CheckResult;
use crate::domain::ports::{Database, DatabaseError, DiffRenderer, SchemaDumper};
use crate::domain::services::address_rules;
use std::sync::Arc;

/// One registered readiness probe.
///
/// The declaration order of `ALL` is the execution order; results are
/// independent and the order is purely cosmetic for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    WalLevel,
    ReplicationAdmission,
    ReplicaIdentity,
    SchemaParity,
    DatabaseOptions,
}

impl Probe {
    pub const ALL: [Probe; 5] = [
        Probe::WalLevel,
        Probe::ReplicationAdmission,
        Probe::ReplicaIdentity,
        Probe::SchemaParity,
        Probe::DatabaseOptions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Probe::WalLevel => "wal_level",
            Probe::ReplicationAdmission => "replication_admission",
            Probe::ReplicaIdentity => "replica_identity",
            Probe::SchemaParity => "schema_parity",
            Probe::DatabaseOptions => "database_options",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Probe::WalLevel => "The source has the correct WAL level set.",
            Probe::ReplicationAdmission => {
                "The source allows replication connections from the target."
            }
            Probe::ReplicaIdentity => "REPLICA IDENTITY is usable for all tables.",
            Probe::SchemaParity => "Source and target database schemas are in sync.",
            Probe::DatabaseOptions => "Database-level options match between source and target.",
        }
    }
}

/// Pre-flight check engine.
pub struct CheckService {
    source: Arc<dyn Database>,
    target: Arc<dyn Database>,
    source_schema: Arc<dyn SchemaDumper>,
    target_schema: Arc<dyn SchemaDumper>,
    diff_renderer: Arc<dyn DiffRenderer>,
}

impl CheckService {
    pub fn new(
        source: Arc<dyn Database>,
        target: Arc<dyn Database>,
        source_schema: Arc<dyn SchemaDumper>,
        target_schema: Arc<dyn SchemaDumper>,
        diff_renderer: Arc<dyn DiffRenderer>,
    ) -> Self {
        Self {
            source,
            target,
            source_schema,
            target_schema,
            diff_renderer,
        }
    }

    /// Run every registered probe in declaration order.
    ///
    /// `Err` means a probe could not query the catalog at all; that is an
    /// engine fault, not a failed check.
    pub async fn run_all(&self) -> Result<Vec<CheckResult>, DatabaseError> {
        let mut results = Vec::with_capacity(Probe::ALL.len());
        for probe in Probe::ALL {
            results.push(self.run_probe(probe).await?);
        }
        Ok(results)
    }

    /// Run a single probe.
    pub async fn run_probe(&self, probe: Probe) -> Result<CheckResult, DatabaseError> {
        let error = match probe {
            Probe::WalLevel => self.check_wal_level().await?,
            Probe::ReplicationAdmission => self.check_replication_admission().await?,
            Probe::ReplicaIdentity => self.check_replica_identity().await?,
            Probe::SchemaParity => self.check_schema_parity().await?,
            Probe::DatabaseOptions => self.check_database_options().await?,
        };
        Ok(CheckResult {
            name: probe.name(),
            description: probe.description(),
            error,
        })
    }

    async fn check_wal_level(&self) -> Result<Option<String>, DatabaseError> {
        let level = self.source.wal_level().await?;
        if level == "logical" {
            return Ok(None);
        }
        Ok(Some(format!(
            "source has `wal_level = {level}`, needs `wal_level = logical`"
        )))
    }

    async fn check_replication_admission(&self) -> Result<Option<String>, DatabaseError> {
        let target_address = self.target.server_address().await?;
        let rules = self.source.replication_hba_rules().await?;

        if address_rules::any_rule_admits(&rules, target_address) {
            return Ok(None);
        }
        Ok(Some(format!(
            "no pg_hba.conf entry allows replication connections from {target_address}"
        )))
    }

    async fn check_replica_identity(&self) -> Result<Option<String>, DatabaseError> {
        let tables = self.source.tables_without_replica_identity().await?;
        if tables.is_empty() {
            return Ok(None);
        }
        let plural = if tables.len() == 1 { "" } else { "s" };
        Ok(Some(format!(
            "missing primary key / REPLICA IDENTITY on table{plural} {}",
            tables.join(", ")
        )))
    }

    /// Schema-dump or diff-tool failures fail this probe only, never the
    /// whole check run.
    async fn check_schema_parity(&self) -> Result<Option<String>, DatabaseError> {
        let source_dump = match self.source_schema.dump().await {
            Ok(dump) => dump,
            Err(err) => return Ok(Some(err.to_string())),
        };
        let target_dump = match self.target_schema.dump().await {
            Ok(dump) => dump,
            Err(err) => return Ok(Some(err.to_string())),
        };

        if source_dump == target_dump {
            return Ok(None);
        }

        match self.diff_renderer.render(&source_dump, &target_dump).await {
            Ok(pointer) => Ok(Some(format!(
                "source and target schemas differ, diff written to {pointer}"
            ))),
            Err(err) => Ok(Some(format!(
                "source and target schemas differ ({err})"
            ))),
        }
    }

    async fn check_database_options(&self) -> Result<Option<String>, DatabaseError> {
        let source_options = self.source.database_options().await?;
        let target_options = self.target.database_options().await?;

        match source_options.first_mismatch(&target_options) {
            None => Ok(None),
            Some((key, source_value, target_value)) => Ok(Some(format!(
                "database {key} differs: source has {source_value}, target has {target_value}"
            ))),
        }
    }
}
