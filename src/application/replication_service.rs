//! Replication Service - Lifecycle of the control-plane objects
//!
//! Create, start, stop, status and drop for the replication role,
//! publication and subscription. Every operation re-derives the current
//! state from catalog queries and reconciles it against the desired
//! state, so any operation is safe to re-run after a partial prior run.

use crate::application::check_service::{CheckService, Probe};
use crate::config::{ConnectionSettings, REPLICATION_APPLICATION_NAME, REPLICATION_ROLE};
use crate::domain::entities::{Capabilities, Severity, StatusReport, SubscriptionInfo};
use crate::domain::ports::{Database, DatabaseError, SecretStore, SecretStoreError};
use crate::domain::services::replication_health::{
    copy_progress_percent, lag_is_stale, observed_lag, MAX_REPLY_LAG_SECS,
};
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// A readiness condition is not met; fatal to a gated create.
    #[error("pre-flight check `{name}` failed: {reason}")]
    CheckFailed { name: &'static str, reason: String },

    /// On-cluster state exists but violates an adoption invariant. The
    /// operation aborts without mutating further state.
    #[error("{0}")]
    Conflict(String),

    #[error("no subscription named `{0}` found")]
    MissingSubscription(String),

    #[error("subscription `{0}` is already started")]
    AlreadyStarted(String),

    #[error("subscription `{0}` is already stopped")]
    AlreadyStopped(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Secrets(#[from] SecretStoreError),
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub skip_checks: bool,
    pub drop_existing_role: bool,
    pub publication_name: String,
    pub subscription_name: String,
    /// Explicit password; when absent the secret store supplies one.
    pub replication_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub subscription_name: String,
    pub fail_on_already_started: bool,
    pub skip_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct StopOptions {
    pub subscription_name: String,
    pub fail_on_already_stopped: bool,
}

#[derive(Debug, Clone)]
pub struct DropOptions {
    pub publication_name: String,
    pub subscription_name: String,
}

/// Replication lifecycle manager.
///
/// Holds the connection pair plus the collaborators create needs: the
/// check engine as its precondition gate and the secret store for the
/// generated replication password.
pub struct ReplicationService {
    source: Arc<dyn Database>,
    target: Arc<dyn Database>,
    checks: CheckService,
    secrets: Arc<dyn SecretStore>,
    source_settings: ConnectionSettings,
}

impl ReplicationService {
    pub fn new(
        source: Arc<dyn Database>,
        target: Arc<dyn Database>,
        checks: CheckService,
        secrets: Arc<dyn SecretStore>,
        source_settings: ConnectionSettings,
    ) -> Self {
        Self {
            source,
            target,
            checks,
            secrets,
            source_settings,
        }
    }

    /// Create logical replication between the source and target database.
    ///
    /// Role, publication and subscription are reconciled in that order:
    /// the subscription embeds the role's credentials and binds to the
    /// publication, so each step's success is a precondition for the
    /// next. If everything already exists in an acceptable state, nothing
    /// is changed.
    pub async fn create(&self, options: &CreateOptions) -> Result<(), ReplicationError> {
        if options.skip_checks {
            tracing::warn!("pre-flight checks skipped");
        } else {
            // Fail fast here, unlike the check command: proceeding with a
            // known defect risks silent data loss.
            for probe in Probe::ALL {
                let result = self.checks.run_probe(probe).await?;
                match result.error {
                    Some(reason) => {
                        return Err(ReplicationError::CheckFailed {
                            name: result.name,
                            reason,
                        })
                    }
                    None => tracing::debug!("{}: ok", result.name),
                }
            }
            tracing::debug!("pre-flight checks successful");
        }

        let password = match &options.replication_password {
            Some(password) => password.clone(),
            None => self
                .secrets
                .replication_password(&self.source_settings.host)?,
        };

        if options.drop_existing_role && self.source.role(REPLICATION_ROLE).await?.is_some() {
            self.source.revoke_role_grants(REPLICATION_ROLE).await?;
            self.source.drop_role(REPLICATION_ROLE).await?;
            tracing::info!("dropped existing replication role `{REPLICATION_ROLE}`");
        }

        self.reconcile_role(&password).await?;
        self.source.grant_read_access(REPLICATION_ROLE).await?;
        self.reconcile_publication(&options.publication_name).await?;
        self.reconcile_subscription(options, &password).await?;

        Ok(())
    }

    async fn reconcile_role(&self, password: &str) -> Result<(), ReplicationError> {
        match self.source.role(REPLICATION_ROLE).await? {
            None => {
                self.source
                    .create_replication_role(REPLICATION_ROLE, password)
                    .await?;
                tracing::info!("created replication role `{REPLICATION_ROLE}`");
            }
            Some(role) => {
                tracing::debug!("existing role found");
                if !role.can_replicate {
                    return Err(ReplicationError::Conflict(format!(
                        "existing role `{}` cannot use replication",
                        role.name
                    )));
                }
            }
        }
        Ok(())
    }

    async fn reconcile_publication(&self, name: &str) -> Result<(), ReplicationError> {
        match self.source.publication(name).await? {
            None => {
                self.source.create_publication_for_all_tables(name).await?;
                tracing::info!("created publication `{name}`");
            }
            Some(publication) => {
                tracing::debug!("active publication found");
                // Never narrow an existing publication's scope; refuse it
                // instead.
                if let Some(flag) = publication.disabled_flag() {
                    return Err(ReplicationError::Conflict(format!(
                        "expected setting `{flag}` of active publication `{name}` to be true, \
                         but it is false"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn reconcile_subscription(
        &self,
        options: &CreateOptions,
        password: &str,
    ) -> Result<(), ReplicationError> {
        let desired_conninfo = self
            .source_settings
            .replication_conninfo(password)
            .to_conninfo();

        match self.target.subscription(&options.subscription_name).await? {
            None => {
                self.target
                    .create_subscription(
                        &options.subscription_name,
                        &desired_conninfo,
                        &options.publication_name,
                    )
                    .await?;
                tracing::info!("subscription `{}` created", options.subscription_name);
            }
            Some(subscription) => {
                // Altering preserves the subscription's identity and its
                // replication slot; only the fields that differ change.
                if subscription.connection_info != desired_conninfo {
                    self.target
                        .set_subscription_connection(&options.subscription_name, &desired_conninfo)
                        .await?;
                    tracing::info!("updated connection info of existing subscription");
                }
                if !subscription
                    .publications
                    .iter()
                    .any(|publication| publication == &options.publication_name)
                {
                    self.target
                        .set_subscription_publication(
                            &options.subscription_name,
                            &options.publication_name,
                        )
                        .await?;
                    tracing::info!("updated publication of existing subscription");
                }
                if !subscription.enabled {
                    tracing::warn!("active subscription is not enabled");
                }
            }
        }
        Ok(())
    }

    /// Start logical replication if it is not already started.
    pub async fn start(&self, options: &StartOptions) -> Result<(), ReplicationError> {
        let subscription = self.existing_subscription(&options.subscription_name).await?;

        if subscription.enabled {
            tracing::info!("subscription is already started");
            if options.fail_on_already_started {
                return Err(ReplicationError::AlreadyStarted(
                    options.subscription_name.clone(),
                ));
            }
            return Ok(());
        }

        self.target
            .enable_subscription(&options.subscription_name)
            .await?;
        if !options.skip_refresh {
            // Pick up tables added to the publication while stopped.
            self.target
                .refresh_subscription_publication(&options.subscription_name)
                .await?;
        }
        tracing::info!("subscription started");
        Ok(())
    }

    /// Stop logical replication if it is not already stopped.
    pub async fn stop(&self, options: &StopOptions) -> Result<(), ReplicationError> {
        let subscription = self.existing_subscription(&options.subscription_name).await?;

        if !subscription.enabled {
            tracing::info!("subscription is already stopped");
            if options.fail_on_already_stopped {
                return Err(ReplicationError::AlreadyStopped(
                    options.subscription_name.clone(),
                ));
            }
            return Ok(());
        }

        self.target
            .disable_subscription(&options.subscription_name)
            .await?;
        tracing::info!("subscription stopped");
        Ok(())
    }

    async fn existing_subscription(
        &self,
        name: &str,
    ) -> Result<SubscriptionInfo, ReplicationError> {
        self.target
            .subscription(name)
            .await?
            .ok_or_else(|| ReplicationError::MissingSubscription(name.to_string()))
    }

    /// Inspect the current health of replication.
    ///
    /// `Err` is reserved for engine faults; an unhealthy stream comes
    /// back as a report whose `healthy()` is false.
    pub async fn status(&self, subscription_name: &str) -> Result<StatusReport, ReplicationError> {
        let mut report = StatusReport::default();

        let capabilities =
            Capabilities::from_version_num(self.source.server_version_num().await?);
        let stats = self
            .source
            .replication_stats(REPLICATION_APPLICATION_NAME, capabilities.replay_lag)
            .await?;

        let Some(stats) = stats else {
            report.push(Severity::Error, "no active replication found");
            return Ok(report);
        };
        report.push(
            Severity::Info,
            format!("replication is {}", stats.state),
        );

        match observed_lag(&stats, capabilities, Utc::now()) {
            Some(lag) if lag_is_stale(lag) => report.push(
                Severity::Error,
                format!(
                    "last reply from standby received more than {} minutes ago ({} seconds)",
                    MAX_REPLY_LAG_SECS / 60,
                    lag.num_seconds()
                ),
            ),
            Some(lag) => report.push(
                Severity::Info,
                format!("replication lag is {} seconds", lag.num_seconds()),
            ),
            None => report.push(Severity::Warning, "standby reported no lag signal"),
        }

        let current_lsn = self.source.current_wal_lsn().await?;
        match stats.flush_lsn {
            Some(flush_lsn) if flush_lsn == current_lsn => {
                report.push(Severity::Info, "WAL positions match");
            }
            Some(flush_lsn) => report.push(
                Severity::Info,
                format!(
                    "source is at {current_lsn}, standby flushed {flush_lsn} \
                     ({} bytes behind)",
                    current_lsn.distance(flush_lsn)
                ),
            ),
            None => report.push(Severity::Warning, "standby reported no flush position"),
        }

        self.inspect_slot(subscription_name, &mut report).await?;
        self.inspect_subscribed_tables(subscription_name, &mut report)
            .await?;

        Ok(report)
    }

    async fn inspect_slot(
        &self,
        subscription_name: &str,
        report: &mut StatusReport,
    ) -> Result<(), ReplicationError> {
        let slot = self.source.replication_slot(subscription_name).await?;
        let condition = match &slot {
            Some(slot) if slot.active => {
                report.push(
                    Severity::Info,
                    format!("replication slot `{}` is active", slot.name),
                );
                return Ok(());
            }
            Some(_) => "inactive",
            None => "missing",
        };

        // During the initial copy the main slot can sit idle while the
        // engine streams through a transient per-table sync slot.
        match self.source.active_tablesync_slot(subscription_name).await? {
            Some(sync_slot) => report.push(
                Severity::Warning,
                format!(
                    "replication slot `{subscription_name}` is {condition}, but table \
                     synchronization slot `{}` is active",
                    sync_slot.name
                ),
            ),
            None => report.push(
                Severity::Error,
                format!("replication slot `{subscription_name}` is {condition}"),
            ),
        }
        Ok(())
    }

    async fn inspect_subscribed_tables(
        &self,
        subscription_name: &str,
        report: &mut StatusReport,
    ) -> Result<(), ReplicationError> {
        use crate::domain::entities::RelationSyncState;

        for table in self.target.subscribed_tables(subscription_name).await? {
            match table.state {
                RelationSyncState::Ready => {
                    tracing::debug!("table {} is ready", table.qualified_name());
                }
                RelationSyncState::DataCopy => {
                    let source_size = self
                        .source
                        .relation_size(&table.schema, &table.name)
                        .await?;
                    let target_size = self
                        .target
                        .relation_size(&table.schema, &table.name)
                        .await?;
                    report.push(
                        Severity::Error,
                        format!(
                            "table {} is {} ({:.1}% copied)",
                            table.qualified_name(),
                            table.state.label(),
                            copy_progress_percent(source_size, target_size)
                        ),
                    );
                }
                state => report.push(
                    Severity::Error,
                    format!("table {} is {}", table.qualified_name(), state.label()),
                ),
            }
        }
        Ok(())
    }

    /// Drop logical replication between the source and target database.
    ///
    /// Subscription, publication, then role, to respect the dependency
    /// direction. Each removal is independently idempotent; if no object
    /// was present to begin with, nothing is done.
    pub async fn drop(&self, options: &DropOptions) -> Result<(), ReplicationError> {
        let subscription = self.target.subscription(&options.subscription_name).await?;
        let publication = self.source.publication(&options.publication_name).await?;
        let role = self.source.role(REPLICATION_ROLE).await?;

        if subscription.is_none() && publication.is_none() && role.is_none() {
            tracing::info!("replication already disabled");
            return Ok(());
        }

        if subscription.is_some() {
            self.target
                .drop_subscription(&options.subscription_name)
                .await?;
            tracing::info!("dropped subscription on target database");
        }

        if publication.is_some() {
            self.source
                .drop_publication(&options.publication_name)
                .await?;
            tracing::info!("dropped publication on source database");
        }

        if role.is_some() {
            self.source.revoke_role_grants(REPLICATION_ROLE).await?;
            self.source.drop_role(REPLICATION_ROLE).await?;
            tracing::info!("dropped replication role `{REPLICATION_ROLE}` on source database");
        }

        Ok(())
    }
}
