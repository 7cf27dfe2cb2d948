//! Shared test fixtures: an in-memory fake database plus fake schema and
//! secret collaborators, wired into the application services the same way
//! the composition root wires the real adapters.

#![allow(dead_code)]

use async_trait::async_trait;
use pgferry::application::{CheckService, ReplicationService};
use pgferry::config::ConnectionSettings;
use pgferry::domain::entities::{
    DatabaseOptions, HbaRule, PublicationInfo, ReplicationStats, RoleInfo, SlotInfo,
    SubscribedTable, SubscriptionInfo,
};
use pgferry::domain::ports::{
    Database, DatabaseError, DiffRenderError, DiffRenderer, SchemaDumpError, SchemaDumper,
    SecretStore, SecretStoreError,
};
use pgferry::domain::value_objects::Lsn;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Catalog state of one fake cluster.
#[derive(Debug, Clone)]
pub struct FakeState {
    pub wal_level: String,
    pub version_num: i64,
    pub server_address: IpAddr,
    pub hba_rules: Vec<HbaRule>,
    pub tables_missing_identity: Vec<String>,
    pub options: DatabaseOptions,
    pub role: Option<RoleInfo>,
    pub publication: Option<PublicationInfo>,
    pub subscription: Option<SubscriptionInfo>,
    pub slots: Vec<SlotInfo>,
    pub stats: Option<ReplicationStats>,
    pub current_lsn: Lsn,
    pub subscribed_tables: Vec<SubscribedTable>,
    pub relation_sizes: HashMap<String, i64>,
    /// name -> (last value, is_called), mirroring the engine's sequence
    /// semantics
    pub sequences: BTreeMap<String, (i64, bool)>,
    /// Intent log of every mutating statement, for idempotence assertions
    pub log: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            wal_level: "logical".to_string(),
            version_num: 160_000,
            server_address: "10.0.0.2".parse().unwrap(),
            hba_rules: vec![HbaRule {
                address: "10.0.0.0".to_string(),
                netmask: Some("255.255.255.0".to_string()),
            }],
            tables_missing_identity: Vec::new(),
            options: DatabaseOptions {
                connection_limit: -1,
                encoding: "UTF8".to_string(),
                owner: "postgres".to_string(),
                collation: "C".to_string(),
                ctype: "C".to_string(),
            },
            role: None,
            publication: None,
            subscription: None,
            slots: Vec::new(),
            stats: None,
            current_lsn: "0/1000000".parse().unwrap(),
            subscribed_tables: Vec::new(),
            relation_sizes: HashMap::new(),
            sequences: BTreeMap::new(),
            log: Vec::new(),
        }
    }
}

/// In-memory `Database` implementation with engine-like semantics for the
/// control-plane statements.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FakeState {
        self.state.lock().unwrap().clone()
    }

    pub fn mutate(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn create_sequence(&self, name: &str) {
        self.mutate(|state| {
            state.sequences.insert(name.to_string(), (0, true));
        });
    }

    pub fn drain_log(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().unwrap().log)
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn wal_level(&self) -> Result<String, DatabaseError> {
        Ok(self.state.lock().unwrap().wal_level.clone())
    }

    async fn server_version_num(&self) -> Result<i64, DatabaseError> {
        Ok(self.state.lock().unwrap().version_num)
    }

    async fn server_address(&self) -> Result<IpAddr, DatabaseError> {
        Ok(self.state.lock().unwrap().server_address)
    }

    async fn replication_hba_rules(&self) -> Result<Vec<HbaRule>, DatabaseError> {
        Ok(self.state.lock().unwrap().hba_rules.clone())
    }

    async fn tables_without_replica_identity(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self.state.lock().unwrap().tables_missing_identity.clone())
    }

    async fn database_options(&self) -> Result<DatabaseOptions, DatabaseError> {
        Ok(self.state.lock().unwrap().options.clone())
    }

    async fn role(&self, name: &str) -> Result<Option<RoleInfo>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state.role.clone().filter(|role| role.name == name))
    }

    async fn create_replication_role(
        &self,
        name: &str,
        _password: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.role.is_some() {
            return Err(DatabaseError::new("create replication role", "role exists"));
        }
        state.role = Some(RoleInfo {
            name: name.to_string(),
            can_replicate: true,
        });
        state.log.push("create role".to_string());
        Ok(())
    }

    async fn grant_read_access(&self, _role: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state.log.push("grant read access".to_string());
        Ok(())
    }

    async fn revoke_role_grants(&self, _name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state.log.push("revoke role grants".to_string());
        Ok(())
    }

    async fn drop_role(&self, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.role.as_ref().is_some_and(|role| role.name == name) {
            state.role = None;
        }
        state.log.push("drop role".to_string());
        Ok(())
    }

    async fn publication(&self, name: &str) -> Result<Option<PublicationInfo>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .publication
            .clone()
            .filter(|publication| publication.name == name))
    }

    async fn create_publication_for_all_tables(&self, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.publication.is_some() {
            return Err(DatabaseError::new("create publication", "publication exists"));
        }
        state.publication = Some(PublicationInfo {
            name: name.to_string(),
            all_tables: true,
            inserts: true,
            updates: true,
            deletes: true,
            truncates: true,
        });
        state.log.push("create publication".to_string());
        Ok(())
    }

    async fn drop_publication(&self, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match &state.publication {
            Some(publication) if publication.name == name => state.publication = None,
            _ => {
                return Err(DatabaseError::new("drop publication", "no such publication"));
            }
        }
        state.log.push("drop publication".to_string());
        Ok(())
    }

    async fn subscription(&self, name: &str) -> Result<Option<SubscriptionInfo>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .subscription
            .clone()
            .filter(|subscription| subscription.name == name))
    }

    async fn create_subscription(
        &self,
        name: &str,
        conninfo: &str,
        publication: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.subscription.is_some() {
            return Err(DatabaseError::new("create subscription", "subscription exists"));
        }
        state.subscription = Some(SubscriptionInfo {
            name: name.to_string(),
            enabled: true,
            connection_info: conninfo.to_string(),
            publications: vec![publication.to_string()],
        });
        state.log.push("create subscription".to_string());
        Ok(())
    }

    async fn set_subscription_connection(
        &self,
        name: &str,
        conninfo: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match state.subscription.as_mut() {
            Some(subscription) if subscription.name == name => {
                subscription.connection_info = conninfo.to_string();
            }
            _ => {
                return Err(DatabaseError::new(
                    "update subscription connection",
                    "no such subscription",
                ));
            }
        }
        state.log.push("alter subscription connection".to_string());
        Ok(())
    }

    async fn set_subscription_publication(
        &self,
        name: &str,
        publication: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match state.subscription.as_mut() {
            Some(subscription) if subscription.name == name => {
                subscription.publications = vec![publication.to_string()];
            }
            _ => {
                return Err(DatabaseError::new(
                    "update subscription publication",
                    "no such subscription",
                ));
            }
        }
        state.log.push("alter subscription publication".to_string());
        Ok(())
    }

    async fn enable_subscription(&self, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match state.subscription.as_mut() {
            Some(subscription) if subscription.name == name => subscription.enabled = true,
            _ => return Err(DatabaseError::new("enable subscription", "no such subscription")),
        }
        state.log.push("enable subscription".to_string());
        Ok(())
    }

    async fn disable_subscription(&self, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match state.subscription.as_mut() {
            Some(subscription) if subscription.name == name => subscription.enabled = false,
            _ => {
                return Err(DatabaseError::new("disable subscription", "no such subscription"))
            }
        }
        state.log.push("disable subscription".to_string());
        Ok(())
    }

    async fn refresh_subscription_publication(&self, _name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state.log.push("refresh publication".to_string());
        Ok(())
    }

    async fn drop_subscription(&self, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match &state.subscription {
            Some(subscription) if subscription.name == name => state.subscription = None,
            _ => return Err(DatabaseError::new("drop subscription", "no such subscription")),
        }
        state.log.push("drop subscription".to_string());
        Ok(())
    }

    async fn subscribed_tables(
        &self,
        _subscription: &str,
    ) -> Result<Vec<SubscribedTable>, DatabaseError> {
        Ok(self.state.lock().unwrap().subscribed_tables.clone())
    }

    async fn relation_size(&self, schema: &str, table: &str) -> Result<i64, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(*state
            .relation_sizes
            .get(&format!("{schema}.{table}"))
            .unwrap_or(&0))
    }

    async fn replication_stats(
        &self,
        application_name: &str,
        with_replay_lag: bool,
    ) -> Result<Option<ReplicationStats>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .stats
            .clone()
            .filter(|stats| stats.application_name == application_name)
            .map(|mut stats| {
                if !with_replay_lag {
                    stats.replay_lag_secs = None;
                }
                stats
            }))
    }

    async fn current_wal_lsn(&self) -> Result<Lsn, DatabaseError> {
        Ok(self.state.lock().unwrap().current_lsn)
    }

    async fn replication_slot(&self, name: &str) -> Result<Option<SlotInfo>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state.slots.iter().find(|slot| slot.name == name).cloned())
    }

    async fn active_tablesync_slot(
        &self,
        _subscription: &str,
    ) -> Result<Option<SlotInfo>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .slots
            .iter()
            .find(|slot| slot.active && slot.name.starts_with("pg_") && slot.name.contains("_sync_"))
            .cloned())
    }

    async fn sequence_names(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self.state.lock().unwrap().sequences.keys().cloned().collect())
    }

    async fn next_sequence_value(&self, sequence: &str) -> Result<i64, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let (last_value, is_called) = state
            .sequences
            .get_mut(sequence)
            .ok_or_else(|| DatabaseError::new("advance sequence", "no such sequence"))?;
        if *is_called {
            *last_value += 1;
        } else {
            *is_called = true;
        }
        Ok(*last_value)
    }

    async fn set_sequence_value(
        &self,
        sequence: &str,
        value: i64,
        is_called: bool,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state
            .sequences
            .insert(sequence.to_string(), (value, is_called));
        state.log.push(format!("setval {sequence} {value}"));
        Ok(())
    }
}

/// Schema dumper returning a canned dump, or a canned failure.
pub struct FakeSchemaDumper {
    pub dump: Result<String, String>,
}

impl FakeSchemaDumper {
    pub fn ok(dump: &str) -> Arc<Self> {
        Arc::new(Self {
            dump: Ok(dump.to_string()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            dump: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl SchemaDumper for FakeSchemaDumper {
    async fn dump(&self) -> Result<String, SchemaDumpError> {
        self.dump.clone().map_err(SchemaDumpError)
    }
}

pub struct FakeDiffRenderer;

#[async_trait]
impl DiffRenderer for FakeDiffRenderer {
    async fn render(&self, _source: &str, _target: &str) -> Result<String, DiffRenderError> {
        Ok("/tmp/pgferry-schema.diff".to_string())
    }
}

pub struct FakeSecretStore;

impl SecretStore for FakeSecretStore {
    fn replication_password(&self, _source_host: &str) -> Result<String, SecretStoreError> {
        Ok("fake-password".to_string())
    }
}

pub fn source_settings() -> ConnectionSettings {
    ConnectionSettings {
        host: "source.internal".to_string(),
        port: 5432,
        dbname: "app".to_string(),
        user: "postgres".to_string(),
        password: "".to_string(),
    }
}

/// A source/target pair that passes every pre-flight check.
pub fn ready_pair() -> (FakeDatabase, FakeDatabase) {
    (FakeDatabase::new(), FakeDatabase::new())
}

pub fn check_service(source: &FakeDatabase, target: &FakeDatabase) -> CheckService {
    CheckService::new(
        Arc::new(source.clone()),
        Arc::new(target.clone()),
        FakeSchemaDumper::ok("CREATE TABLE widgets ();"),
        FakeSchemaDumper::ok("CREATE TABLE widgets ();"),
        Arc::new(FakeDiffRenderer),
    )
}

pub fn replication_service(source: &FakeDatabase, target: &FakeDatabase) -> ReplicationService {
    ReplicationService::new(
        Arc::new(source.clone()),
        Arc::new(target.clone()),
        check_service(source, target),
        Arc::new(FakeSecretStore),
        source_settings(),
    )
}
