//! PostgreSQL Database Adapter
//!
//! Implements the `Database` port over tokio-postgres. This is the only
//! module that contains SQL. Values always travel as bound parameters;
//! object names, which PostgreSQL cannot parameterize in DDL, go through
//! `quote_ident`, and the one string literal DDL requires (the
//! subscription connection string) goes through `quote_literal`.

use crate::config::{ConnectionSettings, REPLICATION_APPLICATION_NAME};
use crate::domain::entities::{
    DatabaseOptions, HbaRule, PublicationInfo, RelationSyncState, ReplicationStats, RoleInfo,
    SlotInfo, SubscribedTable, SubscriptionInfo,
};
use crate::domain::ports::{Database, DatabaseError};
use crate::domain::value_objects::Lsn;
use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

/// Quote an SQL identifier (role, publication, subscription, schema or
/// sequence name). The single escaping routine for everything that cannot
/// be a bound parameter.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an SQL string literal. Only used where DDL syntactically
/// requires a literal (CONNECTION strings, COMMENT bodies).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn fault(intent: &'static str) -> impl FnOnce(tokio_postgres::Error) -> DatabaseError {
    move |err| DatabaseError::new(intent, err.to_string())
}

/// One live tokio-postgres connection.
///
/// The client sits behind a mutex because role creation needs a driver
/// transaction, which requires exclusive access; operations are
/// single-flow, so there is no contention.
pub struct PgDatabase {
    client: Mutex<Client>,
}

impl PgDatabase {
    /// Connect to the database described by the settings. The connection
    /// driver task is spawned onto the runtime and lives until the client
    /// is dropped.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, DatabaseError> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .dbname(&settings.dbname)
            .user(&settings.user)
            .application_name(REPLICATION_APPLICATION_NAME);
        if !settings.password.is_empty() {
            pg_config.password(&settings.password);
        }

        let (client, connection) = pg_config.connect(NoTls).await.map_err(fault("connect"))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!("database connection error: {err}");
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn managed_comment(kind: &str) -> String {
        format!(
            "pgferry: managed {kind} (created on {})",
            Utc::now().to_rfc3339()
        )
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn wal_level(&self) -> Result<String, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT setting FROM pg_settings WHERE name = 'wal_level'",
                &[],
            )
            .await
            .map_err(fault("read wal_level"))?;
        Ok(row.get(0))
    }

    async fn server_version_num(&self) -> Result<i64, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one("SELECT current_setting('server_version_num')::bigint", &[])
            .await
            .map_err(fault("read server version"))?;
        Ok(row.get(0))
    }

    async fn server_address(&self) -> Result<IpAddr, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT host(COALESCE(inet_server_addr(), '127.0.0.1'::inet))",
                &[],
            )
            .await
            .map_err(fault("read server address"))?;
        let address: String = row.get(0);
        address
            .parse()
            .map_err(|_| DatabaseError::new("read server address", format!("unparseable address `{address}`")))
    }

    async fn replication_hba_rules(&self) -> Result<Vec<HbaRule>, DatabaseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT address, netmask FROM pg_hba_file_rules \
                 WHERE database @> $1 AND address IS NOT NULL",
                &[&vec!["replication"]],
            )
            .await
            .map_err(fault("read pg_hba rules"))?;
        Ok(rows
            .into_iter()
            .map(|row| HbaRule {
                address: row.get(0),
                netmask: row.get(1),
            })
            .collect())
    }

    async fn tables_without_replica_identity(&self) -> Result<Vec<String>, DatabaseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT quote_ident(nspname) || '.' || quote_ident(relname) AS tbl \
                 FROM pg_class c \
                 JOIN pg_namespace n ON c.relnamespace = n.oid \
                 WHERE relkind = 'r' \
                   AND NOT nspname LIKE ANY (ARRAY[E'pg\\_%', 'information_schema']) \
                   AND NOT EXISTS ( \
                     SELECT 1 FROM pg_index \
                     WHERE indrelid = c.oid \
                       AND indisunique AND indisvalid AND indisready \
                       AND indislive AND indisprimary)",
                &[],
            )
            .await
            .map_err(fault("scan replica identities"))?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn database_options(&self) -> Result<DatabaseOptions, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT d.datconnlimit, \
                        pg_encoding_to_char(d.encoding)::text, \
                        r.rolname::text, \
                        d.datcollate, \
                        d.datctype \
                 FROM pg_database d \
                 JOIN pg_roles r ON r.oid = d.datdba \
                 WHERE d.datname = current_database()",
                &[],
            )
            .await
            .map_err(fault("read database options"))?;
        Ok(DatabaseOptions {
            connection_limit: row.get(0),
            encoding: row.get(1),
            owner: row.get(2),
            collation: row.get(3),
            ctype: row.get(4),
        })
    }

    async fn role(&self, name: &str) -> Result<Option<RoleInfo>, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT rolname::text, rolreplication FROM pg_roles WHERE rolname = $1",
                &[&name],
            )
            .await
            .map_err(fault("read role"))?;
        Ok(row.map(|row| RoleInfo {
            name: row.get(0),
            can_replicate: row.get(1),
        }))
    }

    async fn create_replication_role(
        &self,
        name: &str,
        password: &str,
    ) -> Result<(), DatabaseError> {
        let mut client = self.client.lock().await;
        // Create and annotate atomically so a crash between the two
        // statements cannot leave an unannotated role behind. The
        // transaction rolls back on drop if not committed.
        let transaction = client
            .transaction()
            .await
            .map_err(fault("create replication role"))?;
        transaction
            .batch_execute(&format!(
                "CREATE ROLE {} WITH REPLICATION LOGIN PASSWORD {}",
                quote_ident(name),
                quote_literal(password)
            ))
            .await
            .map_err(fault("create replication role"))?;
        transaction
            .batch_execute(&format!(
                "COMMENT ON ROLE {} IS {}",
                quote_ident(name),
                quote_literal(&Self::managed_comment("replication role"))
            ))
            .await
            .map_err(fault("annotate replication role"))?;
        transaction
            .commit()
            .await
            .map_err(fault("create replication role"))
    }

    async fn grant_read_access(&self, role: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT nspname::text FROM pg_namespace \
                 WHERE NOT nspname LIKE E'pg\\_%' AND nspname <> 'information_schema'",
                &[],
            )
            .await
            .map_err(fault("list schemas"))?;

        for row in rows {
            let schema: String = row.get(0);
            client
                .batch_execute(&format!(
                    "GRANT USAGE ON SCHEMA {} TO {}",
                    quote_ident(&schema),
                    quote_ident(role)
                ))
                .await
                .map_err(fault("grant schema usage"))?;
            client
                .batch_execute(&format!(
                    "GRANT SELECT ON ALL TABLES IN SCHEMA {} TO {}",
                    quote_ident(&schema),
                    quote_ident(role)
                ))
                .await
                .map_err(fault("grant table read access"))?;
        }
        Ok(())
    }

    async fn revoke_role_grants(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!("DROP OWNED BY {}", quote_ident(name)))
            .await
            .map_err(fault("revoke role grants"))
    }

    async fn drop_role(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!("DROP ROLE IF EXISTS {}", quote_ident(name)))
            .await
            .map_err(fault("drop role"))
    }

    async fn publication(&self, name: &str) -> Result<Option<PublicationInfo>, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT pubname::text, puballtables, pubinsert, pubupdate, pubdelete, \
                        pubtruncate \
                 FROM pg_catalog.pg_publication WHERE pubname = $1",
                &[&name],
            )
            .await
            .map_err(fault("read publication"))?;
        Ok(row.map(|row| PublicationInfo {
            name: row.get(0),
            all_tables: row.get(1),
            inserts: row.get(2),
            updates: row.get(3),
            deletes: row.get(4),
            truncates: row.get(5),
        }))
    }

    async fn create_publication_for_all_tables(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!(
                "CREATE PUBLICATION {} FOR ALL TABLES",
                quote_ident(name)
            ))
            .await
            .map_err(fault("create publication"))?;
        client
            .batch_execute(&format!(
                "COMMENT ON PUBLICATION {} IS {}",
                quote_ident(name),
                quote_literal(&Self::managed_comment("publication"))
            ))
            .await
            .map_err(fault("annotate publication"))
    }

    async fn drop_publication(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!("DROP PUBLICATION {}", quote_ident(name)))
            .await
            .map_err(fault("drop publication"))
    }

    async fn subscription(&self, name: &str) -> Result<Option<SubscriptionInfo>, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT subname::text, subenabled, subconninfo, subpublications \
                 FROM pg_catalog.pg_subscription WHERE subname = $1",
                &[&name],
            )
            .await
            .map_err(fault("read subscription"))?;
        Ok(row.map(|row| SubscriptionInfo {
            name: row.get(0),
            enabled: row.get(1),
            connection_info: row.get(2),
            publications: row.get(3),
        }))
    }

    async fn create_subscription(
        &self,
        name: &str,
        conninfo: &str,
        publication: &str,
    ) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!(
                "CREATE SUBSCRIPTION {} CONNECTION {} PUBLICATION {}",
                quote_ident(name),
                quote_literal(conninfo),
                quote_ident(publication)
            ))
            .await
            .map_err(fault("create subscription"))?;
        client
            .batch_execute(&format!(
                "COMMENT ON SUBSCRIPTION {} IS {}",
                quote_ident(name),
                quote_literal(&Self::managed_comment("subscription"))
            ))
            .await
            .map_err(fault("annotate subscription"))
    }

    async fn set_subscription_connection(
        &self,
        name: &str,
        conninfo: &str,
    ) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!(
                "ALTER SUBSCRIPTION {} CONNECTION {}",
                quote_ident(name),
                quote_literal(conninfo)
            ))
            .await
            .map_err(fault("update subscription connection"))
    }

    async fn set_subscription_publication(
        &self,
        name: &str,
        publication: &str,
    ) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!(
                "ALTER SUBSCRIPTION {} SET PUBLICATION {}",
                quote_ident(name),
                quote_ident(publication)
            ))
            .await
            .map_err(fault("update subscription publication"))
    }

    async fn enable_subscription(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!("ALTER SUBSCRIPTION {} ENABLE", quote_ident(name)))
            .await
            .map_err(fault("enable subscription"))
    }

    async fn disable_subscription(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!("ALTER SUBSCRIPTION {} DISABLE", quote_ident(name)))
            .await
            .map_err(fault("disable subscription"))
    }

    async fn refresh_subscription_publication(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!(
                "ALTER SUBSCRIPTION {} REFRESH PUBLICATION",
                quote_ident(name)
            ))
            .await
            .map_err(fault("refresh subscription publication"))
    }

    async fn drop_subscription(&self, name: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .batch_execute(&format!("DROP SUBSCRIPTION {}", quote_ident(name)))
            .await
            .map_err(fault("drop subscription"))
    }

    async fn subscribed_tables(
        &self,
        subscription: &str,
    ) -> Result<Vec<SubscribedTable>, DatabaseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT n.nspname::text, c.relname::text, sr.srsubstate \
                 FROM pg_subscription_rel sr \
                 JOIN pg_subscription s ON s.oid = sr.srsubid \
                 JOIN pg_class c ON c.oid = sr.srrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE s.subname = $1",
                &[&subscription],
            )
            .await
            .map_err(fault("read subscription tables"))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let code: i8 = row.get(2);
            let code = code as u8 as char;
            let state = RelationSyncState::from_code(code).ok_or_else(|| {
                DatabaseError::new(
                    "read subscription tables",
                    format!("unknown relation sync state `{code}`"),
                )
            })?;
            tables.push(SubscribedTable {
                schema: row.get(0),
                name: row.get(1),
                state,
            });
        }
        Ok(tables)
    }

    async fn relation_size(&self, schema: &str, table: &str) -> Result<i64, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT pg_total_relation_size(format('%I.%I', $1::text, $2::text)::regclass)",
                &[&schema, &table],
            )
            .await
            .map_err(fault("read relation size"))?;
        Ok(row.get(0))
    }

    async fn replication_stats(
        &self,
        application_name: &str,
        with_replay_lag: bool,
    ) -> Result<Option<ReplicationStats>, DatabaseError> {
        // `replay_lag` only exists on servers that advertise the
        // capability; older ones get a NULL placeholder column.
        let statement = if with_replay_lag {
            "SELECT application_name::text, state::text, reply_time, \
                    EXTRACT(EPOCH FROM replay_lag)::float8, flush_lsn::text \
             FROM pg_stat_replication \
             WHERE application_name = $1 AND state IN ('catchup', 'streaming')"
        } else {
            "SELECT application_name::text, state::text, reply_time, \
                    NULL::float8, flush_lsn::text \
             FROM pg_stat_replication \
             WHERE application_name = $1 AND state IN ('catchup', 'streaming')"
        };

        let client = self.client.lock().await;
        let row = client
            .query_opt(statement, &[&application_name])
            .await
            .map_err(fault("read replication statistics"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let flush_lsn: Option<String> = row.get(4);
        let flush_lsn = flush_lsn
            .map(|lsn| {
                lsn.parse::<Lsn>().map_err(|err| {
                    DatabaseError::new("read replication statistics", err.to_string())
                })
            })
            .transpose()?;

        Ok(Some(ReplicationStats {
            application_name: row.get(0),
            state: row.get(1),
            reply_time: row.get(2),
            replay_lag_secs: row.get(3),
            flush_lsn,
        }))
    }

    async fn current_wal_lsn(&self) -> Result<Lsn, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one("SELECT pg_current_wal_lsn()::text", &[])
            .await
            .map_err(fault("read current WAL position"))?;
        let lsn: String = row.get(0);
        lsn.parse()
            .map_err(|_| DatabaseError::new("read current WAL position", format!("unparseable LSN `{lsn}`")))
    }

    async fn replication_slot(&self, name: &str) -> Result<Option<SlotInfo>, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT slot_name::text, active FROM pg_replication_slots WHERE slot_name = $1",
                &[&name],
            )
            .await
            .map_err(fault("read replication slot"))?;
        Ok(row.map(|row| SlotInfo {
            name: row.get(0),
            active: row.get(1),
        }))
    }

    async fn active_tablesync_slot(
        &self,
        subscription: &str,
    ) -> Result<Option<SlotInfo>, DatabaseError> {
        // Tablesync slots follow the engine's internal `pg_<suboid>_sync_*`
        // naming convention. The pattern match lives here, in one place,
        // because the convention is not a stable interface.
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT rs.slot_name::text, rs.active \
                 FROM pg_replication_slots rs \
                 JOIN pg_subscription s ON s.subname = $1 \
                 WHERE rs.active \
                   AND rs.slot_name LIKE 'pg\\_' || s.oid::text || '\\_sync\\_%' \
                 LIMIT 1",
                &[&subscription],
            )
            .await
            .map_err(fault("read tablesync slots"))?;
        Ok(row.map(|row| SlotInfo {
            name: row.get(0),
            active: row.get(1),
        }))
    }

    async fn sequence_names(&self) -> Result<Vec<String>, DatabaseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT relname::text FROM pg_catalog.pg_class WHERE relkind = 'S'",
                &[],
            )
            .await
            .map_err(fault("list sequences"))?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn next_sequence_value(&self, sequence: &str) -> Result<i64, DatabaseError> {
        let client = self.client.lock().await;
        let row = client
            .query_one("SELECT nextval($1::regclass)", &[&sequence])
            .await
            .map_err(fault("advance sequence"))?;
        Ok(row.get(0))
    }

    async fn set_sequence_value(
        &self,
        sequence: &str,
        value: i64,
        is_called: bool,
    ) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client
            .query_one(
                "SELECT setval($1::regclass, $2, $3)",
                &[&sequence, &value, &is_called],
            )
            .await
            .map_err(fault("set sequence value"))?;
        Ok(())
    }
}
