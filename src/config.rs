//! Configuration
//!
//! Explicit configuration passed by value into the core components. The
//! structs are populated once at the CLI boundary; nothing below that
//! boundary reads the process environment.

use crate::domain::value_objects::ConnInfo;

/// Name of the role created on the source cluster for streaming.
pub const REPLICATION_ROLE: &str = "pgferry_replication";

/// `application_name` the subscription connects with; the status
/// operation filters `pg_stat_replication` on it.
pub const REPLICATION_APPLICATION_NAME: &str = "pgferry";

pub const DEFAULT_PUBLICATION_NAME: &str = "pgferry_publication";
pub const DEFAULT_SUBSCRIPTION_NAME: &str = "pgferry_subscription";

/// Directory the generated replication password is persisted under.
pub const SECRETS_DIR: &str = "secrets";

/// How to reach one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl ConnectionSettings {
    /// Connection info the target's subscription uses to stream from this
    /// database. Connects as the replication role, not as the admin user
    /// these settings describe.
    pub fn replication_conninfo(&self, password: &str) -> ConnInfo {
        ConnInfo {
            host: self.host.clone(),
            port: self.port,
            dbname: self.dbname.clone(),
            application_name: REPLICATION_APPLICATION_NAME.to_string(),
            user: REPLICATION_ROLE.to_string(),
            password: password.to_string(),
        }
    }
}

/// The source/target pair every operation works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source: ConnectionSettings,
    pub target: ConnectionSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replication_conninfo_uses_the_replication_role() {
        let settings = ConnectionSettings {
            host: "source.internal".to_string(),
            port: 5432,
            dbname: "app".to_string(),
            user: "admin".to_string(),
            password: "admin-password".to_string(),
        };

        let conninfo = settings.replication_conninfo("stream-secret").to_conninfo();
        assert_eq!(
            conninfo,
            "host=source.internal port=5432 dbname=app application_name=pgferry \
             user=pgferry_replication password=stream-secret"
        );
        // The admin credentials must not leak into the subscription.
        assert!(!conninfo.contains("admin"));
    }
}
