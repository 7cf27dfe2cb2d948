//! pg_dump Schema Dumper
//!
//! Implements the `SchemaDumper` port by shelling out to `pg_dump`. The
//! password travels through the child's environment only, never through
//! the argument list.

use crate::config::ConnectionSettings;
use crate::domain::ports::{SchemaDumpError, SchemaDumper};
use async_trait::async_trait;
use tokio::process::Command;

pub struct PgDumpSchemaDumper {
    settings: ConnectionSettings,
}

impl PgDumpSchemaDumper {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SchemaDumper for PgDumpSchemaDumper {
    async fn dump(&self) -> Result<String, SchemaDumpError> {
        tracing::debug!(
            "retrieving schema of {}:{}/{}",
            self.settings.host,
            self.settings.port,
            self.settings.dbname
        );

        let output = Command::new("pg_dump")
            .arg("--host")
            .arg(&self.settings.host)
            .arg("--port")
            .arg(self.settings.port.to_string())
            .arg("--username")
            .arg(&self.settings.user)
            .arg("--dbname")
            .arg(&self.settings.dbname)
            .arg("--schema-only")
            // Publications and subscriptions are the objects we manage;
            // including them would make the two dumps differ by
            // construction.
            .arg("--no-publications")
            .arg("--no-subscriptions")
            .env("PGPASSWORD", &self.settings.password)
            .output()
            .await
            .map_err(|err| SchemaDumpError(format!("could not run pg_dump: {err}")))?;

        if !output.status.success() {
            return Err(SchemaDumpError(format!(
                "pg_dump exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|err| SchemaDumpError(format!("pg_dump produced invalid UTF-8: {err}")))
    }
}
