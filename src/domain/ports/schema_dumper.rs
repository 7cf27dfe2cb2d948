//! Schema Dumper Port
//!
//! Defines the interface for obtaining the textual structural definition
//! of one database. The production implementation shells out to
//! `pg_dump`; the dump must be deterministic for an unchanged schema so
//! the parity probe's textual comparison is meaningful.

use async_trait::async_trait;

/// The dump tool failed or was unavailable.
///
/// Fatal to the schema-parity probe only, never to the whole check run.
#[derive(Debug, thiserror::Error)]
#[error("schema dump failed: {0}")]
pub struct SchemaDumpError(pub String);

/// Produces the structural dump of the database it was constructed for.
///
/// Publications and subscriptions are excluded from the dump - they are
/// the very objects this tool manages and would make the two sides differ
/// by construction.
#[async_trait]
pub trait SchemaDumper: Send + Sync {
    async fn dump(&self) -> Result<String, SchemaDumpError>;
}
