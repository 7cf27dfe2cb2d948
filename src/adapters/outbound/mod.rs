mod diff_file_renderer;
mod file_secret_store;
mod pg_dump_schema;
mod postgres_database;

pub use diff_file_renderer::DiffFileRenderer;
pub use file_secret_store::FileSecretStore;
pub use pg_dump_schema::PgDumpSchemaDumper;
pub use postgres_database::{quote_ident, quote_literal, PgDatabase};
