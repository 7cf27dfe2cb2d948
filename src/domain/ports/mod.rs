mod database;
mod diff_renderer;
mod schema_dumper;
mod secret_store;

pub use database::{Database, DatabaseError};
pub use diff_renderer::{DiffRenderError, DiffRenderer};
pub use schema_dumper::{SchemaDumpError, SchemaDumper};
pub use secret_store::{SecretStore, SecretStoreError};
