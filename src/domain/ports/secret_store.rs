//! Secret Store Port
//!
//! Defines the interface for obtaining the replication role's password.
//! The password must be stable across invocations for the same source
//! host - create is re-runnable and an existing subscription embeds the
//! password in its connection string.

#[derive(Debug, thiserror::Error)]
#[error("secret store: {0}")]
pub struct SecretStoreError(pub String);

pub trait SecretStore: Send + Sync {
    /// The replication password for the given source hostname, generating
    /// and durably storing one on first use.
    fn replication_password(&self, source_host: &str) -> Result<String, SecretStoreError>;
}
