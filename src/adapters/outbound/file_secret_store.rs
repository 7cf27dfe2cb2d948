//! File Secret Store
//!
//! Implements the `SecretStore` port with one password file per source
//! host under a restrictive-permission directory. The password is
//! generated once and reused on every later run, so re-running create
//! never rotates the credential an existing subscription embeds.

use crate::domain::ports::{SecretStore, SecretStoreError};
use rand::{Rng, RngCore};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub struct FileSecretStore {
    directory: PathBuf,
}

impl FileSecretStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn password_path(&self, source_host: &str) -> PathBuf {
        // A host containing a path separator is a Unix-domain socket
        // directory; don't try to be smart about a file name for it.
        let prefix = if source_host.contains(std::path::MAIN_SEPARATOR) {
            "replication"
        } else {
            source_host
        };
        self.directory.join(format!("{prefix}-password.txt"))
    }
}

impl SecretStore for FileSecretStore {
    fn replication_password(&self, source_host: &str) -> Result<String, SecretStoreError> {
        fs::create_dir_all(&self.directory)
            .map_err(|err| SecretStoreError(format!("could not create secrets dir: {err}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.directory, fs::Permissions::from_mode(0o700))
                .map_err(|err| SecretStoreError(format!("could not restrict secrets dir: {err}")))?;
        }

        let path = self.password_path(source_host);
        match fs::read_to_string(&path) {
            Ok(password) => return Ok(password),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(SecretStoreError(format!(
                    "could not read {}: {err}",
                    path.display()
                )))
            }
        }

        let password = generate_password();

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&path)
            .map_err(|err| SecretStoreError(format!("could not write {}: {err}", path.display())))?;
        file.write_all(password.as_bytes())
            .map_err(|err| SecretStoreError(format!("could not write {}: {err}", path.display())))?;

        tracing::info!(
            "replication password for `{source_host}` written to {}",
            path.display()
        );
        Ok(password)
    }
}

/// Hex token of 40 to 80 random bytes.
fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let length = rng.gen_range(40..80);
    let mut bytes = vec![0u8; length];
    rng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
