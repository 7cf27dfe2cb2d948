//! Diff File Renderer
//!
//! Implements the `DiffRenderer` port by persisting both dumps and
//! running the system `diff` over them. The rendered diff file is kept on
//! disk so the operator can inspect it after the check run ends.

use crate::domain::ports::{DiffRenderError, DiffRenderer};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tokio::process::Command;

pub struct DiffFileRenderer;

fn persist(prefix: &str, contents: &str) -> Result<PathBuf, DiffRenderError> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".sql")
        .tempfile()
        .map_err(|err| DiffRenderError(err.to_string()))?;
    file.write_all(contents.as_bytes())
        .map_err(|err| DiffRenderError(err.to_string()))?;
    let (_, path) = file
        .keep()
        .map_err(|err| DiffRenderError(err.to_string()))?;
    Ok(path)
}

#[async_trait]
impl DiffRenderer for DiffFileRenderer {
    async fn render(
        &self,
        source_dump: &str,
        target_dump: &str,
    ) -> Result<String, DiffRenderError> {
        let source_path = persist("pgferry-schema-source", source_dump)?;
        let target_path = persist("pgferry-schema-target", target_dump)?;

        let output = Command::new("diff")
            .arg("-u")
            .arg(&source_path)
            .arg(&target_path)
            .output()
            .await
            .map_err(|err| DiffRenderError(format!("could not run diff: {err}")))?;

        // diff exits 1 when the inputs differ; only >1 is trouble.
        if !matches!(output.status.code(), Some(0) | Some(1)) {
            return Err(DiffRenderError(format!(
                "diff exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut diff_file = tempfile::Builder::new()
            .prefix("pgferry-schema")
            .suffix(".diff")
            .tempfile()
            .map_err(|err| DiffRenderError(err.to_string()))?;
        diff_file
            .write_all(&output.stdout)
            .map_err(|err| DiffRenderError(err.to_string()))?;
        let (_, path) = diff_file
            .keep()
            .map_err(|err| DiffRenderError(err.to_string()))?;

        tracing::debug!("schema diff written to {}", path.display());
        Ok(path.display().to_string())
    }
}
