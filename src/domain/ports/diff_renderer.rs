//! Diff Renderer Port
//!
//! Defines the interface for rendering a human-readable diff of two
//! schema dumps. The check engine only reports a pointer to the rendered
//! artifact; how it is produced (external `diff`, browser view, ...) is
//! the adapter's business.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("could not render schema diff: {0}")]
pub struct DiffRenderError(pub String);

#[async_trait]
pub trait DiffRenderer: Send + Sync {
    /// Render a diff of the two dumps and return a pointer (file path) to
    /// the result.
    async fn render(&self, source_dump: &str, target_dump: &str)
        -> Result<String, DiffRenderError>;
}
