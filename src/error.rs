//! Error taxonomy for the harvest pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The remote did not produce the page within the wait budget.
    #[error("fetch timed out: {url}")]
    FetchTimeout { url: String },

    /// Network or remote failure (connection error, non-success status).
    #[error("fetch failed for {url}: {reason}")]
    FetchUnavailable { url: String, reason: String },

    /// An expected element or field is absent from the page: template
    /// drift. The offending link is attached by the orchestrator's log line.
    #[error("structural mismatch: missing {0}")]
    StructuralMismatch(&'static str),

    /// The store is unreachable or rejected a write. Aborts the current pass:
    /// continuing would lose the ability to mark progress correctly.
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl HarvestError {
    /// Whether the failure is isolated to a single record. Record-scoped
    /// errors are logged and the record loop continues; everything else
    /// escalates out of the pass.
    pub fn is_record_scoped(&self) -> bool {
        !matches!(self, HarvestError::Persistence(_))
    }
}
