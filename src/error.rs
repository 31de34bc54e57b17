//! Error types for the svgstack library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Phase-level**: a run cannot proceed (bad base URL,
//!   nothing to fetch, the document could not be written). Returned as
//!   `Err(PipelineError)` from the top-level entry points.
//!
//! * [`ItemError`] — **Per-item**: one resource failed to convert, one page
//!   lost its image, one file could not be deleted. Collected into
//!   [`crate::output::RunReport`] while the rest of the run carries on.
//!
//! [`PipelineError::NoArtifacts`] sits between the two: it is reported by the
//! assembler but does not end the process.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a pipeline phase.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Validation ────────────────────────────────────────────────────────
    /// The base URL is missing or does not use an accepted scheme.
    #[error("Invalid base URL '{url}': must start with http:// or https://")]
    InvalidBaseUrl { url: String },

    /// The retention-mode selection is not one of the six modes.
    #[error("Invalid mode selection '{selection}': expected 1–6 or a mode name")]
    InvalidMode { selection: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Fetch phase ───────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The walk ended at index 1: the endpoint serves nothing.
    #[error("No resources found at '{url}' (index 1 is absent: {reason})")]
    NoResources { url: String, reason: String },

    /// A fetched resource could not be persisted to disk.
    #[error("Failed to store resource {index} at '{path}': {source}")]
    ResourceWriteFailed {
        index: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Assembly phase ────────────────────────────────────────────────────
    /// There were no artifacts to assemble. Non-fatal: no document is produced.
    #[error("No artifacts to assemble; document was not created")]
    NoArtifacts,

    /// The in-memory PDF could not be serialised.
    #[error("Failed to encode document '{path}': {detail}")]
    DocumentEncodeFailed { path: PathBuf, detail: String },

    /// The finished PDF could not be written to its destination.
    #[error("Failed to write document '{path}': {source}")]
    DocumentWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether this error should end the run.
    ///
    /// Everything except [`PipelineError::NoArtifacts`] is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::NoArtifacts)
    }
}

/// A recovered failure affecting a single item.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Resource could not be turned into a bitmap; it is left out of the document.
    #[error("Resource {index}: conversion failed: {detail}")]
    ConversionFailed { index: u32, detail: String },

    /// The bitmap could not be placed; its page is left blank.
    #[error("Page for resource {index}: image placement failed: {detail}")]
    PlacementFailed { index: u32, detail: String },

    /// A file selected for deletion could not be removed.
    #[error("Cleanup of '{path}' failed: {detail}")]
    CleanupFailed { path: PathBuf, detail: String },
}

impl ItemError {
    /// The resource index this failure belongs to, if any.
    pub fn index(&self) -> Option<u32> {
        match self {
            ItemError::ConversionFailed { index, .. } | ItemError::PlacementFailed { index, .. } => {
                Some(*index)
            }
            ItemError::CleanupFailed { .. } => None,
        }
    }
}

/// Why rasterising one SVG failed.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The bytes are not a parseable SVG.
    #[error("SVG parse error: {0}")]
    Parse(String),

    /// The scaled canvas is empty, unrepresentable, or over the pixel budget.
    #[error("Cannot allocate a {width}x{height} px canvas")]
    Canvas { width: u32, height: u32 },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_artifacts_is_not_fatal() {
        assert!(!PipelineError::NoArtifacts.is_fatal());
        assert!(PipelineError::InvalidMode {
            selection: "9".into()
        }
        .is_fatal());
    }

    #[test]
    fn no_resources_display() {
        let e = PipelineError::NoResources {
            url: "https://example.com/pages/".into(),
            reason: "HTTP 404".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("example.com/pages/"), "got: {msg}");
        assert!(msg.contains("HTTP 404"), "got: {msg}");
    }

    #[test]
    fn item_error_index() {
        let e = ItemError::ConversionFailed {
            index: 4,
            detail: "bad svg".into(),
        };
        assert_eq!(e.index(), Some(4));
        assert!(e.to_string().contains("Resource 4"));

        let e = ItemError::CleanupFailed {
            path: PathBuf::from("/tmp/x.svg"),
            detail: "denied".into(),
        };
        assert_eq!(e.index(), None);
    }
}
