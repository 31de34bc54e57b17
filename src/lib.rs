//! # svgstack
//!
//! Download a numbered series of SVG pages and turn it into a single PDF.
//!
//! ## Why this crate?
//!
//! Some sites publish documents as one SVG per page at predictable URLs
//! (`…/1`, `…/2`, …) with no index and no page count. This crate walks the
//! series until the first missing page, stores every SVG before doing
//! anything else, rasterises the pages in parallel and stacks the bitmaps
//! into a PDF, then keeps or deletes the intermediates as requested.
//!
//! ## Pipeline Overview
//!
//! ```text
//! base URL
//!  │
//!  ├─ 1. Fetch     GET {base}1, {base}2, … sequentially until absent
//!  ├─ 2. Secure    every SVG on disk before any further work
//!  ├─ 3. Convert   SVG → PNG on a bounded worker pool (spawn_blocking)
//!  ├─ 4. Assemble  one PDF page per PNG, in index order
//!  └─ 5. Cleanup   delete what the retention mode does not keep
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use svgstack::{run, PipelineConfig, RetentionMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder("https://example.com/book/pages/")
//!         .output_dir("book")
//!         .dpi(300)
//!         .build()?;
//!     let report = run(config, RetentionMode::DocumentDeleteAll).await?;
//!     if let Some(doc) = &report.document {
//!         eprintln!("{} pages → {}", doc.page_count(), doc.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! To choose the mode after the download (as the CLI does), call
//! [`secure`] first and [`SecuredRun::finish`] once the mode is known.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `svgstack` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! svgstack = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OutputLayout, PageSize, PipelineConfig, PipelineConfigBuilder};
pub use error::{ItemError, PipelineError, RenderError};
pub use output::{
    ArtifactDescriptor, AssembledDocument, CleanupReport, OrderedArtifacts, PageSummary,
    ResourceDescriptor, RunReport, RunStats,
};
pub use pipeline::fetch::AbsentReason;
pub use pipeline::retention::RetentionMode;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{run, secure, secure_with, RunState, SecuredRun};
