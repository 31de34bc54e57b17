//! Run orchestration: the phase state machine.
//!
//! ```text
//! Fetching → Secured → [Converting] → [Assembling] → [Cleanup] → Done
//! ```
//!
//! A run is split in two on purpose. [`secure`] performs the fetch and
//! returns a [`SecuredRun`] once every resource is on disk; the retention
//! mode is only needed afterwards, by [`SecuredRun::finish`]. The binary uses
//! the gap to prompt the user, so an invalid answer leaves the secured files
//! in place. [`run`] does both halves for callers that know the mode up
//! front.
//!
//! Cleanup is skipped when a phase the mode depends on produced nothing (no
//! artifacts after conversion, or no document after assembly); deleting the
//! inputs then would leave the user with nothing.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{OrderedArtifacts, ResourceDescriptor, RunReport, RunStats};
use crate::pipeline::assemble::Assembler;
use crate::pipeline::convert::ConversionPool;
use crate::pipeline::fetch::{fetch_all, FetchReport, HttpSource, ResourceSource};
use crate::pipeline::retention::{apply_retention, RetentionMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Fetching,
    Secured,
    Converting,
    Assembling,
    Cleanup,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Fetching => "fetching",
            RunState::Secured => "secured",
            RunState::Converting => "converting",
            RunState::Assembling => "assembling",
            RunState::Cleanup => "cleanup",
            RunState::Done => "done",
        };
        f.write_str(s)
    }
}

/// A run whose resources are all on disk, waiting for a retention mode.
#[derive(Debug)]
pub struct SecuredRun {
    config: PipelineConfig,
    fetch: FetchReport,
    started: Instant,
    fetch_duration_ms: u64,
}

/// Fetch every resource from `config.base_url` over HTTP.
///
/// # Errors
/// [`PipelineError::OutputDirFailed`], [`PipelineError::ResourceWriteFailed`]
/// or [`PipelineError::NoResources`] when index 1 is absent.
pub async fn secure(config: PipelineConfig) -> Result<SecuredRun, PipelineError> {
    let source = HttpSource::new(&config)?;
    secure_with(&source, config).await
}

/// [`secure`] against any [`ResourceSource`].
pub async fn secure_with<S: ResourceSource>(
    source: &S,
    config: PipelineConfig,
) -> Result<SecuredRun, PipelineError> {
    let started = Instant::now();
    notify(&config, RunState::Fetching);

    let fetch = fetch_all(source, &config.layout, config.progress_callback.as_ref()).await?;
    let fetch_duration_ms = started.elapsed().as_millis() as u64;

    info!(
        "Secured {} resources in {}ms (series ended at index {}: {})",
        fetch.resources.len(),
        fetch_duration_ms,
        fetch.terminal_index,
        fetch.terminal_reason
    );
    notify(&config, RunState::Secured);

    Ok(SecuredRun {
        config,
        fetch,
        started,
        fetch_duration_ms,
    })
}

/// Fetch, then finish with `mode`.
pub async fn run(config: PipelineConfig, mode: RetentionMode) -> Result<RunReport, PipelineError> {
    secure(config).await?.finish(mode).await
}

impl SecuredRun {
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.fetch.resources
    }

    pub fn fetch_report(&self) -> &FetchReport {
        &self.fetch
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the remaining phases for `mode`.
    ///
    /// Per-item failures are collected in the report. An empty conversion
    /// result is logged and the document is skipped. Only a document that
    /// cannot be written is returned as an error.
    pub async fn finish(self, mode: RetentionMode) -> Result<RunReport, PipelineError> {
        let SecuredRun {
            config,
            fetch,
            started,
            fetch_duration_ms,
        } = self;
        info!("Finishing run with mode {} ({})", mode.selection_number(), mode.label());

        let mut stats = RunStats {
            fetch_duration_ms,
            ..RunStats::default()
        };
        let mut failures = Vec::new();

        // ── Converting ───────────────────────────────────────────────────
        let mut artifacts = OrderedArtifacts::default();
        if mode.converts() {
            notify(&config, RunState::Converting);
            let phase = Instant::now();
            let outcome = ConversionPool::from_config(&config).convert(&fetch.resources).await;
            stats.conversion_duration_ms = phase.elapsed().as_millis() as u64;
            failures.extend(outcome.failures);
            artifacts = outcome.artifacts;
        }

        // ── Assembling ───────────────────────────────────────────────────
        let mut document = None;
        if mode.assembles() {
            notify(&config, RunState::Assembling);
            let phase = Instant::now();
            match Assembler::from_config(&config).assemble(&artifacts).await {
                Ok(outcome) => {
                    failures.extend(outcome.failures);
                    document = Some(outcome.document);
                }
                Err(e) if !e.is_fatal() => warn!("Document skipped: {}", e),
                Err(e) => return Err(e),
            }
            stats.assembly_duration_ms = phase.elapsed().as_millis() as u64;
        }

        // ── Cleanup ──────────────────────────────────────────────────────
        let missing_prerequisite = (mode.converts() && artifacts.is_empty())
            || (mode.assembles() && document.is_none());
        let cleanup = if missing_prerequisite {
            warn!("Nothing was produced; keeping secured files in {}", config.layout.dir().display());
            None
        } else {
            if mode.cleans_up() {
                notify(&config, RunState::Cleanup);
            }
            let report = apply_retention(mode, &fetch.resources, artifacts.as_slice()).await;
            failures.extend(report.failures.iter().cloned());
            Some(report)
        };

        stats.total_duration_ms = started.elapsed().as_millis() as u64;
        notify(&config, RunState::Done);
        info!(
            "Run complete: {} resources, {} artifacts, {} pages, {} failures, {}ms",
            fetch.resources.len(),
            artifacts.len(),
            document.as_ref().map_or(0, |d| d.page_count()),
            failures.len(),
            stats.total_duration_ms
        );

        Ok(RunReport {
            mode,
            resources: fetch.resources,
            terminal_index: fetch.terminal_index,
            terminal_reason: fetch.terminal_reason,
            artifacts,
            document,
            failures,
            cleanup,
            stats,
        })
    }
}

fn notify(config: &PipelineConfig, state: RunState) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_state_change(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fetch::{AbsentReason, Fetched};
    use crate::progress::PipelineProgressCallback;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const PAGE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20" fill="navy"/></svg>"#;

    struct MemorySource(HashMap<u32, Vec<u8>>);

    impl MemorySource {
        fn pages(bodies: &[&str]) -> Self {
            Self(
                bodies
                    .iter()
                    .enumerate()
                    .map(|(i, b)| (i as u32 + 1, b.as_bytes().to_vec()))
                    .collect(),
            )
        }
    }

    impl ResourceSource for MemorySource {
        async fn fetch(&self, index: u32) -> Fetched {
            match self.0.get(&index) {
                Some(b) => Fetched::Bytes(b.clone()),
                None => Fetched::Absent(AbsentReason::NotFound),
            }
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    #[derive(Default)]
    struct StateLog(Mutex<Vec<RunState>>);

    impl PipelineProgressCallback for StateLog {
        fn on_state_change(&self, state: RunState) {
            self.0.lock().unwrap().push(state);
        }
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig::builder("http://localhost/page/")
            .output_dir(dir)
            .dpi(96)
            .concurrency(2)
            .system_fonts(false)
            .build()
            .unwrap()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    #[tokio::test]
    async fn keep_source_only_skips_conversion() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::pages(&[PAGE, PAGE]);

        let secured = secure_with(&source, config(dir.path())).await.unwrap();
        assert_eq!(secured.resources().len(), 2);
        let report = secured.finish(RetentionMode::KeepSourceOnly).await.unwrap();

        assert!(report.artifacts.is_empty());
        assert!(report.document.is_none());
        assert_eq!(report.terminal_index, 3);
        assert_eq!(names(dir.path()), vec!["page_001.svg", "page_002.svg"]);
    }

    #[tokio::test]
    async fn states_follow_the_phase_order() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(StateLog::default());
        let config = PipelineConfig::builder("http://localhost/page/")
            .output_dir(dir.path())
            .dpi(96)
            .system_fonts(false)
            .progress_callback(log.clone())
            .build()
            .unwrap();
        let source = MemorySource::pages(&[PAGE]);

        let report = secure_with(&source, config)
            .await
            .unwrap()
            .finish(RetentionMode::DocumentDeleteAll)
            .await
            .unwrap();

        assert_eq!(report.document.unwrap().page_count(), 1);
        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                RunState::Fetching,
                RunState::Secured,
                RunState::Converting,
                RunState::Assembling,
                RunState::Cleanup,
                RunState::Done,
            ]
        );
        assert_eq!(names(dir.path()), vec!["document.pdf"]);
    }

    #[tokio::test]
    async fn nothing_converted_keeps_secured_files() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::pages(&["<broken", "also broken"]);

        let report = secure_with(&source, config(dir.path()))
            .await
            .unwrap()
            .finish(RetentionMode::DocumentDeleteAll)
            .await
            .unwrap();

        assert!(report.artifacts.is_empty());
        assert!(report.document.is_none());
        assert!(report.cleanup.is_none());
        assert_eq!(report.failures.len(), 2);
        assert_eq!(names(dir.path()), vec!["page_001.svg", "page_002.svg"]);
    }

    #[tokio::test]
    async fn keep_artifact_only_deletes_sources() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::pages(&[PAGE, PAGE, PAGE]);

        let report = secure_with(&source, config(dir.path()))
            .await
            .unwrap()
            .finish(RetentionMode::KeepArtifactOnly)
            .await
            .unwrap();

        assert_eq!(report.artifacts.indices(), vec![1, 2, 3]);
        assert_eq!(report.cleanup.unwrap().deleted.len(), 3);
        assert_eq!(
            names(dir.path()),
            vec!["page_001.png", "page_002.png", "page_003.png"]
        );
    }

    #[test]
    fn state_display() {
        assert_eq!(RunState::Fetching.to_string(), "fetching");
        assert_eq!(RunState::Done.to_string(), "done");
    }
}
