//! Conversion phase: stored SVG resources → PNG artifacts, in parallel.
//!
//! Every resource becomes one job on a [`WorkerPool`]. A job reads the stored
//! bytes, rasterises them and writes the sibling `.png`. Any failure in a job
//! is logged and recorded as an [`ItemError`]; the resource is left out of
//! the result and every other job carries on. Nothing is retried.
//!
//! Jobs finish in arbitrary order. The result is handed on as
//! [`OrderedArtifacts`], whose constructor sorts by index, so the assembler
//! always receives pages in series order.

use crate::config::{OutputLayout, PipelineConfig};
use crate::error::ItemError;
use crate::output::{ArtifactDescriptor, OrderedArtifacts, ResourceDescriptor};
use crate::pipeline::pool::{TaskOutcome, WorkerPool};
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use tracing::{info, warn};

/// Number of concurrent conversions for a machine reporting `parallelism_hint`
/// cores: one less than the hint, but never fewer than two.
pub fn concurrency_cap(parallelism_hint: usize) -> usize {
    parallelism_hint.saturating_sub(1).max(2)
}

/// `concurrency_cap` applied to what the OS reports.
pub fn detected_concurrency() -> usize {
    let hint = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    concurrency_cap(hint)
}

/// Surviving artifacts plus the failures that were absorbed.
#[derive(Debug, Clone, Default)]
pub struct ConversionOutcome {
    pub artifacts: OrderedArtifacts,
    pub failures: Vec<ItemError>,
}

/// Converts resources under a fixed concurrency cap.
#[derive(Clone)]
pub struct ConversionPool {
    rasterizer: Rasterizer,
    capacity: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ConversionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPool")
            .field("rasterizer", &self.rasterizer)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ConversionPool {
    pub fn new(rasterizer: Rasterizer, capacity: usize) -> Self {
        Self {
            rasterizer,
            capacity: capacity.max(1),
            progress: None,
        }
    }

    /// Pool configured from `config`: its DPI, fonts, concurrency override
    /// (or the detected cap) and progress callback.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let capacity = config.concurrency.unwrap_or_else(detected_concurrency);
        Self::new(Rasterizer::new(config.dpi, config.system_fonts), capacity)
            .with_progress(config.progress_callback.clone())
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Convert every resource; returns once all jobs have settled.
    pub async fn convert(&self, resources: &[ResourceDescriptor]) -> ConversionOutcome {
        let total = resources.len();
        info!(
            "Converting {} resources at {} DPI ({} at a time)",
            total,
            self.rasterizer.dpi(),
            self.capacity
        );
        if let Some(ref cb) = self.progress {
            cb.on_conversion_start(total);
        }

        let mut pool: WorkerPool<ArtifactDescriptor, ItemError> = WorkerPool::new(self.capacity);
        for resource in resources {
            let rasterizer = self.rasterizer.clone();
            let resource = resource.clone();
            let progress = self.progress.clone();
            pool.submit(move || {
                let result = convert_one(&rasterizer, &resource);
                if let Some(cb) = progress {
                    match &result {
                        Ok(a) => cb.on_item_complete(a.index, total, a.byte_size),
                        Err(e) => cb.on_item_error(resource.index, total, &e.to_string()),
                    }
                }
                result
            });
        }

        let mut artifacts = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (resource, outcome) in resources.iter().zip(pool.settle_all().await) {
            match outcome {
                TaskOutcome::Succeeded(artifact) => artifacts.push(artifact),
                TaskOutcome::Failed(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
                TaskOutcome::Aborted(detail) => {
                    let e = ItemError::ConversionFailed {
                        index: resource.index,
                        detail,
                    };
                    warn!("{}", e);
                    if let Some(ref cb) = self.progress {
                        cb.on_item_error(resource.index, total, &e.to_string());
                    }
                    failures.push(e);
                }
            }
        }

        let artifacts = OrderedArtifacts::from_unsorted(artifacts);
        info!("Converted {}/{} resources", artifacts.len(), total);
        if let Some(ref cb) = self.progress {
            cb.on_conversion_complete(total, artifacts.len());
        }

        ConversionOutcome {
            artifacts,
            failures,
        }
    }
}

/// Read → rasterise → write for a single resource.
fn convert_one(
    rasterizer: &Rasterizer,
    resource: &ResourceDescriptor,
) -> Result<ArtifactDescriptor, ItemError> {
    let fail = |detail: String| ItemError::ConversionFailed {
        index: resource.index,
        detail,
    };

    let svg = std::fs::read(&resource.storage_path)
        .map_err(|e| fail(format!("read {}: {e}", resource.storage_path.display())))?;
    let png = rasterizer.rasterize(&svg).map_err(|e| fail(e.to_string()))?;

    let path = OutputLayout::artifact_path(&resource.storage_path);
    std::fs::write(&path, &png).map_err(|e| fail(format!("write {}: {e}", path.display())))?;

    Ok(ArtifactDescriptor {
        index: resource.index,
        storage_path: path,
        byte_size: png.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn svg(fill: &str) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="20" height="10" fill="{fill}"/></svg>"#
        )
    }

    fn store(dir: &Path, index: u32, body: &str) -> ResourceDescriptor {
        let layout = OutputLayout::new(dir, "doc.pdf");
        let path = layout.resource_path(index);
        std::fs::write(&path, body).unwrap();
        ResourceDescriptor {
            index,
            storage_path: path,
        }
    }

    #[test]
    fn cap_has_floor_of_two() {
        assert_eq!(concurrency_cap(0), 2);
        assert_eq!(concurrency_cap(1), 2);
        assert_eq!(concurrency_cap(2), 2);
        assert_eq!(concurrency_cap(3), 2);
        assert_eq!(concurrency_cap(8), 7);
        assert!(detected_concurrency() >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_are_isolated_and_result_is_sorted() {
        let dir = TempDir::new().unwrap();
        // Submitted out of order on purpose.
        let resources = vec![
            store(dir.path(), 4, &svg("blue")),
            store(dir.path(), 2, "<not-svg"),
            store(dir.path(), 1, &svg("red")),
            store(dir.path(), 3, &svg("green")),
        ];

        let pool = ConversionPool::new(Rasterizer::new(96, false), 2);
        let outcome = pool.convert(&resources).await;

        assert_eq!(outcome.artifacts.indices(), vec![1, 3, 4]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index(), Some(2));

        for a in outcome.artifacts.iter() {
            assert_eq!(a.storage_path, dir.path().join(format!("page_{:03}.png", a.index)));
            let on_disk = std::fs::metadata(&a.storage_path).unwrap().len();
            assert_eq!(on_disk, a.byte_size);
        }
        assert!(!dir.path().join("page_002.png").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn oversized_page_fails_alone() {
        let dir = TempDir::new().unwrap();
        let resources = vec![
            store(dir.path(), 1, &svg("red")),
            store(
                dir.path(),
                2,
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="200000" height="200000"><rect width="10" height="10"/></svg>"#,
            ),
            store(dir.path(), 3, &svg("green")),
        ];

        let pool = ConversionPool::new(Rasterizer::new(300, false), 2);
        let outcome = pool.convert(&resources).await;

        assert_eq!(outcome.artifacts.indices(), vec![1, 3]);
        assert!(matches!(
            outcome.failures.as_slice(),
            [ItemError::ConversionFailed { index: 2, .. }]
        ));
    }

    #[tokio::test]
    async fn missing_source_file_is_a_conversion_failure() {
        let dir = TempDir::new().unwrap();
        let resources = vec![ResourceDescriptor {
            index: 1,
            storage_path: dir.path().join("page_001.svg"),
        }];

        let pool = ConversionPool::new(Rasterizer::new(96, false), 2);
        let outcome = pool.convert(&resources).await;
        assert!(outcome.artifacts.is_empty());
        assert!(matches!(
            outcome.failures[0],
            ItemError::ConversionFailed { index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_outcome() {
        let pool = ConversionPool::new(Rasterizer::new(96, false), 2);
        let outcome = pool.convert(&[]).await;
        assert!(outcome.artifacts.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
