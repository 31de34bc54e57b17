//! Descriptors passed between phases and the report returned by a run.

use crate::config::PageSize;
use crate::error::ItemError;
use crate::pipeline::fetch::AbsentReason;
use crate::pipeline::retention::RetentionMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A resource that was fetched and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// 1-based position in the remote series.
    pub index: u32,
    pub storage_path: PathBuf,
}

/// The bitmap produced from one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Index of the resource this bitmap was rendered from.
    pub index: u32,
    pub storage_path: PathBuf,
    pub byte_size: u64,
}

/// Artifacts in ascending `index` order, one per index.
///
/// Conversion finishes in arbitrary order; this type is the only way to hand
/// artifacts to the assembler, and its constructor is where order is
/// restored. The assembler never sorts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedArtifacts(Vec<ArtifactDescriptor>);

impl OrderedArtifacts {
    /// Sort by index. Later duplicates of an index are dropped.
    pub fn from_unsorted(mut artifacts: Vec<ArtifactDescriptor>) -> Self {
        artifacts.sort_by_key(|a| a.index);
        artifacts.dedup_by_key(|a| a.index);
        Self(artifacts)
    }

    pub fn as_slice(&self) -> &[ArtifactDescriptor] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.0.iter().map(|a| a.index).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArtifactDescriptor> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a OrderedArtifacts {
    type Item = &'a ArtifactDescriptor;
    type IntoIter = std::slice::Iter<'a, ArtifactDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One page of the assembled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// Artifact index shown on this page.
    pub index: u32,
    /// `false` when the bitmap could not be placed and the page is blank.
    pub image_placed: bool,
}

/// A finished, written document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledDocument {
    pub path: PathBuf,
    pub page_size: PageSize,
    pub pages: Vec<PageSummary>,
    pub byte_size: u64,
}

impl AssembledDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Artifact indices in page order.
    pub fn page_indices(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.index).collect()
    }
}

/// What the retention step removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    /// Paths that were already gone.
    pub missing: Vec<PathBuf>,
    pub failures: Vec<ItemError>,
}

/// Wall-clock timings for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub fetch_duration_ms: u64,
    pub conversion_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RetentionMode,
    pub resources: Vec<ResourceDescriptor>,
    /// First index that was absent.
    pub terminal_index: u32,
    /// Why the walk stopped there.
    pub terminal_reason: AbsentReason,
    pub artifacts: OrderedArtifacts,
    pub document: Option<AssembledDocument>,
    /// Recovered per-item failures, in the order they were observed.
    pub failures: Vec<ItemError>,
    /// `None` when the cleanup phase was skipped.
    pub cleanup: Option<CleanupReport>,
    pub stats: RunStats,
}
