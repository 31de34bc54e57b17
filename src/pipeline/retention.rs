//! Retention: which phases a run performs and which files it keeps.
//!
//! A run always secures the raw resources first. The [`RetentionMode`] then
//! decides whether bitmaps and a document are produced and which
//! intermediates are deleted afterwards. Deletions are independent: each path
//! is checked for existence and removed on its own, and a failure is recorded
//! without stopping the others.

use crate::error::{ItemError, PipelineError};
use crate::output::{ArtifactDescriptor, CleanupReport, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// The six retention policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionMode {
    /// Keep the raw SVGs only; no conversion.
    KeepSourceOnly,
    /// Convert, then delete the raw SVGs.
    KeepArtifactOnly,
    /// Convert and keep both SVGs and PNGs.
    KeepBoth,
    /// Build the document, then delete SVGs and PNGs.
    DocumentDeleteAll,
    /// Build the document, keep the PNGs.
    DocumentKeepArtifact,
    /// Build the document, keep everything.
    DocumentKeepBoth,
}

impl RetentionMode {
    /// All modes, in menu order (selection `1` is the first).
    pub const ALL: [RetentionMode; 6] = [
        RetentionMode::KeepSourceOnly,
        RetentionMode::KeepArtifactOnly,
        RetentionMode::KeepBoth,
        RetentionMode::DocumentDeleteAll,
        RetentionMode::DocumentKeepArtifact,
        RetentionMode::DocumentKeepBoth,
    ];

    /// Whether resources are rasterised.
    pub fn converts(self) -> bool {
        !matches!(self, RetentionMode::KeepSourceOnly)
    }

    /// Whether a document is assembled.
    pub fn assembles(self) -> bool {
        matches!(
            self,
            RetentionMode::DocumentDeleteAll
                | RetentionMode::DocumentKeepArtifact
                | RetentionMode::DocumentKeepBoth
        )
    }

    pub fn keeps_sources(self) -> bool {
        matches!(
            self,
            RetentionMode::KeepSourceOnly | RetentionMode::KeepBoth | RetentionMode::DocumentKeepBoth
        )
    }

    pub fn keeps_artifacts(self) -> bool {
        !matches!(self, RetentionMode::DocumentDeleteAll)
    }

    /// Whether anything is deleted at all.
    pub fn cleans_up(self) -> bool {
        !self.keeps_sources() || !self.keeps_artifacts()
    }

    /// 1-based menu number.
    pub fn selection_number(self) -> usize {
        Self::ALL.iter().position(|m| *m == self).map_or(0, |i| i + 1)
    }

    /// Stable machine name, also accepted by [`RetentionMode::from_selection`].
    pub fn name(self) -> &'static str {
        match self {
            RetentionMode::KeepSourceOnly => "keep-source-only",
            RetentionMode::KeepArtifactOnly => "keep-artifact-only",
            RetentionMode::KeepBoth => "keep-both",
            RetentionMode::DocumentDeleteAll => "document-delete-all",
            RetentionMode::DocumentKeepArtifact => "document-keep-artifact",
            RetentionMode::DocumentKeepBoth => "document-keep-both",
        }
    }

    /// Menu text.
    pub fn label(self) -> &'static str {
        match self {
            RetentionMode::KeepSourceOnly => "Keep SVG files only",
            RetentionMode::KeepArtifactOnly => "Convert to PNG, keep PNG files only",
            RetentionMode::KeepBoth => "Convert to PNG, keep SVG and PNG files",
            RetentionMode::DocumentDeleteAll => "Build PDF, delete SVG and PNG files",
            RetentionMode::DocumentKeepArtifact => "Build PDF, keep PNG files",
            RetentionMode::DocumentKeepBoth => "Build PDF, keep SVG and PNG files",
        }
    }

    /// Parse a menu number (`"1"`–`"6"`) or a mode name.
    pub fn from_selection(input: &str) -> Result<Self, PipelineError> {
        let s = input.trim();
        let invalid = || PipelineError::InvalidMode {
            selection: input.to_string(),
        };

        if let Ok(n) = s.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| Self::ALL.get(i).copied())
                .ok_or_else(invalid);
        }

        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RetentionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_selection(s)
    }
}

/// Files `mode` does not keep.
pub fn paths_to_delete(
    mode: RetentionMode,
    resources: &[ResourceDescriptor],
    artifacts: &[ArtifactDescriptor],
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if !mode.keeps_sources() {
        paths.extend(resources.iter().map(|r| r.storage_path.clone()));
    }
    if !mode.keeps_artifacts() {
        paths.extend(artifacts.iter().map(|a| a.storage_path.clone()));
    }
    paths
}

/// Delete whatever `mode` does not keep.
pub async fn apply_retention(
    mode: RetentionMode,
    resources: &[ResourceDescriptor],
    artifacts: &[ArtifactDescriptor],
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let paths = paths_to_delete(mode, resources, artifacts);
    if paths.is_empty() {
        debug!("Mode {} keeps every file", mode);
        return report;
    }

    info!("Cleaning up {} files for mode {}", paths.len(), mode);
    for path in paths {
        match tokio::fs::try_exists(&path).await {
            Ok(false) => {
                debug!("Already gone: {}", path.display());
                report.missing.push(path);
                continue;
            }
            Ok(true) => {}
            Err(e) => {
                let e = ItemError::CleanupFailed {
                    path,
                    detail: e.to_string(),
                };
                warn!("{}", e);
                report.failures.push(e);
                continue;
            }
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.deleted.push(path),
            Err(e) => {
                let e = ItemError::CleanupFailed {
                    path,
                    detail: e.to_string(),
                };
                warn!("{}", e);
                report.failures.push(e);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn files(dir: &Path, n: u32) -> (Vec<ResourceDescriptor>, Vec<ArtifactDescriptor>) {
        let mut resources = Vec::new();
        let mut artifacts = Vec::new();
        for index in 1..=n {
            let svg = dir.join(format!("page_{index:03}.svg"));
            let png = dir.join(format!("page_{index:03}.png"));
            std::fs::write(&svg, b"<svg/>").unwrap();
            std::fs::write(&png, b"png").unwrap();
            resources.push(ResourceDescriptor {
                index,
                storage_path: svg,
            });
            artifacts.push(ArtifactDescriptor {
                index,
                storage_path: png,
                byte_size: 3,
            });
        }
        (resources, artifacts)
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn selection_numbers_and_names() {
        for (i, mode) in RetentionMode::ALL.into_iter().enumerate() {
            assert_eq!(mode.selection_number(), i + 1);
            assert_eq!(RetentionMode::from_selection(&(i + 1).to_string()).unwrap(), mode);
            assert_eq!(RetentionMode::from_selection(mode.name()).unwrap(), mode);
            assert_eq!(mode.to_string().parse::<RetentionMode>().unwrap(), mode);
        }
        assert_eq!(
            RetentionMode::from_selection(" 4\n").unwrap(),
            RetentionMode::DocumentDeleteAll
        );
    }

    #[test]
    fn invalid_selections() {
        for bad in ["0", "7", "-1", "", "all", "keep"] {
            let err = RetentionMode::from_selection(bad).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidMode { .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn phase_table() {
        use RetentionMode::*;
        let table = [
            // mode, converts, assembles, keeps sources, keeps artifacts
            (KeepSourceOnly, false, false, true, true),
            (KeepArtifactOnly, true, false, false, true),
            (KeepBoth, true, false, true, true),
            (DocumentDeleteAll, true, true, false, false),
            (DocumentKeepArtifact, true, true, false, true),
            (DocumentKeepBoth, true, true, true, true),
        ];
        for (mode, converts, assembles, sources, artifacts) in table {
            assert_eq!(mode.converts(), converts, "{mode}");
            assert_eq!(mode.assembles(), assembles, "{mode}");
            assert_eq!(mode.keeps_sources(), sources, "{mode}");
            assert_eq!(mode.keeps_artifacts(), artifacts, "{mode}");
        }
        assert!(!KeepBoth.cleans_up());
        assert!(DocumentDeleteAll.cleans_up());
    }

    #[tokio::test]
    async fn delete_all_removes_sources_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let (resources, artifacts) = files(dir.path(), 3);
        std::fs::write(dir.path().join("document.pdf"), b"%PDF").unwrap();

        let report = apply_retention(RetentionMode::DocumentDeleteAll, &resources, &artifacts).await;

        assert_eq!(report.deleted.len(), 6);
        assert!(report.failures.is_empty());
        assert_eq!(count_files(dir.path()), 1);
        assert!(dir.path().join("document.pdf").exists());
    }

    #[tokio::test]
    async fn keep_both_leaves_two_files_per_index() {
        let dir = TempDir::new().unwrap();
        let (resources, artifacts) = files(dir.path(), 3);

        let report = apply_retention(RetentionMode::KeepBoth, &resources, &artifacts).await;

        assert!(report.deleted.is_empty());
        assert_eq!(count_files(dir.path()), 6);
    }

    #[tokio::test]
    async fn missing_files_do_not_block_others() {
        let dir = TempDir::new().unwrap();
        let (resources, artifacts) = files(dir.path(), 3);
        std::fs::remove_file(&resources[1].storage_path).unwrap();

        let report = apply_retention(RetentionMode::KeepArtifactOnly, &resources, &artifacts).await;

        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.missing, vec![resources[1].storage_path.clone()]);
        assert_eq!(count_files(dir.path()), 3);
    }

    #[tokio::test]
    async fn failed_deletion_is_recorded_and_others_proceed() {
        let dir = TempDir::new().unwrap();
        let (mut resources, artifacts) = files(dir.path(), 2);
        // A directory where a file is expected cannot be removed with remove_file.
        let stuck = dir.path().join("stuck.svg");
        std::fs::create_dir(&stuck).unwrap();
        resources.insert(
            0,
            ResourceDescriptor {
                index: 99,
                storage_path: stuck.clone(),
            },
        );

        let report = apply_retention(RetentionMode::DocumentKeepArtifact, &resources, &artifacts).await;

        assert_eq!(report.deleted.len(), 2);
        assert!(matches!(
            report.failures.as_slice(),
            [ItemError::CleanupFailed { path, .. }] if *path == stuck
        ));
    }
}
