//! Configuration types for a fetch → rasterise → assemble run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. The config is passed by reference into every
//! phase; nothing in the library reads process-wide state.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// SVG user units are defined at 96 per inch.
pub const SVG_USER_UNITS_PER_INCH: f32 = 96.0;

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use svgstack::{PageSize, PipelineConfig};
///
/// let config = PipelineConfig::builder("https://example.com/slides")
///     .output_dir("out")
///     .page_size(PageSize::Letter)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "https://example.com/slides/");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Endpoint prefix; resource `n` lives at `{base_url}{n}`. Always ends with `/`.
    pub base_url: String,

    /// Where resources, bitmaps and the document are written.
    pub layout: OutputLayout,

    /// Rasterisation density. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Fixed number of concurrent conversions. `None` derives it from the
    /// machine's available parallelism (see [`crate::pipeline::convert::concurrency_cap`]).
    pub concurrency: Option<usize>,

    /// Geometry of every page in the assembled document. Default: A4.
    pub page_size: PageSize,

    /// Per-request timeout for the fetch walk. Default: none; a hanging
    /// request stalls the walk.
    pub request_timeout_secs: Option<u64>,

    /// Load the host's fonts so `<text>` elements render. Default: true.
    pub system_fonts: bool,

    /// Receives per-phase and per-item events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_url", &self.base_url)
            .field("layout", &self.layout)
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("system_fonts", &self.system_fonts)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for the given base URL.
    pub fn builder(base_url: impl Into<String>) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            base_url: base_url.into(),
            output_dir: PathBuf::from("output"),
            document_name: String::from(DEFAULT_DOCUMENT_NAME),
            dpi: 300,
            concurrency: None,
            page_size: PageSize::default(),
            request_timeout_secs: None,
            system_fonts: true,
            progress_callback: None,
        }
    }
}

const DEFAULT_DOCUMENT_NAME: &str = "document.pdf";

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    base_url: String,
    output_dir: PathBuf,
    document_name: String,
    dpi: u32,
    concurrency: Option<usize>,
    page_size: PageSize,
    request_timeout_secs: Option<u64>,
    system_fonts: bool,
    progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfigBuilder")
            .field("base_url", &self.base_url)
            .field("output_dir", &self.output_dir)
            .field("document_name", &self.document_name)
            .field("dpi", &self.dpi)
            .finish_non_exhaustive()
    }
}

impl PipelineConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn document_name(mut self, name: impl Into<String>) -> Self {
        self.document_name = name.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.page_size = size;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn system_fonts(mut self, v: bool) -> Self {
        self.system_fonts = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let base_url = normalize_base_url(&self.base_url)?;

        if !(72..=600).contains(&self.dpi) {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                self.dpi
            )));
        }
        if self.concurrency == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        let name = self.document_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(PipelineError::InvalidConfig(format!(
                "Document name must be a plain file name, got '{}'",
                self.document_name
            )));
        }
        let (w, h) = self.page_size.dimensions_pt();
        if w == 0 || h == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "Page size must be non-zero, got {w}x{h} pt"
            )));
        }

        Ok(PipelineConfig {
            base_url,
            layout: OutputLayout::new(self.output_dir, name),
            dpi: self.dpi,
            concurrency: self.concurrency,
            page_size: self.page_size,
            request_timeout_secs: self.request_timeout_secs,
            system_fonts: self.system_fonts,
            progress_callback: self.progress_callback,
        })
    }
}

/// Check if the input string uses an accepted scheme.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Validate the scheme and make sure the URL ends with exactly one `/`.
pub fn normalize_base_url(input: &str) -> Result<String, PipelineError> {
    let trimmed = input.trim();
    let host_and_path = trimmed.split_once("://").map(|(_, rest)| rest);
    if !is_url(trimmed) || host_and_path.is_none_or(str::is_empty) {
        return Err(PipelineError::InvalidBaseUrl {
            url: input.to_string(),
        });
    }
    let mut url = trimmed.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    Ok(url)
}

// ── Filesystem layout ────────────────────────────────────────────────────

/// Deterministic paths for everything a run writes.
///
/// Resource `n` is stored as `page_NNN.svg` and its bitmap as the sibling
/// `page_NNN.png`. The document sits next to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    dir: PathBuf,
    document_name: String,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>, document_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            document_name: document_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the raw resource at `index`.
    pub fn resource_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("page_{index:03}.svg"))
    }

    /// Sibling bitmap path for a stored resource.
    pub fn artifact_path(resource_path: &Path) -> PathBuf {
        resource_path.with_extension("png")
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join(&self.document_name)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Page geometry, in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// 210 × 297 mm (default).
    #[default]
    A4,
    /// 8.5 × 11 in.
    Letter,
    /// Any other size.
    Custom { width_pt: u32, height_pt: u32 },
}

impl PageSize {
    /// `(width, height)` in points.
    pub fn dimensions_pt(&self) -> (u32, u32) {
        match self {
            PageSize::A4 => (595, 842),
            PageSize::Letter => (612, 792),
            PageSize::Custom {
                width_pt,
                height_pt,
            } => (*width_pt, *height_pt),
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = PipelineError;

    /// `a4`, `letter`, or `WIDTHxHEIGHT` in points (e.g. `720x405`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "a4" => return Ok(PageSize::A4),
            "letter" => return Ok(PageSize::Letter),
            _ => {}
        }
        let invalid = || {
            PipelineError::InvalidConfig(format!(
                "Page size must be a4, letter or WIDTHxHEIGHT in points, got '{s}'"
            ))
        };
        let (w, h) = lower.split_once('x').ok_or_else(invalid)?;
        let width_pt = w.trim().parse().map_err(|_| invalid())?;
        let height_pt = h.trim().parse().map_err(|_| invalid())?;
        Ok(PageSize::Custom {
            width_pt,
            height_pt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/svg/"));
        assert!(is_url("http://example.com/svg"));
        assert!(!is_url("ftp://example.com/svg"));
        assert!(!is_url("example.com/svg"));
        assert!(!is_url(""));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://example.com/deck").unwrap(),
            "https://example.com/deck/"
        );
        assert_eq!(
            normalize_base_url("https://example.com/deck/").unwrap(),
            "https://example.com/deck/"
        );
    }

    #[test]
    fn base_url_rejects_bad_scheme() {
        let err = normalize_base_url("file:///tmp/deck").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBaseUrl { .. }));
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("https://").is_err());
        assert!(normalize_base_url("ftp://example.com/deck").is_err());
        assert!(normalize_base_url("http:/example.com/deck").is_err());
    }

    #[test]
    fn builder_defaults() {
        let config = PipelineConfig::builder("http://localhost:8080/p")
            .build()
            .unwrap();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.concurrency, None);
        assert_eq!(config.page_size, PageSize::A4);
        assert_eq!(config.request_timeout_secs, None);
        assert_eq!(config.base_url, "http://localhost:8080/p/");
        assert_eq!(
            config.layout.document_path(),
            PathBuf::from("output/document.pdf")
        );
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(PipelineConfig::builder("https://x.test/").dpi(40).build().is_err());
        assert!(PipelineConfig::builder("https://x.test/")
            .concurrency(0)
            .build()
            .is_err());
        assert!(PipelineConfig::builder("https://x.test/")
            .document_name("../escape.pdf")
            .build()
            .is_err());
        assert!(PipelineConfig::builder("https://x.test/")
            .page_size(PageSize::Custom {
                width_pt: 0,
                height_pt: 100
            })
            .build()
            .is_err());
    }

    #[test]
    fn layout_paths_are_zero_padded_siblings() {
        let layout = OutputLayout::new("/data/run", "book.pdf");
        let raw = layout.resource_path(7);
        assert_eq!(raw, PathBuf::from("/data/run/page_007.svg"));
        assert_eq!(
            OutputLayout::artifact_path(&raw),
            PathBuf::from("/data/run/page_007.png")
        );
        assert_eq!(
            layout.resource_path(1234),
            PathBuf::from("/data/run/page_1234.svg")
        );
        assert_eq!(layout.document_path(), PathBuf::from("/data/run/book.pdf"));
    }

    #[test]
    fn page_sizes() {
        assert_eq!(PageSize::A4.dimensions_pt(), (595, 842));
        assert_eq!(PageSize::Letter.dimensions_pt(), (612, 792));
        assert_eq!(
            PageSize::Custom {
                width_pt: 720,
                height_pt: 405
            }
            .dimensions_pt(),
            (720, 405)
        );
    }

    #[test]
    fn page_size_from_str() {
        assert_eq!("A4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert_eq!(" letter ".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!(
            "720x405".parse::<PageSize>().unwrap(),
            PageSize::Custom {
                width_pt: 720,
                height_pt: 405
            }
        );
        assert!("legal".parse::<PageSize>().is_err());
        assert!("720x".parse::<PageSize>().is_err());
        assert!("-1x10".parse::<PageSize>().is_err());
    }
}
