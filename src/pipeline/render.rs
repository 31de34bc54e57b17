//! SVG rasterisation: SVG bytes → lossless PNG bytes.
//!
//! ## Why a fixed density?
//!
//! SVG has no pixels; its user units are defined at 96 per inch. Rendering at
//! `dpi / 96` scale gives every page the same physical resolution regardless
//! of how the source declared its size, so a 300 DPI page placed on an A4
//! sheet prints crisply. The scale is uniform, which keeps aspect ratio.
//!
//! ## Why PNG with `Best` compression?
//!
//! The bitmap is an intermediate that may be kept on disk, so size matters,
//! but text and line art must stay sharp. PNG is lossless; `Best` with
//! adaptive filtering trades CPU for the smallest files without touching
//! pixels. Transparent areas are flattened onto white first so the document
//! does not show black where the SVG had no background.
//!
//! Everything here is blocking and CPU-bound; callers run it on a worker
//! thread.

use crate::config::SVG_USER_UNITS_PER_INCH;
use crate::error::RenderError;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use std::sync::Arc;
use tracing::debug;

/// Largest canvas, in pixels, a single page may allocate: roughly an A2
/// sheet at 600 DPI. Larger declared sizes are rejected before allocation.
pub const MAX_CANVAS_PIXELS: u64 = 140_000_000;

/// Shared SVG → PNG renderer.
///
/// Cheap to clone; the font database is shared between clones.
#[derive(Clone)]
pub struct Rasterizer {
    dpi: u32,
    fontdb: Arc<fontdb::Database>,
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("dpi", &self.dpi)
            .field("fonts", &self.fontdb.len())
            .finish()
    }
}

impl Rasterizer {
    /// Create a renderer. `system_fonts` loads the host's fonts so `<text>`
    /// renders; without it, text elements are skipped.
    pub fn new(dpi: u32, system_fonts: bool) -> Self {
        let mut db = fontdb::Database::new();
        if system_fonts {
            db.load_system_fonts();
            debug!("Loaded {} font faces", db.len());
        }
        Self {
            dpi,
            fontdb: Arc::new(db),
        }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn scale(&self) -> f32 {
        self.dpi as f32 / SVG_USER_UNITS_PER_INCH
    }

    /// Render `svg` and encode it as PNG.
    pub fn rasterize(&self, svg: &[u8]) -> Result<Vec<u8>, RenderError> {
        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&self.fontdb);

        let tree = usvg::Tree::from_data(svg, &options).map_err(|e| RenderError::Parse(e.to_string()))?;

        let scale = self.scale();
        let size = tree.size();
        let width = (size.width() * scale).ceil() as u32;
        let height = (size.height() * scale).ceil() as u32;

        if u64::from(width) * u64::from(height) > MAX_CANVAS_PIXELS {
            return Err(RenderError::Canvas { width, height });
        }
        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;
        pixmap.fill(Color::WHITE);
        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        debug!("Rasterised SVG → {}x{} px at {} DPI", width, height, self.dpi);
        encode_png(&pixmap)
    }
}

/// Encode an opaque pixmap as RGB PNG.
fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, RenderError> {
    // The pixmap was filled with opaque white, so premultiplied == straight
    // RGB and alpha is always 255.
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive).write_image(
        &rgb,
        pixmap.width(),
        pixmap.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}
