//! Assembly phase: ordered PNG artifacts → one fixed-page-size PDF.
//!
//! Every artifact gets exactly one page, in the order [`OrderedArtifacts`]
//! provides; the assembler does not sort. Each bitmap is decoded to RGB and
//! embedded as a Flate-compressed image XObject, then drawn full-bleed: the
//! content stream scales the unit image square to the page's width and
//! height, with no margin.
//!
//! If one bitmap cannot be decoded its page stays in the document without an
//! image and the rest carry on. Writing the finished file is different: if
//! that fails the document is unusable and the error is returned.
//!
//! The PDF is built and written on a single blocking thread.

use crate::config::{PageSize, PipelineConfig};
use crate::error::{ItemError, PipelineError};
use crate::output::{ArtifactDescriptor, AssembledDocument, OrderedArtifacts, PageSummary};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of an assembly: the written document and any blank pages.
#[derive(Debug, Clone)]
pub struct AssemblyOutcome {
    pub document: AssembledDocument,
    pub failures: Vec<ItemError>,
}

/// Builds the output document.
#[derive(Debug, Clone)]
pub struct Assembler {
    page_size: PageSize,
    output_path: PathBuf,
}

impl Assembler {
    pub fn new(page_size: PageSize, output_path: impl Into<PathBuf>) -> Self {
        Self {
            page_size,
            output_path: output_path.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.page_size, config.layout.document_path())
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Build and write the document.
    ///
    /// # Errors
    /// - [`PipelineError::NoArtifacts`] (non-fatal) when `artifacts` is empty;
    ///   nothing is written.
    /// - [`PipelineError::DocumentEncodeFailed`] /
    ///   [`PipelineError::DocumentWriteFailed`] when the file cannot be
    ///   produced.
    pub async fn assemble(&self, artifacts: &OrderedArtifacts) -> Result<AssemblyOutcome, PipelineError> {
        if artifacts.is_empty() {
            warn!("No artifacts to assemble; skipping document");
            return Err(PipelineError::NoArtifacts);
        }

        let this = self.clone();
        let artifacts = artifacts.clone();
        tokio::task::spawn_blocking(move || this.assemble_blocking(&artifacts))
            .await
            .map_err(|e| PipelineError::Internal(format!("Assembly task panicked: {e}")))?
    }

    fn assemble_blocking(&self, artifacts: &OrderedArtifacts) -> Result<AssemblyOutcome, PipelineError> {
        let (width, height) = self.page_size.dimensions_pt();
        info!(
            "Assembling {} pages ({}x{} pt) → {}",
            artifacts.len(),
            width,
            height,
            self.output_path.display()
        );

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(artifacts.len());
        let mut pages = Vec::with_capacity(artifacts.len());
        let mut failures = Vec::new();

        for artifact in artifacts {
            let placed = match load_image_xobject(artifact) {
                Ok(stream) => Some(doc.add_object(stream)),
                Err(detail) => {
                    let e = ItemError::PlacementFailed {
                        index: artifact.index,
                        detail,
                    };
                    warn!("{}", e);
                    failures.push(e);
                    None
                }
            };

            let page_id = add_page(&mut doc, pages_id, (width, height), artifact.index, placed).map_err(
                |e| PipelineError::DocumentEncodeFailed {
                    path: self.output_path.clone(),
                    detail: e.to_string(),
                },
            )?;
            kids.push(page_id.into());
            pages.push(PageSummary {
                index: artifact.index,
                image_placed: placed.is_some(),
            });
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let byte_size = self.finalize(&mut doc)?;
        debug!("Wrote {} bytes to {}", byte_size, self.output_path.display());

        Ok(AssemblyOutcome {
            document: AssembledDocument {
                path: self.output_path.clone(),
                page_size: self.page_size,
                pages,
                byte_size,
            },
            failures,
        })
    }

    /// Write the document next to its destination and rename it into place,
    /// so a failed write never leaves a truncated PDF at the final path.
    fn finalize(&self, doc: &mut Document) -> Result<u64, PipelineError> {
        let write_err = |source: std::io::Error| PipelineError::DocumentWriteFailed {
            path: self.output_path.clone(),
            source,
        };

        let dir = self
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;

        {
            let mut writer = BufWriter::new(tmp.as_file());
            doc.save_to(&mut writer)
                .map_err(|e| write_err(std::io::Error::other(e.to_string())))?;
            writer.flush().map_err(write_err)?;
        }
        tmp.as_file().sync_all().map_err(write_err)?;

        let file = tmp
            .persist(&self.output_path)
            .map_err(|e| write_err(e.error))?;
        let size = file.metadata().map_err(write_err)?.len();
        Ok(size)
    }
}

/// Decode a PNG artifact into an RGB image XObject.
fn load_image_xobject(artifact: &ArtifactDescriptor) -> Result<Stream, String> {
    let img = image::open(&artifact.storage_path)
        .map_err(|e| format!("{}: {e}", artifact.storage_path.display()))?
        .to_rgb8();
    let (w, h) = img.dimensions();

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(w),
            "Height" => i64::from(h),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        },
        img.into_raw(),
    );
    stream
        .compress()
        .map_err(|e| format!("compress image {}: {e}", artifact.index))?;
    Ok(stream)
}

/// XObject resource name for the image shown on an artifact's page.
pub fn image_name(index: u32) -> String {
    format!("Im{index}")
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    (width, height): (u32, u32),
    index: u32,
    image: Option<ObjectId>,
) -> lopdf::Result<ObjectId> {
    let (w, h) = (i64::from(width), i64::from(height));

    let mut operations = Vec::new();
    let mut resources = lopdf::Dictionary::new();
    if let Some(image_id) = image {
        let name = image_name(index);
        // Image space is the unit square; scale it to the full page.
        operations = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()]),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ];
        resources.set("XObject", dictionary! { name => image_id });
    }

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Contents" => content_id,
        "Resources" => resources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn png_artifact(dir: &Path, index: u32) -> ArtifactDescriptor {
        let path = dir.join(format!("page_{index:03}.png"));
        RgbImage::from_pixel(4, 6, Rgb([index as u8 * 40, 0, 0]))
            .save(&path)
            .unwrap();
        let byte_size = std::fs::metadata(&path).unwrap().len();
        ArtifactDescriptor {
            index,
            storage_path: path,
            byte_size,
        }
    }

    /// XObject names drawn on each page, in page order.
    fn page_image_names(path: &Path) -> Vec<Option<String>> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let page = doc.get_dictionary(page_id).unwrap();
                let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
                resources.get(b"XObject").ok().map(|x| {
                    let names: Vec<String> = x
                        .as_dict()
                        .unwrap()
                        .iter()
                        .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
                        .collect();
                    names.join(",")
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn one_page_per_artifact_in_given_order() {
        let dir = TempDir::new().unwrap();
        let artifacts = OrderedArtifacts::from_unsorted(vec![
            png_artifact(dir.path(), 3),
            png_artifact(dir.path(), 1),
            png_artifact(dir.path(), 2),
        ]);
        let out = dir.path().join("doc.pdf");

        let outcome = Assembler::new(PageSize::A4, &out)
            .assemble(&artifacts)
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.document.page_indices(), vec![1, 2, 3]);
        assert_eq!(
            page_image_names(&out),
            vec![
                Some("Im1".to_string()),
                Some("Im2".to_string()),
                Some("Im3".to_string())
            ]
        );
        assert_eq!(
            outcome.document.byte_size,
            std::fs::metadata(&out).unwrap().len()
        );
    }

    #[tokio::test]
    async fn pages_use_fixed_geometry() {
        let dir = TempDir::new().unwrap();
        let artifacts = OrderedArtifacts::from_unsorted(vec![png_artifact(dir.path(), 1)]);
        let out = dir.path().join("doc.pdf");

        Assembler::new(PageSize::Letter, &out)
            .assemble(&artifacts)
            .await
            .unwrap();

        let doc = Document::load(&out).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let media_box = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_i64().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(media_box, vec![0, 0, 612, 792]);
    }

    #[tokio::test]
    async fn unreadable_bitmap_leaves_blank_page() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("page_002.png");
        std::fs::write(&broken, b"not a png").unwrap();
        let artifacts = OrderedArtifacts::from_unsorted(vec![
            png_artifact(dir.path(), 1),
            ArtifactDescriptor {
                index: 2,
                storage_path: broken,
                byte_size: 9,
            },
            png_artifact(dir.path(), 3),
        ]);
        let out = dir.path().join("doc.pdf");

        let outcome = Assembler::new(PageSize::A4, &out)
            .assemble(&artifacts)
            .await
            .unwrap();

        assert_eq!(outcome.document.page_count(), 3);
        assert_eq!(
            outcome
                .document
                .pages
                .iter()
                .map(|p| p.image_placed)
                .collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert!(matches!(
            outcome.failures.as_slice(),
            [ItemError::PlacementFailed { index: 2, .. }]
        ));
        assert_eq!(
            page_image_names(&out),
            vec![Some("Im1".to_string()), None, Some("Im3".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_input_produces_no_document() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("doc.pdf");

        let err = Assembler::new(PageSize::A4, &out)
            .assemble(&OrderedArtifacts::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoArtifacts));
        assert!(!err.is_fatal());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn unwritable_destination_is_fatal() {
        let dir = TempDir::new().unwrap();
        let artifacts = OrderedArtifacts::from_unsorted(vec![png_artifact(dir.path(), 1)]);
        // The destination's parent does not exist.
        let out = dir.path().join("missing").join("doc.pdf");

        let err = Assembler::new(PageSize::A4, &out)
            .assemble(&artifacts)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::DocumentWriteFailed { .. }), "got {err:?}");
        assert!(err.is_fatal());
    }
}
