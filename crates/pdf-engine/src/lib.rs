//! Document collaborators for the annotator: a page renderer that reports
//! page geometry plus a raster, and a writer that paints text runs onto a
//! copy of the source document.

use image::{ImageBuffer, Rgba};
use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

mod writer;

pub use writer::{LopdfWriter, PdfWriter, TextRun};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PAGE_EDGE: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Opaque id of a document opened by a [`PdfEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Intrinsic page size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter; also used when a page carries no readable `MediaBox`
    pub const LETTER: PageSize = PageSize::new(612.0, 792.0);

    pub const fn new(width_pt: f32, height_pt: f32) -> Self {
        Self { width_pt, height_pt }
    }

    /// Pixel dimensions at `scale`, never below one pixel per axis.
    pub fn scaled(self, scale: f32) -> (u32, u32) {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        let width = (self.width_pt * scale).round().max(1.0) as u32;
        let height = (self.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// Which page to render and at what zoom (pixels per point)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

/// Result of a render: the page's intrinsic size and its raster
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_size: PageSize,
    pub raster: RgbaImage,
}

impl RenderedPage {
    /// Raster dimensions in pixels
    pub fn pixel_size(&self) -> (u32, u32) {
        self.raster.dimensions()
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<&Path> for OpenSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("unknown document handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document has no pages")]
    NoPages,
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Page renderer.
///
/// Callers rely on the reported page size and on the pixel dimensions of the
/// returned raster; the pixel contents are opaque to the annotation core.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RenderedPage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

/// Renderer backed by `lopdf`.
///
/// Only page geometry is read from the file; the raster is a blank sheet of
/// the right pixel size with a thin edge so it is visible on white.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    last_handle: u64,
    page_sizes: HashMap<DocumentHandle, Vec<PageSize>>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn sizes(&self, handle: DocumentHandle) -> Result<&[PageSize], PdfEngineError> {
        self.page_sizes
            .get(&handle)
            .map(Vec::as_slice)
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };
        let doc = load_unencrypted(&bytes)?;

        let sizes: Vec<PageSize> =
            doc.get_pages().into_values().map(|page_id| page_size_of(&doc, page_id)).collect();
        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }
        log::debug!("opened document with {} page(s)", sizes.len());

        self.last_handle += 1;
        let handle = DocumentHandle(self.last_handle);
        self.page_sizes.insert(handle, sizes);
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.sizes(handle)?.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> Result<PageSize, PdfEngineError> {
        let sizes = self.sizes(handle)?;
        sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RenderedPage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let (width, height) = page_size.scaled(request.scale);
        Ok(RenderedPage { page_size, raster: blank_sheet(width, height) })
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        match self.page_sizes.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(PdfEngineError::InvalidHandle(handle.raw())),
        }
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

/// Parse a document, refusing encrypted ones up front.
pub(crate) fn load_unencrypted(bytes: &[u8]) -> Result<Document, PdfEngineError> {
    if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }
    Ok(Document::load_mem(bytes)?)
}

fn blank_sheet(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let on_edge = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        if on_edge && width >= 4 && height >= 4 {
            PAGE_EDGE
        } else {
            PAPER
        }
    })
}

/// A page's `MediaBox` in PDF user space, normalised so `left <= right`
/// and `bottom <= top`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MediaBox {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl MediaBox {
    fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { left: x0.min(x1), bottom: y0.min(y1), right: x0.max(x1), top: y0.max(y1) }
    }

    pub fn size(&self) -> PageSize {
        PageSize::new(self.right - self.left, self.top - self.bottom)
    }
}

/// Size of a page, honouring a `MediaBox` inherited from the page tree.
pub(crate) fn page_size_of(doc: &Document, page_id: ObjectId) -> PageSize {
    media_box_of(doc, page_id).size()
}

pub(crate) fn media_box_of(doc: &Document, page_id: ObjectId) -> MediaBox {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };

        let media_box = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| match obj {
                Object::Reference(target) => doc.get_object(*target).ok(),
                other => Some(other),
            })
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| match array.as_slice() {
                [x0, y0, x1, y1] => Some(MediaBox::from_corners(
                    x0.as_float().ok()?,
                    y0.as_float().ok()?,
                    x1.as_float().ok()?,
                    y1.as_float().ok()?,
                )),
                _ => None,
            });

        if let Some(media_box) = media_box {
            return media_box;
        }

        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    MediaBox::from_corners(0.0, 0.0, PageSize::LETTER.width_pt, PageSize::LETTER.height_pt)
}

/// Build a blank, unencrypted PDF with one empty page per entry of `page_sizes`.
pub fn blank_document(page_sizes: &[PageSize]) -> Result<Vec<u8>, PdfEngineError> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = page_sizes
        .iter()
        .map(|size| {
            let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), size.width_pt.into(), size.height_pt.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {},
            });
            Object::Reference(page_id)
        })
        .collect();

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

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|err| PdfEngineError::Backend(err.to_string()))?;
    Ok(buffer)
}
