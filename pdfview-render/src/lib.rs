use std::collections::HashMap;
use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, Pixel, Rgba, RgbaImage};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfview_core::{
    document_id_for_path, DisplayList, DocumentBackend, DocumentInfo, DocumentMetadata,
    DocumentProvider, LinkEntry, LinkTarget, PageHandle, Quad, RawPixmap, Rect, Rotation, Size,
    TocEntry, Transform,
};
use tracing::{debug, instrument, warn};

/// Translucent yellow laid over search hits.
const HIGHLIGHT: Rgba<u8> = Rgba([255, 214, 0, 110]);

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        debug!(pages = info.page_count, title = ?info.metadata.title, "pdf opened");
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            info,
        )))
    }
}

/// Per-page state the viewer layers on top of the file.
#[derive(Default)]
struct Overlays {
    rotations: HashMap<usize, Rotation>,
    highlights: HashMap<usize, Vec<Quad>>,
}

struct PdfiumDocument {
    document: Mutex<Option<PdfDocument<'static>>>,
    overlays: Mutex<Overlays>,
    info: DocumentInfo,
    path: PathBuf,
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            overlays: Mutex::new(Overlays::default()),
            info,
            path,
            pdfium,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`.
        // Struct fields drop in declaration order, so `self.document` is
        // dropped while `self.pdfium` still holds its reference.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        match guard.as_ref() {
            Some(document) => f(document),
            None => Err(anyhow!("document {:?} is not loaded", self.path)),
        }
    }

    fn with_page<R, F>(&self, index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let page_index: PdfPageIndex = index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", index))?;
            let page = document
                .pages()
                .get(page_index)
                .with_context(|| format!("page {} out of range", index))?;
            f(&page)
        })
    }

    fn rotation(&self, index: usize) -> Rotation {
        self.overlays
            .lock()
            .rotations
            .get(&index)
            .copied()
            .unwrap_or_default()
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn load_page(&self, index: usize) -> Result<PageHandle> {
        let (size, label) = self.with_page(index, |page| {
            let size = Size::new(page.width().value, page.height().value);
            Ok((size, page.label().map(str::to_owned)))
        })?;
        Ok(PageHandle {
            index,
            size,
            rotation: self.rotation(index),
            label,
        })
    }

    /// pdfium has no display-list primitive: the cached list only carries page
    /// metadata and highlights, and `rasterize` renders the page afresh.
    fn build_display_list(&self, page: &PageHandle) -> Result<DisplayList> {
        let highlights = self
            .overlays
            .lock()
            .highlights
            .get(&page.index)
            .cloned()
            .unwrap_or_default();
        Ok(DisplayList::new(page).with_annotations(highlights))
    }

    #[instrument(skip(self, list), fields(page = list.page_index()))]
    fn rasterize(&self, list: &DisplayList, transform: &Transform, alpha: bool) -> Result<RawPixmap> {
        let index = list.page_index();
        let scale = transform.scale_factor().max(0.01);
        let config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .rotate(pdfium_rotation(list.rotation()), true);

        let mut image = self.with_page(index, |page| {
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", index))?;
            Ok(bitmap.as_image().to_rgba8())
        })?;

        for quad in list.annotations() {
            let display = list.rotation().map_rect(quad.bounds(), list.page_size());
            paint_highlight(&mut image, &scale_rect(&display, scale));
        }

        let (width, height) = image.dimensions();
        let (channels, samples) = if alpha {
            (4, image.into_raw())
        } else {
            (3, DynamicImage::ImageRgba8(image).to_rgb8().into_raw())
        };
        Ok(RawPixmap {
            width,
            height,
            channels,
            samples,
        })
    }

    fn search_text(&self, page: &PageHandle, query: &str) -> Result<Vec<Quad>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let page_height = page.size.height;
        self.with_page(page.index, |pdf_page| {
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page.index))?;
            let search = text
                .search(query, &PdfSearchOptions::new())
                .with_context(|| format!("failed to search page {}", page.index))?;

            let mut quads = Vec::new();
            while let Some(segments) = search.find_next() {
                for segment in segments.iter() {
                    let rect = from_pdf_rect(&segment.bounds(), page_height);
                    if rect.is_valid() {
                        quads.push(Quad::from_rect(rect));
                    }
                }
            }
            Ok(quads)
        })
    }

    fn extract_text_in_region(&self, page: &PageHandle, region: &Rect) -> Result<String> {
        let bounds = to_pdf_rect(region, page.size.height);
        self.with_page(page.index, |pdf_page| {
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page.index))?;
            Ok(text.inside_rect(bounds))
        })
    }

    fn insert_highlight(&self, page: &PageHandle, region: &Quad) -> Result<()> {
        self.overlays
            .lock()
            .highlights
            .entry(page.index)
            .or_default()
            .push(*region);
        Ok(())
    }

    fn clear_annotations(&self, page: &PageHandle) -> Result<()> {
        self.overlays.lock().highlights.remove(&page.index);
        Ok(())
    }

    fn set_rotation(&self, page_index: usize, rotation: Rotation) -> Result<()> {
        if page_index >= self.info.page_count {
            return Err(anyhow!("page {} out of range", page_index));
        }
        self.overlays.lock().rotations.insert(page_index, rotation);
        Ok(())
    }

    fn table_of_contents(&self) -> Result<Vec<TocEntry>> {
        self.with_document(|document| {
            let mut entries = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, 1, &mut entries);
            }
            Ok(entries)
        })
    }

    fn links(&self, page: &PageHandle) -> Result<Vec<LinkEntry>> {
        let page_height = page.size.height;
        self.with_page(page.index, |pdf_page| {
            let mut entries = Vec::new();
            for link in pdf_page.links().iter() {
                let hotspot = match link.rect() {
                    Ok(rect) => from_pdf_rect(&rect, page_height),
                    Err(err) => {
                        warn!(
                            ?err,
                            page = page.index,
                            path = %self.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };
                if !hotspot.is_valid() {
                    continue;
                }
                let Some(target) = link_target(&link) else {
                    continue;
                };
                entries.push(LinkEntry {
                    page_index: page.index,
                    hotspot,
                    target,
                    text: None,
                });
            }
            Ok(entries)
        })
    }
}

fn link_target(link: &PdfLink<'_>) -> Option<LinkTarget> {
    if let Some(action) = link.action() {
        match action.action_type() {
            PdfActionType::GoToDestinationInSameDocument => {
                if let Some(page) = action
                    .as_local_destination_action()
                    .and_then(|local| local.destination().ok())
                    .and_then(|destination| destination.page_index().ok())
                {
                    return Some(LinkTarget::GoTo {
                        page: page as usize,
                        location: None,
                    });
                }
            }
            PdfActionType::Uri => {
                if let Some(uri) = action
                    .as_uri_action()
                    .and_then(|uri_action| uri_action.uri().ok())
                    .filter(|uri| !uri.is_empty())
                {
                    return Some(LinkTarget::Uri { uri });
                }
            }
            _ => {}
        }
    }

    link.destination()
        .and_then(|destination| destination.page_index().ok())
        .map(|page| LinkTarget::GoTo {
            page: page as usize,
            location: None,
        })
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, level: u32, out: &mut Vec<TocEntry>) {
    loop {
        if let Some(title) = bookmark.title() {
            let page_index = bookmark
                .destination()
                .and_then(|destination| destination.page_index().ok())
                .map(|page| page as usize);
            out.push(TocEntry {
                level,
                title,
                page_index,
                location: None,
            });
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, level + 1, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());
    let keywords = metadata
        .get(PdfDocumentMetadataTagType::Keywords)
        .map(|t| t.value().split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata {
            title,
            author,
            keywords,
        },
    })
}

fn pdfium_rotation(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation {
        Rotation::Deg0 => PdfPageRenderRotation::None,
        Rotation::Deg90 => PdfPageRenderRotation::Degrees90,
        Rotation::Deg180 => PdfPageRenderRotation::Degrees180,
        Rotation::Deg270 => PdfPageRenderRotation::Degrees270,
    }
}

/// PDF user space (origin bottom-left) to page space (origin top-left).
fn from_pdf_rect(rect: &PdfRect, page_height: f32) -> Rect {
    flip_y(
        rect.left().value,
        rect.top().value,
        rect.right().value,
        rect.bottom().value,
        page_height,
    )
}

/// Page space to PDF user space; the result always has `bottom <= top`.
fn to_pdf_rect(rect: &Rect, page_height: f32) -> PdfRect {
    let rect = rect.normalized();
    PdfRect::new_from_values(
        page_height - rect.bottom,
        rect.left,
        page_height - rect.top,
        rect.right,
    )
}

fn flip_y(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> Rect {
    Rect::new(left, page_height - top, right, page_height - bottom).normalized()
}

fn scale_rect(rect: &Rect, scale: f32) -> Rect {
    Rect::new(
        rect.left * scale,
        rect.top * scale,
        rect.right * scale,
        rect.bottom * scale,
    )
}

fn paint_highlight(image: &mut RgbaImage, rect: &Rect) {
    let (width, height) = image.dimensions();
    let x0 = rect.left.floor().max(0.0) as u32;
    let y0 = rect.top.floor().max(0.0) as u32;
    let x1 = (rect.right.ceil().max(0.0) as u32).min(width);
    let y1 = (rect.bottom.ceil().max(0.0) as u32).min(height);
    for y in y0..y1 {
        for x in x0..x1 {
            image.get_pixel_mut(x, y).blend(&HIGHLIGHT);
        }
    }
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("PDFVIEW_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(%path, %err, "failed to load pdfium from build-provided path");
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    let local = match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => format!("{}: {}", cwd_path.display(), err),
    };

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|err| {
            anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({local}, system: {err})"
            )
        })
}
