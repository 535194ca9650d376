use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::geometry::{Quad, Rect, Rotation, Size, Transform};
use crate::outline::{LinkEntry, TocEntry};
use crate::DocumentInfo;

/// A loaded page as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PageHandle {
    pub index: usize,
    /// Unrotated size in PDF points.
    pub size: Size,
    pub rotation: Rotation,
    pub label: Option<String>,
}

impl PageHandle {
    pub fn display_size(&self) -> Size {
        self.rotation.apply_to_size(self.size)
    }
}

/// Renderable representation of one page.
///
/// Expensive to build, cheap to rasterize at any transform. The page rotation
/// is baked in at build time, so a rotation change requires a rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayList {
    page_index: usize,
    page_size: Size,
    rotation: Rotation,
    annotations: Vec<Quad>,
}

impl DisplayList {
    pub fn new(page: &PageHandle) -> Self {
        Self {
            page_index: page.index,
            page_size: page.size,
            rotation: page.rotation,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<Quad>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn display_size(&self) -> Size {
        self.rotation.apply_to_size(self.page_size)
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.display_size())
    }

    pub fn annotations(&self) -> &[Quad] {
        &self.annotations
    }
}

/// Raw engine output: tightly packed 8-bit samples, 3 (RGB) or 4 (RGBA)
/// channels per pixel.
#[derive(Debug, Clone)]
pub struct RawPixmap {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub samples: Vec<u8>,
}

/// The PDF engine as seen by the viewer core.
///
/// Page annotations and rotations are shared mutable engine state, hence the
/// `&self` receivers: implementations guard that state internally.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    fn load_page(&self, index: usize) -> Result<PageHandle>;

    /// Builds the page's display list, including whatever annotations are
    /// currently attached to the page.
    fn build_display_list(&self, page: &PageHandle) -> Result<DisplayList>;

    fn rasterize(
        &self,
        list: &DisplayList,
        transform: &Transform,
        alpha: bool,
    ) -> Result<RawPixmap>;

    fn search_text(&self, page: &PageHandle, query: &str) -> Result<Vec<Quad>>;

    fn extract_text_in_region(&self, page: &PageHandle, region: &Rect) -> Result<String>;

    fn insert_highlight(&self, page: &PageHandle, region: &Quad) -> Result<()>;

    fn clear_annotations(&self, page: &PageHandle) -> Result<()>;

    fn set_rotation(&self, page_index: usize, rotation: Rotation) -> Result<()>;

    fn page_label(&self, page: &PageHandle) -> Option<String> {
        page.label.clone()
    }

    fn table_of_contents(&self) -> Result<Vec<TocEntry>>;

    fn links(&self, page: &PageHandle) -> Result<Vec<LinkEntry>>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
