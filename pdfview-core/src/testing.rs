//! In-memory engine double shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;

use crate::engine::{DisplayList, DocumentBackend, DocumentProvider, PageHandle, RawPixmap};
use crate::geometry::{Quad, Rect, Rotation, Size, Transform};
use crate::outline::{LinkEntry, TocEntry};
use crate::{document_id_for_path, DocumentInfo, DocumentMetadata};

pub const PAGE_SIZE: Size = Size::new(600.0, 800.0);

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationOp {
    Clear(usize),
    Insert(usize),
}

#[derive(Default)]
struct FakeState {
    rotations: HashMap<usize, Rotation>,
    annotations: HashMap<usize, Vec<Quad>>,
    annotation_log: Vec<AnnotationOp>,
    display_list_builds: usize,
    rasterized: Vec<DisplayList>,
}

pub struct FakeBackend {
    info: DocumentInfo,
    labels: Vec<Option<String>>,
    corrupt_pages: HashSet<usize>,
    broken_raster: HashSet<usize>,
    hits: HashMap<String, HashMap<usize, usize>>,
    toc: Vec<TocEntry>,
    links: HashMap<usize, Vec<LinkEntry>>,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(page_count: usize) -> Self {
        let path = PathBuf::from("/tmp/fake.pdf");
        Self {
            info: DocumentInfo {
                id: document_id_for_path(&path),
                path,
                page_count,
                metadata: DocumentMetadata::default(),
            },
            labels: Vec::new(),
            corrupt_pages: HashSet::new(),
            broken_raster: HashSet::new(),
            hits: HashMap::new(),
            toc: Vec::new(),
            links: HashMap::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| Some(l.to_string())).collect();
        self
    }

    pub fn with_corrupt_page(mut self, page: usize) -> Self {
        self.corrupt_pages.insert(page);
        self
    }

    pub fn with_broken_raster(mut self, page: usize) -> Self {
        self.broken_raster.insert(page);
        self
    }

    /// `query` matches `count` times on `page`.
    pub fn with_hits(mut self, query: &str, page: usize, count: usize) -> Self {
        self.hits
            .entry(query.to_lowercase())
            .or_default()
            .insert(page, count);
        self
    }

    pub fn with_toc(mut self, toc: Vec<TocEntry>) -> Self {
        self.toc = toc;
        self
    }

    pub fn with_links(mut self, page: usize, links: Vec<LinkEntry>) -> Self {
        self.links.insert(page, links);
        self
    }

    pub fn display_list_builds(&self) -> usize {
        self.state.lock().display_list_builds
    }

    pub fn annotation_log(&self) -> Vec<AnnotationOp> {
        self.state.lock().annotation_log.clone()
    }

    pub fn live_annotations(&self, page: usize) -> usize {
        self.state
            .lock()
            .annotations
            .get(&page)
            .map_or(0, Vec::len)
    }

    pub fn rotation(&self, page: usize) -> Rotation {
        self.state
            .lock()
            .rotations
            .get(&page)
            .copied()
            .unwrap_or_default()
    }

    pub fn last_rasterized(&self) -> Option<DisplayList> {
        self.state.lock().rasterized.last().cloned()
    }

    fn check_page(&self, index: usize) -> Result<()> {
        if index >= self.info.page_count {
            bail!("page {index} out of range");
        }
        if self.corrupt_pages.contains(&index) {
            bail!("page {index} object is corrupt");
        }
        Ok(())
    }
}

pub fn hit_quad(page: usize, n: usize) -> Quad {
    let top = 20.0 * n as f32 + page as f32;
    Quad::from_rect(Rect::new(10.0, top, 110.0, top + 12.0))
}

impl DocumentBackend for FakeBackend {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn load_page(&self, index: usize) -> Result<PageHandle> {
        self.check_page(index)?;
        Ok(PageHandle {
            index,
            size: PAGE_SIZE,
            rotation: self.rotation(index),
            label: self.labels.get(index).cloned().flatten(),
        })
    }

    fn build_display_list(&self, page: &PageHandle) -> Result<DisplayList> {
        self.check_page(page.index)?;
        let mut state = self.state.lock();
        state.display_list_builds += 1;
        let annotations = state
            .annotations
            .get(&page.index)
            .cloned()
            .unwrap_or_default();
        Ok(DisplayList::new(page).with_annotations(annotations))
    }

    fn rasterize(
        &self,
        list: &DisplayList,
        transform: &Transform,
        alpha: bool,
    ) -> Result<RawPixmap> {
        self.state.lock().rasterized.push(list.clone());
        let size = list.display_size().scaled(transform.scale_factor());
        let width = size.width.round() as u32;
        let height = size.height.round() as u32;
        let channels: u8 = if alpha { 4 } else { 3 };
        let mut len = width as usize * height as usize * channels as usize;
        if self.broken_raster.contains(&list.page_index()) {
            len /= 2;
        }
        Ok(RawPixmap {
            width,
            height,
            channels,
            samples: vec![255; len],
        })
    }

    fn search_text(&self, page: &PageHandle, query: &str) -> Result<Vec<Quad>> {
        self.check_page(page.index)?;
        let count = self
            .hits
            .get(&query.to_lowercase())
            .and_then(|pages| pages.get(&page.index))
            .copied()
            .unwrap_or(0);
        Ok((0..count).map(|n| hit_quad(page.index, n)).collect())
    }

    fn extract_text_in_region(&self, page: &PageHandle, region: &Rect) -> Result<String> {
        self.check_page(page.index)?;
        Ok(format!(
            "p{} {:.0},{:.0}",
            page.index, region.left, region.top
        ))
    }

    fn insert_highlight(&self, page: &PageHandle, region: &Quad) -> Result<()> {
        let mut state = self.state.lock();
        state.annotation_log.push(AnnotationOp::Insert(page.index));
        state
            .annotations
            .entry(page.index)
            .or_default()
            .push(*region);
        Ok(())
    }

    fn clear_annotations(&self, page: &PageHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.annotation_log.push(AnnotationOp::Clear(page.index));
        state.annotations.remove(&page.index);
        Ok(())
    }

    fn set_rotation(&self, page_index: usize, rotation: Rotation) -> Result<()> {
        self.check_page(page_index)?;
        self.state.lock().rotations.insert(page_index, rotation);
        Ok(())
    }

    fn table_of_contents(&self) -> Result<Vec<TocEntry>> {
        Ok(self.toc.clone())
    }

    fn links(&self, page: &PageHandle) -> Result<Vec<LinkEntry>> {
        Ok(self.links.get(&page.index).cloned().unwrap_or_default())
    }
}

pub struct FakeProvider {
    pub page_count: usize,
}

#[async_trait::async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        if path.extension().and_then(|ext| ext.to_str()) != Some("pdf") {
            return Err(anyhow!("{:?} is not a PDF document", path));
        }
        Ok(Arc::new(FakeBackend::new(self.page_count)))
    }
}
