use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::cache::PageCache;
use crate::config::ViewerConfig;
use crate::engine::{DocumentBackend, DocumentProvider};
use crate::error::{ViewerError, ViewerResult};
use crate::events::{EventBus, ViewerEvent};
use crate::geometry::{Point, Rect, Size};
use crate::input::{Gesture, InputRouter, RoutedAction, Viewport};
use crate::navigation::{JumpTarget, NavigationOutcome, PageLocation, PageNavigator};
use crate::outline::{LinkEntry, LinkTarget, LinkTree, OutlineTree};
use crate::renderer::Renderer;
use crate::search::{SearchHit, SearchIndex};
use crate::zoom::{ZoomController, ZoomMode, ZoomRequest};
use crate::{DocumentInfo, RenderImage};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    JumpToPage {
        page: usize,
        location: Option<PageLocation>,
    },
    JumpToLabel(String),
    /// Free text typed into the page box: a label or a 1-based number.
    GotoInput(String),
    NextPage,
    PrevPage,
    SetZoom(ZoomRequest),
    ZoomText(String),
    ZoomIn,
    ZoomOut,
    Rotate {
        clockwise: bool,
    },
    Search(String),
    SelectSearchResult(usize),
    SearchNext,
    SearchPrev,
    SelectOutline(JumpTarget),
    SelectLink(LinkEntry),
    Resize(Size),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// View state changed; the surface should redraw.
    Redraw,
    Unchanged,
    /// A link pointing outside the document.
    ExternalLink(String),
}

impl CommandOutcome {
    fn from_changed(changed: bool) -> Self {
        if changed {
            CommandOutcome::Redraw
        } else {
            CommandOutcome::Unchanged
        }
    }
}

/// One open document together with all of its view state.
pub struct Viewer {
    backend: Arc<dyn DocumentBackend>,
    cache: PageCache,
    zoom: ZoomController,
    navigator: PageNavigator,
    renderer: Renderer,
    search: SearchIndex,
    search_cursor: Option<usize>,
    router: InputRouter,
    viewport: Viewport,
    outline: OutlineTree,
    bitmap: Option<RenderImage>,
    events: EventBus,
}

impl Viewer {
    #[instrument(skip(provider, config, events))]
    pub async fn open_with<P>(
        provider: &P,
        path: &Path,
        config: &ViewerConfig,
        events: EventBus,
    ) -> ViewerResult<Self>
    where
        P: DocumentProvider + ?Sized,
    {
        let backend = provider
            .open(path)
            .await
            .map_err(|source| ViewerError::DocumentOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(backend, config, events))
    }

    pub fn new(backend: Arc<dyn DocumentBackend>, config: &ViewerConfig, events: EventBus) -> Self {
        let info = backend.info().clone();
        let page_count = backend.page_count();

        let labels = (0..page_count)
            .map(|index| match backend.load_page(index) {
                Ok(page) => backend.page_label(&page),
                Err(err) => {
                    warn!(?err, page = index, "page unreadable while collecting labels");
                    None
                }
            })
            .collect();

        let outline = match backend.table_of_contents() {
            Ok(entries) => OutlineTree::build(entries),
            Err(err) => {
                warn!(?err, "failed to read document outline");
                OutlineTree::default()
            }
        };

        let mut viewer = Self {
            cache: PageCache::new(page_count),
            zoom: ZoomController::new(config.zoom.clone()),
            navigator: PageNavigator::new(page_count, labels, events.clone()),
            renderer: Renderer::new(&config.render),
            search: SearchIndex::new(),
            search_cursor: None,
            router: InputRouter::new(config.input.clone()),
            viewport: Viewport::default(),
            outline,
            bitmap: None,
            events,
            backend,
        };

        info!(path = ?info.path, pages = page_count, id = %info.id, "document loaded");
        viewer.events.emit(ViewerEvent::DocumentLoaded(info.id));
        if page_count > 0 {
            viewer.render_current();
        }
        viewer
    }

    pub fn info(&self) -> &DocumentInfo {
        self.backend.info()
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn navigator(&self) -> &PageNavigator {
        &self.navigator
    }

    pub fn zoom(&self) -> &ZoomController {
        &self.zoom
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    pub fn outline(&self) -> &OutlineTree {
        &self.outline
    }

    /// Last successfully rendered bitmap of the current page.
    pub fn bitmap(&self) -> Option<&RenderImage> {
        self.bitmap.as_ref()
    }

    pub fn current_page(&self) -> usize {
        self.navigator.current_page()
    }

    pub fn current_hit(&self) -> Option<&SearchHit> {
        self.search_cursor.and_then(|index| self.search.result(index))
    }

    pub fn search_cursor(&self) -> Option<usize> {
        self.search_cursor
    }

    pub fn apply(&mut self, command: Command) -> CommandOutcome {
        debug!(?command, "apply");
        match command {
            Command::JumpToPage { page, location } => {
                let outcome = self.navigator.jump(page, location);
                self.after_navigation(outcome)
            }
            Command::JumpToLabel(label) => match self.navigator.page_number_from_label(&label) {
                Some(page) => {
                    let outcome = self.navigator.jump(page, None);
                    self.after_navigation(outcome)
                }
                None => CommandOutcome::Unchanged,
            },
            Command::GotoInput(text) => match self.navigator.resolve_user_page_input(&text) {
                Some(page) => {
                    let outcome = self.navigator.jump(page, None);
                    self.after_navigation(outcome)
                }
                None => {
                    debug!(input = text, "page input did not resolve");
                    CommandOutcome::Unchanged
                }
            },
            Command::NextPage => {
                let outcome = self.navigator.next();
                self.after_navigation(outcome)
            }
            Command::PrevPage => {
                let outcome = self.navigator.previous();
                self.after_navigation(outcome)
            }
            Command::SetZoom(request) => self.set_zoom(request),
            Command::ZoomText(text) => match ZoomController::parse_text_input(&text) {
                Some(request) => self.set_zoom(request),
                None => CommandOutcome::Unchanged,
            },
            Command::ZoomIn => self.step_zoom(true, None),
            Command::ZoomOut => self.step_zoom(false, None),
            Command::Rotate { clockwise } => self.rotate(clockwise),
            Command::Search(text) => self.run_search(&text),
            Command::SelectSearchResult(index) => self.select_search_result(index),
            Command::SearchNext => {
                match self.search.next_result(self.navigator.current_page()) {
                    Some(index) => self.select_search_result(index),
                    None => CommandOutcome::Unchanged,
                }
            }
            Command::SearchPrev => {
                match self.search.previous_result(self.navigator.current_page()) {
                    Some(index) => self.select_search_result(index),
                    None => CommandOutcome::Unchanged,
                }
            }
            Command::SelectOutline(target) => {
                let outcome = self.navigator.jump(target.page, target.location);
                self.after_navigation(outcome)
            }
            Command::SelectLink(link) => match link.target {
                LinkTarget::GoTo { page, location } => {
                    let outcome = self.navigator.jump(page, location);
                    self.after_navigation(outcome)
                }
                LinkTarget::Uri { uri } => CommandOutcome::ExternalLink(uri),
            },
            Command::Resize(size) => self.resize(size),
        }
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) -> CommandOutcome {
        match self.router.route(gesture, &self.navigator, &self.viewport) {
            RoutedAction::Zoom { zoom_in, anchor } => self.step_zoom(zoom_in, anchor),
            RoutedAction::Jump { page, location } => {
                let outcome = self.navigator.jump(page, Some(location));
                self.after_navigation(outcome)
            }
            RoutedAction::Scroll(delta) => self.scroll(delta),
            RoutedAction::Previous => self.apply(Command::PrevPage),
            RoutedAction::Next => self.apply(Command::NextPage),
            RoutedAction::None => CommandOutcome::Unchanged,
        }
    }

    /// Text under `region` (page space), or `None` when the engine fails.
    pub fn text_in_region(&self, page_index: usize, region: &Rect) -> Option<String> {
        let page = self
            .backend
            .load_page(page_index)
            .map_err(|err| warn!(?err, page = page_index, "page unreadable"))
            .ok()?;
        self.backend
            .extract_text_in_region(&page, region)
            .map_err(|err| warn!(?err, page = page_index, "text extraction failed"))
            .ok()
    }

    /// Text covered by the selected search hit.
    pub fn current_hit_text(&self) -> Option<String> {
        let hit = self.current_hit()?;
        let bounds = hit
            .regions
            .iter()
            .map(|quad| quad.bounds())
            .reduce(|acc, rect| acc.union(&rect))?;
        self.text_in_region(hit.page_index, &bounds)
    }

    /// Links on `page_index`, each with the text under its hotspot.
    pub fn links(&self, page_index: usize) -> Vec<LinkEntry> {
        let Ok(page) = self.backend.load_page(page_index) else {
            return Vec::new();
        };
        let links = match self.backend.links(&page) {
            Ok(links) => links,
            Err(err) => {
                warn!(?err, page = page_index, "failed to read page links");
                return Vec::new();
            }
        };
        links
            .into_iter()
            .map(|mut link| {
                if link.text.is_none() {
                    link.text = self
                        .backend
                        .extract_text_in_region(&page, &link.hotspot)
                        .ok()
                        .map(|text| text.trim().to_string())
                        .filter(|text| !text.is_empty());
                }
                link
            })
            .collect()
    }

    pub fn link_tree(&self) -> LinkTree {
        LinkTree::build((0..self.navigator.page_count()).map(|page| {
            (page, self.navigator.label_for(page), self.links(page))
        }))
    }

    fn after_navigation(&mut self, outcome: NavigationOutcome) -> CommandOutcome {
        if outcome.is_noop() {
            return CommandOutcome::Unchanged;
        }
        if outcome.page_changed {
            self.refit_current();
            self.render_current();
        }
        self.scroll_to_location(self.navigator.location());
        CommandOutcome::Redraw
    }

    fn scroll(&mut self, delta: f32) -> CommandOutcome {
        if !self.viewport.scroll_by(delta) {
            return CommandOutcome::Unchanged;
        }
        self.record_scroll_offset();
        CommandOutcome::Redraw
    }

    fn record_scroll_offset(&mut self) {
        let scale = self.page_scale().unwrap_or(1.0);
        self.navigator
            .record_offset(PageLocation::Offset(self.viewport.scroll_y / scale));
    }

    fn scroll_to_location(&mut self, location: PageLocation) {
        let scale = self.page_scale().unwrap_or(1.0);
        self.viewport.scroll_to(location, scale);
    }

    /// Content pixels per page point for the current page.
    fn page_scale(&mut self) -> Option<f32> {
        let page = self.navigator.current_page();
        let list = self.cache.get(&*self.backend, page).ok()?;
        Some(self.renderer.base_scale(list.display_size()) * self.zoom.factor())
    }

    fn page_display_size(&mut self) -> Option<Size> {
        let page = self.navigator.current_page();
        let list = self.cache.get(&*self.backend, page).ok()?;
        Some(self.renderer.display_size(list.display_size()))
    }

    fn set_zoom(&mut self, request: ZoomRequest) -> CommandOutcome {
        let before = self.zoom.factor();
        let page = self.page_display_size().unwrap_or_default();
        let changed = self.zoom.apply(request, self.viewport.size, page);
        self.after_zoom(before, changed, None)
    }

    fn step_zoom(&mut self, zoom_in: bool, anchor: Option<Point>) -> CommandOutcome {
        let before = self.zoom.factor();
        let changed = if zoom_in {
            self.zoom.zoom_in()
        } else {
            self.zoom.zoom_out()
        };
        self.after_zoom(before, changed, anchor)
    }

    fn after_zoom(&mut self, before: f32, changed: bool, anchor: Option<Point>) -> CommandOutcome {
        if !changed {
            return CommandOutcome::Unchanged;
        }
        let factor = self.zoom.factor();
        info!(from = before, to = factor, mode = ?self.zoom.mode(), "zoom changed");
        self.events.emit(ViewerEvent::ZoomChanged(factor));
        let anchor_y = anchor.map_or(0.0, |point| point.y);
        self.viewport.rescale_anchored(factor / before, anchor_y);
        self.render_current();
        self.record_scroll_offset();
        CommandOutcome::Redraw
    }

    fn refit_current(&mut self) -> bool {
        if self.zoom.mode() == ZoomMode::Custom {
            return false;
        }
        let Some(page) = self.page_display_size() else {
            return false;
        };
        let changed = self.zoom.refit(self.viewport.size, page);
        if changed {
            self.events.emit(ViewerEvent::ZoomChanged(self.zoom.factor()));
        }
        changed
    }

    fn resize(&mut self, size: Size) -> CommandOutcome {
        if size == self.viewport.size {
            return CommandOutcome::Unchanged;
        }
        self.viewport.resize(size);
        if self.refit_current() {
            self.render_current();
        }
        CommandOutcome::Redraw
    }

    #[instrument(skip(self))]
    fn rotate(&mut self, clockwise: bool) -> CommandOutcome {
        let index = self.navigator.current_page();
        let page = match self.backend.load_page(index) {
            Ok(page) => page,
            Err(err) => {
                warn!(?err, page = index, "cannot rotate unreadable page");
                return CommandOutcome::Unchanged;
            }
        };
        let rotation = page.rotation.rotated(clockwise);
        if let Err(err) = self.backend.set_rotation(index, rotation) {
            warn!(?err, page = index, "engine rejected rotation");
            return CommandOutcome::Unchanged;
        }
        debug!(page = index, degrees = rotation.degrees(), "page rotated");
        self.cache.invalidate(index);
        self.refit_current();
        self.render_current();
        self.scroll_to_location(PageLocation::Top);
        CommandOutcome::Redraw
    }

    fn run_search(&mut self, text: &str) -> CommandOutcome {
        let hits = self.search.search_for(&*self.backend, text);
        self.renderer.set_highlights(self.search.highlights());
        self.search_cursor = None;
        self.events.emit(ViewerEvent::SearchCompleted(hits));

        let current = self.navigator.current_page();
        let first = self
            .search
            .results()
            .iter()
            .position(|hit| hit.page_index >= current)
            .or_else(|| (!self.search.is_empty()).then_some(0));
        match first {
            Some(index) => {
                self.select_search_result(index);
                CommandOutcome::Redraw
            }
            None => {
                // Highlights may have been dropped from the visible page.
                self.render_current();
                CommandOutcome::Redraw
            }
        }
    }

    fn select_search_result(&mut self, index: usize) -> CommandOutcome {
        let Some(hit) = self.search.result(index) else {
            return CommandOutcome::Unchanged;
        };
        let page = hit.page_index;
        let location = hit
            .regions
            .first()
            .map(|quad| PageLocation::Offset(quad.bounds().top));
        self.search_cursor = Some(index);

        let outcome = self.navigator.jump(page, location);
        if !outcome.page_changed {
            // Same page: highlights still need a fresh bitmap.
            self.render_current();
        }
        self.after_navigation(outcome);
        CommandOutcome::Redraw
    }

    /// Re-renders the current page. Failures keep the previous bitmap.
    fn render_current(&mut self) -> bool {
        let page = self.navigator.current_page();
        match self
            .renderer
            .render(&*self.backend, &mut self.cache, &self.zoom, page)
        {
            Ok(image) => {
                self.viewport
                    .set_content(Size::new(image.width as f32, image.height as f32));
                self.bitmap = Some(image);
                true
            }
            Err(err) => {
                warn!(error = %err, page, "render failed; keeping previous bitmap");
                self.events.emit(ViewerEvent::RenderFailed(page));
                false
            }
        }
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("path", &self.backend.info().path)
            .field("page", &self.navigator.current_page())
            .field("zoom", &self.zoom.factor())
            .finish()
    }
}
