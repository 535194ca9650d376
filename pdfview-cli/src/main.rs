use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, WindowSize};
use directories::ProjectDirs;
use pdfview_core::{
    Command, CommandOutcome, EventBus, LinkTree, OutlineTree, RenderImage, SearchHit, Size,
    Viewer, ViewerConfig, ViewerEvent, Viewport,
};
use pdfview_render::PdfiumProvider;
use pdfview_tty::{
    write_status_line, DrawParams, EventMapper, InputMode, KittyRenderer, OverlayKind, UiEvent,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

/// Cell size assumed when the terminal does not report its pixel size.
const FALLBACK_CELL: Size = Size::new(8.0, 16.0);

#[derive(Debug, Parser)]
#[command(
    name = "pdfview",
    version,
    about = "PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// PDF file to open
    file: PathBuf,

    /// Page to open on: a page label or a 1-based page number
    #[arg(short = 'p', long = "page")]
    page: Option<String>,

    /// Initial zoom, e.g. "150%" or "fit width"
    #[arg(short = 'z', long = "zoom")]
    zoom: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print the document outline as JSON and exit
    #[arg(long = "outline", conflicts_with = "search")]
    outline: bool,

    /// Search the document, print the hits as JSON and exit
    #[arg(short = 's', long = "search", value_name = "TEXT")]
    search: Option<String>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(
            stdout,
            DisableMouseCapture,
            LeaveAlternateScreen,
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("org", "pdfview", "pdfview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| ViewerConfig::default_path(&project_dirs));
    let config = ViewerConfig::load(&config_path)?;
    let _log_guard = init_logging(&project_dirs, &config.log_filter)?;
    info!(file = ?args.file, config = ?config_path, "starting");

    let provider = PdfiumProvider::new()?;
    let events = EventBus::new();
    let mut viewer = Viewer::open_with(&provider, &args.file, &config, events)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;

    if args.outline {
        return print_json(&OutlineReport::new(&viewer));
    }
    if let Some(query) = args.search.clone() {
        viewer.apply(Command::Search(query));
        return print_json(&SearchReport::new(&viewer));
    }

    run_interactive(viewer, &args)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct OutlineReport<'a> {
    file: &'a std::path::Path,
    page_count: usize,
    outline: &'a OutlineTree,
    links: LinkTree,
}

impl<'a> OutlineReport<'a> {
    fn new(viewer: &'a Viewer) -> Self {
        Self {
            file: &viewer.info().path,
            page_count: viewer.info().page_count,
            outline: viewer.outline(),
            links: viewer.link_tree(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    hit_count: usize,
    hits: &'a [SearchHit],
}

impl<'a> SearchReport<'a> {
    fn new(viewer: &'a Viewer) -> Self {
        let search = viewer.search();
        Self {
            query: search.query(),
            hit_count: search.hit_count(),
            hits: search.results(),
        }
    }
}

fn run_interactive(mut viewer: Viewer, args: &Args) -> Result<()> {
    let events = viewer.events().recorder();
    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut mapper = EventMapper::new();
    let mut ui = UiState::default();

    let layout = Layout::from_window(terminal::window_size()?);
    mapper.set_cell_size(layout.cell);
    viewer.apply(Command::Resize(layout.viewport_pixels()));
    if let Some(page) = &args.page {
        if viewer.navigator().resolve_user_page_input(page).is_some() {
            viewer.apply(Command::GotoInput(page.clone()));
        } else {
            ui.notice = Some(format!("no page {page:?}"));
        }
    }
    if let Some(zoom) = &args.zoom {
        viewer.apply(Command::ZoomText(zoom.clone()));
    }

    let mut dirty = true;
    loop {
        for event in drain_events(&events) {
            ui.observe(&event, &viewer);
        }

        if dirty {
            let layout = Layout::from_window(terminal::window_size()?);
            redraw(&mut renderer, &viewer, &mut ui, &mapper, layout)?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let ui_event = mapper.map_event(event::read()?);
        match handle_event(ui_event, &mut viewer, &mut ui, &mut mapper)? {
            LoopAction::ContinueRedraw => dirty = true,
            LoopAction::Continue => {}
            LoopAction::Quit => break,
        }
    }

    renderer.clear_all()?;
    Ok(())
}

fn drain_events(queue: &parking_lot::Mutex<Vec<ViewerEvent>>) -> Vec<ViewerEvent> {
    std::mem::take(&mut *queue.lock())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Transient UI state layered over the viewer.
#[derive(Debug, Default)]
struct UiState {
    overlay: Option<ListOverlay>,
    notice: Option<String>,
}

impl UiState {
    fn observe(&mut self, event: &ViewerEvent, viewer: &Viewer) {
        debug!(?event, "viewer event");
        match event {
            ViewerEvent::RenderFailed(page) => {
                self.notice = Some(format!(
                    "page {} could not be rendered",
                    viewer.navigator().label_for(*page)
                ));
            }
            ViewerEvent::SearchCompleted(0) => {
                self.notice = Some(format!("no matches for {:?}", viewer.search().query()));
            }
            ViewerEvent::PageChanged(page) => {
                if let Some(overlay) = self.overlay.as_mut() {
                    overlay.follow_page(*page);
                }
            }
            _ => {}
        }
    }

    fn close_overlay(&mut self, mapper: &mut EventMapper) {
        self.overlay = None;
        mapper.set_mode(InputMode::Normal);
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OverlayRow {
    depth: usize,
    text: String,
    page: Option<usize>,
    action: Option<Command>,
}

/// Scrollable list window used for the outline and link overlays.
#[derive(Debug)]
struct ListOverlay {
    kind: OverlayKind,
    rows: Vec<OverlayRow>,
    selected: usize,
    scroll_offset: usize,
}

impl ListOverlay {
    fn new(kind: OverlayKind, rows: Vec<OverlayRow>, current_page: usize) -> Self {
        let mut overlay = Self {
            kind,
            rows,
            selected: 0,
            scroll_offset: 0,
        };
        overlay.follow_page(current_page);
        overlay
    }

    fn outline(viewer: &Viewer) -> Self {
        let rows = viewer
            .outline()
            .flatten()
            .into_iter()
            .map(|row| {
                let text = match row.target {
                    Some(target) => format!(
                        "{} (p{})",
                        row.title,
                        viewer.navigator().label_for(target.page)
                    ),
                    None => row.title,
                };
                OverlayRow {
                    depth: row.depth,
                    text,
                    page: row.target.map(|target| target.page),
                    action: row.target.map(Command::SelectOutline),
                }
            })
            .collect();
        Self::new(OverlayKind::Outline, rows, viewer.current_page())
    }

    fn links(viewer: &Viewer) -> Self {
        let tree = viewer.link_tree();
        let mut rows = Vec::with_capacity(tree.len() + tree.pages.len());
        for page in tree.pages {
            rows.push(OverlayRow {
                depth: 0,
                text: format!("page {}", page.label),
                page: Some(page.page_index),
                action: Some(Command::JumpToPage {
                    page: page.page_index,
                    location: None,
                }),
            });
            for link in page.links {
                rows.push(OverlayRow {
                    depth: 1,
                    text: link.describe(),
                    page: Some(page.page_index),
                    action: Some(Command::SelectLink(link)),
                });
            }
        }
        Self::new(OverlayKind::Links, rows, viewer.current_page())
    }

    fn title(&self) -> &'static str {
        match self.kind {
            OverlayKind::Outline => "Table of Contents",
            OverlayKind::Links => "Links",
        }
    }

    fn empty_message(&self) -> &'static str {
        match self.kind {
            OverlayKind::Outline => "No table of contents available",
            OverlayKind::Links => "No links in this document",
        }
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn selected_row(&self) -> Option<&OverlayRow> {
        self.rows.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        let last = self.rows.len() as isize - 1;
        let next = (self.selected as isize + delta).clamp(0, last) as usize;
        if next == self.selected {
            return false;
        }
        self.selected = next;
        true
    }

    fn ensure_visible(&mut self, height: usize) {
        if height == 0 || self.rows.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.rows.len().saturating_sub(height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + height {
            self.scroll_offset = self.selected + 1 - height;
        }
    }

    /// Selects the last row pointing at or before `page`.
    fn follow_page(&mut self, page: usize) {
        self.selected = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.page.is_some_and(|target| target <= page))
            .map(|(idx, _)| idx)
            .last()
            .unwrap_or(0);
    }
}

fn handle_event(
    event: UiEvent,
    viewer: &mut Viewer,
    ui: &mut UiState,
    mapper: &mut EventMapper,
) -> Result<LoopAction> {
    let action = match event {
        UiEvent::Gesture(gesture) => {
            ui.notice = None;
            outcome_action(viewer.handle_gesture(gesture), ui)
        }
        UiEvent::Command(command) => {
            ui.notice = None;
            // Prompt submissions arrive here too; the status line needs a redraw either way.
            outcome_action(viewer.apply(command), ui);
            LoopAction::ContinueRedraw
        }
        UiEvent::GotoLastPage => {
            let last = viewer.info().page_count.saturating_sub(1);
            outcome_action(
                viewer.apply(Command::JumpToPage {
                    page: last,
                    location: None,
                }),
                ui,
            )
        }
        UiEvent::OpenOverlay(kind) => {
            ui.overlay = Some(match kind {
                OverlayKind::Outline => ListOverlay::outline(viewer),
                OverlayKind::Links => ListOverlay::links(viewer),
            });
            mapper.set_mode(InputMode::Overlay);
            LoopAction::ContinueRedraw
        }
        UiEvent::CloseOverlay => {
            ui.close_overlay(mapper);
            LoopAction::ContinueRedraw
        }
        UiEvent::OverlayMoveSelection { delta } => match ui.overlay.as_mut().map(|overlay| overlay.move_selection(delta)) {
            Some(true) => LoopAction::ContinueRedraw,
            _ => LoopAction::Continue,
        },
        UiEvent::OverlayActivateSelection => {
            let command = ui
                .overlay
                .as_ref()
                .and_then(ListOverlay::selected_row)
                .and_then(|row| row.action.clone());
            match command {
                Some(command) => {
                    ui.close_overlay(mapper);
                    outcome_action(viewer.apply(command), ui);
                    LoopAction::ContinueRedraw
                }
                None => LoopAction::Continue,
            }
        }
        UiEvent::BeginPrompt(_) | UiEvent::PromptChanged { .. } | UiEvent::PromptCancel => {
            LoopAction::ContinueRedraw
        }
        UiEvent::CopyHitText => {
            ui.notice = Some(copy_hit_text(viewer));
            LoopAction::ContinueRedraw
        }
        UiEvent::Resized { .. } => {
            let layout = Layout::from_window(terminal::window_size()?);
            mapper.set_cell_size(layout.cell);
            viewer.apply(Command::Resize(layout.viewport_pixels()));
            LoopAction::ContinueRedraw
        }
        UiEvent::Quit => LoopAction::Quit,
        UiEvent::None => LoopAction::Continue,
    };
    Ok(action)
}

fn outcome_action(outcome: CommandOutcome, ui: &mut UiState) -> LoopAction {
    match outcome {
        CommandOutcome::Redraw => LoopAction::ContinueRedraw,
        CommandOutcome::Unchanged => LoopAction::Continue,
        CommandOutcome::ExternalLink(uri) => {
            ui.notice = Some(describe_external_link(&uri));
            LoopAction::ContinueRedraw
        }
    }
}

fn describe_external_link(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => format!("link: {url}"),
        Err(err) => {
            warn!(uri = raw, %err, "link target is not a valid URL");
            format!("invalid link {raw:?}: {err}")
        }
    }
}

fn copy_hit_text(viewer: &Viewer) -> String {
    let Some(text) = viewer.current_hit_text() else {
        return "no search hit selected".to_string();
    };
    let copied = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.clone()));
    match copied {
        Ok(()) => format!("copied {:?}", truncate_with_ellipsis(text, 40).trim_end()),
        Err(err) => {
            warn!(%err, "clipboard unavailable");
            format!("clipboard unavailable: {err}")
        }
    }
}

/// Terminal geometry in cells plus the pixel size of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    columns: u16,
    rows: u16,
    cell: Size,
}

impl Layout {
    fn from_window(window: WindowSize) -> Self {
        let columns = window.columns.max(1);
        let rows = window.rows.max(1);
        let cell = if window.width > 0 && window.height > 0 {
            Size::new(
                f32::from(window.width) / f32::from(columns),
                f32::from(window.height) / f32::from(rows),
            )
        } else {
            FALLBACK_CELL
        };
        Self { columns, rows, cell }
    }

    /// Rows above the status line.
    fn image_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    fn viewport_pixels(&self) -> Size {
        Size::new(
            f32::from(self.columns) * self.cell.width,
            f32::from(self.image_rows()) * self.cell.height,
        )
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &Viewer,
    ui: &mut UiState,
    mapper: &EventMapper,
    layout: Layout,
) -> Result<()> {
    renderer.begin_sync_update()?;
    renderer.clear_all()?;

    if let Some(overlay) = ui.overlay.as_mut() {
        draw_list_overlay(renderer, overlay, layout)?;
    } else if let Some(bitmap) = viewer.bitmap() {
        draw_page(renderer, bitmap, viewer.viewport(), layout)?;
    }

    let status = compose_status(
        format_document_status(viewer),
        ui.notice.as_deref(),
        mapper.pending_input().as_deref(),
    );
    write_status_line(
        renderer.writer(),
        layout.rows.saturating_sub(1),
        layout.columns,
        &status,
    )?;
    renderer.end_sync_update()?;
    Ok(())
}

fn draw_page(
    renderer: &mut KittyRenderer<io::Stdout>,
    bitmap: &RenderImage,
    viewport: &Viewport,
    layout: Layout,
) -> Result<()> {
    let Some(region) = visible_region(bitmap, viewport) else {
        return Ok(());
    };
    let image = crop_render_image(bitmap, region);

    let columns = cells_for(region.width, layout.cell.width, layout.columns);
    let rows = cells_for(region.height, layout.cell.height, layout.image_rows());
    let start_col = layout.columns.saturating_sub(columns) / 2;
    let start_row = layout.image_rows().saturating_sub(rows) / 2;

    crossterm::queue!(renderer.writer(), cursor::MoveTo(start_col, start_row))?;
    renderer.draw(&image, DrawParams::clamped(u32::from(columns), u32::from(rows)))?;
    Ok(())
}

fn cells_for(pixels: u32, cell: f32, limit: u16) -> u16 {
    if cell <= 0.0 {
        return limit.max(1);
    }
    let cells = (pixels as f32 / cell).ceil().max(1.0);
    (cells.min(f32::from(limit)) as u16).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Part of `bitmap` under the viewport: scrolled vertically, centered
/// horizontally when the page is wider than the viewport.
fn visible_region(bitmap: &RenderImage, viewport: &Viewport) -> Option<CropRegion> {
    if bitmap.width == 0 || bitmap.height == 0 {
        return None;
    }
    let view_width = viewport.size.width.max(1.0) as u32;
    let view_height = viewport.size.height.max(1.0) as u32;
    let width = bitmap.width.min(view_width);
    let height = bitmap.height.min(view_height);
    let max_y = bitmap.height - height;
    let y = (viewport.scroll_y.max(0.0).round() as u32).min(max_y);
    let x = (bitmap.width - width) / 2;
    Some(CropRegion {
        x,
        y,
        width,
        height,
    })
}

fn crop_render_image(image: &RenderImage, region: CropRegion) -> RenderImage {
    if region.x == 0
        && region.y == 0
        && region.width == image.width
        && region.height == image.height
    {
        return image.clone();
    }

    let width = region.width.min(image.width.saturating_sub(region.x));
    let height = region.height.min(image.height.saturating_sub(region.y));
    let stride = image.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in region.y..region.y + height {
        let start = row as usize * stride + region.x as usize * 4;
        pixels.extend_from_slice(&image.pixels[start..start + width as usize * 4]);
    }

    RenderImage {
        width,
        height,
        pixels,
    }
}

fn draw_list_overlay(
    renderer: &mut KittyRenderer<io::Stdout>,
    overlay: &mut ListOverlay,
    layout: Layout,
) -> Result<()> {
    let total_cols = usize::from(layout.columns);
    let available_rows = usize::from(layout.image_rows());
    if total_cols < 20 || available_rows < 6 {
        return Ok(());
    }

    let max_inner_width = total_cols - 6;
    let natural_width = if overlay.is_empty() {
        overlay.empty_message().len() + 2
    } else {
        overlay
            .rows
            .iter()
            .map(row_length)
            .max()
            .unwrap_or(0)
            .max(overlay.title().len())
    };
    let inner_width = natural_width.clamp(20.min(max_inner_width), max_inner_width);

    let max_content_height = available_rows.saturating_sub(6);
    if max_content_height == 0 {
        return Ok(());
    }
    let total_rows = overlay.rows.len().max(1);
    let content_height = total_rows.min(max_content_height);
    overlay.ensure_visible(content_height);

    let window_height = content_height + 4;
    let window_width = inner_width + 2;
    let start_col = (total_cols.saturating_sub(window_width) / 2) as u16;
    let mut row = (available_rows.saturating_sub(window_height) / 2) as u16;

    let mut lines = Vec::with_capacity(window_height);
    let border = format!("+{}+", "-".repeat(inner_width));
    lines.push(border.clone());
    lines.push(format!("|{: ^inner_width$}|", overlay.title()));
    lines.push(format!("|{}|", "-".repeat(inner_width)));
    if overlay.is_empty() {
        let content = truncate_with_ellipsis(format!("  {}", overlay.empty_message()), inner_width);
        lines.push(format!("|{content}|"));
    } else {
        let end = (overlay.scroll_offset + content_height).min(overlay.rows.len());
        for idx in overlay.scroll_offset..end {
            let content = format_row(&overlay.rows[idx], idx == overlay.selected, inner_width);
            lines.push(format!("|{content}|"));
        }
        for _ in (end - overlay.scroll_offset)..content_height {
            lines.push(format!("|{}|", " ".repeat(inner_width)));
        }
    }
    lines.push(border);

    let writer = renderer.writer();
    for line in lines {
        print_inverted(writer, start_col, row, &line)?;
        row = row.saturating_add(1);
    }
    Ok(())
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn row_length(row: &OverlayRow) -> usize {
    2 + row.depth.min(8) * 2 + row.text.chars().count()
}

fn format_row(row: &OverlayRow, selected: bool, width: usize) -> String {
    let marker = if selected { '>' } else { ' ' };
    let indent = "  ".repeat(row.depth.min(8));
    truncate_with_ellipsis(format!("{marker} {indent}{}", row.text), width)
}

/// Cuts `text` to `width` characters, marking the cut with "...", and pads
/// shorter text with spaces.
fn truncate_with_ellipsis(text: String, width: usize) -> String {
    let length = text.chars().count();
    let mut text = if length > width {
        if width <= 3 {
            text.chars().take(width).collect()
        } else {
            let mut truncated: String = text.chars().take(width - 3).collect();
            truncated.push_str("...");
            truncated
        }
    } else {
        text
    };
    let length = text.chars().count();
    if length < width {
        text.push_str(&" ".repeat(width - length));
    }
    text
}

fn format_document_status(viewer: &Viewer) -> String {
    let info = viewer.info();
    let navigator = viewer.navigator();
    let page = navigator.current_page();
    let mut status = format!(
        "{} | page {} ({}/{}) | {}",
        info.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("<unknown>"),
        navigator.label_for(page),
        page + 1,
        info.page_count,
        viewer.zoom().describe()
    );

    let search = viewer.search();
    if !search.query().is_empty() {
        status.push_str(&format_search_summary(
            search.query(),
            search.results().len(),
            viewer.search_cursor(),
        ));
    }
    status
}

fn format_search_summary(query: &str, pages: usize, cursor: Option<usize>) -> String {
    match (pages, cursor) {
        (0, _) => format!(" | /{query} (no matches)"),
        (total, Some(index)) => format!(" | /{query} ({}/{total})", index + 1),
        (total, None) => format!(" | /{query} (0/{total})"),
    }
}

/// Status line text; a typed prompt replaces the notice.
fn compose_status(base: String, notice: Option<&str>, pending: Option<&str>) -> String {
    match (pending.filter(|s| !s.is_empty()), notice) {
        (Some(pending), _) => format!("{base} | {pending}"),
        (None, Some(notice)) => format!("{base} | {notice}"),
        (None, None) => base,
    }
}

fn init_logging(project_dirs: &ProjectDirs, default_filter: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RenderImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        RenderImage {
            width,
            height,
            pixels,
        }
    }

    fn viewport(width: f32, height: f32, content: &RenderImage, scroll_y: f32) -> Viewport {
        let mut viewport = Viewport::new(Size::new(width, height));
        viewport.set_content(Size::new(content.width as f32, content.height as f32));
        viewport.scroll_by(scroll_y);
        viewport
    }

    fn rows(pages: &[usize]) -> Vec<OverlayRow> {
        pages
            .iter()
            .enumerate()
            .map(|(idx, &page)| OverlayRow {
                depth: idx % 2,
                text: format!("entry {idx}"),
                page: Some(page),
                action: Some(Command::JumpToPage {
                    page,
                    location: None,
                }),
            })
            .collect()
    }

    #[test]
    fn args_accept_headless_modes() {
        let args = Args::try_parse_from(["pdfview", "doc.pdf", "--search", "needle"]).unwrap();
        assert_eq!(args.search.as_deref(), Some("needle"));
        assert!(!args.outline);

        let args =
            Args::try_parse_from(["pdfview", "doc.pdf", "--outline", "-p", "iv", "-z", "150%"])
                .unwrap();
        assert!(args.outline);
        assert_eq!(args.page.as_deref(), Some("iv"));
        assert_eq!(args.zoom.as_deref(), Some("150%"));

        assert!(Args::try_parse_from(["pdfview", "doc.pdf", "--outline", "--search", "x"]).is_err());
        assert!(Args::try_parse_from(["pdfview"]).is_err());
    }

    #[test]
    fn visible_region_follows_scroll() {
        let bitmap = gradient(40, 100);
        let view = viewport(40.0, 30.0, &bitmap, 25.0);
        let region = visible_region(&bitmap, &view).unwrap();
        assert_eq!(
            region,
            CropRegion {
                x: 0,
                y: 25,
                width: 40,
                height: 30
            }
        );

        let cropped = crop_render_image(&bitmap, region);
        assert_eq!((cropped.width, cropped.height), (40, 30));
        assert_eq!(cropped.pixels.len(), 40 * 30 * 4);
        // First pixel of the crop is row 25 of the source.
        assert_eq!(&cropped.pixels[..4], &[0, 25, 0, 255]);
    }

    #[test]
    fn wide_pages_are_cropped_around_the_center() {
        let bitmap = gradient(100, 20);
        let view = viewport(60.0, 50.0, &bitmap, 0.0);
        let region = visible_region(&bitmap, &view).unwrap();
        assert_eq!((region.x, region.width, region.height), (20, 60, 20));

        let cropped = crop_render_image(&bitmap, region);
        assert_eq!(&cropped.pixels[..4], &[20, 0, 0, 255]);
    }

    #[test]
    fn small_pages_are_shown_whole() {
        let bitmap = gradient(10, 10);
        let view = viewport(80.0, 80.0, &bitmap, 0.0);
        let region = visible_region(&bitmap, &view).unwrap();
        let cropped = crop_render_image(&bitmap, region);
        assert_eq!(cropped.pixels, bitmap.pixels);

        let empty = RenderImage {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        assert!(visible_region(&empty, &view).is_none());
    }

    #[test]
    fn cells_cover_the_crop_within_limits() {
        assert_eq!(cells_for(100, 10.0, 50), 10);
        assert_eq!(cells_for(101, 10.0, 50), 11);
        assert_eq!(cells_for(1000, 10.0, 50), 50);
        assert_eq!(cells_for(0, 10.0, 50), 1);
        assert_eq!(cells_for(100, 0.0, 7), 7);
    }

    #[test]
    fn layout_falls_back_without_pixel_size() {
        let layout = Layout::from_window(WindowSize {
            rows: 25,
            columns: 80,
            width: 0,
            height: 0,
        });
        assert_eq!(layout.cell, FALLBACK_CELL);
        assert_eq!(layout.image_rows(), 24);
        assert_eq!(layout.viewport_pixels(), Size::new(640.0, 384.0));

        let layout = Layout::from_window(WindowSize {
            rows: 50,
            columns: 100,
            width: 1000,
            height: 1000,
        });
        assert_eq!(layout.cell, Size::new(10.0, 20.0));
    }

    #[test]
    fn overlay_selection_follows_page_and_stays_visible() {
        let mut overlay = ListOverlay::new(OverlayKind::Outline, rows(&[0, 2, 2, 5, 9]), 3);
        assert_eq!(overlay.selected, 2);

        assert!(overlay.move_selection(10));
        assert_eq!(overlay.selected, 4);
        assert!(!overlay.move_selection(1));

        overlay.ensure_visible(2);
        assert_eq!(overlay.scroll_offset, 3);
        assert!(overlay.move_selection(-4));
        overlay.ensure_visible(2);
        assert_eq!(overlay.scroll_offset, 0);

        overlay.follow_page(7);
        assert_eq!(overlay.selected, 3);
        assert_eq!(
            overlay.selected_row().and_then(|row| row.action.clone()),
            Some(Command::JumpToPage {
                page: 5,
                location: None
            })
        );
    }

    #[test]
    fn empty_overlay_ignores_movement() {
        let mut overlay = ListOverlay::new(OverlayKind::Links, Vec::new(), 0);
        assert!(overlay.is_empty());
        assert!(!overlay.move_selection(1));
        assert!(overlay.selected_row().is_none());
        assert_eq!(overlay.empty_message(), "No links in this document");
    }

    #[test]
    fn rows_are_indented_marked_and_truncated() {
        let row = OverlayRow {
            depth: 1,
            text: "Introduction (p3)".to_string(),
            page: Some(2),
            action: None,
        };
        assert_eq!(row_length(&row), 21);
        assert_eq!(format_row(&row, true, 24), ">   Introduction (p3)   ");
        assert_eq!(format_row(&row, false, 12), "    Intro...");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_with_ellipsis("abcdef".into(), 4), "a...");
        assert_eq!(truncate_with_ellipsis("abcdef".into(), 2), "ab");
        assert_eq!(truncate_with_ellipsis("ab".into(), 4), "ab  ");
        assert_eq!(truncate_with_ellipsis("éèêë".into(), 4), "éèêë");
    }

    #[test]
    fn external_links_are_validated() {
        assert_eq!(
            describe_external_link("https://example.com/a b"),
            "link: https://example.com/a%20b"
        );
        assert!(describe_external_link("not a url").starts_with("invalid link"));
    }

    #[test]
    fn status_prefers_prompt_over_notice() {
        assert_eq!(compose_status("doc".into(), None, None), "doc");
        assert_eq!(compose_status("doc".into(), Some("copied"), None), "doc | copied");
        assert_eq!(
            compose_status("doc".into(), Some("copied"), Some("/nee")),
            "doc | /nee"
        );
        assert_eq!(compose_status("doc".into(), Some("copied"), Some("")), "doc | copied");
    }

    #[test]
    fn search_summary_reports_position() {
        assert_eq!(format_search_summary("x", 0, None), " | /x (no matches)");
        assert_eq!(format_search_summary("x", 4, Some(1)), " | /x (2/4)");
        assert_eq!(format_search_summary("x", 4, None), " | /x (0/4)");
    }
}
