use std::io::{self, Write};

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind},
    queue,
    terminal::{Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use pdfview_core::{
    Command, Gesture, NavKey, Point, RenderImage, Size, ZoomMode, ZoomRequest,
};
use tracing::trace;

const CHUNK_SIZE: usize = 4096;

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` as PNG and places it over `params` cells at the
    /// cursor, replacing the previous placement.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
            bail!(
                "bitmap {}x{} carries {} bytes, expected {}",
                image.width,
                image.height,
                image.pixels.len(),
                expected
            );
        }

        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut png = encoder.write_header()?;
        png.write_image_data(&image.pixels)?;
        png.finish()?;

        let encoded = BASE64.encode(&buffer);
        trace!(bytes = encoded.len(), "kitty payload");
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends the synchronized update; the terminal paints everything buffered
    /// since [`KittyRenderer::begin_sync_update`] at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Removes every image placement and clears the text layer.
    pub fn clear_all(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Which line-editing prompt is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Page,
    Zoom,
    Search,
}

impl PromptKind {
    pub fn prefix(self) -> char {
        match self {
            PromptKind::Page => ':',
            PromptKind::Zoom => '%',
            PromptKind::Search => '/',
        }
    }

    fn submit(self, text: String) -> Command {
        match self {
            PromptKind::Page => Command::GotoInput(text),
            PromptKind::Zoom => Command::ZoomText(text),
            PromptKind::Search => Command::Search(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Outline,
    Links,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Gesture(Gesture),
    Command(Command),
    OpenOverlay(OverlayKind),
    CloseOverlay,
    OverlayMoveSelection { delta: isize },
    OverlayActivateSelection,
    BeginPrompt(PromptKind),
    PromptChanged { kind: PromptKind, text: String },
    PromptCancel,
    GotoLastPage,
    CopyHitText,
    Resized { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Overlay,
    Prompt(PromptKind),
}

/// Translates terminal events into viewer input, keeping numeric prefixes and
/// prompt buffers between events.
#[derive(Debug)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    prompt_buffer: String,
    cell_size: Size,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self {
            pending_count: None,
            pending_digits: String::new(),
            mode: InputMode::Normal,
            prompt_buffer: String::new(),
            cell_size: Size::new(1.0, 1.0),
        }
    }
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel size of one terminal cell, used to place wheel anchors.
    pub fn set_cell_size(&mut self, cell_size: Size) {
        if !cell_size.is_empty() {
            self.cell_size = cell_size;
        }
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.prompt_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Release => UiEvent::None,
            Event::Key(key) => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::Overlay => self.map_key_overlay(key),
                InputMode::Prompt(kind) => self.map_key_prompt(kind, key),
            },
            Event::Mouse(mouse) if self.mode == InputMode::Normal => self.map_mouse(mouse),
            Event::Resize(columns, rows) => UiEvent::Resized { columns, rows },
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let delta_y = match mouse.kind {
            MouseEventKind::ScrollDown => 1.0,
            MouseEventKind::ScrollUp => -1.0,
            _ => return UiEvent::None,
        };
        self.reset_count();
        UiEvent::Gesture(Gesture::Wheel {
            delta_y,
            ctrl: mouse.modifiers.contains(KeyModifiers::CONTROL),
            anchor: Some(Point::new(
                f32::from(mouse.column) * self.cell_size.width,
                f32::from(mouse.row) * self.cell_size.height,
            )),
        })
    }

    fn map_key_normal(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        let shifted = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Down, KeyModifiers::NONE) | (KeyCode::Char('j'), KeyModifiers::NONE) => {
                self.key(NavKey::Down)
            }
            (KeyCode::Up, KeyModifiers::NONE) | (KeyCode::Char('k'), KeyModifiers::NONE) => {
                self.key(NavKey::Up)
            }
            (KeyCode::Left, KeyModifiers::NONE) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
                self.key(NavKey::Left)
            }
            (KeyCode::Right, KeyModifiers::NONE) | (KeyCode::Char('l'), KeyModifiers::NONE) => {
                self.key(NavKey::Right)
            }
            (KeyCode::PageDown, _) | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                self.command(Command::NextPage)
            }
            (KeyCode::PageUp, _) | (KeyCode::Backspace, _) => self.command(Command::PrevPage),
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.command(Command::JumpToPage {
                    page: 0,
                    location: None,
                })
            }
            (KeyCode::Char('G'), _) if shifted => match self.take_count() {
                Some(count) => self.command(Command::GotoInput(count.to_string())),
                None => UiEvent::GotoLastPage,
            },
            (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::GotoLastPage
            }
            (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => self.command(Command::ZoomIn),
            (KeyCode::Char('-'), _) => self.command(Command::ZoomOut),
            (KeyCode::Char('w'), KeyModifiers::NONE) => {
                self.command(Command::SetZoom(ZoomRequest::Fit(ZoomMode::FitWidth)))
            }
            (KeyCode::Char('e'), KeyModifiers::NONE) => {
                self.command(Command::SetZoom(ZoomRequest::Fit(ZoomMode::FitHeight)))
            }
            (KeyCode::Char('r'), KeyModifiers::NONE) => self.rotate(true),
            (KeyCode::Char('R'), _) if shifted => self.rotate(false),
            (KeyCode::Char(':'), _) => self.begin_prompt(PromptKind::Page),
            (KeyCode::Char('%'), _) => self.begin_prompt(PromptKind::Zoom),
            (KeyCode::Char('/'), _) => self.begin_prompt(PromptKind::Search),
            (KeyCode::Char('n'), KeyModifiers::NONE) => self.command(Command::SearchNext),
            (KeyCode::Char('N'), _) if shifted => self.command(Command::SearchPrev),
            (KeyCode::Char('t'), KeyModifiers::NONE) => self.open_overlay(OverlayKind::Outline),
            (KeyCode::Char('L'), _) if shifted => self.open_overlay(OverlayKind::Links),
            (KeyCode::Char('y'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CopyHitText
            }
            (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_overlay(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Char('t'), _) | (KeyCode::Char('L'), _) => {
                UiEvent::CloseOverlay
            }
            (KeyCode::Enter, _) => UiEvent::OverlayActivateSelection,
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::OverlayMoveSelection { delta: 1 }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::OverlayMoveSelection { delta: -1 }
            }
            (KeyCode::PageDown, _) => UiEvent::OverlayMoveSelection { delta: 10 },
            (KeyCode::PageUp, _) => UiEvent::OverlayMoveSelection { delta: -10 },
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn map_key_prompt(
        &mut self,
        kind: PromptKind,
        KeyEvent { code, modifiers, .. }: KeyEvent,
    ) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::PromptCancel
            }
            (KeyCode::Enter, _) => {
                let text = std::mem::take(&mut self.prompt_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::Command(kind.submit(text))
            }
            (KeyCode::Backspace, _) => {
                if self.prompt_buffer.pop().is_none() {
                    self.set_mode(InputMode::Normal);
                    return UiEvent::PromptCancel;
                }
                self.prompt_changed(kind)
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.prompt_buffer.push(c);
                self.prompt_changed(kind)
            }
            _ => UiEvent::None,
        }
    }

    fn prompt_changed(&self, kind: PromptKind) -> UiEvent {
        UiEvent::PromptChanged {
            kind,
            text: self.prompt_buffer.clone(),
        }
    }

    fn key(&mut self, key: NavKey) -> UiEvent {
        self.reset_count();
        UiEvent::Gesture(Gesture::Key(key))
    }

    fn command(&mut self, command: Command) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn rotate(&mut self, clockwise: bool) -> UiEvent {
        self.command(Command::Rotate { clockwise })
    }

    fn begin_prompt(&mut self, kind: PromptKind) -> UiEvent {
        self.set_mode(InputMode::Prompt(kind));
        UiEvent::BeginPrompt(kind)
    }

    fn open_overlay(&mut self, kind: OverlayKind) -> UiEvent {
        self.set_mode(InputMode::Overlay);
        UiEvent::OpenOverlay(kind)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> Option<usize> {
        self.pending_digits.clear();
        self.pending_count.take().filter(|&count| count > 0)
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// What the user has typed so far, for the status line.
    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Prompt(kind) => Some(format!("{}{}", kind.prefix(), self.prompt_buffer)),
            _ if !self.pending_digits.is_empty() => Some(self.pending_digits.clone()),
            _ => None,
        }
    }
}

/// Writes `label` on terminal row `row`, cut to `width` columns.
pub fn write_status_line<W: Write>(writer: &mut W, row: u16, width: u16, label: &str) -> io::Result<()> {
    let text: String = label.chars().take(usize::from(width)).collect();
    queue!(writer, cursor::MoveTo(0, row), Clear(ClearType::CurrentLine))?;
    write!(writer, "{}", text)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = String::from_utf8(renderer.writer).unwrap();
        assert!(output.starts_with("\u{1b}_Ga=T,f=100"));
        assert!(output.contains("c=10,r=5,s=1,v=1"));
        assert!(output.ends_with("\u{1b}\\"));
    }

    #[test]
    fn kitty_draw_rejects_short_buffers() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 2,
            height: 2,
            pixels: vec![0; 4],
        };
        assert!(renderer.draw(&image, DrawParams::clamped(1, 1)).is_err());
        assert!(renderer.writer().is_empty());
    }

    #[test]
    fn large_payloads_are_chunked() {
        let mut renderer = KittyRenderer::new(Vec::new());
        // Noise keeps the PNG from compressing below one chunk.
        let mut state = 0x2545_f491u32;
        let pixels = (0..64 * 64 * 4)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let image = RenderImage {
            width: 64,
            height: 64,
            pixels,
        };
        renderer.draw(&image, DrawParams::clamped(0, 0)).unwrap();
        let output = String::from_utf8(renderer.writer).unwrap();
        assert!(output.contains(",m=1;"));
        assert!(output.contains("\u{1b}_Gm=0,q=2;"));
        assert!(output.contains("c=1,r=1"));
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn scroll(kind: MouseEventKind, modifiers: KeyModifiers) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column: 4,
            row: 2,
            modifiers,
        })
    }

    #[test]
    fn wheel_becomes_gesture_with_pixel_anchor() {
        let mut mapper = EventMapper::new();
        mapper.set_cell_size(Size::new(10.0, 20.0));

        assert_eq!(
            mapper.map_event(scroll(MouseEventKind::ScrollDown, KeyModifiers::NONE)),
            UiEvent::Gesture(Gesture::Wheel {
                delta_y: 1.0,
                ctrl: false,
                anchor: Some(Point::new(40.0, 40.0)),
            })
        );
        match mapper.map_event(scroll(MouseEventKind::ScrollUp, KeyModifiers::CONTROL)) {
            UiEvent::Gesture(Gesture::Wheel { delta_y, ctrl, .. }) => {
                assert_eq!(delta_y, -1.0);
                assert!(ctrl);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn arrows_become_navigation_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Left)),
            UiEvent::Gesture(Gesture::Key(NavKey::Left))
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Gesture(Gesture::Key(NavKey::Down))
        );
    }

    #[test]
    fn key_release_is_ignored() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(release), UiEvent::None);
    }

    #[test]
    fn numeric_prefix_before_capital_g_goes_to_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('G'), KeyModifiers::SHIFT)),
            UiEvent::Command(Command::GotoInput("12".into()))
        );
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('G'), KeyModifiers::SHIFT)),
            UiEvent::GotoLastPage
        );
    }

    #[test]
    fn prefix_is_dropped_by_other_keys() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('+'))), UiEvent::Command(Command::ZoomIn));
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn zoom_and_rotation_shortcuts() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('w'))),
            UiEvent::Command(Command::SetZoom(ZoomRequest::Fit(ZoomMode::FitWidth)))
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('r'))),
            UiEvent::Command(Command::Rotate { clockwise: true })
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('R'), KeyModifiers::SHIFT)),
            UiEvent::Command(Command::Rotate { clockwise: false })
        );
    }

    #[test]
    fn search_prompt_collects_and_submits() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('/'))),
            UiEvent::BeginPrompt(PromptKind::Search)
        );
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));

        mapper.map_event(key_event(KeyCode::Char('f')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('x'))),
            UiEvent::PromptChanged {
                kind: PromptKind::Search,
                text: "fx".into()
            }
        );
        mapper.map_event(key_event(KeyCode::Backspace));
        assert_eq!(mapper.pending_input().as_deref(), Some("/f"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(Command::Search("f".into()))
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn page_and_zoom_prompts_submit_their_commands() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char(':')));
        mapper.map_event(key_event(KeyCode::Char('i')));
        mapper.map_event(key_event(KeyCode::Char('v')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(Command::GotoInput("iv".into()))
        );

        mapper.map_event(key_event_with_modifiers(KeyCode::Char('%'), KeyModifiers::SHIFT));
        for c in "150".chars() {
            mapper.map_event(key_event(KeyCode::Char(c)));
        }
        assert_eq!(mapper.pending_input().as_deref(), Some("%150"));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(Command::ZoomText("150".into()))
        );
    }

    #[test]
    fn backspace_on_empty_prompt_cancels() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char(':')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Backspace)), UiEvent::PromptCancel);
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn overlay_mode_maps_navigation_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::OpenOverlay(OverlayKind::Outline)
        );
        assert_eq!(mapper.mode(), InputMode::Overlay);

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::OverlayMoveSelection { delta: 1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::OverlayMoveSelection { delta: -1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::OverlayActivateSelection
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::CloseOverlay);
        // Wheel events are not routed while an overlay is open.
        assert_eq!(
            mapper.map_event(scroll(MouseEventKind::ScrollDown, KeyModifiers::NONE)),
            UiEvent::None
        );
    }

    #[test]
    fn switching_modes_clears_pending_state() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        assert_eq!(mapper.pending_input().as_deref(), Some("1"));

        mapper.set_mode(InputMode::Overlay);
        assert!(mapper.pending_input().is_none());
        mapper.set_mode(InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn status_line_is_truncated_to_width() {
        let mut out = Vec::new();
        write_status_line(&mut out, 3, 5, "page 12 of 300").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("page "));
        assert!(!text.contains("12"));
    }
}
