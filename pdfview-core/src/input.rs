use tracing::debug;

use crate::config::InputConfig;
use crate::geometry::{Point, Size};
use crate::navigation::{PageLocation, PageNavigator};

const EDGE_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
}

/// Raw pointer and keyboard input as delivered by the display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// `delta_y` is in wheel notches; positive scrolls down.
    Wheel {
        delta_y: f32,
        ctrl: bool,
        anchor: Option<Point>,
    },
    Key(NavKey),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoutedAction {
    Zoom {
        zoom_in: bool,
        anchor: Option<Point>,
    },
    Jump {
        page: usize,
        location: PageLocation,
    },
    /// Pixels to scroll the viewport by.
    Scroll(f32),
    Previous,
    Next,
    None,
}

/// Visible window onto the rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub size: Size,
    pub content: Size,
    pub scroll_y: f32,
}

impl Viewport {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            content: Size::default(),
            scroll_y: 0.0,
        }
    }

    pub fn max_scroll(&self) -> f32 {
        (self.content.height - self.size.height).max(0.0)
    }

    pub fn at_top(&self) -> bool {
        self.scroll_y <= EDGE_TOLERANCE
    }

    pub fn at_bottom(&self) -> bool {
        self.scroll_y >= self.max_scroll() - EDGE_TOLERANCE
    }

    pub fn resize(&mut self, size: Size) {
        self.size = size;
        self.clamp();
    }

    pub fn set_content(&mut self, content: Size) {
        self.content = content;
        self.clamp();
    }

    /// Returns whether the offset moved.
    pub fn scroll_by(&mut self, delta: f32) -> bool {
        let before = self.scroll_y;
        self.scroll_y += delta;
        self.clamp();
        (self.scroll_y - before).abs() > f32::EPSILON
    }

    /// `scale` converts page points into content pixels.
    pub fn scroll_to(&mut self, location: PageLocation, scale: f32) {
        self.scroll_y = match location {
            PageLocation::Top => 0.0,
            PageLocation::Bottom => self.max_scroll(),
            PageLocation::Offset(y) => y * scale,
        };
        self.clamp();
    }

    /// Scales the content by `ratio` while keeping the content point under
    /// `anchor_y` (viewport pixels) in place.
    pub fn rescale_anchored(&mut self, ratio: f32, anchor_y: f32) {
        if !(ratio.is_finite() && ratio > 0.0) {
            return;
        }
        let anchor_y = anchor_y.clamp(0.0, self.size.height);
        let content_y = self.scroll_y + anchor_y;
        self.content = self.content.scaled(ratio);
        self.scroll_y = content_y * ratio - anchor_y;
        self.clamp();
    }

    fn clamp(&mut self) {
        if !self.scroll_y.is_finite() {
            self.scroll_y = 0.0;
        }
        self.scroll_y = self.scroll_y.clamp(0.0, self.max_scroll());
    }
}

#[derive(Debug, Clone)]
pub struct InputRouter {
    settings: InputConfig,
}

impl InputRouter {
    pub fn new(settings: InputConfig) -> Self {
        Self { settings }
    }

    /// Decides what a gesture means without touching any state.
    pub fn route(
        &self,
        gesture: Gesture,
        navigator: &PageNavigator,
        viewport: &Viewport,
    ) -> RoutedAction {
        let action = match gesture {
            Gesture::Wheel {
                delta_y,
                ctrl: true,
                anchor,
            } if delta_y != 0.0 => RoutedAction::Zoom {
                zoom_in: delta_y < 0.0,
                anchor,
            },
            Gesture::Wheel { delta_y, .. } => {
                self.vertical(delta_y * self.settings.wheel_step, navigator, viewport)
            }
            Gesture::Key(NavKey::Left) => RoutedAction::Previous,
            Gesture::Key(NavKey::Right) => RoutedAction::Next,
            Gesture::Key(NavKey::Up) => {
                self.vertical(-self.settings.key_step, navigator, viewport)
            }
            Gesture::Key(NavKey::Down) => {
                self.vertical(self.settings.key_step, navigator, viewport)
            }
        };
        debug!(?gesture, ?action, "gesture routed");
        action
    }

    fn vertical(&self, delta: f32, navigator: &PageNavigator, viewport: &Viewport) -> RoutedAction {
        if delta == 0.0 || !delta.is_finite() {
            return RoutedAction::None;
        }
        let page = navigator.current_page();
        if delta > 0.0 && viewport.at_bottom() {
            if navigator.is_last_page() {
                return RoutedAction::None;
            }
            return RoutedAction::Jump {
                page: page + 1,
                location: PageLocation::Top,
            };
        }
        if delta < 0.0 && viewport.at_top() {
            return match page.checked_sub(1) {
                Some(previous) => RoutedAction::Jump {
                    page: previous,
                    location: PageLocation::Bottom,
                },
                None => RoutedAction::None,
            };
        }
        RoutedAction::Scroll(delta)
    }
}
