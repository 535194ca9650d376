use tracing::debug;

use crate::config::ZoomConfig;
use crate::geometry::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoomMode {
    #[default]
    Custom,
    FitWidth,
    FitHeight,
}

/// A zoom instruction parsed from user text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomRequest {
    Factor(f32),
    Fit(ZoomMode),
}

#[derive(Debug, Clone)]
pub struct ZoomController {
    factor: f32,
    mode: ZoomMode,
    settings: ZoomConfig,
}

impl ZoomController {
    pub fn new(settings: ZoomConfig) -> Self {
        let settings = settings.normalized();
        let factor = settings.initial.clamp(settings.min, settings.max);
        Self {
            factor,
            mode: ZoomMode::Custom,
            settings,
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn mode(&self) -> ZoomMode {
        self.mode
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.settings.min, self.settings.max)
    }

    /// Returns whether the factor changed.
    pub fn zoom_in(&mut self) -> bool {
        self.step_by(self.settings.step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.step_by(-self.settings.step)
    }

    fn step_by(&mut self, delta: f32) -> bool {
        let target = self.factor + delta;
        self.set_factor(target)
    }

    /// Explicit factor; non-finite values are ignored.
    pub fn set_factor(&mut self, factor: f32) -> bool {
        if !factor.is_finite() {
            return false;
        }
        self.mode = ZoomMode::Custom;
        self.store(factor)
    }

    pub fn set_fit_mode(&mut self, mode: ZoomMode, viewport: Size, page: Size) -> bool {
        self.mode = mode;
        self.refit(viewport, page)
    }

    /// Recomputes a sticky fit mode for a new viewport or page size.
    pub fn refit(&mut self, viewport: Size, page: Size) -> bool {
        let margin = self.settings.fit_margin * 2.0;
        let factor = match self.mode {
            ZoomMode::Custom => return false,
            ZoomMode::FitWidth if page.width > 0.0 => (viewport.width - margin) / page.width,
            ZoomMode::FitHeight if page.height > 0.0 => (viewport.height - margin) / page.height,
            _ => return false,
        };
        if !factor.is_finite() {
            return false;
        }
        debug!(mode = ?self.mode, factor, "fit zoom recomputed");
        self.store(factor)
    }

    fn store(&mut self, factor: f32) -> bool {
        let clamped = factor.clamp(self.settings.min, self.settings.max);
        let changed = (clamped - self.factor).abs() > f32::EPSILON;
        self.factor = clamped;
        changed
    }

    pub fn apply(&mut self, request: ZoomRequest, viewport: Size, page: Size) -> bool {
        match request {
            ZoomRequest::Factor(factor) => self.set_factor(factor),
            ZoomRequest::Fit(ZoomMode::Custom) => {
                self.mode = ZoomMode::Custom;
                false
            }
            ZoomRequest::Fit(mode) => self.set_fit_mode(mode, viewport, page),
        }
    }

    /// Accepts `"150%"`, `"150"` or a fit label. Anything else yields `None`.
    pub fn parse_text_input(text: &str) -> Option<ZoomRequest> {
        let text = text.trim().to_ascii_lowercase();
        match text.as_str() {
            "fit width" | "fit-width" | "width" | "page width" => {
                return Some(ZoomRequest::Fit(ZoomMode::FitWidth))
            }
            "fit height" | "fit-height" | "height" | "page height" | "page" => {
                return Some(ZoomRequest::Fit(ZoomMode::FitHeight))
            }
            _ => {}
        }
        let number = text.strip_suffix('%').unwrap_or(&text).trim();
        let percent: f32 = number.parse().ok()?;
        if !percent.is_finite() {
            return None;
        }
        Some(ZoomRequest::Factor(percent / 100.0))
    }

    pub fn describe(&self) -> String {
        match self.mode {
            ZoomMode::Custom => format!("{:.0}%", self.factor * 100.0),
            ZoomMode::FitWidth => format!("fit width ({:.0}%)", self.factor * 100.0),
            ZoomMode::FitHeight => format!("fit height ({:.0}%)", self.factor * 100.0),
        }
    }
}
