use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ViewerError;
use crate::geometry::Size;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub initial: f32,
    /// Margin kept on each side of the page in fit modes, in pixels.
    pub fit_margin: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 3.0,
            step: 0.25,
            initial: 1.0,
            fit_margin: 10.0,
        }
    }
}

impl ZoomConfig {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let mut out = self;
        if !(out.min.is_finite() && out.min > 0.0) {
            warn!(min = out.min, "zoom.min must be positive; using default");
            out.min = defaults.min;
        }
        if !(out.max.is_finite() && out.max >= out.min) {
            warn!(max = out.max, min = out.min, "zoom.max below zoom.min; using default");
            out.max = defaults.max.max(out.min);
        }
        if !(out.step.is_finite() && out.step > 0.0) {
            warn!(step = out.step, "zoom.step must be positive; using default");
            out.step = defaults.step;
        }
        if !out.initial.is_finite() {
            out.initial = defaults.initial;
        }
        if !(out.fit_margin.is_finite() && out.fit_margin >= 0.0) {
            out.fit_margin = defaults.fit_margin;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Pages are first scaled to fit this box, then by the zoom factor.
    /// Either side set to 0 disables the base fit.
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
        }
    }
}

impl RenderConfig {
    pub fn max_size(&self) -> Option<Size> {
        if self.max_width == 0 || self.max_height == 0 {
            None
        } else {
            Some(Size::new(self.max_width as f32, self.max_height as f32))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Pixels scrolled per wheel notch.
    pub wheel_step: f32,
    /// Pixels scrolled per arrow key press.
    pub key_step: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            wheel_step: 120.0,
            key_step: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub zoom: ZoomConfig,
    pub render: RenderConfig,
    pub input: InputConfig,
    pub log_filter: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom: ZoomConfig::default(),
            render: RenderConfig::default(),
            input: InputConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn default_path(dirs: &ProjectDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {:?}", path))
            .map_err(|source| ViewerError::Config {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&raw).map_err(|source| ViewerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut config: ViewerConfig = toml::from_str(raw).context("malformed TOML")?;
        config.zoom = config.zoom.normalized();
        Ok(config)
    }
}
