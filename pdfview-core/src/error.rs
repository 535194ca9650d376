use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the viewer core.
///
/// Only [`ViewerError::DocumentOpen`] is fatal; page-scoped variants are
/// recovered by the [`Viewer`](crate::Viewer) and leave the rest of the
/// document usable.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to open document {path:?}")]
    DocumentOpen {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load page {page}")]
    PageLoad {
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to rasterize page {page}: {reason}")]
    Rasterize { page: usize, reason: String },

    #[error("invalid configuration in {path:?}")]
    Config {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl ViewerError {
    /// Page the error is scoped to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            ViewerError::PageLoad { page, .. } | ViewerError::Rasterize { page, .. } => Some(*page),
            ViewerError::DocumentOpen { .. } | ViewerError::Config { .. } => None,
        }
    }
}

pub type ViewerResult<T> = std::result::Result<T, ViewerError>;
