use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod input;
pub mod navigation;
pub mod outline;
pub mod renderer;
pub mod search;
pub mod session;
pub mod zoom;

#[cfg(test)]
mod testing;

pub use cache::PageCache;
pub use config::{InputConfig, RenderConfig, ViewerConfig, ZoomConfig};
pub use engine::{DisplayList, DocumentBackend, DocumentProvider, PageHandle, RawPixmap};
pub use error::{ViewerError, ViewerResult};
pub use events::{EventBus, ViewerEvent};
pub use geometry::{Point, Quad, Rect, Rotation, Size, Transform};
pub use input::{Gesture, InputRouter, NavKey, RoutedAction, Viewport};
pub use navigation::{JumpTarget, NavigationOutcome, PageLocation, PageNavigator};
pub use outline::{LinkEntry, LinkTarget, LinkTree, OutlineRow, OutlineTree, TocEntry};
pub use renderer::{HighlightSet, Renderer};
pub use search::{SearchHit, SearchIndex};
pub use session::{Command, CommandOutcome, Viewer};
pub use zoom::{ZoomController, ZoomMode, ZoomRequest};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"urn:pdfview:document"));

/// Stable id for the document at `path`, derived from its canonical location.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// Display-ready RGBA8 bitmap.
#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let first = document_id_for_path(&file_path);
        let second = document_id_for_path(&file_path);

        assert_eq!(first, second);
    }

    #[test]
    fn relative_and_absolute_paths_agree() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let via_dots = dir.path().join(".").join("sample.pdf");
        assert_eq!(document_id_for_path(&file_path), document_id_for_path(&via_dots));
        assert_ne!(
            document_id_for_path(&file_path),
            document_id_for_path(&dir.path().join("other.pdf"))
        );
    }
}
