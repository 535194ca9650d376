use std::collections::BTreeMap;

use tracing::{debug, instrument, warn};

use crate::cache::PageCache;
use crate::config::RenderConfig;
use crate::engine::{DisplayList, DocumentBackend, PageHandle, RawPixmap};
use crate::error::{ViewerError, ViewerResult};
use crate::geometry::{Quad, Size, Transform};
use crate::zoom::ZoomController;
use crate::RenderImage;

/// Search hit regions per page, applied as highlights at render time only.
pub type HighlightSet = BTreeMap<usize, Vec<Quad>>;

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    max_size: Option<Size>,
    highlights: HighlightSet,
}

impl Renderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_size: config.max_size(),
            highlights: HighlightSet::new(),
        }
    }

    pub fn set_highlights(&mut self, highlights: HighlightSet) {
        self.highlights = highlights;
    }

    pub fn clear_highlights(&mut self) {
        self.highlights.clear();
    }

    pub fn highlights(&self) -> &HighlightSet {
        &self.highlights
    }

    /// Scale that fits a page of `display_size` into the maximum render box,
    /// growing small pages as well as shrinking large ones.
    pub fn base_scale(&self, display_size: Size) -> f32 {
        match self.max_size {
            Some(max) if !display_size.is_empty() => {
                (max.width / display_size.width).min(max.height / display_size.height)
            }
            _ => 1.0,
        }
    }

    /// Rendered size of a page at zoom factor 1.0.
    pub fn display_size(&self, page_display_size: Size) -> Size {
        page_display_size.scaled(self.base_scale(page_display_size))
    }

    pub fn transform(&self, list: &DisplayList, zoom_factor: f32) -> Transform {
        let scale = self.base_scale(list.display_size()) * zoom_factor;
        Transform::scale(scale, scale)
    }

    #[instrument(skip(self, backend, cache, zoom), fields(factor = zoom.factor()))]
    pub fn render(
        &self,
        backend: &dyn DocumentBackend,
        cache: &mut PageCache,
        zoom: &ZoomController,
        page_index: usize,
    ) -> ViewerResult<RenderImage> {
        let base = cache.get(backend, page_index)?;

        let regions = self
            .highlights
            .get(&page_index)
            .filter(|regions| !regions.is_empty());

        match regions {
            Some(regions) => {
                let overlay = AnnotationOverlay::apply(backend, page_index, regions)?;
                let transient = backend
                    .build_display_list(overlay.page())
                    .map_err(|source| ViewerError::PageLoad {
                        page: page_index,
                        source,
                    })?;
                debug!(page = page_index, regions = regions.len(), "rendering with highlights");
                self.rasterize(backend, &transient, zoom.factor())
            }
            None => self.rasterize(backend, &base, zoom.factor()),
        }
    }

    fn rasterize(
        &self,
        backend: &dyn DocumentBackend,
        list: &DisplayList,
        zoom_factor: f32,
    ) -> ViewerResult<RenderImage> {
        let page = list.page_index();
        let transform = self.transform(list, zoom_factor);
        let raw = backend
            .rasterize(list, &transform, false)
            .map_err(|err| ViewerError::Rasterize {
                page,
                reason: format!("{err:#}"),
            })?;
        to_render_image(raw).map_err(|reason| ViewerError::Rasterize { page, reason })
    }
}

/// Highlights attached to a page for the duration of one render. The page's
/// annotations are cleared before insertion and again on drop.
struct AnnotationOverlay<'a> {
    backend: &'a dyn DocumentBackend,
    page: PageHandle,
}

impl<'a> AnnotationOverlay<'a> {
    fn apply(
        backend: &'a dyn DocumentBackend,
        page_index: usize,
        regions: &[Quad],
    ) -> ViewerResult<Self> {
        let page_error = |source: anyhow::Error| ViewerError::PageLoad {
            page: page_index,
            source,
        };
        let page = backend.load_page(page_index).map_err(page_error)?;
        backend.clear_annotations(&page).map_err(page_error)?;
        let overlay = Self { backend, page };
        for region in regions {
            backend
                .insert_highlight(&overlay.page, region)
                .map_err(page_error)?;
        }
        Ok(overlay)
    }

    fn page(&self) -> &PageHandle {
        &self.page
    }
}

impl Drop for AnnotationOverlay<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.backend.clear_annotations(&self.page) {
            warn!(?err, page = self.page.index, "failed to clear transient highlights");
        }
    }
}

/// Converts engine samples into the RGBA8 display format.
fn to_render_image(raw: RawPixmap) -> Result<RenderImage, String> {
    if raw.width == 0 || raw.height == 0 {
        return Err(format!("empty pixmap {}x{}", raw.width, raw.height));
    }
    let channels = usize::from(raw.channels);
    let expected = raw.width as usize * raw.height as usize * channels;
    if raw.samples.len() != expected {
        return Err(format!(
            "pixmap holds {} bytes, expected {} for {}x{}x{}",
            raw.samples.len(),
            expected,
            raw.width,
            raw.height,
            channels
        ));
    }

    let pixels = match channels {
        4 => raw.samples,
        3 => {
            let mut rgba = Vec::with_capacity(raw.width as usize * raw.height as usize * 4);
            for rgb in raw.samples.chunks_exact(3) {
                rgba.extend_from_slice(rgb);
                rgba.push(255);
            }
            rgba
        }
        other => return Err(format!("unsupported channel count {other}")),
    };

    Ok(RenderImage {
        width: raw.width,
        height: raw.height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoomConfig;
    use crate::testing::{hit_quad, AnnotationOp, FakeBackend};

    fn setup(pages: usize) -> (Renderer, PageCache, ZoomController) {
        (
            Renderer::new(&RenderConfig::default()),
            PageCache::new(pages),
            ZoomController::new(ZoomConfig::default()),
        )
    }

    #[test]
    fn renders_rgba_bitmap_scaled_into_render_box() {
        let backend = FakeBackend::new(2);
        let (renderer, mut cache, zoom) = setup(2);

        let image = renderer.render(&backend, &mut cache, &zoom, 0).unwrap();
        // 600x800 fits 1920x1080 at 1.35.
        assert_eq!((image.width, image.height), (810, 1080));
        assert_eq!(image.pixels.len(), 810 * 1080 * 4);
        assert_eq!(image.pixels[3], 255);
    }

    #[test]
    fn zoom_factor_scales_output() {
        let backend = FakeBackend::new(1);
        let (renderer, mut cache, mut zoom) = setup(1);
        zoom.set_factor(2.0);
        let image = renderer.render(&backend, &mut cache, &zoom, 0).unwrap();
        assert_eq!((image.width, image.height), (1620, 2160));
    }

    #[test]
    fn highlights_are_transient() {
        let backend = FakeBackend::new(3);
        let (mut renderer, mut cache, zoom) = setup(3);
        let mut set = HighlightSet::new();
        set.insert(1, vec![hit_quad(1, 0), hit_quad(1, 1)]);
        renderer.set_highlights(set);

        renderer.render(&backend, &mut cache, &zoom, 1).unwrap();

        assert_eq!(
            backend.annotation_log(),
            [
                AnnotationOp::Clear(1),
                AnnotationOp::Insert(1),
                AnnotationOp::Insert(1),
                AnnotationOp::Clear(1),
            ]
        );
        assert_eq!(backend.live_annotations(1), 0);
        let rasterized = backend.last_rasterized().unwrap();
        assert_eq!(rasterized.annotations().len(), 2);

        let cached = cache.get(&backend, 1).unwrap();
        assert!(cached.annotations().is_empty());
        assert_eq!(cache.build_count(), 1);
    }

    #[test]
    fn pages_without_hits_skip_annotation_work() {
        let backend = FakeBackend::new(3);
        let (mut renderer, mut cache, zoom) = setup(3);
        let mut set = HighlightSet::new();
        set.insert(2, vec![hit_quad(2, 0)]);
        renderer.set_highlights(set);

        renderer.render(&backend, &mut cache, &zoom, 0).unwrap();
        assert!(backend.annotation_log().is_empty());
        assert!(backend.last_rasterized().unwrap().annotations().is_empty());
    }

    #[test]
    fn clearing_highlights_renders_plain_page() {
        let backend = FakeBackend::new(1);
        let (mut renderer, mut cache, zoom) = setup(1);
        let mut set = HighlightSet::new();
        set.insert(0, vec![hit_quad(0, 0)]);
        renderer.set_highlights(set);
        renderer.render(&backend, &mut cache, &zoom, 0).unwrap();

        renderer.clear_highlights();
        renderer.render(&backend, &mut cache, &zoom, 0).unwrap();
        assert!(backend.last_rasterized().unwrap().annotations().is_empty());
    }

    #[test]
    fn broken_pixmap_is_a_rasterize_error() {
        let backend = FakeBackend::new(2).with_broken_raster(1);
        let (renderer, mut cache, zoom) = setup(2);
        assert!(matches!(
            renderer.render(&backend, &mut cache, &zoom, 1),
            Err(ViewerError::Rasterize { page: 1, .. })
        ));
        assert!(renderer.render(&backend, &mut cache, &zoom, 0).is_ok());
    }

    #[test]
    fn corrupt_page_is_a_page_load_error() {
        let backend = FakeBackend::new(2).with_corrupt_page(0);
        let (renderer, mut cache, zoom) = setup(2);
        assert!(matches!(
            renderer.render(&backend, &mut cache, &zoom, 0),
            Err(ViewerError::PageLoad { page: 0, .. })
        ));
    }

    #[test]
    fn rgb_samples_gain_opaque_alpha() {
        let image = to_render_image(RawPixmap {
            width: 2,
            height: 1,
            channels: 3,
            samples: vec![1, 2, 3, 4, 5, 6],
        })
        .unwrap();
        assert_eq!(image.pixels, [1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(to_render_image(RawPixmap {
            width: 0,
            height: 1,
            channels: 3,
            samples: Vec::new(),
        })
        .is_err());
    }
}
