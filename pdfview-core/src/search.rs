use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::engine::DocumentBackend;
use crate::geometry::Quad;
use crate::renderer::HighlightSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub page_index: usize,
    pub page_label: String,
    pub regions: Vec<Quad>,
}

/// Full-document text search results. Every query rebuilds the results from
/// scratch.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    query: String,
    results: Vec<SearchHit>,
    hit_count: usize,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[SearchHit] {
        &self.results
    }

    pub fn result(&self, index: usize) -> Option<&SearchHit> {
        self.results.get(index)
    }

    pub fn hit_count(&self) -> usize {
        self.hit_count
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.results.clear();
        self.hit_count = 0;
    }

    /// Searches every page in document order and returns the total number of
    /// hit regions. Pages the engine fails on are skipped.
    #[instrument(skip(self, backend))]
    pub fn search_for(&mut self, backend: &dyn DocumentBackend, text: &str) -> usize {
        self.clear();
        if text.trim().is_empty() {
            return 0;
        }
        self.query = text.to_string();

        for page_index in 0..backend.page_count() {
            let page = match backend.load_page(page_index) {
                Ok(page) => page,
                Err(err) => {
                    warn!(?err, page = page_index, "skipping unreadable page during search");
                    continue;
                }
            };
            let regions = match backend.search_text(&page, text) {
                Ok(regions) => regions,
                Err(err) => {
                    warn!(?err, page = page_index, "text search failed on page");
                    continue;
                }
            };
            if regions.is_empty() {
                continue;
            }
            self.hit_count += regions.len();
            let page_label = backend
                .page_label(&page)
                .unwrap_or_else(|| (page_index + 1).to_string());
            self.results.push(SearchHit {
                page_index,
                page_label,
                regions,
            });
        }

        info!(
            query = text,
            hits = self.hit_count,
            pages = self.results.len(),
            "search completed"
        );
        self.hit_count
    }

    pub fn highlights(&self) -> HighlightSet {
        self.results
            .iter()
            .map(|hit| (hit.page_index, hit.regions.clone()))
            .collect()
    }

    /// Position of the first result on a page after `page`, wrapping to the
    /// first result.
    pub fn next_result(&self, page: usize) -> Option<usize> {
        self.results
            .iter()
            .position(|hit| hit.page_index > page)
            .or_else(|| (!self.results.is_empty()).then_some(0))
    }

    /// Position of the last result on a page before `page`, wrapping to the
    /// last result.
    pub fn previous_result(&self, page: usize) -> Option<usize> {
        self.results
            .iter()
            .rposition(|hit| hit.page_index < page)
            .or_else(|| self.results.len().checked_sub(1))
    }

    pub fn position_of_page(&self, page: usize) -> Option<usize> {
        self.results.iter().position(|hit| hit.page_index == page)
    }
}
