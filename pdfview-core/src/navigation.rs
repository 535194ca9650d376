use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{EventBus, ViewerEvent};

/// Intra-page vertical position to restore after a page switch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "at", content = "y", rename_all = "snake_case")]
pub enum PageLocation {
    #[default]
    Top,
    Bottom,
    /// Page-space y coordinate, in points from the top of the page.
    Offset(f32),
}

/// Where a link, outline entry or search result leads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JumpTarget {
    pub page: usize,
    pub location: Option<PageLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NavigationState {
    pub page: usize,
    pub location: PageLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationOutcome {
    pub page_changed: bool,
    pub location_changed: bool,
}

impl NavigationOutcome {
    pub fn is_noop(&self) -> bool {
        !self.page_changed && !self.location_changed
    }
}

/// Single authority over the current page and in-page location.
///
/// Out-of-range requests are rejected without clamping or wrapping.
#[derive(Debug)]
pub struct PageNavigator {
    state: NavigationState,
    page_count: usize,
    labels: HashMap<String, usize>,
    index_labels: Vec<Option<String>>,
    events: EventBus,
}

impl PageNavigator {
    /// `labels[i]` is the user-facing label of page `i`, when the document
    /// defines one. The lookup table is built once here.
    pub fn new(page_count: usize, labels: Vec<Option<String>>, events: EventBus) -> Self {
        let mut table = HashMap::new();
        for (index, label) in labels.iter().enumerate().take(page_count) {
            if let Some(label) = label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
                table.entry(label.to_string()).or_insert(index);
            }
        }
        let mut index_labels = labels;
        index_labels.resize(page_count, None);

        Self {
            state: NavigationState::default(),
            page_count,
            labels: table,
            index_labels,
            events,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn current_page(&self) -> usize {
        self.state.page
    }

    pub fn location(&self) -> PageLocation {
        self.state.location
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn is_first_page(&self) -> bool {
        self.state.page == 0
    }

    pub fn is_last_page(&self) -> bool {
        self.state.page + 1 >= self.page_count
    }

    fn in_range(&self, index: usize) -> bool {
        index < self.page_count
    }

    pub fn set_current_page(&mut self, index: usize) -> NavigationOutcome {
        if !self.change_page(index) {
            return NavigationOutcome::default();
        }
        self.state.location = PageLocation::Top;
        NavigationOutcome {
            page_changed: true,
            location_changed: false,
        }
    }

    fn change_page(&mut self, index: usize) -> bool {
        if !self.in_range(index) || index == self.state.page {
            return false;
        }
        debug!(from = self.state.page, to = index, "page changed");
        self.state.page = index;
        self.events.emit(ViewerEvent::PageChanged(index));
        true
    }

    /// Moves to `index` (if different) and then always applies `location`,
    /// so a same-page jump still scrolls.
    pub fn jump(&mut self, index: usize, location: Option<PageLocation>) -> NavigationOutcome {
        if !self.in_range(index) {
            debug!(index, page_count = self.page_count, "jump rejected");
            return NavigationOutcome::default();
        }
        let page_changed = self.change_page(index);
        let location = location.unwrap_or_default();
        self.state.location = location;
        self.events.emit(ViewerEvent::LocationChanged(location));
        NavigationOutcome {
            page_changed,
            location_changed: true,
        }
    }

    /// Stores the in-page position reached by scrolling. Emits nothing.
    pub fn record_offset(&mut self, location: PageLocation) {
        self.state.location = location;
    }

    pub fn next(&mut self) -> NavigationOutcome {
        if self.is_last_page() {
            return NavigationOutcome::default();
        }
        self.jump(self.state.page + 1, None)
    }

    pub fn previous(&mut self) -> NavigationOutcome {
        match self.state.page.checked_sub(1) {
            Some(previous) => self.jump(previous, None),
            None => NavigationOutcome::default(),
        }
    }

    pub fn page_number_from_label(&self, label: &str) -> Option<usize> {
        self.labels.get(label.trim()).copied()
    }

    /// Label lookup first, then a 1-based page number.
    pub fn resolve_user_page_input(&self, text: &str) -> Option<usize> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(index) = self.page_number_from_label(text) {
            return Some(index);
        }
        let number: usize = text.parse().ok()?;
        number
            .checked_sub(1)
            .filter(|&index| self.in_range(index))
    }

    pub fn label_for(&self, index: usize) -> String {
        self.index_labels
            .get(index)
            .and_then(|label| label.clone())
            .unwrap_or_else(|| (index + 1).to_string())
    }
}
