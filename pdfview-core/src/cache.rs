use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, instrument};

use crate::engine::{DisplayList, DocumentBackend};
use crate::error::{ViewerError, ViewerResult};

/// One lazily built display list per page.
///
/// A filled slot is only ever replaced after [`PageCache::invalidate`].
#[derive(Debug, Default)]
pub struct PageCache {
    slots: Vec<Option<Arc<DisplayList>>>,
    builds: usize,
}

impl PageCache {
    pub fn new(page_count: usize) -> Self {
        Self {
            slots: vec![None; page_count],
            builds: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_cached(&self, page_index: usize) -> bool {
        matches!(self.slots.get(page_index), Some(Some(_)))
    }

    /// Total number of display lists built so far.
    pub fn build_count(&self) -> usize {
        self.builds
    }

    #[instrument(skip(self, backend))]
    pub fn get(
        &mut self,
        backend: &dyn DocumentBackend,
        page_index: usize,
    ) -> ViewerResult<Arc<DisplayList>> {
        let slot = self
            .slots
            .get_mut(page_index)
            .ok_or_else(|| ViewerError::PageLoad {
                page: page_index,
                source: anyhow!("page index outside of document"),
            })?;

        if let Some(list) = slot {
            return Ok(Arc::clone(list));
        }

        let page = backend
            .load_page(page_index)
            .map_err(|source| ViewerError::PageLoad {
                page: page_index,
                source,
            })?;
        let list = backend
            .build_display_list(&page)
            .map(Arc::new)
            .map_err(|source| ViewerError::PageLoad {
                page: page_index,
                source,
            })?;

        debug!(page = page_index, rotation = ?list.rotation(), "display list built");
        *slot = Some(Arc::clone(&list));
        self.builds += 1;
        Ok(list)
    }

    pub fn invalidate(&mut self, page_index: usize) {
        if let Some(slot) = self.slots.get_mut(page_index) {
            if slot.take().is_some() {
                debug!(page = page_index, "display list invalidated");
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[test]
    fn get_is_identity_stable() {
        let backend = FakeBackend::new(4);
        let mut cache = PageCache::new(4);

        let first = cache.get(&backend, 2).unwrap();
        let second = cache.get(&backend, 2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.build_count(), 1);
        assert_eq!(backend.display_list_builds(), 1);
    }

    #[test]
    fn slots_fill_on_demand_only() {
        let backend = FakeBackend::new(3);
        let mut cache = PageCache::new(3);
        assert!(!cache.is_cached(0));
        cache.get(&backend, 1).unwrap();
        assert!(!cache.is_cached(0));
        assert!(cache.is_cached(1));
        assert!(!cache.is_cached(2));
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let backend = FakeBackend::new(2);
        let mut cache = PageCache::new(2);

        let before = cache.get(&backend, 0).unwrap();
        cache.invalidate(0);
        assert!(!cache.is_cached(0));
        let after = cache.get(&backend, 0).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(cache.build_count(), 2);
    }

    #[test]
    fn corrupt_page_is_not_cached() {
        let backend = FakeBackend::new(3).with_corrupt_page(1);
        let mut cache = PageCache::new(3);

        let err = cache.get(&backend, 1).unwrap_err();
        assert!(matches!(err, ViewerError::PageLoad { page: 1, .. }));
        assert!(!cache.is_cached(1));
        assert!(cache.get(&backend, 2).is_ok());
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let backend = FakeBackend::new(1);
        let mut cache = PageCache::new(1);
        assert!(matches!(
            cache.get(&backend, 7),
            Err(ViewerError::PageLoad { page: 7, .. })
        ));
    }
}
