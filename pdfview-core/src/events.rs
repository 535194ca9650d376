use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::navigation::PageLocation;
use crate::DocumentId;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    DocumentLoaded(DocumentId),
    PageChanged(usize),
    LocationChanged(PageLocation),
    ZoomChanged(f32),
    SearchCompleted(usize),
    RenderFailed(usize),
}

type Listener = Box<dyn FnMut(&ViewerEvent) + Send>;

/// Synchronous fan-out of viewer notifications.
///
/// Listeners run on the emitting thread, in registration order, before
/// `emit` returns. A listener must not emit on the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: FnMut(&ViewerEvent) + Send + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Registers a listener that queues every event for later draining.
    pub fn recorder(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        let queue = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&queue);
        self.subscribe(move |event| sink.lock().push(event.clone()));
        queue
    }

    pub fn emit(&self, event: ViewerEvent) {
        trace!(?event, "emit");
        let mut listeners = self.listeners.lock();
        for listener in listeners.iter_mut() {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().push(tag));
        }

        bus.emit(ViewerEvent::PageChanged(1));
        assert_eq!(*order.lock(), ["first", "second", "third"]);
    }

    #[test]
    fn recorder_queues_payloads() {
        let bus = EventBus::new();
        let recorded = bus.recorder();
        bus.emit(ViewerEvent::ZoomChanged(1.5));
        bus.emit(ViewerEvent::SearchCompleted(4));
        assert_eq!(
            recorded.lock().as_slice(),
            [ViewerEvent::ZoomChanged(1.5), ViewerEvent::SearchCompleted(4)]
        );
    }
}
