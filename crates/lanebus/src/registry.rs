use crate::event::{Event, EventHandler};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub(crate) type SharedHandler<E> = Arc<dyn EventHandler<E>>;

/// Topic → handlers mapping shared by every lane.
///
/// Reads take the shared lock and return a snapshot, so no lock is held while
/// handlers run. Writes (subscriptions) take the exclusive lock.
pub(crate) struct SubscriberRegistry<E: Event> {
    handlers: RwLock<FxHashMap<E::Topic, Vec<SharedHandler<E>>>>,
}

impl<E: Event> SubscriberRegistry<E> {
    pub(crate) fn new() -> Self {
        Self { handlers: RwLock::new(FxHashMap::default()) }
    }

    /// Appends `handler` to `topic`. Duplicates are kept and invoked once per registration.
    pub(crate) fn subscribe(&self, topic: E::Topic, handler: SharedHandler<E>) {
        trace!(?topic, handler = handler.name(), "Registering event handler");
        self.handlers.write().entry(topic).or_default().push(handler);
    }

    /// Snapshot of the handlers registered for `topic`, in registration order.
    pub(crate) fn handlers(&self, topic: &E::Topic) -> Vec<SharedHandler<E>> {
        self.handlers.read().get(topic).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, topic: &E::Topic) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }
}

impl<E: Event> fmt::Debug for SubscriberRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("SubscriberRegistry")
            .field("topics", &handlers.len())
            .field("handlers", &handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
