use std::sync::Arc;

/// Item carried by the ingestion queue and every lane queue.
///
/// `Shutdown` is the drain-and-stop signal. It is not an [`Event`](crate::Event):
/// it has no identifier or topic and is never handed to a handler.
#[derive(Debug)]
pub(crate) enum Envelope<E> {
    Event(Arc<E>),
    Shutdown,
}
