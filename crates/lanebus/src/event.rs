use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;

/// Routing key selecting which handlers receive an event.
///
/// Any `Eq + Hash + Clone + Debug + Send + Sync + 'static` type is a topic; a
/// fieldless enum is the usual choice.
pub trait Topic: Eq + Hash + Clone + Debug + Send + Sync + 'static {}
impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> Topic for T {}

/// An application event travelling through the bus.
///
/// * [`Event::identifier`] is the ordering key: events sharing it are handled
///   strictly in publish order.
/// * [`Event::topic`] selects the handlers.
///
/// # Example
///
/// ```rust
/// use lanebus::Event;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Topic { MetricsCollected }
///
/// struct MetricsCollected { instance: String, cpu: f32 }
///
/// impl Event for MetricsCollected {
///     type Topic = Topic;
///
///     fn identifier(&self) -> &str { &self.instance }
///     fn topic(&self) -> Topic { Topic::MetricsCollected }
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    type Topic: Topic;

    /// Ordering key. The empty string is a valid identifier.
    fn identifier(&self) -> &str;

    /// Topic used to look up subscribed handlers.
    fn topic(&self) -> Self::Topic;
}

/// A subscriber invoked once per matching event per registration.
///
/// Handlers of the same event run concurrently on their own tasks; a panic
/// inside `apply` is caught and reported, and never stops the lane.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    async fn apply(&self, event: &E);

    /// Name used in diagnostics. Prefer short, descriptive names.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a synchronous closure into an [`EventHandler`].
///
/// ```rust
/// # use lanebus::{Event, FnHandler};
/// # struct Ping;
/// # impl Event for Ping {
/// #     type Topic = u8;
/// #     fn identifier(&self) -> &str { "" }
/// #     fn topic(&self) -> u8 { 0 }
/// # }
/// let handler = FnHandler::new("ping-counter", |_event: &Ping| {});
/// ```
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F> FnHandler<F> {
    #[must_use]
    pub const fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<E, F> EventHandler<E> for FnHandler<F>
where
    E: Event,
    F: Fn(&E) + Send + Sync + 'static,
{
    async fn apply(&self, event: &E) {
        (self.f)(event);
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
