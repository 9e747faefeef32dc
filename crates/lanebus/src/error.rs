use std::borrow::Cow;

/// Errors that can occur while configuring or driving an [`EventBus`](crate::EventBus).
///
/// Publishing and subscribing never fail; these cover construction and
/// lifecycle misuse only.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A capacity or lane count was zero, or another setting was out of range.
    #[error("Invalid bus configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// `start` was called on a bus that is already running or stopped.
    #[error("Bus already started{}: {message}", format_context(.context))]
    AlreadyStarted { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// `stop` was called before `start`.
    #[error("Bus not started{}: {message}", format_context(.context))]
    NotStarted { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// `stop` was called on a bus that is already shutting down or stopped.
    #[error("Bus already stopped{}: {message}", format_context(.context))]
    AlreadyStopped { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No tokio runtime was available to spawn the dispatcher and lanes.
    #[error("Runtime unavailable{}: {message}", format_context(.context))]
    Runtime { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal invariant violation (e.g., a lane exited without reporting).
    #[error("Internal bus fault{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl BusError {
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfiguration { message: message.into(), context: None }
    }

    /// Returns a short stable label (`snake_case`) for logs and metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } => "bus_invalid_configuration",
            Self::AlreadyStarted { .. } => "bus_already_started",
            Self::NotStarted { .. } => "bus_not_started",
            Self::AlreadyStopped { .. } => "bus_already_stopped",
            Self::Runtime { .. } => "bus_runtime_unavailable",
            Self::Internal { .. } => "bus_internal",
        }
    }

    fn context_mut(&mut self) -> &mut Option<Cow<'static, str>> {
        match self {
            Self::InvalidConfiguration { context, .. }
            | Self::AlreadyStarted { context, .. }
            | Self::NotStarted { context, .. }
            | Self::AlreadyStopped { context, .. }
            | Self::Runtime { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }
}

impl From<&'static str> for BusError {
    fn from(s: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(s), context: None }
    }
}

impl From<String> for BusError {
    fn from(s: String) -> Self {
        Self::Internal { message: Cow::Owned(s), context: None }
    }
}

/// Adds `.context(...)` to results carrying a [`BusError`].
pub trait BusErrorExt<T> {
    /// Attaches a human-readable context to the error, if any.
    ///
    /// # Errors
    /// Returns the original error with its context replaced.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, BusError>;
}

impl<T> BusErrorExt<T> for Result<T, BusError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            *e.context_mut() = Some(context.into());
            e
        })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
