use std::time::Duration;

/// A boxed error returned by notification targets.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by limiters, tasks and the deferred queue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A limiter was configured with a zero capacity, a zero window or an
    /// unrecognised overflow name.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An attempt arrived while the window was full and the limiter uses
    /// [`Overflow::Error`](crate::Overflow::Error).
    #[error("rate limit of {capacity} per {window:?} exceeded; retry after {retry_after:?}")]
    RateLimitExceeded {
        capacity: usize,
        window: Duration,
        /// Time until the oldest admission leaves the window.
        retry_after: Duration,
    },

    /// A task was built without an operation or without its arguments.
    #[error("invalid job: {0}")]
    InvalidJob(&'static str),

    /// The operation ran but its notification target failed.
    ///
    /// The task is still marked as run.
    #[error("notification failed: {0}")]
    Notification(#[source] BoxError),

    /// The deferred queue is holding its maximum number of tasks.
    #[error("deferred queue is full ({bound} tasks waiting)")]
    QueueFull { bound: usize },

    /// The deferred queue has been shut down.
    #[error("deferred queue is closed")]
    QueueClosed,
}
