//! # slide-limit
//!
//! `slide-limit` is an in-process, sliding window rate limiter.
//!
//! ## Core Philosophy
//!
//! A [`Limiter`] admits at most `capacity` operations in any rolling window of
//! `window` length. Every admission is recorded as a timestamp, so the count is
//! exact rather than an estimate. What happens to an attempt that arrives while
//! the window is full is decided by the configured [`Overflow`] policy.
//!
//! ## Key Concepts
//!
//! * **Lazy Eviction**: Expired timestamps are trimmed at the moment of the
//!   request. There are no background threads or timers.
//! * **Atomic Admission**: [`Limiter::attempt`] checks and records in a single
//!   guarded step, so concurrent callers can never jointly overshoot capacity.
//! * **Decoupled Execution**: The limiter only gates. Running the work is the
//!   caller's business, optionally via a run-once [`Task`].
//! * **Deferral**: [`DeferredQueue`] holds a bounded number of tasks and runs
//!   each one as soon as the limiter has room.
//!
//! ## Example
//!
//! ```rust
//! use slide_limit::Limiter;
//! use slide_limit::Overflow;
//! use slide_limit::Task;
//!
//! let limiter = Limiter::per_minute(100, Overflow::Drop).unwrap();
//!
//! let mut task = Task::new(|x: u64| x * x, 7);
//! if limiter.attempt().unwrap().is_admitted() {
//!     assert!(task.execute().unwrap());
//!     assert_eq!(task.result(), Some(&49));
//! }
//! ```

use std::time::Duration;

mod config;
mod deferred;
mod error;
mod limiter;
mod overflow;
mod task;

pub use config::LimiterConfig;
pub use deferred::DeferredQueue;
pub use deferred::DeferredStats;
pub use error::BoxError;
pub use error::Error;
pub use limiter::Admission;
pub use limiter::Limiter;
pub use limiter::Status;
pub use overflow::Overflow;
pub use task::Notify;
pub use task::Task;
pub use task::TaskBuilder;

/// Reasons why the window refused an admission.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}
