use std::any::Any;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use crate::Error;
use crate::Limiter;
use crate::Reason;
use crate::Task;

type Job = Box<dyn FnOnce() + Send>;

/// Lifetime counters of a [`DeferredQueue`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeferredStats {
    pub submitted: u64,
    pub rejected: u64,
    pub executed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
}

/// A bounded queue of tasks that run as soon as a [`Limiter`] admits them.
///
/// A single drainer takes the oldest task, waits until the limiter has room and
/// then executes it on the drainer. Submitting to a full queue fails
/// immediately with [`Error::QueueFull`]. A panicking operation is logged and
/// counted as executed; the tasks behind it still run.
#[derive(Debug)]
pub struct DeferredQueue {
    sender: mpsc::Sender<Job>,
    bound: usize,
    counters: Arc<Counters>,
    drainer: JoinHandle<()>,
}

impl DeferredQueue {
    /// Spawns the drainer onto the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(limiter: Arc<Limiter>, bound: NonZeroUsize) -> Self {
        let (sender, receiver) = mpsc::channel(bound.get());
        let counters = Arc::new(Counters::default());
        let drainer = tokio::spawn(drain(limiter, receiver, Arc::clone(&counters)));
        Self {
            sender,
            bound: bound.get(),
            counters,
            drainer,
        }
    }

    /// Queues `task` for execution once the limiter admits it.
    ///
    /// A notification failure is logged by the drainer and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] if `bound` tasks are already waiting, or
    /// [`Error::QueueClosed`] if the drainer has stopped.
    pub fn submit<A, R>(&self, mut task: Task<A, R>) -> Result<(), Error>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        let job: Job = Box::new(move || {
            if let Err(error) = task.execute() {
                warn!(%error, "deferred task failed to notify");
            }
        });

        match self.sender.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(bound = self.bound, "deferred queue full");
                Err(Error::QueueFull { bound: self.bound })
            }
            Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
        }
    }

    /// The number of tasks waiting to be admitted.
    pub fn pending(&self) -> usize {
        self.bound - self.sender.capacity()
    }

    pub fn stats(&self) -> DeferredStats {
        DeferredStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting tasks and waits until every queued task has run.
    pub async fn shutdown(self) -> DeferredStats {
        let Self {
            sender,
            counters,
            drainer,
            ..
        } = self;
        drop(sender);

        if let Err(error) = drainer.await {
            warn!(%error, "deferred queue drainer stopped abnormally");
        }

        DeferredStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            executed: counters.executed.load(Ordering::Relaxed),
        }
    }
}

async fn drain(limiter: Arc<Limiter>, mut receiver: mpsc::Receiver<Job>, counters: Arc<Counters>) {
    while let Some(job) = receiver.recv().await {
        while let ControlFlow::Break(Reason::Overloaded { retry_after }) = limiter.try_admit() {
            debug!(?retry_after, "deferred task waiting for capacity");
            sleep(retry_after).await;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
            warn!(panic = panic_message(&*payload), "deferred task panicked");
        }
        counters.executed.fetch_add(1, Ordering::Relaxed);
    }
    debug!("deferred queue drained");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
