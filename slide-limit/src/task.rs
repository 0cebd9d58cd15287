use std::fmt;

use crate::BoxError;
use crate::Error;

type Operation<A, R> = Box<dyn FnOnce(A) -> R + Send>;
type Target<R> = Box<dyn Notify<R> + Send>;

/// Something that accepts the result of a [`Task`].
///
/// Implemented for any `FnMut(&R) -> Result<(), BoxError>`.
pub trait Notify<R> {
    fn notify(&mut self, result: &R) -> Result<(), BoxError>;
}

impl<R, F> Notify<R> for F
where
    F: FnMut(&R) -> Result<(), BoxError>,
{
    fn notify(&mut self, result: &R) -> Result<(), BoxError> {
        self(result)
    }
}

/// An operation bound to its arguments, executed at most once.
///
/// Operations taking several arguments take them as a tuple:
///
/// ```rust
/// use slide_limit::Task;
///
/// let mut task = Task::new(|(a, b): (u32, u32)| a + b, (2, 3));
/// assert!(task.execute().unwrap());
/// assert!(!task.execute().unwrap());
/// assert_eq!(task.take_result(), Some(5));
/// ```
pub struct Task<A, R> {
    pending: Option<(Operation<A, R>, A)>,
    notify: Option<Target<R>>,
    result: Option<R>,
}

impl<A, R> Task<A, R> {
    pub fn new<F>(operation: F, args: A) -> Self
    where
        F: FnOnce(A) -> R + Send + 'static,
    {
        Self {
            pending: Some((Box::new(operation), args)),
            notify: None,
            result: None,
        }
    }

    pub fn builder() -> TaskBuilder<A, R> {
        TaskBuilder::default()
    }

    /// Runs the operation and hands its result to the notify target.
    ///
    /// Returns `Ok(false)`, doing nothing, if the task has already run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Notification`] if the notify target fails. The
    /// operation has run by then: the task stays marked as run and keeps the
    /// result.
    pub fn execute(&mut self) -> Result<bool, Error> {
        let Some((operation, args)) = self.pending.take() else {
            return Ok(false);
        };

        let result = operation(args);
        let notified = match self.notify.as_mut() {
            Some(target) => target.notify(&result),
            None => Ok(()),
        };
        self.result = Some(result);

        notified.map_err(Error::Notification)?;
        Ok(true)
    }

    pub fn has_run(&self) -> bool {
        self.pending.is_none()
    }

    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<R> {
        self.result.take()
    }
}

impl<A, R> fmt::Debug for Task<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("has_run", &self.has_run())
            .field("notify", &self.notify.is_some())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Task`], checking that nothing required is missing.
pub struct TaskBuilder<A, R> {
    operation: Option<Operation<A, R>>,
    notify: Option<Target<R>>,
    args: Option<A>,
}

impl<A, R> Default for TaskBuilder<A, R> {
    fn default() -> Self {
        Self {
            operation: None,
            notify: None,
            args: None,
        }
    }
}

impl<A, R> TaskBuilder<A, R> {
    pub fn operation<F>(mut self, operation: F) -> Self
    where
        F: FnOnce(A) -> R + Send + 'static,
    {
        self.operation = Some(Box::new(operation));
        self
    }

    pub fn notify<N>(mut self, target: N) -> Self
    where
        N: Notify<R> + Send + 'static,
    {
        self.notify = Some(Box::new(target));
        self
    }

    pub fn args(mut self, args: A) -> Self {
        self.args = Some(args);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidJob`] if the operation or its arguments were
    /// never supplied.
    pub fn build(self) -> Result<Task<A, R>, Error> {
        let operation = self
            .operation
            .ok_or(Error::InvalidJob("an operation is required"))?;
        let args = self
            .args
            .ok_or(Error::InvalidJob("the operation's arguments are required"))?;
        Ok(Task {
            pending: Some((operation, args)),
            notify: self.notify,
            result: None,
        })
    }
}
