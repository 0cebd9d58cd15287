use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tokio::time::Timeout;
use tokio::time::timeout;
use tower::BoxError;
use tower::Service;
use tracing::debug;

use slide_limit::Admission;
use slide_limit::Limiter;

use crate::error::GateError;

#[derive(Clone, Debug)]
struct AdmissionMetrics {
    rejected: Counter<u64>,
}

/// Gates an inner service with a shared [`Limiter`].
///
/// Each request makes exactly one [`Limiter::attempt`] during `poll_ready`.
/// Refused requests fail immediately; nothing is queued or delayed.
#[derive(Debug)]
pub struct AdmissionService<S> {
    inner: S,
    limiter: Arc<Limiter>,
    admitted: bool,
    timeout: Option<Duration>,
    instruments: AdmissionMetrics,
}

pin_project! {
    /// A future that wraps the inner service future with a timeout.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: Timeout<F>,
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<BoxError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.inner.poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => Poll::Ready(Err(E::from(BoxError::from(GateError::Timeout)))),
            Poll::Pending => Poll::Pending,
        }
    }
}

// An admission belongs to the instance that acquired it, so clones start without one
impl<S> Clone for AdmissionService<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            admitted: false,
            timeout: self.timeout,
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, Req> Service<Req> for AdmissionService<S>
where
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // 1. Check inner service readiness FIRST to avoid consuming admissions
        match self.inner.poll_ready(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        // 2. Ask the limiter once per request
        if !self.admitted {
            match self.limiter.attempt() {
                Ok(Admission::Admitted) => {
                    self.admitted = true;
                }
                Ok(Admission::Dropped { retry_after }) => {
                    self.record_rejection("dropped");
                    return Poll::Ready(Err(Box::new(GateError::Dropped { retry_after })));
                }
                Err(err) => {
                    self.record_rejection("errored");
                    return Poll::Ready(Err(Box::new(GateError::from(err))));
                }
            }
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.admitted = false;
        // tokio clamps an overflowing deadline to the far future
        let timeout_duration = self.timeout.unwrap_or(Duration::MAX);

        ResponseFuture {
            inner: timeout(timeout_duration, self.inner.call(req)),
        }
    }
}

impl<S> AdmissionService<S> {
    pub fn new(inner: S, limiter: Arc<Limiter>) -> Self {
        let meter = global::meter("admission_service");
        let instruments = AdmissionMetrics {
            rejected: meter.u64_counter("rejected").build(),
        };

        Self {
            inner,
            limiter,
            admitted: false,
            timeout: None,
            instruments,
        }
    }

    /// Set a timeout for the inner service call.
    ///
    /// If the call takes longer, the service returns `GateError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    fn record_rejection(&self, outcome: &'static str) {
        debug!(outcome, capacity = self.limiter.capacity(), "request refused");
        self.instruments.rejected.add(
            1,
            &[
                KeyValue::new("outcome", outcome),
                KeyValue::new("overflow", self.limiter.overflow().as_str()),
            ],
        );
    }
}
