use std::sync::Arc;
use std::time::Duration;

use slide_limit::Limiter;
use tower::Layer;
use tower::ServiceBuilder;
use tower::layer::util::Stack;

use crate::service::AdmissionService;

/// Applies sliding window admission to requests.
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    limiter: Arc<Limiter>,
    timeout: Option<Duration>,
}

impl AdmissionLayer {
    /// Create an AdmissionLayer sharing `limiter` between every service it wraps.
    pub fn new(limiter: Arc<Limiter>) -> Self {
        AdmissionLayer {
            limiter,
            timeout: None,
        }
    }

    /// Set a timeout for the inner service call.
    ///
    /// If the call takes longer, the service
    /// will return `GateError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, service: S) -> Self::Service {
        let svc = AdmissionService::new(service, self.limiter.clone());
        match self.timeout {
            Some(timeout) => svc.with_timeout(timeout),
            None => svc,
        }
    }
}

/// Service Builder Extension adding sliding window admission to tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Refuse requests beyond the limiter's capacity
    fn sliding_window_limit(self, limiter: Arc<Limiter>) -> ServiceBuilder<Stack<AdmissionLayer, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn sliding_window_limit(self, limiter: Arc<Limiter>) -> ServiceBuilder<Stack<AdmissionLayer, L>> {
        self.layer(AdmissionLayer::new(limiter))
    }
}
