use std::time::Duration;

/// Errors produced by the admission middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    /// The window was full and the limiter drops overflow.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Request dropped by rate limit; retry after {retry_after:?}")]
    Dropped {
        /// Time until the oldest admission leaves the window.
        retry_after: Duration,
    },

    /// The window was full and the limiter treats overflow as an error.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit of {capacity} per {window:?} exceeded; retry after {retry_after:?}")]
    RateLimited {
        capacity: usize,
        window: Duration,
        retry_after: Duration,
    },

    /// The inner service took longer than the configured timeout.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out")]
    Timeout,

    /// An unexpected error occurred in the inner service or the limiter.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

impl GateError {
    /// The delay a client should wait before retrying, if the request was
    /// refused by the limiter.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Dropped { retry_after } | Self::RateLimited { retry_after, .. } => {
                Some(*retry_after)
            }
            Self::Timeout | Self::Inner(_) => None,
        }
    }
}

impl From<slide_limit::Error> for GateError {
    fn from(err: slide_limit::Error) -> Self {
        match err {
            slide_limit::Error::RateLimitExceeded {
                capacity,
                window,
                retry_after,
            } => Self::RateLimited {
                capacity,
                window,
                retry_after,
            },
            other => Self::Inner(other.to_string()),
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::Dropped { .. } | Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Inner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let retry_after = self.retry_after();

        let mut response = (status, self.to_string()).into_response();
        if let Some(retry_after) = retry_after {
            // Round up to whole seconds
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from(secs.max(1)),
            );
        }
        response
    }
}
