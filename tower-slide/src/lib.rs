//! # Tower Slide
//!
//! `tower-slide` puts a [`slide_limit::Limiter`] in front of any
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! ## Behaviour
//!
//! 1. **Admission**: Every request makes one [`Limiter::attempt`] while the
//!    service is polled for readiness. Admitted requests are forwarded.
//! 2. **Refusal**: Requests arriving while the window is full fail straight
//!    away with [`GateError::Dropped`] or [`GateError::RateLimited`], depending
//!    on the limiter's [`slide_limit::Overflow`]. Nothing is queued.
//! 3. **Timeouts**: An optional deadline on the inner call fails with
//!    [`GateError::Timeout`].
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`GateError`], allowing automatic conversion
//!   to HTTP status codes (429, 408, 500).

mod error;
mod layer;
mod service;


#[cfg(doc)]
use slide_limit::Limiter;

pub use error::GateError;
pub use layer::AdmissionLayer;
pub use layer::ServiceBuilderExt;
pub use service::AdmissionService;
pub use service::ResponseFuture;
