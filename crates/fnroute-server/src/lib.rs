//! # fnroute-server
//!
//! The boundary between a transport and the fnroute routing core. The
//! [`Dispatcher`] turns a transport-level request into a
//! [`RequestView`](fnroute_http::RequestView), resolves it against a
//! [`RouterFunction`](fnroute_http::RouterFunction), runs the matched handler
//! inside the global filter chain, and writes the [`Response`](fnroute_http::Response)
//! back, streaming its body under flow control.
//!
//! ## Modules
//!
//! - [`dispatcher`] - The per-request state machine and axum integration
//! - [`filters`] - Built-in filters (request ids, access logging, security headers)

pub mod dispatcher;
pub mod filters;

pub use dispatcher::{default_error_response, DispatchPhase, Dispatcher, ErrorHandler};
pub use filters::{access_log, request_id, SecurityHeaders, REQUEST_ID};
