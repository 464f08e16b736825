//! # fnroute
//!
//! Functional request routing for Rust: requests are matched against
//! composable predicates and dispatched to handler functions wrapped in
//! filters, with backpressure-aware request and response bodies.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on the individual crates for finer-grained control.
//!
//! ```
//! use fnroute::prelude::*;
//!
//! let router = RouterFunction::builder()
//!     .get("/hello", |_req: RequestView| async { Response::ok().text("Hello World").build() })
//!     .build()
//!     .unwrap();
//! let _app = Dispatcher::new(router).into_axum_router();
//! ```

/// Error types, settings, and logging.
pub use fnroute_core as core;

/// Request views, responses, bodies, predicates, handlers, filters, routers.
#[cfg(feature = "http")]
pub use fnroute_http as http;

/// The dispatcher and built-in filters.
#[cfg(feature = "server")]
pub use fnroute_server as server;

/// Test client and request factory.
#[cfg(feature = "testing")]
pub use fnroute_test as test;

/// Third-party crates applications usually need alongside fnroute.
pub mod deps {
    pub use axum;
    pub use mime;
    pub use serde;
    pub use serde_json;
    pub use tokio;
    pub use tracing;
}

/// The types most route tables are written with.
pub mod prelude {
    pub use fnroute_core::{RouteError, RouteResult, Settings};

    #[cfg(feature = "http")]
    pub use fnroute_http::routing::{route, Predicate, RouterBuilder, RouterFunction};
    #[cfg(feature = "http")]
    pub use fnroute_http::{FilterFn, HandlerFn, RequestView, Response};

    #[cfg(feature = "server")]
    pub use fnroute_server::Dispatcher;
}
