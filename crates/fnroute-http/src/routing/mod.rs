//! Request routing.
//!
//! - [`template`]: Compiled path templates (`/person/{id}`, `/static/{*file}`)
//! - [`predicate`]: Composable request predicates
//! - [`router`]: Router functions and their composition
//! - [`builder`]: Fluent router construction
//!
//! # Examples
//!
//! ```
//! use fnroute_http::routing::{route, Predicate, RouterFunction};
//! use fnroute_http::{RequestView, Response};
//!
//! let people = route(Predicate::get("/person/{id}").unwrap(), |req: RequestView| async move {
//!     let id = req.path_variable("id").unwrap_or_default().to_string();
//!     Response::ok().text(id).build()
//! })
//! .unwrap();
//! let router = RouterFunction::nest("/api", people).unwrap();
//!
//! # tokio_test::block_on(async {
//! let request = RequestView::builder().path("/api/person/42").build();
//! let found = router.route(&request).await.unwrap();
//! let response = found.handler.call(found.request).await.unwrap();
//! assert_eq!(response.status_code(), http::StatusCode::OK);
//! # });
//! ```

pub mod builder;
pub mod predicate;
pub mod router;
pub mod template;

pub use builder::RouterBuilder;
pub use predicate::{MatchResult, Predicate};
pub use router::{route, RouteMatch, RouterFunction};
pub use template::{Bindings, PathTemplate};
