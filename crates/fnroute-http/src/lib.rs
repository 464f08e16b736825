//! # fnroute-http
//!
//! The HTTP model of the fnroute engine: immutable request views, responses
//! built through a fluent builder, demand-driven body streams, handler and
//! filter functions, and the predicates and router functions that map a
//! request to its handler.
//!
//! ## Modules
//!
//! - [`body`] - Backpressure-aware body streams
//! - [`extract`] - Body extractors (bytes, text, JSON, form)
//! - [`handler`] - Handler functions, filters, and filter chains
//! - [`media`] - Media type compatibility
//! - [`querydict`] - Immutable multi-value query parameters
//! - [`request`] - The request view handed to predicates and handlers
//! - [`response`] - Responses and the response builder
//! - [`routing`] - Path templates, predicates, and router functions

pub mod body;
pub mod extract;
pub mod handler;
pub mod media;
pub mod querydict;
pub mod request;
pub mod response;
pub mod routing;

pub use body::{BodySender, BodyStream};
pub use extract::{BodyExtractor, BytesExtractor, FormExtractor, JsonExtractor, TextExtractor};
pub use handler::{filter, BoxFuture, FilterChain, FilterFn, HandlerFn, HandlerResult, IntoHandler};
pub use querydict::QueryDict;
pub use request::{RequestView, RequestViewBuilder};
pub use response::{Response, ResponseBody, ResponseBuilder};
pub use routing::{route, MatchResult, Predicate, RouteMatch, RouterBuilder, RouterFunction};
