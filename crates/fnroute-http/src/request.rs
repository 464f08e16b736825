//! The immutable request view handlers operate on.
//!
//! A [`RequestView`] is cheap to clone: the request line and headers live
//! behind an `Arc`, and so do path variables and attributes. Extending either
//! map produces a new view and leaves every existing clone untouched, so an
//! outer filter never observes what an inner layer added.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use fnroute_core::settings::DEFAULT_MAX_BODY_SIZE;
use fnroute_core::BodyError;
use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, Method};
use mime::Mime;
use serde::de::DeserializeOwned;

use crate::body::BodyStream;
use crate::extract::{BodyExtractor, BytesExtractor, FormExtractor, JsonExtractor, TextExtractor};
use crate::media;
use crate::querydict::QueryDict;

/// A type-erased per-request attribute value.
pub type Attribute = Arc<dyn Any + Send + Sync>;

#[derive(Debug)]
struct RequestHead {
    method: Method,
    path: String,
    query_string: String,
    query: QueryDict,
    headers: HeaderMap,
}

/// An immutable snapshot of an inbound request plus its single-use body.
///
/// # Examples
///
/// ```
/// use fnroute_http::RequestView;
///
/// let request = RequestView::builder()
///     .method(http::Method::GET)
///     .path("/person/42?verbose=1")
///     .header("accept", "application/json")
///     .build();
///
/// assert_eq!(request.path(), "/person/42");
/// assert_eq!(request.query_param("verbose"), Some("1"));
/// assert_eq!(request.accept(), vec![mime::APPLICATION_JSON]);
///
/// let extended = request.with_attribute("user", "alice".to_string());
/// assert_eq!(extended.attribute::<String>("user").map(String::as_str), Some("alice"));
/// assert!(request.attribute::<String>("user").is_none());
/// ```
#[derive(Clone)]
pub struct RequestView {
    head: Arc<RequestHead>,
    routing_path: Arc<str>,
    path_variables: Arc<HashMap<String, String>>,
    attributes: Arc<HashMap<String, Attribute>>,
    body: Arc<Mutex<Option<BodyStream>>>,
    body_limit: usize,
}

impl RequestView {
    /// Creates a new [`RequestViewBuilder`].
    pub fn builder() -> RequestViewBuilder {
        RequestViewBuilder::default()
    }

    /// Creates a view from the parts of a transport-level request.
    pub fn from_parts(parts: http::request::Parts, body: BodyStream) -> Self {
        let path = parts.uri.path().to_string();
        let query_string = parts.uri.query().unwrap_or("").to_string();
        Self::assemble(
            RequestHead {
                query: QueryDict::parse(&query_string),
                method: parts.method,
                path,
                query_string,
                headers: parts.headers,
            },
            body,
        )
    }

    fn assemble(head: RequestHead, body: BodyStream) -> Self {
        let routing_path = Arc::from(head.path.as_str());
        Self {
            head: Arc::new(head),
            routing_path,
            path_variables: Arc::default(),
            attributes: Arc::default(),
            body: Arc::new(Mutex::new(Some(body))),
            body_limit: DEFAULT_MAX_BODY_SIZE,
        }
    }

    // ── Request line ─────────────────────────────────────────────────

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Returns the full request path, without the query string.
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// Returns the part of the path still to be routed.
    ///
    /// Equal to [`path`](Self::path) until a nested router strips a prefix.
    pub fn routing_path(&self) -> &str {
        &self.routing_path
    }

    /// Returns the raw query string.
    pub fn query_string(&self) -> &str {
        &self.head.query_string
    }

    /// Returns the decoded query parameters.
    pub fn query(&self) -> &QueryDict {
        &self.head.query
    }

    /// Returns the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.head.query.get(name)
    }

    // ── Headers ──────────────────────────────────────────────────────

    /// Returns all request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns the first value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns every value of a header, in arrival order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.head
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Returns the parsed `Content-Type`, if present and well-formed.
    pub fn content_type(&self) -> Option<Mime> {
        self.head
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Returns the media types listed in `Accept`, in the order sent.
    ///
    /// An empty result means the client expressed no preference.
    pub fn accept(&self) -> Vec<Mime> {
        media::parse_media_types(
            self.head
                .headers
                .get_all(ACCEPT)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        )
    }

    // ── Path variables ───────────────────────────────────────────────

    /// Returns a path variable bound while routing.
    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(String::as_str)
    }

    /// Returns all bound path variables.
    pub fn path_variables(&self) -> &HashMap<String, String> {
        &self.path_variables
    }

    /// Returns a new view with `variables` layered over the existing bindings.
    #[must_use]
    pub fn with_path_variables(&self, variables: HashMap<String, String>) -> Self {
        if variables.is_empty() {
            return self.clone();
        }
        let mut merged = (*self.path_variables).clone();
        merged.extend(variables);
        Self {
            path_variables: Arc::new(merged),
            ..self.clone()
        }
    }

    #[must_use]
    pub(crate) fn with_routing_path(&self, routing_path: &str) -> Self {
        Self {
            routing_path: Arc::from(routing_path),
            ..self.clone()
        }
    }

    // ── Attributes ───────────────────────────────────────────────────

    /// Returns an attribute if it exists and has type `T`.
    pub fn attribute<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.attributes.get(name)?.downcast_ref::<T>()
    }

    /// Returns `true` if an attribute with this name exists.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Returns a new view carrying one more attribute.
    #[must_use]
    pub fn with_attribute<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) -> Self {
        let mut attributes = (*self.attributes).clone();
        attributes.insert(name.into(), Arc::new(value));
        Self {
            attributes: Arc::new(attributes),
            ..self.clone()
        }
    }

    // ── Body ─────────────────────────────────────────────────────────

    /// Returns the largest body, in bytes, extractors will collect.
    pub const fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Returns a view enforcing a different body size limit.
    #[must_use]
    pub fn with_body_limit(&self, limit: usize) -> Self {
        Self {
            body_limit: limit,
            ..self.clone()
        }
    }

    /// Takes the raw body stream. Every clone of this view shares the body, so
    /// only the first call succeeds.
    pub fn take_body(&self) -> Result<BodyStream, BodyError> {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BodyError::AlreadyConsumed)
    }

    /// Decodes the body with the given extractor.
    pub async fn body<T, E>(&self, extractor: &E) -> Result<T, BodyError>
    where
        E: BodyExtractor<T> + ?Sized,
    {
        extractor.extract(self).await
    }

    /// Collects the body into memory.
    pub async fn bytes(&self) -> Result<Bytes, BodyError> {
        self.body(&BytesExtractor).await
    }

    /// Collects the body as UTF-8 text.
    pub async fn text(&self) -> Result<String, BodyError> {
        self.body(&TextExtractor).await
    }

    /// Decodes the body as JSON.
    pub async fn json<T: DeserializeOwned + Send>(&self) -> Result<T, BodyError> {
        self.body(&JsonExtractor::<T>::new()).await
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    pub async fn form(&self) -> Result<QueryDict, BodyError> {
        self.body(&FormExtractor).await
    }
}

impl fmt::Debug for RequestView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut attribute_names: Vec<_> = self.attributes.keys().collect();
        attribute_names.sort();
        f.debug_struct("RequestView")
            .field("method", &self.head.method)
            .field("path", &self.head.path)
            .field("routing_path", &self.routing_path)
            .field("path_variables", &self.path_variables)
            .field("attributes", &attribute_names)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestView`], used by tests and in-process callers.
#[derive(Default)]
pub struct RequestViewBuilder {
    method: Method,
    path: String,
    query_string: Option<String>,
    headers: HeaderMap,
    body: Option<BodyStream>,
    attributes: HashMap<String, Attribute>,
    body_limit: Option<usize>,
}

impl RequestViewBuilder {
    /// Sets the HTTP method (defaults to `GET`).
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path. A `?query` suffix is split off into the query string.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        match path.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query_string = Some(query.to_string());
            }
            None => self.path = path.to_string(),
        }
        self
    }

    /// Sets the query string explicitly.
    #[must_use]
    pub fn query_string(mut self, query_string: &str) -> Self {
        self.query_string = Some(query_string.to_string());
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets an in-memory body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(BodyStream::from_bytes(body));
        self
    }

    /// Sets a streaming body.
    #[must_use]
    pub fn body_stream(mut self, body: BodyStream) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.attributes.insert(name.into(), Arc::new(value));
        self
    }

    /// Sets the body size limit for extractors.
    #[must_use]
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    /// Builds the [`RequestView`].
    pub fn build(self) -> RequestView {
        let path = if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path
        };
        let query_string = self.query_string.unwrap_or_default();
        let mut view = RequestView::assemble(
            RequestHead {
                method: self.method,
                query: QueryDict::parse(&query_string),
                path,
                query_string,
                headers: self.headers,
            },
            self.body.unwrap_or_default(),
        );
        view.attributes = Arc::new(self.attributes);
        if let Some(limit) = self.body_limit {
            view.body_limit = limit;
        }
        view
    }
}
