//! Immutable responses and their builder.
//!
//! A [`Response`] only comes into existence through
//! [`ResponseBuilder::build`]. Builder methods never fail on the spot; the
//! first problem (an invalid header, a serialization failure) is remembered
//! and reported by `build`, which lets handlers end with
//! `Response::ok().json(&value).build()` as their return value.

use std::fmt;

use axum::response::IntoResponse;
use bytes::Bytes;
use fnroute_core::{BodyError, RouteError, RouteResult};
use http::header::{HeaderName, HeaderValue, ALLOW, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;

use crate::body::BodyStream;

const TEXT_PLAIN_UTF_8: &str = "text/plain; charset=utf-8";

/// The body of a [`Response`].
pub enum ResponseBody {
    /// No body.
    Empty,
    /// A body held in memory.
    Full(Bytes),
    /// A body produced incrementally, written under flow control.
    Stream(BodyStream),
}

impl ResponseBody {
    /// Returns `true` for a body known to be empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Collects the whole body into memory.
    pub async fn collect(self) -> Result<Bytes, BodyError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Stream(stream) => stream.collect_bytes(usize::MAX).await,
        }
    }

    /// Converts the body into a stream regardless of its representation.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Self::Empty => BodyStream::empty(),
            Self::Full(bytes) => BodyStream::from_bytes(bytes),
            Self::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Self::Stream(stream) => write!(f, "Stream({stream:?})"),
        }
    }
}

/// An immutable outbound response.
///
/// # Examples
///
/// ```
/// use fnroute_http::Response;
///
/// let response = Response::created("/person/7")
///     .json(&serde_json::json!({"id": 7}))
///     .build()
///     .unwrap();
///
/// assert_eq!(response.status_code(), http::StatusCode::CREATED);
/// assert_eq!(response.header("location"), Some("/person/7"));
/// assert_eq!(response.header("content-type"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    // ── Shortcuts ────────────────────────────────────────────────────

    /// Starts a response with the given status.
    pub fn status(status: StatusCode) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    /// Starts a response from a numeric status, which must lie in 100..=599.
    pub fn from_u16(code: u16) -> RouteResult<ResponseBuilder> {
        if !(100..=599).contains(&code) {
            return Err(RouteError::Configuration(format!(
                "status code {code} is outside 100-599"
            )));
        }
        StatusCode::from_u16(code)
            .map(ResponseBuilder::new)
            .map_err(|e| RouteError::Configuration(e.to_string()))
    }

    /// 200 OK.
    pub fn ok() -> ResponseBuilder {
        Self::status(StatusCode::OK)
    }

    /// 201 Created with a `Location` header.
    pub fn created(location: &str) -> ResponseBuilder {
        Self::status(StatusCode::CREATED).header(LOCATION.as_str(), location)
    }

    /// 202 Accepted.
    pub fn accepted() -> ResponseBuilder {
        Self::status(StatusCode::ACCEPTED)
    }

    /// 204 No Content.
    pub fn no_content() -> ResponseBuilder {
        Self::status(StatusCode::NO_CONTENT)
    }

    /// 303 See Other.
    pub fn see_other(location: &str) -> ResponseBuilder {
        Self::status(StatusCode::SEE_OTHER).header(LOCATION.as_str(), location)
    }

    /// 307 Temporary Redirect.
    pub fn temporary_redirect(location: &str) -> ResponseBuilder {
        Self::status(StatusCode::TEMPORARY_REDIRECT).header(LOCATION.as_str(), location)
    }

    /// 308 Permanent Redirect.
    pub fn permanent_redirect(location: &str) -> ResponseBuilder {
        Self::status(StatusCode::PERMANENT_REDIRECT).header(LOCATION.as_str(), location)
    }

    /// 400 Bad Request.
    pub fn bad_request() -> ResponseBuilder {
        Self::status(StatusCode::BAD_REQUEST)
    }

    /// 404 Not Found.
    pub fn not_found() -> ResponseBuilder {
        Self::status(StatusCode::NOT_FOUND)
    }

    /// 422 Unprocessable Entity.
    pub fn unprocessable_entity() -> ResponseBuilder {
        Self::status(StatusCode::UNPROCESSABLE_ENTITY)
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Returns the status code.
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the body.
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Consumes the response, returning its body.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Consumes the response, returning status, headers and body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// Reopens this response as a builder, for filters that decorate it.
    pub fn into_builder(self) -> ResponseBuilder {
        ResponseBuilder {
            status: self.status,
            headers: self.headers,
            body: self.body,
            error: None,
        }
    }
}

/// An empty response with the given status; the one constructor that cannot
/// fail, used for last-resort fallbacks.
impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let body = match self.body {
            ResponseBody::Empty => axum::body::Body::empty(),
            ResponseBody::Full(bytes) => axum::body::Body::from(bytes),
            ResponseBody::Stream(stream) => axum::body::Body::from_stream(stream),
        };
        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Builder for [`Response`].
#[must_use]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    error: Option<RouteError>,
}

impl ResponseBuilder {
    /// Creates a builder with an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            error: None,
        }
    }

    fn fail(mut self, error: RouteError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Replaces the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header; invalid names or values fail the build.
    pub fn header(self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => self.typed_header(name, value),
            _ => self.fail(RouteError::handler(format!("invalid header {name}: {value:?}"))),
        }
    }

    /// Appends an already validated header.
    pub fn typed_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the `Content-Type`, replacing any previous value.
    pub fn content_type(mut self, content_type: &str) -> Self {
        match HeaderValue::from_str(content_type) {
            Ok(value) => {
                self.headers.insert(CONTENT_TYPE, value);
                self
            }
            Err(_) => self.fail(RouteError::handler(format!(
                "invalid content type {content_type:?}"
            ))),
        }
    }

    /// Sets the `Allow` header from a list of methods.
    pub fn allow(self, methods: &[Method]) -> Self {
        let value = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        self.header(ALLOW.as_str(), &value)
    }

    /// Sets an in-memory body without touching `Content-Type`.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Full(body.into());
        self
    }

    /// Sets a UTF-8 text body; defaults `Content-Type` to `text/plain`.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.default_content_type(TEXT_PLAIN_UTF_8)
            .body(text.into())
    }

    /// Serializes `value` as the JSON body; defaults `Content-Type` to
    /// `application/json`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self
                .default_content_type(mime::APPLICATION_JSON.as_ref())
                .body(bytes),
            Err(e) => self.fail(RouteError::Serialization(e.to_string())),
        }
    }

    /// Sets a streaming body.
    pub fn stream(mut self, stream: BodyStream) -> Self {
        self.body = ResponseBody::Stream(stream);
        self
    }

    fn default_content_type(self, content_type: &str) -> Self {
        if self.headers.contains_key(CONTENT_TYPE) {
            self
        } else {
            self.content_type(content_type)
        }
    }

    /// Finalizes the response, reporting the first recorded problem.
    pub fn build(self) -> RouteResult<Response> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        })
    }
}

impl fmt::Debug for ResponseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBuilder")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("error", &self.error)
            .finish()
    }
}
