//! Core error types for fnroute.
//!
//! [`RouteError`] is the crate-wide failure type. Handlers return it, the
//! route-table builder reports configuration problems through it, and the
//! dispatcher maps it to a response status via [`RouteError::status_code`].
//!
//! Body stream failures are described separately by [`BodyError`] because
//! they travel as the terminal signal of a stream, and codec failures by
//! [`DecodeError`], which extractors hand back to the handler.

use std::fmt;

use thiserror::Error;

/// A body could not be decoded into the requested type.
///
/// Produced by body extractors (JSON, form, text, ...). The handler receives
/// it as a typed result and decides which response to send.
///
/// # Examples
///
/// ```
/// use fnroute_core::error::DecodeError;
///
/// let err = DecodeError::new("application/json", "expected value at line 1 column 1");
/// assert_eq!(err.media_type, "application/json");
/// assert!(err.to_string().contains("application/json"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The media type the extractor attempted to decode.
    pub media_type: String,
    /// A human-readable description of the failure.
    pub message: String,
}

impl DecodeError {
    /// Creates a new `DecodeError`.
    pub fn new(media_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot decode {}: {}", self.media_type, self.message)
    }
}

impl std::error::Error for DecodeError {}

/// Terminal failure signals of a body stream.
///
/// A stream delivers at most one of these, after which it is exhausted, so a
/// partially consumed body followed by an error can never be mistaken for a
/// complete one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// The body of a request was already taken by an earlier consumer.
    #[error("body already consumed")]
    AlreadyConsumed,

    /// The peer went away; the stream was torn down before completion.
    #[error("stream cancelled")]
    Cancelled,

    /// Collecting the body would exceed the configured size limit.
    #[error("body exceeds limit of {limit} bytes")]
    LimitExceeded {
        /// The limit, in bytes.
        limit: usize,
    },

    /// The producer failed while emitting elements.
    #[error("body stream failed: {0}")]
    Stream(String),

    /// The collected body could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl BodyError {
    /// Returns the HTTP status code associated with this body failure.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::AlreadyConsumed => 500,
            Self::Cancelled => 499,
            Self::LimitExceeded { .. } => 413,
            Self::Stream(_) | Self::Decode(_) => 400,
        }
    }

    /// Returns `true` for the normal connection-teardown signal.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// The primary error type for fnroute.
///
/// Each variant maps to an HTTP status code via [`RouteError::status_code`].
/// [`RouteError::Configuration`] is only ever produced while a route table is
/// being assembled; every other variant is scoped to a single request.
#[derive(Error, Debug)]
pub enum RouteError {
    // ── Assembly ─────────────────────────────────────────────────────

    /// A route table could not be built (bad template, conflicting variables).
    #[error("Route configuration error: {0}")]
    Configuration(String),

    // ── HTTP errors ──────────────────────────────────────────────────

    /// HTTP 400 Bad Request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 404 Not Found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 405 Method Not Allowed.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// HTTP 406 Not Acceptable.
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// HTTP 415 Unsupported Media Type.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    // ── Bodies ───────────────────────────────────────────────────────

    /// Reading or decoding a body failed.
    #[error(transparent)]
    Body(#[from] BodyError),

    // ── Handlers ─────────────────────────────────────────────────────

    /// A handler failed without producing a response.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Serializing a response body failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouteError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `BadRequest` -> 400
    /// - `NotFound` -> 404
    /// - `MethodNotAllowed` -> 405
    /// - `NotAcceptable` -> 406
    /// - `UnsupportedMediaType` -> 415
    /// - `Body(..)` -> see [`BodyError::status_code`]
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::NotAcceptable(_) => 406,
            Self::UnsupportedMediaType(_) => 415,
            Self::Body(err) => err.status_code(),
            Self::Configuration(_)
            | Self::Handler(_)
            | Self::Serialization(_)
            | Self::Io(_) => 500,
        }
    }

    /// Returns `true` if this error only signals that the peer went away.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Body(BodyError::Cancelled))
    }

    /// Shorthand for a [`RouteError::Handler`] failure.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

impl From<DecodeError> for RouteError {
    fn from(err: DecodeError) -> Self {
        Self::Body(BodyError::Decode(err))
    }
}

/// A convenience type alias for `Result<T, RouteError>`.
pub type RouteResult<T> = Result<T, RouteError>;
