//! Built-in filters.
//!
//! - [`request_id`] - Propagates or generates a request id
//! - [`access_log`] - Logs every handled request with its status and latency
//! - [`SecurityHeaders`] - Sets security-related response headers

use std::time::Instant;

use fnroute_http::{FilterFn, HandlerFn, RequestView};
use http::header::{HeaderName, HeaderValue};

/// The request attribute holding the request id, as a `String`.
pub const REQUEST_ID: &str = "request_id";

// ── request_id ──────────────────────────────────────────────────────

/// A filter that makes sure every request carries a request id.
///
/// The id is taken from the [`REQUEST_ID`] attribute (set by the
/// dispatcher), then from the `header` request header, and generated
/// otherwise. It is stored as the attribute for inner layers and echoed in
/// the `header` response header unless the handler already set one.
pub fn request_id(header: HeaderName) -> FilterFn {
    FilterFn::new(move |request: RequestView, next: HandlerFn| {
        let header = header.clone();
        async move {
            let id = request
                .attribute::<String>(REQUEST_ID)
                .cloned()
                .or_else(|| request.header(header.as_str()).map(str::to_string))
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let request = request.with_attribute(REQUEST_ID, id.clone());

            let response = next.call(request).await?;
            if response.headers().contains_key(&header) {
                return Ok(response);
            }
            match HeaderValue::from_str(&id) {
                Ok(value) => response.into_builder().typed_header(header, value).build(),
                Err(_) => Ok(response),
            }
        }
    })
}

// ── access_log ──────────────────────────────────────────────────────

/// A filter that logs each request at `info` once the handler has answered.
///
/// Failures are logged at `warn` and passed on unchanged.
pub fn access_log() -> FilterFn {
    FilterFn::new(|request: RequestView, next: HandlerFn| async move {
        let started = Instant::now();
        let result = next.call(request.clone()).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(response) => tracing::info!(
                method = %request.method(),
                path = request.path(),
                status = response.status_code().as_u16(),
                elapsed_ms,
                "request handled"
            ),
            Err(err) if err.is_cancelled() => tracing::debug!(
                method = %request.method(),
                path = request.path(),
                "request cancelled"
            ),
            Err(err) => tracing::warn!(
                method = %request.method(),
                path = request.path(),
                status = err.status_code(),
                error = %err,
                elapsed_ms,
                "request failed"
            ),
        }
        result
    })
}

// ── SecurityHeaders ─────────────────────────────────────────────────

/// Sets security-related headers on every response:
///
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options` (default `DENY`)
/// - `Strict-Transport-Security` (if `hsts_seconds > 0`)
///
/// Headers the handler already set are left alone.
///
/// # Examples
///
/// ```
/// use fnroute_server::SecurityHeaders;
///
/// let filter = SecurityHeaders {
///     hsts_seconds: 3600,
///     ..SecurityHeaders::default()
/// }
/// .into_filter();
/// # let _ = filter;
/// ```
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    /// Number of seconds for the HSTS max-age directive. Set to 0 to disable.
    pub hsts_seconds: u64,
    /// Whether to include subdomains in the HSTS header.
    pub hsts_include_subdomains: bool,
    /// Whether to include the preload directive in the HSTS header.
    pub hsts_preload: bool,
    /// The value for the X-Frame-Options header.
    pub x_frame_options: String,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self {
            hsts_seconds: 0,
            hsts_include_subdomains: false,
            hsts_preload: false,
            x_frame_options: "DENY".to_string(),
        }
    }
}

impl SecurityHeaders {
    fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = vec![(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        )];
        if let Ok(value) = HeaderValue::from_str(&self.x_frame_options) {
            headers.push((HeaderName::from_static("x-frame-options"), value));
        }
        if self.hsts_seconds > 0 {
            let mut hsts = format!("max-age={}", self.hsts_seconds);
            if self.hsts_include_subdomains {
                hsts.push_str("; includeSubDomains");
            }
            if self.hsts_preload {
                hsts.push_str("; preload");
            }
            if let Ok(value) = HeaderValue::from_str(&hsts) {
                headers.push((HeaderName::from_static("strict-transport-security"), value));
            }
        }
        headers
    }

    /// Converts the configuration into a filter.
    pub fn into_filter(self) -> FilterFn {
        let headers = self.headers();
        FilterFn::after(move |_request, response| {
            let missing: Vec<_> = headers
                .iter()
                .filter(|(name, _)| !response.headers().contains_key(name))
                .cloned()
                .collect();
            missing
                .into_iter()
                .fold(response.into_builder(), |builder, (name, value)| {
                    builder.typed_header(name, value)
                })
                .build()
        })
    }
}

impl From<SecurityHeaders> for FilterFn {
    fn from(headers: SecurityHeaders) -> Self {
        headers.into_filter()
    }
}
