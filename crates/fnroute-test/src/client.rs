//! HTTP test client for fnroute.
//!
//! [`TestClient`] sends simulated requests through an axum router, usually
//! the one produced by [`Dispatcher::into_axum_router`], so the whole
//! transport boundary is exercised: body pumping, 404 and error fallbacks,
//! and panic containment.
//!
//! ## Usage
//!
//! ```rust
//! use fnroute_http::routing::RouterFunction;
//! use fnroute_http::{RequestView, Response};
//! use fnroute_server::Dispatcher;
//! use fnroute_test::TestClient;
//!
//! # tokio_test::block_on(async {
//! let router = RouterFunction::builder()
//!     .get("/hello", |_req: RequestView| async { Response::ok().text("Hello World").build() })
//!     .build()
//!     .unwrap();
//! let client = TestClient::from_dispatcher(Dispatcher::new(router));
//!
//! let response = client.get("/hello").await;
//! assert_eq!(response.status_code(), 200);
//! assert_eq!(response.text(), "Hello World");
//! # });
//! ```

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::ServiceExt;

use fnroute_core::{RouteError, RouteResult};
use fnroute_server::Dispatcher;

/// A test client for making simulated HTTP requests against an axum router.
///
/// Default headers are sent with every request. All methods are async.
#[derive(Clone)]
pub struct TestClient {
    app: Router,
    default_headers: HeaderMap,
}

impl TestClient {
    /// Creates a new test client wrapping the given axum router.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            default_headers: HeaderMap::new(),
        }
    }

    /// Creates a test client for a dispatcher.
    pub fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher.into_axum_router())
    }

    /// Adds a header sent with every subsequent request.
    ///
    /// Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.default_headers.insert(name, value);
        }
        self
    }

    /// Sends a GET request to the given path.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send_empty(Method::GET, path).await
    }

    /// Sends a GET request with an `Accept` header.
    pub async fn get_accepting(&self, path: &str, accept: &str) -> TestResponse {
        let request = self
            .builder(Method::GET, path)
            .header(http::header::ACCEPT, accept)
            .body(Body::empty())
            .expect("request builder should not fail");
        self.send(request).await
    }

    /// Sends a POST request with a raw body and content type.
    pub async fn post(&self, path: &str, body: impl Into<Bytes>, content_type: &str) -> TestResponse {
        self.send_body(Method::POST, path, body.into(), content_type)
            .await
    }

    /// Sends a POST request with a JSON body.
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> TestResponse {
        self.send_json(Method::POST, path, value).await
    }

    /// Sends a PUT request with a JSON body.
    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> TestResponse {
        self.send_json(Method::PUT, path, value).await
    }

    /// Sends a PATCH request with a JSON body.
    pub async fn patch_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> TestResponse {
        self.send_json(Method::PATCH, path, value).await
    }

    /// Sends a DELETE request to the given path.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send_empty(Method::DELETE, path).await
    }

    /// Sends a HEAD request to the given path.
    pub async fn head(&self, path: &str) -> TestResponse {
        self.send_empty(Method::HEAD, path).await
    }

    /// Sends an OPTIONS request to the given path.
    pub async fn options(&self, path: &str) -> TestResponse {
        self.send_empty(Method::OPTIONS, path).await
    }

    fn builder(&self, method: Method, path: &str) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn send_empty(&self, method: Method, path: &str) -> TestResponse {
        let request = self
            .builder(method, path)
            .body(Body::empty())
            .expect("request builder should not fail");
        self.send(request).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        value: &T,
    ) -> TestResponse {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.send_body(method, path, body.into(), "application/json")
            .await
    }

    async fn send_body(
        &self,
        method: Method,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> TestResponse {
        let request = self
            .builder(method, path)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .expect("request builder should not fail");
        self.send(request).await
    }

    /// Sends a prepared request through the router and collects the response.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router should not error");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map_or_else(|_| Bytes::new(), http_body_util::Collected::to_bytes);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

/// The response from a test request.
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The collected response body.
    pub body: Bytes,
}

impl TestResponse {
    /// Returns the response body as a UTF-8 string.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Deserializes the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> RouteResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| RouteError::Serialization(e.to_string()))
    }

    /// Returns the numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the value of a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns `true` if the response has the specified header.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Returns `true` if the response body contains the given text.
    pub fn contains(&self, text: &str) -> bool {
        self.text().contains(text)
    }
}
