//! Request factory for building [`RequestView`] values in tests.
//!
//! [`RequestFactory`] builds requests directly, bypassing the dispatcher.
//! This is useful when testing predicates, router functions, filters or
//! individual handlers in isolation.
//!
//! ## Example
//!
//! ```rust
//! use fnroute_test::RequestFactory;
//!
//! let factory = RequestFactory::new().with_default_header("accept", "application/json");
//! let request = factory.get("/person/42");
//! assert_eq!(request.method(), &http::Method::GET);
//! assert_eq!(request.path(), "/person/42");
//! assert_eq!(request.header("accept"), Some("application/json"));
//! ```

use http::Method;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;

use fnroute_http::request::RequestViewBuilder;
use fnroute_http::RequestView;

/// A factory for [`RequestView`]s with shared default headers.
#[derive(Debug, Clone, Default)]
pub struct RequestFactory {
    default_headers: Vec<(String, String)>,
}

impl RequestFactory {
    /// Creates a new request factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a default header that will be included in all requests.
    #[must_use]
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Starts a request with the default headers applied, for cases the
    /// shortcuts below do not cover.
    pub fn builder(&self, method: Method, path: &str) -> RequestViewBuilder {
        self.default_headers.iter().fold(
            RequestView::builder().method(method).path(path),
            |builder, (name, value)| builder.header(name, value),
        )
    }

    /// Builds a GET request to the given path.
    pub fn get(&self, path: &str) -> RequestView {
        self.builder(Method::GET, path).build()
    }

    /// Builds a POST request with a JSON body.
    pub fn post_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> RequestView {
        self.json(Method::POST, path, value)
    }

    /// Builds a POST request with a form-encoded body.
    pub fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> RequestView {
        self.builder(Method::POST, path)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(encode_form_data(fields))
            .build()
    }

    /// Builds a PUT request with a JSON body.
    pub fn put_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> RequestView {
        self.json(Method::PUT, path, value)
    }

    /// Builds a PATCH request with a JSON body.
    pub fn patch_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> RequestView {
        self.json(Method::PATCH, path, value)
    }

    /// Builds a DELETE request to the given path.
    pub fn delete(&self, path: &str) -> RequestView {
        self.builder(Method::DELETE, path).build()
    }

    /// Builds a HEAD request to the given path.
    pub fn head(&self, path: &str) -> RequestView {
        self.builder(Method::HEAD, path).build()
    }

    /// Builds an OPTIONS request to the given path.
    pub fn options(&self, path: &str) -> RequestView {
        self.builder(Method::OPTIONS, path).build()
    }

    fn json<T: Serialize + ?Sized>(&self, method: Method, path: &str, value: &T) -> RequestView {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.builder(method, path)
            .header("content-type", "application/json")
            .body(body)
            .build()
    }
}

fn encode_form_data(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, NON_ALPHANUMERIC),
                utf8_percent_encode(v, NON_ALPHANUMERIC)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
