//! Fluent construction of router functions.

use fnroute_core::{RouteError, RouteResult};
use http::Method;

use crate::handler::{FilterFn, HandlerResult, IntoHandler};
use crate::request::RequestView;
use crate::response::Response;
use crate::routing::predicate::Predicate;
use crate::routing::router::{route, RouterFunction};

/// Builds a [`RouterFunction`] from routes, nested groups and filters.
///
/// Routes are tried in registration order. Errors such as an invalid path
/// template are held until [`build`](Self::build), so registration calls can
/// be chained freely.
///
/// # Examples
///
/// ```
/// use fnroute_http::routing::RouterFunction;
/// use fnroute_http::{RequestView, Response};
///
/// let router = RouterFunction::builder()
///     .get("/hello", |_req: RequestView| async { Response::ok().text("Hello").build() })
///     .nest("/api", |api| {
///         api.get("/person/{id}", |req: RequestView| async move {
///             let id = req.path_variable("id").unwrap_or_default().to_string();
///             Response::ok().text(id).build()
///         })
///     })
///     .build()
///     .unwrap();
///
/// # tokio_test::block_on(async {
/// let request = RequestView::builder().path("/api/person/7").build();
/// let found = router.route(&request).await.unwrap();
/// assert_eq!(found.request.path_variable("id"), Some("7"));
/// # });
/// ```
#[derive(Default)]
pub struct RouterBuilder {
    routers: Vec<RouterFunction>,
    filters: Vec<FilterFn>,
    error: Option<RouteError>,
}

macro_rules! method_routes {
    ($($name:ident, $with:ident => $method:expr, $label:literal;)*) => {
        $(
            #[doc = concat!("Routes `", $label, "` requests matching `pattern`.")]
            #[must_use]
            pub fn $name(self, pattern: &str, handler: impl IntoHandler) -> Self {
                self.method_route($method, pattern, None, handler)
            }

            #[doc = concat!("Routes `", $label, "` requests matching `pattern` and an extra predicate.")]
            #[must_use]
            pub fn $with(self, pattern: &str, predicate: Predicate, handler: impl IntoHandler) -> Self {
                self.method_route($method, pattern, Some(predicate), handler)
            }
        )*
    };
}

impl RouterBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    method_routes! {
        get, get_with => Method::GET, "GET";
        post, post_with => Method::POST, "POST";
        put, put_with => Method::PUT, "PUT";
        patch, patch_with => Method::PATCH, "PATCH";
        delete, delete_with => Method::DELETE, "DELETE";
        head, head_with => Method::HEAD, "HEAD";
        options, options_with => Method::OPTIONS, "OPTIONS";
    }

    /// Routes requests matching `predicate` to `handler`.
    #[must_use]
    pub fn route(mut self, predicate: Predicate, handler: impl IntoHandler) -> Self {
        let router = route(predicate, handler);
        self.push(router);
        self
    }

    /// Appends an existing router.
    #[must_use]
    pub fn add(mut self, router: RouterFunction) -> Self {
        self.routers.push(router);
        self
    }

    /// Groups the routes built by `build` under a path prefix.
    #[must_use]
    pub fn nest<F>(mut self, prefix: &str, build: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let nested = build(Self::new())
            .build()
            .and_then(|router| RouterFunction::nest(prefix, router));
        self.push(nested);
        self
    }

    /// Applies `filter` to every route of this builder.
    ///
    /// Filters registered earlier run outside later ones.
    #[must_use]
    pub fn filter(mut self, filter: FilterFn) -> Self {
        self.filters.push(filter);
        self
    }

    /// Shorthand for a [`FilterFn::before`] filter.
    #[must_use]
    pub fn before<F>(self, f: F) -> Self
    where
        F: Fn(RequestView) -> RequestView + Send + Sync + 'static,
    {
        self.filter(FilterFn::before(f))
    }

    /// Shorthand for a [`FilterFn::after`] filter.
    #[must_use]
    pub fn after<F>(self, f: F) -> Self
    where
        F: Fn(&RequestView, Response) -> HandlerResult + Send + Sync + 'static,
    {
        self.filter(FilterFn::after(f))
    }

    /// Shorthand for a [`FilterFn::on_error`] filter.
    #[must_use]
    pub fn on_error<F>(self, f: F) -> Self
    where
        F: Fn(RouteError, &RequestView) -> HandlerResult + Send + Sync + 'static,
    {
        self.filter(FilterFn::on_error(f))
    }

    /// Routes requests with any method matching `pattern`.
    ///
    /// Equivalent to [`route`](Self::route) with a [`Predicate::path`].
    #[must_use]
    pub fn any(mut self, pattern: &str, handler: impl IntoHandler) -> Self {
        let router = Predicate::path(pattern).and_then(|predicate| route(predicate, handler));
        self.push(router);
        self
    }

    /// Finishes the router.
    ///
    /// Fails with the first registration error, or when no route was added.
    pub fn build(self) -> RouteResult<RouterFunction> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut routers = self.routers.into_iter();
        let first = routers.next().ok_or_else(|| {
            RouteError::Configuration("a router needs at least one route".to_string())
        })?;
        let router = routers.fold(first, RouterFunction::or);
        Ok(self.filters.into_iter().fold(router, RouterFunction::filter))
    }

    fn method_route(
        mut self,
        method: Method,
        pattern: &str,
        extra: Option<Predicate>,
        handler: impl IntoHandler,
    ) -> Self {
        let router = Predicate::path(pattern).and_then(|path| {
            let predicate = Predicate::method(method).and(path);
            let predicate = match extra {
                Some(extra) => predicate.and(extra),
                None => predicate,
            };
            route(predicate, handler)
        });
        self.push(router);
        self
    }

    fn push(&mut self, router: RouteResult<RouterFunction>) {
        match router {
            Ok(router) => self.routers.push(router),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routers.len())
            .field("filters", &self.filters.len())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::StatusCode;

    async fn call(router: &RouterFunction, request: RequestView) -> Option<Response> {
        let found = router.route(&request).await?;
        Some(found.handler.call(found.request).await.unwrap())
    }

    async fn text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_method_routes() {
        let router = RouterBuilder::new()
            .get("/person/{id}", |req: RequestView| async move {
                let id = req.path_variable("id").unwrap_or_default().to_string();
                Response::ok().text(format!("get {id}")).build()
            })
            .post("/person", |_req: RequestView| async {
                Response::created("/person/1").build()
            })
            .build()
            .unwrap();

        let get = RequestView::builder().path("/person/5").build();
        assert_eq!(text(call(&router, get).await.unwrap()).await, "get 5");

        let post = RequestView::builder().method(Method::POST).path("/person").build();
        let response = call(&router, post).await.unwrap();
        assert_eq!(response.status_code(), StatusCode::CREATED);

        let put = RequestView::builder().method(Method::PUT).path("/person").build();
        assert!(call(&router, put).await.is_none());
    }

    #[tokio::test]
    async fn test_with_extra_predicate() {
        let router = RouterBuilder::new()
            .post_with(
                "/person",
                Predicate::content_type(mime::APPLICATION_JSON),
                |_req: RequestView| async { Response::ok().text("json").build() },
            )
            .post("/person", |_req: RequestView| async {
                Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE).build()
            })
            .build()
            .unwrap();

        let json = RequestView::builder()
            .method(Method::POST)
            .path("/person")
            .header("content-type", "application/json")
            .build();
        assert_eq!(text(call(&router, json).await.unwrap()).await, "json");

        let plain = RequestView::builder()
            .method(Method::POST)
            .path("/person")
            .header("content-type", "text/plain")
            .build();
        let response = call(&router, plain).await.unwrap();
        assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_nest_group() {
        let router = RouterBuilder::new()
            .nest("/api/v1", |api| {
                api.get("/status", |_req: RequestView| async { Response::ok().text("up").build() })
            })
            .build()
            .unwrap();

        let request = RequestView::builder().path("/api/v1/status").build();
        assert_eq!(text(call(&router, request).await.unwrap()).await, "up");
        let request = RequestView::builder().path("/status").build();
        assert!(call(&router, request).await.is_none());
    }

    #[tokio::test]
    async fn test_builder_filters_wrap_routes() {
        let router = RouterBuilder::new()
            .get("/", |_req: RequestView| async { Response::ok().text("root").build() })
            .after(|_req, response| response.into_builder().header("x-filtered", "yes").build())
            .build()
            .unwrap();

        let response = call(&router, RequestView::builder().build()).await.unwrap();
        assert_eq!(response.header("x-filtered"), Some("yes"));
    }

    #[tokio::test]
    async fn test_on_error_shorthand() {
        let router = RouterBuilder::new()
            .get("/fail", |_req: RequestView| async {
                Err::<Response, _>(RouteError::handler("boom"))
            })
            .on_error(|err, _req| Response::status(StatusCode::IM_A_TEAPOT).text(err.to_string()).build())
            .build()
            .unwrap();

        let request = RequestView::builder().path("/fail").build();
        let response = call(&router, request).await.unwrap();
        assert_eq!(response.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let result = RouterBuilder::new()
            .get("/person/{id", |_req: RequestView| async { Response::ok().build() })
            .get("/ok", |_req: RequestView| async { Response::ok().build() })
            .build();
        assert!(matches!(result, Err(RouteError::Configuration(_))));
    }

    #[test]
    fn test_empty_builder_fails() {
        assert!(RouterBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn test_any_method() {
        let router = RouterBuilder::new()
            .any("/echo", |req: RequestView| async move {
                Response::ok().text(req.method().as_str().to_string()).build()
            })
            .build()
            .unwrap();
        let request = RequestView::builder().method(Method::DELETE).path("/echo").build();
        assert_eq!(text(call(&router, request).await.unwrap()).await, "DELETE");
    }
}
