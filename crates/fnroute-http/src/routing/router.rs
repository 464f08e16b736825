//! Router functions.
//!
//! A [`RouterFunction`] looks up the handler for a request, or reports that it
//! has none. Routers compose left to right with [`RouterFunction::or`]: the
//! second router is consulted only when the first finds nothing, so specific
//! routes must be registered before generic ones. Lookups are pure apart from
//! the [`RouteMatch`] they produce, which makes a discarded trial evaluation
//! harmless.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use fnroute_core::{RouteError, RouteResult};

use crate::handler::{BoxFuture, FilterFn, HandlerFn, IntoHandler};
use crate::request::RequestView;
use crate::routing::builder::RouterBuilder;
use crate::routing::predicate::Predicate;
use crate::routing::template::PathTemplate;

/// A resolved handler together with the request it should receive.
///
/// The request carries the path variables bound while routing.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The handler, wrapped in every filter of the routers it was found through.
    pub handler: HandlerFn,
    /// The request with bound path variables.
    pub request: RequestView,
}

impl RouteMatch {
    /// Creates a match.
    pub const fn new(handler: HandlerFn, request: RequestView) -> Self {
        Self { handler, request }
    }
}

type LookupCallable = dyn Fn(RequestView) -> BoxFuture<'static, Option<RouteMatch>> + Send + Sync;

enum Kind {
    Route {
        predicate: Predicate,
        handler: HandlerFn,
    },
    Or(RouterFunction, RouterFunction),
    Nest {
        prefix: PathTemplate,
        router: RouterFunction,
    },
    When {
        predicate: Predicate,
        router: RouterFunction,
    },
    Filtered {
        router: RouterFunction,
        filters: Vec<FilterFn>,
    },
    Custom {
        description: String,
        lookup: Arc<LookupCallable>,
    },
}

/// An asynchronous lookup from request to optional handler.
///
/// Router functions are immutable; composing them builds new values that
/// share the old ones, so a finished route table can be read concurrently
/// without locking.
///
/// # Examples
///
/// ```
/// use fnroute_http::routing::{route, Predicate, RouterFunction};
/// use fnroute_http::{RequestView, Response};
///
/// let hello = route(Predicate::get("/hello").unwrap(), |_req: RequestView| async {
///     Response::ok().text("Hello World").build()
/// })
/// .unwrap();
///
/// # tokio_test::block_on(async {
/// let hit = RequestView::builder().path("/hello").build();
/// assert!(hello.route(&hit).await.is_some());
///
/// let miss = RequestView::builder().path("/other").build();
/// assert!(hello.route(&miss).await.is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct RouterFunction(Arc<Kind>);

/// Creates a single-route router.
///
/// Fails when the predicate binds the same path variable on both sides of an
/// `and`.
pub fn route(predicate: Predicate, handler: impl IntoHandler) -> RouteResult<RouterFunction> {
    predicate.validate()?;
    Ok(RouterFunction::from_kind(Kind::Route {
        predicate,
        handler: handler.into_handler(),
    }))
}

impl RouterFunction {
    fn from_kind(kind: Kind) -> Self {
        Self(Arc::new(kind))
    }

    /// Returns a [`RouterBuilder`].
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Routes requests under a path prefix to `router`.
    ///
    /// The prefix's variables are bound, and the inner router sees only the
    /// rest of the path.
    pub fn nest(prefix: &str, router: Self) -> RouteResult<Self> {
        let prefix = PathTemplate::parse(prefix)?;
        if prefix.has_wildcard() {
            return Err(RouteError::Configuration(format!(
                "nest prefix '{prefix}' cannot end in a wildcard"
            )));
        }
        Ok(Self::from_kind(Kind::Nest { prefix, router }))
    }

    /// Consults `router` only for requests matching `predicate`.
    pub fn when(predicate: Predicate, router: Self) -> RouteResult<Self> {
        predicate.validate()?;
        Ok(Self::from_kind(Kind::When { predicate, router }))
    }

    /// A router backed by a custom async lookup.
    pub fn from_fn<F, Fut>(description: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(RequestView) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<RouteMatch>> + Send + 'static,
    {
        let lookup: Arc<LookupCallable> = Arc::new(
            move |request: RequestView| -> BoxFuture<'static, Option<RouteMatch>> {
                Box::pin(lookup(request))
            },
        );
        Self::from_kind(Kind::Custom {
            description: description.into(),
            lookup,
        })
    }

    /// Tries `self` first and falls back to `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::from_kind(Kind::Or(self, other))
    }

    /// Applies `filter` to every handler this router resolves.
    ///
    /// Filters attached earlier stay outside filters attached later.
    #[must_use]
    pub fn filter(self, filter: FilterFn) -> Self {
        let (router, filters) = match &*self.0 {
            Kind::Filtered { router, filters } => {
                let mut filters = filters.clone();
                filters.push(filter);
                (router.clone(), filters)
            }
            _ => (self, vec![filter]),
        };
        Self::from_kind(Kind::Filtered { router, filters })
    }

    /// Looks up the handler for `request`.
    ///
    /// Returns `None` when no route claims the request.
    pub fn route<'a>(&'a self, request: &'a RequestView) -> BoxFuture<'a, Option<RouteMatch>> {
        Box::pin(async move {
            match &*self.0 {
                Kind::Route { predicate, handler } => {
                    let result = predicate.evaluate(request);
                    if !result.is_match() {
                        tracing::trace!(route = %predicate, "route skipped");
                        return None;
                    }
                    tracing::trace!(route = %predicate, "route matched");
                    Some(RouteMatch::new(
                        handler.clone(),
                        request.with_path_variables(result.into_variables()),
                    ))
                }
                Kind::Or(first, second) => match first.route(request).await {
                    Some(found) => Some(found),
                    None => second.route(request).await,
                },
                Kind::Nest { prefix, router } => {
                    let Some((variables, rest)) = prefix.match_prefix(request.routing_path()) else {
                        tracing::trace!(prefix = %prefix, "nest skipped");
                        return None;
                    };
                    let nested = request
                        .with_path_variables(variables)
                        .with_routing_path(&rest);
                    router.route(&nested).await
                }
                Kind::When { predicate, router } => {
                    let result = predicate.evaluate(request);
                    if !result.is_match() {
                        return None;
                    }
                    let guarded = request.with_path_variables(result.into_variables());
                    router.route(&guarded).await
                }
                Kind::Filtered { router, filters } => {
                    let found = router.route(request).await?;
                    Some(RouteMatch::new(
                        found.handler.with_outer_filters(filters),
                        found.request,
                    ))
                }
                Kind::Custom { lookup, .. } => lookup(request.clone()).await,
            }
        })
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match &*self.0 {
            Kind::Route { predicate, .. } => writeln!(f, "{pad}{predicate} -> handler"),
            Kind::Or(first, second) => {
                first.write_tree(f, depth)?;
                second.write_tree(f, depth)
            }
            Kind::Nest { prefix, router } => {
                writeln!(f, "{pad}{prefix} => {{")?;
                router.write_tree(f, depth + 1)?;
                writeln!(f, "{pad}}}")
            }
            Kind::When { predicate, router } => {
                writeln!(f, "{pad}when {predicate} => {{")?;
                router.write_tree(f, depth + 1)?;
                writeln!(f, "{pad}}}")
            }
            Kind::Filtered { router, filters } => {
                writeln!(f, "{pad}filtered({}) {{", filters.len())?;
                router.write_tree(f, depth + 1)?;
                writeln!(f, "{pad}}}")
            }
            Kind::Custom { description, .. } => writeln!(f, "{pad}{description}"),
        }
    }
}

impl fmt::Display for RouterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

impl fmt::Debug for RouterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouterFunction {{\n{self}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use http::{Method, StatusCode};

    use crate::response::Response;

    fn named(name: &'static str) -> HandlerFn {
        HandlerFn::new(move |_request| async move { Response::ok().text(name).build() })
    }

    async fn body_of(found: RouteMatch) -> String {
        let response = found.handler.call(found.request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn req(method: Method, path: &str) -> RequestView {
        RequestView::builder().method(method).path(path).build()
    }

    fn trap(calls: &Arc<AtomicUsize>) -> RouterFunction {
        let calls = Arc::clone(calls);
        RouterFunction::from_fn("trap", move |_request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
    }

    #[tokio::test]
    async fn test_route_binds_variables() {
        let router = route(Predicate::get("/person/{id}").unwrap(), named("person")).unwrap();
        let found = router.route(&req(Method::GET, "/person/42")).await.unwrap();
        assert_eq!(found.request.path_variable("id"), Some("42"));
        assert_eq!(body_of(found).await, "person");
    }

    #[tokio::test]
    async fn test_or_is_first_match_wins() {
        let router = route(Predicate::get("/person/{id}").unwrap(), named("specific"))
            .unwrap()
            .or(route(Predicate::path("/person/{*rest}").unwrap(), named("generic")).unwrap());

        let found = router.route(&req(Method::GET, "/person/1")).await.unwrap();
        assert_eq!(body_of(found).await, "specific");
        let found = router.route(&req(Method::DELETE, "/person/1")).await.unwrap();
        assert_eq!(body_of(found).await, "generic");
    }

    #[derive(Clone, Default)]
    struct LookupLog(Arc<Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LookupLog {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Line(Vec<String>);

            impl tracing::field::Visit for Line {
                fn record_debug(&mut self, _field: &tracing::field::Field, value: &dyn fmt::Debug) {
                    self.0.push(format!("{value:?}"));
                }
            }

            let mut line = Line(Vec::new());
            event.record(&mut line);
            self.0.lock().unwrap().push(line.0.join(" "));
        }
    }

    #[tokio::test]
    async fn test_lookups_are_traced() {
        use tracing_subscriber::layer::SubscriberExt;

        let log = LookupLog::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));
        let router = route(Predicate::get("/a").unwrap(), named("a"))
            .unwrap()
            .or(route(Predicate::get("/b").unwrap(), named("b")).unwrap());

        router.route(&req(Method::GET, "/b")).await.unwrap();

        assert_eq!(
            *log.0.lock().unwrap(),
            ["route skipped (GET && /a)", "route matched (GET && /b)"]
        );
    }

    #[tokio::test]
    async fn test_or_never_evaluates_later_router_after_match() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = route(Predicate::get("/hello").unwrap(), named("hello"))
            .unwrap()
            .or(trap(&calls));

        assert!(router.route(&req(Method::GET, "/hello")).await.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_match_is_none() {
        let router = route(Predicate::get("/hello").unwrap(), named("hello")).unwrap();
        assert!(router.route(&req(Method::GET, "/other")).await.is_none());
    }

    #[tokio::test]
    async fn test_route_rejects_conflicting_variables() {
        let predicate = Predicate::path("/{id}")
            .unwrap()
            .and(Predicate::path("/{id}").unwrap());
        assert!(matches!(
            route(predicate, named("x")),
            Err(RouteError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_nest_strips_prefix_and_binds() {
        let inner = route(Predicate::get("/person/{id}").unwrap(), named("person")).unwrap();
        let router = RouterFunction::nest("/org/{org}", inner).unwrap();

        let found = router
            .route(&req(Method::GET, "/org/acme/person/7"))
            .await
            .unwrap();
        assert_eq!(found.request.path_variable("org"), Some("acme"));
        assert_eq!(found.request.path_variable("id"), Some("7"));
        assert_eq!(found.request.path(), "/org/acme/person/7");
        assert_eq!(found.request.routing_path(), "/person/7");

        assert!(router.route(&req(Method::GET, "/person/7")).await.is_none());
    }

    #[test]
    fn test_nest_rejects_wildcard_prefix() {
        let inner = route(Predicate::all(), named("x")).unwrap();
        assert!(RouterFunction::nest("/api/**", inner).is_err());
    }

    #[tokio::test]
    async fn test_when_guards_without_stripping() {
        let inner = route(Predicate::get("/admin/stats").unwrap(), named("stats")).unwrap();
        let router = RouterFunction::when(
            Predicate::header_present(http::header::AUTHORIZATION),
            inner,
        )
        .unwrap();

        assert!(router.route(&req(Method::GET, "/admin/stats")).await.is_none());
        let authorized = RequestView::builder()
            .path("/admin/stats")
            .header("authorization", "Bearer t")
            .build();
        assert!(router.route(&authorized).await.is_some());
    }

    #[tokio::test]
    async fn test_router_filters_nest_first_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tag = |label: &'static str| {
            let log = Arc::clone(&log);
            FilterFn::before(move |request| {
                log.lock().unwrap().push(label);
                request
            })
        };
        let router = route(Predicate::all(), named("x").filter(tag("handler")))
            .unwrap()
            .filter(tag("inner-first"))
            .filter(tag("inner-second"))
            .or(RouterFunction::from_fn("never", |_request| async { None }))
            .filter(tag("outer"));

        let found = router.route(&req(Method::GET, "/")).await.unwrap();
        assert_eq!(found.handler.filter_count(), 4);
        let response = found.handler.call(found.request).await.unwrap();
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer", "inner-first", "inner-second", "handler"]
        );
    }

    #[tokio::test]
    async fn test_filters_do_not_apply_to_unclaimed_requests() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        let router = route(Predicate::get("/hello").unwrap(), named("hello"))
            .unwrap()
            .filter(FilterFn::before(move |request| {
                counted.fetch_add(1, Ordering::SeqCst);
                request
            }));

        assert!(router.route(&req(Method::GET, "/nope")).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_display_lists_routes() {
        let router = route(Predicate::get("/person/{id}").unwrap(), named("a"))
            .unwrap()
            .or(RouterFunction::nest(
                "/api",
                route(Predicate::post("/person").unwrap(), named("b")).unwrap(),
            )
            .unwrap());
        assert_eq!(
            router.to_string(),
            "(GET && /person/{id}) -> handler\n/api => {\n  (POST && /person) -> handler\n}\n"
        );
    }
}
