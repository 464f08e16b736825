//! Handler and filter functions.
//!
//! A [`HandlerFn`] is an asynchronous function from [`RequestView`] to
//! [`Response`]. A [`FilterFn`] receives the request and a `next` handler
//! standing for the rest of the chain; it may call `next`, decorate what comes
//! back, or answer on its own without ever calling it.
//!
//! Filters attached one after another nest with the first-attached filter
//! outermost: its pre-`next` logic runs first and its post-`next` logic last.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::slice;
use std::sync::Arc;

use fnroute_core::{RouteError, RouteResult};

use crate::request::RequestView;
use crate::response::Response;

/// A boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The outcome of a handler. `Err` is a handler failure, answered by the
/// dispatcher's error handler.
pub type HandlerResult = RouteResult<Response>;

type HandlerCallable = dyn Fn(RequestView) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type FilterCallable =
    dyn Fn(RequestView, HandlerFn) -> BoxFuture<'static, HandlerResult> + Send + Sync;

// ── HandlerFn ────────────────────────────────────────────────────────

/// An asynchronous request handler, possibly wrapped in filters.
///
/// Cloning is cheap; the function and its filters are shared.
///
/// # Examples
///
/// ```
/// use fnroute_http::{HandlerFn, RequestView, Response};
///
/// let hello = HandlerFn::new(|_req: RequestView| async { Response::ok().text("Hello World").build() });
///
/// # tokio_test::block_on(async {
/// let response = hello.call(RequestView::builder().build()).await.unwrap();
/// assert_eq!(response.status_code(), http::StatusCode::OK);
/// # });
/// ```
#[derive(Clone)]
pub struct HandlerFn {
    base: Arc<HandlerCallable>,
    filters: Arc<[FilterFn]>,
    depth: usize,
}

impl HandlerFn {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestView) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let base: Arc<HandlerCallable> =
            Arc::new(move |request: RequestView| -> BoxFuture<'static, HandlerResult> {
                Box::pin(f(request))
            });
        Self {
            base,
            filters: Arc::from(Vec::new()),
            depth: 0,
        }
    }

    /// Invokes the handler, running its filters first.
    pub fn call(&self, request: RequestView) -> BoxFuture<'static, HandlerResult> {
        match self.filters.get(self.depth) {
            Some(filter) => {
                let next = Self {
                    base: Arc::clone(&self.base),
                    filters: Arc::clone(&self.filters),
                    depth: self.depth + 1,
                };
                filter.apply(request, next)
            }
            None => (self.base)(request),
        }
    }

    /// Returns this handler wrapped in one more filter.
    ///
    /// The new filter sits inside every filter attached earlier.
    #[must_use]
    pub fn filter(self, filter: FilterFn) -> Self {
        let mut filters = self.remaining().to_vec();
        filters.push(filter);
        Self {
            base: self.base,
            filters: filters.into(),
            depth: 0,
        }
    }

    /// Returns this handler wrapped so that `outer` runs before every filter
    /// it already has.
    #[must_use]
    pub(crate) fn with_outer_filters(self, outer: &[FilterFn]) -> Self {
        if outer.is_empty() {
            return self;
        }
        let mut filters = outer.to_vec();
        filters.extend_from_slice(self.remaining());
        Self {
            base: self.base,
            filters: filters.into(),
            depth: 0,
        }
    }

    /// Returns the number of filters still to run before the handler itself.
    pub fn filter_count(&self) -> usize {
        self.remaining().len()
    }

    fn remaining(&self) -> &[FilterFn] {
        &self.filters[self.depth..]
    }
}

impl fmt::Debug for HandlerFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn")
            .field("filters", &self.filter_count())
            .finish_non_exhaustive()
    }
}

/// Conversion into a [`HandlerFn`], implemented for async closures.
pub trait IntoHandler {
    /// Performs the conversion.
    fn into_handler(self) -> HandlerFn;
}

impl IntoHandler for HandlerFn {
    fn into_handler(self) -> HandlerFn {
        self
    }
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(RequestView) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_handler(self) -> HandlerFn {
        HandlerFn::new(self)
    }
}

/// Wraps `handler` in `filter`. Equivalent to [`HandlerFn::filter`].
pub fn filter(handler: impl IntoHandler, filter: FilterFn) -> HandlerFn {
    handler.into_handler().filter(filter)
}

// ── FilterFn ─────────────────────────────────────────────────────────

/// Middleware around a [`HandlerFn`].
///
/// # Examples
///
/// ```
/// use fnroute_http::{FilterFn, HandlerFn, RequestView, Response};
///
/// let deny = FilterFn::new(|req: RequestView, next: HandlerFn| async move {
///     if req.header("authorization").is_none() {
///         return Response::status(http::StatusCode::UNAUTHORIZED).build();
///     }
///     next.call(req).await
/// });
///
/// let handler = HandlerFn::new(|_req: RequestView| async { Response::ok().build() }).filter(deny);
///
/// # tokio_test::block_on(async {
/// let response = handler.call(RequestView::builder().build()).await.unwrap();
/// assert_eq!(response.status_code(), http::StatusCode::UNAUTHORIZED);
/// # });
/// ```
#[derive(Clone)]
pub struct FilterFn {
    inner: Arc<FilterCallable>,
}

impl FilterFn {
    /// Wraps an async closure receiving the request and the rest of the chain.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestView, HandlerFn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let inner: Arc<FilterCallable> = Arc::new(
            move |request: RequestView, next: HandlerFn| -> BoxFuture<'static, HandlerResult> {
                Box::pin(f(request, next))
            },
        );
        Self { inner }
    }

    /// A filter that transforms the request before passing it on.
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(RequestView) -> RequestView + Send + Sync + 'static,
    {
        Self::new(move |request, next: HandlerFn| next.call(f(request)))
    }

    /// A filter that transforms the response produced by the rest of the chain.
    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&RequestView, Response) -> HandlerResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |request: RequestView, next: HandlerFn| {
            let f = Arc::clone(&f);
            async move {
                let response = next.call(request.clone()).await?;
                f(&request, response)
            }
        })
    }

    /// A filter that turns failures of the rest of the chain into responses.
    pub fn on_error<F>(f: F) -> Self
    where
        F: Fn(RouteError, &RequestView) -> HandlerResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |request: RequestView, next: HandlerFn| {
            let f = Arc::clone(&f);
            async move {
                match next.call(request.clone()).await {
                    Ok(response) => Ok(response),
                    Err(err) => f(err, &request),
                }
            }
        })
    }

    /// Runs this filter with `next` as the rest of the chain.
    pub fn apply(&self, request: RequestView, next: HandlerFn) -> BoxFuture<'static, HandlerResult> {
        (self.inner)(request, next)
    }

    /// Composes two filters; `self` runs outside `inner`.
    #[must_use]
    pub fn and_then(self, inner: Self) -> Self {
        Self::new(move |request, next: HandlerFn| {
            self.apply(request, next.with_outer_filters(slice::from_ref(&inner)))
        })
    }
}

impl fmt::Debug for FilterFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFn").finish_non_exhaustive()
    }
}

// ── FilterChain ──────────────────────────────────────────────────────

/// An explicit ordered list of filters; the first element is outermost.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    filters: Vec<FilterFn>,
}

impl FilterChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter inside the ones already in the chain.
    #[must_use]
    pub fn then(mut self, filter: FilterFn) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends a filter in place.
    pub fn push(&mut self, filter: FilterFn) {
        self.filters.push(filter);
    }

    /// Returns the number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the chain holds no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Wraps `handler` so the whole chain runs outside its existing filters.
    pub fn apply(&self, handler: HandlerFn) -> HandlerFn {
        handler.with_outer_filters(&self.filters)
    }
}

impl FromIterator<FilterFn> for FilterChain {
    fn from_iter<I: IntoIterator<Item = FilterFn>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}
