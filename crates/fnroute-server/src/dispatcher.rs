//! Request dispatching.
//!
//! Each request runs through a small state machine:
//!
//! ```text
//! RECEIVED -> ROUTING -> MATCHED -> FILTERING -> HANDLING -> RESPONDING -> SENT
//!                     \-> UNMATCHED -> SENDING_404
//! (any failure while routing, filtering, handling or responding) -> SENDING_ERROR
//! ```
//!
//! Transitions are traced at `trace` level inside the request's span.
//! Failures stay scoped to the request that produced them: a failing handler
//! yields an error response, never a crashed dispatcher.

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::IntoResponse;
use fnroute_core::logging::request_span;
use fnroute_core::{RouteError, Settings};
use fnroute_http::body::BodyStream;
use fnroute_http::{FilterChain, FilterFn, HandlerFn, HandlerResult, RequestView, Response, RouterFunction};
use http::StatusCode;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::Instrument;

use crate::filters::REQUEST_ID;

/// Turns a handler failure into a response.
pub type ErrorHandler = Arc<dyn Fn(RouteError, &RequestView) -> HandlerResult + Send + Sync>;

/// The states a request passes through while being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchPhase {
    /// The request arrived and was converted into a view.
    Received,
    /// The route table is being consulted.
    Routing,
    /// A handler was found.
    Matched,
    /// Global and route filters are running.
    Filtering,
    /// The handler itself is running.
    Handling,
    /// A response was produced and is about to be written.
    Responding,
    /// The response left the dispatcher, for the transport or an in-process caller.
    Sent,
    /// No route claimed the request.
    Unmatched,
    /// The not-found response is being produced.
    SendingNotFound,
    /// A failure is being turned into an error response.
    SendingError,
}

impl DispatchPhase {
    /// Returns the phase name as used in traces.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Routing => "ROUTING",
            Self::Matched => "MATCHED",
            Self::Filtering => "FILTERING",
            Self::Handling => "HANDLING",
            Self::Responding => "RESPONDING",
            Self::Sent => "SENT",
            Self::Unmatched => "UNMATCHED",
            Self::SendingNotFound => "SENDING_404",
            Self::SendingError => "SENDING_ERROR",
        }
    }
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(phase: DispatchPhase) {
    tracing::trace!(phase = phase.as_str(), "dispatch");
}

/// Routes requests through a [`RouterFunction`] and produces responses.
///
/// The route table and filter chain are fixed once the dispatcher is built,
/// so it can be shared across concurrent requests without locking.
///
/// # Examples
///
/// ```
/// use fnroute_http::routing::{route, Predicate};
/// use fnroute_http::{RequestView, Response};
/// use fnroute_server::Dispatcher;
///
/// let router = route(Predicate::get("/hello").unwrap(), |_req: RequestView| async {
///     Response::ok().text("Hello World").build()
/// })
/// .unwrap();
/// let dispatcher = Dispatcher::new(router);
///
/// # tokio_test::block_on(async {
/// let response = dispatcher.dispatch(RequestView::builder().path("/hello").build()).await;
/// assert_eq!(response.status_code(), http::StatusCode::OK);
///
/// let response = dispatcher.dispatch(RequestView::builder().path("/other").build()).await;
/// assert_eq!(response.status_code(), http::StatusCode::NOT_FOUND);
/// # });
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    router: RouterFunction,
    filters: FilterChain,
    error_handler: Option<ErrorHandler>,
    not_found: Option<HandlerFn>,
    settings: Arc<Settings>,
}

impl Dispatcher {
    /// Creates a dispatcher for the given route table with default settings.
    pub fn new(router: RouterFunction) -> Self {
        Self {
            router,
            filters: FilterChain::new(),
            error_handler: None,
            not_found: None,
            settings: Arc::new(Settings::default()),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Adds a global filter, applied outside every route filter.
    ///
    /// Global filters only see requests some route claimed; unmatched
    /// requests go straight to the not-found handler.
    #[must_use]
    pub fn filter(mut self, filter: FilterFn) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the handler that turns failures into responses.
    ///
    /// If it fails in turn, the default error response is sent.
    #[must_use]
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(RouteError, &RequestView) -> HandlerResult + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the handler for requests no route claims.
    #[must_use]
    pub fn not_found_handler(mut self, handler: impl fnroute_http::IntoHandler) -> Self {
        self.not_found = Some(handler.into_handler());
        self
    }

    /// Returns the route table.
    pub const fn router(&self) -> &RouterFunction {
        &self.router
    }

    /// Returns the active settings.
    pub fn current_settings(&self) -> &Settings {
        &self.settings
    }

    /// Dispatches an in-process request.
    ///
    /// The request id is taken from the configured header or generated, and
    /// stored as the [`REQUEST_ID`] attribute for filters and handlers.
    pub async fn dispatch(&self, request: RequestView) -> Response {
        let request_id = request
            .header(&self.settings.request_id_header)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        let span = request_span(request.method().as_str(), request.path(), &request_id);
        let request = request.with_attribute(REQUEST_ID, request_id);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: RequestView) -> Response {
        enter(DispatchPhase::Received);
        enter(DispatchPhase::Routing);
        let Some(found) = self.router.route(&request).await else {
            enter(DispatchPhase::Unmatched);
            tracing::debug!("no route matched");
            enter(DispatchPhase::SendingNotFound);
            return self.respond_not_found(request).await;
        };

        enter(DispatchPhase::Matched);
        let handler = self.filters.apply(found.handler);
        if handler.filter_count() > 0 {
            enter(DispatchPhase::Filtering);
        }
        // Innermost layer, so HANDLING is traced once every filter has let the
        // request through.
        let handler = handler.filter(FilterFn::new(|request, next: HandlerFn| {
            enter(DispatchPhase::Handling);
            next.call(request)
        }));
        match handler.call(found.request).await {
            Ok(response) => {
                enter(DispatchPhase::Responding);
                enter(DispatchPhase::Sent);
                response
            }
            Err(err) => self.respond_error(err, &request),
        }
    }

    async fn respond_not_found(&self, request: RequestView) -> Response {
        let Some(handler) = &self.not_found else {
            return Response::not_found()
                .text(self.settings.not_found_message.clone())
                .build()
                .unwrap_or_else(|_| Response::from(StatusCode::NOT_FOUND));
        };
        match handler.call(request.clone()).await {
            Ok(response) => response,
            Err(err) => self.respond_error(err, &request),
        }
    }

    fn respond_error(&self, err: RouteError, request: &RequestView) -> Response {
        enter(DispatchPhase::SendingError);
        if err.is_cancelled() {
            tracing::debug!("request cancelled by peer");
        } else if err.status_code() >= 500 {
            tracing::error!(error = %err, "handler failed");
        } else {
            tracing::debug!(error = %err, status = err.status_code(), "request rejected");
        }

        let Some(handler) = &self.error_handler else {
            return default_error_response(&err, &self.settings);
        };
        match handler(err, request) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "error handler failed");
                default_error_response(&err, &self.settings)
            }
        }
    }

    /// Handles a transport-level request.
    ///
    /// The request body is pumped into a bounded [`BodyStream`] of
    /// `body_buffer_size` elements; the transport is read only as fast as the
    /// handler consumes, and reading stops as soon as the handler drops the
    /// body.
    pub async fn handle(&self, request: Request) -> axum::response::Response {
        let (parts, body) = request.into_parts();
        let body = pump_body(body, self.settings.body_buffer_size);
        let view = RequestView::from_parts(parts, body).with_body_limit(self.settings.max_body_size);
        self.dispatch(view).await.into_response()
    }

    /// Converts the dispatcher into an axum router that sends every request
    /// through [`handle`](Self::handle). Panicking handlers become 500s.
    pub fn into_axum_router(self) -> axum::Router {
        tracing::info!("route table:\n{}", self.router);
        let dispatcher = Arc::new(self);
        let handler = move |request: Request| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.handle(request).await }
        };
        axum::Router::new()
            .fallback(handler)
            .layer(CatchPanicLayer::new())
    }
}

fn pump_body(body: Body, capacity: usize) -> BodyStream {
    let (sender, stream) = BodyStream::channel(capacity);
    let mut upstream = BodyStream::from_stream(body.into_data_stream());
    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                () = sender.closed() => return,
                item = upstream.next() => item,
            };
            let outcome = match item {
                Some(Ok(chunk)) => sender.send(chunk).await,
                Some(Err(err)) => {
                    let _ = sender.fail(err).await;
                    return;
                }
                None => {
                    let _ = sender.finish().await;
                    return;
                }
            };
            if outcome.is_err() {
                return;
            }
        }
    });
    stream
}

/// The response sent for a failure when no error handler answers it.
///
/// The status comes from [`RouteError::status_code`]. Client errors carry the
/// error message; server errors only do when `expose_error_details` is set.
pub fn default_error_response(err: &RouteError, settings: &Settings) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if settings.expose_error_details || status.is_client_error() {
        err.to_string()
    } else {
        status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string()
    };
    Response::status(status)
        .text(message)
        .build()
        .unwrap_or_else(|_| Response::from(status))
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("filters", &self.filters.len())
            .field("has_error_handler", &self.error_handler.is_some())
            .field("has_not_found_handler", &self.not_found.is_some())
            .field("debug", &self.settings.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use fnroute_core::BodyError;
    use fnroute_http::routing::{route, Predicate};
    use http::Method;

    fn hello() -> RouterFunction {
        route(Predicate::get("/hello").unwrap(), |_req: RequestView| async {
            Response::ok().text("Hello World").build()
        })
        .unwrap()
    }

    fn failing(err: fn() -> RouteError) -> RouterFunction {
        route(Predicate::all(), move |_req: RequestView| async move {
            Err::<Response, _>(err())
        })
        .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_matched() {
        let dispatcher = Dispatcher::new(hello());
        let response = dispatcher
            .dispatch(RequestView::builder().path("/hello").build())
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(text(response).await, "Hello World");
    }

    #[tokio::test]
    async fn test_dispatch_unmatched_is_404() {
        let dispatcher = Dispatcher::new(hello());
        let response = dispatcher
            .dispatch(RequestView::builder().path("/other").build())
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "Not Found");
    }

    #[tokio::test]
    async fn test_custom_not_found_message() {
        let settings = Settings {
            not_found_message: "nothing here".to_string(),
            ..Settings::default()
        };
        let dispatcher = Dispatcher::new(hello()).settings(settings);
        let response = dispatcher
            .dispatch(RequestView::builder().path("/missing").build())
            .await;
        assert_eq!(text(response).await, "nothing here");
    }

    #[tokio::test]
    async fn test_not_found_handler() {
        let dispatcher = Dispatcher::new(hello()).not_found_handler(|req: RequestView| async move {
            Response::not_found()
                .json(&serde_json::json!({ "path": req.path() }))
                .build()
        });
        let response = dispatcher
            .dispatch(RequestView::builder().path("/gone").build())
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, r#"{"path":"/gone"}"#);
    }

    #[tokio::test]
    async fn test_handler_failure_hides_details_by_default() {
        let dispatcher = Dispatcher::new(failing(|| RouteError::handler("database on fire")));
        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_handler_failure_exposes_details_when_configured() {
        let settings = Settings {
            expose_error_details: true,
            ..Settings::default()
        };
        let dispatcher =
            Dispatcher::new(failing(|| RouteError::handler("database on fire"))).settings(settings);
        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert!(text(response).await.contains("database on fire"));
    }

    #[tokio::test]
    async fn test_client_errors_keep_status_and_message() {
        let dispatcher = Dispatcher::new(failing(|| RouteError::BadRequest("missing name".into())));
        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(text(response).await.contains("missing name"));
    }

    #[tokio::test]
    async fn test_body_errors_map_to_status() {
        let dispatcher = Dispatcher::new(failing(|| BodyError::LimitExceeded { limit: 4 }.into()));
        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_error_handler() {
        let dispatcher = Dispatcher::new(failing(|| RouteError::handler("boom")))
            .error_handler(|err, _req| Response::status(StatusCode::SERVICE_UNAVAILABLE).text(err.to_string()).build());
        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(text(response).await, "Handler failed: boom");
    }

    #[tokio::test]
    async fn test_failing_error_handler_falls_back() {
        let dispatcher = Dispatcher::new(failing(|| RouteError::handler("boom")))
            .error_handler(|_err, _req| Response::ok().header("bad header", "x").build());
        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_global_filters_skip_unmatched_requests() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let dispatcher = Dispatcher::new(hello()).filter(FilterFn::before(move |req| {
            counted.fetch_add(1, Ordering::SeqCst);
            req
        }));

        dispatcher
            .dispatch(RequestView::builder().path("/other").build())
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        dispatcher
            .dispatch(RequestView::builder().path("/hello").build())
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_id_attribute() {
        let router = route(Predicate::all(), |req: RequestView| async move {
            let id = req.attribute::<String>(REQUEST_ID).cloned().unwrap_or_default();
            Response::ok().text(id).build()
        })
        .unwrap();
        let dispatcher = Dispatcher::new(router);

        let response = dispatcher
            .dispatch(RequestView::builder().header("x-request-id", "abc").build())
            .await;
        assert_eq!(text(response).await, "abc");

        let response = dispatcher.dispatch(RequestView::builder().build()).await;
        assert_eq!(text(response).await.len(), 36);
    }

    #[tokio::test]
    async fn test_handle_reads_transport_body() {
        let router = route(Predicate::post("/echo").unwrap(), |req: RequestView| async move {
            let body = req.text().await?;
            Response::ok().text(body).build()
        })
        .unwrap();
        let dispatcher = Dispatcher::new(router);
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/echo?x=1")
            .body(Body::from("ping"))
            .unwrap();

        let response = dispatcher.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ping");
    }

    #[tokio::test]
    async fn test_handle_enforces_body_limit() {
        let router = route(Predicate::all(), |req: RequestView| async move {
            let body = req.bytes().await?;
            Response::ok().body(body).build()
        })
        .unwrap();
        let settings = Settings {
            max_body_size: 3,
            ..Settings::default()
        };
        let dispatcher = Dispatcher::new(router).settings(settings);
        let request = http::Request::builder()
            .uri("/")
            .body(Body::from("too long"))
            .unwrap();

        let response = dispatcher.handle(request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    struct Stalled(Arc<AtomicBool>);

    impl futures_core::Stream for Stalled {
        type Item = Result<bytes::Bytes, std::io::Error>;

        fn poll_next(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            std::task::Poll::Pending
        }
    }

    impl Drop for Stalled {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_pump_releases_transport_when_consumer_drops() {
        let released = Arc::new(AtomicBool::new(false));
        let mut stream = pump_body(Body::from_stream(Stalled(Arc::clone(&released))), 1);
        stream.request(1);
        tokio::task::yield_now().await;
        assert!(!released.load(Ordering::SeqCst));

        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !released.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    struct ReleaseFlag(Arc<AtomicBool>);

    impl Drop for ReleaseFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_cancels_suspended_handler() {
        let released = Arc::new(AtomicBool::new(false));
        let started = Arc::new(tokio::sync::Notify::new());
        let router = {
            let released = Arc::clone(&released);
            let started = Arc::clone(&started);
            route(Predicate::all(), move |_req: RequestView| {
                let guard = ReleaseFlag(Arc::clone(&released));
                let started = Arc::clone(&started);
                async move {
                    let _guard = guard;
                    started.notify_one();
                    std::future::pending::<()>().await;
                    Response::ok().build()
                }
            })
            .unwrap()
        };
        let dispatcher = Dispatcher::new(router);

        let task = tokio::spawn(async move {
            let request = http::Request::builder().uri("/slow").body(Body::empty()).unwrap();
            dispatcher.handle(request).await
        });
        started.notified().await;
        assert!(!released.load(Ordering::SeqCst));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropped_response_body_cancels_producer() {
        let (sender, stream) = BodyStream::channel(1);
        let stream = Arc::new(std::sync::Mutex::new(Some(stream)));
        let router = route(Predicate::all(), move |_req: RequestView| {
            let stream = stream.lock().unwrap().take();
            async move {
                let stream = stream.ok_or_else(|| RouteError::Handler("called twice".into()))?;
                Response::ok().stream(stream).build()
            }
        })
        .unwrap();

        let request = http::Request::builder().uri("/feed").body(Body::empty()).unwrap();
        let response = Dispatcher::new(router).handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);

        let sent = sender.send(bytes::Bytes::from_static(b"late")).await;
        assert_eq!(sent, Err(BodyError::Cancelled));
        assert!(sender.is_closed());
    }

    #[derive(Clone, Default)]
    struct PhaseLog(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for PhaseLog {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Phase(Option<String>);

            impl tracing::field::Visit for Phase {
                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "phase" {
                        self.0 = Some(value.to_string());
                    }
                }

                fn record_debug(&mut self, _field: &tracing::field::Field, _value: &dyn fmt::Debug) {}
            }

            let mut phase = Phase(None);
            event.record(&mut phase);
            if let Some(phase) = phase.0 {
                self.0.lock().unwrap().push(phase);
            }
        }
    }

    async fn traced_phases(dispatcher: &Dispatcher, path: &str) -> Vec<String> {
        use tracing_subscriber::layer::SubscriberExt;

        let log = PhaseLog::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        let _guard = tracing::subscriber::set_default(subscriber);
        dispatcher
            .dispatch(RequestView::builder().path(path).build())
            .await;
        let phases = log.0.lock().unwrap().clone();
        phases
    }

    #[tokio::test]
    async fn test_traced_phases_include_handling_behind_filters() {
        let dispatcher =
            Dispatcher::new(hello()).filter(FilterFn::before(|req| req.with_attribute("seen", true)));

        assert_eq!(
            traced_phases(&dispatcher, "/hello").await,
            [
                "RECEIVED",
                "ROUTING",
                "MATCHED",
                "FILTERING",
                "HANDLING",
                "RESPONDING",
                "SENT",
            ]
        );
    }

    #[tokio::test]
    async fn test_traced_phases_without_filters_and_unmatched() {
        let dispatcher = Dispatcher::new(hello());

        assert_eq!(
            traced_phases(&dispatcher, "/hello").await,
            ["RECEIVED", "ROUTING", "MATCHED", "HANDLING", "RESPONDING", "SENT"]
        );
        assert_eq!(
            traced_phases(&dispatcher, "/nope").await,
            ["RECEIVED", "ROUTING", "UNMATCHED", "SENDING_404"]
        );
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(DispatchPhase::SendingNotFound.to_string(), "SENDING_404");
        assert_eq!(DispatchPhase::Received.as_str(), "RECEIVED");
    }

    #[test]
    fn test_default_error_response_statuses() {
        let settings = Settings::default();
        let response = default_error_response(&RouteError::NotFound("x".into()), &settings);
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        let response = default_error_response(&BodyError::Cancelled.into(), &settings);
        assert_eq!(response.status_code().as_u16(), 499);
    }
}
