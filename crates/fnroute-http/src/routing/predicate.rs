//! Request predicates.
//!
//! A [`Predicate`] is a pure test over a [`RequestView`]. Evaluating it yields
//! a [`MatchResult`] carrying the path variables bound by the match. Predicates
//! compose with [`Predicate::and`], [`Predicate::or`] and [`Predicate::negate`]
//! and render themselves with `Display`, e.g. `(GET && /person/{id})`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use fnroute_core::{RouteError, RouteResult};
use http::header::HeaderName;
use http::Method;
use mime::Mime;

use crate::media;
use crate::request::RequestView;
use crate::routing::template::{Bindings, PathTemplate};

/// The outcome of evaluating a [`Predicate`].
///
/// Bindings are only meaningful when [`is_match`](Self::is_match) is `true`;
/// a failed evaluation never carries partial bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    matched: bool,
    variables: Bindings,
}

impl MatchResult {
    /// A successful match with the given bindings.
    pub fn matched(variables: Bindings) -> Self {
        Self {
            matched: true,
            variables,
        }
    }

    /// A failed match.
    pub fn no_match() -> Self {
        Self::default()
    }

    /// Returns `true` if the predicate matched.
    pub const fn is_match(&self) -> bool {
        self.matched
    }

    /// Returns the bound path variables.
    pub const fn variables(&self) -> &Bindings {
        &self.variables
    }

    /// Consumes the result, returning the bound path variables.
    pub fn into_variables(self) -> Bindings {
        self.variables
    }
}

impl From<bool> for MatchResult {
    fn from(matched: bool) -> Self {
        if matched {
            Self::matched(Bindings::new())
        } else {
            Self::no_match()
        }
    }
}

type PredicateCallable = dyn Fn(&RequestView) -> MatchResult + Send + Sync;

enum Kind {
    All,
    Methods(Vec<Method>),
    Path(PathTemplate),
    Header { name: HeaderName, value: String },
    HeaderPresent(HeaderName),
    ContentType(Mime),
    Accept(Mime),
    QueryParam { name: String, value: Option<String> },
    And(Predicate, Predicate),
    Or(Predicate, Predicate),
    Not(Predicate),
    Custom {
        description: String,
        test: Arc<PredicateCallable>,
    },
}

/// A composable matcher over requests.
///
/// # Examples
///
/// ```
/// use fnroute_http::routing::Predicate;
/// use fnroute_http::RequestView;
///
/// let predicate = Predicate::get("/person/{id}")
///     .unwrap()
///     .and(Predicate::accept(mime::APPLICATION_JSON));
///
/// let request = RequestView::builder()
///     .path("/person/42")
///     .header("accept", "application/json")
///     .build();
///
/// let result = predicate.evaluate(&request);
/// assert!(result.is_match());
/// assert_eq!(result.variables()["id"], "42");
/// assert_eq!(predicate.to_string(), "((GET && /person/{id}) && Accept: application/json)");
/// ```
#[derive(Clone)]
pub struct Predicate(Arc<Kind>);

impl Predicate {
    fn from_kind(kind: Kind) -> Self {
        Self(Arc::new(kind))
    }

    // ── Primitives ───────────────────────────────────────────────────

    /// Matches every request.
    pub fn all() -> Self {
        Self::from_kind(Kind::All)
    }

    /// Matches requests with the given method.
    pub fn method(method: Method) -> Self {
        Self::methods([method])
    }

    /// Matches requests with any of the given methods.
    pub fn methods(methods: impl IntoIterator<Item = Method>) -> Self {
        Self::from_kind(Kind::Methods(methods.into_iter().collect()))
    }

    /// Matches the routing path against a template, binding its variables.
    pub fn path(template: &str) -> RouteResult<Self> {
        PathTemplate::parse(template).map(|t| Self::from_kind(Kind::Path(t)))
    }

    /// Matches requests carrying a header with exactly this value.
    pub fn header(name: HeaderName, value: impl Into<String>) -> Self {
        Self::from_kind(Kind::Header {
            name,
            value: value.into(),
        })
    }

    /// Matches requests carrying the header at all.
    pub fn header_present(name: HeaderName) -> Self {
        Self::from_kind(Kind::HeaderPresent(name))
    }

    /// Matches requests whose `Content-Type` is compatible with `media_type`.
    /// A request without one is treated as `application/octet-stream`.
    pub fn content_type(media_type: Mime) -> Self {
        Self::from_kind(Kind::ContentType(media_type))
    }

    /// Matches requests whose `Accept` header admits `media_type`.
    /// A request without one accepts everything; `q=0` entries refuse.
    pub fn accept(media_type: Mime) -> Self {
        Self::from_kind(Kind::Accept(media_type))
    }

    /// Matches requests where the query parameter has this value.
    pub fn query_param(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::from_kind(Kind::QueryParam {
            name: name.into(),
            value: Some(value.into()),
        })
    }

    /// Matches requests where the query parameter is present.
    pub fn query_param_present(name: impl Into<String>) -> Self {
        Self::from_kind(Kind::QueryParam {
            name: name.into(),
            value: None,
        })
    }

    /// A custom predicate. `description` is what `Display` shows.
    pub fn from_fn<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&RequestView) -> MatchResult + Send + Sync + 'static,
    {
        Self::from_kind(Kind::Custom {
            description: description.into(),
            test: Arc::new(test),
        })
    }

    // ── Method + path shortcuts ──────────────────────────────────────

    fn method_and_path(method: Method, template: &str) -> RouteResult<Self> {
        Ok(Self::method(method).and(Self::path(template)?))
    }

    /// `GET` and the path template.
    pub fn get(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::GET, template)
    }

    /// `POST` and the path template.
    pub fn post(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::POST, template)
    }

    /// `PUT` and the path template.
    pub fn put(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::PUT, template)
    }

    /// `PATCH` and the path template.
    pub fn patch(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::PATCH, template)
    }

    /// `DELETE` and the path template.
    pub fn delete(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::DELETE, template)
    }

    /// `HEAD` and the path template.
    pub fn head(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::HEAD, template)
    }

    /// `OPTIONS` and the path template.
    pub fn options(template: &str) -> RouteResult<Self> {
        Self::method_and_path(Method::OPTIONS, template)
    }

    // ── Combinators ──────────────────────────────────────────────────

    /// Matches when both match; `other`'s bindings are layered over `self`'s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::from_kind(Kind::And(self, other))
    }

    /// Matches when either matches, preferring `self`'s bindings.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::from_kind(Kind::Or(self, other))
    }

    /// Inverts the result and drops any bindings.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::from_kind(Kind::Not(self))
    }

    // ── Evaluation ───────────────────────────────────────────────────

    /// Evaluates the predicate against a request.
    pub fn evaluate(&self, request: &RequestView) -> MatchResult {
        match &*self.0 {
            Kind::All => MatchResult::from(true),
            Kind::Methods(methods) => methods.contains(request.method()).into(),
            Kind::Path(template) => template
                .matches(request.routing_path())
                .map_or_else(MatchResult::no_match, MatchResult::matched),
            Kind::Header { name, value } => request
                .headers()
                .get_all(name)
                .iter()
                .any(|v| v.to_str().is_ok_and(|v| v.trim() == value.as_str()))
                .into(),
            Kind::HeaderPresent(name) => request.headers().contains_key(name).into(),
            Kind::ContentType(media_type) => {
                let actual = request
                    .content_type()
                    .unwrap_or(mime::APPLICATION_OCTET_STREAM);
                media::is_compatible(media_type, &actual).into()
            }
            Kind::Accept(media_type) => media::is_acceptable(media_type, &request.accept()).into(),
            Kind::QueryParam { name, value } => match value {
                None => request.query().contains_key(name),
                Some(value) => request
                    .query()
                    .get_list(name)
                    .is_some_and(|values| values.iter().any(|v| v == value)),
            }
            .into(),
            Kind::And(left, right) => {
                let left = left.evaluate(request);
                if !left.is_match() {
                    return MatchResult::no_match();
                }
                let right = right.evaluate(request);
                if !right.is_match() {
                    return MatchResult::no_match();
                }
                let mut variables = left.into_variables();
                variables.extend(right.into_variables());
                MatchResult::matched(variables)
            }
            Kind::Or(left, right) => {
                let left = left.evaluate(request);
                if left.is_match() {
                    left
                } else {
                    right.evaluate(request)
                }
            }
            Kind::Not(inner) => (!inner.evaluate(request).is_match()).into(),
            Kind::Custom { test, .. } => test(request),
        }
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Returns the path variable names this predicate can bind.
    pub fn variable_names(&self) -> Vec<String> {
        match &*self.0 {
            Kind::Path(template) => template
                .variable_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Kind::And(left, right) | Kind::Or(left, right) => {
                let mut names = left.variable_names();
                for name in right.variable_names() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            }
            _ => Vec::new(),
        }
    }

    /// Rejects `and` combinations whose path templates bind the same name.
    pub fn validate(&self) -> RouteResult<()> {
        match &*self.0 {
            Kind::And(left, right) => {
                left.validate()?;
                right.validate()?;
                let left_names: HashSet<String> = left.variable_names().into_iter().collect();
                if let Some(name) = right
                    .variable_names()
                    .into_iter()
                    .find(|name| left_names.contains(name))
                {
                    return Err(RouteError::Configuration(format!(
                        "path variable '{name}' is bound twice in {self}"
                    )));
                }
                Ok(())
            }
            Kind::Or(left, right) => {
                left.validate()?;
                right.validate()
            }
            Kind::Not(inner) => inner.validate(),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Kind::All => f.write_str("*"),
            Kind::Methods(methods) => {
                let names: Vec<&str> = methods.iter().map(Method::as_str).collect();
                if names.len() == 1 {
                    f.write_str(names[0])
                } else {
                    write!(f, "({})", names.join(" || "))
                }
            }
            Kind::Path(template) => write!(f, "{template}"),
            Kind::Header { name, value } => write!(f, "{name}: {value}"),
            Kind::HeaderPresent(name) => write!(f, "{name}"),
            Kind::ContentType(media_type) => write!(f, "Content-Type: {media_type}"),
            Kind::Accept(media_type) => write!(f, "Accept: {media_type}"),
            Kind::QueryParam { name, value } => match value {
                Some(value) => write!(f, "?{name}={value}"),
                None => write!(f, "?{name}"),
            },
            Kind::And(left, right) => write!(f, "({left} && {right})"),
            Kind::Or(left, right) => write!(f, "({left} || {right})"),
            Kind::Not(inner) => write!(f, "!{inner}"),
            Kind::Custom { description, .. } => f.write_str(description),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({self})")
    }
}
