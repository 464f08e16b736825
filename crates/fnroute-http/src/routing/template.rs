//! Compiled path templates.
//!
//! A template such as `/person/{id}` is parsed once into an ordered list of
//! segments. Matching walks the request path segment by segment; empty
//! segments are ignored on both sides, so a trailing slash is insignificant.

use std::collections::HashMap;
use std::fmt;

use fnroute_core::{RouteError, RouteResult};
use once_cell::sync::Lazy;
use regex::Regex;

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{(\*)?([A-Za-z_][A-Za-z0-9_]*)\}$").expect("variable pattern is a valid regex")
});

/// Path variables bound by a successful match.
pub type Bindings = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
    /// Matches every remaining segment, optionally binding them under a name.
    Rest(Option<String>),
}

/// A compiled path template.
///
/// Supported segment forms:
///
/// - `person` - a literal, matched exactly
/// - `{id}` - a variable, matching any single segment
/// - `{*rest}` - a trailing wildcard binding the remainder of the path
/// - `**` - a trailing wildcard that binds nothing
///
/// # Examples
///
/// ```
/// use fnroute_http::routing::PathTemplate;
///
/// let template = PathTemplate::parse("/person/{id}").unwrap();
/// let bindings = template.matches("/person/42").unwrap();
/// assert_eq!(bindings["id"], "42");
/// assert!(template.matches("/person/42/extra").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compiles a template.
    ///
    /// Fails with [`RouteError::Configuration`] for unbalanced braces, invalid
    /// or repeated variable names, and wildcards that are not the last segment.
    pub fn parse(template: &str) -> RouteResult<Self> {
        let parts: Vec<&str> = split_segments(template).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (index, part) in parts.iter().enumerate() {
            let is_last = index + 1 == parts.len();
            let segment = if *part == "**" {
                Segment::Rest(None)
            } else if let Some(caps) = VARIABLE.captures(part) {
                let name = caps.get(2).map_or("", |m| m.as_str());
                if names.contains(&name) {
                    return Err(config_error(template, &format!("variable '{name}' appears twice")));
                }
                names.push(name);
                if caps.get(1).is_some() {
                    Segment::Rest(Some(name.to_string()))
                } else {
                    Segment::Variable(name.to_string())
                }
            } else if part.contains(['{', '}', '*']) {
                return Err(config_error(template, &format!("invalid segment '{part}'")));
            } else {
                Segment::Literal((*part).to_string())
            };

            if matches!(segment, Segment::Rest(_)) && !is_last {
                return Err(config_error(template, "a wildcard must be the last segment"));
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// Returns the template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the names of the variables this template binds.
    pub fn variable_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Variable(name) | Segment::Rest(Some(name)) => Some(name.as_str()),
                Segment::Literal(_) | Segment::Rest(None) => None,
            })
            .collect()
    }

    /// Returns `true` if the template ends in a wildcard.
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Rest(_)))
    }

    /// Matches the whole of `path`, returning the bound variables.
    pub fn matches(&self, path: &str) -> Option<Bindings> {
        let parts: Vec<&str> = split_segments(path).collect();
        let (bindings, consumed) = self.match_segments(&parts)?;
        (consumed == parts.len()).then_some(bindings)
    }

    /// Matches a prefix of `path`, returning the bound variables and the
    /// unmatched remainder (always starting with `/`).
    pub fn match_prefix(&self, path: &str) -> Option<(Bindings, String)> {
        let parts: Vec<&str> = split_segments(path).collect();
        let (bindings, consumed) = self.match_segments(&parts)?;
        let remaining = format!("/{}", parts[consumed..].join("/"));
        Some((bindings, remaining))
    }

    fn match_segments(&self, parts: &[&str]) -> Option<(Bindings, usize)> {
        let mut bindings = Bindings::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest(name) => {
                    if let Some(name) = name {
                        let rest: Vec<String> =
                            parts[index.min(parts.len())..].iter().map(|p| decode(p)).collect();
                        bindings.insert(name.clone(), rest.join("/"));
                    }
                    return Some((bindings, parts.len()));
                }
                Segment::Literal(literal) => {
                    if *parts.get(index)? != literal.as_str() {
                        return None;
                    }
                }
                Segment::Variable(name) => {
                    bindings.insert(name.clone(), decode(parts.get(index)?));
                }
            }
        }
        Some((bindings, self.segments.len()))
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn decode(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned()
}

fn config_error(template: &str, reason: &str) -> RouteError {
    RouteError::Configuration(format!("invalid path template '{template}': {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_binds_segment() {
        let template = PathTemplate::parse("/person/{id}").unwrap();
        let bindings = template.matches("/person/42").unwrap();
        assert_eq!(bindings.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_segment_count_must_match() {
        let template = PathTemplate::parse("/person/{id}").unwrap();
        assert!(template.matches("/person/42/extra").is_none());
        assert!(template.matches("/person").is_none());
    }

    #[test]
    fn test_literals_match_exactly() {
        let template = PathTemplate::parse("/hello").unwrap();
        assert!(template.matches("/hello").is_some());
        assert!(template.matches("/Hello").is_none());
        assert!(template.matches("/hello2").is_none());
    }

    #[test]
    fn test_trailing_slash_is_insignificant() {
        let template = PathTemplate::parse("/person/").unwrap();
        assert!(template.matches("/person").is_some());
        assert!(template.matches("/person/").is_some());
    }

    #[test]
    fn test_root_template() {
        let template = PathTemplate::parse("/").unwrap();
        assert!(template.matches("/").is_some());
        assert!(template.matches("").is_some());
        assert!(template.matches("/x").is_none());
    }

    #[test]
    fn test_named_wildcard_binds_rest() {
        let template = PathTemplate::parse("/static/{*file}").unwrap();
        let bindings = template.matches("/static/css/site.css").unwrap();
        assert_eq!(bindings["file"], "css/site.css");
        let empty = template.matches("/static").unwrap();
        assert_eq!(empty["file"], "");
    }

    #[test]
    fn test_anonymous_wildcard() {
        let template = PathTemplate::parse("/api/**").unwrap();
        assert!(template.has_wildcard());
        assert!(template.matches("/api/v1/people").unwrap().is_empty());
        assert!(template.matches("/other/v1").is_none());
    }

    #[test]
    fn test_values_are_percent_decoded() {
        let template = PathTemplate::parse("/files/{name}").unwrap();
        let bindings = template.matches("/files/hello%20world.txt").unwrap();
        assert_eq!(bindings["name"], "hello world.txt");
    }

    #[test]
    fn test_match_prefix_returns_remainder() {
        let template = PathTemplate::parse("/org/{org}").unwrap();
        let (bindings, rest) = template.match_prefix("/org/acme/person/7").unwrap();
        assert_eq!(bindings["org"], "acme");
        assert_eq!(rest, "/person/7");

        let (_, rest) = template.match_prefix("/org/acme").unwrap();
        assert_eq!(rest, "/");
        assert!(template.match_prefix("/team/acme").is_none());
    }

    #[test]
    fn test_variable_names() {
        let template = PathTemplate::parse("/{org}/people/{id}/{*rest}").unwrap();
        assert_eq!(template.variable_names(), vec!["org", "id", "rest"]);
    }

    #[test]
    fn test_invalid_templates() {
        for bad in [
            "/person/{id",
            "/person/id}",
            "/person/{1id}",
            "/person/{}",
            "/{id}/{id}",
            "/**/tail",
            "/{*rest}/tail",
            "/file.{ext}",
            "/a*b",
        ] {
            let err = PathTemplate::parse(bad).unwrap_err();
            assert!(
                matches!(err, RouteError::Configuration(_)),
                "expected configuration error for {bad}"
            );
        }
    }

    #[test]
    fn test_display_is_raw_template() {
        let template = PathTemplate::parse("/person/{id}").unwrap();
        assert_eq!(template.to_string(), "/person/{id}");
    }
}
