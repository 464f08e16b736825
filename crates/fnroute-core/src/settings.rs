//! Settings for fnroute.
//!
//! [`Settings`] holds the knobs the dispatcher and body machinery consult at
//! assembly time. Values come from [`Settings::default`] and can be layered
//! with files and environment variables through
//! [`settings_loader`](crate::settings_loader).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default number of elements a body channel buffers before its producer waits.
pub const DEFAULT_BODY_BUFFER_SIZE: usize = 16;

/// Default upper bound, in bytes, for bodies collected into memory.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// The complete set of fnroute settings.
///
/// # Examples
///
/// ```
/// use fnroute_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.request_id_header, "x-request-id");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,

    // ── Bodies ───────────────────────────────────────────────────────

    /// Capacity of bounded body channels created by the dispatcher.
    pub body_buffer_size: usize,
    /// Largest body, in bytes, that extractors collect into memory.
    pub max_body_size: usize,

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Header carrying the request id assigned by the request-id filter.
    pub request_id_header: String,
    /// Body of the default 404 response.
    pub not_found_message: String,
    /// Whether the default error handler includes error messages in 5xx bodies.
    pub expose_error_details: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log level (e.g. "info", "debug", "fnroute_server=trace").
    pub log_level: String,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Application settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            body_buffer_size: DEFAULT_BODY_BUFFER_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            request_id_header: "x-request-id".to_string(),
            not_found_message: "Not Found".to_string(),
            expose_error_details: false,
            log_level: "info".to_string(),
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns a value from [`Settings::extra`], if present.
    pub fn extra_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.body_buffer_size, 16);
        assert_eq!(s.max_body_size, 2 * 1024 * 1024);
        assert_eq!(s.request_id_header, "x-request-id");
        assert_eq!(s.not_found_message, "Not Found");
        assert!(!s.expose_error_details);
        assert_eq!(s.log_level, "info");
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_extra_value() {
        let mut s = Settings::default();
        s.extra
            .insert("greeting".to_string(), serde_json::json!("hello"));
        assert_eq!(s.extra_value("greeting"), Some(&serde_json::json!("hello")));
        assert!(s.extra_value("missing").is_none());
    }

    #[test]
    fn test_settings_serialize_fields() {
        let s = Settings {
            debug: false,
            max_body_size: 1024,
            ..Settings::default()
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["debug"], serde_json::json!(false));
        assert_eq!(json["max_body_size"], serde_json::json!(1024));
    }
}
