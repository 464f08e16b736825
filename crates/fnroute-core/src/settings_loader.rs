//! Settings loading from configuration files.
//!
//! Builds [`Settings`] from TOML or JSON files and applies environment
//! variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (deep-merged over the defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `FNROUTE_DEBUG` | `debug` |
//! | `FNROUTE_LOG_LEVEL` | `log_level` |
//! | `FNROUTE_BODY_BUFFER_SIZE` | `body_buffer_size` |
//! | `FNROUTE_MAX_BODY_SIZE` | `max_body_size` |
//! | `FNROUTE_REQUEST_ID_HEADER` | `request_id_header` |
//! | `FNROUTE_NOT_FOUND_MESSAGE` | `not_found_message` |
//! | `FNROUTE_EXPOSE_ERROR_DETAILS` | `expose_error_details` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use fnroute_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file("config/fnroute.toml").unwrap();
//! let settings = settings_loader::from_json_file_with_env("config/fnroute.json").unwrap();
//! ```

use std::path::Path;

use crate::error::RouteError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Fields absent from the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, RouteError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| RouteError::Configuration(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, RouteError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, RouteError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, RouteError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| RouteError::Configuration(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, RouteError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, RouteError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `FNROUTE_*` environment variable overrides to a settings struct.
///
/// Boolean values accept "true"/"1"/"yes"; numeric values that fail to parse
/// are ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("FNROUTE_DEBUG") {
        settings.debug = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("FNROUTE_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("FNROUTE_BODY_BUFFER_SIZE") {
        if let Ok(size) = val.parse::<usize>() {
            settings.body_buffer_size = size.max(1);
        }
    }

    if let Ok(val) = std::env::var("FNROUTE_MAX_BODY_SIZE") {
        if let Ok(size) = val.parse::<usize>() {
            settings.max_body_size = size;
        }
    }

    if let Ok(val) = std::env::var("FNROUTE_REQUEST_ID_HEADER") {
        settings.request_id_header = val.to_lowercase();
    }

    if let Ok(val) = std::env::var("FNROUTE_NOT_FOUND_MESSAGE") {
        settings.not_found_message = val;
    }

    if let Ok(val) = std::env::var("FNROUTE_EXPOSE_ERROR_DETAILS") {
        settings.expose_error_details = parse_bool(&val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn read_config(path: &Path, format: &str) -> Result<String, RouteError> {
    std::fs::read_to_string(path).map_err(|e| {
        RouteError::Configuration(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, RouteError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        RouteError::Configuration(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        RouteError::Configuration(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
