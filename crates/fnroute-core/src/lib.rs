//! # fnroute-core
//!
//! Core types for the fnroute functional routing engine: the error taxonomy,
//! settings and their loader, logging helpers, and shared utilities. This
//! crate has no HTTP dependencies.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine settings
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration
//! - [`utils`] - Utility types (`MultiValueDict`)

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use error::{BodyError, DecodeError, RouteError, RouteResult};
pub use settings::Settings;
