//! Infrastructure layer module
//!
//! - Configuration management (figment: YAML files + environment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
