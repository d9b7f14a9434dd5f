//! Configuration loading traits and types.
//!
//! Every simioc binary and IOC assembly loads its TOML configuration
//! through [`ConfigLoader`], and embeds [`SharedConfig`] for the fields
//! common to all of them.
//!
//! # Usage
//!
//! ```rust,no_run
//! use simioc_common::config::{ConfigLoader, SharedConfig, ConfigError};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyIocConfig {
//!     shared: SharedConfig,
//!     prefix: String,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyIocConfig::load(Path::new("ioc.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::consts::DEFAULT_SERVICE_NAME;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about simulator operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared across all simioc processes.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "simioc-btps"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Process instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Substitute `{name}` macros in `template` with values from `macros`.
///
/// `{{` and `}}` escape literal braces. An unknown macro name or an
/// unterminated `{` is a validation error.
///
/// ```
/// use std::collections::BTreeMap;
/// use simioc_common::config::expand_macros;
///
/// let mut macros = BTreeMap::new();
/// macros.insert("motor".to_string(), "mtr1".to_string());
/// assert_eq!(expand_macros("sim:{motor}", &macros).unwrap(), "sim:mtr1");
/// ```
pub fn expand_macros(
    template: &str,
    macros: &BTreeMap<String, String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(ConfigError::ValidationError(format!(
                        "Unterminated macro in '{template}'"
                    )));
                }
                let value = macros.get(&key).ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "Unknown macro '{{{key}}}' in '{template}'"
                    ))
                })?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Parse a `key=value` macro definition as given on the command line.
pub fn parse_macro(definition: &str) -> Result<(String, String), ConfigError> {
    match definition.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::ValidationError(format!(
            "Invalid macro definition '{definition}' (expected key=value)"
        ))),
    }
}
