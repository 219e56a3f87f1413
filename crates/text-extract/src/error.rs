//! Error types for text-extract.
//!
//! Every fallible operation in the crate returns [`ExtractError`]. The variants
//! follow the propagation rules of the strategy system:
//!
//! - `UnsupportedFormat`, `UnknownStrategy` and `Config` are structural problems
//!   and always surface to the caller.
//! - `BackendInitialization` and `Ocr` come from the opaque OCR/ML backends.
//!   Strategies degrade around them where a degraded mode exists and only
//!   propagate them when it does not.
//! - `Io` (from `std::io::Error`) bubbles up unchanged.
//!
//! # Example
//!
//! ```rust
//! use text_extract::{ExtractError, Result};
//!
//! fn read_config(path: &str) -> Result<String> {
//!     let content = std::fs::read_to_string(path)?;
//!
//!     if content.trim().is_empty() {
//!         return Err(ExtractError::config(format!("Config file is empty: {}", path)));
//!     }
//!
//!     Ok(content)
//! }
//! ```
use thiserror::Error;

/// Result type alias using `ExtractError`.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Main error type for all text-extract operations.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input can neither be read as an image nor converted to one.
    #[error("Strategy '{strategy}' does not support format {mime_type}")]
    UnsupportedFormat { strategy: String, mime_type: String },

    /// No strategy with this name after config loading and discovery.
    #[error("Unknown strategy '{name}'. Available: {}", .available.join(", "))]
    UnknownStrategy { name: String, available: Vec<String> },

    /// Returned only by the fail-fast registration path.
    #[error("Strategy '{name}' is already registered")]
    DuplicateStrategy { name: String },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A backend could not be brought up, even without acceleration.
    #[error("Backend initialization failed for '{strategy}': {message}")]
    BackendInitialization {
        strategy: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OCR error: {message}")]
    Ocr {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        ExtractError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl ExtractError {
    error_constructor!(config, Config);
    error_constructor!(ocr, Ocr);
    error_constructor!(validation, Validation);
    error_constructor!(serialization, Serialization);

    /// Create an `UnsupportedFormat` error.
    pub fn unsupported_format<S: Into<String>, M: Into<String>>(strategy: S, mime_type: M) -> Self {
        Self::UnsupportedFormat {
            strategy: strategy.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Create a `BackendInitialization` error.
    pub fn backend_initialization<S: Into<String>, M: Into<String>>(strategy: S, message: M) -> Self {
        Self::BackendInitialization {
            strategy: strategy.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a `BackendInitialization` error that keeps the backend's error as its source.
    pub fn backend_initialization_with_source<S, M, E>(strategy: S, message: M, source: E) -> Self
    where
        S: Into<String>,
        M: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::BackendInitialization {
            strategy: strategy.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
