#![forbid(unsafe_code)]

//! Error types for the runtime.

use normlink_core::{DomError, NodeId, SelectorError};
use thiserror::Error;

/// Failure to turn an element into a working hyperlink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// The element is not part of the live document.
    #[error("element {0} is not connected to the document")]
    Detached(NodeId),
    /// The element has no parent to be re-inserted under.
    #[error("element {0} has no parent")]
    Orphan(NodeId),
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Errors that can occur when building or loading a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "policy-config")]
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// A classifier pattern failed to compile.
    Pattern {
        pattern: String,
        source: regex_lite::Error,
    },
    /// A sweep selector failed to parse.
    Selector {
        selector: String,
        source: SelectorError,
    },
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "policy-config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Pattern { pattern, source } => {
                write!(f, "invalid probe pattern {pattern:?}: {source}")
            }
            Self::Selector { selector, source } => {
                write!(f, "invalid sweep selector {selector:?}: {source}")
            }
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "policy-config")]
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Pattern { source, .. } => Some(source),
            Self::Selector { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}
