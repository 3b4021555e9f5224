#![forbid(unsafe_code)]

//! Configuration for the interception engine.
//!
//! Every knob lives in a single [`NormlinkConfig`] that can be loaded from
//! TOML or JSON at startup, so retuning for a new build of the host site is
//! a data change.
//!
//! # Loading
//!
//! ```toml
//! # normlink.toml
//! [queue]
//! interval_ms = 250
//! max_attempts = 40
//!
//! [placeholder]
//! sentinel_identifiers = ["0", "-1"]
//! ```
//!
//! ```rust,ignore
//! let config = NormlinkConfig::from_toml_file("normlink.toml")?;
//! let config = NormlinkConfig::from_json_str(json)?;
//! ```
//!
//! # Defaults
//!
//! `NormlinkConfig::default()` reproduces the built-in behavior exactly.

#[cfg(feature = "policy-config")]
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;
use web_time::Duration;

use crate::classifier::ClassifierProfile;
use crate::convert::DEFAULT_MARKER_ATTRIBUTE;
use crate::display::DEFAULT_DISPLAY_ATTRIBUTE_PREFIX;
use crate::error::ConfigError;
use crate::probe::PlaceholderPolicy;
use crate::sweep::{DEFAULT_PROFILE_URL_PREFIX, SweepRule, default_rules};

pub const DEFAULT_DEBUG_NAMESPACE: &str = "__normlink_debug";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormlinkConfig {
    pub capture: CaptureConfig,
    pub classifier: ClassifierProfile,
    pub placeholder: PlaceholderConfig,
    pub queue: QueueConfig,
    pub convert: ConvertConfig,
    pub sweep: SweepConfig,
    pub lifecycle: LifecycleConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl NormlinkConfig {
    /// Load from a TOML string.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "policy-config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "policy-config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Check every value; an empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.classifier.probe_patterns.is_empty() {
            errors.push("classifier.probe_patterns must not be empty".into());
        }
        for pattern in &self.classifier.probe_patterns {
            if let Err(e) = regex_lite::Regex::new(pattern) {
                errors.push(format!("classifier.probe_patterns: {pattern:?} does not compile: {e}"));
            }
        }

        if let Some(base) = &self.placeholder.base_url {
            if let Err(e) = Url::parse(base) {
                errors.push(format!("placeholder.base_url {base:?} is not a URL: {e}"));
            }
        }

        if self.queue.interval_ms == 0 {
            errors.push("queue.interval_ms must be > 0".into());
        }
        if self.queue.max_attempts == 0 {
            errors.push("queue.max_attempts must be > 0".into());
        }

        if !is_attribute_name(&self.convert.marker_attribute) {
            errors.push(format!(
                "convert.marker_attribute {:?} is not a valid attribute name",
                self.convert.marker_attribute
            ));
        }
        if !is_attribute_name(&self.convert.display_attribute_prefix) {
            errors.push(format!(
                "convert.display_attribute_prefix {:?} is not a valid attribute name",
                self.convert.display_attribute_prefix
            ));
        }
        if self.convert.link_target.is_empty() {
            errors.push("convert.link_target must not be empty".into());
        }

        if self.sweep.profile_url_prefix.is_empty() {
            errors.push("sweep.profile_url_prefix must not be empty".into());
        }
        for rule in &self.sweep.rules {
            if let Err(e) = normlink_core::SelectorList::parse(&rule.selector) {
                errors.push(format!("sweep.rules: {e}"));
            }
        }

        if self.diagnostics.namespace.is_empty() {
            errors.push("diagnostics.namespace must not be empty".into());
        }

        errors
    }

    /// [`validate`](Self::validate) as a `Result`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Placeholder policy with the base URL parsed.
    pub fn placeholder_policy(&self) -> Result<PlaceholderPolicy, ConfigError> {
        let base_url = match &self.placeholder.base_url {
            Some(base) => Some(Url::parse(base).map_err(|e| {
                ConfigError::Validation(vec![format!("placeholder.base_url {base:?}: {e}")])
            })?),
            None => None,
        };
        Ok(PlaceholderPolicy {
            reject_empty_identifier: self.placeholder.reject_empty_identifier,
            sentinel_identifiers: self.placeholder.sentinel_identifiers.clone(),
            base_url,
        })
    }
}

fn is_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '>' | '/' | '=' | '[' | ']'))
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Navigation-intent capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Convert as soon as a probe succeeds. When off, harvested URLs are
    /// installed on the next lifecycle trigger.
    pub instant_replace: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            instant_replace: true,
        }
    }
}

/// Unresolved-placeholder detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub reject_empty_identifier: bool,
    pub sentinel_identifiers: Vec<String>,
    pub base_url: Option<String>,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        let policy = PlaceholderPolicy::default();
        Self {
            reject_empty_identifier: policy.reject_empty_identifier,
            sentinel_identifiers: policy.sentinel_identifiers,
            base_url: None,
        }
    }
}

/// Deferred resolution cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub interval_ms: u64,
    /// Scheduled drain rounds after the page settles.
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_attempts: 100,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Element conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub marker_attribute: String,
    pub display_attribute_prefix: String,
    pub link_target: String,
    /// Reject later writes to `href` from the page.
    pub lock_href: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_owned(),
            display_attribute_prefix: DEFAULT_DISPLAY_ATTRIBUTE_PREFIX.to_owned(),
            link_target: "_blank".to_owned(),
            lock_href: true,
        }
    }
}

/// Discovery sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub profile_url_prefix: String,
    pub rules: Vec<SweepRule>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profile_url_prefix: DEFAULT_PROFILE_URL_PREFIX.to_owned(),
            rules: default_rules(),
        }
    }
}

/// Trigger handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub max_waiting_sweeps: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_waiting_sweeps: 3,
        }
    }
}

/// Diagnostic surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub publish: bool,
    pub namespace: String,
    /// Characters of handler source kept per unresolved entry.
    pub source_excerpt_chars: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            publish: true,
            namespace: DEFAULT_DEBUG_NAMESPACE.to_owned(),
            source_excerpt_chars: 160,
        }
    }
}
