#![forbid(unsafe_code)]

//! Handler classification.
//!
//! Whether a click handler is worth probing is decided from its source text
//! alone: running untrusted code just to classify it is exactly what the
//! probe tries to keep rare. The fingerprint of a navigation handler is a
//! property of the host application's compiled output, so the patterns live
//! in a versioned [`ClassifierProfile`] that can be swapped without touching
//! capture or queue logic.

use normlink_core::{Document, Handler, NodeId};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `preventDefault(), stopPropagation(), window.open(f(x.click.url, x.click.name))`
/// as emitted by the current bundle.
pub const DEFAULT_PROBE_PATTERN: &str = r"&&\s*[^.]+.preventDefault\s*\(\s*\)\s*,\s*[^.]+.stopPropagation\s*\(\s*\)\s*,\s*window\.open\([^(]*\(\s*[^.]+\.click\.url\s*,\s*[^.]+\.click\.name\s*\)\s*\)\s*\)\s*";

/// The classifier's verdict for one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Leave the registration alone.
    Skip,
    /// Probe synchronously during registration.
    ProbeNow,
    /// Queue for later resolution; the registration is forwarded meanwhile.
    Defer,
}

/// Strategy deciding what to do with a click registration.
pub trait HandlerClassifier {
    fn classify(&self, handler: &Handler, document: &Document, element: NodeId) -> Disposition;

    /// Whether a failed probe on `element` should be retried later.
    fn retries(&self, document: &Document, element: NodeId) -> bool;

    /// Identifies the pattern set, for diagnostics.
    fn version(&self) -> &str {
        "custom"
    }
}

/// Pattern set for a given build of the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierProfile {
    pub version: String,
    /// Regexes matched against handler source text.
    pub probe_patterns: Vec<String>,
    /// Class markers of identity/profile widgets whose data loads late.
    pub defer_classes: Vec<String>,
}

impl Default for ClassifierProfile {
    fn default() -> Self {
        Self {
            version: "bilibili-2024".to_owned(),
            probe_patterns: vec![DEFAULT_PROBE_PATTERN.to_owned()],
            defer_classes: [
                "up-name",
                "up-avatar",
                "bili-avatar",
                "user-name",
                "sub-user-name",
                "root-reply-avatar",
                "sub-reply-avatar",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

/// Regex-driven classifier built from a [`ClassifierProfile`].
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    version: String,
    patterns: Vec<Regex>,
    defer_classes: Vec<String>,
    marker: String,
}

impl PatternClassifier {
    /// Compile `profile`. Elements carrying `marker` always classify as skip.
    pub fn from_profile(
        profile: &ClassifierProfile,
        marker: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let patterns = profile
            .probe_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: profile.version.clone(),
            patterns,
            defer_classes: profile.defer_classes.clone(),
            marker: marker.into(),
        })
    }

    fn matches_source(&self, source: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(source))
    }

    fn has_defer_class(&self, document: &Document, element: NodeId) -> bool {
        self.defer_classes
            .iter()
            .any(|class| document.has_class(element, class))
    }
}

impl HandlerClassifier for PatternClassifier {
    fn classify(&self, handler: &Handler, document: &Document, element: NodeId) -> Disposition {
        if document.has_attribute(element, &self.marker) {
            return Disposition::Skip;
        }
        if self.matches_source(handler.source_text()) {
            Disposition::ProbeNow
        } else if self.has_defer_class(document, element) {
            Disposition::Defer
        } else {
            Disposition::Skip
        }
    }

    fn retries(&self, document: &Document, element: NodeId) -> bool {
        !document.has_attribute(element, &self.marker) && self.has_defer_class(document, element)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "data-normlink-replaced";

    // Shape of a minified navigation handler from the host bundle.
    const NAV_SOURCE: &str = "function(t){n.click&&(t.preventDefault(),t.stopPropagation(),window.open(Ge(n.click.url,n.click.name)))}";

    fn element(doc: &mut Document, class: &str) -> NodeId {
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", class).unwrap();
        let body = doc.body();
        doc.append_child(body, div).unwrap();
        div
    }

    fn classifier() -> PatternClassifier {
        PatternClassifier::from_profile(&ClassifierProfile::default(), MARKER).unwrap()
    }

    #[test]
    fn navigation_fingerprint_probes_now() {
        let mut doc = Document::new();
        let div = element(&mut doc, "card");
        let handler = Handler::function(NAV_SOURCE, |_, _| Ok(()));
        assert_eq!(classifier().classify(&handler, &doc, div), Disposition::ProbeNow);
    }

    #[test]
    fn allow_listed_widget_defers() {
        let mut doc = Document::new();
        let div = element(&mut doc, "up-name clickable");
        let handler = Handler::function("function(){go()}", |_, _| Ok(()));
        let c = classifier();
        assert_eq!(c.classify(&handler, &doc, div), Disposition::Defer);
        assert!(c.retries(&doc, div));
    }

    #[test]
    fn everything_else_skips() {
        let mut doc = Document::new();
        let div = element(&mut doc, "card");
        let handler = Handler::function("function(){toggle()}", |_, _| Ok(()));
        let c = classifier();
        assert_eq!(c.classify(&handler, &doc, div), Disposition::Skip);
        assert!(!c.retries(&doc, div));
    }

    #[test]
    fn converted_elements_skip() {
        let mut doc = Document::new();
        let div = element(&mut doc, "up-name");
        doc.set_attribute(div, MARKER, "").unwrap();
        let handler = Handler::function(NAV_SOURCE, |_, _| Ok(()));
        let c = classifier();
        assert_eq!(c.classify(&handler, &doc, div), Disposition::Skip);
        assert!(!c.retries(&doc, div));
    }

    #[test]
    fn objects_never_match_the_fingerprint() {
        struct Noop;
        impl normlink_core::EventListenerObject for Noop {
            fn handle_event(
                &self,
                _scope: &mut normlink_core::CallScope<'_>,
                _event: &mut normlink_core::Event,
            ) -> normlink_core::HandlerResult {
                Ok(())
            }
        }
        let mut doc = Document::new();
        let div = element(&mut doc, "card");
        let handler = Handler::object(std::rc::Rc::new(Noop));
        assert_eq!(classifier().classify(&handler, &doc, div), Disposition::Skip);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let profile = ClassifierProfile {
            probe_patterns: vec!["(unclosed".into()],
            ..ClassifierProfile::default()
        };
        let err = PatternClassifier::from_profile(&profile, MARKER).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn profile_version_is_exposed() {
        assert_eq!(classifier().version(), "bilibili-2024");
    }
}
