#![forbid(unsafe_code)]

//! Display preservation for converted elements.
//!
//! Replacing a `<div>` with an `<a>` would turn a block box into an inline
//! one. The converter marks every new anchor with an attribute naming the
//! original tag's default `display`, and one `:where([attr]){display:value}`
//! rule per distinct value makes the marker effective. `:where` keeps the
//! rule at zero specificity so page styles still win.

use std::collections::{HashMap, HashSet};

use normlink_backend::StyleOracle;
use normlink_core::{Document, DomError};
use tracing::debug;

pub const DEFAULT_DISPLAY_ATTRIBUTE_PREFIX: &str = "data-normlink-display-";

/// Tag → default display memo plus the set of display values already ruled.
#[derive(Debug, Clone)]
pub struct DisplayCache {
    prefix: String,
    by_tag: HashMap<String, String>,
    ruled: HashSet<String>,
}

impl Default for DisplayCache {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_ATTRIBUTE_PREFIX)
    }
}

impl DisplayCache {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            by_tag: HashMap::new(),
            ruled: HashSet::new(),
        }
    }

    /// Cached default display for `tag`, if computed.
    #[must_use]
    pub fn cached(&self, tag: &str) -> Option<&str> {
        self.by_tag.get(&tag.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn has_rule(&self, display: &str) -> bool {
        self.ruled.contains(display)
    }

    /// Attribute that gives an anchor the default display of `tag`.
    ///
    /// Asks `styles` at most once per tag and injects the style rule into
    /// `<head>` at most once per display value.
    pub fn layout_attribute(
        &mut self,
        document: &mut Document,
        styles: &mut dyn StyleOracle,
        tag: &str,
    ) -> Result<String, DomError> {
        let tag = tag.to_ascii_lowercase();
        let display = match self.by_tag.get(&tag) {
            Some(display) => display.clone(),
            None => {
                let value = styles.default_display(&tag);
                debug!(target: "normlink.convert", tag = %tag, display = %value, "default display");
                self.by_tag.insert(tag, value.clone());
                value
            }
        };
        let attribute = format!("{}{display}", self.prefix);
        if !self.ruled.contains(&display) {
            inject_rule(document, &attribute, &display)?;
            self.ruled.insert(display);
        }
        Ok(attribute)
    }
}

fn inject_rule(document: &mut Document, attribute: &str, display: &str) -> Result<(), DomError> {
    let style = document.create_element("style");
    let text = document.create_text(format!(":where([{attribute}]){{display:{display}}}"));
    document.append_child(style, text)?;
    let head = document.head();
    document.append_child(head, style)
}
