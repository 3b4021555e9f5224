#![forbid(unsafe_code)]

//! Selector-driven discovery of links whose URL is already in the markup.
//!
//! Some widgets never need probing: the destination is spelled out in a data
//! attribute, either as a full URL or as a user id to be appended to the
//! profile prefix. Each [`SweepRule`] pairs a selector with where its URL
//! comes from. Elements carrying the converted marker are never touched.

use normlink_backend::PageParts;
use normlink_core::{NodeId, SelectorList};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::convert::{ElementConverter, Upgrade};
use crate::display::DisplayCache;
use crate::error::ConfigError;

pub const DEFAULT_PROFILE_URL_PREFIX: &str = "https://space.bilibili.com/";

/// Where a rule reads its URL from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UrlSource {
    /// The attribute holds the full URL.
    Attribute { name: String },
    /// The attribute holds an id appended to the profile prefix.
    Profile { attribute: String },
}

/// One markup convention, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepRule {
    pub selector: String,
    pub source: UrlSource,
}

impl SweepRule {
    pub fn attribute(selector: &str, name: &str) -> Self {
        Self {
            selector: selector.to_owned(),
            source: UrlSource::Attribute {
                name: name.to_owned(),
            },
        }
    }

    pub fn profile(selector: &str, attribute: &str) -> Self {
        Self {
            selector: selector.to_owned(),
            source: UrlSource::Profile {
                attribute: attribute.to_owned(),
            },
        }
    }
}

/// Conventions used by the host site's older widgets.
#[must_use]
pub fn default_rules() -> Vec<SweepRule> {
    vec![
        SweepRule::attribute("a.jump-link[data-url]", "data-url"),
        SweepRule::profile("a.jump-link[data-user-id]", "data-user-id"),
        SweepRule::profile(".bili-rich-text-module.at[data-oid]", "data-oid"),
        SweepRule::profile(".opus-text-rich-hl.at[data-rid]", "data-rid"),
        SweepRule::profile(
            ".root-reply-avatar[data-user-id], .user-name[data-user-id], \
             .sub-user-name[data-user-id], .sub-reply-avatar[data-user-id]",
            "data-user-id",
        ),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Elements that became links.
    pub affected: usize,
    /// Elements that matched but could not be converted.
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    selector: SelectorList,
    source: UrlSource,
}

/// The compiled rule set.
#[derive(Debug, Clone)]
pub struct DiscoverySweep {
    rules: Vec<CompiledRule>,
    profile_prefix: String,
}

impl DiscoverySweep {
    pub fn new(rules: &[SweepRule], profile_prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                SelectorList::parse(&rule.selector)
                    .map(|selector| CompiledRule {
                        selector,
                        source: rule.source.clone(),
                    })
                    .map_err(|source| ConfigError::Selector {
                        selector: rule.selector.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            profile_prefix: profile_prefix.into(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule once, in order.
    pub fn run(
        &self,
        parts: &mut PageParts<'_>,
        converter: &ElementConverter,
        display: &mut DisplayCache,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        for rule in &self.rules {
            let matched: Vec<NodeId> = parts
                .document
                .select(&rule.selector)
                .into_iter()
                .filter(|node| !converter.is_converted(parts.document, *node))
                .collect();
            for element in matched {
                let Some(url) = self.url_for(parts, &rule.source, element) else {
                    continue;
                };
                match converter.upgrade(parts, display, element, &url) {
                    Ok(Upgrade::Converted(_)) => report.affected += 1,
                    Ok(Upgrade::AlreadyConverted(_)) => {}
                    Err(err) => {
                        report.failed += 1;
                        warn!(target: "normlink.sweep", element = %element, error = %err, "sweep conversion failed");
                    }
                }
            }
        }
        info!(
            target: "normlink.sweep",
            affected = report.affected,
            failed = report.failed,
            "replacement completed"
        );
        report
    }

    fn url_for(&self, parts: &PageParts<'_>, source: &UrlSource, element: NodeId) -> Option<String> {
        match source {
            UrlSource::Attribute { name } => parts.document.attribute(element, name).map(str::to_owned),
            UrlSource::Profile { attribute } => parts
                .document
                .attribute(element, attribute)
                .map(|id| format!("{}{id}", self.profile_prefix)),
        }
    }
}

impl Default for DiscoverySweep {
    fn default() -> Self {
        let rules = default_rules()
            .into_iter()
            .filter_map(|rule| match SelectorList::parse(&rule.selector) {
                Ok(selector) => Some(CompiledRule {
                    selector,
                    source: rule.source,
                }),
                Err(err) => {
                    warn!(target: "normlink.sweep", selector = %rule.selector, error = %err, "built-in rule skipped");
                    None
                }
            })
            .collect();
        Self {
            rules,
            profile_prefix: DEFAULT_PROFILE_URL_PREFIX.to_owned(),
        }
    }
}
