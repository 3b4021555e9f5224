#![forbid(unsafe_code)]

//! User-agent default styles and a minimal computed-`display` resolver.
//!
//! Only `display` is modeled. Its value for an element is, in increasing
//! priority: the user-agent default for the tag, the last matching
//! `:where([attr]){display:value}` rule found in a `<style>` element, and a
//! `display` declaration in the element's `style` attribute.

use std::sync::OnceLock;

use normlink_backend::StyleOracle;
use normlink_core::{Document, NodeId};
use regex_lite::Regex;

/// Default `display` of `tag` in the user-agent stylesheet.
#[must_use]
pub fn ua_default_display(tag: &str) -> &'static str {
    match tag.to_ascii_lowercase().as_str() {
        "div" | "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" | "dl" | "dt"
        | "dd" | "blockquote" | "pre" | "figure" | "figcaption" | "section" | "article"
        | "header" | "footer" | "nav" | "main" | "aside" | "hgroup" | "address" | "details"
        | "summary" | "dialog" | "form" | "fieldset" | "legend" | "hr" | "center" | "html"
        | "body" => "block",
        "li" => "list-item",
        "table" => "table",
        "thead" => "table-header-group",
        "tbody" => "table-row-group",
        "tfoot" => "table-footer-group",
        "tr" => "table-row",
        "td" | "th" => "table-cell",
        "caption" => "table-caption",
        "button" | "img" | "input" | "select" | "textarea" | "video" | "canvas" => {
            "inline-block"
        }
        "head" | "style" | "script" | "template" | "title" | "meta" | "link" | "noscript" => {
            "none"
        }
        _ => "inline",
    }
}

/// [`StyleOracle`] backed by [`ua_default_display`].
///
/// Counts queries so callers can check that lookups are memoized upstream.
#[derive(Debug, Default, Clone)]
pub struct UserAgentStyles {
    queries: usize,
}

impl UserAgentStyles {
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries
    }
}

impl StyleOracle for UserAgentStyles {
    fn default_display(&mut self, tag: &str) -> String {
        self.queries += 1;
        ua_default_display(tag).to_owned()
    }
}

fn where_rule() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r":where\(\[([A-Za-z_:][-A-Za-z0-9_:.]*)\]\)\s*\{\s*display\s*:\s*([-a-z]+)\s*;?\s*\}",
        )
        .expect("where-rule regex must compile")
    })
}

fn inline_display_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|;)\s*display\s*:\s*([-a-z]+)").expect("display regex must compile")
    })
}

/// `(attribute, display)` pairs from every `<style>` in the document, in
/// document order.
#[must_use]
pub fn attribute_rules(document: &Document) -> Vec<(String, String)> {
    let rule = where_rule();
    document
        .descendants(document.root())
        .into_iter()
        .filter(|node| document.tag_name(*node) == Some("style"))
        .flat_map(|style| {
            let text = document.text_content(style);
            rule.captures_iter(&text)
                .map(|caps| (caps[1].to_owned(), caps[2].to_owned()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// The computed `display` of `element`; `"none"` for non-elements.
#[must_use]
pub fn computed_display(document: &Document, element: NodeId) -> String {
    let Some(tag) = document.tag_name(element) else {
        return "none".to_owned();
    };
    if let Some(inline) = document
        .attribute(element, "style")
        .and_then(|style| inline_display_re().captures(style))
    {
        return inline[1].to_owned();
    }
    attribute_rules(document)
        .into_iter()
        .rev()
        .find(|(attribute, _)| document.has_attribute(element, attribute))
        .map_or_else(|| ua_default_display(tag).to_owned(), |(_, display)| display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn style(doc: &mut Document, css: &str) {
        let style = doc.create_element("style");
        let text = doc.create_text(css);
        doc.append_child(style, text).unwrap();
        let head = doc.head();
        doc.append_child(head, style).unwrap();
    }

    fn element(doc: &mut Document, tag: &str) -> NodeId {
        let el = doc.create_element(tag);
        let body = doc.body();
        doc.append_child(body, el).unwrap();
        el
    }

    #[test]
    fn ua_table() {
        assert_eq!(ua_default_display("DIV"), "block");
        assert_eq!(ua_default_display("li"), "list-item");
        assert_eq!(ua_default_display("span"), "inline");
        assert_eq!(ua_default_display("a"), "inline");
        assert_eq!(ua_default_display("img"), "inline-block");
        assert_eq!(ua_default_display("td"), "table-cell");
        assert_eq!(ua_default_display("x-custom"), "inline");
    }

    #[test]
    fn oracle_counts_queries() {
        let mut styles = UserAgentStyles::default();
        assert_eq!(styles.default_display("p"), "block");
        assert_eq!(styles.default_display("em"), "inline");
        assert_eq!(styles.queries(), 2);
    }

    #[test]
    fn injected_rule_overrides_ua_default() {
        let mut doc = Document::new();
        let a = element(&mut doc, "a");
        assert_eq!(computed_display(&doc, a), "inline");

        style(&mut doc, ":where([data-d-block]){display:block}");
        assert_eq!(computed_display(&doc, a), "inline");
        doc.set_attribute(a, "data-d-block", "").unwrap();
        assert_eq!(computed_display(&doc, a), "block");

        doc.set_attribute(a, "style", "color: red; display: flex").unwrap();
        assert_eq!(computed_display(&doc, a), "flex");
    }

    #[test]
    fn later_rules_win() {
        let mut doc = Document::new();
        let a = element(&mut doc, "a");
        doc.set_attribute(a, "data-x", "").unwrap();
        doc.set_attribute(a, "data-y", "").unwrap();
        style(&mut doc, ":where([data-x]){display:block}");
        style(&mut doc, ":where([data-y]) { display: list-item; }");
        assert_eq!(
            attribute_rules(&doc),
            vec![
                ("data-x".to_owned(), "block".to_owned()),
                ("data-y".to_owned(), "list-item".to_owned()),
            ]
        );
        assert_eq!(computed_display(&doc, a), "list-item");
    }

    #[test]
    fn text_nodes_have_no_box() {
        let mut doc = Document::new();
        let text = doc.create_text("hi");
        assert_eq!(computed_display(&doc, text), "none");
    }
}
