#![forbid(unsafe_code)]

//! Element → hyperlink conversion.
//!
//! Conversion has two halves. [`ElementConverter::to_anchor`] swaps an
//! element for an `<a>` that carries the same attributes and children at the
//! same sibling position, plus the layout attribute from [`DisplayCache`].
//! [`ElementConverter::install_url`] then turns that anchor into a real link
//! and neutralizes whatever click behavior the application attached.

use normlink_backend::{HandlerRegistry, PageParts, StyleOracle};
use normlink_core::{
    Document, DomError, EventType, Handler, ListenerOptions, ListenerTarget, NodeId,
};
use tracing::{debug, trace};

use crate::display::DisplayCache;
use crate::error::ConvertError;

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-normlink-replaced";

/// Result of [`ElementConverter::upgrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upgrade {
    /// The element already carried the marker; nothing changed.
    AlreadyConverted(NodeId),
    /// The element (or its replacement anchor) now links to the URL.
    Converted(NodeId),
}

impl Upgrade {
    #[must_use]
    pub const fn node(self) -> NodeId {
        match self {
            Self::AlreadyConverted(id) | Self::Converted(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementConverter {
    marker: String,
    link_target: String,
    lock_href: bool,
}

impl Default for ElementConverter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_ATTRIBUTE, "_blank", true)
    }
}

impl ElementConverter {
    pub fn new(marker: impl Into<String>, link_target: impl Into<String>, lock_href: bool) -> Self {
        Self {
            marker: marker.into(),
            link_target: link_target.into(),
            lock_href,
        }
    }

    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    #[must_use]
    pub fn is_converted(&self, document: &Document, element: NodeId) -> bool {
        document.has_attribute(element, &self.marker)
    }

    /// Replace `element` with an equivalent `<a>` and return the anchor.
    ///
    /// An element that already is an `<a>` is returned unchanged.
    pub fn to_anchor(
        &self,
        document: &mut Document,
        styles: &mut dyn StyleOracle,
        display: &mut DisplayCache,
        element: NodeId,
    ) -> Result<NodeId, ConvertError> {
        let tag = document
            .tag_name(element)
            .ok_or(DomError::NotAnElement(element))?
            .to_owned();
        if tag == "a" {
            return Ok(element);
        }
        if !document.is_connected(element) {
            return Err(ConvertError::Detached(element));
        }
        let parent = document
            .parent(element)
            .ok_or(ConvertError::Orphan(element))?;

        let anchor = document.create_element("a");
        for attr in document.attributes(element).to_vec() {
            document.set_attribute(anchor, &attr.name, &attr.value)?;
        }
        for child in document.children(element).to_vec() {
            document.append_child(anchor, child)?;
        }
        let layout = display.layout_attribute(document, styles, &tag)?;
        document.set_attribute(anchor, &layout, "")?;
        document.replace_child(parent, anchor, element)?;

        trace!(target: "normlink.convert", from = %element, to = %anchor, tag = %tag, "element replaced");
        Ok(anchor)
    }

    /// Make `anchor` a working link to `url`.
    pub fn install_url(
        &self,
        document: &mut Document,
        registry: &mut dyn HandlerRegistry,
        anchor: NodeId,
        url: &str,
    ) -> Result<(), ConvertError> {
        document.set_attribute(anchor, "href", url)?;
        document.set_attribute(anchor, &self.marker, "")?;
        document.set_attribute(anchor, "target", &self.link_target)?;
        document.set_inline_click(anchor, None)?;
        registry.add_event_listener(
            ListenerTarget::Node(anchor),
            EventType::Click,
            Handler::native("stopImmediatePropagation", |_, event| {
                event.stop_immediate_propagation();
                Ok(())
            }),
            ListenerOptions::capture(),
        );
        if self.lock_href {
            document.lock_attribute(anchor, "href")?;
        }
        debug!(target: "normlink.convert", anchor = %anchor, url = %url, "URL installed");
        Ok(())
    }

    /// Convert `element` and install `url`, unless it is already converted.
    pub fn upgrade(
        &self,
        parts: &mut PageParts<'_>,
        display: &mut DisplayCache,
        element: NodeId,
        url: &str,
    ) -> Result<Upgrade, ConvertError> {
        if self.is_converted(parts.document, element) {
            return Ok(Upgrade::AlreadyConverted(element));
        }
        let anchor = self.to_anchor(parts.document, parts.styles, display, element)?;
        self.install_url(parts.document, parts.registry, anchor, url)?;
        Ok(Upgrade::Converted(anchor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use normlink_backend::{DebugNamespace, Navigator, WindowHandle};
    use normlink_core::{CallScope, Event, HandlerId};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Registry(Vec<(ListenerTarget, EventType, Handler, ListenerOptions)>);

    impl HandlerRegistry for Registry {
        fn add_event_listener(
            &mut self,
            target: ListenerTarget,
            event: EventType,
            handler: Handler,
            options: ListenerOptions,
        ) {
            self.0.push((target, event, handler, options));
        }

        fn remove_event_listener(
            &mut self,
            _target: ListenerTarget,
            _event: &EventType,
            _handler: HandlerId,
            _capture: bool,
        ) -> bool {
            false
        }
    }

    struct Styles;

    impl StyleOracle for Styles {
        fn default_display(&mut self, tag: &str) -> String {
            let display = if tag == "span" { "inline" } else { "block" };
            display.to_owned()
        }
    }

    struct NoNav;

    impl Navigator for NoNav {
        fn open(&mut self, _: &str, _: Option<&str>, _: Option<&str>) -> Option<WindowHandle> {
            None
        }
    }

    struct NoDebug;

    impl DebugNamespace for NoDebug {
        fn publish(&mut self, _: &str, _: &str) {}
    }

    struct Fixture {
        doc: Document,
        registry: Registry,
        styles: Styles,
        nav: NoNav,
        debug: NoDebug,
        display: DisplayCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                doc: Document::new(),
                registry: Registry::default(),
                styles: Styles,
                nav: NoNav,
                debug: NoDebug,
                display: DisplayCache::default(),
            }
        }

        fn upgrade(&mut self, element: NodeId, url: &str) -> Result<Upgrade, ConvertError> {
            let mut parts = PageParts {
                document: &mut self.doc,
                registry: &mut self.registry,
                navigator: &mut self.nav,
                styles: &mut self.styles,
                debug: &mut self.debug,
            };
            ElementConverter::default().upgrade(&mut parts, &mut self.display, element, url)
        }
    }

    /// `<body><p/><div class=card data-x=1>hi<span/></div><p/></body>`
    fn build(doc: &mut Document) -> (NodeId, NodeId, NodeId, NodeId) {
        let body = doc.body();
        let before = doc.create_element("p");
        let div = doc.create_element("div");
        let after = doc.create_element("p");
        doc.set_attribute(div, "class", "card").unwrap();
        doc.set_attribute(div, "data-x", "1").unwrap();
        let text = doc.create_text("hi");
        let span = doc.create_element("span");
        doc.append_child(div, text).unwrap();
        doc.append_child(div, span).unwrap();
        for n in [before, div, after] {
            doc.append_child(body, n).unwrap();
        }
        (before, div, after, span)
    }

    #[test]
    fn converts_in_place_preserving_attributes_and_children() {
        let mut fx = Fixture::new();
        let (before, div, after, span) = build(&mut fx.doc);
        fx.doc
            .set_inline_click(div, Some(Handler::native("old", |_, _| Ok(()))))
            .unwrap();

        let anchor = fx.upgrade(div, "https://space.bilibili.com/1").unwrap().node();
        let doc = &fx.doc;

        assert_ne!(anchor, div);
        assert_eq!(doc.tag_name(anchor), Some("a"));
        assert!(!doc.is_connected(div));
        assert!(doc.children(div).is_empty());
        assert_eq!(doc.children(doc.body()), &[before, anchor, after]);
        assert_eq!(doc.text_content(anchor), "hi");
        assert_eq!(doc.parent(span), Some(anchor));

        let names: Vec<_> = doc.attributes(anchor).iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "class",
                "data-x",
                "data-normlink-display-block",
                "href",
                "data-normlink-replaced",
                "target",
            ]
        );
        assert_eq!(doc.attribute(anchor, "href"), Some("https://space.bilibili.com/1"));
        assert_eq!(doc.attribute(anchor, "target"), Some("_blank"));
        assert!(doc.inline_click(anchor).is_none());
        assert!(doc.is_attribute_locked(anchor, "href"));
    }

    #[test]
    fn stop_listener_is_capturing_and_stops_immediately() {
        let mut fx = Fixture::new();
        let (_, div, _, _) = build(&mut fx.doc);
        let anchor = fx.upgrade(div, "https://a.example/").unwrap().node();

        assert_eq!(fx.registry.0.len(), 1);
        let (target, kind, handler, options) = &fx.registry.0[0];
        assert_eq!(*target, ListenerTarget::Node(anchor));
        assert!(kind.is_click());
        assert!(options.capture);

        let mut nav = NoNav;
        let mut event = Event::trusted(EventType::Click);
        let mut scope = CallScope::new(*target, &fx.doc, &mut nav);
        handler.call(&mut scope, &mut event).unwrap();
        assert!(event.immediate_propagation_stopped());
        assert!(!event.default_prevented());
    }

    #[test]
    fn second_upgrade_is_a_no_op() {
        let mut fx = Fixture::new();
        let (_, div, _, _) = build(&mut fx.doc);
        let anchor = fx.upgrade(div, "https://a.example/1").unwrap().node();
        let snapshot = fx.doc.attributes(anchor).to_vec();

        assert_eq!(
            fx.upgrade(anchor, "https://a.example/2").unwrap(),
            Upgrade::AlreadyConverted(anchor)
        );
        assert_eq!(fx.doc.attributes(anchor), snapshot.as_slice());
        assert_eq!(fx.registry.0.len(), 1);
    }

    #[test]
    fn existing_anchor_is_not_recreated() {
        let mut fx = Fixture::new();
        let a = fx.doc.create_element("a");
        let body = fx.doc.body();
        fx.doc.append_child(body, a).unwrap();
        let result = fx.upgrade(a, "https://a.example/").unwrap();
        assert_eq!(result, Upgrade::Converted(a));
        assert_eq!(fx.doc.attribute(a, "href"), Some("https://a.example/"));
        assert!(!fx.doc.attributes(a).iter().any(|x| x.name.starts_with("data-normlink-display-")));
    }

    #[test]
    fn detached_element_is_rejected() {
        let mut fx = Fixture::new();
        let div = fx.doc.create_element("div");
        assert_eq!(fx.upgrade(div, "https://a.example/"), Err(ConvertError::Detached(div)));
    }

    #[test]
    fn locked_href_rejects_host_writes() {
        let mut fx = Fixture::new();
        let (_, div, _, _) = build(&mut fx.doc);
        let anchor = fx.upgrade(div, "https://a.example/").unwrap().node();
        assert!(matches!(
            fx.doc.set_attribute(anchor, "href", "javascript:void(0)"),
            Err(DomError::AttributeLocked { .. })
        ));
        assert_eq!(fx.doc.attribute(anchor, "href"), Some("https://a.example/"));
    }

    #[test]
    fn unlocked_href_when_disabled() {
        let mut fx = Fixture::new();
        let (_, div, _, _) = build(&mut fx.doc);
        let converter = ElementConverter::new(DEFAULT_MARKER_ATTRIBUTE, "_blank", false);
        let anchor = converter
            .to_anchor(&mut fx.doc, &mut fx.styles, &mut fx.display, div)
            .unwrap();
        converter
            .install_url(&mut fx.doc, &mut fx.registry, anchor, "https://a.example/")
            .unwrap();
        assert!(!fx.doc.is_attribute_locked(anchor, "href"));
        fx.doc.set_attribute(anchor, "href", "https://b.example/").unwrap();
    }
}
