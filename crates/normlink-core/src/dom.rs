//! Arena-based document tree.
//!
//! All nodes live in a flat `Vec` and are referenced by [`NodeId`]. Removing a
//! node only detaches it: the slot stays valid so that anything still holding
//! the id (a deferred queue entry, a listener record) can observe that the
//! node left the live tree instead of dangling.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::handler::Handler;
use crate::selector::{SelectorError, SelectorList};

// ---------------------------------------------------------------------------
// Identity and errors
// ---------------------------------------------------------------------------

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures of tree and attribute operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0} is not attached to a parent")]
    Detached(NodeId),
    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("cannot insert {child} under {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    #[error("attribute `{name}` on {node} is locked")]
    AttributeLocked { node: NodeId, name: String },
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

// ---------------------------------------------------------------------------
// Node payloads
// ---------------------------------------------------------------------------

/// A single `name="value"` pair. Names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Element payload: tag, attributes in insertion order, the inline `onclick`
/// slot, and the set of attribute names frozen against later writes.
#[derive(Debug, Clone)]
pub struct ElementData {
    tag: String,
    attributes: Vec<Attribute>,
    inline_click: Option<Handler>,
    locked: BTreeSet<String>,
}

impl ElementData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            inline_click: None,
            locked: BTreeSet::new(),
        }
    }

    /// Lowercased tag name.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Whitespace-separated tokens of the `class` attribute.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class")
            .unwrap_or_default()
            .split_ascii_whitespace()
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// The live document tree: a document node holding `<html>` with `<head>` and
/// `<body>`, plus any number of detached nodes.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    head: NodeId,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    const ROOT: NodeId = NodeId(0);

    /// Create a document with an empty `<html><head></head><body></body></html>`.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            head: Self::ROOT,
            body: Self::ROOT,
        };
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.link(Self::ROOT, html);
        doc.link(html, head);
        doc.link(html, body);
        doc.head = head;
        doc.body = body;
        doc
    }

    /// The document node itself.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        Self::ROOT
    }

    #[must_use]
    pub const fn head(&self) -> NodeId {
        self.head
    }

    #[must_use]
    pub const fn body(&self) -> NodeId {
        self.body
    }

    /// Number of nodes ever created, attached or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    // Only for freshly created nodes during construction.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Create a detached element. The tag is lowercased.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData::new(tag)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn element_data_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(data)) => Ok(data),
            Some(_) => Err(DomError::NotAnElement(id)),
            None => Err(DomError::UnknownNode(id)),
        }
    }

    /// Element payload, or `None` for text/document/unknown nodes.
    #[must_use]
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id.0).map(|n| &n.data) {
            Some(NodeData::Element(data)) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(ElementData::tag)
    }

    /// Text payload of a text node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0).map(|n| &n.data) {
            Some(NodeData::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Whether `id` is reachable from the document node.
    #[must_use]
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(Self::ROOT, id)
    }

    /// Inclusive ancestry test.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Ancestors from the parent up to the document node.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.parent(current);
        }
        out
    }

    // -----------------------------------------------------------------------
    // Tree mutation
    // -----------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference` (or last when `None`).
    ///
    /// A child that already has a parent is moved, never duplicated.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if matches!(self.node(parent)?.data, NodeData::Text(_))
            || matches!(self.node(child)?.data, NodeData::Document)
            || self.contains(child, parent)
        {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        let mut reference = reference;
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: r });
            }
            if r == child {
                reference = self.next_sibling(child);
            }
        }
        self.detach(child);
        let siblings = &mut self.nodes[parent.0].children;
        let index = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    /// Put `new_child` exactly where `old_child` was among its siblings.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> Result<(), DomError> {
        let next = self.next_sibling(old_child).filter(|n| *n != new_child);
        self.remove_child(parent, old_child)?;
        self.insert_before(parent, new_child, next)
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != child);
        }
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(name))
    }

    #[must_use]
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id)
            .map(ElementData::attributes)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_class(class))
    }

    /// Set (or overwrite in place) an attribute.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        let data = self.element_data_mut(id)?;
        if data.locked.contains(&name) {
            return Err(DomError::AttributeLocked { node: id, name });
        }
        match data.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.to_owned(),
            None => data.attributes.push(Attribute {
                name,
                value: value.to_owned(),
            }),
        }
        Ok(())
    }

    /// Remove an attribute. Returns whether it was present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool, DomError> {
        let name = name.to_ascii_lowercase();
        let data = self.element_data_mut(id)?;
        if data.locked.contains(&name) {
            return Err(DomError::AttributeLocked { node: id, name });
        }
        let before = data.attributes.len();
        data.attributes.retain(|a| a.name != name);
        Ok(data.attributes.len() != before)
    }

    /// Freeze an attribute: later `set_attribute`/`remove_attribute` calls fail.
    pub fn lock_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_data_mut(id)?
            .locked
            .insert(name.to_ascii_lowercase());
        Ok(())
    }

    #[must_use]
    pub fn is_attribute_locked(&self, id: NodeId, name: &str) -> bool {
        self.element(id)
            .is_some_and(|e| e.locked.contains(&name.to_ascii_lowercase()))
    }

    // -----------------------------------------------------------------------
    // Inline handler slot
    // -----------------------------------------------------------------------

    /// The element's `onclick` property.
    #[must_use]
    pub fn inline_click(&self, id: NodeId) -> Option<&Handler> {
        self.element(id).and_then(|e| e.inline_click.as_ref())
    }

    /// Replace the `onclick` property, returning the previous value.
    pub fn set_inline_click(
        &mut self,
        id: NodeId,
        handler: Option<Handler>,
    ) -> Result<Option<Handler>, DomError> {
        let data = self.element_data_mut(id)?;
        Ok(std::mem::replace(&mut data.inline_click, handler))
    }

    // -----------------------------------------------------------------------
    // Traversal and queries
    // -----------------------------------------------------------------------

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.text(id) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Descendants of `id` in tree order, excluding `id`.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// Connected elements matching `selector`, in tree order.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        Ok(self.select(&list))
    }

    /// Connected elements matching a pre-parsed selector list, in tree order.
    #[must_use]
    pub fn select(&self, list: &SelectorList) -> Vec<NodeId> {
        self.descendants(Self::ROOT)
            .into_iter()
            .filter(|node| list.matches(self, *node))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(doc: &Document, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| doc.tag_name(*id).unwrap_or("#text").to_owned())
            .collect()
    }

    #[test]
    fn new_document_has_head_and_body() {
        let doc = Document::new();
        assert_eq!(doc.tag_name(doc.head()), Some("head"));
        assert_eq!(doc.tag_name(doc.body()), Some("body"));
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn created_nodes_start_detached() {
        let mut doc = Document::new();
        let div = doc.create_element("DIV");
        assert_eq!(doc.tag_name(div), Some("div"));
        assert!(!doc.is_connected(div));
        doc.append_child(doc.body(), div).unwrap();
        assert!(doc.is_connected(div));
    }

    #[test]
    fn append_moves_instead_of_copying() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("section");
        let text = doc.create_text("hi");
        doc.append_child(doc.body(), a).unwrap();
        doc.append_child(doc.body(), b).unwrap();
        doc.append_child(a, text).unwrap();
        doc.append_child(b, text).unwrap();
        assert!(doc.children(a).is_empty());
        assert_eq!(doc.children(b), &[text]);
        assert_eq!(doc.parent(text), Some(b));
    }

    #[test]
    fn insert_before_keeps_order() {
        let mut doc = Document::new();
        let body = doc.body();
        let first = doc.create_element("p");
        let last = doc.create_element("ul");
        let middle = doc.create_element("span");
        doc.append_child(body, first).unwrap();
        doc.append_child(body, last).unwrap();
        doc.insert_before(body, middle, Some(last)).unwrap();
        assert_eq!(tags(&doc, doc.children(body)), vec!["p", "span", "ul"]);
    }

    #[test]
    fn insert_before_foreign_reference_fails() {
        let mut doc = Document::new();
        let stray = doc.create_element("div");
        let child = doc.create_element("div");
        let err = doc.insert_before(doc.body(), child, Some(stray)).unwrap_err();
        assert_eq!(
            err,
            DomError::NotAChild {
                parent: doc.body(),
                child: stray
            }
        );
    }

    #[test]
    fn cannot_insert_ancestor_into_descendant() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();
        assert!(matches!(
            doc.append_child(inner, outer),
            Err(DomError::HierarchyRequest { .. })
        ));
    }

    #[test]
    fn replace_child_preserves_position() {
        let mut doc = Document::new();
        let body = doc.body();
        let before = doc.create_element("i");
        let old = doc.create_element("div");
        let after = doc.create_element("b");
        for n in [before, old, after] {
            doc.append_child(body, n).unwrap();
        }
        let new = doc.create_element("a");
        doc.replace_child(body, new, old).unwrap();
        assert_eq!(doc.children(body), &[before, new, after]);
        assert!(!doc.is_connected(old));
    }

    #[test]
    fn attributes_keep_insertion_order_and_overwrite_in_place() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "x").unwrap();
        doc.set_attribute(div, "Data-Id", "1").unwrap();
        doc.set_attribute(div, "class", "y").unwrap();
        let names: Vec<_> = doc.attributes(div).iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["class", "data-id"]);
        assert_eq!(doc.attribute(div, "class"), Some("y"));
        assert_eq!(doc.attribute(div, "DATA-ID"), Some("1"));
    }

    #[test]
    fn locked_attribute_rejects_writes() {
        let mut doc = Document::new();
        let a = doc.create_element("a");
        doc.set_attribute(a, "href", "https://example.com/").unwrap();
        doc.lock_attribute(a, "href").unwrap();
        assert!(doc.is_attribute_locked(a, "HREF"));
        assert!(matches!(
            doc.set_attribute(a, "href", "javascript:void 0"),
            Err(DomError::AttributeLocked { .. })
        ));
        assert!(doc.remove_attribute(a, "href").is_err());
        assert_eq!(doc.attribute(a, "href"), Some("https://example.com/"));
    }

    #[test]
    fn text_nodes_reject_element_operations() {
        let mut doc = Document::new();
        let text = doc.create_text("x");
        assert_eq!(
            doc.set_attribute(text, "id", "1"),
            Err(DomError::NotAnElement(text))
        );
        let child = doc.create_element("b");
        assert!(doc.append_child(text, child).is_err());
    }

    #[test]
    fn class_tokens() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "  up-name  at ").unwrap();
        assert!(doc.has_class(div, "up-name"));
        assert!(doc.has_class(div, "at"));
        assert!(!doc.has_class(div, "up"));
    }

    #[test]
    fn text_content_concatenates_in_order() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let span = doc.create_element("span");
        let t1 = doc.create_text("@");
        let t2 = doc.create_text("someone");
        doc.append_child(div, t1).unwrap();
        doc.append_child(div, span).unwrap();
        doc.append_child(span, t2).unwrap();
        assert_eq!(doc.text_content(div), "@someone");
    }

    #[test]
    fn query_selector_skips_detached_nodes() {
        let mut doc = Document::new();
        let live = doc.create_element("div");
        let stray = doc.create_element("div");
        doc.set_attribute(live, "class", "user-name").unwrap();
        doc.set_attribute(stray, "class", "user-name").unwrap();
        doc.append_child(doc.body(), live).unwrap();
        assert_eq!(doc.query_selector_all(".user-name").unwrap(), vec![live]);
    }
}
