//! Compound CSS selector matching for the discovery sweep.
//!
//! Supported: `tag`, `*`, `.class`, `#id`, `[attr]`, `[attr=value]` (value
//! bare or quoted), `:not(<compound>)`, and comma-separated groups.
//! Combinators are rejected: the sweep only ever needs to test an element in
//! isolation.

use std::str::FromStr;

use thiserror::Error;

use crate::dom::{Document, ElementData, NodeId};

/// Selector parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector group in `{0}`")]
    Empty(String),
    #[error("unexpected `{found}` at offset {offset} in `{selector}`")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },
    #[error("unexpected end of `{0}`")]
    UnexpectedEnd(String),
    #[error("combinators are not supported in `{0}`")]
    Combinator(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Test {
    Class(String),
    Id(String),
    AttrExists(String),
    AttrEquals(String, String),
    Not(Box<Compound>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    tests: Vec<Test>,
}

impl Compound {
    fn matches(&self, element: &ElementData) -> bool {
        if self.tag.as_deref().is_some_and(|tag| element.tag() != tag) {
            return false;
        }
        self.tests.iter().all(|test| match test {
            Test::Class(class) => element.has_class(class),
            Test::Id(id) => element.attribute("id") == Some(id.as_str()),
            Test::AttrExists(name) => element.attribute(name).is_some(),
            Test::AttrEquals(name, value) => element.attribute(name) == Some(value.as_str()),
            Test::Not(inner) => !inner.matches(element),
        })
    }
}

/// A parsed, comma-separated list of compound selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    groups: Vec<Compound>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut cursor = Cursor::new(input);
        let mut groups = Vec::new();
        loop {
            cursor.skip_ws();
            groups.push(cursor.compound(false)?);
            cursor.skip_ws();
            match cursor.bump() {
                None => break,
                Some(',') => continue,
                Some(found) => return Err(cursor.unexpected(found)),
            }
        }
        Ok(Self { groups })
    }

    /// Number of comma-separated groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `node` is an element matching any group.
    #[must_use]
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.element(node)
            .is_some_and(|element| self.groups.iter().any(|g| g.matches(element)))
    }
}

impl FromStr for SelectorList {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            selector: self.source.to_owned(),
            offset: self.pos.saturating_sub(1),
            found,
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), SelectorError> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(self.unexpected(c)),
            None => Err(SelectorError::UnexpectedEnd(self.source.to_owned())),
        }
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return match self.bump() {
                Some(c) => Err(self.unexpected(c)),
                None => Err(SelectorError::UnexpectedEnd(self.source.to_owned())),
            };
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn attr_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                Ok(value)
            }
            _ => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ']' && !c.is_whitespace()) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
        }
    }

    fn attribute(&mut self) -> Result<Test, SelectorError> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let test = match self.bump() {
            Some(']') => return Ok(Test::AttrExists(name)),
            Some('=') => {
                self.skip_ws();
                Test::AttrEquals(name, self.attr_value()?)
            }
            Some(c) => return Err(self.unexpected(c)),
            None => return Err(SelectorError::UnexpectedEnd(self.source.to_owned())),
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(test)
    }

    fn compound(&mut self, nested: bool) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut universal = false;
        let mut first = true;
        while let Some(c) = self.peek() {
            match c {
                ',' if !nested => break,
                ')' if nested => break,
                c if c.is_whitespace() => {
                    self.skip_ws();
                    match self.peek() {
                        None | Some(',') => break,
                        Some(')') if nested => break,
                        Some(_) => return Err(SelectorError::Combinator(self.source.to_owned())),
                    }
                }
                '*' if first => {
                    self.pos += 1;
                    universal = true;
                }
                c if first && is_ident_char(c) => {
                    compound.tag = Some(self.ident()?.to_ascii_lowercase());
                }
                '.' => {
                    self.pos += 1;
                    compound.tests.push(Test::Class(self.ident()?));
                }
                '#' => {
                    self.pos += 1;
                    compound.tests.push(Test::Id(self.ident()?));
                }
                '[' => {
                    self.pos += 1;
                    compound.tests.push(self.attribute()?);
                }
                ':' => {
                    self.pos += 1;
                    let pseudo = self.ident()?;
                    if !pseudo.eq_ignore_ascii_case("not") {
                        return Err(self.unexpected(':'));
                    }
                    self.expect('(')?;
                    self.skip_ws();
                    let inner = self.compound(true)?;
                    self.skip_ws();
                    self.expect(')')?;
                    compound.tests.push(Test::Not(Box::new(inner)));
                }
                other => {
                    self.pos += 1;
                    return Err(self.unexpected(other));
                }
            }
            first = false;
        }
        if !universal && compound.tag.is_none() && compound.tests.is_empty() {
            return Err(SelectorError::Empty(self.source.to_owned()));
        }
        Ok(compound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc_with(tag: &str, attrs: &[(&str, &str)]) -> (Document, NodeId) {
        let mut doc = Document::new();
        let node = doc.create_element(tag);
        for (name, value) in attrs {
            doc.set_attribute(node, name, value).unwrap();
        }
        doc.append_child(doc.body(), node).unwrap();
        (doc, node)
    }

    #[test]
    fn tag_class_and_attribute() {
        let (doc, a) = doc_with("a", &[("class", "jump-link"), ("data-url", "//x")]);
        let sel = SelectorList::parse("a.jump-link[data-url]").unwrap();
        assert!(sel.matches(&doc, a));
        assert!(!SelectorList::parse("div.jump-link").unwrap().matches(&doc, a));
        assert!(!SelectorList::parse("a[data-user-id]").unwrap().matches(&doc, a));
    }

    #[test]
    fn negated_attribute() {
        let (mut doc, a) = doc_with("a", &[("class", "jump-link"), ("data-url", "//x")]);
        let sel = SelectorList::parse("a.jump-link[data-url]:not([data-done])").unwrap();
        assert!(sel.matches(&doc, a));
        doc.set_attribute(a, "data-done", "").unwrap();
        assert!(!sel.matches(&doc, a));
    }

    #[test]
    fn multiple_classes_must_all_match() {
        let (doc, div) = doc_with("div", &[("class", "bili-rich-text-module at"), ("data-oid", "7")]);
        assert!(
            SelectorList::parse(".bili-rich-text-module.at[data-oid]")
                .unwrap()
                .matches(&doc, div)
        );
        assert!(
            !SelectorList::parse(".bili-rich-text-module.emoji")
                .unwrap()
                .matches(&doc, div)
        );
    }

    #[test]
    fn comma_groups_are_alternatives() {
        let (doc, div) = doc_with("div", &[("class", "sub-user-name"), ("data-user-id", "2")]);
        let sel = SelectorList::parse(
            ".root-reply-avatar[data-user-id] , .sub-user-name[data-user-id]:not([x])",
        )
        .unwrap();
        assert_eq!(sel.len(), 2);
        assert!(sel.matches(&doc, div));
    }

    #[test]
    fn attribute_values_bare_and_quoted() {
        let (doc, div) = doc_with("div", &[("data-kind", "user card")]);
        assert!(
            SelectorList::parse("[data-kind=\"user card\"]")
                .unwrap()
                .matches(&doc, div)
        );
        assert!(
            !SelectorList::parse("[data-kind=user]")
                .unwrap()
                .matches(&doc, div)
        );
    }

    #[test]
    fn id_and_universal() {
        let (doc, div) = doc_with("div", &[("id", "app")]);
        assert!(SelectorList::parse("#app").unwrap().matches(&doc, div));
        assert!(SelectorList::parse("*").unwrap().matches(&doc, div));
        assert!(SelectorList::parse("div#app").unwrap().matches(&doc, div));
    }

    #[test]
    fn text_nodes_never_match() {
        let mut doc = Document::new();
        let text = doc.create_text("x");
        assert!(!SelectorList::parse("*").unwrap().matches(&doc, text));
    }

    #[test]
    fn combinators_are_rejected() {
        assert!(matches!(
            SelectorList::parse("div p"),
            Err(SelectorError::Combinator(_))
        ));
        assert!(matches!(
            SelectorList::parse("div > p"),
            Err(SelectorError::Combinator(_))
        ));
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(SelectorList::parse(""), Err(SelectorError::Empty(_))));
        assert!(matches!(SelectorList::parse("a,"), Err(SelectorError::Empty(_))));
        assert!(SelectorList::parse("[data-url").is_err());
        assert!(SelectorList::parse(":hover").is_err());
        assert!(SelectorList::parse("a..b").is_err());
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in "\\PC{0,40}") {
            let _ = SelectorList::parse(&input);
        }

        #[test]
        fn class_selector_matches_its_own_class(class in "[a-z][a-z0-9-]{0,12}") {
            let (doc, div) = doc_with("div", &[("class", class.as_str())]);
            let sel = SelectorList::parse(&format!(".{class}")).unwrap();
            prop_assert!(sel.matches(&doc, div));
        }
    }
}
