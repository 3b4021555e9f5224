#![forbid(unsafe_code)]

//! Diagnostic surface for entries the queue gave up on.
//!
//! The report is plain JSON published on a global debug namespace so it can
//! be inspected from a console without any tooling.

use normlink_core::Document;
use serde::Serialize;

use crate::queue::PendingEntry;

/// One unresolved entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedEntry {
    /// Position in the exhausted list; pass it to the engine's manual re-probe.
    pub index: usize,
    pub element: usize,
    pub tag: Option<String>,
    pub classes: Vec<String>,
    pub connected: bool,
    pub attempts: u32,
    pub handler_id: u64,
    pub handler_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub classifier_version: String,
    /// Entries still being retried.
    pub pending: usize,
    pub unresolved: Vec<UnresolvedEntry>,
}

impl DiagnosticReport {
    pub fn build<'a>(
        document: &Document,
        classifier_version: &str,
        pending: usize,
        exhausted: impl IntoIterator<Item = &'a PendingEntry>,
        excerpt_chars: usize,
    ) -> Self {
        let unresolved = exhausted
            .into_iter()
            .enumerate()
            .map(|(index, entry)| UnresolvedEntry {
                index,
                element: entry.element.index(),
                tag: document.tag_name(entry.element).map(str::to_owned),
                classes: document
                    .element(entry.element)
                    .map(|e| e.classes().map(str::to_owned).collect())
                    .unwrap_or_default(),
                connected: document.is_connected(entry.element),
                attempts: entry.attempts,
                handler_id: entry.handler.id().get(),
                handler_source: excerpt(entry.handler.source_text(), excerpt_chars),
            })
            .collect();
        Self {
            classifier_version: classifier_version.to_owned(),
            pending,
            unresolved,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn excerpt(source: &str, max_chars: usize) -> String {
    match source.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &source[..cut]),
        None => source.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use normlink_core::Handler;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_describes_each_entry() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "up-name big").unwrap();
        let body = doc.body();
        doc.append_child(body, div).unwrap();
        let orphan = doc.create_element("span");

        let handler = Handler::function("function(){return 1234567890}", |_, _| Ok(()));
        let entries = vec![
            PendingEntry {
                element: div,
                handler: handler.clone(),
                attempts: 100,
            },
            PendingEntry {
                element: orphan,
                handler: handler.clone(),
                attempts: 3,
            },
        ];

        let report = DiagnosticReport::build(&doc, "v1", 2, &entries, 12);
        assert_eq!(report.pending, 2);
        assert_eq!(
            report.unresolved[0],
            UnresolvedEntry {
                index: 0,
                element: div.index(),
                tag: Some("div".into()),
                classes: vec!["up-name".into(), "big".into()],
                connected: true,
                attempts: 100,
                handler_id: handler.id().get(),
                handler_source: "function(){r…".into(),
            }
        );
        assert!(!report.unresolved[1].connected);
        assert_eq!(report.unresolved[1].index, 1);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["classifier_version"], "v1");
        assert_eq!(json["unresolved"][1]["tag"], "span");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé…");
        assert_eq!(excerpt("short", 10), "short");
    }
}
