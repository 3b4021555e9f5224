#![forbid(unsafe_code)]

//! `normlink-web` provides a deterministic in-memory page for normlink.
//!
//! Design goals:
//! - **Host-driven**: the embedding test or tool pushes clicks, lifecycle
//!   triggers, and time; nothing happens on its own.
//! - **Deterministic time**: the host advances a monotonic clock explicitly.
//! - **Browser-shaped**: listeners dispatch through capture, target, and
//!   bubble phases, anchors navigate by default, and layout comes from a
//!   user-agent style table plus any injected rules.
//!
//! This crate intentionally does not bind to `wasm-bindgen`. A browser
//! binding implements the same `normlink-backend` traits; this page exists
//! so the engine can be exercised end to end without one.

pub mod dispatch;
pub mod session;
pub mod style;

use core::time::Duration;
use std::collections::BTreeMap;

use normlink_backend::{DebugNamespace, HandlerRegistry, Page, PageClock, PageParts};
use normlink_core::{
    Document, EventType, Handler, HandlerId, ListenerOptions, ListenerTarget, Navigator, NodeId,
    WindowHandle,
};

pub use dispatch::{DispatchOutcome, dispatch_click};
pub use session::HostedPage;
pub use style::{UserAgentStyles, computed_display, ua_default_display};

/// Web page error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebPageError {
    /// Events are only dispatched to elements.
    NotAnElement(NodeId),
}

impl core::fmt::Display for WebPageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotAnElement(node) => write!(f, "node {node} is not an element"),
        }
    }
}

impl std::error::Error for WebPageError {}

/// Deterministic monotonic clock controlled by the host.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Duration,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    /// Set current monotonic time.
    pub fn set(&mut self, now: Duration) {
        self.now = now;
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }
}

impl PageClock for DeterministicClock {
    fn now_mono(&self) -> Duration {
        self.now
    }
}

// ---------------------------------------------------------------------------
// Listener registry
// ---------------------------------------------------------------------------

/// One native listener registration.
#[derive(Debug, Clone)]
pub struct ListenerRecord {
    pub target: ListenerTarget,
    pub event: EventType,
    pub handler: Handler,
    pub options: ListenerOptions,
}

/// The page's native listener table, in registration order.
///
/// Registering the same `(target, type, handler, capture)` twice is a no-op,
/// as in the DOM.
#[derive(Debug, Default, Clone)]
pub struct WebRegistry {
    listeners: Vec<ListenerRecord>,
}

impl WebRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListenerRecord> {
        self.listeners.iter()
    }

    /// Listeners for `target` and `event` in the given phase, in order.
    #[must_use]
    pub fn matching(
        &self,
        target: ListenerTarget,
        event: &EventType,
        capture: bool,
    ) -> Vec<ListenerRecord> {
        self.listeners
            .iter()
            .filter(|r| r.target == target && r.event == *event && r.options.capture == capture)
            .cloned()
            .collect()
    }

    /// Number of listeners of any phase for `target` and `event`.
    #[must_use]
    pub fn count(&self, target: ListenerTarget, event: &EventType) -> usize {
        self.listeners
            .iter()
            .filter(|r| r.target == target && r.event == *event)
            .count()
    }

    fn position(
        &self,
        target: ListenerTarget,
        event: &EventType,
        handler: HandlerId,
        capture: bool,
    ) -> Option<usize> {
        self.listeners.iter().position(|r| {
            r.target == target
                && r.event == *event
                && r.handler.id() == handler
                && r.options.capture == capture
        })
    }
}

impl HandlerRegistry for WebRegistry {
    fn add_event_listener(
        &mut self,
        target: ListenerTarget,
        event: EventType,
        handler: Handler,
        options: ListenerOptions,
    ) {
        if self
            .position(target, &event, handler.id(), options.capture)
            .is_some()
        {
            return;
        }
        self.listeners.push(ListenerRecord {
            target,
            event,
            handler,
            options,
        });
    }

    fn remove_event_listener(
        &mut self,
        target: ListenerTarget,
        event: &EventType,
        handler: HandlerId,
        capture: bool,
    ) -> bool {
        match self.position(target, event, handler, capture) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Navigation and globals
// ---------------------------------------------------------------------------

/// A window the page was asked to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedWindow {
    pub url: String,
    pub target: Option<String>,
    pub features: Option<String>,
}

/// The real navigation primitive: records every call and hands out handles.
#[derive(Debug, Default, Clone)]
pub struct RecordingNavigator {
    opened: Vec<OpenedWindow>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn opened(&self) -> &[OpenedWindow] {
        &self.opened
    }

    /// URLs opened so far, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        self.opened.iter().map(|w| w.url.as_str()).collect()
    }
}

impl Navigator for RecordingNavigator {
    fn open(
        &mut self,
        url: &str,
        target: Option<&str>,
        features: Option<&str>,
    ) -> Option<WindowHandle> {
        self.opened.push(OpenedWindow {
            url: url.to_owned(),
            target: target.map(str::to_owned),
            features: features.map(str::to_owned),
        });
        Some(WindowHandle(self.opened.len() as u64))
    }
}

/// Global properties published for console inspection.
#[derive(Debug, Default, Clone)]
pub struct DebugGlobals {
    values: BTreeMap<String, String>,
}

impl DebugGlobals {
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<&str> {
        self.values.get(namespace).map(String::as_str)
    }
}

impl DebugNamespace for DebugGlobals {
    fn publish(&mut self, namespace: &str, payload: &str) {
        self.values.insert(namespace.to_owned(), payload.to_owned());
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// An in-memory page: document, native listeners, navigation, styles, clock.
#[derive(Debug, Default, Clone)]
pub struct WebPage {
    clock: DeterministicClock,
    document: Document,
    registry: WebRegistry,
    navigator: RecordingNavigator,
    styles: UserAgentStyles,
    globals: DebugGlobals,
}

impl WebPage {
    /// Create an empty page at time `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing document.
    #[must_use]
    pub fn with_document(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    #[must_use]
    pub fn registry(&self) -> &WebRegistry {
        &self.registry
    }

    /// The native registry, bypassing any interception.
    pub fn registry_mut(&mut self) -> &mut WebRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn navigator(&self) -> &RecordingNavigator {
        &self.navigator
    }

    #[must_use]
    pub fn styles(&self) -> &UserAgentStyles {
        &self.styles
    }

    #[must_use]
    pub fn globals(&self) -> &DebugGlobals {
        &self.globals
    }

    #[must_use]
    pub fn clock(&self) -> &DeterministicClock {
        &self.clock
    }

    /// Mutably access the clock.
    pub fn clock_mut(&mut self) -> &mut DeterministicClock {
        &mut self.clock
    }

    /// Computed `display` of `element`.
    #[must_use]
    pub fn computed_display(&self, element: NodeId) -> String {
        computed_display(&self.document, element)
    }

    /// Dispatch a trusted click on `element`.
    pub fn click(&mut self, element: NodeId) -> Result<DispatchOutcome, WebPageError> {
        dispatch_click(
            &self.document,
            &mut self.registry,
            &mut self.navigator,
            element,
        )
    }
}

impl PageClock for WebPage {
    fn now_mono(&self) -> Duration {
        self.clock.now_mono()
    }
}

impl Page for WebPage {
    fn document(&self) -> &Document {
        &self.document
    }

    fn parts(&mut self) -> PageParts<'_> {
        PageParts {
            document: &mut self.document,
            registry: &mut self.registry,
            navigator: &mut self.navigator,
            styles: &mut self.styles,
            debug: &mut self.globals,
        }
    }
}
