//! Event values passed to handlers.
//!
//! Only the parts of the DOM event model the engine relies on are modelled:
//! a type, the default-action flag, the two propagation-stop flags, and the
//! dispatch phase. Synthetic events (the ones built for a probe) are marked so
//! hosts can tell them apart from user-generated input.

use std::fmt;

use crate::dom::NodeId;

/// Event type names the engine distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// `click`, the only type whose registrations are intercepted.
    Click,
    /// `mousedown`.
    PointerDown,
    /// `keydown`.
    KeyDown,
    /// `DOMContentLoaded`.
    ContentLoaded,
    /// `load`.
    Load,
    /// Anything else, kept verbatim.
    Other(String),
}

impl EventType {
    /// Parse a DOM event type name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "click" => Self::Click,
            "mousedown" => Self::PointerDown,
            "keydown" => Self::KeyDown,
            "DOMContentLoaded" => Self::ContentLoaded,
            "load" => Self::Load,
            other => Self::Other(other.to_owned()),
        }
    }

    /// DOM event type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Click => "click",
            Self::PointerDown => "mousedown",
            Self::KeyDown => "keydown",
            Self::ContentLoaded => "DOMContentLoaded",
            Self::Load => "load",
            Self::Other(name) => name,
        }
    }

    #[must_use]
    pub fn is_click(&self) -> bool {
        matches!(self, Self::Click)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

/// What a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTarget {
    /// The global scope.
    Window,
    /// A node of the document (the document node itself included).
    Node(NodeId),
}

impl ListenerTarget {
    #[must_use]
    pub const fn node(self) -> Option<NodeId> {
        match self {
            Self::Window => None,
            Self::Node(id) => Some(id),
        }
    }
}

impl From<NodeId> for ListenerTarget {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

/// Options accepted by listener registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
}

impl ListenerOptions {
    /// Capture-phase listener.
    #[must_use]
    pub const fn capture() -> Self {
        Self {
            capture: true,
            once: false,
            passive: false,
        }
    }
}

/// The boolean `useCapture` form of the options argument.
impl From<bool> for ListenerOptions {
    fn from(capture: bool) -> Self {
        Self {
            capture,
            ..Self::default()
        }
    }
}

/// Dispatch phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventPhase {
    #[default]
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// A dispatched (or synthetic) event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventType,
    synthetic: bool,
    phase: EventPhase,
    current_target: Option<ListenerTarget>,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
}

impl Event {
    fn with(kind: EventType, synthetic: bool) -> Self {
        Self {
            kind,
            synthetic,
            phase: EventPhase::None,
            current_target: None,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
        }
    }

    /// An event produced by real input.
    #[must_use]
    pub fn trusted(kind: EventType) -> Self {
        Self::with(kind, false)
    }

    /// A minimal event built by the engine, never dispatched through the tree.
    #[must_use]
    pub fn synthetic(kind: EventType) -> Self {
        Self::with(kind, true)
    }

    #[must_use]
    pub fn kind(&self) -> &EventType {
        &self.kind
    }

    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    #[must_use]
    pub const fn phase(&self) -> EventPhase {
        self.phase
    }

    #[must_use]
    pub const fn current_target(&self) -> Option<ListenerTarget> {
        self.current_target
    }

    /// Used by dispatchers while walking the propagation path.
    pub fn set_position(&mut self, phase: EventPhase, current_target: Option<ListenerTarget>) {
        self.phase = phase;
        self.current_target = current_target;
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    #[must_use]
    pub const fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    #[must_use]
    pub const fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    #[must_use]
    pub const fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped
    }
}
