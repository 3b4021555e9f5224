#![forbid(unsafe_code)]
#![doc = "Backend traits for normlink: the capabilities a page must lend the engine."]
#![doc = ""]
#![doc = "This crate defines the boundary between the normlink runtime and the"]
#![doc = "environment that hosts the document (a real browser binding, or the"]
#![doc = "deterministic in-memory page in `normlink-web`)."]

use core::time::Duration;

use normlink_core::{Document, EventType, Handler, HandlerId, ListenerOptions, ListenerTarget};

pub use normlink_core::{Navigator, WindowHandle};

/// Monotonic clock abstraction.
///
/// The runtime never reads wall time directly; drain cadence flows through
/// this trait so hosts can drive it deterministically.
pub trait PageClock {
    /// Elapsed time since an unspecified epoch, monotonically increasing.
    fn now_mono(&self) -> Duration;
}

/// Listener registration primitive (`addEventListener` / `removeEventListener`).
///
/// This is the *native* registry. The engine wraps it to intercept click
/// registrations and calls it directly when it installs its own listeners.
pub trait HandlerRegistry {
    fn add_event_listener(
        &mut self,
        target: ListenerTarget,
        event: EventType,
        handler: Handler,
        options: ListenerOptions,
    );

    /// Returns `true` when a matching registration was removed.
    fn remove_event_listener(
        &mut self,
        target: ListenerTarget,
        event: &EventType,
        handler: HandlerId,
        capture: bool,
    ) -> bool;
}

/// Answers "what `display` does this tag get from the user agent?".
///
/// Browsers answer this by rendering a throwaway element; hosts may cache or
/// hard-code. Tags arrive lowercased.
pub trait StyleOracle {
    fn default_display(&mut self, tag: &str) -> String;
}

/// A globally reachable debug slot (a property on the global object).
pub trait DebugNamespace {
    /// Replace the value published under `namespace` with a JSON payload.
    fn publish(&mut self, namespace: &str, payload: &str);
}

/// Disjoint mutable borrows of a page's capabilities.
///
/// The engine needs the document and the navigator at the same time (a probe
/// reads the former while the handler drives the latter), so a page hands
/// them out together instead of through separate `&mut self` accessors.
pub struct PageParts<'a> {
    pub document: &'a mut Document,
    pub registry: &'a mut dyn HandlerRegistry,
    pub navigator: &'a mut dyn Navigator,
    pub styles: &'a mut dyn StyleOracle,
    pub debug: &'a mut dyn DebugNamespace,
}

/// Unified page trait combining the capabilities above.
pub trait Page: PageClock {
    fn document(&self) -> &Document;

    fn parts(&mut self) -> PageParts<'_>;
}
