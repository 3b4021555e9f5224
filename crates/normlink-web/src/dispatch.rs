#![forbid(unsafe_code)]

//! Click dispatch through the document tree.
//!
//! The propagation path is the window, the document node, and every
//! ancestor down to the target. Capture listeners run root-first, then the
//! target's own listeners (capture before bubble), then bubble listeners
//! target-first. A node's inline click handler runs ahead of its bubble
//! listeners. Handler failures are logged and dispatch continues.
//!
//! If no handler prevented the default, a click inside an `<a href>` opens
//! the link. Every handler reaches the navigator through the forwarding
//! [`CapturingNavigator`], the same façade the engine probes through.

use normlink_backend::HandlerRegistry;
use normlink_core::{
    CallScope, Document, Event, EventPhase, EventType, Handler, HandlerError, ListenerTarget,
    Navigator, NodeId, WindowHandle,
};
use normlink_runtime::CapturingNavigator;
use tracing::{debug, warn};

use crate::{WebPageError, WebRegistry};

/// What one click did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers invoked, inline ones included.
    pub invoked: usize,
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    /// Handle of the window opened by the anchor default action.
    pub followed: Option<WindowHandle>,
    pub errors: Vec<HandlerError>,
}

struct Dispatcher<'a> {
    document: &'a Document,
    registry: &'a mut WebRegistry,
    navigator: &'a mut dyn Navigator,
    event: Event,
    outcome: DispatchOutcome,
}

impl Dispatcher<'_> {
    fn call(&mut self, this: ListenerTarget, handler: &Handler) {
        self.outcome.invoked += 1;
        let mut facade = CapturingNavigator::forwarding(self.navigator);
        let mut scope = CallScope::new(this, self.document, &mut facade);
        if let Err(err) = handler.call(&mut scope, &mut self.event) {
            warn!(target: "normlink.web", handler = handler.id().get(), error = %err, "listener failed");
            self.outcome.errors.push(err);
        }
    }

    /// Run the registered listeners of one phase on `target`.
    ///
    /// Returns `false` once immediate propagation has been stopped.
    fn listeners(&mut self, target: ListenerTarget, capture: bool) -> bool {
        for record in self.registry.matching(target, &EventType::Click, capture) {
            if record.options.once {
                self.registry.remove_event_listener(
                    target,
                    &EventType::Click,
                    record.handler.id(),
                    capture,
                );
            }
            self.call(target, &record.handler);
            if self.event.immediate_propagation_stopped() {
                return false;
            }
        }
        true
    }

    fn inline(&mut self, node: NodeId) -> bool {
        if let Some(handler) = self.document.inline_click(node).cloned() {
            self.call(ListenerTarget::Node(node), &handler);
        }
        !self.event.immediate_propagation_stopped()
    }

    fn visit(&mut self, target: ListenerTarget, phase: EventPhase) {
        self.event.set_position(phase, Some(target));
        let node = target.node();
        match phase {
            EventPhase::Capturing => {
                self.listeners(target, true);
            }
            EventPhase::AtTarget => {
                if self.listeners(target, true) && node.is_none_or(|n| self.inline(n)) {
                    self.listeners(target, false);
                }
            }
            EventPhase::Bubbling => {
                if node.is_none_or(|n| self.inline(n)) {
                    self.listeners(target, false);
                }
            }
            EventPhase::None => {}
        }
    }
}

/// Dispatch a trusted click on `element`.
pub fn dispatch_click(
    document: &Document,
    registry: &mut WebRegistry,
    navigator: &mut dyn Navigator,
    element: NodeId,
) -> Result<DispatchOutcome, WebPageError> {
    if !document.is_element(element) {
        return Err(WebPageError::NotAnElement(element));
    }

    // Outermost first.
    let mut path: Vec<ListenerTarget> = vec![ListenerTarget::Window];
    path.extend(
        document
            .ancestors(element)
            .into_iter()
            .rev()
            .map(ListenerTarget::Node),
    );

    let mut dispatcher = Dispatcher {
        document,
        registry,
        navigator,
        event: Event::trusted(EventType::Click),
        outcome: DispatchOutcome::default(),
    };

    'propagate: {
        for &target in &path {
            dispatcher.visit(target, EventPhase::Capturing);
            if dispatcher.event.propagation_stopped() {
                break 'propagate;
            }
        }
        dispatcher.visit(ListenerTarget::Node(element), EventPhase::AtTarget);
        if dispatcher.event.propagation_stopped() {
            break 'propagate;
        }
        for &target in path.iter().rev() {
            dispatcher.visit(target, EventPhase::Bubbling);
            if dispatcher.event.propagation_stopped() {
                break 'propagate;
            }
        }
    }
    dispatcher.event.set_position(EventPhase::None, None);

    let Dispatcher {
        navigator,
        event,
        mut outcome,
        ..
    } = dispatcher;
    outcome.default_prevented = event.default_prevented();
    outcome.propagation_stopped = event.propagation_stopped();

    if !outcome.default_prevented {
        if let Some(anchor) = enclosing_link(document, element) {
            if let Some(href) = document.attribute(anchor, "href") {
                let target = document.attribute(anchor, "target");
                debug!(target: "normlink.web", anchor = %anchor, href = %href, "following link");
                outcome.followed = CapturingNavigator::forwarding(navigator).open(href, target, None);
            }
        }
    }
    Ok(outcome)
}

/// `element` or its nearest ancestor that is an `<a href>`.
fn enclosing_link(document: &Document, element: NodeId) -> Option<NodeId> {
    std::iter::once(element)
        .chain(document.ancestors(element))
        .find(|node| document.tag_name(*node) == Some("a") && document.has_attribute(*node, "href"))
}
