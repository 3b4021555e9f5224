//! Handler values and the navigation primitive they call.
//!
//! A [`Handler`] is what an application hands to listener registration: either
//! a plain callback or an object exposing `handle_event`. Unlike a closure in a
//! scripting runtime, a Rust closure carries no printable body, so every
//! handler is built together with its *source text*: the representation the
//! host reports for it (`Function.prototype.toString` in a browser). The
//! classifier only ever looks at that text.
//!
//! Handlers reach the outside world exclusively through [`CallScope`], which
//! lends them the document (read-only) and a [`Navigator`]. Whoever builds the
//! scope decides which navigator the handler sees, which is how the capture
//! layer swaps the real one for a recording one during a probe.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::dom::Document;
use crate::event::{Event, ListenerTarget};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

const OBJECT_SOURCE: &str = "[object Object]";

// ---------------------------------------------------------------------------
// Navigation primitive
// ---------------------------------------------------------------------------

/// Opaque handle to a browsing context opened by [`Navigator::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// The global "open URL" primitive.
pub trait Navigator {
    /// Navigate to `url`. Returns a handle when a browsing context was opened.
    fn open(&mut self, url: &str, target: Option<&str>, features: Option<&str>)
    -> Option<WindowHandle>;
}

impl<N: Navigator + ?Sized> Navigator for &mut N {
    fn open(
        &mut self,
        url: &str,
        target: Option<&str>,
        features: Option<&str>,
    ) -> Option<WindowHandle> {
        (**self).open(url, target, features)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failure raised by handler code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler threw.
    #[error("handler raised: {0}")]
    Raised(String),
    /// The handler needed state that does not exist yet.
    #[error("handler state unavailable: {0}")]
    Unavailable(String),
}

pub type HandlerResult = Result<(), HandlerError>;

// ---------------------------------------------------------------------------
// Call scope
// ---------------------------------------------------------------------------

/// Everything a handler may touch while it runs.
pub struct CallScope<'a> {
    this: ListenerTarget,
    document: &'a Document,
    navigator: &'a mut dyn Navigator,
}

impl<'a> CallScope<'a> {
    pub fn new(
        this: ListenerTarget,
        document: &'a Document,
        navigator: &'a mut dyn Navigator,
    ) -> Self {
        Self {
            this,
            document,
            navigator,
        }
    }

    /// The receiver the handler is bound to.
    #[must_use]
    pub const fn this(&self) -> ListenerTarget {
        self.this
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        self.document
    }

    /// `window.open(url)`.
    pub fn open(&mut self, url: &str) -> Option<WindowHandle> {
        self.navigator.open(url, None, None)
    }

    /// `window.open(url, target, features)`.
    pub fn open_with(
        &mut self,
        url: &str,
        target: Option<&str>,
        features: Option<&str>,
    ) -> Option<WindowHandle> {
        self.navigator.open(url, target, features)
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// An object with a `handle_event` capability.
pub trait EventListenerObject {
    fn handle_event(&self, scope: &mut CallScope<'_>, event: &mut Event) -> HandlerResult;

    /// Source text reported for the object. Objects stringify generically.
    fn describe(&self) -> String {
        OBJECT_SOURCE.to_owned()
    }
}

type Callback = dyn Fn(&mut CallScope<'_>, &mut Event) -> HandlerResult;

#[derive(Clone)]
enum HandlerKind {
    Function(Rc<Callback>),
    Object(Rc<dyn EventListenerObject>),
}

/// Process-unique handler identity; clones share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A registered (or registrable) event handler.
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    source: Rc<str>,
    kind: HandlerKind,
}

impl Handler {
    /// A plain callback with the given source text.
    pub fn function<F>(source: impl Into<Rc<str>>, callback: F) -> Self
    where
        F: Fn(&mut CallScope<'_>, &mut Event) -> HandlerResult + 'static,
    {
        Self {
            id: HandlerId::next(),
            source: source.into(),
            kind: HandlerKind::Function(Rc::new(callback)),
        }
    }

    /// A host-provided callback; its source text is the usual native stub.
    pub fn native<F>(name: &str, callback: F) -> Self
    where
        F: Fn(&mut CallScope<'_>, &mut Event) -> HandlerResult + 'static,
    {
        Self::function(format!("function {name}() {{ [native code] }}"), callback)
    }

    /// A handle-event object.
    pub fn object(object: Rc<dyn EventListenerObject>) -> Self {
        Self {
            id: HandlerId::next(),
            source: object.describe().into(),
            kind: HandlerKind::Object(object),
        }
    }

    #[must_use]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    /// The textual representation the classifier inspects.
    #[must_use]
    pub fn source_text(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self.kind, HandlerKind::Object(_))
    }

    /// Run the handler.
    pub fn call(&self, scope: &mut CallScope<'_>, event: &mut Event) -> HandlerResult {
        match &self.kind {
            HandlerKind::Function(callback) => callback(scope, event),
            HandlerKind::Object(object) => object.handle_event(scope, event),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("object", &self.is_object())
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handler {}
