#![forbid(unsafe_code)]

//! Navigation-intent capture.
//!
//! A *probe* runs a click handler once with a synthetic click and watches what
//! it hands to the navigation primitive. During the probe the real navigator
//! is hidden behind a [`CapturingNavigator`] that records the URL instead of
//! navigating; outside a probe the same façade forwards every call untouched.
//!
//! The capture slot is an explicit [`ProbeContext`] owned by the caller and
//! lent to exactly one handler invocation. [`ProbeGuard`] resets it when the
//! probe ends, including when the handler errors or panics, so a later probe
//! can never observe a URL left behind by an earlier one.

use std::ops::{Deref, DerefMut};

use normlink_core::{
    CallScope, Document, Event, EventType, Handler, HandlerError, ListenerTarget, Navigator,
    WindowHandle,
};
use tracing::{debug, debug_span, warn};
use url::Url;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-probe capture state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeContext {
    probing: bool,
    captured: Option<String>,
}

impl ProbeContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_probing(&self) -> bool {
        self.probing
    }

    #[must_use]
    pub fn captured_url(&self) -> Option<&str> {
        self.captured.as_deref()
    }

    fn record(&mut self, url: &str) {
        self.captured = Some(url.to_owned());
    }
}

/// Marks a context as probing for as long as it lives.
///
/// Dropping the guard clears both the flag and any captured URL.
pub struct ProbeGuard<'a> {
    context: &'a mut ProbeContext,
}

impl<'a> ProbeGuard<'a> {
    pub fn enter(context: &'a mut ProbeContext) -> Self {
        context.probing = true;
        context.captured = None;
        Self { context }
    }

    /// Take the captured URL out of the context.
    pub fn take_captured(&mut self) -> Option<String> {
        self.context.captured.take()
    }
}

impl Deref for ProbeGuard<'_> {
    type Target = ProbeContext;

    fn deref(&self) -> &ProbeContext {
        self.context
    }
}

impl DerefMut for ProbeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ProbeContext {
        self.context
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.context.probing = false;
        self.context.captured = None;
    }
}

// ---------------------------------------------------------------------------
// Navigation façade
// ---------------------------------------------------------------------------

/// Navigator façade: records while a probe is active, forwards otherwise.
pub struct CapturingNavigator<'a> {
    context: Option<&'a mut ProbeContext>,
    inner: &'a mut dyn Navigator,
}

impl<'a> CapturingNavigator<'a> {
    /// A façade bound to a probe context.
    pub fn probing(context: &'a mut ProbeContext, inner: &'a mut dyn Navigator) -> Self {
        Self {
            context: Some(context),
            inner,
        }
    }

    /// A façade with no probe in flight; every call reaches `inner`.
    pub fn forwarding(inner: &'a mut dyn Navigator) -> Self {
        Self {
            context: None,
            inner,
        }
    }
}

impl Navigator for CapturingNavigator<'_> {
    fn open(
        &mut self,
        url: &str,
        target: Option<&str>,
        features: Option<&str>,
    ) -> Option<WindowHandle> {
        match self.context.as_deref_mut() {
            Some(context) if context.is_probing() => {
                // Last call wins when a handler opens more than once.
                context.record(url);
                None
            }
            _ => self.inner.open(url, target, features),
        }
    }
}

// ---------------------------------------------------------------------------
// Placeholder detection
// ---------------------------------------------------------------------------

/// Recognizes URLs whose identifier has not been loaded yet.
///
/// The identifier is the last non-empty path segment. A captured URL is a
/// placeholder when it has none (and `reject_empty_identifier` is set), or
/// when it equals one of the sentinel identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderPolicy {
    pub reject_empty_identifier: bool,
    pub sentinel_identifiers: Vec<String>,
    /// Base for resolving relative captures.
    pub base_url: Option<Url>,
}

impl Default for PlaceholderPolicy {
    fn default() -> Self {
        Self {
            reject_empty_identifier: true,
            sentinel_identifiers: vec!["0".to_owned()],
            base_url: None,
        }
    }
}

impl PlaceholderPolicy {
    #[must_use]
    pub fn is_placeholder(&self, captured: &str) -> bool {
        let segments = self.path_segments(captured);
        match segments.iter().rev().find(|s| !s.is_empty()) {
            None => self.reject_empty_identifier,
            Some(identifier) => self.sentinel_identifiers.iter().any(|s| s == identifier),
        }
    }

    fn path_segments(&self, captured: &str) -> Vec<String> {
        let parsed = match &self.base_url {
            Some(base) => base.join(captured),
            None => Url::parse(captured),
        };
        match parsed {
            Ok(url) if !url.cannot_be_a_base() => url
                .path_segments()
                .map(|segments| segments.map(str::to_owned).collect())
                .unwrap_or_default(),
            _ => {
                // Relative or opaque: fall back to the raw path.
                let path = captured
                    .split(['?', '#'])
                    .next()
                    .unwrap_or_default();
                path.split('/').map(str::to_owned).collect()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Probe procedure
// ---------------------------------------------------------------------------

/// Result of probing one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The handler asked to navigate to a usable URL.
    Captured(String),
    /// The handler never called the navigator.
    NoNavigation,
    /// The handler navigated to a URL whose identifier is not loaded yet.
    Placeholder(String),
    /// The handler returned an error.
    HandlerFailed(HandlerError),
}

impl ProbeOutcome {
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Captured(url) => Some(url),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_url(self) -> Option<String> {
        match self {
            Self::Captured(url) => Some(url),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_captured(&self) -> bool {
        matches!(self, Self::Captured(_))
    }
}

/// Invoke `handler` once with a synthetic click bound to `target` and report
/// what it tried to open.
///
/// `navigator` is only reached if the handler navigates after the probe has
/// ended, which cannot happen synchronously; it is passed so the façade has
/// somewhere to forward to.
pub fn probe(
    context: &mut ProbeContext,
    document: &Document,
    navigator: &mut dyn Navigator,
    target: ListenerTarget,
    handler: &Handler,
    placeholder: &PlaceholderPolicy,
) -> ProbeOutcome {
    let _span = debug_span!("normlink.probe", handler = handler.id().get()).entered();

    let mut guard = ProbeGuard::enter(context);
    let result = {
        let mut facade = CapturingNavigator::probing(&mut guard, navigator);
        let mut scope = CallScope::new(target, document, &mut facade);
        let mut event = Event::synthetic(EventType::Click);
        handler.call(&mut scope, &mut event)
    };
    let captured = guard.take_captured();
    drop(guard);

    if let Err(err) = result {
        warn!(
            target: "normlink.capture",
            handler = handler.id().get(),
            error = %err,
            "handler failed during probe"
        );
        return ProbeOutcome::HandlerFailed(err);
    }

    match captured {
        None => ProbeOutcome::NoNavigation,
        Some(url) if url.is_empty() => ProbeOutcome::NoNavigation,
        Some(url) if placeholder.is_placeholder(&url) => {
            debug!(target: "normlink.capture", url = %url, "placeholder URL");
            ProbeOutcome::Placeholder(url)
        }
        Some(url) => {
            debug!(target: "normlink.capture", url = %url, "found URL");
            ProbeOutcome::Captured(url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use normlink_core::{EventListenerObject, HandlerResult};
    use pretty_assertions::assert_eq;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    #[derive(Default)]
    struct RealNavigator {
        opened: Vec<String>,
    }

    impl Navigator for RealNavigator {
        fn open(
            &mut self,
            url: &str,
            _target: Option<&str>,
            _features: Option<&str>,
        ) -> Option<WindowHandle> {
            self.opened.push(url.to_owned());
            Some(WindowHandle(self.opened.len() as u64))
        }
    }

    fn opener(url: &'static str) -> Handler {
        Handler::function("function(e){window.open(u)}", move |scope, _| {
            scope.open(url);
            Ok(())
        })
    }

    fn run(handler: &Handler) -> (ProbeOutcome, RealNavigator, ProbeContext) {
        let doc = Document::new();
        let mut nav = RealNavigator::default();
        let mut ctx = ProbeContext::new();
        let outcome = probe(
            &mut ctx,
            &doc,
            &mut nav,
            ListenerTarget::Window,
            handler,
            &PlaceholderPolicy::default(),
        );
        (outcome, nav, ctx)
    }

    #[test]
    fn captures_without_navigating() {
        let (outcome, nav, ctx) = run(&opener("https://space.bilibili.com/12345"));
        assert_eq!(
            outcome,
            ProbeOutcome::Captured("https://space.bilibili.com/12345".into())
        );
        assert!(nav.opened.is_empty());
        assert_eq!(ctx, ProbeContext::default());
    }

    #[test]
    fn zero_identifier_is_a_placeholder() {
        let (outcome, nav, _) = run(&opener("https://space.bilibili.com/0"));
        assert_eq!(
            outcome,
            ProbeOutcome::Placeholder("https://space.bilibili.com/0".into())
        );
        assert!(nav.opened.is_empty());
    }

    #[test]
    fn silent_handler_is_no_navigation() {
        let (outcome, _, _) = run(&Handler::native("noop", |_, _| Ok(())));
        assert_eq!(outcome, ProbeOutcome::NoNavigation);
    }

    #[test]
    fn last_open_wins() {
        let handler = Handler::function("f", |scope, _| {
            scope.open("https://a.example/1");
            scope.open("https://a.example/2");
            Ok(())
        });
        let (outcome, _, _) = run(&handler);
        assert_eq!(outcome.url(), Some("https://a.example/2"));
    }

    #[test]
    fn handler_error_is_a_failure_and_resets_context() {
        let handler = Handler::function("f", |scope, _| {
            scope.open("https://a.example/1");
            Err(HandlerError::Raised("boom".into()))
        });
        let (outcome, nav, ctx) = run(&handler);
        assert_eq!(
            outcome,
            ProbeOutcome::HandlerFailed(HandlerError::Raised("boom".into()))
        );
        assert!(nav.opened.is_empty());
        assert!(!ctx.is_probing());
        assert_eq!(ctx.captured_url(), None);
    }

    #[test]
    fn panic_unwinds_but_context_is_reset() {
        let doc = Document::new();
        let mut nav = RealNavigator::default();
        let mut ctx = ProbeContext::new();
        let handler = Handler::function("f", |scope, _| {
            scope.open("https://a.example/leak");
            panic!("handler panicked");
        });
        let result = catch_unwind(AssertUnwindSafe(|| {
            probe(
                &mut ctx,
                &doc,
                &mut nav,
                ListenerTarget::Window,
                &handler,
                &PlaceholderPolicy::default(),
            )
        }));
        assert!(result.is_err());
        assert!(!ctx.is_probing());
        assert_eq!(ctx.captured_url(), None);

        // The next probe starts clean.
        let outcome = probe(
            &mut ctx,
            &doc,
            &mut nav,
            ListenerTarget::Window,
            &Handler::native("noop", |_, _| Ok(())),
            &PlaceholderPolicy::default(),
        );
        assert_eq!(outcome, ProbeOutcome::NoNavigation);
    }

    #[test]
    fn handle_event_objects_are_probed() {
        struct Opener;
        impl EventListenerObject for Opener {
            fn handle_event(&self, scope: &mut CallScope<'_>, _event: &mut Event) -> HandlerResult {
                scope.open("https://space.bilibili.com/42");
                Ok(())
            }
        }
        let (outcome, _, _) = run(&Handler::object(Rc::new(Opener)));
        assert_eq!(outcome.url(), Some("https://space.bilibili.com/42"));
    }

    #[test]
    fn probe_event_is_a_synthetic_click_bound_to_target() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let body = doc.body();
        doc.append_child(body, div).unwrap();
        let handler = Handler::function("f", move |scope, event| {
            assert!(event.is_synthetic());
            assert!(event.kind().is_click());
            assert_eq!(scope.this(), ListenerTarget::Node(div));
            Ok(())
        });
        let mut nav = RealNavigator::default();
        let mut ctx = ProbeContext::new();
        let outcome = probe(
            &mut ctx,
            &doc,
            &mut nav,
            ListenerTarget::Node(div),
            &handler,
            &PlaceholderPolicy::default(),
        );
        assert_eq!(outcome, ProbeOutcome::NoNavigation);
    }

    #[test]
    fn forwarding_facade_navigates() {
        let mut nav = RealNavigator::default();
        {
            let mut facade = CapturingNavigator::forwarding(&mut nav);
            assert_eq!(
                facade.open("https://a.example/", Some("_blank"), None),
                Some(WindowHandle(1))
            );
        }
        assert_eq!(nav.opened, vec!["https://a.example/".to_owned()]);
    }

    #[test]
    fn placeholder_shapes() {
        let policy = PlaceholderPolicy::default();
        assert!(policy.is_placeholder("https://space.bilibili.com/0"));
        assert!(policy.is_placeholder("https://space.bilibili.com/"));
        assert!(policy.is_placeholder("https://space.bilibili.com/0?from=x"));
        assert!(!policy.is_placeholder("https://space.bilibili.com/10"));
        assert!(!policy.is_placeholder("https://www.bilibili.com/video/BV1xx411c7mD"));
        assert!(policy.is_placeholder("/0"));
        assert!(!policy.is_placeholder("/video/1"));
        assert!(policy.is_placeholder("https://space.bilibili.com/0/"));
        assert!(!policy.is_placeholder("https://www.bilibili.com/list/0/BV1xx411c7mD"));

        let lenient = PlaceholderPolicy {
            reject_empty_identifier: false,
            sentinel_identifiers: vec!["-1".into()],
            base_url: Url::parse("https://space.bilibili.com/").ok(),
        };
        assert!(!lenient.is_placeholder("https://space.bilibili.com/"));
        assert!(!lenient.is_placeholder("0"));
        assert!(lenient.is_placeholder("-1"));
    }
}
