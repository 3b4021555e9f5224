#![forbid(unsafe_code)]

//! The interception engine.
//!
//! [`Normlink`] owns every piece of engine state (classifier, queue, display
//! cache, drain schedule, sweep queue) and borrows the page through the
//! [`Page`] capability trait for the duration of each call. Nothing here
//! holds a reference into the page between calls, so a host is free to
//! mutate its document in between.
//!
//! # Registration
//!
//! ```text
//! register(target, type, handler)
//!   ├─ not a click, or not a connected element ─► forward
//!   └─ classify
//!        ├─ Skip     ─► forward
//!        ├─ ProbeNow ─► probe ─┬─ URL      ─► convert (or stage), do not forward
//!        │                     ├─ placeholder ─► defer, forward
//!        │                     └─ no URL   ─► defer if retryable, forward
//!        └─ Defer    ─► enqueue, forward
//! ```
//!
//! # Triggers and ticks
//!
//! [`Normlink::on_trigger`] flushes staged URLs, runs the discovery sweep
//! and, until the page has settled, opportunistically drains the queue once.
//! A `Load` trigger arms the [`DrainSchedule`]; from then on
//! [`Normlink::on_tick`] runs one drain round per elapsed interval until the
//! queue empties or the budget runs out.

use normlink_backend::{HandlerRegistry, Page, PageParts};
use normlink_core::{EventType, Handler, HandlerId, ListenerOptions, ListenerTarget, NodeId};
use tracing::{debug, info, warn};
use web_time::Duration;

use crate::classifier::{Disposition, HandlerClassifier, PatternClassifier};
use crate::config::NormlinkConfig;
use crate::convert::{ElementConverter, Upgrade};
use crate::diagnostics::DiagnosticReport;
use crate::display::DisplayCache;
use crate::error::ConfigError;
use crate::lifecycle::{Admission, SweepQueue, Trigger};
use crate::probe::{PlaceholderPolicy, ProbeContext, ProbeOutcome, probe};
use crate::queue::{
    Attempt, DeferredQueue, DrainEnd, DrainReport, DrainSchedule, DrainState, PendingEntry,
    ResolvedEntry,
};
use crate::sweep::{DiscoverySweep, SweepReport};

/// What [`Normlink::register`] did with a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Passed to the native registry unchanged.
    Forwarded,
    /// Probed successfully; the element was replaced by `anchor`.
    Converted { anchor: NodeId, url: String },
    /// Probed successfully; the URL waits for the next trigger.
    Staged { url: String },
    /// Probed without a usable URL; forwarded.
    ProbeFailed(ProbeOutcome),
    /// Queued for later resolution; forwarded.
    Deferred,
}

impl Registration {
    /// Whether the native registry received the handler.
    #[must_use]
    pub const fn forwarded(&self) -> bool {
        !matches!(self, Self::Converted { .. } | Self::Staged { .. })
    }
}

/// The result of one pumped sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerReport {
    pub trigger: Trigger,
    pub flushed: usize,
    pub sweep: SweepReport,
    /// Present when the queue was drained opportunistically.
    pub drain: Option<DrainReport>,
}

/// Engine state.
pub struct Normlink {
    classifier: Box<dyn HandlerClassifier>,
    placeholder: PlaceholderPolicy,
    converter: ElementConverter,
    display: DisplayCache,
    sweep: Option<DiscoverySweep>,
    queue: DeferredQueue,
    resolved: Vec<ResolvedEntry>,
    schedule: DrainSchedule,
    sweeps: SweepQueue,
    instant_replace: bool,
    publish_diagnostics: bool,
    namespace: String,
    excerpt_chars: usize,
}

impl std::fmt::Debug for Normlink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normlink")
            .field("classifier", &self.classifier.version())
            .field("pending", &self.queue.len())
            .field("exhausted", &self.queue.exhausted().len())
            .field("resolved", &self.resolved.len())
            .field("schedule", &self.schedule.state())
            .finish_non_exhaustive()
    }
}

impl Normlink {
    /// Build an engine from a validated configuration.
    pub fn new(config: &NormlinkConfig) -> Result<Self, ConfigError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        let classifier =
            PatternClassifier::from_profile(&config.classifier, &config.convert.marker_attribute)?;
        let sweep = if config.sweep.enabled {
            Some(DiscoverySweep::new(
                &config.sweep.rules,
                &config.sweep.profile_url_prefix,
            )?)
        } else {
            None
        };
        Ok(Self {
            classifier: Box::new(classifier),
            placeholder: config.placeholder_policy()?,
            converter: ElementConverter::new(
                &config.convert.marker_attribute,
                &config.convert.link_target,
                config.convert.lock_href,
            ),
            display: DisplayCache::new(&config.convert.display_attribute_prefix),
            sweep,
            queue: DeferredQueue::new(),
            resolved: Vec::new(),
            schedule: DrainSchedule::new(config.queue.interval(), config.queue.max_attempts),
            sweeps: SweepQueue::new(config.lifecycle.max_waiting_sweeps),
            instant_replace: config.capture.instant_replace,
            publish_diagnostics: config.diagnostics.publish,
            namespace: config.diagnostics.namespace.clone(),
            excerpt_chars: config.diagnostics.source_excerpt_chars,
        })
    }

    /// Replace the classifier strategy.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn HandlerClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn queue(&self) -> &DeferredQueue {
        &self.queue
    }

    #[must_use]
    pub fn resolved(&self) -> &[ResolvedEntry] {
        &self.resolved
    }

    #[must_use]
    pub fn schedule(&self) -> &DrainSchedule {
        &self.schedule
    }

    #[must_use]
    pub fn display_cache(&self) -> &DisplayCache {
        &self.display
    }

    #[must_use]
    pub fn converter(&self) -> &ElementConverter {
        &self.converter
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Intercept one listener registration.
    pub fn register<P: Page + ?Sized>(
        &mut self,
        page: &mut P,
        target: ListenerTarget,
        event: EventType,
        handler: Handler,
        options: ListenerOptions,
    ) -> Registration {
        let now = page.now_mono();
        let mut parts = page.parts();

        let element = match target.node() {
            Some(node)
                if event.is_click()
                    && parts.document.tag_name(node).is_some()
                    && parts.document.is_connected(node) =>
            {
                node
            }
            _ => {
                parts
                    .registry
                    .add_event_listener(target, event, handler, options);
                return Registration::Forwarded;
            }
        };

        match self
            .classifier
            .classify(&handler, parts.document, element)
        {
            Disposition::Skip => {
                parts
                    .registry
                    .add_event_listener(target, event, handler, options);
                Registration::Forwarded
            }
            Disposition::ProbeNow => {
                let outcome = self.probe_with(&mut parts, target, &handler);
                match outcome {
                    ProbeOutcome::Captured(url) => {
                        info!(target: "normlink.capture", element = %element, url = %url, "found URL");
                        match self.commit(&mut parts, element, url) {
                            Ok(registration) => registration,
                            Err(url) => {
                                // The element could not be converted; keep the
                                // original behavior.
                                parts
                                    .registry
                                    .add_event_listener(target, event, handler, options);
                                Registration::ProbeFailed(ProbeOutcome::Captured(url))
                            }
                        }
                    }
                    failed => {
                        // A placeholder means the URL is not loaded yet.
                        let retry = matches!(failed, ProbeOutcome::Placeholder(_))
                            || self.classifier.retries(parts.document, element);
                        if retry {
                            self.defer(now, element, handler.clone());
                        }
                        parts
                            .registry
                            .add_event_listener(target, event, handler, options);
                        if retry {
                            Registration::Deferred
                        } else {
                            debug!(target: "normlink.capture", element = %element, outcome = ?failed, "probe failed, forwarding");
                            Registration::ProbeFailed(failed)
                        }
                    }
                }
            }
            Disposition::Defer => {
                self.defer(now, element, handler.clone());
                parts
                    .registry
                    .add_event_listener(target, event, handler, options);
                Registration::Deferred
            }
        }
    }

    /// Remove a listener and any pending entry for it.
    pub fn unregister<P: Page + ?Sized>(
        &mut self,
        page: &mut P,
        target: ListenerTarget,
        event: &EventType,
        handler: HandlerId,
        capture: bool,
    ) -> bool {
        if let Some(node) = target.node() {
            if event.is_click() && self.queue.remove(node, handler) {
                debug!(target: "normlink.queue", element = %node, "pending entry dropped with its listener");
            }
        }
        page.parts()
            .registry
            .remove_event_listener(target, event, handler, capture)
    }

    /// Probe `handler` against `target` without registering anything.
    pub fn probe<P: Page + ?Sized>(
        &self,
        page: &mut P,
        target: ListenerTarget,
        handler: &Handler,
    ) -> ProbeOutcome {
        let mut parts = page.parts();
        self.probe_with(&mut parts, target, handler)
    }

    fn probe_with(
        &self,
        parts: &mut PageParts<'_>,
        target: ListenerTarget,
        handler: &Handler,
    ) -> ProbeOutcome {
        let mut context = ProbeContext::new();
        probe(
            &mut context,
            parts.document,
            parts.navigator,
            target,
            handler,
            &self.placeholder,
        )
    }

    /// Install or stage a harvested URL. Hands the URL back on failure.
    fn commit(
        &mut self,
        parts: &mut PageParts<'_>,
        element: NodeId,
        url: String,
    ) -> Result<Registration, String> {
        if !self.instant_replace {
            self.resolved.push(ResolvedEntry { element, url: url.clone() });
            return Ok(Registration::Staged { url });
        }
        match self.converter.upgrade(parts, &mut self.display, element, &url) {
            Ok(upgrade) => Ok(Registration::Converted {
                anchor: upgrade.node(),
                url,
            }),
            Err(err) => {
                warn!(target: "normlink.convert", element = %element, error = %err, "conversion failed");
                Err(url)
            }
        }
    }

    fn defer(&mut self, now: Duration, element: NodeId, handler: Handler) {
        if !self.queue.push(element, handler) {
            return;
        }
        debug!(target: "normlink.queue", element = %element, pending = self.queue.len(), "deferred");
        if self.schedule.is_finished() {
            self.schedule.arm(now);
            debug!(target: "normlink.queue", "drain schedule re-armed");
        }
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Ask for a sweep without running it.
    pub fn request(&mut self, trigger: Trigger) -> Admission {
        self.sweeps.request(trigger)
    }

    /// Run every requested sweep, in order.
    pub fn pump<P: Page + ?Sized>(&mut self, page: &mut P) -> Vec<TriggerReport> {
        let mut reports = Vec::new();
        while let Some(trigger) = self.sweeps.pop() {
            reports.push(self.run_trigger(page, trigger));
        }
        reports
    }

    /// [`request`](Self::request) followed by [`pump`](Self::pump).
    pub fn on_trigger<P: Page + ?Sized>(
        &mut self,
        page: &mut P,
        trigger: Trigger,
    ) -> (Admission, Vec<TriggerReport>) {
        let admission = self.request(trigger);
        (admission, self.pump(page))
    }

    fn run_trigger<P: Page + ?Sized>(&mut self, page: &mut P, trigger: Trigger) -> TriggerReport {
        let now = page.now_mono();
        let mut parts = page.parts();

        let flushed = self.flush_resolved(&mut parts);
        let sweep = match &self.sweep {
            Some(sweep) => sweep.run(&mut parts, &self.converter, &mut self.display),
            None => SweepReport::default(),
        };

        let mut drain = None;
        if self.schedule.state() == DrainState::Idle && !self.queue.is_empty() {
            drain = Some(self.drain_round(&mut parts));
        }

        if trigger == Trigger::Load && self.schedule.arm(now) {
            debug!(target: "normlink.queue", pending = self.queue.len(), "page settled, drain schedule armed");
        }

        TriggerReport {
            trigger,
            flushed,
            sweep,
            drain,
        }
    }

    fn flush_resolved(&mut self, parts: &mut PageParts<'_>) -> usize {
        let mut flushed = 0;
        for entry in std::mem::take(&mut self.resolved) {
            if !parts.document.is_connected(entry.element) {
                debug!(target: "normlink.convert", element = %entry.element, "staged element left the document");
                continue;
            }
            match self
                .converter
                .upgrade(parts, &mut self.display, entry.element, &entry.url)
            {
                Ok(Upgrade::Converted(_)) => flushed += 1,
                Ok(Upgrade::AlreadyConverted(_)) => {}
                Err(err) => {
                    warn!(target: "normlink.convert", element = %entry.element, error = %err, "staged conversion failed");
                }
            }
        }
        flushed
    }

    // -----------------------------------------------------------------------
    // Drain
    // -----------------------------------------------------------------------

    /// Run every drain round due at the page's current time.
    ///
    /// Returns the number of rounds run.
    pub fn on_tick<P: Page + ?Sized>(&mut self, page: &mut P) -> u32 {
        let now = page.now_mono();
        let mut rounds = 0;
        let mut parts = page.parts();
        loop {
            if !self.schedule.poll(now) {
                // A zero budget finishes inside poll.
                if self.schedule.state() == DrainState::Finished(DrainEnd::Exhausted)
                    && !self.queue.is_empty()
                {
                    self.give_up(&mut parts);
                }
                break;
            }
            rounds += 1;
            let report = self.drain_round(&mut parts);
            debug!(
                target: "normlink.queue",
                round = self.schedule.rounds(),
                resolved = report.resolved,
                satisfied = report.satisfied,
                retried = report.retried,
                "drain round"
            );
            match self.schedule.complete_round(self.queue.is_empty()) {
                Some(DrainEnd::Exhausted) => {
                    self.give_up(&mut parts);
                    break;
                }
                Some(_) => {
                    info!(target: "normlink.queue", rounds = self.schedule.rounds(), "deferred queue drained");
                    break;
                }
                None => {}
            }
        }
        rounds
    }

    /// Stop the drain schedule; pending entries stay queued.
    pub fn cancel_drain(&mut self) -> bool {
        self.schedule.cancel()
    }

    fn drain_round(&mut self, parts: &mut PageParts<'_>) -> DrainReport {
        let placeholder = &self.placeholder;
        let converter = &self.converter;
        let display = &mut self.display;
        let resolved = &mut self.resolved;
        let instant = self.instant_replace;

        self.queue.drain_with(|entry| {
            if converter.is_converted(parts.document, entry.element) {
                return Attempt::Satisfied;
            }
            if !parts.document.is_connected(entry.element) {
                return Attempt::Retry;
            }
            let mut context = ProbeContext::new();
            let outcome = probe(
                &mut context,
                parts.document,
                parts.navigator,
                ListenerTarget::Node(entry.element),
                &entry.handler,
                placeholder,
            );
            let Some(url) = outcome.into_url() else {
                return Attempt::Retry;
            };
            info!(target: "normlink.capture", element = %entry.element, url = %url, attempts = entry.attempts, "found URL");
            if !instant {
                resolved.push(ResolvedEntry {
                    element: entry.element,
                    url,
                });
                return Attempt::Resolved;
            }
            match converter.upgrade(parts, display, entry.element, &url) {
                Ok(_) => Attempt::Resolved,
                Err(err) => {
                    warn!(target: "normlink.convert", element = %entry.element, error = %err, "conversion failed");
                    Attempt::Retry
                }
            }
        })
    }

    fn give_up(&mut self, parts: &mut PageParts<'_>) {
        let moved = self.queue.exhaust();
        warn!(
            target: "normlink.queue",
            unresolved = moved,
            total = self.queue.exhausted().len(),
            rounds = self.schedule.rounds(),
            "drain budget exhausted"
        );
        self.publish(parts);
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Snapshot of pending and exhausted entries.
    pub fn diagnostics(&self, document: &normlink_core::Document) -> DiagnosticReport {
        DiagnosticReport::build(
            document,
            self.classifier.version(),
            self.queue.len(),
            self.queue.exhausted(),
            self.excerpt_chars,
        )
    }

    fn publish(&self, parts: &mut PageParts<'_>) {
        if !self.publish_diagnostics {
            return;
        }
        match self.diagnostics(parts.document).to_json() {
            Ok(json) => parts.debug.publish(&self.namespace, &json),
            Err(err) => warn!(target: "normlink.queue", error = %err, "diagnostic report not serializable"),
        }
    }

    /// Re-probe an exhausted entry by its diagnostic index.
    ///
    /// On success the element is converted and the entry leaves the report;
    /// otherwise it stays where it was. Returns `None` for an unknown index.
    pub fn probe_unresolved<P: Page + ?Sized>(
        &mut self,
        page: &mut P,
        index: usize,
    ) -> Option<ProbeOutcome> {
        let entry: PendingEntry = self.queue.take_exhausted(index)?;
        let mut parts = page.parts();
        let outcome = if parts.document.is_connected(entry.element) {
            self.probe_with(&mut parts, ListenerTarget::Node(entry.element), &entry.handler)
        } else {
            ProbeOutcome::NoNavigation
        };
        let converted = match &outcome {
            ProbeOutcome::Captured(url) => self
                .converter
                .upgrade(&mut parts, &mut self.display, entry.element, url)
                .map_err(|err| {
                    warn!(target: "normlink.convert", element = %entry.element, error = %err, "conversion failed");
                })
                .is_ok(),
            _ => false,
        };
        if !converted {
            self.queue.restore_exhausted(index, entry);
        }
        self.publish(&mut parts);
        Some(outcome)
    }
}

// ---------------------------------------------------------------------------
// Registry façade
// ---------------------------------------------------------------------------

/// A [`HandlerRegistry`] that routes every registration through the engine.
///
/// Hand this to application code in place of the page's native registry.
pub struct InterceptingRegistry<'a, P: Page + ?Sized> {
    engine: &'a mut Normlink,
    page: &'a mut P,
}

impl<'a, P: Page + ?Sized> InterceptingRegistry<'a, P> {
    pub fn new(engine: &'a mut Normlink, page: &'a mut P) -> Self {
        Self { engine, page }
    }
}

impl<P: Page + ?Sized> HandlerRegistry for InterceptingRegistry<'_, P> {
    fn add_event_listener(
        &mut self,
        target: ListenerTarget,
        event: EventType,
        handler: Handler,
        options: ListenerOptions,
    ) {
        self.engine
            .register(self.page, target, event, handler, options);
    }

    fn remove_event_listener(
        &mut self,
        target: ListenerTarget,
        event: &EventType,
        handler: HandlerId,
        capture: bool,
    ) -> bool {
        self.engine
            .unregister(self.page, target, event, handler, capture)
    }
}
