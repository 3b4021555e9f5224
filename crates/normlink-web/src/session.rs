#![forbid(unsafe_code)]

//! A page with the engine installed.
//!
//! [`HostedPage`] is what a browser binding would be: every listener the
//! application registers goes through the engine, lifecycle events become
//! [`Trigger`]s, and the host's timer drives [`Normlink::on_tick`].

use core::time::Duration;

use normlink_backend::HandlerRegistry;
use normlink_core::{Document, EventType, Handler, HandlerId, ListenerOptions, ListenerTarget, NodeId};
use normlink_runtime::{
    Admission, ConfigError, InterceptingRegistry, Normlink, NormlinkConfig, Registration, Trigger,
    TriggerReport,
};

use crate::{DispatchOutcome, WebPage, WebPageError};

#[derive(Debug)]
pub struct HostedPage {
    page: WebPage,
    engine: Normlink,
}

impl HostedPage {
    /// An empty page with an engine built from `config`.
    pub fn new(config: &NormlinkConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_engine(WebPage::new(), Normlink::new(config)?))
    }

    #[must_use]
    pub fn with_engine(page: WebPage, engine: Normlink) -> Self {
        Self { page, engine }
    }

    #[must_use]
    pub fn page(&self) -> &WebPage {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut WebPage {
        &mut self.page
    }

    #[must_use]
    pub fn engine(&self) -> &Normlink {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Normlink {
        &mut self.engine
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        normlink_backend::Page::document(&self.page)
    }

    pub fn document_mut(&mut self) -> &mut Document {
        self.page.document_mut()
    }

    /// The registry application code sees.
    pub fn registry(&mut self) -> InterceptingRegistry<'_, WebPage> {
        InterceptingRegistry::new(&mut self.engine, &mut self.page)
    }

    /// `target.addEventListener(event, handler, options)` from application code.
    pub fn add_event_listener(
        &mut self,
        target: ListenerTarget,
        event: impl Into<EventType>,
        handler: Handler,
        options: impl Into<ListenerOptions>,
    ) -> Registration {
        self.engine.register(
            &mut self.page,
            target,
            event.into(),
            handler,
            options.into(),
        )
    }

    pub fn remove_event_listener(
        &mut self,
        target: ListenerTarget,
        event: impl Into<EventType>,
        handler: HandlerId,
        capture: bool,
    ) -> bool {
        self.registry()
            .remove_event_listener(target, &event.into(), handler, capture)
    }

    /// Deliver a lifecycle event and run whatever sweeps it admits.
    pub fn fire(&mut self, trigger: Trigger) -> (Admission, Vec<TriggerReport>) {
        self.engine.on_trigger(&mut self.page, trigger)
    }

    /// `DOMContentLoaded` followed by `load`.
    pub fn load(&mut self) -> Vec<TriggerReport> {
        let mut reports = self.fire(Trigger::ContentLoaded).1;
        reports.extend(self.fire(Trigger::Load).1);
        reports
    }

    /// A bare click, with no preceding pointer-down.
    pub fn click(&mut self, element: NodeId) -> Result<DispatchOutcome, WebPageError> {
        self.page.click(element)
    }

    /// What a user does: pointer-down (which sweeps), then click.
    pub fn user_click(&mut self, element: NodeId) -> Result<DispatchOutcome, WebPageError> {
        self.fire(Trigger::PointerDown);
        self.page.click(element)
    }

    /// Advance the clock by `dt` and run due drain rounds.
    pub fn advance(&mut self, dt: Duration) -> u32 {
        self.page.clock_mut().advance(dt);
        self.engine.on_tick(&mut self.page)
    }

    /// Advance in `step` increments until the drain schedule stops or
    /// `limit` elapses. Returns the rounds run.
    pub fn settle(&mut self, step: Duration, limit: Duration) -> u32 {
        let mut elapsed = Duration::ZERO;
        let mut rounds = 0;
        while elapsed < limit && !self.engine.schedule().is_finished() {
            rounds += self.advance(step);
            elapsed = elapsed.saturating_add(step);
        }
        rounds
    }
}
