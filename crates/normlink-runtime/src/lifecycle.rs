#![forbid(unsafe_code)]

//! Page lifecycle triggers and sweep coalescing.
//!
//! Every trigger asks for a sweep. Requests pile up when input arrives
//! faster than the host pumps them; the queue keeps the one about to run
//! plus at most `max_waiting` waiting behind it and drops further pointer
//! and key requests. Load-type triggers are always admitted because they
//! carry the settle signal.

use std::collections::VecDeque;

use normlink_core::EventType;
use tracing::info;

/// Page events that start a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    PointerDown,
    KeyDown,
    ContentLoaded,
    /// Full load; also arms the drain schedule.
    Load,
}

impl Trigger {
    pub const ALL: [Self; 4] = [Self::PointerDown, Self::KeyDown, Self::ContentLoaded, Self::Load];

    #[must_use]
    pub fn from_event(kind: &EventType) -> Option<Self> {
        match kind {
            EventType::PointerDown => Some(Self::PointerDown),
            EventType::KeyDown => Some(Self::KeyDown),
            EventType::ContentLoaded => Some(Self::ContentLoaded),
            EventType::Load => Some(Self::Load),
            _ => None,
        }
    }

    #[must_use]
    pub fn event_type(self) -> EventType {
        match self {
            Self::PointerDown => EventType::PointerDown,
            Self::KeyDown => EventType::KeyDown,
            Self::ContentLoaded => EventType::ContentLoaded,
            Self::Load => EventType::Load,
        }
    }

    #[must_use]
    pub const fn is_load_type(self) -> bool {
        matches!(self, Self::ContentLoaded | Self::Load)
    }
}

/// What happened to a sweep request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Nothing was pending; this sweep runs next.
    Next,
    /// Queued behind other sweeps.
    Waiting,
    /// Dropped: too many sweeps already waiting.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SweepQueue {
    pending: VecDeque<Trigger>,
    max_waiting: usize,
}

impl Default for SweepQueue {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SweepQueue {
    #[must_use]
    pub fn new(max_waiting: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_waiting,
        }
    }

    /// Sweeps queued behind the next one.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.pending.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn request(&mut self, trigger: Trigger) -> Admission {
        if self.pending.is_empty() {
            self.pending.push_back(trigger);
            return Admission::Next;
        }
        if self.waiting() >= self.max_waiting && !trigger.is_load_type() {
            info!(
                target: "normlink.sweep",
                trigger = ?trigger,
                waiting = self.waiting(),
                "too many waiting sweeps, request cancelled"
            );
            return Admission::Cancelled;
        }
        self.pending.push_back(trigger);
        Admission::Waiting
    }

    /// Next sweep to run.
    pub fn pop(&mut self) -> Option<Trigger> {
        self.pending.pop_front()
    }
}
