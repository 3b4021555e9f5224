#![forbid(unsafe_code)]

//! normlink Runtime
//!
//! Intercepts click-listener registrations, discovers the URL each handler
//! would open, and rewrites the clickable element into a real `<a href>`.
//!
//! # Key Components
//!
//! - [`Normlink`] - The engine: registration, triggers, drain ticks, diagnostics
//! - [`InterceptingRegistry`] - Drop-in [`HandlerRegistry`] that routes through the engine
//! - [`probe()`] - Runs a handler once against a capturing navigator
//! - [`HandlerClassifier`] / [`PatternClassifier`] - Decides skip, probe now, or defer
//! - [`DeferredQueue`] / [`DrainSchedule`] - Retry state and its bounded timer
//! - [`ElementConverter`] - Element-to-anchor rewrite and URL installation
//! - [`DiscoverySweep`] - Attribute-driven conversion of known widgets
//! - [`NormlinkConfig`] - Every tunable, loadable from TOML or JSON
//!
//! # Role in normlink
//! `normlink-runtime` is the orchestrator. It owns all engine state and
//! borrows the page through the [`Page`](normlink_backend::Page) trait from
//! `normlink-backend` for the duration of each call; the document model and
//! handler types come from `normlink-core`.
//!
//! # How it fits in the system
//! A host (a browser binding, or the deterministic page in `normlink-web`)
//! forwards listener registrations, page lifecycle events, and timer ticks
//! to [`Normlink`]. Everything the engine does to the page goes back out
//! through the backend traits, so the same engine runs unchanged in tests.
//!
//! [`HandlerRegistry`]: normlink_backend::HandlerRegistry

pub mod classifier;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod display;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod queue;
pub mod sweep;

pub use classifier::{
    ClassifierProfile, DEFAULT_PROBE_PATTERN, Disposition, HandlerClassifier, PatternClassifier,
};
pub use config::NormlinkConfig;
pub use convert::{DEFAULT_MARKER_ATTRIBUTE, ElementConverter, Upgrade};
pub use diagnostics::{DiagnosticReport, UnresolvedEntry};
pub use display::{DEFAULT_DISPLAY_ATTRIBUTE_PREFIX, DisplayCache};
pub use engine::{InterceptingRegistry, Normlink, Registration, TriggerReport};
pub use error::{ConfigError, ConvertError};
pub use lifecycle::{Admission, SweepQueue, Trigger};
pub use probe::{
    CapturingNavigator, PlaceholderPolicy, ProbeContext, ProbeGuard, ProbeOutcome, probe,
};
pub use queue::{
    Attempt, DeferredQueue, DrainEnd, DrainReport, DrainSchedule, DrainState, PendingEntry,
    ResolvedEntry,
};
pub use sweep::{DEFAULT_PROFILE_URL_PREFIX, DiscoverySweep, SweepReport, SweepRule, UrlSource};
