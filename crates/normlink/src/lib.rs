#![forbid(unsafe_code)]

//! normlink public facade crate.
//!
//! This crate provides the stable surface area for users. It re-exports the
//! common types from the internal crates and offers a small prelude.
//!
//! ```rust,ignore
//! use normlink::prelude::*;
//!
//! let mut page = HostedPage::new(&NormlinkConfig::default())?;
//! page.add_event_listener(ListenerTarget::Node(avatar), "click", handler, false);
//! page.load();
//! page.settle(Duration::from_millis(100), Duration::from_secs(10));
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use normlink_core::{
    Attribute, CallScope, Document, DomError, Event, EventListenerObject, EventPhase, EventType,
    Handler, HandlerError, HandlerId, HandlerResult, ListenerOptions, ListenerTarget, Navigator,
    NodeId, SelectorError, SelectorList, WindowHandle,
};

// --- Backend re-exports ----------------------------------------------------

pub use normlink_backend::{DebugNamespace, HandlerRegistry, Page, PageClock, PageParts, StyleOracle};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use normlink_runtime::{
    Admission, ConfigError, ConvertError, DiagnosticReport, HandlerClassifier,
    InterceptingRegistry, Normlink, NormlinkConfig, PatternClassifier, PlaceholderPolicy,
    ProbeOutcome, Registration, SweepRule, Trigger, TriggerReport,
};

// --- Web re-exports --------------------------------------------------------

#[cfg(feature = "web")]
pub use normlink_web::{DispatchOutcome, HostedPage, WebPage, WebPageError};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for normlink hosts.
#[derive(Debug)]
pub enum Error {
    /// Document operation failed.
    Dom(DomError),
    /// Configuration could not be loaded or is invalid.
    #[cfg(feature = "runtime")]
    Config(ConfigError),
    /// An element could not be turned into a link.
    #[cfg(feature = "runtime")]
    Convert(ConvertError),
    /// The in-memory page rejected an operation.
    #[cfg(feature = "web")]
    Page(WebPageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dom(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Config(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Convert(err) => write!(f, "{err}"),
            #[cfg(feature = "web")]
            Self::Page(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dom(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Config(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Convert(err) => Some(err),
            #[cfg(feature = "web")]
            Self::Page(err) => Some(err),
        }
    }
}

impl From<DomError> for Error {
    fn from(err: DomError) -> Self {
        Self::Dom(err)
    }
}

#[cfg(feature = "runtime")]
impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

#[cfg(feature = "runtime")]
impl From<ConvertError> for Error {
    fn from(err: ConvertError) -> Self {
        Self::Convert(err)
    }
}

#[cfg(feature = "web")]
impl From<WebPageError> for Error {
    fn from(err: WebPageError) -> Self {
        Self::Page(err)
    }
}

/// Standard result type for normlink APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Document, Error, EventType, Handler, HandlerRegistry, ListenerOptions, ListenerTarget,
        Navigator, NodeId, Page, Result,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{Normlink, NormlinkConfig, Registration, Trigger};

    #[cfg(feature = "web")]
    pub use crate::{HostedPage, WebPage};

    pub use std::time::Duration;

    pub use crate::{backend, core as dom};

    #[cfg(feature = "runtime")]
    pub use crate::runtime;

    #[cfg(feature = "web")]
    pub use crate::web;
}

pub use normlink_backend as backend;
pub use normlink_core as core;
#[cfg(feature = "runtime")]
pub use normlink_runtime as runtime;
#[cfg(feature = "web")]
pub use normlink_web as web;
