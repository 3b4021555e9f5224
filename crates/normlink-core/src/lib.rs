#![forbid(unsafe_code)]

//! Core: document model, selector matching, events, and handler values.
//!
//! # Role in normlink
//! `normlink-core` is the vocabulary layer. It owns the arena [`dom::Document`]
//! the engine rewrites, the [`handler::Handler`] values applications register,
//! and the [`handler::Navigator`] primitive those handlers reach for when they
//! want to leave the page.
//!
//! # Primary responsibilities
//! - **Document**: nodes, ordered attributes, inline click slots, attribute locks.
//! - **Selectors**: the compound subset the discovery sweep needs.
//! - **Event**: click-equivalent and lifecycle event values with propagation flags.
//! - **Handler**: callbacks (plain or handle-event objects) plus their source text.
//!
//! # How it fits in the system
//! `normlink-backend` builds the capability traits on top of these types,
//! `normlink-runtime` implements interception against those traits, and
//! `normlink-web` provides a deterministic in-memory page to run it all.

pub mod dom;
pub mod event;
pub mod handler;
pub mod selector;

pub use dom::{Attribute, Document, DomError, NodeId};
pub use event::{Event, EventPhase, EventType, ListenerOptions, ListenerTarget};
pub use handler::{
    CallScope, EventListenerObject, Handler, HandlerError, HandlerId, HandlerResult, Navigator,
    WindowHandle,
};
pub use selector::{SelectorError, SelectorList};
