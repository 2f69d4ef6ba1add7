#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! Client side of a tendj chat session.
//!
//! [`reconcile`] keeps the visible transcript consistent while optimistic
//! echoes, streamed fragments, and authoritative snapshots arrive;
//! [`controller::ChatController`] wires it to a [`backend::ChatBackend`], the
//! conversation selector, and the push channel.

pub mod backend;
pub mod controller;
pub mod push;
pub mod reconcile;
pub mod storage;

pub use backend::{BackendError, ChatBackend, http::HttpBackend};
pub use controller::{ChatController, LoadOutcome, PendingSend, PushOutcome, SubmitOutcome};
pub use push::{PushChannel, PushError};
pub use reconcile::{Reconciler, SignalSink, ViewSignal};
pub use storage::{FileStore, KeyValueStore, MemoryStore, Session, SessionStore, StorageError};
