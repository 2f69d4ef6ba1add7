//! # Configuration
//!
//! Client configuration: backend endpoints, session storage, chat behaviour,
//! and logging.

pub mod client;
