//! Domain layer
//!
//! Contains the locking model, its events, and the session lifecycle it
//! reacts to.

pub mod events;
pub mod locking;
pub mod session;
