//! Session lifecycle
//!
//! The authentication layer publishes sign-on/sign-off events on a
//! [`SessionEventBus`]. Interested components subscribe with a
//! [`SessionListenerHandle`] whose lifetime scopes the subscription.
//!
//! # Example
//!
//! ```ignore
//! use clusterlock_core::domain::session::{SessionEventBus, SessionLifecycleEvent};
//!
//! let bus = SessionEventBus::new();
//! let listener = lock_service.start_session_listener(&bus);
//!
//! // On logout
//! bus.publish(SessionLifecycleEvent::signed_off(identity));
//!
//! // On shutdown
//! listener.stop().await;
//! ```

pub mod bus;
pub mod event;
pub mod listener;

pub use bus::SessionEventBus;
pub use event::SessionLifecycleEvent;
pub use listener::{SessionLifecycleHandler, SessionListenerHandle};
