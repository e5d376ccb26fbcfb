//! # Event Bus Module
//!
//! Scoped publish/subscribe for decoupled communication between components.
//!
//! ## Overview
//!
//! - An [`EventBus`] holds named [`EventScope`]s, created on first use.
//! - Each scope keeps an ordered subscriber list and the last published
//!   arguments (the sticky value) per event name.
//! - Subscriptions may fire once, replay the sticky value on subscribe, or
//!   run on a designated affinity thread.
//! - A remote transport, when enabled, carries events to other processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaybus_core::{event_args, EventBus, SubscribeOptions};
//!
//! let bus = EventBus::new();
//! let token = bus.default_scope().subscribe(
//!     "file.saved",
//!     SubscribeOptions::new().sticky(),
//!     |args| println!("saved {:?}", args),
//! );
//!
//! bus.publish("file.saved", event_args!["notes.txt"]);
//! token.unsubscribe();
//! ```

mod bus;
mod events;
mod scope;
mod subscription;

pub use bus::*;
pub use events::*;
pub use scope::*;
pub use subscription::*;
