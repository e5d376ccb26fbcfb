//! Type system utilities and aliases.
//!
//! This module provides type aliases and helpers for the shared handler,
//! argument and callback types used throughout the bus.
//!
//! ## Modules
//!
//! - [`aliases`]: Aliases for event arguments, handlers, hooks and affinity jobs.

pub mod aliases;

pub use aliases::*;
