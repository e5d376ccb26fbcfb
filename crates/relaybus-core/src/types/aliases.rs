//! Type aliases for commonly used complex types.
//!
//! Handlers, hooks and argument vectors are passed across threads and stored
//! in several places at once, so they are all reference counted trait objects
//! or shared slices. Naming them keeps signatures readable.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaybus_core::types::*;
//!
//! let args: EventArgs = event_args!["job-42", 3];
//! let handler: EventHandler = handler(|args| println!("{:?}", args));
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::envelope::Envelope;
use crate::event_bus::HandlerPanic;

// =============================================================================
// EVENT PAYLOADS
// =============================================================================

/// An immutable, cheaply clonable argument vector.
///
/// The same allocation is shared by the sticky cache, every dispatch snapshot
/// and any affinity job that still has to run.
pub type EventArgs = Arc<[Value]>;

/// Build an [`EventArgs`] from any iterator of JSON values.
#[inline]
pub fn event_args_from<I>(values: I) -> EventArgs
where
    I: IntoIterator<Item = Value>,
{
    values.into_iter().collect::<Vec<_>>().into()
}

/// An empty argument vector.
#[inline]
pub fn no_args() -> EventArgs {
    Arc::from(Vec::new())
}

/// Build an [`EventArgs`] from a list of `serde_json::json!` compatible expressions.
///
/// ```rust,ignore
/// let args = event_args!["port", 8080, { "retry": true }];
/// ```
#[macro_export]
macro_rules! event_args {
    () => {
        $crate::types::no_args()
    };
    ($($value:tt),+ $(,)?) => {
        $crate::types::event_args_from(vec![$(::serde_json::json!($value)),+])
    };
}

// =============================================================================
// CALLBACK TYPES
// =============================================================================

/// A subscriber callback receiving the published arguments.
///
/// Thread-safe, invoked on the publisher's thread or on the affinity thread.
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Diagnostic callback invoked when a subscriber panics.
pub type PanicHook = Arc<dyn Fn(&HandlerPanic) + Send + Sync>;

/// A unit of work handed to an affinity dispatcher.
pub type AffinityJob = Box<dyn FnOnce() + Send + 'static>;

/// Callback receiving envelopes decoded by a remote transport.
pub type InboundCallback = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Wrap a closure as an [`EventHandler`].
#[inline]
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&[Value]) + Send + Sync + 'static,
{
    Arc::new(f)
}
