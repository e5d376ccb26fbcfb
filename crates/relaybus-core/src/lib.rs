//! # RelayBus Core
//!
//! Core types for RelayBus: scoped event dispatch with once, sticky and
//! thread-affinity delivery, the wire envelope, and the interface remote
//! transports implement.

pub mod affinity;
pub mod envelope;
pub mod error;
pub mod event_bus;
pub mod remote;
pub mod types;

pub use affinity::{AffinityDispatcher, ManualDispatcher, ThreadDispatcher};
pub use envelope::Envelope;
pub use error::{CodecError, DispatchError, Error, Result, TransportError};
pub use event_bus::{
    BusEvent, EventBus, EventBusConfig, EventScope, HandlerPanic, SubscribeOptions, Subscription,
    SubscriptionId, UnsubscribeToken, DEFAULT_SCOPE,
};
pub use remote::{RemoteTransport, Role};

// Re-export type aliases for convenience
pub use types::{
    event_args_from, handler, no_args, AffinityJob, EventArgs, EventHandler, InboundCallback,
    PanicHook,
};
