//! # RelayBus
//!
//! A process-local publish/subscribe event bus with:
//! - Named scopes, each with its own subscribers and sticky cache
//! - Once, sticky and thread-affinity subscriptions
//! - An optional TCP bridge that carries events between processes
//!
//! ## Architecture
//!
//! RelayBus is organized as a workspace with multiple crates:
//!
//! 1. **relaybus-core** - Event scopes, the bus registry, envelope, errors
//! 2. **relaybus-communication** - Hub/peer election, framing, relay, reconnect
//! 3. **relaybus-settings** - Configuration files and validation
//! 4. **relaybus** - This crate and the `relaybus` node binary
//!
//! ## Example
//!
//! ```no_run
//! use relaybus::{event_args, EventBus, RemoteExt};
//! use std::sync::Arc;
//!
//! # async fn run() -> relaybus::Result<()> {
//! let bus = Arc::new(EventBus::new());
//! bus.default_scope().on("job.done", |args| println!("done: {:?}", args));
//! bus.enable_remote("127.0.0.1:47800").await?;
//! bus.publish_all("job.done", event_args!["job-42"])?;
//! # Ok(())
//! # }
//! ```

pub use relaybus_core::{
    event_args, event_args_from, handler, no_args, AffinityDispatcher, BusEvent, CodecError,
    DispatchError, Envelope, Error, EventArgs, EventBus, EventBusConfig, EventHandler, EventScope,
    HandlerPanic, ManualDispatcher, RemoteTransport, Result, Role, SubscribeOptions,
    SubscriptionId, ThreadDispatcher, TransportError, UnsubscribeToken, DEFAULT_SCOPE,
};

pub use relaybus_communication::{
    BridgeAddress, BridgeConfig, OverflowPolicy, RemoteExt, TransportBridge, DEFAULT_PORT,
};

pub use relaybus_settings::{BridgeSettings, Config, DispatchSettings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty formatted output on stderr, keeping stdout for program output
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
