//! Enabling the TCP bridge on an event bus

use async_trait::async_trait;
use relaybus_core::{EventBus, RemoteTransport, Result};
use std::sync::Arc;

use crate::address::BridgeAddress;
use crate::bridge::{BridgeConfig, TransportBridge};

/// Adds `enable_remote` to a shared [`EventBus`]
#[async_trait]
pub trait RemoteExt {
    /// Start a bridge on `address` with default settings, once
    ///
    /// Later calls return the transport installed by the first one.
    async fn enable_remote(&self, address: &str) -> Result<Arc<dyn RemoteTransport>>;

    /// Start a bridge with explicit settings, once
    async fn enable_remote_with_config(
        &self,
        config: BridgeConfig,
    ) -> Result<Arc<dyn RemoteTransport>>;
}

#[async_trait]
impl RemoteExt for Arc<EventBus> {
    async fn enable_remote(&self, address: &str) -> Result<Arc<dyn RemoteTransport>> {
        self.enable_remote_with_config(BridgeConfig::new(BridgeAddress::parse(address)))
            .await
    }

    async fn enable_remote_with_config(
        &self,
        config: BridgeConfig,
    ) -> Result<Arc<dyn RemoteTransport>> {
        self.enable_remote_with(move |inbound| async move {
            let bridge = TransportBridge::start(config, inbound).await?;
            Ok(bridge as Arc<dyn RemoteTransport>)
        })
        .await
    }
}
