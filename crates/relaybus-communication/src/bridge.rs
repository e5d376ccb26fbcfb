//! Transport bridge
//!
//! Carries envelopes between processes that share one rendezvous address.
//! On start the bridge elects itself hub or peer (see [`crate::role`]),
//! then runs these tasks under one cancellation token:
//!
//! - hub: an accept loop and one task per connection
//! - peer: a receiver loop that reconnects after failures
//! - both: a single sender draining the outbound queue in order
//!
//! Inbound envelopes go to the callback given at start, normally
//! [`EventBus::inbound_callback`](relaybus_core::EventBus::inbound_callback).

use async_trait::async_trait;
use relaybus_core::{Envelope, InboundCallback, RemoteTransport, Role, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::address::BridgeAddress;
use crate::framing::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES};
use crate::hub::{self, PeerSet};
use crate::peer;
use crate::queue::{Frame, OutboundQueue, OverflowPolicy};
use crate::role::{self, Negotiated, RoleCell};

const READ_CHUNK: usize = 8 * 1024;

/// Configuration for a transport bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Rendezvous address shared by every participating process
    pub address: BridgeAddress,
    /// How long to wait for the hub to answer a connection attempt
    pub probe_timeout: Duration,
    /// Pause between receiver reconnect attempts
    pub reconnect_delay: Duration,
    /// Attempts per outbound frame in the peer role
    pub send_retries: u32,
    /// Pause between send attempts
    pub send_retry_delay: Duration,
    /// How long a send connection stays open after the flush
    pub send_linger: Duration,
    /// Maximum frames waiting in the outbound queue
    pub queue_capacity: usize,
    /// What to do when the outbound queue is full
    pub overflow_policy: OverflowPolicy,
    /// Longest frame accepted from a connection
    pub max_frame_bytes: usize,
    /// Probe-then-bind rounds before election gives up
    pub bind_attempts: u32,
    /// Upper bound of the random pause after a failed bind
    pub bind_backoff_max: Duration,
}

impl BridgeConfig {
    /// Default settings for `address`
    pub fn new(address: impl Into<BridgeAddress>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: BridgeAddress::default(),
            probe_timeout: Duration::from_millis(500),
            reconnect_delay: Duration::from_millis(1000),
            send_retries: 3,
            send_retry_delay: Duration::from_millis(200),
            send_linger: Duration::from_millis(50),
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            bind_attempts: 3,
            bind_backoff_max: Duration::from_millis(250),
        }
    }
}

/// State shared by the bridge and its tasks
pub(crate) struct BridgeShared {
    pub(crate) config: BridgeConfig,
    pub(crate) role: RoleCell,
    pub(crate) node_id: String,
    pub(crate) inbound: InboundCallback,
    pub(crate) queue: OutboundQueue,
    pub(crate) peers: PeerSet,
    pub(crate) cancel: CancellationToken,
    pub(crate) tasks: TaskTracker,
}

impl BridgeShared {
    /// Decode one frame, logging and skipping malformed input
    pub(crate) fn decode(&self, line: &str) -> Option<Envelope> {
        match Envelope::decode(line) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!("Skipping malformed frame: {}", e);
                None
            }
        }
    }

    /// Hand an envelope to the local bus unless this bridge sent it
    pub(crate) fn deliver(&self, envelope: Envelope) {
        if envelope.is_from(&self.node_id) {
            tracing::trace!("Ignoring own '{}'", envelope.message_name);
            return;
        }
        (self.inbound)(envelope);
    }

    fn stamp(&self, envelope: &Envelope) -> Result<Frame, TransportError> {
        let envelope = envelope.clone().with_origin(self.node_id.clone());
        Ok(Arc::from(encode_frame(&envelope)?))
    }
}

/// Read frames from `reader` until EOF
///
/// Returns `Ok` on a clean close. Errors are socket failures or a frame
/// over `max_frame_bytes`; either way the connection should be dropped.
pub(crate) async fn read_frames<R, F>(
    reader: &mut R,
    max_frame_bytes: usize,
    mut on_frame: F,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut decoder = FrameDecoder::new(max_frame_bytes);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        for frame in decoder.push(&buf[..n])? {
            on_frame(frame);
        }
    }
}

/// Cross-process bridge for one event bus
pub struct TransportBridge {
    shared: Arc<BridgeShared>,
}

impl TransportBridge {
    /// Elect a role for `config.address` and start the bridge tasks
    pub async fn start(
        config: BridgeConfig,
        inbound: InboundCallback,
    ) -> Result<Arc<Self>, TransportError> {
        let negotiated = role::negotiate(&config).await?;

        let shared = Arc::new(BridgeShared {
            queue: OutboundQueue::new(config.queue_capacity, config.overflow_policy),
            config,
            role: RoleCell::new(),
            node_id: Uuid::new_v4().to_string(),
            inbound,
            peers: PeerSet::new(),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        shared.role.decide(negotiated.role())?;
        match negotiated {
            Negotiated::Hub(listener) => {
                tracing::info!("Bridge is hub on {}", shared.config.address);
                shared
                    .tasks
                    .spawn(hub::accept_loop(Arc::clone(&shared), listener));
            }
            Negotiated::Peer(stream) => {
                tracing::info!("Bridge is peer of hub at {}", shared.config.address);
                shared
                    .tasks
                    .spawn(peer::receive_loop(Arc::clone(&shared), stream));
            }
        }
        shared.tasks.spawn(send_loop(Arc::clone(&shared)));

        Ok(Arc::new(Self { shared }))
    }

    /// Role decided at start
    pub fn role(&self) -> Role {
        self.shared.role.get()
    }

    /// Rendezvous address
    pub fn address(&self) -> &BridgeAddress {
        &self.shared.config.address
    }

    /// Configuration the bridge runs with
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Identifier stamped on envelopes this bridge sends
    pub fn node_id(&self) -> &str {
        &self.shared.node_id
    }

    /// Live connections, hub role only
    pub fn peer_count(&self) -> usize {
        self.shared.peers.len()
    }

    /// Frames waiting to be sent
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Frames dropped by the overflow policy
    pub fn dropped(&self) -> u64 {
        self.shared.queue.dropped()
    }

    /// Close every accepted connection, hub role only
    ///
    /// Peers see the close and reconnect.
    pub fn disconnect_peers(&self) -> usize {
        let count = self.shared.peers.clear();
        if count > 0 {
            tracing::info!("Disconnected {} peers", count);
        }
        count
    }

    /// Serialize and queue an envelope without waiting
    pub fn broadcast(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = self.shared.stamp(envelope)?;
        self.shared.queue.push(frame)
    }

    /// Serialize and queue an envelope, waiting for space if the queue blocks
    pub async fn broadcast_async(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = self.shared.stamp(envelope)?;
        self.shared.queue.push_wait(frame).await
    }

    /// Whether shutdown has started
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Stop every task and wait for them to finish
    ///
    /// Frames still queued are discarded.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.queue.close();
        self.shared.peers.clear();
        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        tracing::info!("Bridge on {} shut down", self.shared.config.address);
    }
}

impl Drop for TransportBridge {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        self.shared.queue.close();
    }
}

impl std::fmt::Debug for TransportBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBridge")
            .field("address", &self.shared.config.address.to_string())
            .field("role", &self.role())
            .field("node_id", &self.shared.node_id)
            .field("peers", &self.peer_count())
            .field("queued", &self.queued())
            .finish()
    }
}

#[async_trait]
impl RemoteTransport for TransportBridge {
    fn broadcast(&self, envelope: &Envelope) -> relaybus_core::Result<()> {
        Ok(TransportBridge::broadcast(self, envelope)?)
    }

    async fn broadcast_async(&self, envelope: &Envelope) -> relaybus_core::Result<()> {
        Ok(TransportBridge::broadcast_async(self, envelope).await?)
    }

    fn role(&self) -> Role {
        TransportBridge::role(self)
    }

    fn endpoint(&self) -> String {
        self.shared.config.address.to_string()
    }

    async fn shutdown(&self) {
        TransportBridge::shutdown(self).await
    }
}

async fn send_loop(shared: Arc<BridgeShared>) {
    loop {
        let frame = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            frame = shared.queue.pop() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match shared.role.get() {
            Role::Hub => {
                let sent = shared.peers.send_all(&frame, None);
                tracing::trace!("Broadcast frame to {} peers", sent);
            }
            Role::Peer => {
                peer::send_with_retry(&shared, &frame).await;
            }
            Role::Undecided => {
                tracing::warn!("Frame dropped: bridge role undecided");
            }
        }
    }
    tracing::debug!("Sender loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.address.to_string(), "127.0.0.1:47800");
        assert_eq!(config.probe_timeout, Duration::from_millis(500));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.send_retries, 3);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_config_new_parses_address() {
        let config = BridgeConfig::new("9100");
        assert_eq!(config.address, BridgeAddress::localhost(9100));
        assert_eq!(config.queue_capacity, 1024);
    }

    #[tokio::test]
    async fn test_read_frames_until_eof() {
        let data: &[u8] = b"a\nb\nc";
        let mut reader = data;
        let mut seen = Vec::new();
        read_frames(&mut reader, 64, |line| seen.push(line)).await.unwrap();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_read_frames_rejects_oversize() {
        let data = vec![b'x'; 100];
        let mut reader = data.as_slice();
        let result = read_frames(&mut reader, 16, |_| {}).await;
        assert!(matches!(result, Err(TransportError::Codec(_))));
    }
}
