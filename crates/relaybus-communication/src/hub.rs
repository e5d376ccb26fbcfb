//! Hub role
//!
//! The hub accepts every connection on the rendezvous address. Each frame
//! read from a connection is delivered locally and relayed, byte for byte,
//! to every other live connection. There is one hop only: peers never
//! forward what they receive.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::bridge::{read_frames, BridgeShared};
use crate::queue::Frame;

/// Frames buffered per connection before relay starts dropping for it
pub const PEER_CHANNEL_CAPACITY: usize = 256;

/// Identifier of one accepted connection
pub type PeerId = u64;

/// Live connections of a hub
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: Mutex<HashMap<PeerId, mpsc::Sender<Frame>>>,
    next_id: AtomicU64,
}

impl PeerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving end of its writer
    pub fn insert(&self) -> (PeerId, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(PEER_CHANNEL_CAPACITY);
        self.peers.lock().insert(id, tx);
        (id, rx)
    }

    /// Forget a connection
    pub fn remove(&self, id: PeerId) -> bool {
        self.peers.lock().remove(&id).is_some()
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Whether no connection is live
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Drop every connection
    ///
    /// Writers see their channel close and end their connection.
    pub fn clear(&self) -> usize {
        let mut peers = self.peers.lock();
        let count = peers.len();
        peers.clear();
        count
    }

    /// Hand `frame` to every connection except `except`
    ///
    /// Best effort: a connection whose channel is full or closed is
    /// skipped. Returns how many connections accepted the frame.
    pub fn send_all(&self, frame: &Frame, except: Option<PeerId>) -> usize {
        let targets: Vec<(PeerId, mpsc::Sender<Frame>)> = self
            .peers
            .lock()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut sent = 0;
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(frame)) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Peer {} is not keeping up, frame dropped", id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Peer {} already gone", id);
                }
            }
        }
        sent
    }
}

/// Accept connections until the bridge is cancelled
pub(crate) async fn accept_loop(shared: Arc<BridgeShared>, listener: TcpListener) {
    loop {
        let accepted = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("set_nodelay failed for {}: {}", remote, e);
                }
                let (id, rx) = shared.peers.insert();
                tracing::debug!("Peer {} connected from {}", id, remote);
                shared
                    .tasks
                    .spawn(serve_peer(Arc::clone(&shared), stream, remote, id, rx));
            }
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
                }
            }
        }
    }
    tracing::debug!("Accept loop stopped");
}

async fn serve_peer(
    shared: Arc<BridgeShared>,
    stream: TcpStream,
    remote: SocketAddr,
    id: PeerId,
    mut rx: mpsc::Receiver<Frame>,
) {
    let (mut reader, mut writer) = stream.into_split();

    let writing = async {
        while let Some(frame) = rx.recv().await {
            writer.write_all(frame.as_bytes()).await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let reading = read_frames(&mut reader, shared.config.max_frame_bytes, |line| {
        relay(&shared, id, line)
    });

    tokio::select! {
        _ = shared.cancel.cancelled() => {}
        result = writing => {
            if let Err(e) = result {
                tracing::debug!("Write to peer {} ({}) failed: {}", id, remote, e);
            }
        }
        result = reading => match result {
            Ok(()) => tracing::debug!("Peer {} ({}) disconnected", id, remote),
            Err(e) => tracing::warn!("Closing peer {} ({}): {}", id, remote, e),
        },
    }

    shared.peers.remove(id);
}

fn relay(shared: &BridgeShared, from: PeerId, line: String) {
    let Some(envelope) = shared.decode(&line) else {
        return;
    };

    let mut frame = line;
    frame.push('\n');
    let frame: Frame = Arc::from(frame);
    let relayed = shared.peers.send_all(&frame, Some(from));
    tracing::trace!(
        "Relayed '{}' from peer {} to {} peers",
        envelope.message_name,
        from,
        relayed
    );

    shared.deliver(envelope);
}
