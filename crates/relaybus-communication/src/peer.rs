//! Peer role
//!
//! A peer keeps one long-lived receiver connection to the hub and
//! reconnects after a fixed delay whenever it drops. Outbound frames do not
//! use that connection: each one goes over its own short-lived connection,
//! retried a bounded number of times before it is dropped.

use relaybus_core::TransportError;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::bridge::{read_frames, BridgeShared};
use crate::queue::Frame;
use crate::role::probe;

/// Keep a receiver connection to the hub until the bridge is cancelled
///
/// `first` is the connection left over from role election.
pub(crate) async fn receive_loop(shared: Arc<BridgeShared>, first: TcpStream) {
    let mut next = Some(first);

    loop {
        let stream = match next.take() {
            Some(stream) => Some(stream),
            None => match probe(&shared.config).await {
                Ok(stream) => {
                    tracing::info!("Reconnected to hub at {}", shared.config.address);
                    Some(stream)
                }
                Err(e) => {
                    tracing::debug!("Hub at {} unreachable: {}", shared.config.address, e);
                    None
                }
            },
        };

        if let Some(mut stream) = stream {
            let max = shared.config.max_frame_bytes;
            let result = tokio::select! {
                _ = shared.cancel.cancelled() => break,
                result = read_frames(&mut stream, max, |line| {
                    if let Some(envelope) = shared.decode(&line) {
                        shared.deliver(envelope);
                    }
                }) => result,
            };
            match result {
                Ok(()) => tracing::warn!("Hub at {} closed the connection", shared.config.address),
                Err(e) => tracing::warn!("Receiver connection lost: {}", e),
            }
        }

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }
    }
    tracing::debug!("Receiver loop stopped");
}

/// Send one frame to the hub, retrying on failure
///
/// Returns `false` when every attempt failed and the frame was dropped, or
/// the bridge was cancelled while waiting to retry.
pub(crate) async fn send_with_retry(shared: &BridgeShared, frame: &Frame) -> bool {
    let attempts = shared.config.send_retries.max(1);

    for attempt in 1..=attempts {
        match send_once(shared, frame).await {
            Ok(()) => return true,
            Err(e) => {
                tracing::debug!("Send attempt {}/{} failed: {}", attempt, attempts, e);
            }
        }
        if attempt < attempts {
            tokio::select! {
                _ = shared.cancel.cancelled() => return false,
                _ = tokio::time::sleep(shared.config.send_retry_delay) => {}
            }
        }
    }

    tracing::error!(
        "Dropping frame for {} after {} failed attempts",
        shared.config.address,
        attempts
    );
    false
}

async fn send_once(shared: &BridgeShared, frame: &Frame) -> Result<(), TransportError> {
    let mut stream = probe(&shared.config).await?;
    stream.set_nodelay(true)?;
    stream.write_all(frame.as_bytes()).await?;
    stream.flush().await?;
    tokio::time::sleep(shared.config.send_linger).await;
    stream.shutdown().await?;
    Ok(())
}
