//! Remote transport interface
//!
//! The bus does not know how envelopes leave the process. A transport
//! implements [`RemoteTransport`] and is installed once with
//! [`EventBus::enable_remote_with`](crate::EventBus::enable_remote_with).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::Result;

/// Role of a bridge in the hub/peer topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Negotiation has not finished.
    Undecided,
    /// Listening for peers and relaying between them.
    Hub,
    /// Connected to a hub.
    Peer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undecided => write!(f, "undecided"),
            Self::Hub => write!(f, "hub"),
            Self::Peer => write!(f, "peer"),
        }
    }
}

/// Outbound side of a cross-process bridge
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Queue an envelope for sending without waiting
    fn broadcast(&self, envelope: &Envelope) -> Result<()>;

    /// Queue an envelope, waiting for queue space if the transport blocks
    async fn broadcast_async(&self, envelope: &Envelope) -> Result<()>;

    /// Role this transport negotiated
    fn role(&self) -> Role;

    /// Human readable endpoint, for logs
    fn endpoint(&self) -> String;

    /// Stop every background task and wait for them to finish
    async fn shutdown(&self);
}
