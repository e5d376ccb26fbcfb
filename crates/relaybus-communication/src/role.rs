//! Hub/peer role election
//!
//! Every bridge configured with the same address runs the same election:
//! probe the address, join as a peer if something answers, otherwise bind
//! and become the hub. Two processes can probe inside the same window and
//! both try to bind; the loser backs off for a random interval and probes
//! again, by which time the winner is usually listening.

use rand::Rng;
use relaybus_core::{Role, TransportError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

use crate::bridge::BridgeConfig;

const UNDECIDED: u8 = 0;
const HUB: u8 = 1;
const PEER: u8 = 2;

/// Role that can be decided exactly once
#[derive(Debug, Default)]
pub struct RoleCell(AtomicU8);

impl RoleCell {
    /// Create an undecided cell
    pub fn new() -> Self {
        Self(AtomicU8::new(UNDECIDED))
    }

    /// Current role
    pub fn get(&self) -> Role {
        match self.0.load(Ordering::Acquire) {
            HUB => Role::Hub,
            PEER => Role::Peer,
            _ => Role::Undecided,
        }
    }

    /// Leave `Undecided` for `role`
    ///
    /// Fails if a role was already decided or `role` is `Undecided`.
    pub fn decide(&self, role: Role) -> Result<(), TransportError> {
        let value = match role {
            Role::Hub => HUB,
            Role::Peer => PEER,
            Role::Undecided => {
                return Err(TransportError::RoleAlreadyDecided {
                    current: self.get().to_string(),
                })
            }
        };
        self.0
            .compare_exchange(UNDECIDED, value, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| TransportError::RoleAlreadyDecided {
                current: self.get().to_string(),
            })
    }
}

/// Outcome of an election
#[derive(Debug)]
pub enum Negotiated {
    /// Nobody answered and the address is now ours.
    Hub(TcpListener),
    /// A hub answered; the probe connection becomes the receiver link.
    Peer(TcpStream),
}

impl Negotiated {
    /// Role this outcome stands for
    pub fn role(&self) -> Role {
        match self {
            Self::Hub(_) => Role::Hub,
            Self::Peer(_) => Role::Peer,
        }
    }
}

/// Connect to the configured address within the probe timeout
pub async fn probe(config: &BridgeConfig) -> Result<TcpStream, TransportError> {
    match tokio::time::timeout(
        config.probe_timeout,
        TcpStream::connect(config.address.socket_pair()),
    )
    .await
    {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(TransportError::Io(err)),
        Err(_) => Err(TransportError::ConnectionTimeout {
            address: config.address.to_string(),
            timeout_ms: config.probe_timeout.as_millis() as u64,
        }),
    }
}

/// Decide this process's role for the configured address
pub async fn negotiate(config: &BridgeConfig) -> Result<Negotiated, TransportError> {
    let attempts = config.bind_attempts.max(1);
    let mut reason = String::new();

    for attempt in 1..=attempts {
        match probe(config).await {
            Ok(stream) => {
                tracing::debug!("Hub answered at {}", config.address);
                return Ok(Negotiated::Peer(stream));
            }
            Err(err) => tracing::debug!("Probe of {} failed: {}", config.address, err),
        }

        match TcpListener::bind(config.address.socket_pair()).await {
            Ok(listener) => return Ok(Negotiated::Hub(listener)),
            Err(err) => {
                tracing::warn!(
                    "Bind attempt {}/{} on {} failed: {}",
                    attempt,
                    attempts,
                    config.address,
                    err
                );
                reason = err.to_string();
            }
        }

        if attempt < attempts {
            tokio::time::sleep(backoff(config.bind_backoff_max)).await;
        }
    }

    Err(TransportError::BindFailed {
        address: config.address.to_string(),
        attempts,
        reason,
    })
}

fn backoff(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
