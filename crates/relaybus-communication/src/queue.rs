//! Bounded outbound queue
//!
//! Serialized frames wait here for the bridge's single sender task, which
//! keeps this process's outbound frames in enqueue order. The capacity and
//! [`OverflowPolicy`] decide what happens while the sender cannot keep up.

use parking_lot::Mutex;
use relaybus_core::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// What to do with a frame when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for space. Only async pushes wait; sync pushes are rejected.
    Block,
    /// Evict the oldest queued frame.
    #[default]
    DropOldest,
    /// Refuse the new frame.
    Reject,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::DropOldest => write!(f, "drop_oldest"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// One encoded frame, terminator included
pub type Frame = Arc<str>;

/// FIFO of encoded frames with a fixed capacity
#[derive(Debug)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<Frame>>,
    capacity: usize,
    policy: OverflowPolicy,
    available: Notify,
    space: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` frames
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            policy,
            available: Notify::new(),
            space: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Frames waiting to be sent
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no frames are waiting
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Maximum number of queued frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured overflow policy
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Frames evicted or refused so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a frame without waiting
    pub fn push(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        items.pop_front();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            "Outbound queue full ({}), dropped oldest frame",
                            self.capacity
                        );
                    }
                    OverflowPolicy::Block | OverflowPolicy::Reject => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return Err(TransportError::QueueFull {
                            capacity: self.capacity,
                        });
                    }
                }
            }
            items.push_back(frame);
        }

        self.available.notify_one();
        Ok(())
    }

    /// Queue a frame, waiting for space under [`OverflowPolicy::Block`]
    pub async fn push_wait(&self, frame: Frame) -> Result<(), TransportError> {
        if self.policy != OverflowPolicy::Block {
            return self.push(frame);
        }

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }

            let space = self.space.notified();
            {
                let mut items = self.items.lock();
                if items.len() < self.capacity {
                    items.push_back(frame);
                    drop(items);
                    self.available.notify_one();
                    return Ok(());
                }
            }
            space.await;
        }
    }

    /// Wait for the next frame
    ///
    /// Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            let next = self.items.lock().pop_front();
            if let Some(frame) = next {
                self.space.notify_one();
                return Some(frame);
            }
            self.available.notified().await;
        }
    }

    /// Refuse new frames and wake every waiter
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_waiters();
        self.available.notify_one();
        self.space.notify_waiters();
    }
}
