//! # RelayBus Communication
//!
//! TCP bridge carrying RelayBus envelopes between processes.
//! Every process configured with the same address runs the same code: the
//! first one to find the address free becomes the hub, the rest connect
//! to it as peers. Frames are newline-terminated JSON envelopes.

pub mod address;
pub mod bridge;
pub mod framing;
pub mod hub;
pub mod peer;
pub mod queue;
pub mod remote_ext;
pub mod role;

pub use address::{BridgeAddress, DEFAULT_HOST, DEFAULT_PORT};
pub use bridge::{BridgeConfig, TransportBridge};
pub use framing::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES, FRAME_DELIMITER};
pub use hub::PeerSet;
pub use queue::{OutboundQueue, OverflowPolicy};
pub use remote_ext::RemoteExt;
pub use role::{Negotiated, RoleCell};
