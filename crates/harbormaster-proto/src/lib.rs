//! Edge Protocol Definitions
//!
//! This crate defines the control messages exchanged between the management
//! server and edge agents, plus the framing codec used on control streams.

pub mod codec;
pub mod messages;

pub use codec::{CodecError, EdgeCodec};
pub use messages::{AgentMetadata, EdgeMessage};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame size (16MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Reserved stream ID for control messages
pub const CONTROL_STREAM_ID: u32 = 0;
