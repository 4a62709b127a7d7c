//! # tutorline-protocol
//!
//! Wire protocol definitions for the Tutorline chat hub.
//!
//! Frames travel as JSON text over a WebSocket, internally tagged by a
//! `"type"` field.
//!
//! ## Frame Types
//!
//! - `send` / `ping` - Client to server
//! - `connected` / `message` / `error` / `pong` - Server to client
//!
//! ## Example
//!
//! ```rust
//! use tutorline_protocol::{codec, ClientFrame, RoomId};
//!
//! let frame = codec::decode(r#"{"type":"send","room_id":7,"content":"hi"}"#).unwrap();
//! assert_eq!(frame, ClientFrame::send_to_room(RoomId(7), "hi"));
//! ```

pub mod codec;
pub mod frames;
pub mod ids;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{ChatMessage, ClientFrame, ErrorCode, ServerFrame};
pub use ids::{MessageId, Role, RoomId, UserId};

/// Protocol version announced in the `connected` frame.
pub const PROTOCOL_VERSION: &str = "1.0";
