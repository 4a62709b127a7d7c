//! Codec for encoding and decoding Tutorline frames.
//!
//! Frames are JSON documents carried in WebSocket text messages, so no
//! length prefix is needed; the transport delimits them.

use thiserror::Error;

use crate::frames::{ClientFrame, ServerFrame};

/// Maximum frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a server frame to a JSON string.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &ServerFrame) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(frame)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode a client frame from a JSON string.
///
/// # Errors
///
/// Returns an error if the data is too large or not a valid frame.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    decode_with_limit(text, MAX_FRAME_SIZE)
}

/// Decode a client frame, enforcing a caller-supplied size limit.
///
/// # Errors
///
/// Returns an error if the data exceeds `limit` or is not a valid frame.
pub fn decode_with_limit(text: &str, limit: usize) -> Result<ClientFrame, ProtocolError> {
    if text.len() > limit {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(serde_json::from_str(text)?)
}

/// Decode a server frame. Used by clients and tests.
///
/// # Errors
///
/// Returns an error if the data is not a valid server frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
