//! # tutorline-transport
//!
//! Transport abstraction layer for the Tutorline chat hub.
//!
//! A live client link is split into two halves so that a connection's read
//! loop and write loop can run as independent tasks:
//!
//! - [`FrameStream`] - inbound half, yields decoded client frames
//! - [`FrameSink`] - outbound half, sends server frames, pings and the final close
//!
//! Implementations:
//!
//! - **WebSocket** - axum's upgraded socket (feature `websocket`, on by default)
//! - **Memory** - an in-process pair used to drive sessions in tests
//!
//! ```rust,ignore
//! use tutorline_transport::{FrameStream, Incoming};
//!
//! async fn drain(mut stream: impl FrameStream) {
//!     while let Ok(Some(incoming)) = stream.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{CloseReason, ConnectionId, FrameSink, FrameStream, Incoming, TransportError};
