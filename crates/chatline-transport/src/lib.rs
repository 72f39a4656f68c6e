//! Transport layer for chat surfaces.
//!
//! Provides:
//! - Wire protocol (tagged JSON)
//! - Connection bridge keeping a surface in sync with the store
//! - WebSocket transport (feature: websocket)

pub mod bridge;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use bridge::{ChatBackend, ChatLink, SendError};
pub use protocol::{ClientMessage, ServerMessage};
