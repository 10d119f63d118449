//! # screenlink-core
//!
//! Shared library for screenlink containing the session wire protocol
//! (messages, binary codec, framing), the screen-map configuration model,
//! and the screen geometry types used by the server's switch engine.
//!
//! This crate has no dependency on OS input APIs or concrete sockets; frame
//! I/O is written against `tokio::io` traits so it works over TCP streams,
//! in-memory duplex pipes in tests, or any other byte stream.

pub mod domain;
pub mod protocol;

/// Re-export commonly used types at the crate root for convenience.
pub use domain::config::{ConfigError, Direction, ScreenConfig};
pub use domain::screen::{ClientInfo, ScreenShape};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{ClipboardId, Message};
pub use protocol::sequence::SequenceCounter;
