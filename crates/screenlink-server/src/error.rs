//! Error types for client sessions and server lifecycle.
//!
//! Sessions escape nested I/O with explicit results rather than unwinding:
//! the session top level matches on the error kind to choose its
//! write-then-close response (`EBAD`, `EICV`, `EBSY`, `EUNK`, or silence).

use thiserror::Error;

use screenlink_core::ProtocolError;

/// Everything that can end a client session or fail server startup.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad framing, oversize frame, or unknown command from the peer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The socket failed or the peer hung up mid-conversation.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was cancelled; the normal shutdown path.
    #[error("session cancelled")]
    Cancelled,

    /// The client violated the protocol state machine.
    #[error("protocol error from client: {0}")]
    BadClient(String),

    /// The client speaks a protocol version this server cannot serve.
    #[error("incompatible client version {major}.{minor}")]
    IncompatibleClient { major: i16, minor: i16 },

    /// A client with the same canonical name is already connected.
    #[error("a client named \"{0}\" is already connected")]
    DuplicateClient(String),

    /// The client's name is not in the screen map.
    #[error("screen name \"{0}\" is not in the map")]
    UnknownClient(String),

    /// The listen address could not be bound within the bind timeout.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The primary screen driver failed to open.  Fatal: the server cannot
    /// run without its own screen.
    #[error("cannot open primary screen: {0}")]
    ScreenOpen(String),
}
