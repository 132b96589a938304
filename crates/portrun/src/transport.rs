//! # Transport Abstraction
//!
//! A minimal, async interface for moving whole messages between a caller and
//! the background context.
//!
//! ## Philosophy
//!
//! - **Structured, not callable**: a transport carries `Message` values and
//!   nothing else. Whatever cannot be expressed as data does not cross.
//! - **Fire-and-forget sends**: `post` never waits for the peer, like a
//!   `postMessage`. Replies, if any, show up later on `recv`.

use std::fmt;

use portrpc::Message;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is gone or the channel was closed.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// One end of a message channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a message for the peer without waiting.
    ///
    /// # invariants
    /// - Messages posted from one end arrive at the other in posting order.
    /// - Must return `Err` once the peer can no longer receive.
    fn post(&self, message: Message) -> Result<()>;

    /// Waits for the next message from the peer.
    ///
    /// Returns `Ok(None)` once the peer has closed its sending side.
    async fn recv(&self) -> Result<Option<Message>>;

    /// Stops sending; the peer's `recv` drains what was queued, then sees `None`.
    fn close(&self) {}
}
