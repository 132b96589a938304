//! # Pub/Sub Client Seam
//!
//! The background context does not speak the pub/sub protocol itself. It
//! drives an external client library through these two traits: a factory
//! that connects, and the connected client handle.
//!
//! Operations take their positional arguments exactly as they arrived from
//! the caller. Checking their types is the library's job. Where a caller
//! asked for completion, the callback that would be the trailing argument in
//! a dynamic language is passed separately as `done`.

use std::sync::Arc;

use portrpc::ClientEvent;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The library refused or failed to create a client.
    Connect(String),
    /// The background context already hosts as many sessions as allowed.
    Capacity(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "{}", msg),
            Self::Capacity(max) => write!(f, "session limit of {} reached", max),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Completion callback handed to an operation: `(err, result...)`.
///
/// `err` is `Value::Null` on success.
pub type Completion = Box<dyn FnOnce(Value, Vec<Value>) + Send + 'static>;

/// Event listener: receives the event's positional payload.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync + 'static>;

/// A connected pub/sub client.
///
/// Implementations may invoke completions and listeners from any task or
/// thread, synchronously or later.
pub trait PubSubClient: Send + Sync + 'static {
    /// The client's resolved configuration, sent back to the caller after connect.
    fn options(&self) -> Value;

    /// Registers a listener for one of the client's events.
    fn on(&self, event: ClientEvent, listener: Listener);

    /// `[topic, payload, opts?]`
    fn publish(&self, args: Vec<Value>, done: Option<Completion>);

    /// `[topic, opts?]`
    fn subscribe(&self, args: Vec<Value>, done: Option<Completion>);

    /// `[topic]`
    fn unsubscribe(&self, args: Vec<Value>, done: Option<Completion>);

    /// `[force?]`
    fn end(&self, args: Vec<Value>, done: Option<Completion>);

    /// `[n]`
    fn set_max_listeners(&self, args: Vec<Value>);
}

/// Creates clients, i.e. the library's `connect(opts)` entry point.
pub trait ClientFactory: Send + Sync + 'static {
    /// Connects a new client.
    ///
    /// `page` is the identifier of the page the caller runs in; libraries
    /// use it to derive a default broker address when `args` names none.
    fn connect(&self, args: Vec<Value>, page: Option<&str>) -> Result<Arc<dyn PubSubClient>>;
}
