//! # PortRun
//!
//! Hosts stateful pub/sub client sessions in a background context and drives
//! them from any number of callers over channels that carry only `Message`
//! values.
//!
//! ## Background side
//!
//! - `Worker` accepts channels and pumps each one through the `Router`.
//! - `Router` turns a message into a call on the channel's session, and turns
//!   the caller's correlation id back into a completion.
//! - `Registry` binds each channel to at most one `Session`.
//! - `Forwarder` sends a session's client events out on its channel.
//!
//! ## Calling side
//!
//! - `Client` connects over a `Transport` and exposes the operations as
//!   futures, or with completion callbacks via the `_with` methods.
//!
//! The pub/sub protocol itself stays behind `PubSubClient` and
//! `ClientFactory`.

pub mod caller;
pub mod channel;
pub mod client;
pub mod forwarder;
pub mod handles;
pub mod registry;
pub mod router;
pub mod transport;
pub mod worker;

pub use caller::CallbackEncoding;
pub use caller::Client;
pub use caller::ClientConfig;
pub use caller::Event;
pub use channel::LocalChannel;
pub use client::ClientFactory;
pub use client::Completion;
pub use client::Listener;
pub use client::PubSubClient;
pub use forwarder::Forwarder;
pub use handles::Channel;
pub use handles::ChannelId;
pub use registry::Registry;
pub use registry::Session;
pub use router::Router;
pub use transport::Transport;
pub use worker::Worker;
pub use worker::WorkerConfig;
