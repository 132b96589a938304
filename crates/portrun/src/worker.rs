//! # Background Worker
//!
//! The entry point of the background context. Owns the session registry and
//! the router, hands out channel identities, and runs one pump task per
//! attached channel.
//!
//! ## Ordering
//!
//! A pump takes one message, routes it to completion, and only then awaits
//! the next, so a channel's own calls reach its session in FIFO order. Pumps
//! of different channels interleave freely.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use portrpc::Message;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::client::ClientFactory;
use crate::handles::Channel;
use crate::handles::ChannelId;
use crate::registry::Registry;
use crate::router::Router;
use crate::transport::Transport;

/// Settings for a background worker.
#[derive(Clone, Debug, Default)]
pub struct WorkerConfig {
    /// Most channels that may hold a session at once; `None` is unbounded.
    pub max_sessions: Option<usize>,
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }
}

/// An open channel and the signal that stops its pump.
struct Attachment {
    channel: Channel,
    stop: Arc<Notify>,
}

/// The background context: routes every attached channel's messages to its session.
pub struct Worker {
    registry: Arc<Registry>,
    router: Arc<Router>,
    channels: Arc<DashMap<ChannelId, Attachment>>,
    next_channel_id: AtomicU64,
}

impl Worker {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_config(factory, WorkerConfig::default())
    }

    pub fn with_config(factory: Arc<dyn ClientFactory>, config: WorkerConfig) -> Self {
        let registry = Arc::new(Registry::new(factory).with_max_sessions(config.max_sessions));
        Self {
            router: Arc::new(Router::new(registry.clone())),
            registry,
            channels: Arc::new(DashMap::new()),
            next_channel_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Registers a channel without starting a pump.
    ///
    /// For hosts that deliver inbound messages themselves through `route`.
    pub fn open(&self, transport: Arc<dyn Transport>) -> Channel {
        self.open_attachment(self.next_id(), transport).0
    }

    fn open_attachment(&self, id: ChannelId, transport: Arc<dyn Transport>) -> (Channel, Arc<Notify>) {
        let channel = Channel::new(id, transport);
        let stop = Arc::new(Notify::new());
        self.channels.insert(id, Attachment { channel: channel.clone(), stop: stop.clone() });
        tracing::debug!(channel = %id, "channel opened");
        (channel, stop)
    }

    fn next_id(&self) -> ChannelId {
        ChannelId(self.next_channel_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a channel and spawns the pump that serves it.
    ///
    /// The pump ends when the caller closes its side or `close` is called,
    /// tearing the channel's session down and closing the channel on the way out.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> (ChannelId, JoinHandle<()>) {
        let (channel, stop) = self.open_attachment(self.next_id(), transport);
        let id = channel.id();

        let router = self.router.clone();
        let channels = self.channels.clone();

        let pump = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = stop.notified() => break,
                    received = channel.transport().recv() => received,
                };
                match received {
                    Ok(Some(message)) => router.route(&channel, message),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(channel = %channel.id(), error = %e, "transport error in pump");
                        break;
                    }
                }
            }

            // also undoes a connect routed while `close` was running
            channels.remove(&channel.id());
            router.registry().teardown(channel.id());
            channel.transport().close();
            tracing::debug!(channel = %channel.id(), "channel closed");
        });

        (id, pump)
    }

    /// Routes one message received on `channel`.
    pub fn route(&self, channel: &Channel, message: Message) {
        self.router.route(channel, message);
    }

    /// Closes a channel from the background side: tears its session down,
    /// stops sending on its transport and stops its pump.
    pub fn close(&self, id: ChannelId) -> bool {
        let Some((_, attachment)) = self.channels.remove(&id) else {
            return false;
        };
        self.registry.teardown(id);
        attachment.channel.transport().close();
        // a stored permit stops the pump even if it is mid-route
        attachment.stop.notify_one();
        true
    }

    /// Number of open channels.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }
}
