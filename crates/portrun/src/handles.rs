//! Type-safe handles for channels.
//!
//! A channel is identified by a `ChannelId`; the `Channel` handle pairs that
//! identity with the transport used to answer it.

use std::sync::Arc;

use portrpc::Message;

use crate::transport;
use crate::transport::Transport;

/// Identity of one caller's channel into the background context.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// A channel identity together with its outbound side.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    transport: Arc<dyn Transport>,
}

impl Channel {
    pub fn new(id: ChannelId, transport: Arc<dyn Transport>) -> Self {
        Self { id, transport }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn post(&self, message: Message) -> transport::Result<()> {
        self.transport.post(message)
    }

    /// Posts a reply, logging instead of failing when the caller is gone.
    pub fn reply(&self, message: Message) {
        let kind = message.kind.clone();
        if let Err(e) = self.transport.post(message) {
            tracing::error!(channel = %self.id, kind = %kind, error = %e, "reply lost");
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("id", &self.id).finish()
    }
}
