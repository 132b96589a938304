//! # Session Registry
//!
//! Maps each channel to at most one live client session. Sessions are created
//! lazily by `connect`, replaced by a later `connect` on the same channel, and
//! removed when their `end` completes or their channel closes.
//!
//! Uses DashMap so that completions and teardown arriving from client library
//! tasks can touch the registry without a global lock.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde_json::Value;

use crate::client;
use crate::client::ClientFactory;
use crate::client::PubSubClient;
use crate::forwarder::Forwarder;
use crate::handles::Channel;
use crate::handles::ChannelId;

/// The binding of one channel to one live client instance.
#[derive(Clone)]
pub struct Session {
    pub channel: ChannelId,
    /// Distinguishes this session from any that replace it on the same channel.
    pub generation: u64,
    pub client: Arc<dyn PubSubClient>,
    /// Identifier of the page the caller connected from.
    pub page: Option<String>,
    live: Arc<AtomicBool>,
}

impl Session {
    /// Whether the session is still the one bound to its channel.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same session.
    pub fn same(&self, other: &Session) -> bool {
        self.channel == other.channel
            && self.generation == other.generation
            && Arc::ptr_eq(&self.client, &other.client)
    }

    /// Detaches the session; its forwarder stops sending events.
    fn retire(&self) {
        self.live.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("generation", &self.generation)
            .field("page", &self.page)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Registry of sessions keyed by channel.
pub struct Registry {
    factory: Arc<dyn ClientFactory>,
    sessions: DashMap<ChannelId, Session>,
    next_generation: AtomicU64,
    max_sessions: Option<usize>,
    /// Held from the capacity check to the insert when sessions are capped.
    admission: Mutex<()>,
}

impl Registry {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            sessions: DashMap::new(),
            next_generation: AtomicU64::new(1),
            max_sessions: None,
            admission: Mutex::new(()),
        }
    }

    /// Caps the number of concurrently bound channels.
    pub fn with_max_sessions(mut self, max: Option<usize>) -> Self {
        self.max_sessions = max;
        self
    }

    /// Connects a client for `channel` and binds it, attaching the event forwarder.
    ///
    /// A session already bound to the channel is replaced: it is silenced,
    /// then its client is ended with `force`.
    pub fn get_or_create(
        &self,
        channel: &Channel,
        args: Vec<Value>,
        page: Option<String>,
    ) -> client::Result<Session> {
        let id = channel.id();

        // removals only shrink the map, so they need not take this
        let admitted = match self.max_sessions {
            Some(max) => {
                let guard = self.admission.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if !self.sessions.contains_key(&id) && self.sessions.len() >= max {
                    return Err(client::Error::Capacity(max));
                }
                Some(guard)
            }
            None => None,
        };

        let client = self.factory.connect(args, page.as_deref())?;
        let session = Session {
            channel: id,
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            client,
            page,
            live: Arc::new(AtomicBool::new(true)),
        };
        Forwarder::attach(session.client.as_ref(), channel, &session.live);

        let replaced = self.sessions.insert(id, session.clone());
        drop(admitted);

        if let Some(old) = replaced {
            tracing::debug!(channel = %id, generation = old.generation, "replacing session");
            old.retire();
            old.client.end(vec![Value::Bool(true)], None);
        }

        Ok(session)
    }

    /// Looks up the session bound to `channel`.
    pub fn get(&self, channel: ChannelId) -> Option<Session> {
        self.sessions.get(&channel).map(|entry| entry.value().clone())
    }

    /// Unbinds whatever session `channel` has.
    pub fn remove(&self, channel: ChannelId) -> Option<Session> {
        let (_, session) = self.sessions.remove(&channel)?;
        session.retire();
        Some(session)
    }

    /// Unbinds the session only if it is still generation `generation`.
    pub fn remove_if(&self, channel: ChannelId, generation: u64) -> Option<Session> {
        let (_, session) = self
            .sessions
            .remove_if(&channel, |_, session| session.generation == generation)?;
        session.retire();
        Some(session)
    }

    /// Unbinds the channel's session and force-ends its client.
    pub fn teardown(&self, channel: ChannelId) -> bool {
        let Some(session) = self.remove(channel) else {
            return false;
        };
        tracing::debug!(channel = %channel, generation = session.generation, "tearing down session");
        session.client.end(vec![Value::Bool(true)], None);
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
