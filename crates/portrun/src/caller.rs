//! # Caller Front End
//!
//! Drives a session in the background context from the calling side. Every
//! operation parks a one-shot reply slot in a `Correlator`, ships the
//! correlation id in place of a callback, and settles when the matching
//! `callback` reply arrives.
//!
//! A pump task reads everything the background context sends: correlated
//! replies are fired through the correlator, the `options` reply completes
//! `connect`, and forwarded client events are broadcast to `events()`
//! subscribers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use portrpc::ClientEvent;
use portrpc::Command;
use portrpc::Correlator;
use portrpc::Message;
use portrpc::correlator::outcome;
use portrpc::message;
use serde_json::Value;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::oneshot;

use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The background context reported a failure for this call.
    Remote(Value),
    /// The background context could not create the session.
    ConnectFailed(String),
    /// The channel closed before a reply arrived.
    ChannelClosed,
    /// No reply arrived within the configured call timeout.
    Timeout,
    Transport(transport::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(err) => write!(f, "Remote failure: {}", err),
            Self::ConnectFailed(msg) => write!(f, "Session could not be created: {}", msg),
            Self::ChannelClosed => write!(f, "Channel closed before a reply arrived"),
            Self::Timeout => write!(f, "Call timed out"),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// How correlation ids for `publish` and `subscribe` are put on the wire.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CallbackEncoding {
    /// As the trailing positional argument, padding optional arguments so the
    /// background context can detect it by argument count.
    #[default]
    Positional,
    /// In the explicit `callback` field.
    Tagged,
}

/// Settings for a caller.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub callback_encoding: CallbackEncoding,
    /// Gives up on a reply after this long; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// Capacity of the forwarded event broadcast.
    pub event_buffer: usize,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback_encoding(mut self, encoding: CallbackEncoding) -> Self {
        self.callback_encoding = encoding;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            callback_encoding: CallbackEncoding::Positional,
            call_timeout: None,
            event_buffer: 64,
        }
    }
}

/// A client event forwarded by the background context.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event: ClientEvent,
    pub args: Vec<Value>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    config: ClientConfig,
    options: Mutex<Option<Value>>,
    events: broadcast::Sender<Event>,
    closed: AtomicBool,
    disconnecting: AtomicBool,
}

/// Closes the caller's side of the channel once the last `Client` handle is gone.
///
/// The pump keeps `Inner` alive on its own, so this cannot live on `Inner`.
struct Closer {
    transport: Arc<dyn Transport>,
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// Caller-side handle to a session in the background context.
///
/// Dropping the last handle closes the channel, and the background context
/// tears the session down.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
    closer: Arc<Closer>,
}

impl Client {
    /// Connects with default settings.
    ///
    /// `args` are the client library's connect arguments; `page` identifies
    /// the calling page and is appended as the last argument.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        args: Vec<Value>,
        page: impl Into<String>,
    ) -> Result<Self> {
        Self::connect_with(transport, args, page, ClientConfig::default()).await
    }

    /// Connects, resolving once the background context answers with the
    /// session's resolved options.
    ///
    /// The connect call is correlated like any other, so only the reply to
    /// it can fail the connect; the client's own `error` events cannot.
    pub async fn connect_with(
        transport: Arc<dyn Transport>,
        mut args: Vec<Value>,
        page: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let inner = Arc::new(Inner {
            transport: transport.clone(),
            correlator: Correlator::new(),
            config,
            options: Mutex::new(None),
            events,
            closed: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
        });
        tokio::spawn(pump(inner.clone()));

        // on any failure below, dropping `client` closes the channel again
        let client = Self { inner, closer: Arc::new(Closer { transport }) };

        args.push(Value::String(page.into()));
        let (id, rx) = client.open_call()?;
        let message = Message::call(Command::Connect, args).with_callback(id.clone());

        match client.send_and_await(&id, message, rx).await {
            Ok(_) => Ok(client),
            Err(Error::Remote(reason)) => Err(Error::ConnectFailed(reason_text(reason))),
            Err(e) => Err(e),
        }
    }

    /// The session's resolved options, as last reported by the background context.
    pub fn options(&self) -> Option<Value> {
        lock(&self.inner.options).clone()
    }

    /// Subscribes to the client events forwarded from the background context.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Whether `end` has been requested.
    pub fn is_disconnecting(&self) -> bool {
        self.inner.disconnecting.load(Ordering::Acquire)
    }

    /// Number of calls still waiting for their reply.
    pub fn pending(&self) -> usize {
        self.inner.correlator.pending()
    }

    /// Publishes `payload` to `topic`. Missing options are sent as `{}`.
    pub async fn publish(
        &self,
        topic: impl Into<Value>,
        payload: impl Into<Value>,
        opts: Option<Value>,
    ) -> Result<Vec<Value>> {
        let opts = opts.unwrap_or_else(|| json!({}));
        self.call(Command::Publish, vec![topic.into(), payload.into(), opts]).await
    }

    /// Subscribes to `topic`. Missing options are sent as `{"qos": 0}`.
    ///
    /// Resolves with the library's result, typically the granted subscriptions.
    pub async fn subscribe(&self, topic: impl Into<Value>, opts: Option<Value>) -> Result<Vec<Value>> {
        let opts = opts.unwrap_or_else(|| json!({"qos": 0}));
        self.call(Command::Subscribe, vec![topic.into(), opts]).await
    }

    pub async fn unsubscribe(&self, topic: impl Into<Value>) -> Result<Vec<Value>> {
        self.call(Command::Unsubscribe, vec![topic.into()]).await
    }

    /// Asks the background context to end the session's client.
    ///
    /// Calls still in flight are not guaranteed to settle afterwards.
    pub async fn end(&self, force: bool) -> Result<Vec<Value>> {
        self.inner.disconnecting.store(true, Ordering::Release);
        self.call(Command::End, vec![Value::Bool(force)]).await
    }

    /// Raises the client's listener limit. Nothing is sent back for this.
    pub fn set_max_listeners(&self, n: usize) -> Result<()> {
        self.ensure_open()?;
        let message = Message::call(Command::SetMaxListeners, vec![Value::from(n)]);
        Ok(self.inner.transport.post(message)?)
    }

    /// Callback flavour of `publish`.
    pub fn publish_with<F>(&self, topic: impl Into<Value>, payload: impl Into<Value>, opts: Option<Value>, callback: F)
    where
        F: FnOnce(Result<Vec<Value>>) + Send + 'static,
    {
        let client = self.clone();
        let (topic, payload) = (topic.into(), payload.into());
        settle_with(async move { client.publish(topic, payload, opts).await }, callback);
    }

    /// Callback flavour of `subscribe`.
    pub fn subscribe_with<F>(&self, topic: impl Into<Value>, opts: Option<Value>, callback: F)
    where
        F: FnOnce(Result<Vec<Value>>) + Send + 'static,
    {
        let client = self.clone();
        let topic = topic.into();
        settle_with(async move { client.subscribe(topic, opts).await }, callback);
    }

    /// Callback flavour of `unsubscribe`.
    pub fn unsubscribe_with<F>(&self, topic: impl Into<Value>, callback: F)
    where
        F: FnOnce(Result<Vec<Value>>) + Send + 'static,
    {
        let client = self.clone();
        let topic = topic.into();
        settle_with(async move { client.unsubscribe(topic).await }, callback);
    }

    /// Callback flavour of `end`.
    pub fn end_with<F>(&self, force: bool, callback: F)
    where
        F: FnOnce(Result<Vec<Value>>) + Send + 'static,
    {
        let client = self.clone();
        settle_with(async move { client.end(force).await }, callback);
    }

    /// Closes the caller's side of the channel; the background context
    /// tears the session down once it notices.
    pub fn close(&self) {
        self.closer.transport.close();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Parks a reply slot and returns its correlation id.
    fn prepare_call(&self) -> (String, oneshot::Receiver<std::result::Result<Vec<Value>, Value>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.correlator.register(Box::new(move |err, result| {
            // the receiver may have timed out and gone away
            let _ = tx.send(outcome(err, result));
        }));
        (id, rx)
    }

    /// Parks a reply slot on an open channel.
    fn open_call(&self) -> Result<(String, oneshot::Receiver<std::result::Result<Vec<Value>, Value>>)> {
        self.ensure_open()?;
        let (id, rx) = self.prepare_call();

        // the pump may have emptied the correlator between the check and the register
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.correlator.forget(&id);
            return Err(Error::ChannelClosed);
        }
        Ok((id, rx))
    }

    async fn call(&self, command: Command, mut args: Vec<Value>) -> Result<Vec<Value>> {
        let (id, rx) = self.open_call()?;

        let positional = self.inner.config.callback_encoding == CallbackEncoding::Positional;
        let message = match command.callback_arity() {
            Some(arity) if positional && args.len() + 1 == arity => {
                args.push(Value::String(id.clone()));
                Message::call(command, args)
            }
            _ => Message::call(command, args).with_callback(id.clone()),
        };

        self.send_and_await(&id, message, rx).await
    }

    async fn send_and_await(
        &self,
        id: &str,
        message: Message,
        rx: oneshot::Receiver<std::result::Result<Vec<Value>, Value>>,
    ) -> Result<Vec<Value>> {
        if let Err(e) = self.inner.transport.post(message) {
            self.inner.correlator.forget(id);
            return Err(e.into());
        }

        let reply = match self.inner.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.inner.correlator.forget(id);
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(result) => result.map_err(Error::Remote),
            Err(_) => Err(Error::ChannelClosed),
        }
    }
}

fn settle_with<Fut, F>(call: Fut, callback: F)
where
    Fut: Future<Output = Result<Vec<Value>>> + Send + 'static,
    F: FnOnce(Result<Vec<Value>>) + Send + 'static,
{
    tokio::spawn(async move { callback(call.await) });
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads replies and events until the background context closes the channel.
async fn pump(inner: Arc<Inner>) {
    loop {
        match inner.transport.recv().await {
            Ok(Some(msg)) => handle_message(&inner, msg),
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "transport error in caller pump");
                break;
            }
        }
    }

    inner.closed.store(true, Ordering::SeqCst);
    // dropping the parked reply slots settles their calls with ChannelClosed
    let abandoned = inner.correlator.clear();
    tracing::debug!(abandoned, "caller channel closed");
}

fn reason_text(reason: Value) -> String {
    match reason {
        Value::String(reason) => reason,
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

fn handle_message(inner: &Inner, msg: Message) {
    let correlated = msg.callback.as_ref().and_then(Value::as_str);
    let mut args = msg.arg_list().into_iter();

    match (msg.kind.as_str(), correlated) {
        (message::CALLBACK, _) => {
            let id = args.next().unwrap_or(Value::Null);
            let err = args.next().unwrap_or(Value::Null);
            let fired = match id.as_str() {
                Some(id) => inner.correlator.fire(id, err, args.collect()),
                None => false,
            };
            if !fired {
                tracing::trace!(id = %id, "reply for unknown callback");
            }
        }
        (message::OPTIONS, id) => {
            let options = args.next().unwrap_or(Value::Null);
            *lock(&inner.options) = Some(options.clone());
            if let Some(id) = id {
                inner.correlator.fire(id, Value::Null, vec![options]);
            }
        }
        // an error answering our connect, not an event of the client
        (message::ERROR, Some(id)) => {
            let reason = args.next().unwrap_or(Value::Null);
            inner.correlator.fire(id, reason, Vec::new());
        }
        (kind, _) => {
            let Some(event) = ClientEvent::parse(kind) else {
                tracing::warn!(kind, "unexpected message from background context");
                return;
            };
            // no subscribers is fine
            let _ = inner.events.send(Event { event, args: args.collect() });
        }
    }
}
