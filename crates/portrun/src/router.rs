//! # Call Router
//!
//! The single inbound entry point of the background context. Decodes a
//! message into a command and an argument list, works out whether the caller
//! expects a callback, rebuilds that callback as a completion that replies on
//! the channel, and invokes the matching operation on the channel's session.
//!
//! ## Callback detection
//!
//! - An explicit `callback` field names the correlation id directly.
//! - Otherwise `publish` with exactly 4 arguments and `subscribe` with exactly
//!   3 carry the id as their last argument, whatever its shape.
//! - `unsubscribe`, `end` and `setMaxListeners` never infer one.
//!
//! ## Invariants
//!
//! - Routing never panics and never fails the caller's context: every problem
//!   becomes a reply on the channel or a local diagnostic.
//! - An operation is invoked to completion before `route` returns.

use std::sync::Arc;

use portrpc::Command;
use portrpc::Message;
use serde_json::Value;

use crate::client::Completion;
use crate::handles::Channel;
use crate::registry::Registry;
use crate::registry::Session;

/// Reason sent back when a channel issues commands before `connect`.
pub const NO_SESSION: &str = "No session bound to this channel; send connect first.";

/// Dispatches inbound messages to the sessions of a registry.
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Routes one inbound message from `channel`.
    pub fn route(&self, channel: &Channel, message: Message) {
        let args = message.arg_list();
        let Message { kind, callback, .. } = message;

        let Some(command) = Command::parse(&kind) else {
            tracing::warn!(channel = %channel.id(), kind = %kind, "unsupported method");
            channel.reply(Message::unsupported(&kind));
            return;
        };
        tracing::debug!(channel = %channel.id(), command = %command, argc = args.len(), "routing");

        match command {
            Command::Connect => self.connect(channel, args, callback),
            command => self.dispatch(channel, command, args, callback),
        }
    }

    /// Routes a message still in its text encoding.
    ///
    /// Text that does not decode is reported locally and otherwise ignored.
    pub fn route_encoded(&self, channel: &Channel, text: &str) {
        match Message::decode(text) {
            Ok(message) => self.route(channel, message),
            Err(e) => tracing::error!(channel = %channel.id(), error = %e, "malformed message dropped"),
        }
    }

    /// Binds a session. A `callback` id on the connect is echoed on the reply,
    /// which lets the caller tell a failed connect from the client's own `error` events.
    fn connect(&self, channel: &Channel, mut args: Vec<Value>, callback: Option<Value>) {
        // the caller appends the identifier of its page last
        let page = args.pop().and_then(|page| match page {
            Value::Null => None,
            Value::String(page) => Some(page),
            other => Some(other.to_string()),
        });

        match self.registry.get_or_create(channel, args, page) {
            Ok(session) => {
                tracing::debug!(channel = %channel.id(), generation = session.generation, "session bound");
                channel.reply(correlated(Message::options(session.client.options()), callback));
            }
            Err(e) => {
                tracing::warn!(channel = %channel.id(), error = %e, "connect failed");
                channel.reply(correlated(Message::error(format!("Connect failed: {}", e)), callback));
            }
        }
    }

    fn dispatch(&self, channel: &Channel, command: Command, mut args: Vec<Value>, explicit: Option<Value>) {
        let id = match explicit {
            Some(id) => Some(id),
            None => match command.callback_arity() {
                Some(arity) if args.len() == arity => args.pop(),
                _ => None,
            },
        };

        let Some(session) = self.registry.get(channel.id()) else {
            tracing::warn!(channel = %channel.id(), command = %command, "no session bound");
            channel.reply(Message::error(NO_SESSION));
            if let Some(id) = id {
                channel.reply(Message::callback(id, Value::from(NO_SESSION), Vec::new()));
            }
            return;
        };

        let done = match id {
            Some(id) if command.takes_completion() => Some(forward_callback(channel, id)),
            Some(_) => {
                tracing::debug!(channel = %channel.id(), command = %command, "ignoring callback on command without completion");
                None
            }
            None => None,
        };

        let client = &session.client;
        match command {
            Command::Publish => client.publish(args, done),
            Command::Subscribe => client.subscribe(args, done),
            Command::Unsubscribe => client.unsubscribe(args, done),
            Command::End => client.end(args, Some(self.end_completion(&session, done))),
            Command::SetMaxListeners => client.set_max_listeners(args),
            Command::Connect => self.connect(channel, args, None),
        }
    }

    /// Wraps an `end` completion so the session is unbound once the client is done.
    fn end_completion(&self, session: &Session, done: Option<Completion>) -> Completion {
        let registry = self.registry.clone();
        let channel = session.channel;
        let generation = session.generation;

        Box::new(move |err, result| {
            if registry.remove_if(channel, generation).is_some() {
                tracing::debug!(channel = %channel, generation, "session ended");
            }
            if let Some(done) = done {
                done(err, result);
            }
        })
    }
}

fn correlated(message: Message, callback: Option<Value>) -> Message {
    match callback {
        Some(id) => message.with_callback(id),
        None => message,
    }
}

/// Builds the completion that answers correlation id `id` on `channel`:
/// `{type: "callback", args: [id, err, ...result]}`.
pub fn forward_callback(channel: &Channel, id: Value) -> Completion {
    let channel = channel.clone();
    Box::new(move |err, result| {
        channel.reply(Message::callback(id, err, result));
    })
}
