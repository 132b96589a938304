//! # Wire Messages
//!
//! Every message, in either direction, has the same shape:
//!
//! ```text
//! { "type": <string>, "args"?: { "0": v, "1": v, ... }, "callback"?: <id> }
//! ```
//!
//! `type` is a command name, a correlation reply (`callback`), the session
//! bootstrap reply (`options`), or a forwarded client event name. `callback`
//! is an additive field naming the correlation id explicitly; senders that
//! predate it encode the id positionally instead (see `Command::callback_arity`).

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::bag;
use crate::bag::ArgBag;
use crate::error::Result;

/// Type of the reply carrying a correlated callback invocation.
pub const CALLBACK: &str = "callback";
/// Type of the reply carrying the resolved client configuration.
pub const OPTIONS: &str = "options";
/// Type of error replies and of the client's own `error` event.
pub const ERROR: &str = "error";

/// A single message on the channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ArgBag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<Value>,
}

impl Message {
    /// A message with no `args` field at all.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: None,
            callback: None,
        }
    }

    /// A message carrying `args` as a bag.
    pub fn new(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args: Some(bag::to_bag(args)),
            callback: None,
        }
    }

    /// A command message.
    pub fn call(command: Command, args: Vec<Value>) -> Self {
        Self::new(command.as_str(), args)
    }

    /// The session bootstrap reply: `{type: "options", args: {0: options}}`.
    pub fn options(options: Value) -> Self {
        Self::new(OPTIONS, vec![options])
    }

    /// A correlated reply: `{type: "callback", args: [id, err, ...result]}`.
    pub fn callback(id: Value, err: Value, result: Vec<Value>) -> Self {
        let mut args = Vec::with_capacity(result.len() + 2);
        args.push(id);
        args.push(err);
        args.extend(result);
        Self::new(CALLBACK, args)
    }

    /// An error reply with a single human readable reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(ERROR, vec![Value::String(reason.into())])
    }

    /// The reply for a type the router does not handle.
    pub fn unsupported(kind: &str) -> Self {
        Self::error(format!("Method {} not supported.", kind))
    }

    /// Attaches an explicit correlation id.
    pub fn with_callback(mut self, id: impl Into<Value>) -> Self {
        self.callback = Some(id.into());
        self
    }

    /// The ordered argument list; a missing `args` field is an empty list.
    pub fn arg_list(&self) -> Vec<Value> {
        self.args.as_ref().map(bag::to_list).unwrap_or_default()
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Commands a caller may send to the background context.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Command {
    Connect,
    Publish,
    Subscribe,
    Unsubscribe,
    End,
    SetMaxListeners,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Connect,
        Command::Publish,
        Command::Subscribe,
        Command::Unsubscribe,
        Command::End,
        Command::SetMaxListeners,
    ];

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::End => "end",
            Self::SetMaxListeners => "setMaxListeners",
        }
    }

    /// The argument count at which the last positional argument is a
    /// correlation id rather than data.
    ///
    /// Only `publish` (4) and `subscribe` (3) use the positional convention.
    pub fn callback_arity(&self) -> Option<usize> {
        match self {
            Self::Publish => Some(4),
            Self::Subscribe => Some(3),
            _ => None,
        }
    }

    /// Whether the client operation behind this command reports completion.
    pub fn takes_completion(&self) -> bool {
        matches!(self, Self::Publish | Self::Subscribe | Self::Unsubscribe | Self::End)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-level events forwarded from the background context to the caller.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ClientEvent {
    Close,
    Connect,
    Error,
    Message,
    Offline,
    Reconnect,
}

impl ClientEvent {
    pub const ALL: [ClientEvent; 6] = [
        ClientEvent::Close,
        ClientEvent::Connect,
        ClientEvent::Error,
        ClientEvent::Message,
        ClientEvent::Offline,
        ClientEvent::Reconnect,
    ];

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Connect => "connect",
            Self::Error => ERROR,
            Self::Message => "message",
            Self::Offline => "offline",
            Self::Reconnect => "reconnect",
        }
    }
}

impl std::fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
