//! # Event Forwarder
//!
//! Re-emits a client's events as outbound messages on its owning channel.
//!
//! The payload is capped: up to three positional values are forwarded as-is,
//! while an event with more than three keeps only its first value. Existing
//! callers depend on that shape, so the cap is part of the wire format.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use portrpc::ClientEvent;
use portrpc::Message;
use serde_json::Value;

use crate::client::PubSubClient;
use crate::handles::Channel;

/// Events forwarded from every client.
pub const FORWARDED_EVENTS: [ClientEvent; 6] = ClientEvent::ALL;

/// Largest payload forwarded in full.
pub const MAX_EVENT_ARITY: usize = 3;

/// Builds the outbound message for one event occurrence.
pub fn event_message(event: ClientEvent, args: &[Value]) -> Message {
    match args.len() {
        0 => Message::bare(event.as_str()),
        n if n <= MAX_EVENT_ARITY => Message::new(event.as_str(), args.to_vec()),
        _ => Message::new(event.as_str(), vec![args[0].clone()]),
    }
}

pub struct Forwarder;

impl Forwarder {
    /// Subscribes to `FORWARDED_EVENTS` on `client`, sending each on `channel`
    /// for as long as `live` holds.
    pub fn attach(client: &dyn PubSubClient, channel: &Channel, live: &Arc<AtomicBool>) {
        for event in FORWARDED_EVENTS {
            let channel = channel.clone();
            let live = live.clone();
            client.on(event, Arc::new(move |args: &[Value]| {
                if !live.load(Ordering::Acquire) {
                    return;
                }
                if let Err(e) = channel.post(event_message(event, args)) {
                    tracing::debug!(channel = %channel.id(), event = %event, error = %e, "event dropped");
                }
            }));
        }
    }
}
