//! # Callback Correlator
//!
//! Callables cannot cross the channel, so the calling side parks each
//! callback here under an opaque id, ships the id instead, and fires the
//! callback when a `callback` reply bearing that id comes back.
//!
//! ## Invariants
//!
//! - An id names at most one live entry at a time.
//! - An entry fires at most once; it is removed before it is invoked.
//! - Firing an unknown id is a no-op and reports `false`.
//!
//! Ids keep the 13 digit uppercase hexadecimal form existing peers expect,
//! but come from a counter seeded at a random 52-bit offset rather than from
//! independent random draws, so they cannot repeat within one correlator.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use serde_json::Value;

/// Number of hexadecimal digits in a correlation id.
pub const ID_DIGITS: usize = 13;

const ID_MASK: u64 = (1 << (ID_DIGITS * 4)) - 1;

/// A parked callback: invoked with `(err, result...)`.
pub type Resolver = Box<dyn FnOnce(Value, Vec<Value>) + Send + Sync + 'static>;

/// Registry of callbacks awaiting a correlated reply.
pub struct Correlator {
    pending: DashMap<String, Resolver>,
    next: AtomicU64,
}

impl Correlator {
    /// Creates a correlator whose ids start at a random offset.
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().r#gen::<u64>())
    }

    /// Creates a correlator whose ids start at `seed` (masked to 52 bits).
    pub fn with_seed(seed: u64) -> Self {
        Self {
            pending: DashMap::new(),
            next: AtomicU64::new(seed & ID_MASK),
        }
    }

    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) & ID_MASK;
        format!("{:0width$X}", n, width = ID_DIGITS)
    }

    /// Parks `resolver` and returns the id to send in its place.
    pub fn register(&self, resolver: Resolver) -> String {
        loop {
            match self.pending.entry(self.next_id()) {
                Entry::Vacant(slot) => {
                    let id = slot.key().clone();
                    slot.insert(resolver);
                    return id;
                }
                // only reachable after the counter wraps onto a live id
                Entry::Occupied(_) => continue,
            }
        }
    }

    /// Fires and removes the callback registered under `id`.
    ///
    /// Returns `false`, doing nothing else, when no such callback is live.
    pub fn fire(&self, id: &str, err: Value, result: Vec<Value>) -> bool {
        let Some((_, resolver)) = self.pending.remove(id) else {
            tracing::trace!(id, "correlator miss");
            return false;
        };
        resolver(err, result);
        true
    }

    /// Drops the callback registered under `id` without firing it.
    pub fn forget(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Drops every live callback without firing it and returns how many there were.
    ///
    /// Used when the channel closes: owners of the dropped callbacks observe
    /// the drop instead of a reply.
    pub fn clear(&self) -> usize {
        let abandoned = self.pending.len();
        self.pending.clear();
        abandoned
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of callbacks still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a callback invocation into success or failure.
///
/// A `null` error slot means success, as in node-style callbacks.
pub fn outcome(err: Value, result: Vec<Value>) -> std::result::Result<Vec<Value>, Value> {
    match err {
        Value::Null => Ok(result),
        err => Err(err),
    }
}
