//! # Argument Bags
//!
//! Positional arguments cross the channel as a sparse object keyed by
//! stringified indices (`{"0": a, "1": b}`), which is the only shape every
//! structured-clone style channel preserves. This module converts between
//! that bag and the ordered list an operation is invoked with.
//!
//! ## Invariants
//!
//! - Keys are canonical decimal indices; anything else is malformed.
//! - `to_list` yields `highest index + 1` values. Holes become `Value::Null`.
//! - Absent trailing keys mean fewer arguments, never trailing nulls.
//! - No validation of the values themselves happens here.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::Visitor;
use serde::ser::SerializeMap;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;

/// Upper bound on positional indices accepted from the wire.
pub const MAX_ARGS: usize = 64;

/// A sparse, index-keyed bag of positional arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgBag {
    slots: BTreeMap<usize, Value>,
}

impl ArgBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` at `index`, replacing anything already there.
    pub fn insert(&mut self, index: usize, value: Value) -> Result<()> {
        if index >= MAX_ARGS {
            return Err(Error::IndexOutOfRange { index, max: MAX_ARGS });
        }
        self.slots.insert(index, value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.slots.get(&index)
    }

    /// Number of positional arguments the bag stands for: highest index + 1.
    pub fn len(&self) -> usize {
        self.slots.keys().next_back().map_or(0, |last| last + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over the present slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.slots.iter().map(|(index, value)| (*index, value))
    }
}

impl From<Vec<Value>> for ArgBag {
    fn from(args: Vec<Value>) -> Self {
        to_bag(args)
    }
}

/// Builds a bag with keys `0..n-1` from an ordered argument list.
pub fn to_bag(args: impl IntoIterator<Item = Value>) -> ArgBag {
    ArgBag {
        slots: args.into_iter().enumerate().collect(),
    }
}

/// Rebuilds the ordered argument list from a bag.
pub fn to_list(bag: &ArgBag) -> Vec<Value> {
    let mut list = vec![Value::Null; bag.len()];
    for (index, value) in bag.iter() {
        list[index] = value.clone();
    }
    list
}

/// Parses a bag key, accepting only the canonical decimal form.
pub fn parse_index(key: &str) -> Result<usize> {
    let index: usize = key
        .parse()
        .map_err(|_| Error::InvalidIndex(key.to_string()))?;

    // rejects "+1", "01" and friends, which no sender produces
    if index.to_string() != key {
        return Err(Error::InvalidIndex(key.to_string()));
    }
    if index >= MAX_ARGS {
        return Err(Error::IndexOutOfRange { index, max: MAX_ARGS });
    }
    Ok(index)
}

impl Serialize for ArgBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (index, value) in &self.slots {
            map.serialize_entry(&index.to_string(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ArgBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ArgBagVisitor)
    }
}

struct ArgBagVisitor;

impl<'de> Visitor<'de> for ArgBagVisitor {
    type Value = ArgBag;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an index-keyed argument object or an argument array")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<ArgBag, A::Error> {
        let mut bag = ArgBag::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            let index = parse_index(&key).map_err(serde::de::Error::custom)?;
            bag.slots.insert(index, value);
        }
        Ok(bag)
    }

    // Some senders emit the callback reply's arguments as a plain array.
    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> std::result::Result<ArgBag, A::Error> {
        let mut bag = ArgBag::new();
        let mut index = 0;
        while let Some(value) = access.next_element::<Value>()? {
            bag.insert(index, value).map_err(serde::de::Error::custom)?;
            index += 1;
        }
        Ok(bag)
    }
}
