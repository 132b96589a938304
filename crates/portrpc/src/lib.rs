//! # PortRPC
//!
//! The wire layer for driving a stateful pub/sub client that lives behind a
//! channel able to carry only structured data.
//!
//! ## Architecture
//!
//! - **Messages** (`message`): the single `{type, args, callback}` shape used in
//!   both directions, plus the command and event vocabularies.
//! - **Argument bags** (`bag`): positional arguments as a sparse index-keyed
//!   object, and the conversion back to an ordered list.
//! - **Correlator** (`correlator`): parks callbacks under opaque ids on the
//!   calling side and fires each at most once when its reply arrives.
//!
//! Nothing here spawns tasks or touches a transport; see `portrun` for that.

pub mod bag;
pub mod correlator;
pub mod error;
pub mod message;

pub use bag::ArgBag;
pub use bag::to_bag;
pub use bag::to_list;
pub use correlator::Correlator;
pub use correlator::Resolver;
pub use error::Error;
pub use error::Result;
pub use message::ClientEvent;
pub use message::Command;
pub use message::Message;

#[cfg(test)]
mod tests;
