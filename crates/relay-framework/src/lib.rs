//! # Relay Framework
//!
//! Event handling for the chat relay.
//!
//! This layer provides:
//! - [`classify`]: one received message in, exactly one [`Intent`] out
//! - [`Router`]: acts on an intent through a connection handle and the backend
//!
//! Both only depend on the capability traits in `relay-core`, so they run
//! unchanged against in-memory test doubles.

pub mod classifier;
pub mod router;

pub use classifier::{
    ClassifierRules, CtcpKind, DEFAULT_COMMAND_PREFIX, DEFAULT_IGNORED_NICK, IncomingLine, Intent,
    classify, classify_line,
};
pub use router::{QUOTE_COMMAND, Router, TITLE_PREFIX};
