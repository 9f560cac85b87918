//! Minimal CDP layer
//!
//! Event payloads the tracker decodes and the session commands the resolver sends.

pub mod connection;
pub mod types;

pub use connection::{CommandChannel, Session};
pub use types::{CdpMessage, DOMNode};
