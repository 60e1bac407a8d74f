//! Message types exchanged between a front end and the agent loop.

pub mod types;

pub use types::{InboundMessage, OutboundMessage};
