//! Stream events
//!
//! Typed event sequence delivered by a [`crate::stream::StreamHandle`].
//! Every stream yields `Open` first, any number of `Message`s, and ends
//! with exactly one terminal event: `Error` or `Complete`.

use serde_json::Value;

use crate::errors::TransportError;

/// One event observed on an open stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The connection was established (or re-established after the single
    /// allowed reconnect).
    Open,
    /// A decoded data frame.
    Message(Value),
    /// Terminal failure; no further events follow.
    Error(TransportError),
    /// The stream ended cleanly, by `close()` or by the server finishing.
    Complete,
}

impl StreamEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Complete)
    }
}
