//! Streaming transport
//!
//! Long-lived server-push connections delivered as a typed event
//! sequence. [`StreamTransport::open`] returns a [`StreamHandle`]; the
//! consumer reads [`StreamEvent`]s and calls `close()` when done.

pub mod events;
pub mod transport;

pub use events::StreamEvent;
pub use transport::{StreamHandle, StreamTransport};
