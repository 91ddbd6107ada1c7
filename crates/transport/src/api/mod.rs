//! Discrete request transport
//!
//! [`RequestSpec`] describes one call; [`RequestPipeline`] sends it and
//! turns every outcome into either a JSON value or a typed
//! [`crate::errors::TransportError`].

pub mod pipeline;
pub mod request;

pub use pipeline::RequestPipeline;
pub use request::{is_exempt_path, RequestSpec};
