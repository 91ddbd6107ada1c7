//! # Stride Transport
//!
//! Client-side transport layer for the Stride desktop app: discrete JSON
//! requests and long-lived event streams against the Stride backend, with
//! session management handled below the feature code.
//!
//! This crate contains:
//! - Bearer-token auth with a memory-first token store and durable
//!   storage behind an injected trait
//! - Single-flight token refresh shared by both transports
//! - Bounded retry/backoff for gateway and network failures
//! - Connectivity health derived from request outcomes
//! - A typed event-stream transport with narrow reconnect semantics
//! - A logout gate so no request races a logout
//!
//! ## Architecture
//! - `SessionContext` is constructed once at startup and injected into
//!   [`api::RequestPipeline`] and [`stream::StreamTransport`]
//! - Collaborators (`TokenStorage`, `AuthApi`, `SessionEvents`) are
//!   traits; shipped implementations live in [`auth`], test doubles in
//!   [`testing`]

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod health;
pub mod retry;
pub mod stream;
pub mod testing;

pub use api::{RequestPipeline, RequestSpec};
pub use auth::{
    AuthApi, HttpAuthApi, KeyringStorage, LogoutReason, RefreshError, SessionContext,
    SessionEvents, TokenPair, TokenResponse, TokenStorage, TokenStore,
};
pub use config::TransportConfig;
pub use errors::{ErrorClass, TransportError};
pub use health::{ConnectivityState, ConnectivityStatus, HealthMonitor};
pub use stream::{StreamEvent, StreamHandle, StreamTransport};
