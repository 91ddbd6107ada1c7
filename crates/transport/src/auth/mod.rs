//! Session and credential management
//!
//! Everything that keeps a session alive: the token store (memory +
//! durable), the single-flight refresh coordinator, the session context
//! with its logout gate, and the injected collaborator traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SessionContext  │  logout gate + lifecycle
//! └────────┬─────────┘
//!          │
//!          ├──► TokenStore          (memory mirror + TokenStorage)
//!          ├──► RefreshCoordinator  (single-flight over AuthApi)
//!          └──► SessionEvents       (auto-logout hook)
//! ```
//!
//! Both transports hold the same `Arc<SessionContext>`; tests construct
//! isolated instances with in-memory collaborators from
//! [`crate::testing`].

pub mod http;
pub mod keychain;
pub mod refresh;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;

pub use http::{HttpAuthApi, REFRESH_PATH};
pub use keychain::KeyringStorage;
pub use refresh::RefreshCoordinator;
pub use session::SessionContext;
pub use store::TokenStore;
pub use traits::{AuthApi, SessionEvents, TokenStorage};
pub use types::{LogoutReason, RefreshError, TokenPair, TokenResponse};
