//! Client-side authentication core for portal applications.
//!
//! Two cooperating pieces live here:
//! - [`SessionStore`]: owns the access token and the authenticated identity,
//!   performs login/refresh/logout and bootstraps state on start.
//! - [`AuthenticatedClient`]: wraps outbound requests, attaches the bearer
//!   credential and, on a 401, shares a single refresh among all requests
//!   that failed concurrently before replaying each of them once.
//!
//! The store feeds the client through [`AuthHooks`], a pull-based accessor
//! plus a refresh callback, so the client never holds a token snapshot.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{
    ApiError, ApiErrorResponse, ApiResponse, AuthHooks, AuthenticatedClient, FnHooks, TokenPayload,
};
pub use auth::{
    AuthError, FileStorage, KeyringStorage, LifecyclePhase, MemoryStorage, PersistedSession,
    SessionSnapshot, SessionStorage, SessionStore,
};
pub use config::{AuthConfig, AuthEndpoints, ClientType, Portal};
pub use models::{Account, AdminAccount, AdminType, Identity};
