//! Authenticated HTTP transport and the backend's wire envelopes.
//!
//! `AuthenticatedClient` attaches `Authorization: Bearer <token>` to every
//! request and turns a 401 into a single shared refresh followed by one
//! replay of the failed request. Its collaborators are injected through
//! `AuthHooks`.

pub mod client;
pub mod envelope;
pub mod error;
pub mod hooks;

pub use client::AuthenticatedClient;
pub use envelope::{ApiErrorResponse, ApiResponse, TokenPayload};
pub use error::ApiError;
pub use hooks::{AuthHooks, FnHooks};
