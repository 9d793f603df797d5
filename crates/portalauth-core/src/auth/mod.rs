//! Session state and its persistence.
//!
//! This module provides:
//! - `SessionStore`: the state machine owning the access token and identity
//! - `SessionStorage`: persistence capability with memory, file and OS
//!   keychain backends
//!
//! Only the access token and identity survive a restart; lifecycle phase,
//! loading and last error are rebuilt in memory on every start.

pub mod credentials;
pub mod error;
pub mod session;
pub mod state;
pub mod storage;

pub use credentials::KeyringStorage;
pub use error::AuthError;
pub use session::SessionStore;
pub use state::{LifecyclePhase, SessionSnapshot};
pub use storage::{FileStorage, MemoryStorage, PersistedSession, SessionStorage};
