//! Identity records returned by the `me` endpoint.
//!
//! The session store is generic over [`Identity`], so each portal can plug in
//! its own profile shape:
//!
//! - `Account`: the minimal shape every portal returns
//! - `AdminAccount`: admin portal profile with role and granted scopes

pub mod account;
pub mod identity;

pub use account::{Account, AdminAccount, AdminType};
pub use identity::Identity;
