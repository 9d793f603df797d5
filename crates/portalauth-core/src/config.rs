//! Endpoint and persistence configuration for one portal instance.
//!
//! Every portal (admin, user, ...) talks to the same three-endpoint contract
//! under a different path prefix and keeps its session under its own
//! storage key. `AuthConfig::admin` and `AuthConfig::user` are the presets
//! the backend ships with.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// HTTP request timeout in seconds.
/// Surfaces as an ordinary network error, never as a credential rejection.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const ADMIN_AUTH_PREFIX: &str = "/api/v1/admin/auth";
const USER_AUTH_PREFIX: &str = "/api/v1/auth";

/// Tells the backend where the refresh secret travels.
///
/// `Web` sessions keep it in an HttpOnly cookie that the HTTP client replays
/// on its own; `Mobile` clients would carry it in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Web,
    Mobile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    pub login: String,
    pub me: String,
    pub refresh: String,
    /// Server-side revocation, used by `SessionStore::sign_out` when set.
    #[serde(default)]
    pub logout: Option<String>,
}

impl AuthEndpoints {
    /// Build the standard endpoint set under a path prefix.
    pub fn under(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            login: format!("{}/login", prefix),
            me: format!("{}/me", prefix),
            refresh: format!("{}/refresh", prefix),
            logout: Some(format!("{}/logout", prefix)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Portal {
    Admin,
    #[default]
    User,
}

impl Portal {
    pub fn config(self, base_url: &str) -> AuthConfig {
        match self {
            Portal::Admin => AuthConfig::admin(base_url),
            Portal::User => AuthConfig::user(base_url),
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Portal::Admin => f.write_str("admin"),
            Portal::User => f.write_str("user"),
        }
    }
}

impl FromStr for Portal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Portal::Admin),
            "user" => Ok(Portal::User),
            other => Err(format!("unknown portal '{}' (expected 'admin' or 'user')", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: String,
    pub endpoints: AuthEndpoints,
    /// Namespace of the persisted session blob.
    pub storage_key: String,
    pub client_type: ClientType,
    pub request_timeout: Duration,
}

impl AuthConfig {
    pub fn new(base_url: &str, endpoints: AuthEndpoints, storage_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            storage_key: storage_key.to_string(),
            client_type: ClientType::Web,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn admin(base_url: &str) -> Self {
        Self::new(base_url, AuthEndpoints::under(ADMIN_AUTH_PREFIX), "admin-auth")
    }

    pub fn user(base_url: &str) -> Self {
        Self::new(base_url, AuthEndpoints::under(USER_AUTH_PREFIX), "user-auth")
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Resolve an endpoint path (or absolute URL) against the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn login_url(&self) -> String {
        self.url(&self.endpoints.login)
    }

    pub fn me_url(&self) -> String {
        self.url(&self.endpoints.me)
    }

    pub fn refresh_url(&self) -> String {
        self.url(&self.endpoints.refresh)
    }

    pub fn logout_url(&self) -> Option<String> {
        self.endpoints.logout.as_deref().map(|p| self.url(p))
    }
}
