//! The session state machine.
//!
//! `SessionStore` is the only writer of the access token and identity. Reads
//! go through a `tokio::sync::watch` channel so UI code can subscribe to
//! changes; every change to token or identity is written through to the
//! configured `SessionStorage`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::{header, Client};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use crate::api::{envelope, ApiError, ApiErrorResponse, AuthenticatedClient, FnHooks, TokenPayload};
use crate::config::AuthConfig;
use crate::models::Identity;

use super::error::AuthError;
use super::state::{LifecyclePhase, SessionSnapshot};
use super::storage::{PersistedSession, SessionStorage};

/// Message used when a rejected login carries no server message.
const LOGIN_FAILED_MESSAGE: &str = "Login failed";

struct Inner<T> {
    config: AuthConfig,
    /// Carries a cookie jar so the refresh cookie set at login is replayed.
    client: Client,
    storage: Box<dyn SessionStorage>,
    state: watch::Sender<SessionSnapshot<T>>,
    /// Login and identity fetches currently in flight.
    pending: AtomicUsize,
    bootstrap: OnceCell<()>,
}

/// Authoritative owner of a portal's session.
/// Clone is cheap; clones share the same state.
pub struct SessionStore<T: Identity> {
    inner: Arc<Inner<T>>,
}

impl<T: Identity> Clone for SessionStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// How an identity fetch ended.
enum IdentityFetch {
    NoToken,
    Applied,
    /// The token changed while the request was in flight; nothing was applied.
    Superseded(Result<(), ApiError>),
    /// The session was cleared.
    Rejected(ApiError),
}

/// Keeps `loading` raised while alive.
struct LoadingGuard<'a, T> {
    inner: &'a Inner<T>,
}

impl<'a, T> LoadingGuard<'a, T> {
    fn new(inner: &'a Inner<T>) -> Self {
        inner.state.send_modify(|s| {
            inner.pending.fetch_add(1, Ordering::SeqCst);
            s.loading = true;
        });
        Self { inner }
    }
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        let inner = self.inner;
        inner.state.send_modify(|s| {
            let previous = inner.pending.fetch_sub(1, Ordering::SeqCst);
            s.loading = previous > 1;
        });
    }
}

impl<T: Identity> SessionStore<T> {
    /// Create a store and rehydrate it from `storage`.
    ///
    /// A missing or unreadable blob yields an empty session.
    pub fn new(config: AuthConfig, storage: impl SessionStorage + 'static) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self::with_client(config, client, storage))
    }

    /// Use a caller-built client. It should keep cookies for refresh to work.
    pub fn with_client(
        config: AuthConfig,
        client: Client,
        storage: impl SessionStorage + 'static,
    ) -> Self {
        let restored = Self::rehydrate(&config, &storage);
        let snapshot = SessionSnapshot {
            identity: restored.identity,
            access_token: restored.access_token,
            ..SessionSnapshot::default()
        };
        let (state, _) = watch::channel(snapshot);

        Self {
            inner: Arc::new(Inner {
                config,
                client,
                storage: Box::new(storage),
                state,
                pending: AtomicUsize::new(0),
                bootstrap: OnceCell::new(),
            }),
        }
    }

    fn rehydrate(config: &AuthConfig, storage: &dyn SessionStorage) -> PersistedSession<T> {
        let blob = match storage.load() {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!(storage_key = %config.storage_key, "No persisted session");
                return PersistedSession::new(None, None);
            }
            Err(e) => {
                warn!(storage_key = %config.storage_key, error = %e, "Failed to load persisted session");
                return PersistedSession::new(None, None);
            }
        };

        match serde_json::from_str::<PersistedSession<T>>(&blob) {
            Ok(mut persisted) => {
                if persisted.access_token.is_none() {
                    persisted.identity = None;
                }
                debug!(
                    storage_key = %config.storage_key,
                    has_token = persisted.access_token.is_some(),
                    saved_at = %persisted.saved_at,
                    "Session rehydrated"
                );
                persisted
            }
            Err(e) => {
                warn!(storage_key = %config.storage_key, error = %e, "Ignoring corrupt persisted session");
                PersistedSession::new(None, None)
            }
        }
    }

    // ===== State Access =====

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> SessionSnapshot<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot<T>> {
        self.inner.state.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token.clone()
    }

    pub fn identity(&self) -> Option<T> {
        self.inner.state.borrow().identity.clone()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.state.borrow().phase
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.borrow().last_error.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Wait until bootstrap has reached `ready`.
    pub async fn ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| s.is_ready()).await;
    }

    // ===== Mutation =====

    fn update(&self, f: impl FnOnce(&mut SessionSnapshot<T>)) {
        self.inner.state.send_modify(f);
    }

    /// Apply a token/identity change and write it through to storage.
    fn update_persisted(&self, f: impl FnOnce(&mut SessionSnapshot<T>)) {
        self.update(f);
        self.persist();
    }

    fn persist(&self) {
        let persisted = {
            let state = self.inner.state.borrow();
            PersistedSession::new(state.access_token.clone(), state.identity.clone())
        };

        let result = if persisted.is_empty() {
            self.inner.storage.clear()
        } else {
            serde_json::to_string(&persisted)
                .map_err(anyhow::Error::from)
                .and_then(|blob| self.inner.storage.save(&blob))
        };

        if let Err(e) = result {
            warn!(storage_key = %self.inner.config.storage_key, error = %e, "Failed to persist session");
        }
    }

    fn clear_session(&self) {
        self.update_persisted(SessionSnapshot::clear);
    }

    // ===== Operations =====

    /// Exchange credentials for an access token.
    ///
    /// `credentials` must serialize to a JSON object; `client_type` is added
    /// to it. Does not fetch the identity.
    pub async fn login<C: Serialize + ?Sized>(&self, credentials: &C) -> Result<(), AuthError> {
        let _loading = LoadingGuard::new(&self.inner);
        self.update(|s| s.last_error = None);

        match self.request_login(credentials).await {
            Ok(token) => {
                self.update_persisted(|s| {
                    s.access_token = Some(token);
                    s.identity = None;
                });
                info!(storage_key = %self.inner.config.storage_key, "Login succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                let message = e.user_message();
                self.update(|s| s.last_error = Some(message));
                Err(e)
            }
        }
    }

    async fn request_login<C: Serialize + ?Sized>(&self, credentials: &C) -> Result<String, AuthError> {
        let mut body = match serde_json::to_value(credentials) {
            Ok(Value::Object(map)) => map,
            _ => return Err(AuthError::InvalidCredentials),
        };
        body.insert("client_type".to_string(), json!(self.inner.config.client_type));

        let url = self.inner.config.login_url();
        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let envelope = ApiErrorResponse::parse(&text).unwrap_or_default();
            let message = if envelope.message.is_empty() {
                LOGIN_FAILED_MESSAGE.to_string()
            } else {
                envelope.message
            };
            return Err(AuthError::LoginRejected {
                status: status.as_u16(),
                message,
                errors: envelope.errors.unwrap_or_default(),
            });
        }

        let payload: TokenPayload = envelope::read_data(response, &url).await?;
        Ok(payload.access_token)
    }

    /// Clear token and identity. Purely local.
    pub fn logout(&self) {
        self.clear_session();
        info!(storage_key = %self.inner.config.storage_key, "Logged out");
    }

    /// Revoke the session server-side (best effort), then `logout`.
    pub async fn sign_out(&self) {
        if let (Some(url), Some(token)) = (self.inner.config.logout_url(), self.access_token()) {
            let body = json!({ "client_type": self.inner.config.client_type });
            let result = self
                .inner
                .client
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    debug!("Session revoked server-side");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Server-side revocation rejected");
                }
                Err(e) => {
                    warn!(error = %e, "Server-side revocation failed");
                }
            }
        }
        self.logout();
    }

    /// Load the identity for the current token.
    ///
    /// No-op without a token. Any failure clears the session, since the
    /// token that was used has proven unusable. If the token changes while
    /// the request is in flight, the session is left alone.
    pub async fn fetch_identity(&self) -> Result<(), AuthError> {
        match self.load_identity().await {
            IdentityFetch::NoToken | IdentityFetch::Applied | IdentityFetch::Superseded(Ok(())) => {
                Ok(())
            }
            IdentityFetch::Superseded(Err(e)) | IdentityFetch::Rejected(e) => {
                Err(AuthError::IdentityRejected(e))
            }
        }
    }

    async fn load_identity(&self) -> IdentityFetch {
        let Some(token) = self.access_token() else {
            debug!("No access token, skipping identity fetch");
            return IdentityFetch::NoToken;
        };

        let _loading = LoadingGuard::new(&self.inner);
        let result = self.request_identity(&token).await;

        if self.access_token().as_deref() != Some(token.as_str()) {
            match result {
                Ok(_) => debug!("Token changed during identity fetch, discarding result"),
                Err(ref e) => debug!(error = %e, "Identity fetch failed for a superseded token"),
            }
            return IdentityFetch::Superseded(result.map(|_| ()));
        }

        match result {
            Ok(identity) => {
                debug!(identity = %identity.identifier(), "Identity loaded");
                self.update_persisted(|s| s.identity = Some(identity));
                IdentityFetch::Applied
            }
            Err(e) => {
                warn!(error = %e, "Identity fetch failed, clearing session");
                self.clear_session();
                IdentityFetch::Rejected(e)
            }
        }
    }

    async fn request_identity(&self, token: &str) -> Result<T, ApiError> {
        let url = self.inner.config.me_url();
        let response = self
            .inner
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        envelope::read_data(response, &url).await
    }

    /// Obtain a new access token using the refresh cookie.
    ///
    /// On failure the session is cleared and the error returned; this is the
    /// refresh hook handed to `AuthenticatedClient`.
    pub async fn refresh_token(&self) -> Result<(), AuthError> {
        match self.request_refresh().await {
            Ok(token) => {
                self.update_persisted(|s| s.access_token = Some(token));
                info!(storage_key = %self.inner.config.storage_key, "Access token refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, clearing session");
                self.clear_session();
                Err(AuthError::RefreshRejected(e))
            }
        }
    }

    async fn request_refresh(&self) -> Result<String, ApiError> {
        let url = self.inner.config.refresh_url();
        let body = json!({ "client_type": self.inner.config.client_type });
        let response = self.inner.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        let payload: TokenPayload = envelope::read_data(response, &url).await?;
        Ok(payload.access_token)
    }

    /// Bootstrap once per process.
    ///
    /// Validates a stored token via the identity endpoint, falling back to a
    /// refresh and a second fetch. Always ends in `ready`, authenticated or
    /// not. Concurrent callers share the single run; later calls return
    /// immediately.
    pub async fn init_session(&self) {
        self.inner
            .bootstrap
            .get_or_init(|| self.bootstrap())
            .await;
    }

    async fn bootstrap(&self) {
        self.update(|s| {
            if s.phase < LifecyclePhase::Initializing {
                s.phase = LifecyclePhase::Initializing;
            }
        });

        match self.load_identity().await {
            IdentityFetch::NoToken => {
                debug!("No stored token, session starts unauthenticated");
            }
            IdentityFetch::Applied => {}
            IdentityFetch::Superseded(_) => {
                debug!("Session replaced during bootstrap, keeping it");
            }
            IdentityFetch::Rejected(e) => {
                debug!(error = %e, "Stored token rejected, attempting refresh");
                // Failures below clear the session themselves.
                let restored = match self.refresh_token().await {
                    Ok(()) => self.fetch_identity().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = restored {
                    info!(error = %e, "Session could not be restored");
                }
            }
        }

        self.update(|s| s.phase = LifecyclePhase::Ready);
        info!(
            storage_key = %self.inner.config.storage_key,
            authenticated = self.is_authenticated(),
            "Session initialized"
        );
    }

    // ===== Transport Wiring =====

    /// Hooks for `AuthenticatedClient`: token accessor, refresh, and the
    /// caller's session-lost notifier.
    pub fn transport_hooks<F>(&self, on_auth_failure: F) -> FnHooks
    where
        F: Fn() + Send + Sync + 'static,
    {
        let token_store = self.clone();
        let refresh_store = self.clone();
        FnHooks::new(
            move || token_store.access_token(),
            move || {
                let store = refresh_store.clone();
                async move { store.refresh_token().await }
            },
            on_auth_failure,
        )
    }

    /// An `AuthenticatedClient` wired to this store, sharing its connection
    /// pool and resolving relative paths against the portal base URL.
    pub fn authenticated_client<F>(&self, on_auth_failure: F) -> AuthenticatedClient
    where
        F: Fn() + Send + Sync + 'static,
    {
        AuthenticatedClient::with_client(
            self.inner.client.clone(),
            self.transport_hooks(on_auth_failure),
        )
        .with_base_url(&self.inner.config.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;
    use crate::models::Account;

    fn store_with(storage: MemoryStorage) -> SessionStore<Account> {
        // Nothing listens here; tests below never touch the network.
        SessionStore::new(AuthConfig::user("http://127.0.0.1:9"), storage).unwrap()
    }

    #[test]
    fn test_empty_storage_yields_empty_session() {
        let store = store_with(MemoryStorage::new());
        let snapshot = store.snapshot();
        assert!(snapshot.access_token.is_none());
        assert!(snapshot.identity.is_none());
        assert_eq!(snapshot.phase, LifecyclePhase::Uninitialized);
        assert!(!snapshot.loading);
        assert!(snapshot.last_error.is_none());
    }

    #[test]
    fn test_corrupt_blob_yields_empty_session() {
        let store = store_with(MemoryStorage::with_blob("{not json"));
        assert!(!store.is_authenticated());
        assert!(store.identity().is_none());
    }

    #[test]
    fn test_identity_without_token_is_dropped() {
        let blob = r#"{"access_token":null,"identity":{"id":1,"name":"Ada"}}"#;
        let store = store_with(MemoryStorage::with_blob(blob));
        assert!(store.identity().is_none());
    }

    #[test]
    fn test_rehydrate_restores_token_and_identity() {
        let blob = r#"{"access_token":"abc","identity":{"id":1,"name":"Ada","email":null},"saved_at":"2026-01-01T00:00:00Z"}"#;
        let store = store_with(MemoryStorage::with_blob(blob));
        assert_eq!(store.access_token().as_deref(), Some("abc"));
        assert_eq!(store.identity().map(|a| a.name), Some("Ada".to_string()));
        // Phase is never persisted
        assert_eq!(store.phase(), LifecyclePhase::Uninitialized);
    }

    #[test]
    fn test_logout_clears_state_and_storage() {
        let storage = MemoryStorage::with_blob(r#"{"access_token":"abc","identity":{"id":1,"name":"Ada"}}"#);
        let store = store_with(storage.clone());
        store.logout();
        assert!(store.access_token().is_none());
        assert!(store.identity().is_none());
        assert!(storage.blob().is_none());

        // Logging out an empty session is fine too
        store.logout();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_loading_guard_nests() {
        let store = store_with(MemoryStorage::new());
        let outer = LoadingGuard::new(&store.inner);
        let inner = LoadingGuard::new(&store.inner);
        assert!(store.is_loading());
        drop(inner);
        assert!(store.is_loading());
        drop(outer);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_init_without_token_goes_ready() {
        let store = store_with(MemoryStorage::new());
        store.init_session().await;
        assert_eq!(store.phase(), LifecyclePhase::Ready);
        assert!(!store.is_authenticated());
        // Second call is a no-op
        store.init_session().await;
        assert_eq!(store.phase(), LifecyclePhase::Ready);
    }

    #[tokio::test]
    async fn test_fetch_identity_without_token_is_noop() {
        let store = store_with(MemoryStorage::new());
        store.fetch_identity().await.unwrap();
        assert!(!store.is_loading());
        assert!(store.identity().is_none());
    }

    #[tokio::test]
    async fn test_login_rejects_non_object_credentials() {
        let store = store_with(MemoryStorage::new());
        let err = store.login(&"just a string").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(!store.is_loading());
        assert!(store.last_error().is_some());
    }
}
