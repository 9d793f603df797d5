//! HTTP client that keeps outbound requests authenticated.
//!
//! Every request is stamped with the current bearer token pulled from
//! `AuthHooks`. A 401 on a first attempt joins (or starts) the one shared
//! session recovery; when it succeeds the request is replayed exactly once
//! with the new token. Anything else, including a 401 on the replay, goes
//! straight back to the caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{header, Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{envelope, ApiError, AuthHooks};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Timeouts surface as `ApiError::Network` and never trigger a refresh.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Why a shared recovery did not yield a usable token.
#[derive(Debug, Clone, Error)]
enum RecoveryFailure {
    #[error("refresh failed: {0}")]
    Refresh(String),
    #[error("no access token after refresh")]
    NoToken,
}

type Recovery = Shared<BoxFuture<'static, Result<(), RecoveryFailure>>>;

/// Holds the recovery in flight, if any. Installed and cleared under the lock,
/// never held across an await.
type RecoverySlot = Arc<Mutex<Option<Recovery>>>;

/// Retry marker carried by a single `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

/// Authenticated API client.
/// Clone is cheap and clones share the connection pool and the recovery slot.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: Client,
    hooks: Arc<dyn AuthHooks>,
    recovery: RecoverySlot,
    base_url: Option<String>,
}

impl AuthenticatedClient {
    pub fn new(hooks: impl AuthHooks) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, hooks))
    }

    /// Wrap an existing reqwest client, sharing its connection pool.
    pub fn with_client(client: Client, hooks: impl AuthHooks) -> Self {
        Self {
            client,
            hooks: Arc::new(hooks),
            recovery: Arc::new(Mutex::new(None)),
            base_url: None,
        }
    }

    /// Resolve relative request paths against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn resolve(&self, url: &str) -> String {
        match self.base_url {
            Some(ref base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                if url.starts_with('/') {
                    format!("{}{}", base, url)
                } else {
                    format!("{}/{}", base, url)
                }
            }
            _ => url.to_string(),
        }
    }

    /// True while a shared session recovery is in flight.
    pub fn is_recovering(&self) -> bool {
        self.recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // ===== Request Builders =====

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, self.resolve(url))
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    // ===== Sending =====

    /// Build and execute a request from one of the builders above.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Execute a request, recovering once from a rejected credential.
    ///
    /// Returns the response for 2xx statuses and a classified `ApiError`
    /// otherwise. On a failed recovery the error is the original 401.
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        let mut request = request;
        let mut attempt = Attempt::First;

        loop {
            let method = request.method().clone();
            let url = request.url().clone();
            // Taken before authorize() so the replay is stamped fresh.
            let replay = request.try_clone();

            let response = self.dispatch(request).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Self::check_response(response).await;
            }

            let rejected = ApiError::from_response(response).await;

            if attempt == Attempt::Retried {
                warn!(%method, %url, "Credential rejected on replay, not refreshing again");
                return Err(rejected);
            }

            let Some(replay) = replay else {
                debug!(%method, %url, "Request body cannot be replayed, skipping recovery");
                return Err(rejected);
            };

            debug!(%method, %url, "Credential rejected, awaiting session recovery");
            if let Err(failure) = self.recover().await {
                debug!(%method, %url, %failure, "Recovery failed, returning original error");
                return Err(rejected);
            }

            if self.hooks.access_token().is_none() {
                warn!(%method, %url, "Session cleared after recovery, returning original error");
                return Err(rejected);
            }

            attempt = Attempt::Retried;
            request = replay;
        }
    }

    async fn dispatch(&self, mut request: Request) -> Result<Response, ApiError> {
        self.authorize(&mut request)?;
        Ok(self.client.execute(request).await?)
    }

    /// Stamp the current token, if any. Without one the request goes out
    /// as-is and the server decides.
    fn authorize(&self, request: &mut Request) -> Result<(), ApiError> {
        if let Some(token) = self.hooks.access_token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ApiError::InvalidRequest("access token is not a valid header value".to_string())
            })?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Ok(())
    }

    /// Join the recovery in flight or start a new one.
    ///
    /// The check and the install happen under one lock with no await in
    /// between, so concurrent 401s launch exactly one refresh.
    async fn recover(&self) -> Result<(), RecoveryFailure> {
        let recovery = {
            let mut slot = self.recovery.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.clone() {
                Some(in_flight) => {
                    debug!("Joining in-flight session recovery");
                    in_flight
                }
                None => {
                    let recovery =
                        Self::start_recovery(Arc::clone(&self.hooks), Arc::clone(&self.recovery));
                    *slot = Some(recovery.clone());
                    recovery
                }
            }
        };
        recovery.await
    }

    fn start_recovery(hooks: Arc<dyn AuthHooks>, slot: RecoverySlot) -> Recovery {
        async move {
            info!("Refreshing session after credential rejection");
            let outcome = match hooks.refresh_auth().await {
                Ok(()) if hooks.access_token().is_some() => Ok(()),
                Ok(()) => Err(RecoveryFailure::NoToken),
                Err(e) => Err(RecoveryFailure::Refresh(e.to_string())),
            };

            // Settled: the next rejection is free to start a new recovery.
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();

            match outcome {
                Ok(()) => info!("Session recovered"),
                Err(ref failure) => {
                    warn!(%failure, "Session recovery failed");
                    hooks.on_auth_failure();
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_response(response).await)
        }
    }

    // ===== JSON Helpers =====

    /// GET and unwrap the `data` field of the response envelope.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send(self.get(url)).await?;
        envelope::read_data(response, url).await
    }

    pub async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.post(url).json(body)).await?;
        envelope::read_data(response, url).await
    }

    pub async fn put_json<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.put(url).json(body)).await?;
        envelope::read_data(response, url).await
    }

    pub async fn patch_json<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.patch(url).json(body)).await?;
        envelope::read_data(response, url).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send(self.delete(url)).await?;
        envelope::read_data(response, url).await
    }
}
