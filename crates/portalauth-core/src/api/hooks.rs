use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::auth::AuthError;

/// Collaborators the authenticated client calls into.
///
/// The token is pulled on every request rather than captured, so a token
/// rotated by a refresh is picked up without re-wiring the client.
pub trait AuthHooks: Send + Sync + 'static {
    /// Current access token, if any.
    fn access_token(&self) -> Option<String>;

    /// Obtain a new access token. Must fail when the session cannot be renewed.
    fn refresh_auth(&self) -> BoxFuture<'static, Result<(), AuthError>>;

    /// Session could not be recovered. Called once per failed recovery.
    fn on_auth_failure(&self);
}

type TokenFn = dyn Fn() -> Option<String> + Send + Sync;
type RefreshFn = dyn Fn() -> BoxFuture<'static, Result<(), AuthError>> + Send + Sync;
type FailureFn = dyn Fn() + Send + Sync;

/// `AuthHooks` assembled from three closures.
#[derive(Clone)]
pub struct FnHooks {
    get_token: Arc<TokenFn>,
    refresh: Arc<RefreshFn>,
    on_failure: Arc<FailureFn>,
}

impl FnHooks {
    pub fn new<G, R, Fut, F>(get_token: G, refresh: R, on_failure: F) -> Self
    where
        G: Fn() -> Option<String> + Send + Sync + 'static,
        R: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AuthError>> + Send + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            get_token: Arc::new(get_token),
            refresh: Arc::new(move || refresh().boxed()),
            on_failure: Arc::new(on_failure),
        }
    }
}

impl AuthHooks for FnHooks {
    fn access_token(&self) -> Option<String> {
        (self.get_token)()
    }

    fn refresh_auth(&self) -> BoxFuture<'static, Result<(), AuthError>> {
        (self.refresh)()
    }

    fn on_auth_failure(&self) {
        (self.on_failure)()
    }
}

impl fmt::Debug for FnHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHooks").finish_non_exhaustive()
    }
}
