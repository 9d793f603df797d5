use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Bootstrap progress. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// Point-in-time view of the session, as published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot<T> {
    pub identity: Option<T>,
    pub access_token: Option<String>,
    pub phase: LifecyclePhase,
    /// A login or identity fetch is in flight.
    pub loading: bool,
    /// Message from the last failed login.
    pub last_error: Option<String>,
}

impl<T> Default for SessionSnapshot<T> {
    fn default() -> Self {
        Self {
            identity: None,
            access_token: None,
            phase: LifecyclePhase::Uninitialized,
            loading: false,
            last_error: None,
        }
    }
}

impl<T> SessionSnapshot<T> {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.phase == LifecyclePhase::Ready
    }

    /// Drop token and identity together.
    pub(crate) fn clear(&mut self) {
        self.access_token = None;
        self.identity = None;
    }
}
