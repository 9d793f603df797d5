use std::collections::HashMap;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Login answered with a non-2xx status.
    #[error("{message}")]
    LoginRejected {
        status: u16,
        message: String,
        errors: HashMap<String, Vec<String>>,
    },

    #[error("Failed to fetch account: {0}")]
    IdentityRejected(#[source] ApiError),

    #[error("Session expired: {0}")]
    RefreshRejected(#[source] ApiError),

    #[error("Credentials must serialize to a JSON object")]
    InvalidCredentials,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Message suitable for showing next to a login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::LoginRejected { message, .. } => message.clone(),
            AuthError::Api(ApiError::Network(_)) => {
                "Unable to reach the server, please try again".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Per-field validation messages from a rejected login.
    pub fn field_errors(&self) -> Option<&HashMap<String, Vec<String>>> {
        match self {
            AuthError::LoginRejected { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        }
    }
}
