use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ApiError;

/// Success envelope: every 2xx body is `{ "data": ..., "message": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
}

/// Failure envelope for non-2xx bodies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub message: String,
    /// Per-field validation messages, keyed by input field name.
    #[serde(default)]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

impl ApiErrorResponse {
    /// Parse a failure body, returning `None` for empty or non-JSON bodies.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// First message recorded for a field, if any.
    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get(field))
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }
}

/// `data` payload of the login and refresh endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub access_expires_at: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Read a 2xx body and unwrap its `data` field.
pub(crate) async fn read_data<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, ApiError> {
    let text = response.text().await?;
    let envelope: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
        ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
    })?;
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{"data":{"token_type":"Bearer","access_token":"abc.def","access_expires_at":"2026-01-01T00:00:00Z","refresh_token":null,"scopes":["admin.read"]},"message":"Login successful"}"#;
        let resp: ApiResponse<TokenPayload> =
            serde_json::from_str(json).expect("Failed to parse login test JSON");
        assert_eq!(resp.data.access_token, "abc.def");
        assert_eq!(resp.data.scopes, vec!["admin.read".to_string()]);
        assert_eq!(resp.message.as_deref(), Some("Login successful"));
    }

    #[test]
    fn test_refresh_payload_only_needs_token() {
        let resp: ApiResponse<TokenPayload> =
            serde_json::from_str(r#"{"data":{"access_token":"fresh"}}"#).unwrap();
        assert_eq!(resp.data.access_token, "fresh");
        assert!(resp.data.scopes.is_empty());
        assert!(resp.message.is_none());
    }

    #[test]
    fn test_parse_validation_errors() {
        let body = r#"{"message":"Validation failed","errors":{"username":["Username is required"],"password":["Too short","Needs a digit"]}}"#;
        let err = ApiErrorResponse::parse(body).expect("should parse");
        assert_eq!(err.message, "Validation failed");
        assert_eq!(err.field_error("username"), Some("Username is required"));
        assert_eq!(err.field_error("password"), Some("Too short"));
        assert_eq!(err.field_error("email"), None);
    }

    #[test]
    fn test_parse_non_json_body() {
        assert!(ApiErrorResponse::parse("<html>Bad Gateway</html>").is_none());
        assert!(ApiErrorResponse::parse("").is_none());
    }
}
