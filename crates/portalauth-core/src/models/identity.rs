use serde::{de::DeserializeOwned, Serialize};

/// An authenticated principal as reported by the identity endpoint.
///
/// Beyond (de)serialization the session store only needs a stable identifier,
/// used for logging.
pub trait Identity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn identifier(&self) -> String;
}

impl Identity for serde_json::Value {
    fn identifier(&self) -> String {
        self.get("id")
            .map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untyped_identity() {
        assert_eq!(json!({"id": 42, "name": "Ada"}).identifier(), "42");
        assert_eq!(json!({"id": "u-1"}).identifier(), "u-1");
        assert_eq!(json!({"name": "anonymous"}).identifier(), "");
    }
}
