//! Typed access to tool call arguments.

use crate::error::TroupeError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, TroupeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| TroupeError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, TroupeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| TroupeError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, TroupeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| TroupeError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, TroupeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| TroupeError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Get an optional boolean argument.
    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(|v| v.as_bool())
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, TroupeError> {
        let value = match &self.value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(trimmed)?
                }
            }
            other => other.clone(),
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let args = ToolArguments::new(serde_json::json!({
            "city": "Oslo",
            "days": 3,
            "metric": true,
        }));
        assert_eq!(args.get_str("city").unwrap(), "Oslo");
        assert_eq!(args.get_i64("days").unwrap(), 3);
        assert!(args.get_bool("metric").unwrap());
        assert!(args.get_str("missing").is_err());
        assert_eq!(args.get_str_opt("missing"), None);
    }

    #[test]
    fn deserialize_accepts_stringified_json() {
        #[derive(serde::Deserialize)]
        struct Args {
            city: String,
        }
        let args = ToolArguments::new(serde_json::json!(r#"{"city":"Oslo"}"#));
        let parsed: Args = args.deserialize().unwrap();
        assert_eq!(parsed.city, "Oslo");
    }
}
