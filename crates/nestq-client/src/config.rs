use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    pub const BASE_URL_VAR: &'static str = "NESTQ_BASE_URL";
    pub const TIMEOUT_VAR: &'static str = "NESTQ_TIMEOUT_MS";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Read `NESTQ_BASE_URL` (required) and `NESTQ_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let base_url = lookup(Self::BASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ClientError::Config(format!("{} is not set", Self::BASE_URL_VAR)))?;

        let mut config = ClientConfig::new(base_url);
        if let Some(raw) = lookup(Self::TIMEOUT_VAR) {
            config.timeout_ms = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("{} must be a number, got `{raw}`", Self::TIMEOUT_VAR))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn reads_base_url_and_default_timeout() {
        let config = ClientConfig::from_lookup(lookup(&[("NESTQ_BASE_URL", "http://api:8080")])).unwrap();
        assert_eq!(config, ClientConfig::new("http://api:8080"));
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn reads_timeout() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("NESTQ_BASE_URL", "http://api"),
            ("NESTQ_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn missing_base_url_errors() {
        let err = ClientConfig::from_lookup(lookup(&[("NESTQ_BASE_URL", "  ")])).unwrap_err();
        assert!(err.to_string().contains("NESTQ_BASE_URL is not set"), "{err}");
    }

    #[test]
    fn bad_timeout_errors() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("NESTQ_BASE_URL", "http://api"),
            ("NESTQ_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn deserializes_with_default_timeout() {
        let config: ClientConfig = serde_json::from_str(r#"{"base_url":"http://api"}"#).unwrap();
        assert_eq!(config.timeout_ms, 30_000);
    }
}
