//! Provider configuration.
//!
//! The host sends the provider block as JSON through `Configure`. Unset
//! values fall back to `GRAFANA_*` environment variables.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{Auth, ClientSettings};
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Org used when neither the configuration nor the environment names one.
pub const DEFAULT_ORG_ID: i64 = 1;

/// The `provider "grafana"` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Root URL of the Grafana instance.
    pub url: Option<String>,
    /// `user:password` or a token.
    pub auth: Option<String>,
    /// Default org for resources without `org_id`.
    pub org_id: Option<i64>,
    /// Extra headers for every request.
    pub http_headers: BTreeMap<String, String>,
    /// Skip TLS verification.
    pub insecure_skip_verify: Option<bool>,
    /// Retries for throttled or failed requests.
    pub retries: Option<u32>,
    /// Seconds between retries.
    pub retry_wait: Option<u64>,
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
}

impl ProviderConfig {
    /// Parse the JSON configuration. `null` is an empty configuration.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Fill unset values from the process environment.
    pub fn with_env_fallbacks(self) -> Self {
        self.with_env(|key| std::env::var(key).ok())
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.url.is_none() {
            self.url = lookup("GRAFANA_URL");
        }
        if self.auth.is_none() {
            self.auth = lookup("GRAFANA_AUTH");
        }
        if self.org_id.is_none() {
            self.org_id = lookup("GRAFANA_ORG_ID").and_then(|v| v.trim().parse().ok());
        }
        if self.retries.is_none() {
            self.retries = lookup("GRAFANA_RETRIES").and_then(|v| v.trim().parse().ok());
        }
        if self.insecure_skip_verify.is_none() {
            self.insecure_skip_verify =
                lookup("GRAFANA_INSECURE_SKIP_VERIFY").and_then(|v| v.trim().parse().ok());
        }
        self
    }

    /// Problems that prevent building a client.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            diagnostics.push(
                Diagnostic::error("Missing Grafana URL")
                    .with_detail("Set 'url' in the provider configuration or GRAFANA_URL")
                    .with_attribute("url"),
            );
        }
        if matches!(self.org_id, Some(id) if id < 1) {
            diagnostics.push(
                Diagnostic::error("Invalid org_id")
                    .with_detail("Organization IDs start at 1")
                    .with_attribute("org_id"),
            );
        }
        if self.auth.is_none() {
            diagnostics.push(
                Diagnostic::warning("No credentials configured")
                    .with_detail("Requests are sent anonymously"),
            );
        }
        diagnostics
    }

    /// The default org.
    pub fn org_id(&self) -> i64 {
        self.org_id.unwrap_or(DEFAULT_ORG_ID)
    }

    /// Client settings for this configuration.
    pub fn client_settings(&self) -> Result<ClientSettings, ProviderError> {
        let url = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ProviderError::Configuration("url is required".to_string()))?;

        let mut settings = ClientSettings::new(url, Auth::parse(self.auth.as_deref().unwrap_or("")));
        settings.http_headers = self
            .http_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        settings.insecure_skip_verify = self.insecure_skip_verify.unwrap_or(false);
        if let Some(retries) = self.retries {
            settings.retries = retries;
        }
        if let Some(wait) = self.retry_wait {
            settings.retry_wait = Duration::from_secs(wait);
        }
        settings.timeout = self.timeout.map(Duration::from_secs);
        Ok(settings)
    }
}

/// Schema of the provider block.
pub fn provider_schema() -> Schema {
    Schema::v0()
        .with_description("Grafana and Grafana Cloud")
        .with_attribute(
            "url",
            Attribute::optional_string()
                .with_description("Root URL of the Grafana instance. May also be set with GRAFANA_URL."),
        )
        .with_attribute(
            "auth",
            Attribute::optional_string()
                .sensitive()
                .with_description("API token or `user:password`. May also be set with GRAFANA_AUTH."),
        )
        .with_attribute(
            "org_id",
            Attribute::optional_int64()
                .with_description("Default organization. May also be set with GRAFANA_ORG_ID."),
        )
        .with_attribute(
            "http_headers",
            Attribute::string_map()
                .sensitive()
                .with_description("Headers added to every request."),
        )
        .with_attribute("insecure_skip_verify", Attribute::optional_bool())
        .with_attribute(
            "retries",
            Attribute::optional_int64().with_default(json!(3)),
        )
        .with_attribute(
            "retry_wait",
            Attribute::optional_int64()
                .with_default(json!(1))
                .with_description("Seconds to wait between retries."),
        )
        .with_attribute(
            "timeout",
            Attribute::optional_int64().with_description("Request timeout in seconds."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::has_errors;

    fn env<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_from_value() {
        let config = ProviderConfig::from_value(&json!({
            "url": "http://localhost:3000",
            "auth": "admin:admin",
            "org_id": 2,
            "http_headers": {"X-Team": "ops"}
        }))
        .unwrap();
        assert_eq!(config.url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.org_id(), 2);
        assert_eq!(config.http_headers["X-Team"], "ops");

        assert_eq!(ProviderConfig::from_value(&Value::Null).unwrap(), ProviderConfig::default());
        assert!(ProviderConfig::from_value(&json!({"org_id": "x"})).is_err());
    }

    #[test]
    fn test_env_fallbacks() {
        let vars = [
            ("GRAFANA_URL", "http://grafana:3000"),
            ("GRAFANA_AUTH", "token"),
            ("GRAFANA_ORG_ID", "5"),
            ("GRAFANA_RETRIES", "7"),
            ("GRAFANA_INSECURE_SKIP_VERIFY", "true"),
        ];
        let config = ProviderConfig::default().with_env(env(&vars));
        assert_eq!(config.url.as_deref(), Some("http://grafana:3000"));
        assert_eq!(config.auth.as_deref(), Some("token"));
        assert_eq!(config.org_id(), 5);
        assert_eq!(config.retries, Some(7));
        assert_eq!(config.insecure_skip_verify, Some(true));
    }

    #[test]
    fn test_explicit_values_win_over_env() {
        let vars = [("GRAFANA_URL", "http://env:3000")];
        let config = ProviderConfig {
            url: Some("http://config:3000".to_string()),
            ..Default::default()
        }
        .with_env(env(&vars));
        assert_eq!(config.url.as_deref(), Some("http://config:3000"));
        assert_eq!(config.org_id(), DEFAULT_ORG_ID);
    }

    #[test]
    fn test_validate() {
        let diagnostics = ProviderConfig::default().validate();
        assert!(has_errors(&diagnostics));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("url"));

        let config = ProviderConfig {
            url: Some("http://localhost:3000".to_string()),
            auth: Some("admin:admin".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_client_settings() {
        let config = ProviderConfig {
            url: Some("http://localhost:3000".to_string()),
            auth: Some("admin:secret".to_string()),
            retries: Some(0),
            retry_wait: Some(2),
            ..Default::default()
        };
        let settings = config.client_settings().unwrap();
        assert_eq!(settings.retries, 0);
        assert_eq!(settings.retry_wait, Duration::from_secs(2));
        assert!(matches!(settings.auth, Auth::Basic { ref user, .. } if user == "admin"));

        assert!(ProviderConfig::default().client_settings().is_err());
    }
}
