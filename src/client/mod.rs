//! Thin client for the Grafana HTTP API.
//!
//! One [`GrafanaClient`] is built when the provider is configured. Resources
//! that live inside an organization call [`GrafanaClient::with_org_id`] to get
//! a copy that sends the `X-Grafana-Org-Id` header; the underlying connection
//! pool is shared.

// Payload fields are named after Grafana's JSON keys.
#[allow(missing_docs)]
mod alerting;
#[allow(missing_docs)]
mod dashboards;
#[allow(missing_docs)]
mod datasources;
mod error;
#[allow(missing_docs)]
mod folders;
#[allow(missing_docs)]
mod orgs;
#[allow(missing_docs)]
mod slo;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

pub use alerting::{AlertQuery, AlertRule, RelativeTimeRange, RuleGroup};
pub use dashboards::PublicDashboard;
pub use datasources::DataSource;
pub use error::GrafanaError;
pub use folders::{Folder, SEARCH_PAGE_LIMIT};
pub use orgs::{Org, OrgPreferences, OrgUser};
pub use slo::{
    Slo, SloAlerting, SloAlertingMetadata, SloDestinationDatasource, SloLabel, SloMetric,
    SloObjective, SloQuery, SloQueryFreeform, SloQueryRatio,
};

/// Header selecting the organization a request applies to.
pub const ORG_ID_HEADER: &str = "X-Grafana-Org-Id";

/// How requests authenticate against Grafana.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Anonymous access.
    None,
    /// Service account or API token, sent as a bearer token.
    Token(String),
    /// Basic auth with a user name and password.
    Basic {
        /// Login name.
        user: String,
        /// Password.
        password: String,
    },
}

impl Auth {
    /// Parse the provider's `auth` setting.
    ///
    /// `user:password` selects basic auth, anything else is a token.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Auth::None;
        }
        match raw.split_once(':') {
            Some((user, password)) => Auth::Basic {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => Auth::Token(raw.to_string()),
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Token(_) => write!(f, "Token([REDACTED])"),
            Auth::Basic { user, .. } => write!(f, "Basic({}, [REDACTED])", user),
        }
    }
}

/// Settings used to build a [`GrafanaClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Root URL of the Grafana instance, e.g. `https://grafana.example.com`.
    pub url: String,
    /// Credentials.
    pub auth: Auth,
    /// Extra headers sent with every request.
    pub http_headers: Vec<(String, String)>,
    /// Skip TLS certificate verification.
    pub insecure_skip_verify: bool,
    /// Retries for 429/5xx answers and connection failures.
    pub retries: u32,
    /// Pause between retries.
    pub retry_wait: Duration,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl ClientSettings {
    /// Settings with defaults for everything but the URL and credentials.
    pub fn new(url: impl Into<String>, auth: Auth) -> Self {
        Self {
            url: url.into(),
            auth,
            http_headers: Vec::new(),
            insecure_skip_verify: false,
            retries: 3,
            retry_wait: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Client for the Grafana HTTP API, optionally scoped to one organization.
#[derive(Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Auth,
    org_id: Option<i64>,
    retries: u32,
    retry_wait: Duration,
}

impl GrafanaClient {
    /// Build a client.
    pub fn new(settings: ClientSettings) -> Result<Self, GrafanaError> {
        let base_url = Url::parse(settings.url.trim_end_matches('/')).map_err(|e| {
            GrafanaError::InvalidConfig(format!("invalid url '{}': {}", settings.url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GrafanaError::InvalidConfig(format!(
                "invalid url '{}': not a base URL",
                settings.url
            )));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.http_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                GrafanaError::InvalidConfig(format!("invalid header name '{}'", name))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                GrafanaError::InvalidConfig(format!("invalid value for header '{}'", name))
            })?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(settings.insecure_skip_verify);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url,
            auth: settings.auth,
            org_id: None,
            retries: settings.retries,
            retry_wait: settings.retry_wait,
        })
    }

    /// A copy of this client whose requests target `org_id`.
    ///
    /// Org IDs below 1 mean "the org of the credentials" and send no header.
    pub fn with_org_id(&self, org_id: i64) -> Self {
        let mut client = self.clone();
        client.org_id = if org_id > 0 { Some(org_id) } else { None };
        client
    }

    /// The org this client is scoped to, if any.
    pub fn org_id(&self) -> Option<i64> {
        self.org_id
    }

    /// The root URL of the Grafana instance.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build an absolute URL from path segments. Segments are percent-encoded,
    /// so UIDs and rule group names may contain any character.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self.http.request(method, url);
        builder = match &self.auth {
            Auth::None => builder,
            Auth::Token(token) => builder.bearer_auth(token),
            Auth::Basic { user, password } => builder.basic_auth(user, Some(password)),
        };
        if let Some(org_id) = self.org_id {
            builder = builder.header(ORG_ID_HEADER, org_id.to_string());
        }
        builder
    }

    /// Send a request, retrying throttled or failed attempts, and return the
    /// JSON body (`Value::Null` for empty bodies).
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<Value, GrafanaError> {
        let mut attempt = 0u32;
        loop {
            let current = request.try_clone().ok_or_else(|| {
                GrafanaError::InvalidConfig("request body cannot be replayed".to_string())
            })?;

            match current.send().await {
                Ok(response) => {
                    let status = response.status();
                    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if retryable && attempt < self.retries {
                        attempt += 1;
                        debug!(status = status.as_u16(), attempt, "retrying Grafana request");
                        tokio::time::sleep(self.retry_wait).await;
                        continue;
                    }

                    let url = response.url().path().to_string();
                    let body = response.bytes().await?;
                    debug!(status = status.as_u16(), path = %url, "Grafana response");

                    if !status.is_success() {
                        return Err(GrafanaError::from_response(status.as_u16(), &body));
                    }
                    if body.is_empty() {
                        return Ok(Value::Null);
                    }
                    return serde_json::from_slice(&body)
                        .map_err(|e| GrafanaError::decode("response body", e));
                },
                Err(e) if attempt < self.retries && (e.is_connect() || e.is_timeout()) => {
                    attempt += 1;
                    debug!(error = %e, attempt, "retrying Grafana request");
                    tokio::time::sleep(self.retry_wait).await;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(method = "GET", path = %segments.join("/"), org_id = ?self.org_id))]
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        what: &str,
    ) -> Result<T, GrafanaError> {
        let value = self
            .execute(self.request(Method::GET, self.url(segments)))
            .await?;
        decode(value, what)
    }

    #[instrument(level = "debug", skip_all, fields(method = %method, path = %segments.join("/"), org_id = ?self.org_id))]
    pub(crate) async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<Value, GrafanaError> {
        self.execute(self.request(method, self.url(segments)).json(body))
            .await
    }

    #[instrument(level = "debug", skip_all, fields(method = "DELETE", path = %segments.join("/"), org_id = ?self.org_id))]
    pub(crate) async fn delete(&self, segments: &[&str]) -> Result<(), GrafanaError> {
        self.execute(self.request(Method::DELETE, self.url(segments)))
            .await
            .map(|_| ())
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, GrafanaError> {
    serde_json::from_value(value).map_err(|e| GrafanaError::decode(what, e))
}

impl std::fmt::Debug for GrafanaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrafanaClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth)
            .field("org_id", &self.org_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> GrafanaClient {
        GrafanaClient::new(ClientSettings::new(url, Auth::parse("glsa_secret_token"))).unwrap()
    }

    #[test]
    fn test_auth_parse() {
        assert_eq!(Auth::parse(""), Auth::None);
        assert_eq!(Auth::parse("abc"), Auth::Token("abc".to_string()));
        assert_eq!(
            Auth::parse("admin:admin"),
            Auth::Basic {
                user: "admin".to_string(),
                password: "admin".to_string(),
            }
        );
    }

    #[test]
    fn test_debug_does_not_expose_credentials() {
        let debug = format!("{:?}", client("http://localhost:3000"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("glsa_secret_token"));

        let basic = format!("{:?}", Auth::parse("admin:hunter2"));
        assert!(basic.contains("admin"));
        assert!(!basic.contains("hunter2"));
    }

    #[test]
    fn test_url_encodes_segments() {
        let c = client("http://localhost:3000/grafana/");
        let url = c.url(&["api", "v1", "provisioning", "folder", "f1", "rule-groups", "My Group"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/grafana/api/v1/provisioning/folder/f1/rule-groups/My%20Group"
        );
    }

    #[test]
    fn test_with_org_id() {
        let c = client("http://localhost:3000");
        assert_eq!(c.org_id(), None);
        assert_eq!(c.with_org_id(4).org_id(), Some(4));
        assert_eq!(c.with_org_id(0).org_id(), None);
    }

    #[test]
    fn test_invalid_url() {
        let err = GrafanaClient::new(ClientSettings::new("not a url", Auth::None)).unwrap_err();
        assert!(matches!(err, GrafanaError::InvalidConfig(_)));
    }
}
