use thiserror::Error;

/// Errors raised while talking to the Grafana HTTP API.
///
/// Messages never include credentials; request bodies are not echoed either,
/// since they may carry secure JSON data.
#[derive(Debug, Error)]
pub enum GrafanaError {
    /// Grafana answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection failure, timeout or TLS problem.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// The client could not be built from the given settings.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl GrafanaError {
    /// Build an API error from a status and raw response body.
    ///
    /// Grafana reports failures as `{"message": "..."}`; anything else is
    /// passed through as text, and an empty body falls back to the reason
    /// phrase of the status.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                let text = String::from_utf8_lossy(body).trim().to_string();
                if text.is_empty() {
                    reqwest::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    text
                }
            });

        GrafanaError::Api { status, message }
    }

    /// Whether the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GrafanaError::Api { status: 404, .. })
    }

    pub(crate) fn decode(what: &str, err: impl std::fmt::Display) -> Self {
        GrafanaError::Decode {
            what: what.to_string(),
            message: err.to_string(),
        }
    }
}
