use reqwest::StatusCode;
use thiserror::Error;

/// Classification of remote-API failures. This is the contract shared by the
/// client and the sync engine: only `RateLimited`, `ServerError` and
/// `Network` are retried automatically; `InvalidGrant` is terminal for the
/// whole account; everything else fails the current call immediately.
#[derive(Debug, Error)]
pub enum QboError {
    /// 401/403 from the API, or a token-endpoint failure that is not an
    /// invalid grant. A bad credential does not become good by waiting.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The identity provider rejected the refresh token. The account cannot
    /// self-heal; re-authorization is required.
    #[error("refresh token invalid: {0}")]
    InvalidGrant(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("server error ({status}): {detail}")]
    ServerError { status: u16, detail: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}): {detail}")]
    Unclassified { status: u16, detail: String },
}

impl QboError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QboError::RateLimited { .. } | QboError::ServerError { .. } | QboError::Network(_)
        )
    }
}

/// Map a non-2xx API response to an error kind, pulling the human-readable
/// detail out of QBO's `Fault` envelope when the body parses as one.
pub(crate) fn classify_response(
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> QboError {
    let detail = fault_detail(body);

    match status.as_u16() {
        401 | 403 => QboError::AuthenticationFailure(detail),
        404 => QboError::NotFound(detail),
        400 => QboError::Validation(detail),
        429 => QboError::RateLimited { retry_after },
        s if s >= 500 => QboError::ServerError { status: s, detail },
        s => QboError::Unclassified { status: s, detail },
    }
}

fn fault_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("Fault")?.get("Error")?.get(0)?;
            error
                .get("Detail")
                .or_else(|| error.get("Message"))?
                .as_str()
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}
