use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use booksync_common::types::ObjectType;

use crate::error::{classify_response, QboError};
use crate::token::{OauthConfig, QboCredentials, TokenManager, TokenUpdate};

pub const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
pub const API_BASE_SANDBOX: &str = "https://sandbox-quickbooks.api.intuit.com/v3/company";
pub const API_BASE_PRODUCTION: &str = "https://quickbooks.api.intuit.com/v3/company";

pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Remote-system hard cap on MAXRESULTS.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QboEnvironment {
    Sandbox,
    Production,
}

impl QboEnvironment {
    pub fn api_base(&self) -> &'static str {
        match self {
            QboEnvironment::Sandbox => API_BASE_SANDBOX,
            QboEnvironment::Production => API_BASE_PRODUCTION,
        }
    }
}

impl FromStr for QboEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(QboEnvironment::Sandbox),
            "production" => Ok(QboEnvironment::Production),
            other => Err(format!("unknown QBO environment: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QboClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub environment: QboEnvironment,
    pub redirect_uri: String,
    pub minor_version: u32,
    pub page_size: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub timeout_secs: u64,
}

impl QboClientConfig {
    /// Load QBO client settings from environment.
    ///
    /// `QBO_CLIENT_ID` and `QBO_CLIENT_SECRET` are required (fail-fast on
    /// misconfiguration); everything else has a default.
    pub fn from_env() -> Result<Self, String> {
        let client_id = std::env::var("QBO_CLIENT_ID")
            .map_err(|_| "QBO_CLIENT_ID is required but not set".to_string())?;
        let client_secret = std::env::var("QBO_CLIENT_SECRET")
            .map_err(|_| "QBO_CLIENT_SECRET is required but not set".to_string())?;

        let environment = std::env::var("QBO_ENVIRONMENT")
            .unwrap_or_else(|_| "sandbox".to_string())
            .parse()?;
        let redirect_uri = std::env::var("QBO_REDIRECT_URI")
            .unwrap_or_else(|_| "urn:ietf:wg:oauth:2.0:oob".to_string());
        let minor_version = std::env::var("QBO_MINOR_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(75);
        let page_size = std::env::var("QBO_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let max_retries = std::env::var("QBO_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let retry_base_ms = std::env::var("QBO_RETRY_BASE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);
        let timeout_secs = std::env::var("QBO_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            client_id,
            client_secret,
            environment,
            redirect_uri,
            minor_version,
            page_size,
            max_retries,
            retry_base_ms,
            timeout_secs,
        })
    }

    pub fn oauth(&self) -> OauthConfig {
        OauthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_url: TOKEN_ENDPOINT.to_string(),
        }
    }
}

/// Authenticated query client for one realm.
pub struct QboClient {
    http: reqwest::Client,
    config: QboClientConfig,
    realm_id: String,
    base_url: String,
    tokens: TokenManager,
}

impl QboClient {
    pub fn new(
        config: QboClientConfig,
        realm_id: &str,
        credentials: QboCredentials,
    ) -> Result<Self, QboError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.environment.api_base().to_string();
        let tokens = TokenManager::new(config.oauth(), credentials);

        Ok(Self {
            http,
            config,
            realm_id: realm_id.to_string(),
            base_url,
            tokens,
        })
    }

    /// Point the client at a different API base (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Point the token manager at a different token endpoint (tests).
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.tokens = self.tokens.with_token_url(token_url);
        self
    }

    pub fn realm_id(&self) -> &str {
        &self.realm_id
    }

    /// Refresh the access token if needed; see [`TokenManager::ensure_valid`].
    /// `InvalidGrant` from here means the account needs re-authorization.
    pub async fn ensure_token_valid(&mut self) -> Result<Option<TokenUpdate>, QboError> {
        self.tokens.ensure_valid(&self.http).await
    }

    /// Lazy cursor over pages of records changed since the watermark, in
    /// ascending LastUpdatedTime order. No watermark means a full backfill.
    pub fn fetch_changed(&self, object_type: ObjectType, since: Option<&str>) -> QueryPager<'_> {
        let base_query = match since {
            Some(watermark) => format!(
                "SELECT * FROM {entity} WHERE MetaData.LastUpdatedTime > '{watermark}' \
                 ORDER BY MetaData.LastUpdatedTime ASC",
                entity = object_type.as_str()
            ),
            None => format!(
                "SELECT * FROM {entity} ORDER BY MetaData.LastUpdatedTime ASC",
                entity = object_type.as_str()
            ),
        };

        QueryPager {
            client: self,
            entity: object_type.as_str(),
            base_query,
            start_position: 1,
            page_size: self.config.page_size.min(MAX_PAGE_SIZE),
            done: false,
        }
    }

    async fn query(&self, query: &str) -> Result<Value, QboError> {
        let url = format!("{}/{}/query", self.base_url, self.realm_id);
        self.request_with_retry(&url, query).await
    }

    /// Retry policy, applied per individual HTTP call: rate limits back off
    /// exponentially, server/network errors linearly, terminal kinds surface
    /// immediately. Exhausting the ceiling surfaces the last-seen error.
    async fn request_with_retry(&self, url: &str, query: &str) -> Result<Value, QboError> {
        let mut attempt = 0u32;
        loop {
            let error = match self.execute_query(url, query).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            attempt += 1;
            if !error.is_retryable() || attempt >= self.config.max_retries.max(1) {
                return Err(error);
            }

            let delay = backoff_delay(&error, attempt, self.config.retry_base_ms);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying qbo request after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn execute_query(&self, url: &str, query: &str) -> Result<Value, QboError> {
        let access_token = self
            .tokens
            .access_token()
            .ok_or_else(|| QboError::AuthenticationFailure("access token not set".to_string()))?;

        let minor_version = self.config.minor_version.to_string();
        let response = self
            .http
            .get(url)
            .query(&[("query", query), ("minorversion", minor_version.as_str())])
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response.json::<Value>().await.map_err(QboError::from);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, retry_after, &body))
    }
}

fn backoff_delay(error: &QboError, attempt: u32, base_ms: u64) -> Duration {
    match error {
        QboError::RateLimited {
            retry_after: Some(seconds),
        } => Duration::from_secs((*seconds).min(60)),
        // Exponential for rate limits, linear for server/network faults.
        QboError::RateLimited { retry_after: None } => {
            Duration::from_millis(base_ms << (attempt - 1))
        }
        _ => Duration::from_millis(base_ms * u64::from(attempt)),
    }
}

/// A lazy, finite, non-restartable sequence of record batches. The engine
/// commits each batch before pulling the next, so a consumer crash between
/// pages loses nothing that was already committed.
pub struct QueryPager<'a> {
    client: &'a QboClient,
    entity: &'static str,
    base_query: String,
    start_position: usize,
    page_size: usize,
    done: bool,
}

impl QueryPager<'_> {
    /// Fetch the next page. `Ok(None)` means the sequence is exhausted: the
    /// previous page was short, empty, or the remote had nothing at all.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>, QboError> {
        if self.done {
            return Ok(None);
        }

        let query = format!(
            "{} STARTPOSITION {} MAXRESULTS {}",
            self.base_query, self.start_position, self.page_size
        );
        tracing::debug!(query = %query, "executing qbo query");

        let response = self.client.query(&query).await?;
        let entities: Vec<Value> = response
            .get("QueryResponse")
            .and_then(|qr| qr.get(self.entity))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if entities.is_empty() {
            self.done = true;
            return Ok(None);
        }

        if entities.len() < self.page_size {
            self.done = true;
        } else {
            self.start_position += self.page_size;
        }

        Ok(Some(entities))
    }
}
