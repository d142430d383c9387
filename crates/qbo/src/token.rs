use chrono::{DateTime, Duration, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;

use crate::error::QboError;
use crate::models::TokenResponse;

/// Refresh this far ahead of the recorded expiry.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Credential triple as loaded from the account store.
#[derive(Debug, Clone)]
pub struct QboCredentials {
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A rotated credential triple the caller must persist. The previous refresh
/// token is unusable the moment this value exists.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Holds one tenant's OAuth state and refreshes it proactively.
///
/// There is deliberately no retry loop here: a refresh either succeeds or
/// surfaces `InvalidGrant`/`AuthenticationFailure` to the caller.
pub struct TokenManager {
    oauth: OauthConfig,
    credentials: QboCredentials,
}

impl TokenManager {
    pub fn new(oauth: OauthConfig, credentials: QboCredentials) -> Self {
        Self { oauth, credentials }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credentials.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> &str {
        &self.credentials.refresh_token
    }

    /// Point the manager at a different token endpoint (tests).
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.oauth.token_url = token_url.to_string();
        self
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.credentials.access_token, self.credentials.expires_at) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(expires_at)) => {
                now >= expires_at - Duration::minutes(REFRESH_MARGIN_MINUTES)
            }
        }
    }

    /// Refresh the access token if it is missing or within the safety margin
    /// of expiry. Returns the rotated triple when a refresh happened so the
    /// caller can persist it; `None` means the held token is still fresh.
    pub async fn ensure_valid(
        &mut self,
        http: &reqwest::Client,
    ) -> Result<Option<TokenUpdate>, QboError> {
        if !self.needs_refresh(Utc::now()) {
            return Ok(None);
        }
        self.refresh(http).await.map(Some)
    }

    async fn refresh(&mut self, http: &reqwest::Client) -> Result<TokenUpdate, QboError> {
        tracing::info!("refreshing qbo access token");

        let response = http
            .post(&self.oauth.token_url)
            .basic_auth(&self.oauth.client_id, Some(&self.oauth.client_secret))
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status.as_u16(), &body));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in as i64);

        self.credentials.access_token = Some(token.access_token.clone());
        self.credentials.refresh_token = token.refresh_token.clone();
        self.credentials.expires_at = Some(expires_at);

        tracing::info!("token refresh successful");
        Ok(TokenUpdate {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }
}

/// Exchange an OAuth authorization code for an initial credential triple.
/// Used once at onboarding, never in the steady-state sync loop.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    oauth: &OauthConfig,
    authorization_code: &str,
    redirect_uri: &str,
) -> Result<TokenUpdate, QboError> {
    let response = http
        .post(&oauth.token_url)
        .basic_auth(&oauth.client_id, Some(&oauth.client_secret))
        .header(ACCEPT, "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", authorization_code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_token_error(status.as_u16(), &body));
    }

    let token: TokenResponse = response.json().await?;
    Ok(TokenUpdate {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at: Utc::now() + Duration::seconds(token.expires_in as i64),
    })
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

fn classify_token_error(status: u16, body: &str) -> QboError {
    if let Ok(parsed) = serde_json::from_str::<TokenErrorBody>(body) {
        let detail = if parsed.error_description.is_empty() {
            body.to_owned()
        } else {
            parsed.error_description
        };
        if parsed.error == "invalid_grant" {
            return QboError::InvalidGrant(detail);
        }
        return QboError::AuthenticationFailure(format!("token endpoint {status}: {detail}"));
    }
    QboError::AuthenticationFailure(format!("token endpoint {status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oauth_for(server: &MockServer) -> OauthConfig {
        OauthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            token_url: format!("{}/oauth2/v1/tokens/bearer", server.uri()),
        }
    }

    fn token_body(access: &str, refresh: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 3600,
            "token_type": "bearer"
        })
    }

    #[tokio::test]
    async fn refreshes_when_no_access_token_held() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-1", "rt-new")))
            .expect(1)
            .mount(&server)
            .await;

        let mut manager = TokenManager::new(
            oauth_for(&server),
            QboCredentials {
                access_token: None,
                refresh_token: "rt-old".to_string(),
                expires_at: None,
            },
        );

        let update = manager
            .ensure_valid(&reqwest::Client::new())
            .await
            .unwrap()
            .expect("should refresh");
        assert_eq!(update.access_token, "at-1");
        assert_eq!(update.refresh_token, "rt-new");
        assert_eq!(manager.access_token(), Some("at-1"));
        assert_eq!(manager.refresh_token(), "rt-new");
    }

    #[tokio::test]
    async fn skips_refresh_when_token_is_fresh() {
        let server = MockServer::start().await;
        // No mock mounted: any request would 404 and fail the call.

        let mut manager = TokenManager::new(
            oauth_for(&server),
            QboCredentials {
                access_token: Some("at-live".to_string()),
                refresh_token: "rt".to_string(),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            },
        );

        let update = manager.ensure_valid(&reqwest::Client::new()).await.unwrap();
        assert!(update.is_none());
        assert_eq!(manager.access_token(), Some("at-live"));
    }

    #[tokio::test]
    async fn refreshes_inside_expiry_margin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-2", "rt-2")))
            .expect(1)
            .mount(&server)
            .await;

        // Expires in 2 minutes: inside the 5 minute margin.
        let mut manager = TokenManager::new(
            oauth_for(&server),
            QboCredentials {
                access_token: Some("at-stale".to_string()),
                refresh_token: "rt".to_string(),
                expires_at: Some(Utc::now() + Duration::minutes(2)),
            },
        );

        let update = manager.ensure_valid(&reqwest::Client::new()).await.unwrap();
        assert!(update.is_some());
    }

    #[tokio::test]
    async fn invalid_grant_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token expired or revoked"
            })))
            .mount(&server)
            .await;

        let mut manager = TokenManager::new(
            oauth_for(&server),
            QboCredentials {
                access_token: None,
                refresh_token: "rt-revoked".to_string(),
                expires_at: None,
            },
        );

        let err = manager
            .ensure_valid(&reqwest::Client::new())
            .await
            .unwrap_err();
        match err {
            QboError::InvalidGrant(detail) => {
                assert!(detail.contains("revoked"), "got: {detail}")
            }
            other => panic!("expected InvalidGrant, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_refresh_failures_are_authentication_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream broke"))
            .mount(&server)
            .await;

        let mut manager = TokenManager::new(
            oauth_for(&server),
            QboCredentials {
                access_token: None,
                refresh_token: "rt".to_string(),
                expires_at: None,
            },
        );

        let err = manager
            .ensure_valid(&reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QboError::AuthenticationFailure(_)));
    }

    #[tokio::test]
    async fn exchanges_authorization_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-0", "rt-0")))
            .mount(&server)
            .await;

        let update = exchange_authorization_code(
            &reqwest::Client::new(),
            &oauth_for(&server),
            "auth-123",
            "https://example.com/callback",
        )
        .await
        .unwrap();
        assert_eq!(update.access_token, "at-0");
        assert_eq!(update.refresh_token, "rt-0");
        assert!(update.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn exchange_failure_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_request",
                "error_description": "code already used"
            })))
            .mount(&server)
            .await;

        let err = exchange_authorization_code(
            &reqwest::Client::new(),
            &oauth_for(&server),
            "auth-123",
            "https://example.com/callback",
        )
        .await
        .unwrap_err();
        match err {
            QboError::AuthenticationFailure(detail) => {
                assert!(detail.contains("code already used"), "got: {detail}")
            }
            other => panic!("expected AuthenticationFailure, got: {other:?}"),
        }
    }
}
