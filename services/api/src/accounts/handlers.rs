use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use booksync_db::accounts::models::AccountUpsert;
use booksync_db::accounts::repositories::AccountRepository;
use booksync_qbo::exchange_authorization_code;

use crate::accounts::responses::{AccountListResponse, AccountResponse};
use crate::error::{validation, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub code: String,
    pub realm_id: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

/// Complete the OAuth flow: exchange the authorization code for tokens and
/// connect (or re-connect) the realm. Re-authorizing a revoked account
/// clears the revoked flag.
pub async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    if req.code.is_empty() {
        return Err(validation("code must not be empty"));
    }
    if req.realm_id.is_empty() {
        return Err(validation("realm_id must not be empty"));
    }

    let redirect_uri = req.redirect_uri.as_deref().unwrap_or(&state.redirect_uri);
    let tokens =
        exchange_authorization_code(&state.http, &state.oauth, &req.code, redirect_uri).await?;

    let account = state
        .account_repo
        .create_or_update(&AccountUpsert {
            realm_id: req.realm_id,
            refresh_token: tokens.refresh_token,
            access_token: Some(tokens.access_token),
            access_token_expires_at: Some(tokens.expires_at),
            company_name: req.company_name,
        })
        .await?;

    tracing::info!(realm_id = %account.realm_id, "account authorized");
    Ok(Json(account.into()))
}

pub async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<AccountListResponse>, ApiError> {
    let accounts = state.account_repo.list_all().await?;
    let data: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();
    let count = data.len();
    Ok(Json(AccountListResponse { data, count }))
}
