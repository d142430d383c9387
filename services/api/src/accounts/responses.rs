use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use booksync_db::accounts::models::QboAccount;

/// Public view of a connected account. Tokens never leave the server.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub realm_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub is_revoked: bool,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QboAccount> for AccountResponse {
    fn from(account: QboAccount) -> Self {
        Self {
            id: account.id,
            realm_id: account.realm_id,
            company_name: account.company_name,
            is_revoked: account.is_revoked,
            connected_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub data: Vec<AccountResponse>,
    pub count: usize,
}
