use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected QuickBooks Online company.
///
/// Each QBO company is identified by a realm_id; this row holds the OAuth
/// credentials needed to reach that company's data. The refresh token rotates
/// on every refresh, so the stored value must be replaced whenever the token
/// manager reports an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QboAccount {
    pub id: Uuid,
    pub realm_id: String,
    pub company_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    /// True when the refresh token was rejected and re-authorization is required.
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for onboarding or re-authorizing an account.
#[derive(Debug, Clone)]
pub struct AccountUpsert {
    pub realm_id: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub company_name: Option<String>,
}
