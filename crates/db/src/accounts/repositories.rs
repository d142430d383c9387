use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::accounts::models::{AccountUpsert, QboAccount};
use booksync_common::error::BooksyncResult;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_by_realm_id(&self, realm_id: &str) -> BooksyncResult<Option<QboAccount>>;

    /// All accounts eligible for automatic sync: not revoked, non-empty refresh token.
    async fn get_active(&self) -> BooksyncResult<Vec<QboAccount>>;

    async fn list_all(&self) -> BooksyncResult<Vec<QboAccount>>;

    /// Create or re-authorize an account. Clears the revoked flag and seeds a
    /// pending sync state per object type if absent.
    async fn create_or_update(&self, upsert: &AccountUpsert) -> BooksyncResult<QboAccount>;

    /// Persist a rotated credential triple. The old refresh token is unusable
    /// once this is called.
    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> BooksyncResult<()>;

    async fn mark_revoked(&self, id: Uuid) -> BooksyncResult<()>;
}
