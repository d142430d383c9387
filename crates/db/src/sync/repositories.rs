use async_trait::async_trait;
use uuid::Uuid;

use crate::sync::models::SyncState;
use booksync_common::error::BooksyncResult;
use booksync_common::types::ObjectType;

#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Get or create the checkpoint row for an account + object type pair.
    /// New rows start as `pending` with no watermark.
    async fn get_or_create(
        &self,
        account_id: Uuid,
        object_type: ObjectType,
    ) -> BooksyncResult<SyncState>;

    /// Transition to `in_progress`: stamps the attempt instant and clears the
    /// last error. The attempt stamp is informational, not a lock; a cycle
    /// interrupted mid-flight is safely re-entered by the next one.
    async fn mark_started(&self, id: Uuid) -> BooksyncResult<SyncState>;

    /// Transition to `success`: stamps the success instant, zeroes the failure
    /// counter, clears the error, and advances the watermark. The advance is
    /// guarded so the watermark never moves backwards (string comparison).
    async fn mark_success(&self, id: Uuid, checkpoint: Option<&str>) -> BooksyncResult<SyncState>;

    /// Transition to `failed`: records the error and bumps the failure
    /// counter. The watermark is left untouched so the next cycle resumes
    /// from the last committed batch.
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> BooksyncResult<SyncState>;

    async fn list_for_account(&self, account_id: Uuid) -> BooksyncResult<Vec<SyncState>>;
}
