use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{SyncState, SyncStatus};
use crate::sync::repositories::SyncStateRepository;
use booksync_common::error::{BooksyncError, BooksyncResult};
use booksync_common::types::ObjectType;

const STATE_COLUMNS: &str = "id, account_id, object_type, status, checkpoint, last_attempt_at, \
     last_success_at, consecutive_failures, error_message, created_at, updated_at";

#[derive(Clone)]
pub struct PgSyncStateRepository {
    pool: PgPool,
}

impl PgSyncStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> BooksyncResult<SyncState> {
        let object_type_raw: String = row.get("object_type");
        let object_type =
            ObjectType::from_str(&object_type_raw).map_err(BooksyncError::Internal)?;
        let status_raw: String = row.get("status");
        let status = SyncStatus::from_str(&status_raw).map_err(BooksyncError::Internal)?;

        Ok(SyncState {
            id: row.get("id"),
            account_id: row.get("account_id"),
            object_type,
            status,
            checkpoint: row.get("checkpoint"),
            last_attempt_at: row.get("last_attempt_at"),
            last_success_at: row.get("last_success_at"),
            consecutive_failures: row.get("consecutive_failures"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SyncStateRepository for PgSyncStateRepository {
    async fn get_or_create(
        &self,
        account_id: Uuid,
        object_type: ObjectType,
    ) -> BooksyncResult<SyncState> {
        let row = sqlx::query(&format!(
            "insert into sync_states (id, account_id, object_type) \
             values ($1, $2, $3) \
             on conflict (account_id, object_type) do update set updated_at = now() \
             returning {STATE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(object_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_started(&self, id: Uuid) -> BooksyncResult<SyncState> {
        let row = sqlx::query(&format!(
            "update sync_states \
             set status = 'in_progress', last_attempt_at = $1, error_message = null, \
                 updated_at = $1 \
             where id = $2 \
             returning {STATE_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_success(&self, id: Uuid, checkpoint: Option<&str>) -> BooksyncResult<SyncState> {
        let row = sqlx::query(&format!(
            "update sync_states \
             set status = 'success', last_success_at = $1, consecutive_failures = 0, \
                 error_message = null, \
                 checkpoint = case \
                   when $2::text is null then checkpoint \
                   when checkpoint is null or checkpoint < $2 then $2 \
                   else checkpoint end, \
                 updated_at = $1 \
             where id = $3 \
             returning {STATE_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(checkpoint)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> BooksyncResult<SyncState> {
        let row = sqlx::query(&format!(
            "update sync_states \
             set status = 'failed', error_message = $1, \
                 consecutive_failures = consecutive_failures + 1, updated_at = $2 \
             where id = $3 \
             returning {STATE_COLUMNS}"
        ))
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn list_for_account(&self, account_id: Uuid) -> BooksyncResult<Vec<SyncState>> {
        let rows = sqlx::query(&format!(
            "select {STATE_COLUMNS} from sync_states where account_id = $1 order by object_type"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    async fn test_repo() -> Option<(PgSyncStateRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");

        sqlx::query(
            "create table if not exists sync_states (
               id uuid primary key,
               account_id uuid not null,
               object_type text not null,
               status text not null default 'pending',
               checkpoint text,
               last_attempt_at timestamptz,
               last_success_at timestamptz,
               consecutive_failures integer not null default 0,
               error_message text,
               created_at timestamptz not null default now(),
               updated_at timestamptz not null default now(),
               unique (account_id, object_type)
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

        Some((PgSyncStateRepository::new(pool.clone()), pool))
    }

    #[tokio::test]
    async fn get_or_create_inserts_pending() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state = repo
            .get_or_create(account, ObjectType::Customer)
            .await
            .expect("should work");
        assert_eq!(state.account_id, account);
        assert_eq!(state.object_type, ObjectType::Customer);
        assert_eq!(state.status, SyncStatus::Pending);
        assert!(state.checkpoint.is_none());
    }

    #[tokio::test]
    async fn get_or_create_returns_existing() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let first = repo
            .get_or_create(account, ObjectType::Invoice)
            .await
            .expect("first");
        let second = repo
            .get_or_create(account, ObjectType::Invoice)
            .await
            .expect("second");
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn mark_started_clears_error_and_stamps_attempt() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state = repo
            .get_or_create(account, ObjectType::Customer)
            .await
            .expect("create");
        repo.mark_failed(state.id, "boom").await.expect("fail");

        let started = repo.mark_started(state.id).await.expect("start");
        assert_eq!(started.status, SyncStatus::InProgress);
        assert!(started.last_attempt_at.is_some());
        assert!(started.error_message.is_none());
    }

    #[tokio::test]
    async fn mark_success_advances_checkpoint_and_resets_failures() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state = repo
            .get_or_create(account, ObjectType::Customer)
            .await
            .expect("create");
        repo.mark_failed(state.id, "boom").await.expect("fail");

        let done = repo
            .mark_success(state.id, Some("2024-03-01T00:00:00Z"))
            .await
            .expect("success");
        assert_eq!(done.status, SyncStatus::Success);
        assert_eq!(done.checkpoint.as_deref(), Some("2024-03-01T00:00:00Z"));
        assert_eq!(done.consecutive_failures, 0);
        assert!(done.last_success_at.is_some());
    }

    #[tokio::test]
    async fn mark_success_never_moves_checkpoint_backwards() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state = repo
            .get_or_create(account, ObjectType::Customer)
            .await
            .expect("create");

        repo.mark_success(state.id, Some("2024-03-01T00:00:00Z"))
            .await
            .expect("first");
        let stale = repo
            .mark_success(state.id, Some("2024-01-01T00:00:00Z"))
            .await
            .expect("stale");
        assert_eq!(stale.checkpoint.as_deref(), Some("2024-03-01T00:00:00Z"));

        let none = repo.mark_success(state.id, None).await.expect("none");
        assert_eq!(none.checkpoint.as_deref(), Some("2024-03-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn mark_failed_increments_counter_and_keeps_checkpoint() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state = repo
            .get_or_create(account, ObjectType::Invoice)
            .await
            .expect("create");
        repo.mark_success(state.id, Some("2024-02-01T00:00:00Z"))
            .await
            .expect("success");

        let first = repo.mark_failed(state.id, "timeout").await.expect("fail 1");
        let second = repo.mark_failed(state.id, "timeout").await.expect("fail 2");
        assert_eq!(first.consecutive_failures, 1);
        assert_eq!(second.consecutive_failures, 2);
        assert_eq!(second.status, SyncStatus::Failed);
        assert_eq!(second.checkpoint.as_deref(), Some("2024-02-01T00:00:00Z"));
        assert_eq!(second.error_message.as_deref(), Some("timeout"));
    }
}
