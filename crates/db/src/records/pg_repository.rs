use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::records::models::{CheckpointAdvance, Customer, CustomerRow, Invoice, InvoiceRow};
use crate::records::repositories::RecordRepository;
use booksync_common::error::{BooksyncError, BooksyncResult};

#[derive(Clone)]
pub struct PgRecordRepository {
    pool: PgPool,
}

impl PgRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_customer_row(row: PgRow) -> BooksyncResult<Customer> {
        Ok(Customer {
            id: row.get("id"),
            account_id: row.get("account_id"),
            qbo_id: row.get("qbo_id"),
            raw_data: row.get("raw_data"),
            sync_token: row.get("sync_token"),
            last_updated_time: row.get("last_updated_time"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn map_invoice_row(row: PgRow) -> BooksyncResult<Invoice> {
        Ok(Invoice {
            id: row.get("id"),
            account_id: row.get("account_id"),
            qbo_id: row.get("qbo_id"),
            customer_ref: row.get("customer_ref"),
            raw_data: row.get("raw_data"),
            sync_token: row.get("sync_token"),
            last_updated_time: row.get("last_updated_time"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Advance the checkpoint inside the batch transaction. The guard keeps
    /// the watermark monotonic under string comparison.
    async fn advance_checkpoint(
        tx: &mut Transaction<'_, Postgres>,
        advance: &CheckpointAdvance,
    ) -> BooksyncResult<()> {
        sqlx::query(
            "update sync_states \
             set checkpoint = $1, updated_at = now() \
             where id = $2 and (checkpoint is null or checkpoint < $1)",
        )
        .bind(&advance.watermark)
        .bind(advance.sync_state_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl RecordRepository for PgRecordRepository {
    async fn upsert_customer_batch(
        &self,
        rows: &[CustomerRow],
        advance: Option<&CheckpointAdvance>,
    ) -> BooksyncResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        let mut upserted = 0u64;
        for row in rows {
            sqlx::query(
                "insert into customers \
                   (id, account_id, qbo_id, raw_data, sync_token, last_updated_time) \
                 values ($1, $2, $3, $4, $5, $6) \
                 on conflict (account_id, qbo_id) do update set \
                   raw_data = excluded.raw_data, \
                   sync_token = excluded.sync_token, \
                   last_updated_time = excluded.last_updated_time, \
                   updated_at = now()",
            )
            .bind(Uuid::new_v4())
            .bind(row.account_id)
            .bind(&row.qbo_id)
            .bind(&row.raw_data)
            .bind(&row.sync_token)
            .bind(row.last_updated_time)
            .execute(&mut *tx)
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;
            upserted += 1;
        }

        if let Some(advance) = advance {
            Self::advance_checkpoint(&mut tx, advance).await?;
        }

        tx.commit()
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Ok(upserted)
    }

    async fn upsert_invoice_batch(
        &self,
        rows: &[InvoiceRow],
        advance: Option<&CheckpointAdvance>,
    ) -> BooksyncResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        let mut upserted = 0u64;
        for row in rows {
            sqlx::query(
                "insert into invoices \
                   (id, account_id, qbo_id, customer_ref, raw_data, sync_token, last_updated_time) \
                 values ($1, $2, $3, $4, $5, $6, $7) \
                 on conflict (account_id, qbo_id) do update set \
                   customer_ref = excluded.customer_ref, \
                   raw_data = excluded.raw_data, \
                   sync_token = excluded.sync_token, \
                   last_updated_time = excluded.last_updated_time, \
                   updated_at = now()",
            )
            .bind(Uuid::new_v4())
            .bind(row.account_id)
            .bind(&row.qbo_id)
            .bind(&row.customer_ref)
            .bind(&row.raw_data)
            .bind(&row.sync_token)
            .bind(row.last_updated_time)
            .execute(&mut *tx)
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;
            upserted += 1;
        }

        if let Some(advance) = advance {
            Self::advance_checkpoint(&mut tx, advance).await?;
        }

        tx.commit()
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Ok(upserted)
    }

    async fn count_customers(&self, account_id: Uuid) -> BooksyncResult<i64> {
        sqlx::query_scalar("select count(*) from customers where account_id = $1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))
    }

    async fn count_invoices(&self, account_id: Uuid) -> BooksyncResult<i64> {
        sqlx::query_scalar("select count(*) from invoices where account_id = $1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))
    }

    async fn list_customers(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> BooksyncResult<Vec<Customer>> {
        let rows = sqlx::query(
            "select id, account_id, qbo_id, raw_data, sync_token, last_updated_time, \
                    created_at, updated_at \
             from customers where account_id = $1 \
             order by updated_at desc limit $2 offset $3",
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_customer_row).collect()
    }

    async fn list_invoices(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> BooksyncResult<Vec<Invoice>> {
        let rows = sqlx::query(
            "select id, account_id, qbo_id, customer_ref, raw_data, sync_token, \
                    last_updated_time, created_at, updated_at \
             from invoices where account_id = $1 \
             order by updated_at desc limit $2 offset $3",
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_invoice_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;
    use chrono::Utc;

    async fn test_repo() -> Option<(PgRecordRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");

        sqlx::query(
            "create table if not exists customers (
               id uuid primary key,
               account_id uuid not null,
               qbo_id text not null,
               raw_data jsonb not null,
               sync_token text,
               last_updated_time timestamptz,
               created_at timestamptz not null default now(),
               updated_at timestamptz not null default now(),
               unique (account_id, qbo_id)
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

        sqlx::query(
            "create table if not exists invoices (
               id uuid primary key,
               account_id uuid not null,
               qbo_id text not null,
               customer_ref text,
               raw_data jsonb not null,
               sync_token text,
               last_updated_time timestamptz,
               created_at timestamptz not null default now(),
               updated_at timestamptz not null default now(),
               unique (account_id, qbo_id)
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

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

        Some((PgRecordRepository::new(pool.clone()), pool))
    }

    fn customer_row(account_id: Uuid, qbo_id: &str, name: &str) -> CustomerRow {
        CustomerRow {
            account_id,
            qbo_id: qbo_id.to_string(),
            raw_data: serde_json::json!({ "Id": qbo_id, "DisplayName": name }),
            sync_token: Some("0".to_string()),
            last_updated_time: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn upsert_customer_batch_is_idempotent() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();

        let first = vec![customer_row(account, "42", "Acme")];
        repo.upsert_customer_batch(&first, None).await.expect("first");

        let second = vec![customer_row(account, "42", "Acme Renamed")];
        repo.upsert_customer_batch(&second, None)
            .await
            .expect("second");

        assert_eq!(repo.count_customers(account).await.expect("count"), 1);
        let stored = repo
            .list_customers(account, 10, 0)
            .await
            .expect("list")
            .remove(0);
        assert_eq!(stored.raw_data["DisplayName"], "Acme Renamed");
    }

    #[tokio::test]
    async fn upsert_invoice_batch_stores_customer_ref() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();

        let rows = vec![InvoiceRow {
            account_id: account,
            qbo_id: "7".to_string(),
            customer_ref: Some("42".to_string()),
            raw_data: serde_json::json!({ "Id": "7", "CustomerRef": { "value": "42" } }),
            sync_token: Some("1".to_string()),
            last_updated_time: Some(Utc::now()),
        }];
        repo.upsert_invoice_batch(&rows, None).await.expect("upsert");

        let stored = repo
            .list_invoices(account, 10, 0)
            .await
            .expect("list")
            .remove(0);
        assert_eq!(stored.customer_ref.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn batch_advances_checkpoint_transactionally() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state_id = Uuid::new_v4();
        sqlx::query(
            "insert into sync_states (id, account_id, object_type, checkpoint) \
             values ($1, $2, 'Customer', '2024-01-01T00:00:00Z')",
        )
        .bind(state_id)
        .bind(account)
        .execute(&pool)
        .await
        .expect("seed state");

        let advance = CheckpointAdvance {
            sync_state_id: state_id,
            watermark: "2024-02-01T00:00:00Z".to_string(),
        };
        repo.upsert_customer_batch(&[customer_row(account, "1", "A")], Some(&advance))
            .await
            .expect("upsert");

        let checkpoint: Option<String> =
            sqlx::query_scalar("select checkpoint from sync_states where id = $1")
                .bind(state_id)
                .fetch_one(&pool)
                .await
                .expect("checkpoint");
        assert_eq!(checkpoint.as_deref(), Some("2024-02-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn stale_advance_does_not_move_checkpoint_backwards() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let account = Uuid::new_v4();
        let state_id = Uuid::new_v4();
        sqlx::query(
            "insert into sync_states (id, account_id, object_type, checkpoint) \
             values ($1, $2, 'Customer', '2024-03-01T00:00:00Z')",
        )
        .bind(state_id)
        .bind(account)
        .execute(&pool)
        .await
        .expect("seed state");

        let advance = CheckpointAdvance {
            sync_state_id: state_id,
            watermark: "2024-02-01T00:00:00Z".to_string(),
        };
        repo.upsert_customer_batch(&[customer_row(account, "1", "A")], Some(&advance))
            .await
            .expect("upsert");

        let checkpoint: Option<String> =
            sqlx::query_scalar("select checkpoint from sync_states where id = $1")
                .bind(state_id)
                .fetch_one(&pool)
                .await
                .expect("checkpoint");
        assert_eq!(checkpoint.as_deref(), Some("2024-03-01T00:00:00Z"));
    }
}
