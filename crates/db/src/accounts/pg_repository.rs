use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::accounts::models::{AccountUpsert, QboAccount};
use crate::accounts::repositories::AccountRepository;
use booksync_common::error::{BooksyncError, BooksyncResult};
use booksync_common::types::ObjectType;

const ACCOUNT_COLUMNS: &str = "id, realm_id, company_name, access_token, refresh_token, \
     access_token_expires_at, is_revoked, created_at, updated_at";

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> BooksyncResult<QboAccount> {
        Ok(QboAccount {
            id: row.get("id"),
            realm_id: row.get("realm_id"),
            company_name: row.get("company_name"),
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            access_token_expires_at: row.get("access_token_expires_at"),
            is_revoked: row.get("is_revoked"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn get_by_realm_id(&self, realm_id: &str) -> BooksyncResult<Option<QboAccount>> {
        let row = sqlx::query(&format!(
            "select {ACCOUNT_COLUMNS} from qbo_accounts where realm_id = $1"
        ))
        .bind(realm_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_active(&self) -> BooksyncResult<Vec<QboAccount>> {
        let rows = sqlx::query(&format!(
            "select {ACCOUNT_COLUMNS} from qbo_accounts \
             where is_revoked = false and refresh_token <> '' \
             order by created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn list_all(&self) -> BooksyncResult<Vec<QboAccount>> {
        let rows = sqlx::query(&format!(
            "select {ACCOUNT_COLUMNS} from qbo_accounts order by created_at desc"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn create_or_update(&self, upsert: &AccountUpsert) -> BooksyncResult<QboAccount> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        let row = sqlx::query(&format!(
            "insert into qbo_accounts \
               (id, realm_id, company_name, access_token, refresh_token, \
                access_token_expires_at, is_revoked) \
             values ($1, $2, $3, $4, $5, $6, false) \
             on conflict (realm_id) do update set \
               refresh_token = excluded.refresh_token, \
               access_token = excluded.access_token, \
               access_token_expires_at = excluded.access_token_expires_at, \
               company_name = coalesce(excluded.company_name, qbo_accounts.company_name), \
               is_revoked = false, \
               updated_at = now() \
             returning {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&upsert.realm_id)
        .bind(&upsert.company_name)
        .bind(&upsert.access_token)
        .bind(&upsert.refresh_token)
        .bind(upsert.access_token_expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        let account = Self::map_row(row)?;

        // Seed a pending sync state per object type; no-op when they exist.
        for object_type in ObjectType::ALL {
            sqlx::query(
                "insert into sync_states (id, account_id, object_type) \
                 values ($1, $2, $3) \
                 on conflict (account_id, object_type) do nothing",
            )
            .bind(Uuid::new_v4())
            .bind(account.id)
            .bind(object_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Ok(account)
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> BooksyncResult<()> {
        sqlx::query(
            "update qbo_accounts \
             set access_token = $1, refresh_token = $2, access_token_expires_at = $3, \
                 is_revoked = false, updated_at = now() \
             where id = $4",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_revoked(&self, id: Uuid) -> BooksyncResult<()> {
        sqlx::query("update qbo_accounts set is_revoked = true, updated_at = now() where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| BooksyncError::Database(e.to_string()))?;

        Ok(())
    }
}
