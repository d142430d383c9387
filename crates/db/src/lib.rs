pub mod accounts;
pub mod records;
pub mod sync;

use booksync_common::error::{BooksyncError, BooksyncResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> BooksyncResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| BooksyncError::Database(e.to_string()))
}
