use async_trait::async_trait;
use uuid::Uuid;

use crate::records::models::{CheckpointAdvance, Customer, CustomerRow, Invoice, InvoiceRow};
use booksync_common::error::BooksyncResult;

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Upsert a page of customers in one transaction, optionally advancing
    /// the sync checkpoint in the same transaction. Re-ingesting a qbo_id
    /// overwrites the stored row; it never duplicates.
    async fn upsert_customer_batch(
        &self,
        rows: &[CustomerRow],
        advance: Option<&CheckpointAdvance>,
    ) -> BooksyncResult<u64>;

    /// Same contract as `upsert_customer_batch`, for invoices.
    async fn upsert_invoice_batch(
        &self,
        rows: &[InvoiceRow],
        advance: Option<&CheckpointAdvance>,
    ) -> BooksyncResult<u64>;

    async fn count_customers(&self, account_id: Uuid) -> BooksyncResult<i64>;

    async fn count_invoices(&self, account_id: Uuid) -> BooksyncResult<i64>;

    async fn list_customers(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> BooksyncResult<Vec<Customer>>;

    async fn list_invoices(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> BooksyncResult<Vec<Invoice>>;
}
