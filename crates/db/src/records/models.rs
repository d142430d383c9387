use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored QBO customer. The payload is kept verbatim; only the fields
/// needed for upserts and incremental sync are lifted out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub account_id: Uuid,
    pub qbo_id: String,
    pub raw_data: serde_json::Value,
    pub sync_token: Option<String>,
    pub last_updated_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored QBO invoice. `customer_ref` is extracted from the payload so
/// invoices can be queried per customer without JSON digging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub account_id: Uuid,
    pub qbo_id: String,
    pub customer_ref: Option<String>,
    pub raw_data: serde_json::Value,
    pub sync_token: Option<String>,
    pub last_updated_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One customer to upsert, as extracted from a QBO query page.
#[derive(Debug, Clone)]
pub struct CustomerRow {
    pub account_id: Uuid,
    pub qbo_id: String,
    pub raw_data: serde_json::Value,
    pub sync_token: Option<String>,
    pub last_updated_time: Option<DateTime<Utc>>,
}

/// One invoice to upsert, as extracted from a QBO query page.
#[derive(Debug, Clone)]
pub struct InvoiceRow {
    pub account_id: Uuid,
    pub qbo_id: String,
    pub customer_ref: Option<String>,
    pub raw_data: serde_json::Value,
    pub sync_token: Option<String>,
    pub last_updated_time: Option<DateTime<Utc>>,
}

/// Watermark advance committed together with a batch of upserts, so an
/// observer never sees the checkpoint ahead of unflushed records.
#[derive(Debug, Clone)]
pub struct CheckpointAdvance {
    pub sync_state_id: Uuid,
    pub watermark: String,
}
