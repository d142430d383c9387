use chrono::{DateTime, Utc};
use serde::Serialize;

use booksync_common::types::ObjectType;
use booksync_db::sync::models::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// Not attempted because an earlier outcome made it pointless, e.g. the
    /// account's grant was revoked mid-cycle.
    Skipped,
}

/// Result of syncing one object type for one account.
#[derive(Debug, Clone, Serialize)]
pub struct TypeOutcome {
    pub object_type: ObjectType,
    pub status: OutcomeStatus,
    pub records_synced: u64,
    pub checkpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TypeOutcome {
    pub fn success(object_type: ObjectType, records_synced: u64, checkpoint: Option<String>) -> Self {
        Self {
            object_type,
            status: OutcomeStatus::Success,
            records_synced,
            checkpoint,
            error: None,
        }
    }

    pub fn failed(object_type: ObjectType, error: String) -> Self {
        Self {
            object_type,
            status: OutcomeStatus::Failed,
            records_synced: 0,
            checkpoint: None,
            error: Some(error),
        }
    }

    pub fn skipped(object_type: ObjectType, reason: &str) -> Self {
        Self {
            object_type,
            status: OutcomeStatus::Skipped,
            records_synced: 0,
            checkpoint: None,
            error: Some(reason.to_string()),
        }
    }
}

/// Per-account outcome for one sync cycle. A failed type never hides the
/// other types' outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSyncReport {
    pub realm_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub requires_reauthorization: bool,
    /// Account-level failure, set when no per-type work could run (revoked
    /// grant discovered mid-cycle, client construction failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outcomes: Vec<TypeOutcome>,
}

impl AccountSyncReport {
    pub fn total_synced(&self) -> u64 {
        self.outcomes.iter().map(|o| o.records_synced).sum()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == OutcomeStatus::Success)
    }
}

/// Outcome of one full pass over the active accounts.
#[derive(Debug, Clone, Serialize)]
pub struct SyncCycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts: Vec<AccountSyncReport>,
}

impl SyncCycleReport {
    pub fn total_synced(&self) -> u64 {
        self.accounts.iter().map(AccountSyncReport::total_synced).sum()
    }

    pub fn failed_accounts(&self) -> usize {
        self.accounts.iter().filter(|a| !a.all_succeeded()).count()
    }
}

/// Read-only status view served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub realm_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub is_revoked: bool,
    pub customer_count: i64,
    pub invoice_count: i64,
    pub states: Vec<SyncState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub accounts: Vec<AccountStatus>,
}
