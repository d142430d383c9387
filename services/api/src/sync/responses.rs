use serde::Serialize;

use booksync_engine::{AccountSyncReport, SyncCycleReport};

/// Result of an explicitly triggered sync: one account, or a full cycle.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TriggerResponse {
    Account { data: AccountSyncReport },
    Cycle { data: SyncCycleReport },
}
