//! Sync orchestration: walks connected accounts, pulls changed records
//! through the QBO client, and advances per-(account, object type)
//! checkpoints with failure isolation between tenants and types.

pub mod engine;
pub mod report;

pub use engine::{SyncEngine, SyncError};
pub use report::{
    AccountStatus, AccountSyncReport, OutcomeStatus, SyncCycleReport, SyncStatusReport,
    TypeOutcome,
};
