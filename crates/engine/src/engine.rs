use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use booksync_common::error::BooksyncError;
use booksync_common::types::ObjectType;
use booksync_db::accounts::models::QboAccount;
use booksync_db::accounts::repositories::AccountRepository;
use booksync_db::records::models::{CheckpointAdvance, CustomerRow, InvoiceRow};
use booksync_db::records::repositories::RecordRepository;
use booksync_db::sync::models::SyncState;
use booksync_db::sync::repositories::SyncStateRepository;
use booksync_qbo::models::{extract_customer_ref, extract_entity_fields, parse_last_updated};
use booksync_qbo::{QboClient, QboClientConfig, QboCredentials, QboError};

use crate::report::{
    AccountStatus, AccountSyncReport, SyncCycleReport, SyncStatusReport, TypeOutcome,
};

const REAUTH_MESSAGE: &str = "Re-authorization required";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no account found for realm {0}")]
    AccountNotFound(String),

    #[error("account for realm {0} is revoked; re-authorization required")]
    Revoked(String),

    #[error(transparent)]
    Qbo(#[from] QboError),

    #[error(transparent)]
    Db(#[from] BooksyncError),
}

/// Drives sync cycles over connected accounts.
///
/// Generic over the repository traits so orchestration behavior is testable
/// without a database. One engine instance serves both the API service and
/// the background sync loop.
pub struct SyncEngine<A, S, R> {
    accounts: Arc<A>,
    states: Arc<S>,
    records: Arc<R>,
    client_config: QboClientConfig,
    api_base: Option<String>,
    token_url: Option<String>,
}

impl<A, S, R> SyncEngine<A, S, R>
where
    A: AccountRepository,
    S: SyncStateRepository,
    R: RecordRepository,
{
    pub fn new(
        accounts: Arc<A>,
        states: Arc<S>,
        records: Arc<R>,
        client_config: QboClientConfig,
    ) -> Self {
        Self {
            accounts,
            states,
            records,
            client_config,
            api_base: None,
            token_url: None,
        }
    }

    /// Redirect QBO API calls to a different base URL (tests).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = Some(base.to_string());
        self
    }

    /// Redirect token refreshes to a different endpoint (tests).
    pub fn with_token_url(mut self, url: &str) -> Self {
        self.token_url = Some(url.to_string());
        self
    }

    /// Sync every active account. Per-account failures are folded into the
    /// returned report; this method itself only fails when the account list
    /// cannot be read.
    pub async fn sync_all_accounts(&self) -> Result<SyncCycleReport, SyncError> {
        let started_at = Utc::now();
        let accounts = self.accounts.get_active().await?;
        tracing::info!(account_count = accounts.len(), "starting sync cycle");

        let mut reports = Vec::with_capacity(accounts.len());
        for account in &accounts {
            let report = match self.sync_one(account).await {
                Ok(report) => report,
                Err(SyncError::Revoked(_)) => {
                    tracing::warn!(
                        realm_id = %account.realm_id,
                        "account needs re-authorization"
                    );
                    revoked_report(account)
                }
                Err(err) => {
                    tracing::error!(realm_id = %account.realm_id, error = %err, "account sync failed");
                    failed_report(account, &err)
                }
            };
            reports.push(report);
        }

        let cycle = SyncCycleReport {
            started_at,
            finished_at: Utc::now(),
            accounts: reports,
        };
        tracing::info!(
            total_synced = cycle.total_synced(),
            failed_accounts = cycle.failed_accounts(),
            "sync cycle complete"
        );
        Ok(cycle)
    }

    /// Sync a single account by realm id. Unknown and revoked accounts fail
    /// fast; a grant revoked mid-run also surfaces as `Revoked`. Ordinary
    /// per-type failures are folded into the report.
    pub async fn sync_account(&self, realm_id: &str) -> Result<AccountSyncReport, SyncError> {
        let account = self
            .accounts
            .get_by_realm_id(realm_id)
            .await?
            .ok_or_else(|| SyncError::AccountNotFound(realm_id.to_string()))?;

        if account.is_revoked {
            return Err(SyncError::Revoked(realm_id.to_string()));
        }

        self.sync_one(&account).await
    }

    /// Run all object types for one account. Types are isolated from each
    /// other: a failure in one is recorded in its outcome and the next type
    /// still runs. The one exception is a revoked grant, which makes every
    /// further call pointless: the account is marked revoked exactly once and
    /// the distinct `Revoked` error short-circuits the remaining types.
    async fn sync_one(&self, account: &QboAccount) -> Result<AccountSyncReport, SyncError> {
        let mut report = AccountSyncReport {
            realm_id: account.realm_id.clone(),
            company_name: account.company_name.clone(),
            requires_reauthorization: false,
            error: None,
            outcomes: Vec::with_capacity(ObjectType::ALL.len()),
        };

        let mut client = self.client_for(account)?;

        for object_type in ObjectType::ALL {
            match self.sync_object_type(account, &mut client, object_type).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(SyncError::Qbo(QboError::InvalidGrant(detail))) => {
                    tracing::warn!(
                        realm_id = %account.realm_id,
                        detail = %detail,
                        "refresh token rejected, marking account revoked"
                    );
                    if let Err(err) = self.accounts.mark_revoked(account.id).await {
                        tracing::error!(error = %err, "failed to mark account revoked");
                    }
                    return Err(SyncError::Revoked(account.realm_id.clone()));
                }
                Err(err) => {
                    report
                        .outcomes
                        .push(TypeOutcome::failed(object_type, err.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn sync_object_type(
        &self,
        account: &QboAccount,
        client: &mut QboClient,
        object_type: ObjectType,
    ) -> Result<TypeOutcome, SyncError> {
        let state = self.states.get_or_create(account.id, object_type).await?;
        self.states.mark_started(state.id).await?;
        tracing::info!(
            realm_id = %account.realm_id,
            object_type = %object_type,
            checkpoint = state.checkpoint.as_deref().unwrap_or("none"),
            "syncing object type"
        );

        match self.pull_changes(account, client, object_type, &state).await {
            Ok((count, watermark)) => {
                let updated = self
                    .states
                    .mark_success(state.id, watermark.as_deref())
                    .await?;
                tracing::info!(
                    realm_id = %account.realm_id,
                    object_type = %object_type,
                    records_synced = count,
                    "object type sync complete"
                );
                Ok(TypeOutcome::success(object_type, count, updated.checkpoint))
            }
            Err(err) => {
                if let Err(mark_err) = self.states.mark_failed(state.id, &err.to_string()).await {
                    tracing::error!(error = %mark_err, "failed to record sync failure");
                }
                Err(err)
            }
        }
    }

    /// Pull and store every page changed since the state's checkpoint. Each
    /// page commits together with its watermark advance, so an interruption
    /// resumes from the last committed page, not from zero.
    async fn pull_changes(
        &self,
        account: &QboAccount,
        client: &mut QboClient,
        object_type: ObjectType,
        state: &SyncState,
    ) -> Result<(u64, Option<String>), SyncError> {
        if let Some(update) = client.ensure_token_valid().await? {
            self.accounts
                .update_tokens(
                    account.id,
                    &update.access_token,
                    &update.refresh_token,
                    update.expires_at,
                )
                .await?;
        }

        let mut watermark = state.checkpoint.clone();
        let mut total = 0u64;
        let mut pager = client.fetch_changed(object_type, state.checkpoint.as_deref());

        while let Some(batch) = pager.next_batch().await? {
            let mut batch_max = watermark.clone();
            let stored = match object_type {
                ObjectType::Customer => {
                    let mut rows = Vec::with_capacity(batch.len());
                    for entity in &batch {
                        let Some(fields) = extract_entity_fields(entity) else {
                            tracing::warn!(object_type = %object_type, "skipping record without Id");
                            continue;
                        };
                        bump_watermark(&mut batch_max, fields.last_updated.as_deref());
                        rows.push(CustomerRow {
                            account_id: account.id,
                            qbo_id: fields.qbo_id,
                            raw_data: entity.clone(),
                            sync_token: fields.sync_token,
                            last_updated_time: fields
                                .last_updated
                                .as_deref()
                                .and_then(parse_last_updated),
                        });
                    }
                    let advance = advance_for(state, watermark.as_deref(), batch_max.as_deref());
                    self.records
                        .upsert_customer_batch(&rows, advance.as_ref())
                        .await?
                }
                ObjectType::Invoice => {
                    let mut rows = Vec::with_capacity(batch.len());
                    for entity in &batch {
                        let Some(fields) = extract_entity_fields(entity) else {
                            tracing::warn!(object_type = %object_type, "skipping record without Id");
                            continue;
                        };
                        bump_watermark(&mut batch_max, fields.last_updated.as_deref());
                        rows.push(InvoiceRow {
                            account_id: account.id,
                            qbo_id: fields.qbo_id,
                            customer_ref: extract_customer_ref(entity),
                            raw_data: entity.clone(),
                            sync_token: fields.sync_token,
                            last_updated_time: fields
                                .last_updated
                                .as_deref()
                                .and_then(parse_last_updated),
                        });
                    }
                    let advance = advance_for(state, watermark.as_deref(), batch_max.as_deref());
                    self.records
                        .upsert_invoice_batch(&rows, advance.as_ref())
                        .await?
                }
            };

            total += stored;
            watermark = batch_max;
        }

        Ok((total, watermark))
    }

    /// Status view across accounts, or one account when a realm id is given.
    pub async fn get_sync_status(
        &self,
        realm_id: Option<&str>,
    ) -> Result<SyncStatusReport, SyncError> {
        let accounts = match realm_id {
            Some(realm_id) => {
                let account = self
                    .accounts
                    .get_by_realm_id(realm_id)
                    .await?
                    .ok_or_else(|| SyncError::AccountNotFound(realm_id.to_string()))?;
                vec![account]
            }
            None => self.accounts.list_all().await?,
        };

        let mut statuses = Vec::with_capacity(accounts.len());
        for account in accounts {
            statuses.push(AccountStatus {
                customer_count: self.records.count_customers(account.id).await?,
                invoice_count: self.records.count_invoices(account.id).await?,
                states: self.states.list_for_account(account.id).await?,
                realm_id: account.realm_id,
                company_name: account.company_name,
                is_revoked: account.is_revoked,
            });
        }

        Ok(SyncStatusReport { accounts: statuses })
    }

    fn client_for(&self, account: &QboAccount) -> Result<QboClient, QboError> {
        let credentials = QboCredentials {
            access_token: account.access_token.clone(),
            refresh_token: account.refresh_token.clone(),
            expires_at: account.access_token_expires_at,
        };
        let mut client =
            QboClient::new(self.client_config.clone(), &account.realm_id, credentials)?;
        if let Some(base) = &self.api_base {
            client = client.with_base_url(base);
        }
        if let Some(url) = &self.token_url {
            client = client.with_token_url(url);
        }
        Ok(client)
    }
}

fn revoked_report(account: &QboAccount) -> AccountSyncReport {
    AccountSyncReport {
        realm_id: account.realm_id.clone(),
        company_name: account.company_name.clone(),
        requires_reauthorization: true,
        error: Some(REAUTH_MESSAGE.to_string()),
        outcomes: ObjectType::ALL
            .iter()
            .map(|ot| TypeOutcome::skipped(*ot, REAUTH_MESSAGE))
            .collect(),
    }
}

fn failed_report(account: &QboAccount, err: &SyncError) -> AccountSyncReport {
    AccountSyncReport {
        realm_id: account.realm_id.clone(),
        company_name: account.company_name.clone(),
        requires_reauthorization: false,
        error: Some(err.to_string()),
        outcomes: ObjectType::ALL
            .iter()
            .map(|ot| TypeOutcome::failed(*ot, err.to_string()))
            .collect(),
    }
}

/// Raise the running watermark if the candidate is newer. QBO timestamps are
/// fixed-width RFC3339, so string order is time order.
fn bump_watermark(current: &mut Option<String>, candidate: Option<&str>) {
    if let Some(candidate) = candidate {
        if current.as_deref().map_or(true, |c| candidate > c) {
            *current = Some(candidate.to_string());
        }
    }
}

fn advance_for(
    state: &SyncState,
    previous: Option<&str>,
    batch_max: Option<&str>,
) -> Option<CheckpointAdvance> {
    batch_max
        .filter(|max| previous.map_or(true, |prev| *max > prev))
        .map(|max| CheckpointAdvance {
            sync_state_id: state.id,
            watermark: max.to_string(),
        })
}
