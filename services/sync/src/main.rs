use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use booksync_config::init_tracing;
use booksync_db::accounts::pg_repository::PgAccountRepository;
use booksync_db::records::pg_repository::PgRecordRepository;
use booksync_db::sync::pg_repository::PgSyncStateRepository;
use booksync_engine::SyncEngine;
use booksync_qbo::QboClientConfig;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    init_tracing("info");
    let _ = dotenvy::dotenv();

    tracing::info!(service = "booksync-sync", "starting");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let qbo_config = QboClientConfig::from_env().expect("qbo configuration error (fail-fast)");

    let pool = booksync_db::create_pool(&database_url)
        .await
        .expect("failed to connect to database");

    let engine = SyncEngine::new(
        Arc::new(PgAccountRepository::new(pool.clone())),
        Arc::new(PgSyncStateRepository::new(pool.clone())),
        Arc::new(PgRecordRepository::new(pool)),
        qbo_config,
    );

    let run_once = std::env::var("SYNC_ONCE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let poll_interval = std::env::var("SYNC_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

    if run_once {
        run_cycle(&engine).await;
        return;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    tracing::info!(poll_interval_secs = poll_interval, "entering sync loop");
    loop {
        run_cycle(&engine).await;

        // Shutdown is only honored between cycles; a cycle in flight always
        // finishes so every started batch commits or rolls back cleanly.
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("sync loop stopped");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(poll_interval)) => {}
        }
    }
}

async fn run_cycle(
    engine: &SyncEngine<PgAccountRepository, PgSyncStateRepository, PgRecordRepository>,
) {
    match engine.sync_all_accounts().await {
        Ok(cycle) => {
            tracing::info!(
                accounts = cycle.accounts.len(),
                total_synced = cycle.total_synced(),
                failed_accounts = cycle.failed_accounts(),
                "cycle finished"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "cycle failed before reaching any account");
        }
    }
}
