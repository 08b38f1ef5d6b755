use std::time::Duration;

use anyhow::{Context, Result};
use mongodb::bson::doc;

const CHECK_INTERVAL: Duration = Duration::from_secs(2);
const TIMEOUT: Duration = Duration::from_secs(60);

/// Blocks until the document store answers a ping.
///
/// Polled every 2 seconds; fails after 60 seconds if the store is still
/// unreachable. The journal and strategy collections are useless without it,
/// so startup waits here before serving traffic.
pub async fn wait_for_store(db: &mongodb::Database) -> Result<()> {
    tracing::info!("healthcheck_starting");
    let deadline = tokio::time::Instant::now() + TIMEOUT;

    loop {
        match db.run_command(doc! {"ping": 1}).await {
            Ok(_) => {
                tracing::info!("store_ready");
                return Ok(());
            }
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(e).context("document store not ready within 60s");
                }
                tracing::warn!(error = %e, "waiting_for_store");
                tokio::time::sleep(CHECK_INTERVAL).await;
            }
        }
    }
}
