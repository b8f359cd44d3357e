use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use duet_db::Database;
use tracing::{error, info, warn};

/// Background task that deletes invites past their `expires_at`.
pub async fn run_purge_loop(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.purge_expired_invites(Utc::now())).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("purged {} expired invites", count);
                }
            }
            Ok(Err(e)) => warn!("invite purge failed: {:#}", e),
            Err(e) => error!("invite purge task panicked: {}", e),
        }
    }
}
