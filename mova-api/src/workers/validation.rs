//! Background worker consuming the trip validation queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::state::AppState;

const WORKER_INTERVAL_SECS: u64 = 60;

/// Spawn the validation worker. It ticks once a minute, leasing due queue
/// rows and scoring each at most once per pass.
pub fn spawn(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(WORKER_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match state.validator.run_pass(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "validation pass processed rows"),
                Err(e) => tracing::error!(error = %e, "validation pass failed"),
            }
        }
    })
}
