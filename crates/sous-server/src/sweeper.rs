use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::state::RecipeBackend;

/// Periodically drop expired cache entries until `cancel` fires.
pub fn spawn_cache_sweeper(
    service: Arc<dyn RecipeBackend>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Cache sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = service.sweep_cache();
                    if removed > 0 {
                        tracing::info!(removed, "Swept expired cache entries");
                    }
                }
            }
        }
    })
}
