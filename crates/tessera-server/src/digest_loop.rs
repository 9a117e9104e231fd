use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tessera_messaging::DigestBatcher;

/// Background task that sends unread-message digests.
///
/// Each tick runs one batch of at most `batch_size` emails on the blocking
/// pool; per-user throttling lives in the batcher itself.
pub async fn run_digest_loop(batcher: Arc<DigestBatcher>, interval_secs: u64, batch_size: usize) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let batcher = batcher.clone();
        match tokio::task::spawn_blocking(move || batcher.run_batch(batch_size)).await {
            Ok(Ok(summary)) => {
                if summary.sent > 0 {
                    info!("Digest: sent {} of {} candidates", summary.sent, summary.candidates);
                }
            }
            Ok(Err(e)) => warn!("Digest error: {}", e),
            Err(e) => warn!("Digest task failed: {}", e),
        }
    }
}
