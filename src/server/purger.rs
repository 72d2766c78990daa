use crate::domain_port::FreshnessCache;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically drops elapsed entries from the freshness cache. Validation
/// never depends on this; it only keeps the index from growing.
pub struct FreshnessPurger {
    cache: Arc<dyn FreshnessCache>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl FreshnessPurger {
    pub fn new(
        cache: Arc<dyn FreshnessCache>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            cache,
            interval,
            cancellation_token,
        }
    }

    async fn tick_once(&self) {
        match self.cache.purge_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "purged expired access tokens"),
            Err(e) => tracing::warn!("freshness purge failed: {}", e),
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("freshness purger shutting down...");
                    break;
                }
                _ = ticker.tick() => self.tick_once().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{AccessTokenId, SessionId};
    use crate::infra_memory::MemoryFreshnessCache;

    #[tokio::test]
    async fn purges_until_cancelled() {
        let cache = Arc::new(MemoryFreshnessCache::new());
        let lapsed = AccessTokenId("lapsed".to_string());
        cache
            .mark(
                &lapsed,
                SessionId::new(),
                Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let purger = FreshnessPurger::new(cache.clone(), Duration::from_millis(10), cancel.clone());
        let handle = tokio::spawn(async move { purger.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.purge_expired(Utc::now()).await.unwrap(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
