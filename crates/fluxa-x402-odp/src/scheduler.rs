//! Background batch-settlement loop.
//!
//! Wakes on a fixed interval and sweeps the facilitator's pending sessions.
//! Shutdown is cooperative: the loop stops taking new sweeps once the
//! cancellation token fires, and an in-flight settle always runs to its
//! natural conclusion; a chain call is never cancelled midway.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chain::OdpChainOps;
use crate::facilitator::OdpDeferredFacilitator;

/// Periodic driver of [`OdpDeferredFacilitator::settle_pending`].
pub struct SettlementScheduler<C> {
    facilitator: Arc<OdpDeferredFacilitator<C>>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl<C: OdpChainOps + Send + Sync + 'static> SettlementScheduler<C> {
    pub fn new(
        facilitator: Arc<OdpDeferredFacilitator<C>>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            facilitator,
            interval,
            cancellation_token,
        }
    }

    /// Spawns the settlement loop onto the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh start
            // does not race the first verify.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = self.cancellation_token.cancelled() => {
                        tracing::info!("settlement scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.facilitator.settle_pending().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixtureOptions, OdpFixture};
    use fluxa_x402_types::scheme::FacilitatorScheme;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_loop_settles_and_evicts_drained_sessions() {
        let fixture = OdpFixture::new(FixtureOptions::default());
        for _ in 0..3 {
            let payload = fixture
                .client
                .build_payment(&fixture.requirements, None)
                .await
                .unwrap();
            assert!(fixture
                .facilitator
                .verify(&payload, &fixture.requirements)
                .await
                .unwrap()
                .is_valid());
        }
        assert_eq!(fixture.facilitator.pending_sessions(), 1);

        let token = CancellationToken::new();
        let handle = SettlementScheduler::new(
            Arc::clone(&fixture.facilitator),
            Duration::from_millis(20),
            token.clone(),
        )
        .spawn();

        // Give the loop a few ticks to drain the session.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if fixture.facilitator.pending_sessions() == 0 {
                break;
            }
        }
        assert_eq!(fixture.facilitator.pending_sessions(), 0);
        assert!(fixture.record().await.receipts.is_empty());
        assert_eq!(
            fixture
                .facilitator
                .metrics()
                .settlement_transactions
                .load(Ordering::Relaxed),
            1
        );
        assert_eq!(
            fixture
                .facilitator
                .metrics()
                .receipts_settled
                .load(Ordering::Relaxed),
            3
        );

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_loop_stops_promptly() {
        let fixture = OdpFixture::new(FixtureOptions::default());
        let token = CancellationToken::new();
        let handle = SettlementScheduler::new(
            Arc::clone(&fixture.facilitator),
            Duration::from_secs(3600),
            token.clone(),
        )
        .spawn();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler exits on cancellation")
            .unwrap();
    }
}
