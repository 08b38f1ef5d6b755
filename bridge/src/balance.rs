use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::venue::{VenueError, VenuePort};

pub const BALANCE_TTL: Duration = Duration::from_secs(30);

/// Equity snapshot handed to readers by value.
#[derive(Debug, Clone)]
pub struct BalanceSnapshot {
    pub perp_equity: Decimal,
    pub spot_usdc: Decimal,
    pub total: Decimal,
    fetched_at: Instant,
}

impl BalanceSnapshot {
    fn fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Single-slot TTL cache over the venue's perp+spot equity. The slot mutex is
/// held across the upstream fetch, so concurrent misses queue behind one
/// refresh and then read the freshly filled slot.
pub struct BalanceCache {
    slot: Mutex<Option<BalanceSnapshot>>,
    ttl: Duration,
}

impl BalanceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    pub async fn get(
        &self,
        venue: &dyn VenuePort,
        addr: &str,
    ) -> Result<BalanceSnapshot, VenueError> {
        let mut slot = self.slot.lock().await;
        if let Some(snapshot) = slot.as_ref() {
            if snapshot.fresh(self.ttl) {
                return Ok(snapshot.clone());
            }
        }

        let perp = venue.clearinghouse_state(addr).await?;
        let spot = venue.spot_state(addr).await?;
        let spot_usdc: Decimal = spot
            .iter()
            .filter(|b| b.coin == "USDC")
            .map(|b| b.total)
            .sum();

        let snapshot = BalanceSnapshot {
            perp_equity: perp.account_value,
            spot_usdc,
            total: perp.account_value + spot_usdc,
            fetched_at: Instant::now(),
        };
        tracing::debug!(total = %snapshot.total, "balance_cache_refreshed");
        *slot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Drops the snapshot; the next read refetches. Used on environment switch.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::venue::fake::FakeVenue;

    #[tokio::test]
    async fn test_sums_perp_and_spot_usdc() {
        let venue = FakeVenue::new();
        venue.set_account_value(dec!(1200.50)).await;
        venue.set_spot_usdc(dec!(99.50)).await;

        let cache = BalanceCache::new(BALANCE_TTL);
        let snapshot = cache.get(&venue, "0xabc").await.unwrap();
        assert_eq!(snapshot.perp_equity, dec!(1200.50));
        assert_eq!(snapshot.spot_usdc, dec!(99.50));
        assert_eq!(snapshot.total, dec!(1300.00));
    }

    #[tokio::test]
    async fn test_second_read_hits_cache() {
        let venue = FakeVenue::new();
        venue.set_account_value(dec!(100)).await;

        let cache = BalanceCache::new(BALANCE_TTL);
        cache.get(&venue, "0xabc").await.unwrap();
        cache.get(&venue, "0xabc").await.unwrap();

        assert_eq!(venue.count_calls("clearinghouse_state").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_to_one_fetch() {
        let venue = Arc::new(FakeVenue::new());
        venue.set_account_value(dec!(100)).await;
        let cache = Arc::new(BalanceCache::new(BALANCE_TTL));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let venue = venue.clone();
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get(venue.as_ref(), "0xabc").await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(venue.count_calls("clearinghouse_state").await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let venue = FakeVenue::new();
        venue.set_account_value(dec!(100)).await;

        let cache = BalanceCache::new(BALANCE_TTL);
        cache.get(&venue, "0xabc").await.unwrap();
        cache.invalidate().await;
        cache.get(&venue, "0xabc").await.unwrap();

        assert_eq!(venue.count_calls("clearinghouse_state").await, 2);
    }
}
