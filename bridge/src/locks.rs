use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::BridgeError;

/// Per-symbol mutual exclusion for order flow. A reversal is a non-atomic
/// multi-step sequence (close, open, attach stop/TPs); two interleaved
/// sequences on one symbol can produce double exposure or orphan triggers.
/// Unrelated symbols proceed in parallel.
pub struct SymbolLocks {
    table: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl SymbolLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: StdMutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquires the exclusive lock for `symbol`, waiting in FIFO order up to
    /// the configured ceiling. The guard releases on drop on every exit path.
    pub async fn acquire(&self, symbol: &str) -> Result<OwnedMutexGuard<()>, BridgeError> {
        let lock = {
            let mut table = match self.table.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            table
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                tracing::warn!(symbol, timeout_secs = self.timeout.as_secs(), "symbol_lock_timeout");
                Err(BridgeError::SymbolBusy(symbol.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_same_symbol_is_exclusive() {
        let locks = Arc::new(SymbolLocks::new(Duration::from_secs(5)));
        let in_flight = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("SOL").await.unwrap();
                let active = in_flight.fetch_add(1, Ordering::SeqCst);
                assert_eq!(active, 0, "two holders inside the SOL critical section");
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_different_symbols_do_not_block() {
        let locks = SymbolLocks::new(Duration::from_millis(100));
        let _sol = locks.acquire("SOL").await.unwrap();
        // ETH acquisition must succeed while SOL is held.
        let _eth = locks.acquire("ETH").await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_surfaces_symbol_busy() {
        let locks = SymbolLocks::new(Duration::from_millis(20));
        let _held = locks.acquire("SOL").await.unwrap();

        let err = locks.acquire("SOL").await.unwrap_err();
        assert!(matches!(err, BridgeError::SymbolBusy(ref s) if s == "SOL"));
    }

    #[tokio::test]
    async fn test_release_on_drop_unblocks_waiter() {
        let locks = Arc::new(SymbolLocks::new(Duration::from_secs(1)));
        {
            let _guard = locks.acquire("SOL").await.unwrap();
        }
        // Guard dropped; reacquisition must be immediate.
        let _again = locks.acquire("SOL").await.unwrap();
    }
}
