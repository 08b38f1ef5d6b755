use std::collections::HashMap;
use std::sync::Arc;

use mongodb::bson::{doc, Document};
use mongodb::Collection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Reserved id for signals that arrive without an explicit `strategy_id`.
pub const DEFAULT_STRATEGY_ID: &str = "OTHERS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRules {
    pub max_position_size: Decimal,
    pub max_daily_trades: u32,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub total_webhooks: u64,
    pub successful_forwards: u64,
    pub failed_forwards: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub enabled: bool,
    pub rules: StrategyRules,
    pub stats: StrategyStats,
}

/// Which monotonic counter a pipeline event bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    WebhookReceived,
    ForwardSucceeded,
    ForwardFailed,
}

fn seed_strategies() -> HashMap<String, Strategy> {
    let mut map = HashMap::new();
    map.insert(
        "IMBA_HYPER".to_string(),
        Strategy {
            id: "IMBA_HYPER".to_string(),
            enabled: true,
            rules: StrategyRules {
                max_position_size: dec!(100.0),
                max_daily_trades: 50,
                max_drawdown: 0.05,
            },
            stats: StrategyStats::default(),
        },
    );
    map.insert(
        DEFAULT_STRATEGY_ID.to_string(),
        Strategy {
            id: DEFAULT_STRATEGY_ID.to_string(),
            enabled: true,
            rules: StrategyRules {
                max_position_size: dec!(50.0),
                max_daily_trades: 25,
                max_drawdown: 0.03,
            },
            stats: StrategyStats::default(),
        },
    );
    map
}

/// In-memory projection of the strategy rule-sets, optionally written through
/// to a document collection. Ids are never deleted: every id ever observed
/// stays queryable. Stats are written only by the execution engine, which
/// runs under the owning symbol lock.
#[derive(Clone)]
pub struct StrategyRegistry {
    inner: Arc<RwLock<HashMap<String, Strategy>>>,
    store: Option<Collection<Document>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(seed_strategies())),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Collection<Document>) -> Self {
        self.store = Some(store);
        self
    }

    /// Merges persisted strategies over the seeds. Seed rule-sets win only
    /// for ids the store has never seen.
    pub async fn load_persisted(&self) -> anyhow::Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        use futures_util::TryStreamExt;

        let docs: Vec<Document> = store.find(doc! {}).await?.try_collect().await?;
        let mut loaded = 0usize;
        let mut map = self.inner.write().await;
        for document in docs {
            match mongodb::bson::from_document::<Strategy>(document) {
                Ok(strategy) => {
                    map.insert(strategy.id.clone(), strategy);
                    loaded += 1;
                }
                Err(e) => tracing::warn!(error = %e, "strategy_document_malformed"),
            }
        }
        Ok(loaded)
    }

    pub async fn get(&self, id: &str) -> Option<Strategy> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Strategy> {
        let mut strategies: Vec<Strategy> = self.inner.read().await.values().cloned().collect();
        strategies.sort_by(|a, b| a.id.cmp(&b.id));
        strategies
    }

    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_enabled(&self, id: &str) -> bool {
        self.inner
            .read()
            .await
            .get(id)
            .map(|s| s.enabled)
            .unwrap_or(true)
    }

    /// Auto-registers an unknown id with the OTHERS defaults, enabled.
    /// Idempotent; returns true only when the id was newly registered.
    pub async fn ensure(&self, id: &str) -> bool {
        let newly_registered = {
            let mut map = self.inner.write().await;
            if map.contains_key(id) {
                false
            } else {
                let defaults = map
                    .get(DEFAULT_STRATEGY_ID)
                    .map(|s| s.rules.clone())
                    .unwrap_or_else(|| StrategyRules {
                        max_position_size: dec!(50.0),
                        max_daily_trades: 25,
                        max_drawdown: 0.03,
                    });
                map.insert(
                    id.to_string(),
                    Strategy {
                        id: id.to_string(),
                        enabled: true,
                        rules: defaults,
                        stats: StrategyStats::default(),
                    },
                );
                true
            }
        };
        if newly_registered {
            tracing::info!(strategy_id = id, "strategy_discovered");
            self.persist(id).await;
        }
        newly_registered
    }

    /// Flips `enabled`; returns the new value, or None for an unknown id.
    pub async fn toggle(&self, id: &str) -> Option<bool> {
        let new_state = {
            let mut map = self.inner.write().await;
            let strategy = map.get_mut(id)?;
            strategy.enabled = !strategy.enabled;
            Some(strategy.enabled)
        };
        if new_state.is_some() {
            self.persist(id).await;
        }
        new_state
    }

    /// Bumps one monotonic counter. The execution engine is the only caller;
    /// it holds the symbol lock for the duration of the signal.
    pub async fn increment(&self, id: &str, event: StatEvent) {
        {
            let mut map = self.inner.write().await;
            let Some(strategy) = map.get_mut(id) else {
                return;
            };
            match event {
                StatEvent::WebhookReceived => strategy.stats.total_webhooks += 1,
                StatEvent::ForwardSucceeded => strategy.stats.successful_forwards += 1,
                StatEvent::ForwardFailed => strategy.stats.failed_forwards += 1,
            }
        }
        self.persist(id).await;
    }

    /// Process-wide totals across all strategies, for the status projection.
    pub async fn totals(&self) -> StrategyStats {
        let map = self.inner.read().await;
        let mut totals = StrategyStats::default();
        for strategy in map.values() {
            totals.total_webhooks += strategy.stats.total_webhooks;
            totals.successful_forwards += strategy.stats.successful_forwards;
            totals.failed_forwards += strategy.stats.failed_forwards;
        }
        totals
    }

    /// Best-effort write-through; the in-memory projection is authoritative
    /// for the rest of the process.
    async fn persist(&self, id: &str) {
        let Some(store) = &self.store else { return };
        let Some(strategy) = self.get(id).await else {
            return;
        };
        let document = match mongodb::bson::to_document(&strategy) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(strategy_id = id, error = %e, "strategy_serialize_failed");
                return;
            }
        };
        if let Err(e) = store
            .replace_one(doc! {"id": id}, document)
            .upsert(true)
            .await
        {
            tracing::warn!(strategy_id = id, error = %e, "strategy_persist_failed");
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_strategies_exist() {
        let registry = StrategyRegistry::new();
        let hyper = registry.get("IMBA_HYPER").await.unwrap();
        assert!(hyper.enabled);
        assert_eq!(hyper.rules.max_position_size, dec!(100.0));
        assert_eq!(hyper.rules.max_daily_trades, 50);

        let others = registry.get(DEFAULT_STRATEGY_ID).await.unwrap();
        assert_eq!(others.rules.max_position_size, dec!(50.0));
        assert_eq!(others.rules.max_daily_trades, 25);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let registry = StrategyRegistry::new();
        assert!(registry.ensure("MOMENTUM_X").await);
        assert!(!registry.ensure("MOMENTUM_X").await);
        assert_eq!(
            registry
                .list_ids()
                .await
                .iter()
                .filter(|id| *id == "MOMENTUM_X")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_ensure_inherits_others_defaults() {
        let registry = StrategyRegistry::new();
        registry.ensure("FRESH").await;
        let fresh = registry.get("FRESH").await.unwrap();
        let others = registry.get(DEFAULT_STRATEGY_ID).await.unwrap();
        assert!(fresh.enabled);
        assert_eq!(fresh.rules, others.rules);
        assert_eq!(fresh.stats, StrategyStats::default());
    }

    #[tokio::test]
    async fn test_toggle_flips_enabled() {
        let registry = StrategyRegistry::new();
        assert_eq!(registry.toggle("IMBA_HYPER").await, Some(false));
        assert!(!registry.is_enabled("IMBA_HYPER").await);
        assert_eq!(registry.toggle("IMBA_HYPER").await, Some(true));
        assert_eq!(registry.toggle("NO_SUCH_ID").await, None);
    }

    #[tokio::test]
    async fn test_increment_and_totals() {
        let registry = StrategyRegistry::new();
        registry.ensure("A").await;
        registry.increment("A", StatEvent::WebhookReceived).await;
        registry.increment("A", StatEvent::ForwardSucceeded).await;
        registry
            .increment(DEFAULT_STRATEGY_ID, StatEvent::WebhookReceived)
            .await;
        registry
            .increment(DEFAULT_STRATEGY_ID, StatEvent::ForwardFailed)
            .await;

        let a = registry.get("A").await.unwrap();
        assert_eq!(a.stats.total_webhooks, 1);
        assert_eq!(a.stats.successful_forwards, 1);

        let totals = registry.totals().await;
        assert_eq!(totals.total_webhooks, 2);
        assert_eq!(totals.successful_forwards, 1);
        assert_eq!(totals.failed_forwards, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_defaults_to_enabled() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_enabled("NEVER_SEEN").await);
    }
}
