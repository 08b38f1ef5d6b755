use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tokio::sync::{Notify, RwLock};

use crate::account::{self, ResolvedAccount};
use crate::balance::{BalanceCache, BALANCE_TTL};
use crate::clock;
use crate::config::{Config, Environment};
use crate::error::BridgeError;
use crate::journal::Journal;
use crate::locks::SymbolLocks;
use crate::probe::UptimeStats;
use crate::strategy::StrategyRegistry;
use crate::venue::hyperliquid::HyperliquidClient;
use crate::venue::{MetaCache, VenuePort};

/// Everything bound to one venue environment; swapped wholesale on a
/// testnet/mainnet switch.
#[derive(Clone)]
pub struct VenueHandle {
    pub environment: Environment,
    pub venue: Arc<dyn VenuePort>,
    pub meta: Arc<MetaCache>,
    pub account: ResolvedAccount,
}

impl VenueHandle {
    /// Builds the production client for `environment` and resolves the
    /// signing key against the venue's role registry. An unknown role on a
    /// configured key is a configuration error; a venue that is merely
    /// unreachable degrades to signer-as-master so the service can start.
    pub async fn connect(config: &Config, environment: Environment) -> Result<Self, BridgeError> {
        let key = config.key_for(environment).ok_or_else(|| {
            BridgeError::Configuration(format!("no private key configured for {environment}"))
        })?;
        let client = HyperliquidClient::new(environment, key)
            .map_err(|e| BridgeError::Configuration(e.to_string()))?;
        let signer_addr = client.signer_addr().to_string();
        let client = Arc::new(client);

        let account = match account::resolve(client.as_ref(), &signer_addr).await {
            Ok(account) => account,
            Err(BridgeError::Configuration(msg)) => {
                return Err(BridgeError::Configuration(msg));
            }
            Err(e) => {
                tracing::warn!(error = %e, "role_resolution_unavailable_using_signer");
                ResolvedAccount {
                    signer_addr: signer_addr.clone(),
                    master_addr: signer_addr.clone(),
                    is_agent: false,
                }
            }
        };
        client.set_master(&account.master_addr).await;

        Ok(Self {
            environment,
            venue: client,
            meta: Arc::new(MetaCache::new()),
            account,
        })
    }
}

pub struct AppState {
    pub config: Config,
    pub venue: RwLock<VenueHandle>,
    pub journal: Journal,
    pub registry: StrategyRegistry,
    pub locks: SymbolLocks,
    pub balance: BalanceCache,
    pub uptime: Arc<UptimeStats>,
    pub started_at: DateTime<FixedOffset>,
    /// Signalled by the restart endpoint; the server loop exits gracefully
    /// and the supervisor brings the process back up.
    pub restart: Notify,
}

impl AppState {
    pub fn new(
        config: Config,
        handle: VenueHandle,
        journal: Journal,
        registry: StrategyRegistry,
    ) -> Self {
        let lock_timeout = Duration::from_secs(config.lock_timeout_secs);
        Self {
            config,
            venue: RwLock::new(handle),
            journal,
            registry,
            locks: SymbolLocks::new(lock_timeout),
            balance: BalanceCache::new(BALANCE_TTL),
            uptime: Arc::new(UptimeStats::new()),
            started_at: clock::now(),
            restart: Notify::new(),
        }
    }

    /// Snapshot of the current environment binding.
    pub async fn handle(&self) -> VenueHandle {
        self.venue.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub fn test_state(venue: Arc<dyn VenuePort>) -> Arc<AppState> {
    let config = Config {
        environment: Environment::Testnet,
        testnet_key: Some("0xtest".into()),
        mainnet_key: None,
        mongo_url: "mongodb://localhost:27017".into(),
        db_name: "bridge_test".into(),
        api_port: 0,
        lock_timeout_secs: 1,
    };
    let handle = VenueHandle {
        environment: Environment::Testnet,
        venue,
        meta: Arc::new(MetaCache::new()),
        account: ResolvedAccount {
            signer_addr: "0xsigner".into(),
            master_addr: "0xmaster".into(),
            is_agent: false,
        },
    };
    Arc::new(AppState::new(
        config,
        handle,
        Journal::memory(),
        StrategyRegistry::new(),
    ))
}
