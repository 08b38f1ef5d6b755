use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::clock;

const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Cloudflare resolver; stable and anycast, so a failed probe means the
/// process itself lost external reachability.
const PROBE_URL: &str = "http://1.1.1.1";

/// Rolling external-reachability counters. In-memory only: a restart resets
/// them, and `monitoring_since` tells the panel how far back they reach.
pub struct UptimeStats {
    total: AtomicU64,
    successful: AtomicU64,
    monitoring_since: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeSnapshot {
    pub percentage: f64,
    pub total_pings: u64,
    pub successful_pings: u64,
    pub failed_pings: u64,
    pub monitoring_since: Option<String>,
}

impl UptimeStats {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            monitoring_since: Mutex::new(None),
        }
    }

    pub fn record_success(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.successful.fetch_add(1, Ordering::Relaxed);

        let mut since = match self.monitoring_since.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if since.is_none() {
            let started = clock::now().format("%Y-%m-%d %H:%M:%S").to_string();
            tracing::info!(monitoring_since = %started, "uptime_monitoring_started");
            *since = Some(started);
        }
    }

    pub fn record_failure(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// 0/0 reads as 100%: no evidence of downtime yet.
    pub fn percentage(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 100.0;
        }
        let successful = self.successful.load(Ordering::Relaxed);
        (successful as f64 / total as f64) * 100.0
    }

    pub fn snapshot(&self) -> UptimeSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let monitoring_since = match self.monitoring_since.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        UptimeSnapshot {
            percentage: self.percentage(),
            total_pings: total,
            successful_pings: successful,
            failed_pings: total - successful,
            monitoring_since,
        }
    }

    /// Zeroes the counters and advances `monitoring_since` to now.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        let mut since = match self.monitoring_since.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *since = Some(clock::now().format("%Y-%m-%d %H:%M:%S").to_string());
    }
}

impl Default for UptimeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe loop. Any reachable response counts as up; errors are logged and
/// swallowed; this subsystem is a best-effort observability surface.
pub async fn run(stats: std::sync::Arc<UptimeStats>, http: reqwest::Client) {
    let mut interval = tokio::time::interval(PROBE_INTERVAL);
    loop {
        interval.tick().await;
        match http.get(PROBE_URL).timeout(PROBE_TIMEOUT).send().await {
            Ok(_) => stats.record_success(),
            Err(e) => {
                stats.record_failure();
                tracing::error!(error = %e, "uptime_probe_failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
