//! Provider health monitor.
//!
//! Keeps one [`HealthRecord`] per provider, refreshed by two signals:
//!
//! - **Probes**: a registered [`HealthProbe`] runs when the record is older
//!   than the TTL. Probe failure or timeout marks the provider unhealthy;
//!   success marks it healthy and clears the error rate.
//! - **Outcomes**: the executor reports every attempt. A success marks the
//!   provider healthy; `failure_threshold` consecutive failures mark it
//!   unhealthy.
//!
//! A stale record is never trusted: it is re-probed, or treated as
//! `Unknown` when the provider has no probe. Nothing is sticky, so an
//! unhealthy provider gets another chance once its record expires.
//!
//! # Locking
//!
//! State is per provider (a `DashMap` entry), never a global lock. Each
//! provider has a short-held record mutex and a separate async probe lock
//! that coalesces concurrent probes, so readers never wait on the network.

mod latency;

pub use latency::ProviderLatency;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::providers::HealthProbe;
use crate::telemetry;
use crate::types::{HealthRecord, HealthState};

/// Upper bound on any probe timeout.
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health monitor settings.
///
/// ```toml
/// [health]
/// ttl_secs = 30
/// probe_timeout_secs = 5
/// failure_threshold = 3
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Lifetime of a health record. Default: 30.
    pub ttl_secs: u64,
    /// Probe timeout, capped at 5. Default: 5.
    pub probe_timeout_secs: u64,
    /// Consecutive outcome failures that mark a provider unhealthy. Default: 3.
    pub failure_threshold: u32,
    /// EWMA smoothing for latency. Default: 0.2.
    pub latency_alpha: f64,
    /// EWMA smoothing for the error rate. Default: 0.2.
    pub error_rate_alpha: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            probe_timeout_secs: 5,
            failure_threshold: 3,
            latency_alpha: 0.2,
            error_rate_alpha: 0.2,
        }
    }
}

impl HealthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs).min(MAX_PROBE_TIMEOUT)
    }
}

struct ProviderHealth {
    record: Mutex<HealthRecord>,
    probe_lock: tokio::sync::Mutex<()>,
    latency: ProviderLatency,
}

impl ProviderHealth {
    fn new(provider: &str, alpha: f64) -> Self {
        Self {
            record: Mutex::new(HealthRecord::unknown(provider)),
            probe_lock: tokio::sync::Mutex::new(()),
            latency: ProviderLatency::new(alpha),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut HealthRecord) -> R) -> R {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut record)
    }

    /// Copy of the record with live latency, `Unknown` once stale.
    fn view(&self, ttl: Duration) -> HealthRecord {
        let mut record = self.update(|r| r.clone());
        record.average_latency_ms = self.latency.average_ms();
        if record.is_stale(ttl) {
            record.state = HealthState::Unknown;
        }
        record
    }
}

/// Per-provider health with TTL-bounded probing.
pub struct HealthMonitor {
    config: HealthConfig,
    providers: DashMap<String, Arc<ProviderHealth>>,
    probes: HashMap<String, Arc<dyn HealthProbe>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
            probes: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HealthConfig::default())
    }

    /// Register a probe, keyed by its provider name.
    pub fn add_probe(&mut self, probe: Arc<dyn HealthProbe>) {
        self.probes.insert(probe.name().to_string(), probe);
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Whether `provider` may be used.
    ///
    /// Returns the cached state while it is fresh. A stale record is
    /// re-probed first; concurrent callers for the same provider share one
    /// probe. Providers without a probe report `Unknown` (usable) once
    /// stale.
    #[instrument(skip(self))]
    pub async fn is_healthy(&self, provider: &str) -> bool {
        let entry = self.entry(provider);
        let ttl = self.config.ttl();
        if !entry.update(|r| r.is_stale(ttl)) {
            return entry.update(|r| r.healthy());
        }
        let Some(probe) = self.probes.get(provider) else {
            return entry.view(ttl).healthy();
        };

        let _guard = entry.probe_lock.lock().await;
        // Another caller may have probed while we waited.
        if !entry.update(|r| r.is_stale(ttl)) {
            return entry.update(|r| r.healthy());
        }
        self.run_probe(provider, probe.as_ref(), &entry).await
    }

    /// Re-check every stale provider in `providers` concurrently.
    pub async fn refresh<I, S>(&self, providers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = providers.into_iter().collect();
        join_all(names.iter().map(|p| self.is_healthy(p.as_ref()))).await;
    }

    async fn run_probe(
        &self,
        provider: &str,
        probe: &dyn HealthProbe,
        entry: &ProviderHealth,
    ) -> bool {
        let timeout = self.config.probe_timeout();
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, probe.probe(timeout)).await;
        let now = Instant::now();
        let (healthy, status) = match result {
            Ok(Ok(report)) => {
                entry.latency.record(report.latency);
                entry.update(|r| {
                    r.state = HealthState::Healthy;
                    r.error_rate = 0.0;
                    r.consecutive_failures = 0;
                    r.last_success_at = Some(now);
                    r.checked_at = Some(now);
                });
                debug!(provider, latency_ms = report.latency.as_millis() as u64, "probe ok");
                (true, "ok")
            }
            Ok(Err(e)) => {
                self.mark_probe_failure(entry, now);
                warn!(provider, error = %e, "probe failed");
                (false, "error")
            }
            Err(_) => {
                self.mark_probe_failure(entry, now);
                warn!(provider, timeout_ms = timeout.as_millis() as u64, "probe timed out");
                (false, "timeout")
            }
        };
        metrics::counter!(telemetry::HEALTH_PROBES_TOTAL,
            "provider" => provider.to_owned(),
            "status" => status,
        )
        .increment(1);
        debug!(provider, elapsed_ms = start.elapsed().as_millis() as u64, healthy, "probe done");
        healthy
    }

    fn mark_probe_failure(&self, entry: &ProviderHealth, now: Instant) {
        let alpha = self.config.error_rate_alpha;
        entry.update(|r| {
            r.state = HealthState::Unhealthy;
            r.error_rate = alpha + (1.0 - alpha) * r.error_rate;
            r.last_failure_at = Some(now);
            r.checked_at = Some(now);
        });
    }

    /// Fold an attempt outcome into the provider's record.
    pub fn record_outcome(&self, provider: &str, success: bool, latency: Duration) {
        let entry = self.entry(provider);
        entry.latency.record(latency);
        let alpha = self.config.error_rate_alpha;
        let threshold = self.config.failure_threshold.max(1);
        let ttl = self.config.ttl();
        let now = Instant::now();
        let became_unhealthy = entry.update(|r| {
            if r.is_stale(ttl) && r.state == HealthState::Unhealthy {
                r.state = HealthState::Unknown;
                r.consecutive_failures = 0;
            }
            let observed = if success { 0.0 } else { 1.0 };
            r.error_rate = alpha * observed + (1.0 - alpha) * r.error_rate;
            r.checked_at = Some(now);
            if success {
                r.consecutive_failures = 0;
                r.last_success_at = Some(now);
                r.state = HealthState::Healthy;
                false
            } else {
                r.consecutive_failures += 1;
                r.last_failure_at = Some(now);
                if r.consecutive_failures < threshold || r.state == HealthState::Unhealthy {
                    return false;
                }
                r.state = HealthState::Unhealthy;
                true
            }
        });
        if became_unhealthy {
            info!(provider, threshold, "provider marked unhealthy after repeated failures");
        }
    }

    /// Current record for one provider (`Unknown` if never seen or stale).
    pub fn record(&self, provider: &str) -> HealthRecord {
        match self.providers.get(provider) {
            Some(entry) => entry.view(self.config.ttl()),
            None => HealthRecord::unknown(provider),
        }
    }

    /// Records for every provider seen so far, for selection.
    pub fn snapshot(&self) -> HashMap<String, HealthRecord> {
        let ttl = self.config.ttl();
        self.providers
            .iter()
            .map(|e| (e.key().clone(), e.value().view(ttl)))
            .collect()
    }

    /// Forget the cached state so the next check re-probes.
    pub fn invalidate(&self, provider: &str) {
        if let Some(entry) = self.providers.get(provider) {
            entry.update(|r| r.checked_at = None);
        }
    }

    fn entry(&self, provider: &str) -> Arc<ProviderHealth> {
        if let Some(entry) = self.providers.get(provider) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.providers
                .entry(provider.to_string())
                .or_insert_with(|| {
                    Arc::new(ProviderHealth::new(provider, self.config.latency_alpha))
                })
                .value(),
        )
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::with_defaults()
    }
}
