//! Provider health records.

use std::time::Duration;

use tokio::time::Instant;

/// Liveness state of a provider.
///
/// `Unknown -> Healthy | Unhealthy`, `Healthy <-> Unhealthy`. There is no
/// terminal state: an unhealthy provider is re-probed once its record expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Health of one provider as last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    pub provider: String,
    pub state: HealthState,
    /// When the state was last established by a probe or an outcome.
    pub checked_at: Option<Instant>,
    /// EWMA of observed latency.
    pub average_latency_ms: Option<f64>,
    /// EWMA of failures in [0, 1].
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub last_success_at: Option<Instant>,
    pub last_failure_at: Option<Instant>,
}

impl HealthRecord {
    /// A record nobody has checked yet.
    pub fn unknown(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            state: HealthState::Unknown,
            checked_at: None,
            average_latency_ms: None,
            error_rate: 0.0,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
        }
    }

    /// Whether selection may use this provider. `Unknown` counts as healthy.
    pub fn healthy(&self) -> bool {
        self.state != HealthState::Unhealthy
    }

    /// Whether the record is older than `ttl` (or was never checked).
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.checked_at {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }
}
