//! Lock-free EWMA latency tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-provider latency as an exponentially weighted moving average.
///
/// Readers never wait on a probe or an outcome update: the average lives in
/// an `AtomicU64` holding `f64` bits, updated with a CAS loop.
pub struct ProviderLatency {
    /// EWMA in milliseconds as `f64` bits. Meaningless while `samples == 0`.
    ewma_ms: AtomicU64,
    alpha: f64,
    samples: AtomicU64,
}

impl ProviderLatency {
    /// Tracker with smoothing factor `alpha`, clamped to (0, 1].
    pub fn new(alpha: f64) -> Self {
        Self {
            ewma_ms: AtomicU64::new(0_f64.to_bits()),
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            samples: AtomicU64::new(0),
        }
    }

    /// Fold one observation into the average.
    ///
    /// Two racing first observations may both seed the average; the error
    /// washes out after a few more samples.
    pub fn record(&self, latency: Duration) {
        let observed = latency.as_secs_f64() * 1000.0;
        let first = self.samples.load(Ordering::Relaxed) == 0;
        let _ = self
            .ewma_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let next = if first {
                    observed
                } else {
                    self.alpha * observed + (1.0 - self.alpha) * f64::from_bits(bits)
                };
                Some(next.to_bits())
            });
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Current average in milliseconds, `None` before the first sample.
    pub fn average_ms(&self) -> Option<f64> {
        (self.samples.load(Ordering::Relaxed) > 0)
            .then(|| f64::from_bits(self.ewma_ms.load(Ordering::Relaxed)))
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ProviderLatency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLatency")
            .field("average_ms", &self.average_ms())
            .field("samples", &self.samples())
            .field("alpha", &self.alpha)
            .finish()
    }
}
