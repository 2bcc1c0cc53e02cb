//! Performance samples and external feedback.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Recorded outcome of one past attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub success: bool,
    pub latency_ms: u64,
    /// Quality in [0, 1].
    pub quality: f64,
    pub timestamp: SystemTime,
}

impl PerformanceSample {
    /// Quality assumed for a success nobody has graded yet.
    pub const UNGRADED_QUALITY: f64 = 0.5;

    pub fn new(success: bool, latency: Duration, quality: f64) -> Self {
        Self {
            success,
            latency_ms: latency.as_millis() as u64,
            quality: quality.clamp(0.0, 1.0),
            timestamp: SystemTime::now(),
        }
    }

    /// Ungraded success.
    pub fn success(latency: Duration) -> Self {
        Self::new(true, latency, Self::UNGRADED_QUALITY)
    }

    pub fn failure(latency: Duration) -> Self {
        Self::new(false, latency, 0.0)
    }
}

/// Retroactive judgement from an external reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub success: bool,
    /// Quality in [0, 1]; clamped on use.
    pub quality: f64,
}

impl FeedbackOutcome {
    pub fn new(success: bool, quality: f64) -> Self {
        Self { success, quality }
    }
}

/// Aggregate view of a ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub samples: usize,
    pub success_rate: f64,
    pub mean_latency_ms: f64,
    pub mean_quality: f64,
    pub score: f64,
}
