//! Performance ledger: rolling outcome history per (model, task type).
//!
//! Each key holds a bounded ring buffer (default 10 samples) so recent
//! behaviour dominates. Buffers are locked individually; concurrent
//! recording for different keys never contends.
//!
//! The aggregate score is
//! `0.5 * success_rate + 0.25 * mean_speed + 0.25 * mean_quality`, where
//! speed is `1 - min(latency / speed_reference, 1)` and failed samples have
//! speed 0. Keys without history score a neutral 0.5.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use crate::types::{FeedbackOutcome, ModelKey, PerformanceSample, PerformanceStats};

/// Score of a key with no recorded samples.
pub const NEUTRAL_SCORE: f64 = 0.5;

const SUCCESS_WEIGHT: f64 = 0.5;
const SPEED_WEIGHT: f64 = 0.25;
const QUALITY_WEIGHT: f64 = 0.25;

/// Ledger settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Samples kept per key. Default: 10.
    pub capacity: usize,
    /// Latency at which normalized speed reaches 0. Default: 30 000 ms.
    pub speed_reference_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            speed_reference_ms: 30_000,
        }
    }
}

type LedgerKey = (ModelKey, String);

/// Concurrent store of recent performance samples.
#[derive(Debug)]
pub struct PerformanceLedger {
    config: LedgerConfig,
    buffers: DashMap<LedgerKey, Mutex<VecDeque<PerformanceSample>>>,
}

impl PerformanceLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            buffers: DashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(LedgerConfig::default())
    }

    /// Append a sample, evicting the oldest beyond capacity.
    pub fn record(&self, key: &ModelKey, task_type: &str, sample: PerformanceSample) {
        let capacity = self.config.capacity.max(1);
        self.with_buffer(key, task_type, |buf| {
            buf.push_back(sample);
            while buf.len() > capacity {
                buf.pop_front();
            }
        });
    }

    /// Apply an external judgement to the latest sample for the key.
    ///
    /// With no history yet, the feedback becomes a new sample with zero
    /// latency.
    pub fn record_feedback(&self, key: &ModelKey, task_type: &str, outcome: FeedbackOutcome) {
        let quality = outcome.quality.clamp(0.0, 1.0);
        let amended = self.with_buffer(key, task_type, |buf| match buf.back_mut() {
            Some(latest) => {
                latest.success = outcome.success;
                latest.quality = quality;
                true
            }
            None => {
                buf.push_back(PerformanceSample::new(
                    outcome.success,
                    std::time::Duration::ZERO,
                    quality,
                ));
                false
            }
        });
        debug!(model = %key, task_type, amended, quality, "feedback recorded");
    }

    /// Aggregate score in [0, 1]; [`NEUTRAL_SCORE`] without history.
    pub fn score(&self, key: &ModelKey, task_type: &str) -> f64 {
        self.stats(key, task_type)
            .map_or(NEUTRAL_SCORE, |stats| stats.score)
    }

    /// Aggregate view of one key, `None` without history.
    pub fn stats(&self, key: &ModelKey, task_type: &str) -> Option<PerformanceStats> {
        let buffer = self.buffers.get(&(key.clone(), task_type.to_string()))?;
        let samples = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        aggregate(samples.iter(), self.config.speed_reference_ms)
    }

    /// Copy of the samples for one key, oldest first.
    pub fn samples(&self, key: &ModelKey, task_type: &str) -> Vec<PerformanceSample> {
        self.buffers
            .get(&(key.clone(), task_type.to_string()))
            .map(|b| {
                b.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Scores for every key with history, for selection.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let reference = self.config.speed_reference_ms;
        let scores = self
            .buffers
            .iter()
            .filter_map(|entry| {
                let samples = entry.value().lock().unwrap_or_else(PoisonError::into_inner);
                let stats = aggregate(samples.iter(), reference)?;
                Some((entry.key().clone(), stats.score))
            })
            .collect();
        PerformanceSnapshot { scores }
    }

    /// Number of keys with history.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn with_buffer<R>(
        &self,
        key: &ModelKey,
        task_type: &str,
        f: impl FnOnce(&mut VecDeque<PerformanceSample>) -> R,
    ) -> R {
        let entry = self
            .buffers
            .entry((key.clone(), task_type.to_string()))
            .or_insert_with(|| Mutex::new(VecDeque::with_capacity(self.config.capacity)));
        // Downgrade to a shared shard lock; the per-key mutex serializes writers.
        let entry = entry.downgrade();
        let mut buf = entry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut buf)
    }
}

impl Default for PerformanceLedger {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Point-in-time ledger scores, consumed by selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceSnapshot {
    scores: HashMap<LedgerKey, f64>,
}

impl PerformanceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a score directly.
    pub fn with_score(mut self, key: ModelKey, task_type: impl Into<String>, score: f64) -> Self {
        self.scores.insert((key, task_type.into()), score.clamp(0.0, 1.0));
        self
    }

    /// Score for the key, [`NEUTRAL_SCORE`] without history.
    pub fn score(&self, key: &ModelKey, task_type: &str) -> f64 {
        self.scores
            .get(&(key.clone(), task_type.to_string()))
            .copied()
            .unwrap_or(NEUTRAL_SCORE)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Aggregate samples; `None` when there are none.
pub fn aggregate<'a>(
    samples: impl Iterator<Item = &'a PerformanceSample>,
    speed_reference_ms: u64,
) -> Option<PerformanceStats> {
    let reference = speed_reference_ms.max(1) as f64;
    let (mut n, mut ok, mut latency, mut speed, mut quality) = (0usize, 0usize, 0.0, 0.0, 0.0);
    for s in samples {
        n += 1;
        latency += s.latency_ms as f64;
        quality += s.quality;
        if s.success {
            ok += 1;
            speed += 1.0 - (s.latency_ms as f64 / reference).min(1.0);
        }
    }
    if n == 0 {
        return None;
    }
    let count = n as f64;
    let success_rate = ok as f64 / count;
    let mean_speed = speed / count;
    let mean_quality = quality / count;
    let score = (SUCCESS_WEIGHT * success_rate
        + SPEED_WEIGHT * mean_speed
        + QUALITY_WEIGHT * mean_quality)
        .clamp(0.0, 1.0);
    Some(PerformanceStats {
        samples: n,
        success_rate,
        mean_latency_ms: latency / count,
        mean_quality,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key() -> ModelKey {
        ModelKey::new("ollama", "llama3.2:3b")
    }

    #[test]
    fn aggregate_weights() {
        let samples = [
            PerformanceSample::new(true, Duration::ZERO, 1.0),
            PerformanceSample::new(false, Duration::from_secs(60), 0.0),
        ];
        let stats = aggregate(samples.iter(), 30_000).unwrap();
        // 0.5 * 0.5 + 0.25 * 0.5 + 0.25 * 0.5
        assert!((stats.score - 0.5).abs() < 1e-9);
        assert_eq!(stats.samples, 2);
        assert!((stats.mean_latency_ms - 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn perfect_history_scores_one() {
        let samples = [PerformanceSample::new(true, Duration::ZERO, 1.0)];
        assert!((aggregate(samples.iter(), 30_000).unwrap().score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn slow_success_has_no_speed_credit() {
        let samples = [PerformanceSample::new(true, Duration::from_secs(45), 0.5)];
        let stats = aggregate(samples.iter(), 30_000).unwrap();
        // 0.5 * 1 + 0.25 * 0 + 0.25 * 0.5
        assert!((stats.score - 0.625).abs() < 1e-9);
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let ledger = PerformanceLedger::new(LedgerConfig {
            capacity: 3,
            ..Default::default()
        });
        for ms in 1..=5 {
            ledger.record(&key(), "chat", PerformanceSample::success(Duration::from_millis(ms)));
        }
        let latencies: Vec<_> = ledger
            .samples(&key(), "chat")
            .iter()
            .map(|s| s.latency_ms)
            .collect();
        assert_eq!(latencies, [3, 4, 5]);
    }

    #[test]
    fn snapshot_defaults_to_neutral() {
        let snapshot = PerformanceSnapshot::new().with_score(key(), "chat", 0.9);
        assert_eq!(snapshot.score(&key(), "chat"), 0.9);
        assert_eq!(snapshot.score(&key(), "coding"), NEUTRAL_SCORE);
    }
}
