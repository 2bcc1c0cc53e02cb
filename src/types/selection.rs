//! Selection output.

use std::fmt;

use serde::Serialize;

use super::ModelKey;

/// Per-factor contributions to a candidate's score, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub task_fit: f64,
    pub performance: f64,
    pub headroom: f64,
    pub urgency: f64,
}

impl ScoreBreakdown {
    pub const TASK_FIT_WEIGHT: f64 = 0.4;
    pub const PERFORMANCE_WEIGHT: f64 = 0.3;
    pub const HEADROOM_WEIGHT: f64 = 0.2;
    pub const URGENCY_WEIGHT: f64 = 0.1;

    /// Weighted total in [0, 1].
    pub fn total(&self) -> f64 {
        (Self::TASK_FIT_WEIGHT * self.task_fit
            + Self::PERFORMANCE_WEIGHT * self.performance
            + Self::HEADROOM_WEIGHT * self.headroom
            + Self::URGENCY_WEIGHT * self.urgency)
            .clamp(0.0, 1.0)
    }
}

/// Why a candidate is in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    /// Passed every filter; `rank` is its 1-based position.
    Ranked { rank: usize },
    /// Its provider is unhealthy but every other provider is too.
    LastResort,
}

impl fmt::Display for CandidateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranked { rank } => write!(f, "ranked #{rank}"),
            Self::LastResort => write!(f, "last resort: all providers unhealthy"),
        }
    }
}

/// One entry of the fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub key: ModelKey,
    /// Weighted score in [0, 1].
    pub confidence: f64,
    pub reason: CandidateReason,
    pub breakdown: ScoreBreakdown,
}

impl Candidate {
    pub fn provider(&self) -> &str {
        &self.key.provider
    }

    pub fn model(&self) -> &str {
        &self.key.model
    }
}

/// Ordered fallback chain. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub candidates: Vec<Candidate>,
    /// Set when the last-resort rule admitted an unhealthy provider.
    pub degraded: bool,
}

impl SelectionResult {
    pub fn keys(&self) -> Vec<&ModelKey> {
        self.candidates.iter().map(|c| &c.key).collect()
    }

    pub fn first(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
