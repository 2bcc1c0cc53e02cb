//! Selection strategy: ranks catalog entries into a fallback chain.
//!
//! [`select`] is a pure function of its inputs: a catalog snapshot, the
//! host profile, a health snapshot and a performance snapshot. It does no
//! I/O, holds no locks and is deterministic for identical inputs.
//!
//! # Pipeline
//!
//! ```text
//! catalog ──► task fit ──► tool calling ──► exclusion ──► resources ──► health
//!                                                                        │
//!             top `width` ◄── sort (score, priority, key) ◄── score ◄───┘
//! ```
//!
//! Each filter that empties the set yields [`BifrostError::NoCandidates`]
//! naming that constraint. The health filter is the exception: when every
//! remaining provider is unhealthy, the one most recently healthy is kept
//! as a last resort and the result is flagged `degraded`.

pub mod task_map;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::UnmetConstraint;
use crate::ledger::PerformanceSnapshot;
use crate::profiler::{can_run, headroom_score};
use crate::types::{
    Candidate, CandidateReason, HealthRecord, ModelCapability, ScoreBreakdown, SelectionContext,
    SelectionResult, SpeedClass, SystemProfile, Urgency,
};
use crate::{BifrostError, Result};

use task_map::{GENERAL_FIT, GENERAL_TAG, WEAKNESS_PENALTY, strength_tags};

/// Largest allowed chain width.
pub const MAX_WIDTH: usize = 10;

/// Selection settings.
///
/// ```toml
/// [selection]
/// width = 3
/// provider_priority = ["ollama", "openrouter"]
/// last_resort = true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Candidates returned. Default: 3.
    pub width: usize,
    /// Tie-break order; unlisted providers come after, by name.
    pub provider_priority: Vec<String>,
    /// Keep an unhealthy provider when all are unhealthy. Default: true.
    pub last_resort: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            width: 3,
            provider_priority: Vec::new(),
            last_resort: true,
        }
    }
}

impl SelectionConfig {
    /// Position of `provider` in the priority order.
    fn priority(&self, provider: &str) -> usize {
        self.provider_priority
            .iter()
            .position(|p| p == provider)
            .unwrap_or(self.provider_priority.len())
    }

    /// Compare providers by priority, then name.
    fn cmp_providers(&self, a: &str, b: &str) -> Ordering {
        self.priority(a)
            .cmp(&self.priority(b))
            .then_with(|| a.cmp(b))
    }
}

/// Everything selection reads, borrowed from the live stores.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInputs<'a> {
    pub catalog: &'a [Arc<ModelCapability>],
    pub profile: &'a SystemProfile,
    pub health: &'a HashMap<String, HealthRecord>,
    pub performance: &'a PerformanceSnapshot,
}

/// Rank catalog entries for `ctx`.
pub fn select(
    ctx: &SelectionContext,
    inputs: SelectionInputs<'_>,
    config: &SelectionConfig,
) -> Result<SelectionResult> {
    if inputs.catalog.is_empty() {
        return Err(no_candidates(UnmetConstraint::EmptyCatalog));
    }

    let tags = strength_tags(&ctx.task_type);
    let mut pool: Vec<(&ModelCapability, f64)> = inputs
        .catalog
        .iter()
        .filter_map(|cap| task_fit(cap, &tags).map(|fit| (cap.as_ref(), fit)))
        .collect();
    if pool.is_empty() {
        return Err(no_candidates(UnmetConstraint::Capability {
            task_type: ctx.task_type.clone(),
        }));
    }

    if ctx.requires_tool_calling {
        pool.retain(|(cap, _)| cap.tool_calling);
        if pool.is_empty() {
            return Err(no_candidates(UnmetConstraint::ToolCalling));
        }
    }

    pool.retain(|(cap, _)| !ctx.is_excluded(&cap.key()));
    if pool.is_empty() {
        return Err(no_candidates(UnmetConstraint::Excluded));
    }

    pool.retain(|(cap, _)| can_run(cap, inputs.profile));
    if pool.is_empty() {
        return Err(no_candidates(UnmetConstraint::Resources));
    }

    let is_healthy = |provider: &str| inputs.health.get(provider).is_none_or(HealthRecord::healthy);
    let mut degraded = false;
    if pool.iter().any(|(cap, _)| is_healthy(&cap.provider)) {
        pool.retain(|(cap, _)| is_healthy(&cap.provider));
    } else if config.last_resort {
        let providers: BTreeSet<&str> = pool.iter().map(|&(cap, _)| cap.provider.as_str()).collect();
        let keep = last_resort_provider(providers, inputs.health, config)
            .ok_or_else(|| no_candidates(UnmetConstraint::Health))?;
        debug!(provider = keep, "all providers unhealthy, keeping last resort");
        pool.retain(|(cap, _)| cap.provider == keep);
        degraded = true;
    } else {
        return Err(no_candidates(UnmetConstraint::Health));
    }

    let mut scored: Vec<(&ModelCapability, ScoreBreakdown, f64)> = pool
        .into_iter()
        .map(|(cap, fit)| {
            let breakdown = ScoreBreakdown {
                task_fit: fit,
                performance: inputs.performance.score(&cap.key(), &ctx.task_type),
                headroom: headroom_score(cap, inputs.profile),
                urgency: urgency_bonus(ctx.urgency, cap.speed),
            };
            let total = breakdown.total();
            (cap, breakdown, total)
        })
        .collect();

    scored.sort_by(|(a, _, sa), (b, _, sb)| {
        sb.total_cmp(sa)
            .then_with(|| config.cmp_providers(&a.provider, &b.provider))
            .then_with(|| a.name.cmp(&b.name))
    });
    scored.truncate(config.width.clamp(1, MAX_WIDTH));

    let candidates = scored
        .into_iter()
        .enumerate()
        .map(|(i, (cap, breakdown, total))| Candidate {
            key: cap.key(),
            confidence: total,
            reason: if degraded {
                CandidateReason::LastResort
            } else {
                CandidateReason::Ranked { rank: i + 1 }
            },
            breakdown,
        })
        .collect();

    Ok(SelectionResult {
        candidates,
        degraded,
    })
}

/// Fit of `cap` for `tags` in [0, 1], or `None` if it does not serve them.
///
/// Matched strengths over the tag count, minus a penalty per matched
/// weakness. A `general` model without direct overlap gets [`GENERAL_FIT`].
pub fn task_fit(cap: &ModelCapability, tags: &BTreeSet<String>) -> Option<f64> {
    if tags.is_empty() {
        return None;
    }
    let matched = cap.strengths.intersection(tags).count();
    let base = if matched > 0 {
        matched as f64 / tags.len() as f64
    } else if cap.has_strength(GENERAL_TAG) {
        GENERAL_FIT
    } else {
        return None;
    };
    let weaknesses = cap.weaknesses.intersection(tags).count();
    Some((base - WEAKNESS_PENALTY * weaknesses as f64).clamp(0.0, 1.0))
}

/// Bonus for fast models when the caller is in a hurry.
pub fn urgency_bonus(urgency: Urgency, speed: SpeedClass) -> f64 {
    match (urgency, speed) {
        (Urgency::High, SpeedClass::Fast) => 1.0,
        (Urgency::High, SpeedClass::Medium) => 0.5,
        (Urgency::High, SpeedClass::Slow) => 0.0,
        _ => 0.5,
    }
}

/// Unhealthy provider to fall back on: most recent success, then oldest
/// failure, then priority order.
fn last_resort_provider<'a>(
    providers: BTreeSet<&'a str>,
    health: &HashMap<String, HealthRecord>,
    config: &SelectionConfig,
) -> Option<&'a str> {
    let mut ranked: Vec<&str> = providers.into_iter().collect();
    ranked.sort_by(|a, b| {
        let (ra, rb) = (health.get(*a), health.get(*b));
        let success = |r: Option<&HealthRecord>| r.and_then(|r| r.last_success_at);
        let failure = |r: Option<&HealthRecord>| r.and_then(|r| r.last_failure_at);
        success(rb)
            .cmp(&success(ra))
            .then_with(|| failure(ra).cmp(&failure(rb)))
            .then_with(|| config.cmp_providers(a, b))
    });
    ranked.into_iter().next()
}

fn no_candidates(constraint: UnmetConstraint) -> BifrostError {
    debug!(%constraint, "selection found no candidates");
    BifrostError::NoCandidates { constraint }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_fit_counts_matches() {
        let tags = strength_tags("coding");
        let cap = ModelCapability::new("m", "p").with_strengths(["coding", "coder"]);
        let fit = task_fit(&cap, &tags).unwrap();
        assert!((fit - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn task_fit_general_fallback() {
        let tags = strength_tags("coding");
        let cap = ModelCapability::new("m", "p").with_strengths(["general"]);
        assert_eq!(task_fit(&cap, &tags), Some(GENERAL_FIT));
        let cap = ModelCapability::new("m", "p").with_strengths(["vision"]);
        assert_eq!(task_fit(&cap, &tags), None);
    }

    #[test]
    fn task_fit_weakness_penalty() {
        let tags = strength_tags("analysis");
        let cap = ModelCapability::new("m", "p")
            .with_strengths(["analysis", "reasoning"])
            .with_weaknesses(["analysis"]);
        assert_eq!(task_fit(&cap, &tags), Some(0.75));
    }

    #[test]
    fn urgency_only_matters_when_high() {
        assert_eq!(urgency_bonus(Urgency::High, SpeedClass::Fast), 1.0);
        assert_eq!(urgency_bonus(Urgency::High, SpeedClass::Slow), 0.0);
        assert_eq!(urgency_bonus(Urgency::Low, SpeedClass::Fast), 0.5);
        assert_eq!(urgency_bonus(Urgency::Medium, SpeedClass::Slow), 0.5);
    }

    #[test]
    fn priority_breaks_provider_ties() {
        let config = SelectionConfig {
            provider_priority: vec!["ollama".into()],
            ..Default::default()
        };
        assert_eq!(config.cmp_providers("ollama", "anthropic"), Ordering::Less);
        assert_eq!(config.cmp_providers("b", "a"), Ordering::Greater);
    }
}
