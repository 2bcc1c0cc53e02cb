//! Tests for the pure selection strategy.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use bifrost::{
    BifrostError, CandidateReason, HealthRecord, HealthState, ModelCapability, ModelKey,
    PerformanceSnapshot, ResourceRequirements, SelectionConfig, SelectionContext,
    SelectionInputs, SpeedClass, SystemProfile, UnmetConstraint, Urgency, select,
};

use common::{chat_model, host, roomy_host};

// ============================================================================
// Fixtures
// ============================================================================

fn fast_3b() -> ModelCapability {
    ModelCapability::new("fast-3b", "alpha")
        .with_strengths(["fast", "general", "chat"])
        .with_speed(SpeedClass::Fast)
        .with_parameters(3.0)
        .with_resources(ResourceRequirements::new(2_048, 0, 2))
}

fn slow_30b() -> ModelCapability {
    ModelCapability::new("slow-30b", "beta")
        .with_strengths(["general", "chat"])
        .with_speed(SpeedClass::Slow)
        .with_parameters(30.0)
        .with_resources(ResourceRequirements::new(20_480, 0, 8))
}

fn catalog(entries: Vec<ModelCapability>) -> Vec<Arc<ModelCapability>> {
    entries.into_iter().map(Arc::new).collect()
}

fn unhealthy(provider: &str, last_success_at: Option<Instant>) -> HealthRecord {
    let mut record = HealthRecord::unknown(provider);
    record.state = HealthState::Unhealthy;
    record.checked_at = Some(Instant::now());
    record.last_success_at = last_success_at;
    record.last_failure_at = Some(Instant::now());
    record
}

fn health(records: Vec<HealthRecord>) -> HashMap<String, HealthRecord> {
    records
        .into_iter()
        .map(|r| (r.provider.clone(), r))
        .collect()
}

fn scores() -> PerformanceSnapshot {
    PerformanceSnapshot::new()
        .with_score(fast_3b().key(), "quick", 0.9)
        .with_score(slow_30b().key(), "quick", 0.6)
}

fn run(
    ctx: &SelectionContext,
    catalog: &[Arc<ModelCapability>],
    profile: &SystemProfile,
    health: &HashMap<String, HealthRecord>,
    performance: &PerformanceSnapshot,
    config: &SelectionConfig,
) -> bifrost::Result<bifrost::SelectionResult> {
    select(
        ctx,
        SelectionInputs {
            catalog,
            profile,
            health,
            performance,
        },
        config,
    )
}

fn constraint(err: BifrostError) -> UnmetConstraint {
    match err {
        BifrostError::NoCandidates { constraint } => constraint,
        other => panic!("expected NoCandidates, got {other:?}"),
    }
}

// ============================================================================
// Ranking
// ============================================================================

#[test]
fn quick_urgent_task_prefers_fast_model() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let ctx = SelectionContext::new("quick").urgency(Urgency::High);

    let result = run(
        &ctx,
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();

    let names: Vec<&str> = result.candidates.iter().map(|c| c.model()).collect();
    assert_eq!(names, ["fast-3b", "slow-30b"]);
    assert!(!result.degraded);
    assert_eq!(result.candidates[0].reason, CandidateReason::Ranked { rank: 1 });
    assert_eq!(result.candidates[1].reason, CandidateReason::Ranked { rank: 2 });
    assert!(result.candidates[0].confidence > result.candidates[1].confidence);
}

#[test]
fn unhealthy_provider_is_filtered() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let ctx = SelectionContext::new("quick").urgency(Urgency::High);
    let health = health(vec![unhealthy("beta", None)]);

    let result = run(
        &ctx,
        &entries,
        &roomy_host(),
        &health,
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();

    assert_eq!(result.keys(), [&fast_3b().key()]);
    assert!(!result.degraded);
}

#[test]
fn all_unhealthy_keeps_most_recently_healthy_as_last_resort() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let ctx = SelectionContext::new("quick").urgency(Urgency::High);
    let health = health(vec![
        unhealthy("alpha", Some(Instant::now())),
        unhealthy("beta", None),
    ]);

    let result = run(
        &ctx,
        &entries,
        &roomy_host(),
        &health,
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();

    assert!(result.degraded);
    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].model(), "fast-3b");
    assert_eq!(result.candidates[0].reason, CandidateReason::LastResort);
}

#[test]
fn all_unhealthy_without_last_resort_fails() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let health = health(vec![unhealthy("alpha", None), unhealthy("beta", None)]);
    let config = SelectionConfig {
        last_resort: false,
        ..Default::default()
    };

    let err = run(
        &SelectionContext::new("quick"),
        &entries,
        &roomy_host(),
        &health,
        &scores(),
        &config,
    )
    .unwrap_err();
    assert_eq!(constraint(err), UnmetConstraint::Health);
}

#[test]
fn tool_calling_with_no_capable_model() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let ctx = SelectionContext::new("quick").tool_calling(true);

    let err = run(
        &ctx,
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("no tool-capable model"));
    assert_eq!(constraint(err), UnmetConstraint::ToolCalling);
}

#[test]
fn tool_calling_keeps_only_capable_models() {
    let entries = catalog(vec![
        slow_30b().with_tool_calling(true),
        fast_3b(),
    ]);
    let ctx = SelectionContext::new("quick").tool_calling(true);

    let result = run(
        &ctx,
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();
    assert_eq!(result.keys(), [&slow_30b().key()]);
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn empty_catalog() {
    let err = run(
        &SelectionContext::new("chat"),
        &[],
        &roomy_host(),
        &HashMap::new(),
        &PerformanceSnapshot::new(),
        &SelectionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(constraint(err), UnmetConstraint::EmptyCatalog);
}

#[test]
fn no_model_serves_the_task() {
    let entries = catalog(vec![
        ModelCapability::remote("coder", "remote").with_strengths(["coding"]),
    ]);
    let err = run(
        &SelectionContext::new("vision"),
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &PerformanceSnapshot::new(),
        &SelectionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(
        constraint(err),
        UnmetConstraint::Capability {
            task_type: "vision".into()
        }
    );
}

#[test]
fn models_that_do_not_fit_are_never_returned() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    // 8 GB free: 80% of it cannot hold slow-30b's 20 GB.
    let small_host = host(8_000, 4);

    let result = run(
        &SelectionContext::new("quick"),
        &entries,
        &small_host,
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();
    assert_eq!(result.keys(), [&fast_3b().key()]);

    let err = run(
        &SelectionContext::new("quick"),
        &catalog(vec![slow_30b()]),
        &small_host,
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(constraint(err), UnmetConstraint::Resources);
}

#[test]
fn conservative_profile_admits_only_small_local_models() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let err = run(
        &SelectionContext::new("quick"),
        &entries,
        &SystemProfile::conservative(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap_err();
    // 2 GB available leaves 1.6 GB usable, short of fast-3b's 2 GB.
    assert_eq!(constraint(err), UnmetConstraint::Resources);

    let remote = catalog(vec![chat_model("remote", "hosted")]);
    let result = run(
        &SelectionContext::new("chat"),
        &remote,
        &SystemProfile::conservative(),
        &HashMap::new(),
        &PerformanceSnapshot::new(),
        &SelectionConfig::default(),
    )
    .unwrap();
    assert_eq!(result.len(), 1);
}

#[test]
fn excluded_models_are_skipped() {
    let entries = catalog(vec![slow_30b(), fast_3b()]);
    let ctx = SelectionContext::new("quick").exclude(fast_3b().key());

    let result = run(
        &ctx,
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();
    assert_eq!(result.keys(), [&slow_30b().key()]);

    let ctx = ctx.exclude(slow_30b().key());
    let err = run(
        &ctx,
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(constraint(err), UnmetConstraint::Excluded);
}

// ============================================================================
// Shape of the result
// ============================================================================

#[test]
fn width_bounds_the_chain() {
    let entries = catalog(
        (0..6)
            .map(|i| chat_model("remote", &format!("model-{i}")))
            .collect(),
    );
    let config = SelectionConfig {
        width: 2,
        ..Default::default()
    };

    let result = run(
        &SelectionContext::new("chat"),
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &PerformanceSnapshot::new(),
        &config,
    )
    .unwrap();
    assert_eq!(result.len(), 2);
    // Equal scores fall back to name order.
    assert_eq!(result.candidates[0].model(), "model-0");
    assert_eq!(result.candidates[1].model(), "model-1");
}

#[test]
fn provider_priority_breaks_ties() {
    let entries = catalog(vec![chat_model("aaa", "same"), chat_model("zzz", "same")]);
    let config = SelectionConfig {
        provider_priority: vec!["zzz".into()],
        ..Default::default()
    };

    let result = run(
        &SelectionContext::new("chat"),
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &PerformanceSnapshot::new(),
        &config,
    )
    .unwrap();
    assert_eq!(result.candidates[0].provider(), "zzz");
    assert_eq!(result.candidates[1].provider(), "aaa");
}

#[test]
fn performance_history_reorders_equals() {
    let entries = catalog(vec![chat_model("remote", "a"), chat_model("remote", "b")]);
    let performance = PerformanceSnapshot::new()
        .with_score(ModelKey::new("remote", "a"), "chat", 0.1)
        .with_score(ModelKey::new("remote", "b"), "chat", 0.95);

    let result = run(
        &SelectionContext::new("chat"),
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &performance,
        &SelectionConfig::default(),
    )
    .unwrap();
    assert_eq!(result.candidates[0].model(), "b");
    assert!((result.candidates[0].breakdown.performance - 0.95).abs() < 1e-9);
}

#[test]
fn identical_inputs_give_identical_results() {
    let entries = catalog(vec![
        slow_30b(),
        fast_3b(),
        chat_model("remote", "hosted"),
        chat_model("other", "hosted"),
    ]);
    let ctx = SelectionContext::new("quick").urgency(Urgency::High);
    let health = health(vec![unhealthy("other", None)]);

    let first = run(
        &ctx,
        &entries,
        &roomy_host(),
        &health,
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();
    for _ in 0..10 {
        let again = run(
            &ctx,
            &entries,
            &roomy_host(),
            &health,
            &scores(),
            &SelectionConfig::default(),
        )
        .unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn confidences_are_bounded_and_descending() {
    let entries = catalog(vec![
        slow_30b(),
        fast_3b(),
        chat_model("remote", "hosted"),
    ]);
    let result = run(
        &SelectionContext::new("quick").urgency(Urgency::High),
        &entries,
        &roomy_host(),
        &HashMap::new(),
        &scores(),
        &SelectionConfig::default(),
    )
    .unwrap();

    for pair in result.candidates.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    for candidate in &result.candidates {
        assert!((0.0..=1.0).contains(&candidate.confidence));
        assert!((candidate.breakdown.total() - candidate.confidence).abs() < 1e-12);
    }
}
