//! Telemetry metric name constants.
//!
//! Centralised metric names for bifrost routing. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `bifrost_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "ollama", "openrouter")
//! - `status`: outcome: "ok", "error", "timeout", "cancelled"
//! - `direction`: token direction: "prompt" or "completion"

/// Total routed requests.
///
/// Labels: `status` ("ok" | "no_candidates" | "exhausted" | "cancelled" | "invalid" | "error").
pub const ROUTE_REQUESTS_TOTAL: &str = "bifrost_route_requests_total";

/// Total attempts made against providers.
///
/// Labels: `provider`, `status` ("ok" | "timeout" | "error").
pub const ATTEMPTS_TOTAL: &str = "bifrost_attempts_total";

/// Attempt duration in seconds.
///
/// Labels: `provider`.
pub const ATTEMPT_DURATION_SECONDS: &str = "bifrost_attempt_duration_seconds";

/// Total times the walk moved past a failed candidate.
///
/// Labels: `provider` (the provider that failed).
pub const FALLBACKS_TOTAL: &str = "bifrost_fallbacks_total";

/// Total health probes.
///
/// Labels: `provider`, `status` ("ok" | "error" | "timeout").
pub const HEALTH_PROBES_TOTAL: &str = "bifrost_health_probes_total";

/// Time spent in the pure selection step, in seconds.
pub const SELECTION_DURATION_SECONDS: &str = "bifrost_selection_duration_seconds";

/// Total selections that relied on the last-resort rule.
pub const DEGRADED_SELECTIONS_TOTAL: &str = "bifrost_degraded_selections_total";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "bifrost_tokens_total";

/// Total discovery retries (not counting the initial call).
///
/// Labels: `provider`.
pub const DISCOVERY_RETRIES_TOTAL: &str = "bifrost_discovery_retries_total";

/// Total catalog entries rejected by validation.
pub const CATALOG_REJECTIONS_TOTAL: &str = "bifrost_catalog_rejections_total";
