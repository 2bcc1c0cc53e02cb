//! Fallback executor: walks a ranked chain one attempt at a time.
//!
//! ```text
//! Selecting ──► Attempting(i) ──► Success
//!                   │
//!                   └─ timeout / error ──► Attempting(i + 1) ──► ... ──► Exhausted
//! ```
//!
//! Each attempt runs under its own [`AttemptBudget`]. When the budget
//! expires the attempt's cancellation token fires and the call future is
//! dropped, which closes the underlying connection. Failed candidates are
//! added to the context's exclusion set and the walk continues on the
//! precomputed order; nothing is re-scored mid-walk.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::CapabilityCatalog;
use crate::error::{AttemptFailure, AttemptFailureKind, UnmetConstraint};
use crate::health::HealthMonitor;
use crate::ledger::PerformanceLedger;
use crate::providers::GenerateProvider;
use crate::telemetry;
use crate::timeout::TimeoutCalculator;
use crate::types::{
    AttemptBudget, AttemptDiagnostic, AttemptOutcome, Candidate, GenerateRequest,
    GenerateResponse, ModelCapability, PerformanceSample, RouteResponse, RoutingMetadata,
    SelectionContext, SelectionResult, Usage,
};
use crate::{BifrostError, Result};

/// How one attempt ended.
enum AttemptEnd {
    Finished(Result<GenerateResponse>),
    TimedOut,
    Cancelled,
}

/// Sequential fallback over a [`SelectionResult`].
pub struct FallbackExecutor {
    catalog: Arc<CapabilityCatalog>,
    health: Arc<HealthMonitor>,
    ledger: Arc<PerformanceLedger>,
    timeouts: TimeoutCalculator,
    providers: HashMap<String, Arc<dyn GenerateProvider>>,
}

impl FallbackExecutor {
    pub fn new(
        catalog: Arc<CapabilityCatalog>,
        health: Arc<HealthMonitor>,
        ledger: Arc<PerformanceLedger>,
        timeouts: TimeoutCalculator,
        providers: HashMap<String, Arc<dyn GenerateProvider>>,
    ) -> Self {
        Self {
            catalog,
            health,
            ledger,
            timeouts,
            providers,
        }
    }

    pub fn timeouts(&self) -> &TimeoutCalculator {
        &self.timeouts
    }

    /// Walk `selection` until one candidate succeeds.
    ///
    /// Every failed candidate is added to `context.excluded`. Returns
    /// [`BifrostError::AllProvidersFailed`] with one entry per attempted
    /// candidate when the chain is exhausted, or [`BifrostError::Cancelled`]
    /// as soon as `cancel` fires.
    #[instrument(
        skip_all,
        fields(task = %context.task_type, chain = selection.len(), degraded = selection.degraded)
    )]
    pub async fn execute(
        &self,
        context: &mut SelectionContext,
        request: &GenerateRequest,
        selection: SelectionResult,
        cancel: &CancellationToken,
    ) -> Result<RouteResponse> {
        let walk_start = Instant::now();
        let mut diagnostics = Vec::with_capacity(selection.len());
        let mut failures = Vec::new();

        let pending: Vec<Candidate> = selection
            .candidates
            .iter()
            .filter(|c| !context.is_excluded(&c.key))
            .cloned()
            .collect();

        for (i, candidate) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BifrostError::Cancelled);
            }
            let has_next = i + 1 < pending.len();
            let provider_name = candidate.provider();
            let model = candidate.model();

            let cap = self
                .catalog
                .get(&candidate.key)
                .unwrap_or_else(|_| Arc::new(ModelCapability::new(model, provider_name)));
            let budget =
                self.timeouts
                    .budget(&cap, request, &context.task_type, context.complexity);

            let attempt_start = Instant::now();
            let end = match self.providers.get(provider_name) {
                Some(provider) => run_attempt(provider.as_ref(), model, request, budget, cancel).await,
                None => AttemptEnd::Finished(Err(BifrostError::UnknownProvider(
                    provider_name.to_string(),
                ))),
            };
            let elapsed = attempt_start.elapsed();

            let (kind, message, err) = match end {
                AttemptEnd::Cancelled => {
                    debug!(provider = provider_name, model, "attempt cancelled by caller");
                    return Err(BifrostError::Cancelled);
                }
                AttemptEnd::Finished(Ok(response)) => {
                    record_attempt(provider_name, "ok", elapsed);
                    self.health.record_outcome(provider_name, true, elapsed);
                    self.ledger.record(
                        &candidate.key,
                        &context.task_type,
                        PerformanceSample::success(elapsed),
                    );
                    if let Some(usage) = &response.usage {
                        record_token_usage(provider_name, usage);
                    }
                    diagnostics.push(AttemptDiagnostic {
                        provider: provider_name.to_string(),
                        model: model.to_string(),
                        outcome: AttemptOutcome::Success,
                        elapsed,
                        budget,
                        reason: None,
                    });
                    info!(
                        provider = provider_name,
                        model,
                        attempts = diagnostics.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "request served"
                    );
                    return Ok(RouteResponse {
                        response,
                        metadata: RoutingMetadata {
                            provider: provider_name.to_string(),
                            model: model.to_string(),
                            attempts: diagnostics.len(),
                            total_latency: walk_start.elapsed(),
                            degraded: selection.degraded,
                            diagnostics,
                            selection,
                        },
                    });
                }
                AttemptEnd::TimedOut => {
                    let err = BifrostError::AttemptTimeout {
                        provider: provider_name.to_string(),
                        model: model.to_string(),
                        after: budget.total(),
                    };
                    let short = format!("no response within {:?}", budget.total());
                    (AttemptFailureKind::Timeout, short, err)
                }
                AttemptEnd::Finished(Err(e)) => {
                    let short = e.to_string();
                    let err = BifrostError::AttemptTransport {
                        provider: provider_name.to_string(),
                        model: model.to_string(),
                        message: short.clone(),
                    };
                    (AttemptFailureKind::Transport, short, err)
                }
            };

            let status = match kind {
                AttemptFailureKind::Timeout => "timeout",
                AttemptFailureKind::Transport => "error",
            };
            record_attempt(provider_name, status, elapsed);
            self.health.record_outcome(provider_name, false, elapsed);
            self.ledger.record(
                &candidate.key,
                &context.task_type,
                PerformanceSample::failure(elapsed),
            );
            context.excluded.insert(candidate.key.clone());
            warn!(
                provider = provider_name,
                model,
                attempt = i + 1,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "attempt failed"
            );
            if has_next {
                metrics::counter!(telemetry::FALLBACKS_TOTAL,
                    "provider" => provider_name.to_owned(),
                )
                .increment(1);
            }

            diagnostics.push(AttemptDiagnostic {
                provider: provider_name.to_string(),
                model: model.to_string(),
                outcome: match kind {
                    AttemptFailureKind::Timeout => AttemptOutcome::Timeout,
                    AttemptFailureKind::Transport => AttemptOutcome::Transport,
                },
                elapsed,
                budget,
                reason: Some(err.to_string()),
            });
            failures.push(AttemptFailure {
                provider: provider_name.to_string(),
                model: model.to_string(),
                kind,
                elapsed,
                message,
            });
        }

        if failures.is_empty() {
            return Err(BifrostError::NoCandidates {
                constraint: UnmetConstraint::Excluded,
            });
        }
        Err(BifrostError::AllProvidersFailed { attempts: failures })
    }
}

/// Run one generation call under `budget`, racing caller cancellation.
///
/// The attempt token is a child of `cancel`; it is cancelled on every exit
/// path before the call future is dropped.
async fn run_attempt(
    provider: &dyn GenerateProvider,
    model: &str,
    request: &GenerateRequest,
    budget: AttemptBudget,
    cancel: &CancellationToken,
) -> AttemptEnd {
    let token = cancel.child_token();
    let call = provider.generate(model, request, budget, token.clone());
    tokio::pin!(call);
    let deadline = tokio::time::sleep(budget.total());
    tokio::pin!(deadline);

    let end = tokio::select! {
        biased;
        _ = cancel.cancelled() => AttemptEnd::Cancelled,
        _ = &mut deadline => AttemptEnd::TimedOut,
        result = &mut call => match result {
            Err(BifrostError::Cancelled) if cancel.is_cancelled() => AttemptEnd::Cancelled,
            other => AttemptEnd::Finished(other),
        },
    };
    token.cancel();
    end
}

/// Attempt counter and latency histogram.
fn record_attempt(provider: &str, status: &'static str, elapsed: Duration) {
    metrics::counter!(telemetry::ATTEMPTS_TOTAL,
        "provider" => provider.to_owned(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS,
        "provider" => provider.to_owned(),
    )
    .record(elapsed.as_secs_f64());
}

fn record_token_usage(provider: &str, usage: &Usage) {
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "prompt",
    )
    .increment(u64::from(usage.prompt_tokens));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "completion",
    )
    .increment(u64::from(usage.completion_tokens));
}
