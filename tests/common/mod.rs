//! Shared fixtures for the integration tests: scripted collaborators and
//! host profiles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use bifrost::{
    AttemptBudget, BifrostError, CpuInfo, GenerateProvider, GenerateRequest, GenerateResponse,
    GpuInfo, HealthProbe, MemoryInfo, ModelCapability, ModelDiscovery, ProbeReport, Result,
    SystemProfile, Usage,
};

// ============================================================================
// Scripted provider
// ============================================================================

/// What a [`MockProvider`] does when asked to generate with a model.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer `"<provider>/<model>"`.
    Succeed,
    /// Fail with a transport error.
    Fail,
    /// Never answer; wait for the attempt token.
    Hang,
    /// Answer after a delay.
    Delay(Duration),
}

/// Provider implementing all three collaborator traits with scripted
/// behaviour and call accounting.
pub struct MockProvider {
    name: String,
    default: Behavior,
    per_model: HashMap<String, Behavior>,
    models: Mutex<Vec<ModelCapability>>,
    probe_ok: AtomicBool,
    probe_delay: Mutex<Option<Duration>>,
    discovery_failures: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub discovery_calls: AtomicUsize,
    pub tokens: Mutex<Vec<CancellationToken>>,
    pub budgets: Mutex<Vec<AttemptBudget>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: Behavior::Succeed,
            per_model: HashMap::new(),
            models: Mutex::new(Vec::new()),
            probe_ok: AtomicBool::new(true),
            probe_delay: Mutex::new(None),
            discovery_failures: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            discovery_calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            budgets: Mutex::new(Vec::new()),
        }
    }

    /// Behaviour for every model without an override.
    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.default = behavior;
        self
    }

    pub fn model_behaves(mut self, model: &str, behavior: Behavior) -> Self {
        self.per_model.insert(model.to_string(), behavior);
        self
    }

    /// Models returned by discovery.
    pub fn offers(self, models: Vec<ModelCapability>) -> Self {
        self.set_offers(models);
        self
    }

    /// Change what later discovery calls return.
    pub fn set_offers(&self, models: Vec<ModelCapability>) {
        *self.models.lock().unwrap() = models;
    }

    /// Fail the first `n` discovery calls with a transient error.
    pub fn flaky_discovery(self, n: usize) -> Self {
        self.discovery_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` discovery calls with a transient error.
    pub fn fail_next_discoveries(&self, n: usize) {
        self.discovery_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Option<Duration>) {
        *self.probe_delay.lock().unwrap() = delay;
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerateProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        model: &str,
        _request: &GenerateRequest,
        budget: AttemptBudget,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(cancel.clone());
        self.budgets.lock().unwrap().push(budget);

        let behavior = self.per_model.get(model).unwrap_or(&self.default).clone();
        match behavior {
            Behavior::Succeed => Ok(answer(&self.name, model)),
            Behavior::Fail => Err(BifrostError::Http(format!(
                "connection refused by {}",
                self.name
            ))),
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(BifrostError::Cancelled)
            }
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(answer(&self.name, model))
            }
        }
    }
}

fn answer(provider: &str, model: &str) -> GenerateResponse {
    let mut response = GenerateResponse::text(format!("{provider}/{model}"));
    response.usage = Some(Usage::new(12, 30));
    response.model = Some(model.to_string());
    response
}

#[async_trait]
impl HealthProbe for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, _timeout: Duration) -> Result<ProbeReport> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(ProbeReport {
                latency: Duration::from_millis(20),
            })
        } else {
            Err(BifrostError::Http("probe refused".into()))
        }
    }
}

#[async_trait]
impl ModelDiscovery for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover_models(&self) -> Result<Vec<ModelCapability>> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.discovery_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.discovery_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BifrostError::Http("discovery unavailable".into()));
        }
        Ok(self.models.lock().unwrap().clone())
    }
}

pub fn mock(name: &str) -> Arc<MockProvider> {
    Arc::new(MockProvider::new(name))
}

// ============================================================================
// Profiles and catalog entries
// ============================================================================

/// A workstation with `available_mb` free memory, `cores` cores and no GPU.
pub fn host(available_mb: u64, cores: u32) -> SystemProfile {
    SystemProfile {
        cpu: CpuInfo {
            cores,
            threads: cores * 2,
            clock_mhz: 3200,
            utilization: 0.1,
        },
        memory: MemoryInfo::new(available_mb * 2, available_mb),
        gpu: GpuInfo::none(),
        detected: true,
    }
}

/// A host large enough for every test model.
pub fn roomy_host() -> SystemProfile {
    host(64_000, 16)
}

/// Remote, unconstrained chat model on `provider`.
pub fn chat_model(provider: &str, name: &str) -> ModelCapability {
    ModelCapability::remote(name, provider).with_strengths(["chat", "general"])
}
