//! Provider registry.
//!
//! Holds the collaborators the router talks to, keyed by provider name.
//! Registration order doubles as the default priority order used to break
//! score ties during selection (index 0 = highest).
//!
//! When a [`RetryConfig`] is set, discovery collaborators registered after
//! it are wrapped in [`RetryingDiscovery`]. Generation is never wrapped:
//! the fallback walk handles failed attempts by moving on.

use std::collections::HashMap;
use std::sync::Arc;

use super::retry::{RetryConfig, RetryingDiscovery};
use super::traits::{GenerateProvider, HealthProbe, ModelDiscovery};

/// Registered collaborators, by capability.
#[derive(Default)]
pub struct ProviderRegistry {
    generate: Vec<Arc<dyn GenerateProvider>>,
    probes: Vec<Arc<dyn HealthProbe>>,
    discovery: Vec<Arc<dyn ModelDiscovery>>,
    retry_config: Option<RetryConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry policy for discovery collaborators registered from now on.
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = Some(config);
    }

    // ========================================================================
    // Registration (appends = lowest priority so far)
    // ========================================================================

    /// Add a generation backend. A later one with the same name replaces it
    /// in place, keeping its priority.
    pub fn add_generate(&mut self, provider: Arc<dyn GenerateProvider>) {
        upsert(&mut self.generate, provider, |p| p.name().to_string());
    }

    pub fn add_probe(&mut self, probe: Arc<dyn HealthProbe>) {
        upsert(&mut self.probes, probe, |p| p.name().to_string());
    }

    /// Add a discovery collaborator, retry-wrapped if a config is set.
    pub fn add_discovery(&mut self, discovery: Arc<dyn ModelDiscovery>) {
        let discovery: Arc<dyn ModelDiscovery> = match &self.retry_config {
            Some(config) => Arc::new(RetryingDiscovery::new(discovery, config.clone())),
            None => discovery,
        };
        upsert(&mut self.discovery, discovery, |d| d.name().to_string());
    }

    /// Register one backend for all three capabilities.
    pub fn add_provider<P>(&mut self, provider: Arc<P>)
    where
        P: GenerateProvider + HealthProbe + ModelDiscovery + 'static,
    {
        self.add_generate(Arc::clone(&provider) as Arc<dyn GenerateProvider>);
        self.add_probe(Arc::clone(&provider) as Arc<dyn HealthProbe>);
        self.add_discovery(provider as Arc<dyn ModelDiscovery>);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Generation backend for `provider`.
    pub fn generator(&self, provider: &str) -> Option<Arc<dyn GenerateProvider>> {
        self.generate
            .iter()
            .find(|p| p.name() == provider)
            .cloned()
    }

    /// Generation backends by name, for the executor.
    pub fn generators(&self) -> HashMap<String, Arc<dyn GenerateProvider>> {
        self.generate
            .iter()
            .map(|p| (p.name().to_string(), Arc::clone(p)))
            .collect()
    }

    pub fn probes(&self) -> &[Arc<dyn HealthProbe>] {
        &self.probes
    }

    pub fn discoveries(&self) -> &[Arc<dyn ModelDiscovery>] {
        &self.discovery
    }

    /// Generation provider names in priority order.
    pub fn priority(&self) -> Vec<String> {
        self.generate.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.generate.is_empty()
    }
}

fn upsert<T: ?Sized>(list: &mut Vec<Arc<T>>, item: Arc<T>, name: impl Fn(&T) -> String) {
    let key = name(&item);
    match list.iter().position(|existing| name(existing) == key) {
        Some(idx) => list[idx] = item,
        None => list.push(item),
    }
}
