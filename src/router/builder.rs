//! Builder for configuring router instances

use std::sync::Arc;

use super::Router;
use crate::catalog::CapabilityCatalog;
use crate::config::RouterConfig;
use crate::executor::FallbackExecutor;
use crate::health::HealthMonitor;
use crate::ledger::PerformanceLedger;
use crate::profiler::{ResourceDetector, ResourceProfiler};
use crate::providers::{
    GenerateProvider, HealthProbe, ModelDiscovery, ProviderRegistry, RetryConfig,
};
use crate::timeout::TimeoutCalculator;
use crate::types::{ModelCapability, SystemProfile};
use crate::{BifrostError, Result};

#[cfg(feature = "ollama")]
use crate::providers::OllamaProvider;
#[cfg(feature = "remote")]
use crate::providers::OpenAiCompatProvider;

enum ProfileSource {
    Host,
    Detector(Arc<dyn ResourceDetector>),
    Fixed(SystemProfile),
}

/// Builder for configuring router instances.
///
/// Providers are prioritised in the order they are added. Configured
/// providers (see [`with_configured_providers`](Self::with_configured_providers))
/// come after explicitly added ones.
pub struct RouterBuilder {
    config: RouterConfig,
    generate: Vec<Arc<dyn GenerateProvider>>,
    probes: Vec<Arc<dyn HealthProbe>>,
    discovery: Vec<Arc<dyn ModelDiscovery>>,
    catalog: Option<CapabilityCatalog>,
    models: Vec<ModelCapability>,
    profile: ProfileSource,
    retry: RetryConfig,
    configured_providers: bool,
    #[cfg_attr(not(feature = "ollama"), allow(dead_code))]
    ollama_url: Option<String>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            generate: Vec::new(),
            probes: Vec::new(),
            discovery: Vec::new(),
            catalog: None,
            models: Vec::new(),
            profile: ProfileSource::Host,
            retry: RetryConfig::default(),
            configured_providers: false,
            ollama_url: None,
        }
    }

    /// Use `config` for every component.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Also register the providers listed in the config's `[providers]` section.
    pub fn with_configured_providers(mut self) -> Self {
        self.configured_providers = true;
        self
    }

    /// Configure an Ollama provider at `url` (generation, probe and discovery).
    #[cfg(feature = "ollama")]
    pub fn ollama(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    /// Add a backend implementing all three collaborator traits.
    pub fn provider<P>(mut self, provider: Arc<P>) -> Self
    where
        P: GenerateProvider + HealthProbe + ModelDiscovery + 'static,
    {
        self.generate.push(Arc::clone(&provider) as Arc<dyn GenerateProvider>);
        self.probes.push(Arc::clone(&provider) as Arc<dyn HealthProbe>);
        self.discovery.push(provider as Arc<dyn ModelDiscovery>);
        self
    }

    pub fn generate_provider(mut self, provider: Arc<dyn GenerateProvider>) -> Self {
        self.generate.push(provider);
        self
    }

    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn model_discovery(mut self, discovery: Arc<dyn ModelDiscovery>) -> Self {
        self.discovery.push(discovery);
        self
    }

    /// Start from `catalog` instead of the bundled seed.
    pub fn catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Add a static catalog entry.
    pub fn model(mut self, capability: ModelCapability) -> Self {
        self.models.push(capability);
        self
    }

    /// Detect resources with `detector` instead of the host detector.
    pub fn detector(mut self, detector: Arc<dyn ResourceDetector>) -> Self {
        self.profile = ProfileSource::Detector(detector);
        self
    }

    /// Pretend the host looks like `profile`.
    pub fn system_profile(mut self, profile: SystemProfile) -> Self {
        self.profile = ProfileSource::Fixed(profile);
        self
    }

    /// Retry policy for discovery (default: 3 attempts).
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Build the router.
    ///
    /// # Errors
    ///
    /// Returns [`BifrostError::Configuration`] for an invalid config, or
    /// [`BifrostError::NoProvider`] when no generation backend is registered.
    pub fn build(self) -> Result<Router> {
        self.config.validate()?;

        let mut registry = ProviderRegistry::new();
        registry.set_retry_config(self.retry.clone());
        for provider in self.generate {
            registry.add_generate(provider);
        }
        for probe in self.probes {
            registry.add_probe(probe);
        }
        for discovery in self.discovery {
            registry.add_discovery(discovery);
        }

        #[cfg(feature = "ollama")]
        if let Some(url) = &self.ollama_url {
            registry.add_provider(Arc::new(OllamaProvider::new(url.clone())));
        }
        if self.configured_providers {
            register_configured(&mut registry, &self.config)?;
        }

        if registry.is_empty() {
            return Err(BifrostError::NoProvider);
        }

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None if self.config.catalog.skip_seed => CapabilityCatalog::new(),
            None => CapabilityCatalog::with_embedded_seed(),
        };
        // Rejections are logged and counted by the catalog.
        let _ = catalog.register_batch(
            self.config
                .catalog
                .models
                .iter()
                .cloned()
                .chain(self.models),
        );
        let catalog = Arc::new(catalog);

        let mut selection = self.config.selection.clone();
        if selection.provider_priority.is_empty() {
            selection.provider_priority = registry.priority();
        }

        let mut health = HealthMonitor::new(self.config.health.clone());
        for probe in registry.probes() {
            health.add_probe(Arc::clone(probe));
        }
        let health = Arc::new(health);

        let ttl = self.config.profiler.ttl();
        let profiler = match self.profile {
            ProfileSource::Host => ResourceProfiler::host(ttl),
            ProfileSource::Detector(detector) => ResourceProfiler::new(detector, ttl),
            ProfileSource::Fixed(profile) => ResourceProfiler::fixed(profile),
        };

        let ledger = Arc::new(PerformanceLedger::new(self.config.ledger.clone()));
        let executor = FallbackExecutor::new(
            Arc::clone(&catalog),
            Arc::clone(&health),
            Arc::clone(&ledger),
            TimeoutCalculator::new(self.config.timeouts.clone()),
            registry.generators(),
        );

        Ok(Router {
            catalog,
            profiler,
            health,
            ledger,
            executor,
            discovery: registry.discoveries().to_vec(),
            selection,
        })
    }
}

#[allow(unused_variables)]
fn register_configured(registry: &mut ProviderRegistry, config: &RouterConfig) -> Result<()> {
    if let Some(ollama) = &config.providers.ollama {
        #[cfg(feature = "ollama")]
        registry.add_provider(Arc::new(OllamaProvider::new(ollama.base_url.clone())));
        #[cfg(not(feature = "ollama"))]
        return Err(BifrostError::Configuration(format!(
            "ollama at {} needs the `ollama` feature",
            ollama.base_url
        )));
    }

    for remote in &config.providers.remote {
        #[cfg(feature = "remote")]
        {
            let mut provider = OpenAiCompatProvider::new(&remote.name, &remote.base_url);
            if let Some(var) = &remote.api_key_env {
                provider = provider.with_api_key_env(var);
            }
            registry.add_provider(Arc::new(provider));
        }
        #[cfg(not(feature = "remote"))]
        return Err(BifrostError::Configuration(format!(
            "provider '{}' needs the `remote` feature",
            remote.name
        )));
    }
    Ok(())
}
