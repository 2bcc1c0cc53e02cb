//! Capability catalog: the registry of known models.
//!
//! Entries come from two sources:
//! 1. **Static**: the embedded seed, configuration, and explicit `register` calls
//! 2. **Discovered**: models a provider reports at runtime
//!
//! Registration is keyed by [`ModelKey`] and idempotent (last write wins).
//! Discovery never overwrites a static entry: declared metadata beats
//! whatever [`infer`] can guess from a model name.

pub mod infer;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::telemetry;
use crate::types::{ModelCapability, ModelKey};
use crate::{BifrostError, Result};

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    Static,
    Discovered,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    capability: Arc<ModelCapability>,
    origin: EntryOrigin,
}

/// What happened to a discovered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// A static entry exists for the key; discovery left it alone.
    KeptStatic,
}

/// Thread-safe catalog of model capabilities.
///
/// Readers take cheap `Arc` clones of entries, so a snapshot stays valid
/// while the catalog is updated underneath it.
#[derive(Debug, Default)]
pub struct CapabilityCatalog {
    entries: RwLock<HashMap<ModelKey, CatalogEntry>>,
}

impl CapabilityCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog pre-populated with the embedded seed.
    ///
    /// The seed is compiled in and covered by tests. If it ever fails to
    /// parse the catalog starts empty and a warning is logged.
    pub fn with_embedded_seed() -> Self {
        let catalog = Self::new();
        match serde_json::from_str::<Vec<ModelCapability>>(EMBEDDED_SEED) {
            Ok(entries) => {
                let rejected = catalog.register_batch(entries);
                if !rejected.is_empty() {
                    warn!(rejected = rejected.len(), "embedded seed has invalid entries");
                }
            }
            Err(e) => warn!(error = %e, "failed to parse embedded model seed"),
        }
        catalog
    }

    /// Register a static entry, replacing any entry with the same key.
    ///
    /// Malformed entries are rejected with [`BifrostError::Validation`],
    /// logged, and counted in [`telemetry::CATALOG_REJECTIONS_TOTAL`].
    pub fn register(&self, capability: ModelCapability) -> Result<()> {
        self.insert(capability, EntryOrigin::Static)
    }

    /// Register many static entries. Returns the rejections; valid entries
    /// are registered regardless.
    pub fn register_batch(
        &self,
        capabilities: impl IntoIterator<Item = ModelCapability>,
    ) -> Vec<BifrostError> {
        capabilities
            .into_iter()
            .filter_map(|cap| self.register(cap).err())
            .collect()
    }

    /// Insert or update a discovered entry.
    ///
    /// A static entry with the same key is kept as is.
    pub fn upsert_discovered(&self, capability: ModelCapability) -> Result<UpsertOutcome> {
        validate(&capability).inspect_err(reject)?;
        let key = capability.key();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let outcome = match entries.get(&key).map(|e| e.origin) {
            Some(EntryOrigin::Static) => return Ok(UpsertOutcome::KeptStatic),
            Some(EntryOrigin::Discovered) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        debug!(model = %key, ?outcome, "discovered model");
        entries.insert(
            key,
            CatalogEntry {
                capability: Arc::new(capability),
                origin: EntryOrigin::Discovered,
            },
        );
        Ok(outcome)
    }

    /// Drop `provider`'s discovered entries whose key is not in `listed`.
    ///
    /// Static entries are never removed. Returns the removed keys.
    pub fn prune_discovered(&self, provider: &str, listed: &HashSet<ModelKey>) -> Vec<ModelKey> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = Vec::new();
        entries.retain(|key, entry| {
            let stale = entry.origin == EntryOrigin::Discovered
                && key.provider == provider
                && !listed.contains(key);
            if stale {
                removed.push(key.clone());
            }
            !stale
        });
        removed.sort();
        for key in &removed {
            debug!(model = %key, "model no longer offered");
        }
        removed
    }

    /// Look up one entry.
    pub fn get(&self, key: &ModelKey) -> Result<Arc<ModelCapability>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|e| Arc::clone(&e.capability))
            .ok_or_else(|| BifrostError::ModelNotFound(key.to_string()))
    }

    /// Origin of an entry, if present.
    pub fn origin(&self, key: &ModelKey) -> Option<EntryOrigin> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|e| e.origin)
    }

    /// Entries matching `predicate`, ordered by key.
    pub fn find<F>(&self, predicate: F) -> Vec<Arc<ModelCapability>>
    where
        F: Fn(&ModelCapability) -> bool,
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<_> = entries
            .values()
            .filter(|e| predicate(&e.capability))
            .map(|e| Arc::clone(&e.capability))
            .collect();
        found.sort_by_key(|cap| cap.key());
        found
    }

    /// Every entry, ordered by key.
    pub fn snapshot(&self) -> Vec<Arc<ModelCapability>> {
        self.find(|_| true)
    }

    /// Distinct provider names in the catalog.
    pub fn providers(&self) -> BTreeSet<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|k| k.provider.clone())
            .collect()
    }

    /// Number of entries in the catalog.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, capability: ModelCapability, origin: EntryOrigin) -> Result<()> {
        validate(&capability).inspect_err(reject)?;
        let key = capability.key();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                CatalogEntry {
                    capability: Arc::new(capability),
                    origin,
                },
            );
        Ok(())
    }
}

/// Required-field checks. Nothing beyond what selection depends on.
fn validate(cap: &ModelCapability) -> Result<()> {
    if cap.name.trim().is_empty() {
        return Err(BifrostError::validation("name", "must not be empty"));
    }
    if cap.provider.trim().is_empty() {
        return Err(BifrostError::validation(
            "provider",
            format!("model '{}' has no provider", cap.name),
        ));
    }
    if cap.provider.contains('/') {
        return Err(BifrostError::validation(
            "provider",
            format!("'{}' must not contain '/'", cap.provider),
        ));
    }
    if let Some(tag) = cap
        .strengths
        .iter()
        .chain(&cap.weaknesses)
        .find(|t| t.trim().is_empty())
    {
        return Err(BifrostError::validation(
            "strengths",
            format!("model '{}' has a blank tag {tag:?}", cap.name),
        ));
    }
    if let Some(b) = cap.parameters_b
        && !(b.is_finite() && b > 0.0)
    {
        return Err(BifrostError::validation(
            "parameters_b",
            format!("model '{}' declares {b} billion parameters", cap.name),
        ));
    }
    Ok(())
}

fn reject(err: &BifrostError) {
    warn!(error = %err, "rejected catalog entry");
    metrics::counter!(telemetry::CATALOG_REJECTIONS_TOTAL).increment(1);
}

/// Raw JSON seed data compiled into the binary.
const EMBEDDED_SEED: &str = include_str!("seed.json");
