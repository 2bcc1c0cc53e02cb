//! System resource profiler.
//!
//! [`ResourceProfiler`] caches one [`SystemProfile`] behind a moka TTL cache
//! and re-detects once it expires (or after [`ResourceProfiler::invalidate`]).
//! Detection never fails the caller: errors degrade to
//! [`SystemProfile::conservative`], which biases selection toward small models.
//!
//! [`can_run`] and [`headroom_score`] are the pure feasibility checks used by
//! selection.

pub mod detect;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, warn};

use crate::Result;
use crate::types::{ModelCapability, SystemProfile};

pub use detect::HostDetector;

/// Fraction of available memory a model may claim.
pub const MEMORY_HEADROOM: f64 = 0.8;

/// Default profile lifetime.
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(300);

/// Source of host resource facts.
#[async_trait]
pub trait ResourceDetector: Send + Sync {
    /// Detector name for logging.
    fn name(&self) -> &str;

    /// Detect the current host resources.
    async fn detect(&self) -> Result<SystemProfile>;
}

/// Detector that always reports the same profile.
///
/// Useful for pinning a deployment to declared limits (e.g. a container
/// whose cgroup limits `/proc` does not reflect) and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedDetector(pub SystemProfile);

#[async_trait]
impl ResourceDetector for FixedDetector {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn detect(&self) -> Result<SystemProfile> {
        Ok(self.0)
    }
}

/// Cached host profile.
pub struct ResourceProfiler {
    detector: Arc<dyn ResourceDetector>,
    cache: Cache<(), SystemProfile>,
}

impl ResourceProfiler {
    /// Create a profiler over `detector` whose profile lives for `ttl`.
    pub fn new(detector: Arc<dyn ResourceDetector>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self { detector, cache }
    }

    /// Profiler for the machine this process runs on.
    pub fn host(ttl: Duration) -> Self {
        Self::new(Arc::new(HostDetector::new()), ttl)
    }

    /// Profiler that always reports `profile`.
    pub fn fixed(profile: SystemProfile) -> Self {
        Self::new(Arc::new(FixedDetector(profile)), DEFAULT_PROFILE_TTL)
    }

    /// Current profile, detecting if the cached one expired.
    ///
    /// Concurrent callers during a detection share its result.
    pub async fn profile(&self) -> SystemProfile {
        let detector = Arc::clone(&self.detector);
        self.cache
            .get_with((), async move {
                match detector.detect().await {
                    Ok(profile) => {
                        debug!(
                            detector = detector.name(),
                            cores = profile.cpu.cores,
                            available_mb = profile.memory.available_mb,
                            vram_mb = profile.gpu.vram_mb,
                            "detected system profile"
                        );
                        profile
                    }
                    Err(e) => {
                        warn!(
                            detector = detector.name(),
                            error = %e,
                            "resource detection failed, using conservative profile"
                        );
                        SystemProfile::conservative()
                    }
                }
            })
            .await
    }

    /// Drop the cached profile; the next [`profile`](Self::profile) re-detects.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

/// Whether `cap` can run on a host described by `profile`.
///
/// Remote models always can. Local ones need 80% of available memory to
/// cover their RAM requirement, enough cores, and, if they declare VRAM and
/// a GPU is present, enough VRAM. A VRAM requirement on a GPU-less host is
/// satisfied by CPU fallback.
pub fn can_run(cap: &ModelCapability, profile: &SystemProfile) -> bool {
    if !cap.is_local() {
        return true;
    }
    let req = &cap.resources;
    let usable_ram = profile.memory.available_mb as f64 * MEMORY_HEADROOM;
    let ram_ok = usable_ram >= req.min_ram_mb as f64;
    let cpu_ok = profile.cpu.cores >= req.min_cpu_cores;
    let vram_ok =
        req.min_vram_mb == 0 || !profile.gpu.present || profile.gpu.vram_mb >= req.min_vram_mb;
    ram_ok && cpu_ok && vram_ok
}

/// How comfortably `cap` fits, in [0, 1].
///
/// Mean of the spare fraction of each constrained resource. Remote models
/// and unconstrained entries score 1.0. A VRAM requirement met by CPU
/// fallback contributes 0.
pub fn headroom_score(cap: &ModelCapability, profile: &SystemProfile) -> f64 {
    if !cap.is_local() {
        return 1.0;
    }
    let req = &cap.resources;
    let spare = |need: f64, have: f64| -> f64 {
        if need <= 0.0 {
            1.0
        } else if have <= 0.0 {
            0.0
        } else {
            (1.0 - need / have).clamp(0.0, 1.0)
        }
    };

    let mut margins = vec![
        spare(
            req.min_ram_mb as f64,
            profile.memory.available_mb as f64 * MEMORY_HEADROOM,
        ),
        spare(req.min_cpu_cores as f64, profile.cpu.cores as f64),
    ];
    if req.min_vram_mb > 0 {
        margins.push(if profile.gpu.present {
            spare(req.min_vram_mb as f64, profile.gpu.vram_mb as f64)
        } else {
            0.0
        });
    }
    margins.iter().sum::<f64>() / margins.len() as f64
}
