//! Host resource snapshot.

use serde::{Deserialize, Serialize};

/// CPU facts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    /// Physical cores.
    pub cores: u32,
    /// Logical threads.
    pub threads: u32,
    /// Nominal clock in MHz, 0 when unknown.
    pub clock_mhz: u32,
    /// Load in [0, 1], 0 when unknown.
    pub utilization: f32,
}

/// Memory facts, in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub available_mb: u64,
    /// Used fraction in [0, 1].
    pub utilization: f32,
}

impl MemoryInfo {
    /// Build from total/available, deriving utilization.
    pub fn new(total_mb: u64, available_mb: u64) -> Self {
        let available_mb = available_mb.min(total_mb);
        let utilization = if total_mb == 0 {
            0.0
        } else {
            1.0 - (available_mb as f32 / total_mb as f32)
        };
        Self {
            total_mb,
            available_mb,
            utilization,
        }
    }
}

/// GPU vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Apple,
    Intel,
    #[default]
    Unknown,
}

/// GPU facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub present: bool,
    pub vram_mb: u64,
    pub vendor: GpuVendor,
}

impl GpuInfo {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Read-only snapshot of host resources, consumed by selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub gpu: GpuInfo,
    /// False when this is the conservative fallback rather than a detection.
    pub detected: bool,
}

impl SystemProfile {
    /// Minimal profile used when detection fails: 2 cores, 4 GB total,
    /// 2 GB available, no GPU. Biases selection toward small models.
    pub fn conservative() -> Self {
        Self {
            cpu: CpuInfo {
                cores: 2,
                threads: 2,
                clock_mhz: 0,
                utilization: 0.0,
            },
            memory: MemoryInfo::new(4096, 2048),
            gpu: GpuInfo::none(),
            detected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_utilization_is_derived() {
        let mem = MemoryInfo::new(16_000, 4_000);
        assert!((mem.utilization - 0.75).abs() < 1e-6);
    }

    #[test]
    fn memory_available_is_capped_by_total() {
        let mem = MemoryInfo::new(1_000, 5_000);
        assert_eq!(mem.available_mb, 1_000);
        assert_eq!(mem.utilization, 0.0);
    }

    #[test]
    fn conservative_profile_has_no_gpu() {
        let profile = SystemProfile::conservative();
        assert!(!profile.gpu.present);
        assert!(!profile.detected);
        assert_eq!(profile.cpu.cores, 2);
    }
}
