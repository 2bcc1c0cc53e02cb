//! Host resource detection.
//!
//! Linux reads `/proc` and asks `nvidia-smi` for VRAM; macOS asks `sysctl`
//! and `vm_stat`. Every probe is best-effort: a missing tool or an
//! unparseable file yields an error the profiler turns into the
//! conservative profile.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ResourceDetector;
use crate::types::{CpuInfo, GpuInfo, GpuVendor, MemoryInfo, SystemProfile};
use crate::{BifrostError, Result};

/// Upper bound for any external command we shell out to.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Detects the machine this process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDetector;

impl HostDetector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceDetector for HostDetector {
    fn name(&self) -> &str {
        "host"
    }

    #[cfg(target_os = "linux")]
    async fn detect(&self) -> Result<SystemProfile> {
        let meminfo = read_file("/proc/meminfo").await?;
        let (total_mb, available_mb) = parse_meminfo(&meminfo)
            .ok_or_else(|| BifrostError::Configuration("unparseable /proc/meminfo".into()))?;

        let threads = logical_threads();
        let cpuinfo = read_file("/proc/cpuinfo").await.unwrap_or_default();
        let (cores, clock_mhz) = parse_cpuinfo(&cpuinfo);
        let loadavg = read_file("/proc/loadavg").await.unwrap_or_default();

        let gpu = match run("nvidia-smi", &[
            "--query-gpu=memory.total",
            "--format=csv,noheader,nounits",
        ])
        .await
        {
            Ok(out) => parse_nvidia_smi(&out).map_or_else(GpuInfo::none, |vram_mb| GpuInfo {
                present: true,
                vram_mb,
                vendor: GpuVendor::Nvidia,
            }),
            Err(e) => {
                debug!(error = %e, "no NVIDIA GPU detected");
                GpuInfo::none()
            }
        };

        Ok(SystemProfile {
            cpu: CpuInfo {
                cores: cores.unwrap_or(threads).min(threads).max(1),
                threads,
                clock_mhz: clock_mhz.unwrap_or(0),
                utilization: parse_loadavg(&loadavg, threads),
            },
            memory: MemoryInfo::new(total_mb, available_mb),
            gpu,
            detected: true,
        })
    }

    #[cfg(target_os = "macos")]
    async fn detect(&self) -> Result<SystemProfile> {
        let total_bytes: u64 = sysctl("hw.memsize").await?;
        let cores: u32 = sysctl("hw.physicalcpu").await?;
        let threads: u32 = sysctl("hw.logicalcpu").await.unwrap_or(cores);
        let clock_hz: u64 = sysctl("hw.cpufrequency").await.unwrap_or(0);
        let total_mb = total_bytes / (1024 * 1024);
        let available_mb = match run("vm_stat", &[]).await {
            Ok(out) => parse_vm_stat(&out).unwrap_or(total_mb / 2),
            Err(_) => total_mb / 2,
        };

        // Apple Silicon shares memory with the GPU; roughly two thirds of it
        // is addressable as VRAM.
        let gpu = if cfg!(target_arch = "aarch64") {
            GpuInfo {
                present: true,
                vram_mb: total_mb * 2 / 3,
                vendor: GpuVendor::Apple,
            }
        } else {
            GpuInfo::none()
        };

        Ok(SystemProfile {
            cpu: CpuInfo {
                cores: cores.max(1),
                threads: threads.max(1),
                clock_mhz: (clock_hz / 1_000_000) as u32,
                utilization: 0.0,
            },
            memory: MemoryInfo::new(total_mb, available_mb),
            gpu,
            detected: true,
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    async fn detect(&self) -> Result<SystemProfile> {
        Err(BifrostError::Configuration(format!(
            "resource detection is not supported on {}",
            std::env::consts::OS
        )))
    }
}

#[cfg(target_os = "linux")]
async fn read_file(path: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BifrostError::Configuration(format!("cannot read {path}: {e}")))
}

#[cfg(target_os = "linux")]
fn logical_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Run a command and return its stdout, bounded by [`COMMAND_TIMEOUT`].
#[cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]
async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| BifrostError::Configuration(format!("{program} timed out")))?
    .map_err(|e| BifrostError::Configuration(format!("{program}: {e}")))?;
    if !output.status.success() {
        return Err(BifrostError::Configuration(format!(
            "{program} exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(target_os = "macos")]
async fn sysctl<T: std::str::FromStr>(name: &str) -> Result<T> {
    let out = run("sysctl", &["-n", name]).await?;
    out.trim()
        .parse()
        .map_err(|_| BifrostError::Configuration(format!("unparseable sysctl {name}: {out}")))
}

// ============================================================================
// Parsers
// ============================================================================

/// `(MemTotal, MemAvailable)` in MB. Falls back to `MemFree + Cached` on
/// kernels without `MemAvailable`.
pub(crate) fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let field = |name: &str| -> Option<u64> {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
    };
    let total_kb = field("MemTotal")?;
    let available_kb = field("MemAvailable")
        .or_else(|| Some(field("MemFree")? + field("Cached").unwrap_or(0)))?;
    Some((total_kb / 1024, available_kb / 1024))
}

/// `(physical cores, MHz)` from `/proc/cpuinfo`.
///
/// Physical cores = distinct `(physical id, core id)` pairs, or the first
/// `cpu cores` value when ids are missing.
pub(crate) fn parse_cpuinfo(content: &str) -> (Option<u32>, Option<u32>) {
    let value = |line: &str| line.split_once(':').map(|(_, v)| v.trim().to_string());

    let mut pairs = std::collections::BTreeSet::new();
    let mut physical = None;
    let mut cores_field = None;
    let mut mhz = None;
    for line in content.lines() {
        if line.starts_with("physical id") {
            physical = value(line);
        } else if line.starts_with("core id") {
            if let Some(core) = value(line) {
                pairs.insert((physical.clone().unwrap_or_default(), core));
            }
        } else if line.starts_with("cpu cores") && cores_field.is_none() {
            cores_field = value(line).and_then(|v| v.parse::<u32>().ok());
        } else if line.starts_with("cpu MHz") && mhz.is_none() {
            mhz = value(line)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.round() as u32);
        }
    }
    let cores = if pairs.is_empty() {
        cores_field
    } else {
        Some(pairs.len() as u32)
    };
    (cores, mhz)
}

/// One-minute load average as a fraction of `threads`, clamped to [0, 1].
pub(crate) fn parse_loadavg(content: &str, threads: u32) -> f32 {
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f32>().ok())
        .map_or(0.0, |load| (load / threads.max(1) as f32).clamp(0.0, 1.0))
}

/// Largest VRAM (MB) reported by `nvidia-smi`, one GPU per line.
pub(crate) fn parse_nvidia_smi(output: &str) -> Option<u64> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .max()
}

/// Free + inactive + speculative pages from `vm_stat`, in MB.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn parse_vm_stat(output: &str) -> Option<u64> {
    let mut lines = output.lines();
    let header = lines.next()?;
    let page_size: u64 = header
        .split("page size of ")
        .nth(1)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    let pages: u64 = lines
        .filter(|l| {
            l.starts_with("Pages free")
                || l.starts_with("Pages inactive")
                || l.starts_with("Pages speculative")
        })
        .filter_map(|l| {
            l.split(':')
                .nth(1)?
                .trim()
                .trim_end_matches('.')
                .parse::<u64>()
                .ok()
        })
        .sum();
    Some(pages * page_size / (1024 * 1024))
}
