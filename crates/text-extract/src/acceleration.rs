//! Accelerator detection and device selection.
//!
//! Strategies resolve their device once, lazily, in this order:
//!
//! 1. the `USE_GPU` environment override,
//! 2. the strategy config key `use_gpu`,
//! 3. probing accelerators in priority order (CUDA, Metal, ROCm).
//!
//! A forced-on override still picks the first probe that reports available
//! hardware and assumes CUDA when none does. Whether the backend actually
//! comes up on that device is decided later by the reader fallback.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

/// Compute device a backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Metal,
    Rocm,
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Metal => "metal",
            Device::Rocm => "rocm",
            Device::Cpu => "cpu",
        }
    }

    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports whether one kind of accelerator is usable on this host.
pub trait AcceleratorProbe: Send + Sync {
    fn device(&self) -> Device;

    fn is_available(&self) -> bool;
}

/// NVIDIA GPUs, detected through `nvidia-smi -L`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CudaProbe;

impl AcceleratorProbe for CudaProbe {
    fn device(&self) -> Device {
        Device::Cuda
    }

    fn is_available(&self) -> bool {
        let Ok(binary) = which::which("nvidia-smi") else {
            return false;
        };

        Command::new(binary)
            .arg("-L")
            .output()
            .map(|o| o.status.success() && !o.stdout.trim_ascii().is_empty())
            .unwrap_or(false)
    }
}

/// Apple Silicon GPUs.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetalProbe;

impl AcceleratorProbe for MetalProbe {
    fn device(&self) -> Device {
        Device::Metal
    }

    fn is_available(&self) -> bool {
        cfg!(all(target_os = "macos", target_arch = "aarch64"))
    }
}

/// AMD GPUs, detected through the ROCm kernel driver node.
#[derive(Debug, Default, Clone, Copy)]
pub struct RocmProbe;

impl AcceleratorProbe for RocmProbe {
    fn device(&self) -> Device {
        Device::Rocm
    }

    fn is_available(&self) -> bool {
        Path::new("/dev/kfd").exists()
    }
}

/// Probes in priority order.
pub fn default_probes() -> Vec<Arc<dyn AcceleratorProbe>> {
    vec![Arc::new(CudaProbe), Arc::new(MetalProbe), Arc::new(RocmProbe)]
}

/// Where a [`DeviceSelection`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Environment,
    Config,
    Probe,
    Fallback,
}

/// Resolved device plus the rule that chose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelection {
    pub device: Device,
    pub source: SelectionSource,
}

impl DeviceSelection {
    pub fn accelerated(&self) -> bool {
        self.device.is_accelerated()
    }

    /// The same selection after the backend refused the accelerator.
    pub fn cpu_fallback(self) -> Self {
        Self {
            device: Device::Cpu,
            source: SelectionSource::Fallback,
        }
    }
}

/// Pick a device from the environment override, the config flag and the probes.
pub fn select_device(
    env_override: Option<bool>,
    config_flag: Option<bool>,
    probes: &[Arc<dyn AcceleratorProbe>],
) -> DeviceSelection {
    let forced = env_override
        .map(|flag| (flag, SelectionSource::Environment))
        .or_else(|| config_flag.map(|flag| (flag, SelectionSource::Config)));

    match forced {
        Some((false, source)) => DeviceSelection {
            device: Device::Cpu,
            source,
        },
        Some((true, source)) => DeviceSelection {
            device: first_available(probes).unwrap_or(Device::Cuda),
            source,
        },
        None => match first_available(probes) {
            Some(device) => DeviceSelection {
                device,
                source: SelectionSource::Probe,
            },
            None => DeviceSelection {
                device: Device::Cpu,
                source: SelectionSource::Fallback,
            },
        },
    }
}

fn first_available(probes: &[Arc<dyn AcceleratorProbe>]) -> Option<Device> {
    probes.iter().find(|probe| probe.is_available()).map(|probe| {
        tracing::debug!("Accelerator probe found {}", probe.device());
        probe.device()
    })
}
