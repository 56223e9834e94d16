//! Platform and device discovery with GPU to CPU fallback.

use crate::error::{Error, Result};

/// Platforms in the order they are considered. The first one that exposes
/// any adapter is the platform devices are selected from.
const PLATFORM_ORDER: [wgpu::Backend; 5] = [
    wgpu::Backend::Vulkan,
    wgpu::Backend::Metal,
    wgpu::Backend::Dx12,
    wgpu::Backend::Gl,
    wgpu::Backend::BrowserWebGpu,
];

/// Device class requested from a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum DeviceClass {
    Gpu,
    Cpu,
}

impl DeviceClass {
    /// Classifies a backend device type. `Other` belongs to neither class.
    pub fn of(device_type: wgpu::DeviceType) -> Option<Self> {
        match device_type {
            wgpu::DeviceType::DiscreteGpu
            | wgpu::DeviceType::IntegratedGpu
            | wgpu::DeviceType::VirtualGpu => Some(DeviceClass::Gpu),
            wgpu::DeviceType::Cpu => Some(DeviceClass::Cpu),
            wgpu::DeviceType::Other => None,
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Gpu => f.write_str("GPU"),
            DeviceClass::Cpu => f.write_str("CPU"),
        }
    }
}

/// What the selector is allowed to look at.
#[derive(Debug, Clone, Copy)]
pub struct DeviceRequest {
    pub backends: wgpu::Backends,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::from_env().unwrap_or(wgpu::Backends::all()),
        }
    }
}

impl From<&crate::config::Config> for DeviceRequest {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            backends: config.backends,
        }
    }
}

/// One enumerated adapter, reduced to what the selection policy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl From<&wgpu::AdapterInfo> for DeviceCandidate {
    fn from(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }
}

/// Outcome of the selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Index into the candidate list.
    pub index: usize,
    pub class: DeviceClass,
    /// True when no GPU-class device existed on the chosen platform.
    pub fell_back: bool,
}

/// Applies the GPU to CPU fallback policy to an enumerated adapter list.
///
/// Only the first platform that has any adapter is searched. Within it a
/// discrete GPU beats an integrated one, which beats a virtual one; ties go
/// to enumeration order.
pub fn choose_device(candidates: &[DeviceCandidate]) -> Result<Selection> {
    let platform = PLATFORM_ORDER
        .iter()
        .copied()
        .find(|backend| candidates.iter().any(|c| c.backend == *backend))
        .ok_or_else(|| Error::platform("no compute platform exposes an adapter"))?;

    let on_platform = || {
        candidates
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.backend == platform)
    };

    let gpu = on_platform()
        .filter_map(|(i, c)| gpu_rank(c.device_type).map(|rank| (rank, i)))
        .min();
    if let Some((_, index)) = gpu {
        return Ok(Selection {
            index,
            class: DeviceClass::Gpu,
            fell_back: false,
        });
    }

    on_platform()
        .find(|(_, c)| c.device_type == wgpu::DeviceType::Cpu)
        .map(|(index, _)| Selection {
            index,
            class: DeviceClass::Cpu,
            fell_back: true,
        })
        .ok_or_else(|| {
            Error::device_unavailable(format!(
                "platform {platform:?} has neither a GPU nor a CPU device"
            ))
        })
}

fn gpu_rank(device_type: wgpu::DeviceType) -> Option<u8> {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => Some(0),
        wgpu::DeviceType::IntegratedGpu => Some(1),
        wgpu::DeviceType::VirtualGpu => Some(2),
        _ => None,
    }
}

/// A device chosen for the run. Immutable once selected.
#[derive(Debug)]
pub struct SelectedDevice {
    adapter: wgpu::Adapter,
    info: wgpu::AdapterInfo,
    class: DeviceClass,
}

impl SelectedDevice {
    /// Get the wgpu adapter
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Backend-reported name, vendor and driver.
    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    /// Device class used by the selection policy.
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub(crate) fn into_parts(self) -> (wgpu::Adapter, wgpu::AdapterInfo, DeviceClass) {
        (self.adapter, self.info, self.class)
    }
}

/// Enumerates adapters for the requested backends and applies [`choose_device`].
pub fn select_device(request: &DeviceRequest) -> Result<SelectedDevice> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: request.backends,
        ..Default::default()
    });

    let mut adapters = instance.enumerate_adapters(request.backends);
    let candidates: Vec<DeviceCandidate> = adapters
        .iter()
        .map(|adapter| DeviceCandidate::from(&adapter.get_info()))
        .collect();

    tracing::debug!(count = candidates.len(), "enumerated adapters");

    let selection = choose_device(&candidates)?;
    if selection.fell_back {
        tracing::warn!("GPU not found, falling back to a CPU device");
    }

    let adapter = adapters.swap_remove(selection.index);
    let info = adapter.get_info();

    tracing::info!(
        "selected {} device: {} ({:?}, {:?})",
        selection.class,
        info.name,
        info.backend,
        info.device_type
    );

    Ok(SelectedDevice {
        adapter,
        info,
        class: selection.class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{Backend, DeviceType};

    fn candidate(name: &str, backend: Backend, device_type: DeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            backend,
            device_type,
        }
    }

    #[test]
    fn test_gpu_preferred() {
        let candidates = [
            candidate("llvmpipe", Backend::Vulkan, DeviceType::Cpu),
            candidate("radeon", Backend::Vulkan, DeviceType::DiscreteGpu),
        ];

        let selection = choose_device(&candidates).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.class, DeviceClass::Gpu);
        assert!(!selection.fell_back);
    }

    #[test]
    fn test_discrete_beats_integrated() {
        let candidates = [
            candidate("iris", Backend::Vulkan, DeviceType::IntegratedGpu),
            candidate("virtio", Backend::Vulkan, DeviceType::VirtualGpu),
            candidate("geforce", Backend::Vulkan, DeviceType::DiscreteGpu),
        ];

        assert_eq!(choose_device(&candidates).unwrap().index, 2);
    }

    #[test]
    fn test_falls_back_to_cpu() {
        let candidates = [candidate("llvmpipe", Backend::Vulkan, DeviceType::Cpu)];

        let selection = choose_device(&candidates).unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.class, DeviceClass::Cpu);
        assert!(selection.fell_back);
    }

    #[test]
    fn test_fallback_stays_on_first_platform() {
        // A GPU on a later platform does not override the first platform's CPU.
        let candidates = [
            candidate("angle", Backend::Gl, DeviceType::IntegratedGpu),
            candidate("lavapipe", Backend::Vulkan, DeviceType::Cpu),
        ];

        let selection = choose_device(&candidates).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.class, DeviceClass::Cpu);
    }

    #[test]
    fn test_no_device_class_available() {
        let candidates = [candidate("mystery", Backend::Vulkan, DeviceType::Other)];

        let result = choose_device(&candidates);
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }

    #[test]
    fn test_no_platform() {
        let result = choose_device(&[]);
        assert!(matches!(result, Err(Error::PlatformDiscovery(_))));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let candidates = [
            candidate("a", Backend::Vulkan, DeviceType::IntegratedGpu),
            candidate("b", Backend::Vulkan, DeviceType::IntegratedGpu),
        ];

        let first = choose_device(&candidates).unwrap();
        for _ in 0..10 {
            assert_eq!(choose_device(&candidates).unwrap(), first);
        }
        assert_eq!(first.index, 0);
    }

    #[test]
    fn test_device_class_of() {
        assert_eq!(DeviceClass::of(DeviceType::DiscreteGpu), Some(DeviceClass::Gpu));
        assert_eq!(DeviceClass::of(DeviceType::Cpu), Some(DeviceClass::Cpu));
        assert_eq!(DeviceClass::of(DeviceType::Other), None);
    }
}
