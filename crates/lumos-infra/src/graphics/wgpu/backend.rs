// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Adapter selection with fallback.
//!
//! Each candidate backend gets its own instance restricted to that backend,
//! so a request for OpenGL can never silently come back as Vulkan.

use anyhow::{anyhow, Result};
use std::time::Instant;
use wgpu::{Adapter, Backend, Backends, DeviceType, Instance, RequestAdapterOptions};

use lumos_core::renderer::{
    GraphicsBackendType, PowerPreference, RendererAdapterInfo, RendererDeviceType,
};

/// Picks the first working adapter from a list of backends.
#[derive(Debug, Clone)]
pub struct WgpuBackendSelector {
    power_preference: PowerPreference,
}

impl WgpuBackendSelector {
    /// A selector requesting adapters with the given power preference.
    pub fn new(power_preference: PowerPreference) -> Self {
        Self { power_preference }
    }

    pub(crate) fn backend_to_type(backend: Backend) -> GraphicsBackendType {
        match backend {
            Backend::Vulkan => GraphicsBackendType::Vulkan,
            Backend::Dx12 => GraphicsBackendType::Dx12,
            Backend::Gl => GraphicsBackendType::OpenGl,
            Backend::Metal => GraphicsBackendType::Metal,
            #[allow(unreachable_patterns)]
            _ => GraphicsBackendType::Auto,
        }
    }

    pub(crate) fn device_type_to_type(device_type: DeviceType) -> RendererDeviceType {
        match device_type {
            DeviceType::IntegratedGpu => RendererDeviceType::IntegratedGpu,
            DeviceType::DiscreteGpu => RendererDeviceType::DiscreteGpu,
            DeviceType::VirtualGpu => RendererDeviceType::VirtualGpu,
            DeviceType::Cpu => RendererDeviceType::Cpu,
            _ => RendererDeviceType::Unknown,
        }
    }

    fn type_to_backends(backend_type: GraphicsBackendType) -> Option<Backends> {
        match backend_type {
            GraphicsBackendType::Vulkan => Some(Backends::VULKAN),
            GraphicsBackendType::Dx12 => Some(Backends::DX12),
            GraphicsBackendType::Metal => Some(Backends::METAL),
            GraphicsBackendType::OpenGl => Some(Backends::GL),
            GraphicsBackendType::Auto | GraphicsBackendType::Headless => None,
        }
    }

    /// Summary of an adapter in core terms.
    pub fn adapter_to_info(adapter: &Adapter) -> RendererAdapterInfo {
        let info = adapter.get_info();
        RendererAdapterInfo {
            name: info.name.clone(),
            backend_type: Self::backend_to_type(info.backend),
            device_type: Self::device_type_to_type(info.device_type),
        }
    }

    async fn try_backend(&self, backend_type: GraphicsBackendType) -> Result<Adapter> {
        let backends = Self::type_to_backends(backend_type)
            .ok_or_else(|| anyhow!("{backend_type:?} is not a wgpu backend"))?;

        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let power_preference = match self.power_preference {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("No adapter for {:?}: {}", backend_type, e))?;

        let actual = Self::backend_to_type(adapter.get_info().backend);
        if actual != backend_type {
            return Err(anyhow!(
                "Adapter returned wrong backend: requested {:?}, got {:?}",
                backend_type,
                actual
            ));
        }
        Ok(adapter)
    }

    /// Tries every backend in order and returns the first adapter found.
    ///
    /// # Errors
    ///
    /// Fails when no candidate yields an adapter; the message lists every
    /// attempt.
    pub async fn select(&self, candidates: &[GraphicsBackendType]) -> Result<Adapter> {
        let start_time = Instant::now();
        let mut failures = Vec::new();

        for &backend_type in candidates {
            log::info!("Attempting to initialize {backend_type:?} backend...");
            match self.try_backend(backend_type).await {
                Ok(adapter) => {
                    let info = Self::adapter_to_info(&adapter);
                    log::info!(
                        "Selected {:?} backend with adapter \"{}\" ({:?}) in {} ms",
                        backend_type,
                        info.name,
                        info.device_type,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(adapter);
                }
                Err(e) => {
                    log::warn!("Failed to initialize {backend_type:?} backend: {e}");
                    failures.push(format!("{backend_type:?}: {e}"));
                }
            }
        }

        Err(anyhow!(
            "All backend attempts failed [{}]",
            failures.join("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_mapping_is_consistent() {
        for ty in [
            GraphicsBackendType::Vulkan,
            GraphicsBackendType::Dx12,
            GraphicsBackendType::Metal,
            GraphicsBackendType::OpenGl,
        ] {
            assert!(WgpuBackendSelector::type_to_backends(ty).is_some());
        }
        assert!(WgpuBackendSelector::type_to_backends(GraphicsBackendType::Headless).is_none());
        assert_eq!(
            WgpuBackendSelector::backend_to_type(Backend::Gl),
            GraphicsBackendType::OpenGl
        );
        assert_eq!(
            WgpuBackendSelector::device_type_to_type(DeviceType::Cpu),
            RendererDeviceType::Cpu
        );
    }

    #[test]
    fn empty_candidate_list_fails() {
        let selector = WgpuBackendSelector::new(PowerPreference::LowPower);
        assert!(pollster::block_on(selector.select(&[])).is_err());
    }
}
