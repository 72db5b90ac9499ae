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

use anyhow::{anyhow, Result};
use wgpu::{Adapter, Features};

/// Optional features the renderer uses when the adapter offers them.
const OPTIONAL_FEATURES: Features = Features::POLYGON_MODE_LINE
    .union(Features::POLYGON_MODE_POINT)
    .union(Features::ADDRESS_MODE_CLAMP_TO_BORDER)
    .union(Features::FLOAT32_FILTERABLE);

/// Holds the core wgpu objects of one logical device.
///
/// Initialized from a pre-selected adapter; no surface is attached.
#[derive(Debug)]
pub struct WgpuGraphicsContext {
    #[allow(dead_code)]
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    // Store info for easy access
    pub adapter_name: String,
    pub adapter_backend: wgpu::Backend,
    pub adapter_device_type: wgpu::DeviceType,
    pub active_device_features: wgpu::Features,
    pub device_limits: wgpu::Limits,
}

impl WgpuGraphicsContext {
    /// Creates the logical device and queue.
    ///
    /// ## Arguments
    /// * `adapter` - The adapter chosen by the backend selector.
    pub async fn new(adapter: Adapter) -> Result<Self> {
        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let features_to_enable = adapter.features() & OPTIONAL_FEATURES;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Lumos Logical Device"),
                required_features: features_to_enable,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::info!("Logical device and command queue created.");

        device.on_uncaptured_error(std::sync::Arc::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));

        let active_device_features = device.features();
        let device_limits = device.limits();
        log::debug!("Active device features: {active_device_features:?}");

        Ok(Self {
            adapter_name: adapter_info.name.clone(),
            adapter_backend: adapter_info.backend,
            adapter_device_type: adapter_info.device_type,
            adapter,
            device,
            queue,
            active_device_features,
            device_limits,
        })
    }
}
