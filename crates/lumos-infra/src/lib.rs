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

//! Concrete implementations of the `lumos-core` device contracts.
//!
//! Two backends are provided:
//! - [`graphics::wgpu`], which runs on Vulkan, Metal, DX12 or OpenGL through wgpu
//!   and renders into offscreen swapchain images.
//! - [`graphics::headless`], a CPU device that keeps resources in memory,
//!   records every command and emulates the flat binding slots of OpenGL.
//!
//! [`create_device`] picks one from a [`RendererConfig`].

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::headless::{HeadlessCommand, HeadlessConfig, HeadlessDevice, RecordedSubmission};
pub use graphics::wgpu::{VramUsage, WgpuDevice};

use lumos_core::renderer::{GraphicsBackendType, GraphicsDevice, RenderError};
use lumos_core::RendererConfig;
use std::sync::Arc;

/// Creates the device requested by `config`.
///
/// `Headless` yields a [`HeadlessDevice`]. Every other backend goes through
/// wgpu; `Auto` tries the platform's preference list in order and keeps the
/// first backend that produces an adapter.
///
/// ## Errors
/// * `RenderError::InitializationFailed` - If no requested backend could be initialised.
pub fn create_device(config: &RendererConfig) -> Result<Arc<dyn GraphicsDevice>, RenderError> {
    if config.backend == GraphicsBackendType::Headless {
        let device = HeadlessDevice::new(HeadlessConfig::from_renderer_config(config));
        return Ok(Arc::new(device));
    }

    let candidates = match config.backend {
        GraphicsBackendType::Auto => GraphicsBackendType::platform_preference(),
        explicit => vec![explicit],
    };
    let device = WgpuDevice::new(config, &candidates)
        .map_err(|e| RenderError::InitializationFailed(format!("{e:#}")))?;
    Ok(Arc::new(device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_config_creates_a_headless_device() {
        let config = RendererConfig {
            backend: GraphicsBackendType::Headless,
            width: 64,
            height: 32,
            ..Default::default()
        };
        let device = create_device(&config).unwrap();
        assert_eq!(device.adapter_info().backend_type, GraphicsBackendType::Headless);
        assert_eq!(device.swapchain_extent().width, 64);
        assert!(device.as_any().downcast_ref::<HeadlessDevice>().is_some());
    }
}
