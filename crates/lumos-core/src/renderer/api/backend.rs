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

//! Backend identification and adapter information.

use serde::{Deserialize, Serialize};

/// The native graphics API a device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphicsBackendType {
    /// Let the backend pick the best available API.
    #[default]
    Auto,
    /// Vulkan.
    Vulkan,
    /// Metal.
    Metal,
    /// Direct3D 12.
    Dx12,
    /// OpenGL / GLES.
    OpenGl,
    /// CPU-only recording backend.
    Headless,
}

impl GraphicsBackendType {
    /// Preferred native APIs for the current platform, most preferred first.
    pub fn platform_preference() -> Vec<GraphicsBackendType> {
        #[cfg(target_os = "windows")]
        {
            vec![
                GraphicsBackendType::Vulkan,
                GraphicsBackendType::Dx12,
                GraphicsBackendType::OpenGl,
            ]
        }
        #[cfg(target_os = "macos")]
        {
            vec![GraphicsBackendType::Metal, GraphicsBackendType::Vulkan]
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            vec![GraphicsBackendType::Vulkan, GraphicsBackendType::OpenGl]
        }
    }

    /// Whether the API has no native descriptor sets, so bindings are
    /// flattened into numbered slots.
    pub const fn uses_flat_bindings(&self) -> bool {
        matches!(self, GraphicsBackendType::OpenGl | GraphicsBackendType::Headless)
    }
}

/// Physical kind of adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum RendererDeviceType {
    IntegratedGpu,
    DiscreteGpu,
    VirtualGpu,
    Cpu,
    #[default]
    Unknown,
}

/// Power preference used when choosing an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// Optional device capabilities the renderer can take advantage of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFeature {
    /// Push constants in pipeline layouts.
    PushConstants,
    /// `PolygonMode::Line`.
    PolygonModeLine,
    /// `PolygonMode::Point`.
    PolygonModePoint,
    /// Geometry shader stages.
    GeometryShader,
    /// Sampler border colours.
    AddressModeClampToBorder,
}

/// Backend-agnostic information about the adapter behind a device.
#[derive(Debug, Clone, Default)]
pub struct RendererAdapterInfo {
    /// Adapter name.
    pub name: String,
    /// API in use.
    pub backend_type: GraphicsBackendType,
    /// Adapter kind.
    pub device_type: RendererDeviceType,
}
