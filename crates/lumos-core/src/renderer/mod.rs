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

//! Backend-agnostic rendering contracts and the resources built on them.
//!
//! `api` and `traits` define the "common language" every backend speaks: ids,
//! descriptors and the [`GraphicsDevice`] factory. `resources`, `shader` and
//! `scene` build owning wrappers on top of a device; the concrete devices live
//! in `lumos-infra` and the render lanes in `lumos-lanes`.

pub mod api;
pub mod context;
pub mod error;
pub mod light;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::context::{DefaultResources, RenderContext};
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::light::{DirectionalLight, LightSet, LightType, PointLight, SpotLight};
pub use self::traits::{CommandEncoder, GraphicsDevice, RenderPass, SubmissionTracker};
