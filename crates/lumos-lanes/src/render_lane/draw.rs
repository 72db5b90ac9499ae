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

//! Pieces shared by the lanes that draw scene meshes.

use super::{LaneResources, SceneDepth};
use lumos_core::renderer::resources::{Pipeline, PipelineDesc, TextureDepth};
use lumos_core::renderer::scene::{Material, MaterialFlags};
use lumos_core::renderer::{DynamicAllocation, RenderError, RhiFormat};
use lumos_core::RenderContext;
use std::sync::Arc;

/// A queued command resolved for recording.
#[derive(Debug, Clone)]
pub(crate) struct PreparedDraw {
    /// Index into the lane's queue.
    pub index: usize,
    pub pipeline: Arc<Pipeline>,
    pub object: DynamicAllocation,
}

/// `base` with the render state `material` asks for.
pub(crate) fn material_variant(base: &PipelineDesc, material: &Material) -> PipelineDesc {
    let mut desc = base.clone();
    desc.cull_mode = material.cull_mode();
    desc.polygon_mode = material.polygon_mode();
    desc.blend_mode = material.blend_mode();
    desc.transparency_enabled = material.is_transparent();
    desc.depth_test = material.flags().contains(MaterialFlags::DEPTH_TEST);
    desc.depth_write = desc.depth_test && !material.is_transparent();
    desc
}

/// The shared swapchain depth buffer, created at the swapchain size when no
/// earlier lane produced one.
pub(crate) fn scene_depth(
    ctx: &RenderContext,
    resources: &mut LaneResources,
) -> Result<Arc<TextureDepth>, RenderError> {
    if let Some(SceneDepth(depth)) = resources.get::<SceneDepth>() {
        return Ok(depth.clone());
    }
    let extent = ctx.device().swapchain_extent();
    let depth = Arc::new(TextureDepth::create(
        ctx.device(),
        "scene depth",
        extent.width.max(1),
        extent.height.max(1),
        RhiFormat::D32Float,
        false,
    )?);
    resources.insert(SceneDepth(depth.clone()));
    Ok(depth)
}
