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

//! Batched 2D sprites.

use super::batch::{quad_indices, BatchProgram, BatchVertex, PreparedBatch, VertexChunks};
use super::shaders::BATCH2D_WGSL;
use super::{LaneResources, PassPhase, PassState, RenderLane, RenderWorld, SwapchainImage};
use ahash::{AHashMap, AHashSet};
use lumos_core::math::{Mat4, Vec2, Vec3};
use lumos_core::renderer::resources::{
    Descriptor, DescriptorSet, IndexBuffer, PipelineDesc, Texture2D,
};
use lumos_core::renderer::scene::Camera;
use lumos_core::renderer::{CommandEncoder, CullMode, RenderError, TextureViewId};
use lumos_core::RenderContext;
use std::any::Any;
use std::sync::Arc;

// Corners of the unit quad with the uv corner each one takes.
const CORNERS: [(Vec2, [usize; 2]); 4] = [
    (Vec2::new(-0.5, -0.5), [0, 0]),
    (Vec2::new(0.5, -0.5), [1, 0]),
    (Vec2::new(0.5, 0.5), [1, 1]),
    (Vec2::new(-0.5, 0.5), [0, 1]),
];

#[derive(Debug)]
struct QuadBatch {
    texture: Arc<Texture2D>,
    vertices: Vec<BatchVertex>,
}

/// Draws the world's [`Quad`](super::Quad)s over the swapchain.
///
/// Consecutive quads sharing a texture go into one indexed draw of at most
/// `batch.max_quads` quads; a texture change or a full batch starts the
/// next one, so submission order is kept. Without `camera_2d` the view is a
/// pixel-space projection with the origin at the bottom-left corner.
#[derive(Debug)]
pub struct Batch2dLane {
    state: PassState,
    program: Option<BatchProgram>,
    base: Option<PipelineDesc>,
    indices: Option<IndexBuffer>,
    chunks: Option<VertexChunks>,
    max_quads: u32,
    view_projection: Mat4,
    batches: Vec<QuadBatch>,
    prepared: Vec<(TextureViewId, PreparedBatch)>,
    sets: AHashMap<TextureViewId, (Arc<Texture2D>, DescriptorSet)>,
}

impl Default for Batch2dLane {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch2dLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self {
            state: PassState::new("Batch2dLane"),
            program: None,
            base: None,
            indices: None,
            chunks: None,
            max_quads: 0,
            view_projection: Mat4::IDENTITY,
            batches: Vec::new(),
            prepared: Vec::new(),
            sets: AHashMap::new(),
        }
    }

    /// Draw calls recorded this frame.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Texture sets currently cached.
    pub fn cached_textures(&self) -> usize {
        self.sets.len()
    }

    fn not_initialised(&self) -> RenderError {
        RenderError::RenderingFailed(format!("{}: used before initialise", self.state.name()))
    }
}

/// Orthographic projection mapping pixels to clip space, origin bottom-left.
pub fn pixel_projection(width: u32, height: u32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width.max(1) as f32, 0.0, height.max(1) as f32, -1.0, 1.0)
}

impl RenderLane for Batch2dLane {
    fn name(&self) -> &'static str {
        "Batch2dLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        _resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let program = BatchProgram::new(ctx, "batch2d", BATCH2D_WGSL)?;
        let mut base = program.desc(ctx, "Batch2dLane");
        base.vertex_layout = vec![BatchVertex::layout()];
        base.cull_mode = CullMode::None;
        base.depth_test = false;
        base.depth_write = false;
        base.transparency_enabled = true;
        ctx.pipeline(base.clone())?;

        let max_quads = ctx.config().batches.max_quads.max(1);
        let chunk_size = max_quads as u64 * 4 * std::mem::size_of::<BatchVertex>() as u64;
        self.indices = Some(IndexBuffer::from_u32(
            ctx.device(),
            "Batch2dLane indices",
            &quad_indices(max_quads),
        )?);
        self.chunks = Some(VertexChunks::new(
            "Batch2dLane vertices",
            chunk_size,
            ctx.frames_in_flight(),
        ));
        self.max_quads = max_quads;
        self.program = Some(program);
        self.base = Some(base);
        self.sets.clear();
        Ok(())
    }

    fn begin(&mut self, _ctx: &RenderContext) -> Result<(), RenderError> {
        self.state.begin();
        self.batches.clear();
        self.prepared.clear();
        Ok(())
    }

    fn begin_scene(
        &mut self,
        ctx: &RenderContext,
        world: &RenderWorld,
        _resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let extent = ctx.device().swapchain_extent();
        self.view_projection = world
            .camera_2d
            .unwrap_or_else(|| pixel_projection(extent.width, extent.height));
        let camera = Camera {
            view: Mat4::IDENTITY,
            projection: self.view_projection,
            position: Vec3::ZERO,
            near: -1.0,
            far: 1.0,
        };
        self.state.begin_scene(Some(camera))?;

        for quad in &world.quads {
            let texture = quad
                .texture
                .clone()
                .unwrap_or_else(|| ctx.white_texture().clone());
            let starts_batch = self.batches.last().is_none_or(|batch| {
                batch.texture.view() != texture.view()
                    || batch.vertices.len() / 4 >= self.max_quads as usize
            });
            if starts_batch {
                self.batches.push(QuadBatch {
                    texture,
                    vertices: Vec::with_capacity(4),
                });
            }
            let Some(batch) = self.batches.last_mut() else {
                continue;
            };
            for (corner, [u, v]) in CORNERS {
                let position = quad.transform.transform_point3(corner.extend(0.0));
                let uv = Vec2::new(quad.uv[u].x, quad.uv[v].y);
                batch
                    .vertices
                    .push(BatchVertex::new(position, quad.colour, uv));
            }
        }
        Ok(())
    }

    fn set_system_uniforms(
        &mut self,
        ctx: &RenderContext,
        _resources: &LaneResources,
    ) -> Result<(), RenderError> {
        self.state.set_uniforms()?;
        let (Some(program), Some(chunks)) = (self.program.as_mut(), self.chunks.as_mut()) else {
            return Err(self.not_initialised());
        };
        program.upload(self.view_projection)?;
        chunks.begin_slot(ctx.frame_slot());

        let mut used = AHashSet::new();
        for batch in &self.batches {
            let (buffer, offset) =
                chunks.push(ctx.device(), bytemuck::cast_slice(&batch.vertices))?;
            let view = batch.texture.view();
            if !self.sets.contains_key(&view) {
                let mut set = DescriptorSet::new(&program.shader, 1)?;
                set.update(vec![Descriptor::texture(0, "sprite", &batch.texture)])?;
                self.sets.insert(view, (batch.texture.clone(), set));
            }
            used.insert(view);
            self.prepared.push((
                view,
                PreparedBatch {
                    buffer,
                    offset,
                    count: (batch.vertices.len() / 4 * 6) as u32,
                },
            ));
        }
        self.sets.retain(|view, _| used.contains(view));
        Ok(())
    }

    fn present(
        &mut self,
        ctx: &RenderContext,
        resources: &LaneResources,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError> {
        self.state.present()?;
        if self.prepared.is_empty() {
            return Ok(());
        }
        let (Some(program), Some(base), Some(indices)) =
            (self.program.as_ref(), self.base.as_ref(), self.indices.as_ref())
        else {
            return Err(self.not_initialised());
        };
        let image = resources.require::<SwapchainImage>()?.0;
        let pipeline = ctx.pipeline(base.clone())?;
        let mut pass = pipeline.begin(encoder, image)?;
        program.system.bind(pass.as_mut(), 0, None)?;
        pass.set_index_buffer(indices.id(), 0, indices.format());
        for (view, batch) in &self.prepared {
            if let Some((_, set)) = self.sets.get(view) {
                set.bind(pass.as_mut(), 1, None)?;
            }
            pass.set_vertex_buffer(0, batch.buffer, batch.offset);
            pass.draw_indexed(0..batch.count, 0, 0..1);
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), RenderError> {
        self.state.end()
    }

    fn phase(&self) -> PassPhase {
        self.state.phase()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumos_core::math::Vec4;

    #[test]
    fn pixel_projection_maps_the_window_corners() {
        let projection = pixel_projection(800, 600);
        let bottom_left = projection * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let top_right = projection * Vec4::new(800.0, 600.0, 0.0, 1.0);
        assert!((bottom_left.x + 1.0).abs() < 1e-5 && (bottom_left.y + 1.0).abs() < 1e-5);
        assert!((top_right.x - 1.0).abs() < 1e-5 && (top_right.y - 1.0).abs() < 1e-5);
    }
}
