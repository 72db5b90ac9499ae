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

//! Debug points drawn as camera-facing discs.

use super::batch::{quad_indices, BatchProgram, BatchVertex, PreparedBatch, VertexChunks};
use super::draw::scene_depth;
use super::shaders::POINT_WGSL;
use super::{LaneResources, PassPhase, PassState, Point, RenderLane, RenderWorld, SwapchainImage};
use lumos_core::math::Vec2;
use lumos_core::renderer::resources::{IndexBuffer, PipelineDesc};
use lumos_core::renderer::scene::Camera;
use lumos_core::renderer::{CommandEncoder, CullMode, RenderError};
use lumos_core::RenderContext;
use std::any::Any;

/// Four billboard corners for `point`, facing `camera`. `size` is the
/// world-space diameter.
pub fn billboard(point: &Point, camera: &Camera) -> [BatchVertex; 4] {
    let right = camera.view.row(0).truncate().normalize_or_zero();
    let up = camera.view.row(1).truncate().normalize_or_zero();
    let half = point.size * 0.5;
    let corner = |x: f32, y: f32| {
        BatchVertex::new(
            point.position + (right * x + up * y) * half,
            point.colour,
            Vec2::new((x + 1.0) * 0.5, (y + 1.0) * 0.5),
        )
    };
    [
        corner(-1.0, -1.0),
        corner(1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, 1.0),
    ]
}

/// Draws the world's [`Point`]s as blended discs, expanded into
/// billboards on the CPU. Depth is tested, not written.
#[derive(Debug)]
pub struct PointLane {
    state: PassState,
    program: Option<BatchProgram>,
    base: Option<PipelineDesc>,
    indices: Option<IndexBuffer>,
    chunks: Option<VertexChunks>,
    max_points: usize,
    vertices: Vec<BatchVertex>,
    prepared: Vec<PreparedBatch>,
}

impl Default for PointLane {
    fn default() -> Self {
        Self::new()
    }
}

impl PointLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self {
            state: PassState::new("PointLane"),
            program: None,
            base: None,
            indices: None,
            chunks: None,
            max_points: 0,
            vertices: Vec::new(),
            prepared: Vec::new(),
        }
    }

    /// Draw calls recorded this frame.
    pub fn batch_count(&self) -> usize {
        self.prepared.len()
    }

    fn not_initialised(&self) -> RenderError {
        RenderError::RenderingFailed(format!("{}: used before initialise", self.state.name()))
    }
}

impl RenderLane for PointLane {
    fn name(&self) -> &'static str {
        "PointLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let program = BatchProgram::new(ctx, "point", POINT_WGSL)?;
        let mut base = program.desc(ctx, "PointLane");
        base.vertex_layout = vec![BatchVertex::layout()];
        base.cull_mode = CullMode::None;
        base.depth_target = Some(scene_depth(ctx, resources)?);
        base.depth_test = true;
        base.depth_write = false;
        base.transparency_enabled = true;
        ctx.pipeline(base.clone())?;

        let max_points = ctx.config().batches.max_points.max(1);
        self.indices = Some(IndexBuffer::from_u32(
            ctx.device(),
            "PointLane indices",
            &quad_indices(max_points),
        )?);
        self.chunks = Some(VertexChunks::new(
            "PointLane vertices",
            max_points as u64 * 4 * std::mem::size_of::<BatchVertex>() as u64,
            ctx.frames_in_flight(),
        ));
        self.max_points = max_points as usize;
        self.program = Some(program);
        self.base = Some(base);
        Ok(())
    }

    fn begin(&mut self, _ctx: &RenderContext) -> Result<(), RenderError> {
        self.state.begin();
        self.vertices.clear();
        self.prepared.clear();
        Ok(())
    }

    fn begin_scene(
        &mut self,
        _ctx: &RenderContext,
        world: &RenderWorld,
        _resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        if !self.state.begin_scene(world.camera)? {
            return Ok(());
        }
        let camera = self.state.camera().copied().unwrap_or_default();
        self.vertices
            .extend(world.points.iter().flat_map(|p| billboard(p, &camera)));
        Ok(())
    }

    fn set_system_uniforms(
        &mut self,
        ctx: &RenderContext,
        _resources: &LaneResources,
    ) -> Result<(), RenderError> {
        self.state.set_uniforms()?;
        let Some(camera) = self.state.camera().copied() else {
            return Ok(());
        };
        let (Some(program), Some(chunks)) = (self.program.as_mut(), self.chunks.as_mut()) else {
            return Err(self.not_initialised());
        };
        program.upload(camera.view_projection())?;
        chunks.begin_slot(ctx.frame_slot());
        for batch in self.vertices.chunks(self.max_points * 4) {
            let (buffer, offset) = chunks.push(ctx.device(), bytemuck::cast_slice(batch))?;
            self.prepared.push(PreparedBatch {
                buffer,
                offset,
                count: (batch.len() / 4 * 6) as u32,
            });
        }
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
        for batch in &self.prepared {
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
    use lumos_core::math::{LinearRgba, Vec3};

    #[test]
    fn billboards_face_the_camera() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.0, 0.1, 50.0);
        let point = Point {
            position: Vec3::ZERO,
            size: 2.0,
            colour: LinearRgba::WHITE,
        };
        let corners = billboard(&point, &camera);
        for vertex in &corners {
            assert!(vertex.position[2].abs() < 1e-5);
        }
        assert_eq!(corners[0].position, [-1.0, -1.0, 0.0]);
        assert_eq!(corners[2].uv, [1.0, 1.0]);
    }
}
