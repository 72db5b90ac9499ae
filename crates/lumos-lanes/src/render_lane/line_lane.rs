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

//! Debug line segments.

use super::batch::{BatchProgram, LineVertex, PreparedBatch, VertexChunks};
use super::draw::scene_depth;
use super::shaders::LINE_WGSL;
use super::{LaneResources, PassPhase, PassState, RenderLane, RenderWorld, SwapchainImage};
use lumos_core::renderer::resources::PipelineDesc;
use lumos_core::renderer::{CommandEncoder, CullMode, PrimitiveTopology, RenderError};
use lumos_core::RenderContext;
use std::any::Any;

/// Draws the world's [`Line`](super::Line)s as a line list, depth tested
/// against the scene without writing depth. Lines are split into draws of
/// at most `batch.max_lines` segments.
#[derive(Debug)]
pub struct LineLane {
    state: PassState,
    program: Option<BatchProgram>,
    base: Option<PipelineDesc>,
    chunks: Option<VertexChunks>,
    max_lines: usize,
    vertices: Vec<LineVertex>,
    prepared: Vec<PreparedBatch>,
}

impl Default for LineLane {
    fn default() -> Self {
        Self::new()
    }
}

impl LineLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self {
            state: PassState::new("LineLane"),
            program: None,
            base: None,
            chunks: None,
            max_lines: 0,
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

impl RenderLane for LineLane {
    fn name(&self) -> &'static str {
        "LineLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let program = BatchProgram::new(ctx, "line", LINE_WGSL)?;
        let mut base = program.desc(ctx, "LineLane");
        base.vertex_layout = vec![LineVertex::layout()];
        base.topology = PrimitiveTopology::LineList;
        base.cull_mode = CullMode::None;
        base.depth_target = Some(scene_depth(ctx, resources)?);
        base.depth_test = true;
        base.depth_write = false;
        ctx.pipeline(base.clone())?;

        let max_lines = ctx.config().batches.max_lines.max(1) as usize;
        self.chunks = Some(VertexChunks::new(
            "LineLane vertices",
            (max_lines * 2 * std::mem::size_of::<LineVertex>()) as u64,
            ctx.frames_in_flight(),
        ));
        self.max_lines = max_lines;
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
        self.vertices.extend(world.lines.iter().flat_map(|line| {
            [
                LineVertex::new(line.start, line.colour),
                LineVertex::new(line.end, line.colour),
            ]
        }));
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
        for batch in self.vertices.chunks(self.max_lines * 2) {
            let (buffer, offset) = chunks.push(ctx.device(), bytemuck::cast_slice(batch))?;
            self.prepared.push(PreparedBatch {
                buffer,
                offset,
                count: batch.len() as u32,
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
        let (Some(program), Some(base)) = (self.program.as_ref(), self.base.as_ref()) else {
            return Err(self.not_initialised());
        };
        let image = resources.require::<SwapchainImage>()?.0;
        let pipeline = ctx.pipeline(base.clone())?;
        let mut pass = pipeline.begin(encoder, image)?;
        program.system.bind(pass.as_mut(), 0, None)?;
        for batch in &self.prepared {
            pass.set_vertex_buffer(0, batch.buffer, batch.offset);
            pass.draw(0..batch.count, 0..1);
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
