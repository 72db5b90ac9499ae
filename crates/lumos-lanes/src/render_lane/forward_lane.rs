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

//! Forward PBR lane.

use super::draw::{material_variant, scene_depth, PreparedDraw};
use super::shaders::{self, FORWARD_WGSL};
use super::uniforms::{
    forward_lights_layout, write_lights, DrawUniforms, ObjectUniform, MAX_FORWARD_LIGHTS,
};
use super::{LaneResources, PassPhase, PassState, RenderLane, RenderWorld, SwapchainImage};
use lumos_core::math::LinearRgba;
use lumos_core::renderer::resources::{
    Descriptor, DescriptorSet, PipelineDesc, UniformBuffer,
};
use lumos_core::renderer::scene::{CameraUniformData, MaterialProperties, Vertex};
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{CommandEncoder, RenderError, UniformBlock};
use lumos_core::RenderContext;
use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

/// Which renderables the forward lane draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardFilter {
    /// Every renderable: the lane is the whole scene pass.
    #[default]
    All,
    /// Only opaque materials, leaving transparency to a later lane.
    OpaqueOnly,
    /// Only transparent materials, on top of a deferred frame.
    TransparentOnly,
}

impl ForwardFilter {
    fn accepts(self, transparent: bool) -> bool {
        match self {
            ForwardFilter::All => true,
            ForwardFilter::OpaqueOnly => !transparent,
            ForwardFilter::TransparentOnly => transparent,
        }
    }
}

/// Draws renderables straight into the swapchain, lit by up to 16 lights.
///
/// Opaque commands are drawn first in submission order, transparent ones
/// after them from back to front. Set 0 holds the camera and lights, set 1
/// the material, set 2 the per-draw object matrices.
#[derive(Debug)]
pub struct ForwardLane {
    state: PassState,
    clear: bool,
    filter: ForwardFilter,
    ambient: LinearRgba,
    shader: Option<Arc<Shader>>,
    base: Option<PipelineDesc>,
    camera: Option<UniformBuffer>,
    lights: Option<UniformBuffer>,
    lights_block: UniformBlock,
    system: Option<DescriptorSet>,
    draws: Option<DrawUniforms>,
    prepared: Vec<PreparedDraw>,
}

impl Default for ForwardLane {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardLane {
    /// A lane that clears the swapchain and draws everything.
    pub fn new() -> Self {
        Self {
            state: PassState::new("ForwardLane"),
            clear: true,
            filter: ForwardFilter::All,
            ambient: LinearRgba::new(0.03, 0.03, 0.03, 1.0),
            shader: None,
            base: None,
            camera: None,
            lights: None,
            lights_block: UniformBlock::new(Arc::new(forward_lights_layout())),
            system: None,
            draws: None,
            prepared: Vec::new(),
        }
    }

    /// Whether the lane clears colour and depth when its pass begins.
    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// Restricts what the lane draws.
    pub fn with_filter(mut self, filter: ForwardFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Flat ambient term added to every lit surface.
    pub fn with_ambient(mut self, ambient: LinearRgba) -> Self {
        self.ambient = ambient;
        self
    }

    /// Commands queued this frame, in draw order once uniforms are set.
    pub fn queued(&self) -> usize {
        self.state.queue().len()
    }

    fn not_initialised(&self) -> RenderError {
        RenderError::RenderingFailed(format!("{}: used before initialise", self.state.name()))
    }
}

impl RenderLane for ForwardLane {
    fn name(&self) -> &'static str {
        "ForwardLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let device = ctx.device();
        let shader = Shader::from_source(
            device,
            "forward",
            FORWARD_WGSL,
            &shaders::includes(),
            &ShaderOptions::default().dynamic_uniform(2, 0),
        )?;
        shader.validate_uniform_layout("material", &MaterialProperties::layout())?;
        shader.validate_uniform_layout("forward_lights", self.lights_block.layout())?;

        let camera = UniformBuffer::new(
            device,
            "ForwardLane camera",
            std::mem::size_of::<CameraUniformData>() as u64,
        )?;
        let lights = UniformBuffer::new(
            device,
            "ForwardLane lights",
            self.lights_block.layout().size() as u64,
        )?;
        let mut system = DescriptorSet::new(&shader, 0)?;
        system.update(vec![
            Descriptor::uniform(0, "camera", &camera),
            Descriptor::uniform(1, "forward_lights", &lights),
        ])?;

        let depth = scene_depth(ctx, resources)?;
        let mut base = PipelineDesc::new(shader.clone(), "ForwardLane");
        base.swapchain_target = true;
        base.depth_target = Some(depth);
        base.vertex_layout = vec![Vertex::layout()];
        base.clear_targets = self.clear;
        base.clear_colour = ctx.config().clear_colour();
        // Build the pass pipeline now so a bad target fails here.
        ctx.pipeline(base.clone())?;

        self.draws = Some(DrawUniforms::new(
            ctx,
            &shader,
            2,
            std::mem::size_of::<ObjectUniform>() as u32,
            "ForwardLane objects",
        )?);
        self.shader = Some(shader);
        self.base = Some(base);
        self.camera = Some(camera);
        self.lights = Some(lights);
        self.system = Some(system);
        log::debug!(
            "ForwardLane: initialised (clear: {}, filter: {:?})",
            self.clear,
            self.filter
        );
        Ok(())
    }

    fn begin(&mut self, ctx: &RenderContext) -> Result<(), RenderError> {
        self.state.begin();
        self.prepared.clear();
        if let Some(draws) = self.draws.as_mut() {
            draws.begin_frame(ctx.frame_slot());
        }
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
        let frustum = camera.frustum();
        for renderable in &world.renderables {
            if !self.filter.accepts(renderable.material.is_transparent()) {
                continue;
            }
            let sphere = renderable
                .mesh
                .bounding_sphere()
                .transform(&renderable.transform);
            if frustum.intersects_sphere(&sphere) {
                self.state.submit(renderable.command())?;
            }
        }

        // Opaque first, then transparent back to front.
        let depth = |c: &super::RenderCommand| camera.view_depth(c.transform.w_axis.truncate());
        self.state.queue_mut().sort_by(|a, b| {
            match (a.material.is_transparent(), b.material.is_transparent()) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (true, true) => depth(b).total_cmp(&depth(a)),
                (false, false) => Ordering::Equal,
            }
        });

        self.lights_block.clear();
        let count = write_lights(
            &mut self.lights_block,
            &world.lights,
            MAX_FORWARD_LIGHTS,
            false,
            "ForwardLane",
        )?;
        self.lights_block.set("light_count", &count)?;
        self.lights_block.set("ambient", &self.ambient)?;
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
        let (Some(shader), Some(base), Some(camera_buffer), Some(lights), Some(draws)) = (
            self.shader.as_ref(),
            self.base.as_ref(),
            self.camera.as_ref(),
            self.lights.as_ref(),
            self.draws.as_mut(),
        ) else {
            return Err(RenderError::RenderingFailed(
                "ForwardLane: used before initialise".to_string(),
            ));
        };

        camera_buffer.set_data(bytemuck::bytes_of(&CameraUniformData::from_camera(&camera)))?;
        lights.set_data(self.lights_block.as_bytes())?;

        for (index, command) in self.state.queue().iter().enumerate() {
            command
                .material
                .create_descriptor_set(shader, ctx.white_texture(), true)?;
            let pipeline = ctx.pipeline(material_variant(base, &command.material))?;
            let object = draws.push(&ObjectUniform::new(command.transform, command.texture_matrix))?;
            self.prepared.push(PreparedDraw {
                index,
                pipeline,
                object,
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
        if self.prepared.is_empty() && !self.clear {
            return Ok(());
        }
        let (Some(base), Some(system)) = (self.base.as_ref(), self.system.as_ref()) else {
            return Err(self.not_initialised());
        };
        let image = resources.require::<SwapchainImage>()?.0;
        let pass_pipeline = ctx.pipeline(base.clone())?;

        let mut pass = pass_pipeline.begin(encoder, image)?;
        let mut bound = pass_pipeline.id();
        if !self.prepared.is_empty() {
            system.bind(pass.as_mut(), 0, None)?;
        }
        for draw in &self.prepared {
            if draw.pipeline.id() != bound {
                pass.set_pipeline(draw.pipeline.id());
                bound = draw.pipeline.id();
            }
            let command = &self.state.queue()[draw.index];
            command.material.bind(pass.as_mut(), 1)?;
            pass.set_bind_group(2, draw.object.bind_group, &[draw.object.offset]);
            command.mesh.draw(pass.as_mut());
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

    #[test]
    fn filters_split_opaque_and_transparent() {
        assert!(ForwardFilter::All.accepts(true) && ForwardFilter::All.accepts(false));
        assert!(ForwardFilter::OpaqueOnly.accepts(false));
        assert!(!ForwardFilter::OpaqueOnly.accepts(true));
        assert!(ForwardFilter::TransparentOnly.accepts(true));
        assert!(!ForwardFilter::TransparentOnly.accepts(false));
    }
}
