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

//! Geometry pass of the deferred pipeline.

use super::draw::{material_variant, PreparedDraw};
use super::shaders::{self, GBUFFER_WGSL};
use super::uniforms::{DrawUniforms, ObjectUniform};
use super::{GBuffer, LaneResources, PassPhase, PassState, RenderLane, RenderWorld, SceneDepth};
use lumos_core::math::LinearRgba;
use lumos_core::renderer::resources::{
    Descriptor, DescriptorSet, PipelineDesc, Texture2D, TextureDepth, TextureParameters,
    UniformBuffer,
};
use lumos_core::renderer::scene::{CameraUniformData, MaterialProperties, Vertex};
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{CommandEncoder, RenderError, RhiFormat, TextureUsage};
use lumos_core::RenderContext;
use std::any::Any;
use std::sync::Arc;

/// Formats of the four colour targets, in location order.
pub const GBUFFER_FORMATS: [RhiFormat; 4] = [
    RhiFormat::R8G8B8A8Unorm,
    RhiFormat::R16G16B16A16Float,
    RhiFormat::R16G16B16A16Float,
    RhiFormat::R8G8B8A8Unorm,
];

/// Writes the opaque scene into the G-buffer.
///
/// Targets are sized to the swapchain and rebuilt on resize. The lane
/// publishes a [`GBuffer`] and its depth as the [`SceneDepth`], so forward
/// lanes drawn later depth-test against the deferred geometry.
/// Transparent materials are skipped; pair this lane with a
/// [`ForwardLane`](super::ForwardLane) filtered to transparent commands.
#[derive(Debug)]
pub struct DeferredOffscreenLane {
    state: PassState,
    shader: Option<Arc<Shader>>,
    base: Option<PipelineDesc>,
    camera: Option<UniformBuffer>,
    system: Option<DescriptorSet>,
    draws: Option<DrawUniforms>,
    gbuffer: Option<GBuffer>,
    prepared: Vec<PreparedDraw>,
}

impl Default for DeferredOffscreenLane {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredOffscreenLane {
    /// Creates the lane; targets are built at initialisation.
    pub fn new() -> Self {
        Self {
            state: PassState::new("DeferredOffscreenLane"),
            shader: None,
            base: None,
            camera: None,
            system: None,
            draws: None,
            gbuffer: None,
            prepared: Vec::new(),
        }
    }

    /// The current targets.
    pub fn gbuffer(&self) -> Option<&GBuffer> {
        self.gbuffer.as_ref()
    }

    /// Commands queued this frame.
    pub fn queued(&self) -> usize {
        self.state.queue().len()
    }
}

fn gbuffer_target(
    ctx: &RenderContext,
    name: &str,
    width: u32,
    height: u32,
    format: RhiFormat,
) -> Result<Arc<Texture2D>, RenderError> {
    Ok(Arc::new(Texture2D::create(
        ctx.device(),
        name,
        width,
        height,
        TextureParameters::render_target(format),
        TextureUsage::RENDER_ATTACHMENT,
    )?))
}

impl RenderLane for DeferredOffscreenLane {
    fn name(&self) -> &'static str {
        "DeferredOffscreenLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let device = ctx.device();
        let shader = Shader::from_source(
            device,
            "gbuffer",
            GBUFFER_WGSL,
            &shaders::includes(),
            &ShaderOptions::default().dynamic_uniform(2, 0),
        )?;
        shader.validate_uniform_layout("material", &MaterialProperties::layout())?;

        let extent = device.swapchain_extent();
        let (width, height) = (extent.width.max(1), extent.height.max(1));
        let [albedo, position, normal, pbr] = GBUFFER_FORMATS;
        let gbuffer = GBuffer {
            albedo: gbuffer_target(ctx, "gbuffer albedo", width, height, albedo)?,
            position: gbuffer_target(ctx, "gbuffer position", width, height, position)?,
            normal: gbuffer_target(ctx, "gbuffer normal", width, height, normal)?,
            pbr: gbuffer_target(ctx, "gbuffer pbr", width, height, pbr)?,
            depth: Arc::new(TextureDepth::create(
                device,
                "gbuffer depth",
                width,
                height,
                RhiFormat::D32Float,
                false,
            )?),
        };

        let camera = UniformBuffer::new(
            device,
            "DeferredOffscreenLane camera",
            std::mem::size_of::<CameraUniformData>() as u64,
        )?;
        let mut system = DescriptorSet::new(&shader, 0)?;
        system.update(vec![Descriptor::uniform(0, "camera", &camera)])?;

        let mut base = PipelineDesc::new(shader.clone(), "DeferredOffscreenLane");
        base.colour_targets = vec![
            gbuffer.albedo.clone(),
            gbuffer.position.clone(),
            gbuffer.normal.clone(),
            gbuffer.pbr.clone(),
        ];
        base.depth_target = Some(gbuffer.depth.clone());
        base.vertex_layout = vec![Vertex::layout()];
        // w = 0 in the position target marks empty texels.
        base.clear_colour = LinearRgba::new(0.0, 0.0, 0.0, 0.0);
        ctx.pipeline(base.clone())?;

        self.draws = Some(DrawUniforms::new(
            ctx,
            &shader,
            2,
            std::mem::size_of::<ObjectUniform>() as u32,
            "DeferredOffscreenLane objects",
        )?);
        resources.insert(gbuffer.clone());
        resources.insert(SceneDepth(gbuffer.depth.clone()));
        log::info!("DeferredOffscreenLane: G-buffer {}x{}", width, height);
        self.shader = Some(shader);
        self.base = Some(base);
        self.camera = Some(camera);
        self.system = Some(system);
        self.gbuffer = Some(gbuffer);
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
        let frustum = self.state.camera().copied().unwrap_or_default().frustum();
        for renderable in &world.renderables {
            if renderable.material.is_transparent() {
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
        let (Some(shader), Some(base), Some(camera_buffer), Some(draws)) = (
            self.shader.as_ref(),
            self.base.as_ref(),
            self.camera.as_ref(),
            self.draws.as_mut(),
        ) else {
            return Err(RenderError::RenderingFailed(
                "DeferredOffscreenLane: used before initialise".to_string(),
            ));
        };

        camera_buffer.set_data(bytemuck::bytes_of(&CameraUniformData::from_camera(&camera)))?;
        for (index, command) in self.state.queue().iter().enumerate() {
            command
                .material
                .create_descriptor_set(shader, ctx.white_texture(), true)?;
            let mut desc = material_variant(base, &command.material);
            // Four targets, no blending.
            desc.transparency_enabled = false;
            let pipeline = ctx.pipeline(desc)?;
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
        _resources: &LaneResources,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError> {
        self.state.present()?;
        let (Some(base), Some(system)) = (self.base.as_ref(), self.system.as_ref()) else {
            return Err(RenderError::RenderingFailed(
                "DeferredOffscreenLane: used before initialise".to_string(),
            ));
        };
        // The targets are cleared every frame, even an empty one.
        let pass_pipeline = ctx.pipeline(base.clone())?;
        let mut pass = pass_pipeline.begin(encoder, 0)?;
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
