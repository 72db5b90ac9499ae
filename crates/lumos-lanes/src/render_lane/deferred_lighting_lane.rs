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

//! Full-screen lighting pass of the deferred pipeline.

use super::shaders::{self, DEFERRED_LIGHTING_WGSL};
use super::uniforms::{lighting_uniforms_layout, write_lights};
use super::{
    GBuffer, LaneResources, PassPhase, PassState, RenderLane, RenderWorld, ShadowMaps,
    SwapchainImage,
};
use lumos_core::math::Vec4;
use lumos_core::renderer::resources::{
    Descriptor, DescriptorSet, PipelineDesc, TextureCube, TextureDepthArray, TextureParameters,
    UniformBuffer, CUBE_FACES,
};
use lumos_core::renderer::scene::{Mesh, MeshData, Vertex};
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{CommandEncoder, CullMode, RenderError, RhiFormat, UniformBlock};
use lumos_core::RenderContext;
use std::any::Any;
use std::sync::Arc;

/// Flat ambient used when the world has no environment map.
const FALLBACK_AMBIENT: f32 = 0.03;

// Textures bound in set 1; the set is rebuilt when one of them changes.
#[derive(Debug, Clone)]
struct EnvironmentBinding {
    shadows: Arc<TextureDepthArray>,
    environment: Arc<TextureCube>,
    irradiance: Arc<TextureCube>,
}

impl EnvironmentBinding {
    fn same_as(&self, other: &EnvironmentBinding) -> bool {
        Arc::ptr_eq(&self.shadows, &other.shadows)
            && Arc::ptr_eq(&self.environment, &other.environment)
            && Arc::ptr_eq(&self.irradiance, &other.irradiance)
    }
}

/// Shades the G-buffer into the swapchain.
///
/// Reads the [`GBuffer`] of a [`DeferredOffscreenLane`](super::DeferredOffscreenLane)
/// and, when present, the [`ShadowMaps`] of a [`ShadowLane`](super::ShadowLane).
/// Up to `deferred.max_lights` lights are shaded with the Cook-Torrance
/// BRDF; the first directional light receives the cascaded shadows.
/// Ambient light comes from the world's environment (irradiance, a
/// prefiltered reflection and the BRDF LUT) or a flat term without one.
/// Background texels are discarded, leaving the clear colour for the sky.
#[derive(Debug)]
pub struct DeferredLightingLane {
    state: PassState,
    debug_mode: Option<u32>,
    shader: Option<Arc<Shader>>,
    base: Option<PipelineDesc>,
    uniforms: Option<UniformBuffer>,
    block: UniformBlock,
    gbuffer_set: Option<DescriptorSet>,
    environment_set: Option<DescriptorSet>,
    bound: Option<EnvironmentBinding>,
    frame_binding: Option<EnvironmentBinding>,
    fullscreen: Option<Mesh>,
    black_cube: Option<Arc<TextureCube>>,
    placeholder_shadows: Option<Arc<TextureDepthArray>>,
}

impl Default for DeferredLightingLane {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredLightingLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self {
            state: PassState::new("DeferredLightingLane"),
            debug_mode: None,
            shader: None,
            base: None,
            uniforms: None,
            block: UniformBlock::new(Arc::new(lighting_uniforms_layout())),
            gbuffer_set: None,
            environment_set: None,
            bound: None,
            frame_binding: None,
            fullscreen: None,
            black_cube: None,
            placeholder_shadows: None,
        }
    }

    /// Overrides `deferred.debug_mode`: 0 lit, 1 albedo, 2 normals,
    /// 3 cascades, 4 shadow factor, 5 metallic/roughness/occlusion.
    pub fn set_debug_mode(&mut self, mode: u32) {
        self.debug_mode = Some(mode);
    }

    /// Bytes of the lighting block uploaded this frame.
    pub fn uniform_bytes(&self) -> &[u8] {
        self.block.as_bytes()
    }

    fn not_initialised(&self) -> RenderError {
        RenderError::RenderingFailed(format!("{}: used before initialise", self.state.name()))
    }
}

impl RenderLane for DeferredLightingLane {
    fn name(&self) -> &'static str {
        "DeferredLightingLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let device = ctx.device();
        let mut options = ShaderOptions::default();
        if ctx.config().shadows.pcf {
            options = options.define("SHADOW_PCF", "");
        }
        let shader = Shader::from_source(
            device,
            "deferred_lighting",
            DEFERRED_LIGHTING_WGSL,
            &shaders::includes(),
            &options,
        )?;
        shader.validate_uniform_layout("lighting", self.block.layout())?;

        let uniforms = UniformBuffer::new(
            device,
            "DeferredLightingLane uniforms",
            self.block.layout().size() as u64,
        )?;
        let gbuffer = resources.require::<GBuffer>()?;
        let mut gbuffer_set = DescriptorSet::new(&shader, 0)?;
        gbuffer_set.update(vec![
            Descriptor::uniform(0, "lighting", &uniforms),
            Descriptor::texture(1, "gbuffer_albedo", &gbuffer.albedo),
            Descriptor::texture(3, "gbuffer_position", &gbuffer.position),
            Descriptor::texture(5, "gbuffer_normal", &gbuffer.normal),
            Descriptor::texture(7, "gbuffer_pbr", &gbuffer.pbr),
        ])?;

        let black = [0u8, 0, 0, 255];
        let black_cube = Arc::new(TextureCube::from_faces(
            device,
            "black cube",
            1,
            [&black[..]; CUBE_FACES],
            TextureParameters::default(),
        )?);
        let placeholder_shadows = Arc::new(TextureDepthArray::create(
            device,
            "shadow placeholder",
            1,
            1,
            1,
            RhiFormat::D32Float,
        )?);

        let mut base = PipelineDesc::new(shader.clone(), "DeferredLightingLane");
        base.swapchain_target = true;
        base.vertex_layout = vec![Vertex::layout()];
        base.cull_mode = CullMode::None;
        base.depth_test = false;
        base.depth_write = false;
        base.clear_colour = ctx.config().clear_colour();
        ctx.pipeline(base.clone())?;

        self.fullscreen = Some(Mesh::new(
            device,
            "fullscreen triangle",
            &MeshData::fullscreen_triangle(),
        )?);
        self.shader = Some(shader);
        self.base = Some(base);
        self.uniforms = Some(uniforms);
        self.gbuffer_set = Some(gbuffer_set);
        self.environment_set = None;
        self.bound = None;
        self.black_cube = Some(black_cube);
        self.placeholder_shadows = Some(placeholder_shadows);
        log::debug!(
            "DeferredLightingLane: initialised (pcf: {})",
            ctx.config().shadows.pcf
        );
        Ok(())
    }

    fn begin(&mut self, _ctx: &RenderContext) -> Result<(), RenderError> {
        self.state.begin();
        self.frame_binding = None;
        Ok(())
    }

    fn begin_scene(
        &mut self,
        ctx: &RenderContext,
        world: &RenderWorld,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        if !self.state.begin_scene(world.camera)? {
            return Ok(());
        }
        let camera = self.state.camera().copied().unwrap_or_default();
        let (Some(black), Some(placeholder)) =
            (self.black_cube.clone(), self.placeholder_shadows.clone())
        else {
            return Err(self.not_initialised());
        };

        let block = &mut self.block;
        block.clear();
        let shadows = resources
            .get::<ShadowMaps>()
            .filter(|maps| maps.data.should_render);
        let max_lights = ctx.config().deferred.max_lights as usize;
        let count = write_lights(
            block,
            &world.lights,
            max_lights,
            shadows.is_some(),
            "DeferredLightingLane",
        )?;
        block.set("light_count", &count)?;

        if let Some(maps) = shadows {
            let data = &maps.data;
            for (i, cascade) in data.active().iter().enumerate() {
                block.set(&format!("shadow_transforms[{i}]"), &cascade.proj_view)?;
                block.set(
                    &format!("split_depths[{i}]"),
                    &Vec4::new(cascade.split_depth, 0.0, 0.0, 0.0),
                )?;
            }
            block.set("cascade_count", &(data.cascade_count as u32))?;
            block.set("light_view", &data.light_view)?;
            block.set("shadow_bias", &data.bias)?;
        }
        block.set("camera_position", &camera.position.extend(1.0))?;
        block.set("view", &camera.view)?;
        let debug_mode = self.debug_mode.unwrap_or(ctx.config().deferred.debug_mode);
        block.set("debug_mode", &debug_mode)?;

        let binding = match &world.environment {
            Some(env) => {
                let max_mip = env.skybox.mip_levels().saturating_sub(1) as f32;
                block.set("environment", &Vec4::new(env.intensity, max_mip, 0.0, 0.0))?;
                EnvironmentBinding {
                    shadows: shadows.map_or(placeholder.clone(), |m| m.array.clone()),
                    environment: env.skybox.clone(),
                    irradiance: env.irradiance.clone().unwrap_or_else(|| env.skybox.clone()),
                }
            }
            None => {
                block.set("environment", &Vec4::new(0.0, 0.0, FALLBACK_AMBIENT, 0.0))?;
                EnvironmentBinding {
                    shadows: shadows.map_or(placeholder.clone(), |m| m.array.clone()),
                    environment: black.clone(),
                    irradiance: black,
                }
            }
        };
        self.frame_binding = Some(binding);
        Ok(())
    }

    fn set_system_uniforms(
        &mut self,
        ctx: &RenderContext,
        _resources: &LaneResources,
    ) -> Result<(), RenderError> {
        self.state.set_uniforms()?;
        let Some(binding) = self.frame_binding.clone() else {
            return Ok(());
        };
        let (Some(shader), Some(uniforms)) = (self.shader.as_ref(), self.uniforms.as_ref()) else {
            return Err(self.not_initialised());
        };
        uniforms.set_data(self.block.as_bytes())?;

        let stale = self
            .bound
            .as_ref()
            .is_none_or(|bound| !bound.same_as(&binding));
        if stale || self.environment_set.is_none() {
            let mut set = DescriptorSet::new(shader, 1)?;
            set.update(vec![
                Descriptor::image(
                    0,
                    "shadow_map",
                    binding.shadows.array_view(),
                    binding.shadows.sampler(),
                ),
                Descriptor::image(
                    2,
                    "environment_map",
                    binding.environment.view(),
                    binding.environment.sampler(),
                ),
                Descriptor::image(
                    4,
                    "irradiance_map",
                    binding.irradiance.view(),
                    binding.irradiance.sampler(),
                ),
                Descriptor::texture(6, "brdf_lut", &ctx.defaults().brdf_lut),
            ])?;
            log::debug!("DeferredLightingLane: environment set rebuilt");
            self.environment_set = Some(set);
            self.bound = Some(binding);
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
        let Some(base) = self.base.as_ref() else {
            return Err(self.not_initialised());
        };
        let image = resources.require::<SwapchainImage>()?.0;
        let pipeline = ctx.pipeline(base.clone())?;
        let mut pass = pipeline.begin(encoder, image)?;
        if !self.state.is_active() {
            return Ok(());
        }
        let (Some(gbuffer_set), Some(environment_set), Some(fullscreen)) = (
            self.gbuffer_set.as_ref(),
            self.environment_set.as_ref(),
            self.fullscreen.as_ref(),
        ) else {
            return Err(self.not_initialised());
        };
        gbuffer_set.bind(pass.as_mut(), 0, None)?;
        environment_set.bind(pass.as_mut(), 1, None)?;
        fullscreen.draw(pass.as_mut());
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
