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

//! Draws the environment cubemap behind the scene.

use super::draw::scene_depth;
use super::shaders::{self, SKYBOX_WGSL};
use super::uniforms::sky_layout;
use super::{LaneResources, PassPhase, PassState, RenderLane, RenderWorld, SwapchainImage};
use lumos_core::math::{Mat3, Mat4, Vec4};
use lumos_core::renderer::resources::{
    Descriptor, DescriptorSet, PipelineDesc, TextureCube, UniformBuffer,
};
use lumos_core::renderer::scene::{Mesh, MeshData, Vertex};
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{CommandEncoder, CullMode, RenderError, UniformBlock};
use lumos_core::RenderContext;
use std::any::Any;
use std::sync::Arc;

/// Draws the world's [`Environment`](super::Environment) radiance map on
/// the far plane.
///
/// The pass loads the swapchain and tests against the [`SceneDepth`](super::SceneDepth)
/// without writing it, so it belongs after the opaque lanes. Frames without
/// an environment record nothing.
#[derive(Debug)]
pub struct SkyboxLane {
    state: PassState,
    shader: Option<Arc<Shader>>,
    base: Option<PipelineDesc>,
    cube: Option<Mesh>,
    uniforms: Option<UniformBuffer>,
    block: UniformBlock,
    system: Option<DescriptorSet>,
    sky_set: Option<DescriptorSet>,
    bound: Option<Arc<TextureCube>>,
    sky: Option<Arc<TextureCube>>,
}

impl Default for SkyboxLane {
    fn default() -> Self {
        Self::new()
    }
}

impl SkyboxLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self {
            state: PassState::new("SkyboxLane"),
            shader: None,
            base: None,
            cube: None,
            uniforms: None,
            block: UniformBlock::new(Arc::new(sky_layout())),
            system: None,
            sky_set: None,
            bound: None,
            sky: None,
        }
    }

    /// Whether this frame has a sky to draw.
    pub fn has_sky(&self) -> bool {
        self.sky.is_some()
    }

    fn not_initialised(&self) -> RenderError {
        RenderError::RenderingFailed(format!("{}: used before initialise", self.state.name()))
    }
}

/// Projection times the view with its translation removed.
pub fn sky_view_projection(projection: Mat4, view: Mat4) -> Mat4 {
    projection * Mat4::from_mat3(Mat3::from_mat4(view))
}

impl RenderLane for SkyboxLane {
    fn name(&self) -> &'static str {
        "SkyboxLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let device = ctx.device();
        let shader = Shader::from_source(
            device,
            "skybox",
            SKYBOX_WGSL,
            &shaders::includes(),
            &ShaderOptions::default(),
        )?;
        shader.validate_uniform_layout("sky", self.block.layout())?;
        let uniforms =
            UniformBuffer::new(device, "SkyboxLane uniforms", self.block.layout().size() as u64)?;
        let mut system = DescriptorSet::new(&shader, 0)?;
        system.update(vec![Descriptor::uniform(0, "sky", &uniforms)])?;

        let mut base = PipelineDesc::new(shader.clone(), "SkyboxLane");
        base.swapchain_target = true;
        base.depth_target = Some(scene_depth(ctx, resources)?);
        base.vertex_layout = vec![Vertex::layout()];
        base.cull_mode = CullMode::None;
        base.clear_targets = false;
        base.depth_test = true;
        base.depth_write = false;
        ctx.pipeline(base.clone())?;

        self.cube = Some(Mesh::new(device, "sky cube", &MeshData::cube())?);
        self.shader = Some(shader);
        self.base = Some(base);
        self.uniforms = Some(uniforms);
        self.system = Some(system);
        self.sky_set = None;
        self.bound = None;
        Ok(())
    }

    fn begin(&mut self, _ctx: &RenderContext) -> Result<(), RenderError> {
        self.state.begin();
        self.sky = None;
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
        let Some(environment) = &world.environment else {
            return Ok(());
        };
        let camera = self.state.camera().copied().unwrap_or_default();
        self.block.clear();
        self.block.set(
            "view_projection",
            &sky_view_projection(camera.projection, camera.view),
        )?;
        self.block
            .set("params", &Vec4::new(environment.intensity, 0.0, 0.0, 0.0))?;
        self.sky = Some(environment.skybox.clone());
        Ok(())
    }

    fn set_system_uniforms(
        &mut self,
        _ctx: &RenderContext,
        _resources: &LaneResources,
    ) -> Result<(), RenderError> {
        self.state.set_uniforms()?;
        let Some(sky) = self.sky.clone() else {
            return Ok(());
        };
        let (Some(shader), Some(uniforms)) = (self.shader.as_ref(), self.uniforms.as_ref()) else {
            return Err(self.not_initialised());
        };
        uniforms.set_data(self.block.as_bytes())?;
        if !self
            .bound
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, &sky))
        {
            let mut set = DescriptorSet::new(shader, 1)?;
            set.update(vec![Descriptor::image(0, "sky_map", sky.view(), sky.sampler())])?;
            self.sky_set = Some(set);
            self.bound = Some(sky);
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
        if self.sky.is_none() {
            return Ok(());
        }
        let (Some(base), Some(system), Some(sky_set), Some(cube)) = (
            self.base.as_ref(),
            self.system.as_ref(),
            self.sky_set.as_ref(),
            self.cube.as_ref(),
        ) else {
            return Err(self.not_initialised());
        };
        let image = resources.require::<SwapchainImage>()?.0;
        let pipeline = ctx.pipeline(base.clone())?;
        let mut pass = pipeline.begin(encoder, image)?;
        system.bind(pass.as_mut(), 0, None)?;
        sky_set.bind(pass.as_mut(), 1, None)?;
        cube.draw(pass.as_mut());
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
    use approx::assert_relative_eq;
    use lumos_core::math::Vec3;

    #[test]
    fn sky_ignores_camera_translation() {
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let here = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let there = Mat4::look_at_rh(Vec3::new(40.0, -3.0, 7.0), Vec3::new(40.0, -3.0, 6.0), Vec3::Y);
        let a = sky_view_projection(projection, here);
        let b = sky_view_projection(projection, there);
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array()) {
            assert_relative_eq!(*x, y, epsilon = 1e-5);
        }
    }
}
