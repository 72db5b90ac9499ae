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

//! Cascaded shadow maps for the main directional light.

use super::cascades::{compute_cascades, ShadowData};
use super::shaders::{self, SHADOW_WGSL};
use super::uniforms::DrawUniforms;
use super::{LaneResources, PassPhase, PassState, RenderLane, RenderWorld, ShadowMaps};
use lumos_core::config::ShadowSettings;
use lumos_core::renderer::resources::{Pipeline, PipelineDesc, TextureDepthArray};
use lumos_core::renderer::scene::Vertex;
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{
    CommandEncoder, CullMode, DepthBiasState, DynamicAllocation, RenderError, RhiFormat,
};
use lumos_core::RenderContext;
use std::any::Any;
use std::sync::Arc;

const SHADOW_DRAW_SIZE: u32 = 64;

/// Renders shadow casters into one depth layer per cascade.
///
/// Each cascade gets its own draw list, culled against the cascade's
/// light-space frustum. The resulting [`ShadowMaps`] are published for the
/// lighting lanes. Without a directional light (or with shadows disabled)
/// `should_render` is false and nothing is drawn.
#[derive(Debug)]
pub struct ShadowLane {
    state: PassState,
    settings: Option<ShadowSettings>,
    shader: Option<Arc<Shader>>,
    pipeline: Option<Arc<Pipeline>>,
    maps: Option<Arc<TextureDepthArray>>,
    draws: Option<DrawUniforms>,
    data: ShadowData,
    // Indices into the queue, per cascade.
    visible: Vec<Vec<usize>>,
    allocations: Vec<Vec<(usize, DynamicAllocation)>>,
}

impl Default for ShadowLane {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowLane {
    /// Creates the lane; settings come from the context at initialisation.
    pub fn new() -> Self {
        Self {
            state: PassState::new("ShadowLane"),
            settings: None,
            shader: None,
            pipeline: None,
            maps: None,
            draws: None,
            data: ShadowData::default(),
            visible: Vec::new(),
            allocations: Vec::new(),
        }
    }

    /// Uses `settings` instead of the context's shadow settings.
    pub fn with_settings(mut self, settings: ShadowSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Cascades computed for the current frame.
    pub fn shadow_data(&self) -> &ShadowData {
        &self.data
    }

    /// Draws queued for `cascade` this frame.
    pub fn submissions(&self, cascade: usize) -> usize {
        self.visible.get(cascade).map_or(0, Vec::len)
    }

    /// The depth layers, once initialised.
    pub fn maps(&self) -> Option<&Arc<TextureDepthArray>> {
        self.maps.as_ref()
    }

    fn settings<'a>(&'a self, ctx: &'a RenderContext) -> &'a ShadowSettings {
        self.settings.as_ref().unwrap_or(&ctx.config().shadows)
    }

    fn not_initialised(&self) -> RenderError {
        RenderError::RenderingFailed(format!("{}: used before initialise", self.state.name()))
    }
}

impl RenderLane for ShadowLane {
    fn name(&self) -> &'static str {
        "ShadowLane"
    }

    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let settings = self.settings(ctx).clone();
        let device = ctx.device();
        let shader = Shader::from_source(
            device,
            "shadow",
            SHADOW_WGSL,
            &shaders::includes(),
            &ShaderOptions::default().dynamic_uniform(0, 0),
        )?;

        let layers = settings.cascade_count.clamp(1, lumos_core::config::MAX_CASCADES);
        let maps = Arc::new(TextureDepthArray::create(
            device,
            "shadow cascades",
            settings.map_size,
            settings.map_size,
            layers,
            RhiFormat::D32Float,
        )?);

        let mut desc = PipelineDesc::new(shader.clone(), "ShadowLane");
        desc.depth_array_target = Some(maps.clone());
        desc.vertex_layout = vec![Vertex::layout()];
        desc.cull_mode = CullMode::None;
        desc.depth_bias = DepthBiasState {
            constant: 2,
            slope_scale: 2.0,
            clamp: 0.0,
        };
        let pipeline = ctx.pipeline(desc)?;

        self.draws = Some(DrawUniforms::new(
            ctx,
            &shader,
            0,
            SHADOW_DRAW_SIZE,
            "ShadowLane draws",
        )?);
        resources.insert(ShadowMaps {
            array: maps.clone(),
            data: ShadowData::default(),
        });
        log::info!(
            "ShadowLane: {} cascade(s) of {}x{}",
            layers,
            settings.map_size,
            settings.map_size
        );
        self.shader = Some(shader);
        self.pipeline = Some(pipeline);
        self.maps = Some(maps);
        Ok(())
    }

    fn begin(&mut self, ctx: &RenderContext) -> Result<(), RenderError> {
        self.state.begin();
        self.visible.iter_mut().for_each(Vec::clear);
        self.allocations.iter_mut().for_each(Vec::clear);
        self.data = ShadowData::default();
        if let Some(draws) = self.draws.as_mut() {
            draws.begin_frame(ctx.frame_slot());
        }
        Ok(())
    }

    fn begin_scene(
        &mut self,
        ctx: &RenderContext,
        world: &RenderWorld,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError> {
        let active = self.state.begin_scene(world.camera)?;
        let settings = self.settings(ctx).clone();

        self.data = match (active, settings.enabled, world.lights.main_directional()) {
            (true, true, Some(sun)) => {
                let camera = self.state.camera().copied().unwrap_or_default();
                let mut data = compute_cascades(&camera, sun.direction, &settings);
                // Never more cascades than layers.
                let layers = self.maps.as_ref().map_or(0, |m| m.layers() as usize);
                data.cascade_count = data.cascade_count.min(layers);
                data
            }
            _ => ShadowData::default(),
        };

        if self.data.should_render {
            let count = self.data.cascade_count;
            self.visible.resize_with(count, Vec::new);
            for renderable in world.renderables.iter().filter(|r| r.casts_shadows) {
                let sphere = renderable
                    .mesh
                    .bounding_sphere()
                    .transform(&renderable.transform);
                let index = self.state.queue().len();
                let mut seen = false;
                for (cascade, list) in self.data.active().iter().zip(self.visible.iter_mut()) {
                    if cascade.can_see(&sphere) {
                        list.push(index);
                        seen = true;
                    }
                }
                if seen {
                    self.state.submit(renderable.command())?;
                }
            }
        }

        match resources.get_mut::<ShadowMaps>() {
            Some(maps) => maps.data = self.data.clone(),
            None => {
                if let Some(array) = &self.maps {
                    resources.insert(ShadowMaps {
                        array: array.clone(),
                        data: self.data.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn set_system_uniforms(
        &mut self,
        _ctx: &RenderContext,
        _resources: &LaneResources,
    ) -> Result<(), RenderError> {
        self.state.set_uniforms()?;
        if !self.data.should_render {
            return Ok(());
        }
        let Some(draws) = self.draws.as_mut() else {
            return Err(self.not_initialised());
        };
        self.allocations.resize_with(self.visible.len(), Vec::new);
        for (cascade, (list, allocations)) in self
            .visible
            .iter()
            .zip(self.allocations.iter_mut())
            .enumerate()
        {
            let proj_view = self.data.cascades[cascade].proj_view;
            for &index in list {
                let command = &self.state.queue()[index];
                let mvp = proj_view * command.transform;
                allocations.push((index, draws.push(&mvp.to_cols_array())?));
            }
        }
        Ok(())
    }

    fn present(
        &mut self,
        _ctx: &RenderContext,
        _resources: &LaneResources,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError> {
        self.state.present()?;
        if !self.data.should_render {
            return Ok(());
        }
        let pipeline = self.pipeline.as_ref().ok_or_else(|| self.not_initialised())?;
        for (layer, allocations) in self.allocations.iter().enumerate() {
            let mut pass = pipeline.begin(encoder, layer as u32)?;
            for (index, allocation) in allocations {
                pass.set_bind_group(0, allocation.bind_group, &[allocation.offset]);
                self.state.queue()[*index].mesh.draw(pass.as_mut());
            }
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
