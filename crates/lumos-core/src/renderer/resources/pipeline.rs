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

//! Render pipelines and the pipeline cache.
//!
//! A [`Pipeline`] bundles a backend pipeline object, its render pass template
//! and the framebuffers it draws into: one per depth-array layer, cube face or
//! swapchain image, or a single one otherwise. Pipelines are immutable and
//! shared through [`PipelineCache`].

use super::framebuffer::{Framebuffer, FramebufferDesc};
use super::render_pass::{AttachmentInfo, AttachmentKind, RenderPassDesc, RenderPassTemplate};
use super::texture::Texture2D;
use super::texture_cube::{TextureCube, CUBE_FACES};
use super::texture_depth::{TextureDepth, TextureDepthArray};
use crate::math::LinearRgba;
use crate::renderer::api::backend::DeviceFeature;
use crate::renderer::api::buffer::VertexBufferLayoutDescriptor;
use crate::renderer::api::pipeline::{
    BlendMode, ColorTargetState, CompareFunction, CullMode, DepthBiasState, DepthStencilState,
    FrontFace, PolygonMode, PrimitiveState, PrimitiveTopology, RenderPipelineDescriptor,
    RenderPipelineId,
};
use crate::renderer::api::shader::ShaderStage;
use crate::renderer::api::texture::TextureViewId;
use crate::renderer::error::{PipelineError, ResourceError};
use crate::renderer::shader::Shader;
use crate::renderer::traits::{CommandEncoder, GraphicsDevice, RenderPass};
use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Everything needed to build a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    /// Shader program.
    pub shader: Arc<Shader>,
    /// Colour targets in location order.
    pub colour_targets: Vec<Arc<Texture2D>>,
    /// Cubemap rendered face by face.
    pub cube_target: Option<Arc<TextureCube>>,
    /// Depth buffer.
    pub depth_target: Option<Arc<TextureDepth>>,
    /// Layered depth target, one framebuffer per layer.
    pub depth_array_target: Option<Arc<TextureDepthArray>>,
    /// Draw into the swapchain image (after any colour targets).
    pub swapchain_target: bool,
    /// Culled faces.
    pub cull_mode: CullMode,
    /// Fill mode. Falls back to fill when the device lacks support.
    pub polygon_mode: PolygonMode,
    /// Blend preset applied when transparency is enabled.
    pub blend_mode: BlendMode,
    /// Enables `blend_mode` on every colour target.
    pub transparency_enabled: bool,
    /// Clear targets when a pass begins.
    pub clear_targets: bool,
    /// Clear colour for colour targets.
    pub clear_colour: LinearRgba,
    /// Depth testing.
    pub depth_test: bool,
    /// Depth writes.
    pub depth_write: bool,
    /// Depth bias, mostly for shadow maps.
    pub depth_bias: DepthBiasState,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Vertex buffer layouts; empty for generated geometry.
    pub vertex_layout: Vec<VertexBufferLayoutDescriptor>,
    /// Debug name.
    pub debug_name: String,
}

impl PipelineDesc {
    /// A description with default state for `shader`: back-face culling,
    /// depth test and write, no blending, clearing to black.
    pub fn new(shader: Arc<Shader>, debug_name: impl Into<String>) -> Self {
        Self {
            shader,
            colour_targets: Vec::new(),
            cube_target: None,
            depth_target: None,
            depth_array_target: None,
            swapchain_target: false,
            cull_mode: CullMode::Back,
            polygon_mode: PolygonMode::Fill,
            blend_mode: BlendMode::SrcAlphaOneMinusSrcAlpha,
            transparency_enabled: false,
            clear_targets: true,
            clear_colour: LinearRgba::BLACK,
            depth_test: true,
            depth_write: true,
            depth_bias: DepthBiasState::default(),
            topology: PrimitiveTopology::TriangleList,
            vertex_layout: Vec::new(),
            debug_name: debug_name.into(),
        }
    }

    /// Stable key of the description: shader identity, target identities and
    /// every state field.
    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.shader.id().hash(&mut hasher);
        for target in &self.colour_targets {
            (Arc::as_ptr(target) as usize).hash(&mut hasher);
        }
        self.cube_target
            .as_ref()
            .map(|t| Arc::as_ptr(t) as usize)
            .hash(&mut hasher);
        self.depth_target
            .as_ref()
            .map(|t| Arc::as_ptr(t) as usize)
            .hash(&mut hasher);
        self.depth_array_target
            .as_ref()
            .map(|t| Arc::as_ptr(t) as usize)
            .hash(&mut hasher);
        self.swapchain_target.hash(&mut hasher);
        self.cull_mode.hash(&mut hasher);
        self.polygon_mode.hash(&mut hasher);
        self.blend_mode.hash(&mut hasher);
        self.transparency_enabled.hash(&mut hasher);
        self.clear_targets.hash(&mut hasher);
        self.clear_colour.to_array().map(f32::to_bits).hash(&mut hasher);
        self.depth_test.hash(&mut hasher);
        self.depth_write.hash(&mut hasher);
        self.depth_bias.hash(&mut hasher);
        self.topology.hash(&mut hasher);
        self.vertex_layout.hash(&mut hasher);
        self.debug_name.hash(&mut hasher);
        hasher.finish()
    }

    /// Whether `other` describes the same pipeline: the fields hashed by
    /// [`cache_key`](Self::cache_key), compared exactly.
    pub fn matches(&self, other: &PipelineDesc) -> bool {
        fn same<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        self.shader.id() == other.shader.id()
            && self.colour_targets.len() == other.colour_targets.len()
            && self
                .colour_targets
                .iter()
                .zip(&other.colour_targets)
                .all(|(a, b)| Arc::ptr_eq(a, b))
            && same(&self.cube_target, &other.cube_target)
            && same(&self.depth_target, &other.depth_target)
            && same(&self.depth_array_target, &other.depth_array_target)
            && self.swapchain_target == other.swapchain_target
            && self.cull_mode == other.cull_mode
            && self.polygon_mode == other.polygon_mode
            && self.blend_mode == other.blend_mode
            && self.transparency_enabled == other.transparency_enabled
            && self.clear_targets == other.clear_targets
            && self.clear_colour.to_array().map(f32::to_bits)
                == other.clear_colour.to_array().map(f32::to_bits)
            && self.depth_test == other.depth_test
            && self.depth_write == other.depth_write
            && self.depth_bias == other.depth_bias
            && self.topology == other.topology
            && self.vertex_layout == other.vertex_layout
            && self.debug_name == other.debug_name
    }

    fn render_pass_desc(&self, device: &dyn GraphicsDevice) -> RenderPassDesc {
        let mut attachments: Vec<AttachmentInfo> = self
            .colour_targets
            .iter()
            .map(|t| AttachmentInfo {
                kind: AttachmentKind::Colour,
                format: t.format(),
            })
            .collect();
        if let Some(cube) = &self.cube_target {
            attachments.push(AttachmentInfo {
                kind: AttachmentKind::Cube,
                format: cube.format(),
            });
        }
        if self.swapchain_target {
            attachments.push(AttachmentInfo {
                kind: AttachmentKind::Colour,
                format: device.swapchain_format(),
            });
        }
        if let Some(depth) = &self.depth_target {
            attachments.push(AttachmentInfo {
                kind: AttachmentKind::Depth,
                format: depth.format(),
            });
        }
        if let Some(array) = &self.depth_array_target {
            attachments.push(AttachmentInfo {
                kind: AttachmentKind::DepthArray,
                format: array.format(),
            });
        }
        RenderPassDesc {
            attachments,
            clear: self.clear_targets,
            swapchain_target: self.swapchain_target,
            debug_name: self.debug_name.clone(),
        }
    }
}

/// A compiled pipeline with its render pass and framebuffers.
#[derive(Debug)]
pub struct Pipeline {
    device: Arc<dyn GraphicsDevice>,
    desc: PipelineDesc,
    key: u64,
    render_pass: RenderPassTemplate,
    framebuffers: RwLock<Vec<Framebuffer>>,
    pipeline: RenderPipelineId,
}

impl Pipeline {
    /// Builds the backend pipeline and every framebuffer of `desc`.
    ///
    /// ## Errors
    /// * `PipelineError::MissingAttachment` - No render target, or both a
    ///   depth buffer and a depth array.
    /// * `PipelineError::InvalidShaderModuleForPipeline` - The shader has no
    ///   vertex stage.
    pub fn new(device: &Arc<dyn GraphicsDevice>, desc: PipelineDesc) -> Result<Self, ResourceError> {
        if desc.depth_target.is_some() && desc.depth_array_target.is_some() {
            return Err(PipelineError::MissingAttachment(format!(
                "pipeline '{}' has both a depth buffer and a depth array",
                desc.debug_name
            ))
            .into());
        }
        let render_pass = RenderPassTemplate::new(desc.render_pass_desc(device.as_ref()))?;

        let shader = &desc.shader;
        let (vertex_module, vertex_entry) = match (
            shader.module(ShaderStage::Vertex),
            shader.entry_point(ShaderStage::Vertex),
        ) {
            (Some(module), Some(entry)) => (module, entry),
            _ => {
                return Err(PipelineError::CompilationFailed {
                    label: Some(desc.debug_name.clone()),
                    details: format!("shader '{}' has no vertex stage", shader.name()),
                }
                .into())
            }
        };

        let polygon_mode = match desc.polygon_mode {
            PolygonMode::Line if !device.supports_feature(DeviceFeature::PolygonModeLine) => {
                log::warn!(
                    "Pipeline '{}': line polygon mode unsupported, using fill",
                    desc.debug_name
                );
                PolygonMode::Fill
            }
            PolygonMode::Point if !device.supports_feature(DeviceFeature::PolygonModePoint) => {
                log::warn!(
                    "Pipeline '{}': point polygon mode unsupported, using fill",
                    desc.debug_name
                );
                PolygonMode::Fill
            }
            mode => mode,
        };

        let blend = if desc.transparency_enabled {
            desc.blend_mode
        } else {
            BlendMode::None
        };
        let colour_states: Vec<ColorTargetState> = render_pass
            .colour_formats()
            .into_iter()
            .map(|format| ColorTargetState { format, blend })
            .collect();
        let depth_state = render_pass.depth_format().map(|format| DepthStencilState {
            format,
            depth_write_enabled: desc.depth_write,
            depth_compare: if desc.depth_test {
                CompareFunction::LessEqual
            } else {
                CompareFunction::Always
            },
            bias: desc.depth_bias,
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Borrowed(&desc.debug_name)),
            layout: Some(shader.pipeline_layout()),
            vertex_shader_module: vertex_module,
            vertex_entry_point: Cow::Borrowed(vertex_entry),
            fragment_shader_module: shader.module(ShaderStage::Fragment),
            fragment_entry_point: shader
                .entry_point(ShaderStage::Fragment)
                .map(Cow::Borrowed),
            vertex_buffers_layout: Cow::Borrowed(&desc.vertex_layout),
            primitive_state: PrimitiveState {
                topology: desc.topology,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: desc.cull_mode,
                polygon_mode,
            },
            depth_stencil_state: depth_state,
            color_target_states: Cow::Owned(colour_states),
            sample_count: 1,
        })?;

        let framebuffers = match Self::build_framebuffers(device.as_ref(), &desc, &render_pass) {
            Ok(framebuffers) => framebuffers,
            Err(e) => {
                let _ = device.destroy_render_pipeline(pipeline);
                return Err(e.into());
            }
        };
        log::debug!(
            "Pipeline '{}': created with {} framebuffer(s)",
            desc.debug_name,
            framebuffers.len()
        );

        Ok(Self {
            device: device.clone(),
            key: desc.cache_key(),
            desc,
            render_pass,
            framebuffers: RwLock::new(framebuffers),
            pipeline,
        })
    }

    fn build_framebuffers(
        device: &dyn GraphicsDevice,
        desc: &PipelineDesc,
        render_pass: &RenderPassTemplate,
    ) -> Result<Vec<Framebuffer>, PipelineError> {
        let colour: Vec<_> = desc.colour_targets.iter().map(|t| t.view()).collect();
        let depth = desc.depth_target.as_ref().map(|d| d.view());
        let (mut width, mut height) = desc
            .colour_targets
            .first()
            .map(|t| (t.width(), t.height()))
            .or_else(|| desc.depth_target.as_ref().map(|d| (d.width(), d.height())))
            .unwrap_or((0, 0));

        let single = |width: u32,
                      height: u32,
                      layer: u32,
                      colour_views: Vec<TextureViewId>,
                      depth_view: Option<TextureViewId>| {
            Framebuffer::new(FramebufferDesc {
                width,
                height,
                layer,
                colour_views,
                depth_view,
                render_pass,
            })
        };

        if let Some(array) = &desc.depth_array_target {
            return (0..array.layers())
                .map(|layer| {
                    single(
                        array.width(),
                        array.height(),
                        layer,
                        colour.clone(),
                        array.layer_view(layer),
                    )
                })
                .collect();
        }
        if let Some(cube) = &desc.cube_target {
            return (0..CUBE_FACES)
                .map(|face| {
                    let mut views = colour.clone();
                    views.extend(cube.face_view(face));
                    single(cube.size(), cube.size(), face as u32, views, depth)
                })
                .collect();
        }
        if desc.swapchain_target {
            let extent = device.swapchain_extent();
            if width == 0 {
                (width, height) = (extent.width, extent.height);
            }
            return (0..device.swapchain_image_count())
                .map(|image| {
                    let mut views = colour.clone();
                    let view = device.swapchain_image_view(image).ok_or_else(|| {
                        PipelineError::MissingAttachment(format!(
                            "swapchain image {image} has no view"
                        ))
                    })?;
                    views.push(view);
                    single(width, height, image, views, depth)
                })
                .collect();
        }
        Ok(vec![single(width, height, 0, colour, depth)?])
    }

    /// Re-reads swapchain views after the swapchain was recreated.
    pub fn refresh_swapchain_framebuffers(&self) -> Result<(), PipelineError> {
        if !self.desc.swapchain_target {
            return Ok(());
        }
        let rebuilt = Self::build_framebuffers(self.device.as_ref(), &self.desc, &self.render_pass)?;
        match self.framebuffers.write() {
            Ok(mut framebuffers) => *framebuffers = rebuilt,
            Err(poisoned) => *poisoned.into_inner() = rebuilt,
        }
        Ok(())
    }

    /// Opens a pass on framebuffer `index` (layer, face or swapchain image)
    /// and binds the pipeline.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingAttachment`] if `index` has no framebuffer.
    pub fn begin<'e>(
        &self,
        encoder: &'e mut dyn CommandEncoder,
        index: u32,
    ) -> Result<Box<dyn RenderPass<'e> + 'e>, PipelineError> {
        let framebuffers = self
            .framebuffers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let framebuffer = framebuffers.get(index as usize).ok_or_else(|| {
            PipelineError::MissingAttachment(format!(
                "pipeline '{}' has no framebuffer {}",
                self.desc.debug_name, index
            ))
        })?;
        let mut pass = self
            .render_pass
            .begin(encoder, framebuffer, self.desc.clear_colour);
        if framebuffer.width() > 0 && framebuffer.height() > 0 {
            pass.set_viewport(
                0.0,
                0.0,
                framebuffer.width() as f32,
                framebuffer.height() as f32,
            );
        }
        pass.set_pipeline(self.pipeline);
        Ok(pass)
    }

    /// Backend pipeline handle.
    pub fn id(&self) -> RenderPipelineId {
        self.pipeline
    }

    /// Description the pipeline was built from.
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    /// Shader program.
    pub fn shader(&self) -> &Arc<Shader> {
        &self.desc.shader
    }

    /// Render pass template.
    pub fn render_pass(&self) -> &RenderPassTemplate {
        &self.render_pass
    }

    /// Number of framebuffers.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers
            .read()
            .map(|f| f.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    /// Cache key of the description.
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_render_pipeline(self.pipeline) {
            log::warn!("Pipeline '{}': failed to destroy: {}", self.desc.debug_name, e);
        }
    }
}

/// Hit and miss counters of a [`PipelineCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that built a pipeline.
    pub misses: u64,
    /// Pipelines currently cached.
    pub entries: usize,
}

/// Deduplicates pipelines by [`PipelineDesc::cache_key`].
///
/// Entries sharing a key are kept side by side and told apart with
/// [`PipelineDesc::matches`], so a hash collision never returns a pipeline
/// built from another description.
#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: Mutex<HashMap<u64, Vec<Arc<Pipeline>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PipelineCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline for `desc`, building it on a miss.
    /// A hit never creates GPU objects.
    pub fn get(
        &self,
        device: &Arc<dyn GraphicsDevice>,
        desc: PipelineDesc,
    ) -> Result<Arc<Pipeline>, ResourceError> {
        let key = desc.cache_key();
        self.get_keyed(device, key, desc)
    }

    fn get_keyed(
        &self,
        device: &Arc<dyn GraphicsDevice>,
        key: u64,
        desc: PipelineDesc,
    ) -> Result<Arc<Pipeline>, ResourceError> {
        let mut pipelines = self
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let bucket = pipelines.entry(key).or_default();
        if let Some(pipeline) = bucket.iter().find(|p| p.desc.matches(&desc)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(pipeline.clone());
        }
        if !bucket.is_empty() {
            log::warn!(
                "PipelineCache: key {:#x} of '{}' collides with {} cached pipeline(s)",
                key,
                desc.debug_name,
                bucket.len()
            );
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let pipeline = match Pipeline::new(device, desc) {
            Ok(pipeline) => Arc::new(pipeline),
            Err(e) => {
                if bucket.is_empty() {
                    pipelines.remove(&key);
                }
                return Err(e);
            }
        };
        bucket.push(pipeline.clone());
        Ok(pipeline)
    }

    /// Drops every pipeline only referenced by the cache and returns how many
    /// were released.
    pub fn clear_unused(&self) -> usize {
        let mut pipelines = self
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut released = 0;
        pipelines.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|pipeline| Arc::strong_count(pipeline) > 1);
            released += before - bucket.len();
            !bucket.is_empty()
        });
        if released > 0 {
            log::debug!("PipelineCache: released {} unused pipeline(s)", released);
        }
        released
    }

    /// Drops every cached pipeline.
    pub fn clear(&self) {
        self.pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Counters for diagnostics.
    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .pipelines
                .lock()
                .map(|p| p.values().map(Vec::len).sum())
                .unwrap_or_else(|poisoned| poisoned.into_inner().values().map(Vec::len).sum()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::format::RhiFormat;
    use crate::renderer::resources::texture::TextureParameters;
    use crate::renderer::shader::{EmbeddedIncludes, ShaderOptions};
    use crate::renderer::api::texture::TextureUsage;
    use crate::renderer::testing::{MockCommand, MockDevice};

    const SOURCE: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(f32(index), 0.0, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

    fn shader(device: &Arc<dyn GraphicsDevice>) -> Arc<Shader> {
        Shader::from_source(
            device,
            "flat",
            SOURCE,
            &EmbeddedIncludes::new(),
            &ShaderOptions::default(),
        )
        .unwrap()
    }

    fn colour_target(device: &Arc<dyn GraphicsDevice>) -> Arc<Texture2D> {
        Arc::new(
            Texture2D::create(
                device,
                "target",
                32,
                32,
                TextureParameters::render_target(RhiFormat::R16G16B16A16Float),
                TextureUsage::RENDER_ATTACHMENT,
            )
            .unwrap(),
        )
    }

    #[test]
    fn cache_hit_reuses_gpu_objects() {
        let (mock, device) = MockDevice::shared();
        let cache = PipelineCache::new();
        let shader = shader(&device);
        let target = colour_target(&device);

        let mut desc = PipelineDesc::new(shader, "flat");
        desc.colour_targets.push(target);

        let first = cache.get(&device, desc.clone()).unwrap();
        let second = cache.get(&device, desc.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mock.pipeline_count(), 1);

        desc.cull_mode = CullMode::None;
        let third = cache.get(&device, desc).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(
            cache.stats(),
            PipelineCacheStats {
                hits: 1,
                misses: 2,
                entries: 2
            }
        );

        drop((first, second));
        assert_eq!(cache.clear_unused(), 1);
        assert_eq!(mock.pipeline_count(), 1);
    }

    #[test]
    fn colliding_keys_keep_distinct_pipelines() {
        let (mock, device) = MockDevice::shared();
        let cache = PipelineCache::new();
        let shader = shader(&device);
        let target = colour_target(&device);

        let mut opaque = PipelineDesc::new(shader, "flat");
        opaque.colour_targets.push(target);
        let mut blended = opaque.clone();
        blended.transparency_enabled = true;
        assert!(!opaque.matches(&blended));
        assert!(opaque.matches(&opaque.clone()));

        let first = cache.get_keyed(&device, 7, opaque.clone()).unwrap();
        let second = cache.get_keyed(&device, 7, blended.clone()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.desc().transparency_enabled);
        assert_eq!(mock.pipeline_count(), 2);

        let again = cache.get_keyed(&device, 7, blended).unwrap();
        assert!(Arc::ptr_eq(&second, &again));
        assert!(Arc::ptr_eq(&first, &cache.get_keyed(&device, 7, opaque).unwrap()));
        assert_eq!(
            cache.stats(),
            PipelineCacheStats {
                hits: 2,
                misses: 2,
                entries: 2
            }
        );

        drop((second, again));
        assert_eq!(cache.clear_unused(), 1);
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn depth_array_builds_one_framebuffer_per_layer() {
        let (mock, device) = MockDevice::shared();
        let array = Arc::new(
            TextureDepthArray::create(&device, "shadow", 256, 256, 3, RhiFormat::D32Float).unwrap(),
        );
        let mut desc = PipelineDesc::new(shader(&device), "shadow");
        desc.depth_array_target = Some(array.clone());
        let pipeline = Pipeline::new(&device, desc).unwrap();
        assert_eq!(pipeline.framebuffer_count(), 3);

        let mut encoder = device.create_command_encoder(None);
        {
            let pass = pipeline.begin(encoder.as_mut(), 2).unwrap();
            drop(pass);
            assert!(pipeline.begin(encoder.as_mut(), 3).is_err());
        }
        encoder.finish();

        let commands = mock.commands();
        assert_eq!(
            commands[0],
            MockCommand::BeginPass {
                label: Some("shadow".to_string()),
                colour: Vec::new(),
                depth: array.layer_view(2),
            }
        );
        assert_eq!(commands[1], MockCommand::SetPipeline(pipeline.id()));
    }

    #[test]
    fn swapchain_pipelines_have_one_framebuffer_per_image() {
        let (_mock, device) = MockDevice::shared();
        let mut desc = PipelineDesc::new(shader(&device), "present");
        desc.swapchain_target = true;
        let pipeline = Pipeline::new(&device, desc).unwrap();
        assert_eq!(pipeline.framebuffer_count(), device.swapchain_image_count() as usize);
        assert_eq!(
            pipeline.render_pass().colour_formats(),
            vec![device.swapchain_format()]
        );
    }

    #[test]
    fn pipelines_need_a_target() {
        let (_mock, device) = MockDevice::shared();
        let desc = PipelineDesc::new(shader(&device), "nothing");
        assert!(matches!(
            Pipeline::new(&device, desc),
            Err(ResourceError::Pipeline(PipelineError::MissingAttachment(_)))
        ));
    }
}
