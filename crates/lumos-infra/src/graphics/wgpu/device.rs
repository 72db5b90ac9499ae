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

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use wgpu::util::DeviceExt;

use lumos_core::renderer::api::*;
use lumos_core::renderer::traits::CommandEncoder;
use lumos_core::renderer::{
    GraphicsDevice, PipelineError, ResourceError, ShaderError, SubmissionTracker,
};
use lumos_core::RendererConfig;

use super::backend::WgpuBackendSelector;
use super::command::WgpuCommandEncoder;
use super::context::WgpuGraphicsContext;
use super::conversions::IntoWgpu;

/// Format of the offscreen swapchain images.
const SWAPCHAIN_FORMAT: RhiFormat = RhiFormat::R8G8B8A8Srgb;

/// Row pitch alignment of texture to buffer copies.
const COPY_ROW_ALIGNMENT: u32 = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct WgpuShaderModuleEntry {
    wgpu_module: Arc<wgpu::ShaderModule>,
    stage: ShaderStage,
}

#[derive(Debug)]
struct WgpuBindGroupLayoutEntry {
    wgpu_layout: Arc<wgpu::BindGroupLayout>,
}

#[derive(Debug)]
pub(crate) struct WgpuBindGroupEntry {
    pub(crate) wgpu_group: Arc<wgpu::BindGroup>,
}

#[derive(Debug)]
struct WgpuPipelineLayoutEntry {
    wgpu_layout: Arc<wgpu::PipelineLayout>,
}

#[derive(Debug)]
pub(crate) struct WgpuRenderPipelineEntry {
    pub(crate) wgpu_pipeline: Arc<wgpu::RenderPipeline>,
}

#[derive(Debug)]
pub(crate) struct WgpuBufferEntry {
    pub(crate) wgpu_buffer: Arc<wgpu::Buffer>,
    pub(crate) size: u64, // To track VRAM accurately on destruction
}

#[derive(Debug)]
pub(crate) struct WgpuTextureEntry {
    pub(crate) wgpu_texture: Arc<wgpu::Texture>,
    pub(crate) size: u64, // To track VRAM accurately on destruction
    format: RhiFormat,
    extent: Extent3d,
}

#[derive(Debug)]
pub(crate) struct WgpuTextureViewEntry {
    pub(crate) wgpu_view: Arc<wgpu::TextureView>,
}

#[derive(Debug)]
struct WgpuSamplerEntry {
    wgpu_sampler: Arc<wgpu::Sampler>,
}

#[derive(Debug)]
struct SwapchainImages {
    images: Vec<(TextureId, TextureViewId)>,
    extent: Extent3d,
    next: u32,
}

/// Bytes currently allocated on the device and the high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VramUsage {
    /// Live buffer and texture bytes.
    pub allocated_bytes: u64,
    /// Largest value `allocated_bytes` ever reached.
    pub peak_bytes: u64,
}

/// The internal, non-clonable state of the WgpuDevice.
#[derive(Debug)]
pub struct WgpuDeviceInternal {
    context: Arc<Mutex<WgpuGraphicsContext>>,
    shader_modules: Mutex<HashMap<ShaderModuleId, WgpuShaderModuleEntry>>,
    bind_group_layouts: Mutex<HashMap<BindGroupLayoutId, WgpuBindGroupLayoutEntry>>,
    bind_groups: Mutex<HashMap<BindGroupId, WgpuBindGroupEntry>>,
    pipeline_layouts: Mutex<HashMap<PipelineLayoutId, WgpuPipelineLayoutEntry>>,
    pipelines: Mutex<HashMap<RenderPipelineId, WgpuRenderPipelineEntry>>,
    buffers: Mutex<HashMap<BufferId, WgpuBufferEntry>>,
    textures: Mutex<HashMap<TextureId, WgpuTextureEntry>>,
    texture_views: Mutex<HashMap<TextureViewId, WgpuTextureViewEntry>>,
    samplers: Mutex<HashMap<SamplerId, WgpuSamplerEntry>>,

    // One counter for every id namespace keeps ids unique across kinds,
    // which makes stale handles easier to spot in logs.
    next_id: AtomicUsize,

    // VRAM Tracking
    vram_allocated_bytes: AtomicUsize,
    vram_peak_bytes: AtomicU64,

    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, wgpu::CommandBuffer>>,
    command_buffer_id_counter: AtomicU64,

    /// Last submission index handed out.
    submitted: AtomicU64,
    /// Highest submission index whose work the queue reported done.
    completed: Arc<AtomicU64>,

    swapchain: Mutex<SwapchainImages>,
    adapter_info: RendererAdapterInfo,
    features: wgpu::Features,
}

/// A clonable, thread-safe handle to the wgpu graphics device.
///
/// The swapchain is a ring of offscreen textures in [`RhiFormat::R8G8B8A8Srgb`];
/// acquiring an image only rotates the ring.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

impl WgpuDevice {
    /// Selects an adapter among `candidates`, creates the device and its
    /// swapchain images.
    ///
    /// # Errors
    ///
    /// Fails when no backend yields an adapter or the device request is
    /// refused.
    pub fn new(config: &RendererConfig, candidates: &[GraphicsBackendType]) -> anyhow::Result<Self> {
        let selector = WgpuBackendSelector::new(config.power_preference);
        let adapter = pollster::block_on(selector.select(candidates))?;
        let adapter_info = WgpuBackendSelector::adapter_to_info(&adapter);
        let context = pollster::block_on(WgpuGraphicsContext::new(adapter))?;
        let features = context.active_device_features;

        let device = Self {
            internal: Arc::new(WgpuDeviceInternal {
                context: Arc::new(Mutex::new(context)),
                shader_modules: Mutex::new(HashMap::new()),
                bind_group_layouts: Mutex::new(HashMap::new()),
                bind_groups: Mutex::new(HashMap::new()),
                pipeline_layouts: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                samplers: Mutex::new(HashMap::new()),
                next_id: AtomicUsize::new(1),
                vram_allocated_bytes: AtomicUsize::new(0),
                vram_peak_bytes: AtomicU64::new(0),
                pending_command_buffers: Mutex::new(HashMap::new()),
                command_buffer_id_counter: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                completed: Arc::new(AtomicU64::new(0)),
                swapchain: Mutex::new(SwapchainImages {
                    images: Vec::new(),
                    extent: Extent3d::d2(config.width, config.height),
                    next: 0,
                }),
                adapter_info,
                features,
            }),
        };
        device
            .build_swapchain_images(config.width, config.height, config.swapchain_images)
            .map_err(|e| anyhow::anyhow!("Failed to create swapchain images: {e}"))?;
        Ok(device)
    }

    fn next_id(&self) -> usize {
        self.internal.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Helper function to execute an operation with the wgpu::Device locked.
    fn with_wgpu_device<F, R>(&self, operation: F) -> Result<R, ResourceError>
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue) -> Result<R, ResourceError>,
    {
        let context_guard = self.internal.context.lock().map_err(|e| {
            ResourceError::BackendError(format!("Failed to lock WgpuGraphicsContext: {e}"))
        })?;
        operation(&context_guard.device, &context_guard.queue)
    }

    fn track_allocation(&self, bytes: u64) {
        let now = self
            .internal
            .vram_allocated_bytes
            .fetch_add(bytes as usize, Ordering::Relaxed)
            + bytes as usize;
        self.internal
            .vram_peak_bytes
            .fetch_max(now as u64, Ordering::Relaxed);
    }

    fn track_release(&self, bytes: u64) {
        self.internal
            .vram_allocated_bytes
            .fetch_sub(bytes as usize, Ordering::Relaxed);
    }

    /// Current and peak VRAM accounted for by this device.
    pub fn vram_usage(&self) -> VramUsage {
        VramUsage {
            allocated_bytes: self.internal.vram_allocated_bytes.load(Ordering::Relaxed) as u64,
            peak_bytes: self.internal.vram_peak_bytes.load(Ordering::Relaxed),
        }
    }

    /// Retrieves the internal wgpu render pipeline.
    pub fn get_wgpu_render_pipeline(&self, id: RenderPipelineId) -> Option<Arc<wgpu::RenderPipeline>> {
        lock(&self.internal.pipelines)
            .get(&id)
            .map(|entry| Arc::clone(&entry.wgpu_pipeline))
    }

    /// Retrieves the internal wgpu bind group.
    pub fn get_wgpu_bind_group(&self, id: BindGroupId) -> Option<Arc<wgpu::BindGroup>> {
        lock(&self.internal.bind_groups)
            .get(&id)
            .map(|entry| Arc::clone(&entry.wgpu_group))
    }

    /// Retrieves the internal wgpu buffer.
    pub fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        lock(&self.internal.buffers)
            .get(&id)
            .map(|entry| Arc::clone(&entry.wgpu_buffer))
    }

    /// Retrieves the internal wgpu texture view.
    pub fn get_wgpu_texture_view(&self, id: TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        lock(&self.internal.texture_views)
            .get(&id)
            .map(|entry| Arc::clone(&entry.wgpu_view))
    }

    fn get_wgpu_sampler(&self, id: SamplerId) -> Option<Arc<wgpu::Sampler>> {
        lock(&self.internal.samplers)
            .get(&id)
            .map(|entry| Arc::clone(&entry.wgpu_sampler))
    }

    /// Polls the device without blocking so queue callbacks can run.
    pub fn poll_device_non_blocking(&self) {
        let context_guard = lock(&self.internal.context);
        if let Err(e) = context_guard.device.poll(wgpu::PollType::Poll) {
            log::warn!("Failed to poll device (non-blocking): {:?}", e);
        }
    }

    /// Registers a finished wgpu::CommandBuffer and returns its id.
    pub(crate) fn register_command_buffer(&self, buffer: wgpu::CommandBuffer) -> CommandBufferId {
        let new_id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::SeqCst),
        );
        lock(&self.internal.pending_command_buffers).insert(new_id, buffer);
        new_id
    }

    pub(crate) fn with_encoder_device<R>(
        &self,
        operation: impl FnOnce(&wgpu::Device) -> R,
    ) -> R {
        let context_guard = lock(&self.internal.context);
        operation(&context_guard.device)
    }

    fn build_swapchain_images(&self, width: u32, height: u32, count: u32) -> Result<(), ResourceError> {
        let mut images = Vec::with_capacity(count as usize);
        for index in 0..count {
            let texture = self.create_texture(&TextureDescriptor {
                label: Some(format!("swapchain image {index}").into()),
                size: Extent3d::d2(width, height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: SWAPCHAIN_FORMAT,
                usage: TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC,
            })?;
            let view = self.create_texture_view(texture, &TextureViewDescriptor::default())?;
            images.push((texture, view));
        }

        let old = {
            let mut swapchain = lock(&self.internal.swapchain);
            swapchain.extent = Extent3d::d2(width, height);
            swapchain.next = 0;
            std::mem::replace(&mut swapchain.images, images)
        };
        for (texture, view) in old {
            self.destroy_texture_view(view)?;
            self.destroy_texture(texture)?;
        }
        log::debug!("WgpuDevice: swapchain now {count} image(s) of {width}x{height}");
        Ok(())
    }

    fn find_shader_module(&self, id: ShaderModuleId) -> Option<(Arc<wgpu::ShaderModule>, ShaderStage)> {
        lock(&self.internal.shader_modules)
            .get(&id)
            .map(|entry| (Arc::clone(&entry.wgpu_module), entry.stage))
    }
}

impl SubmissionTracker for WgpuDevice {
    fn poll_submission(&self, index: SubmissionIndex) -> bool {
        if self.internal.completed.load(Ordering::Acquire) >= index.0 {
            return true;
        }
        self.poll_device_non_blocking();
        self.internal.completed.load(Ordering::Acquire) >= index.0
    }

    fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), ResourceError> {
        if self.internal.completed.load(Ordering::Acquire) >= index.0 {
            return Ok(());
        }
        self.with_wgpu_device(|device, _| {
            device
                .poll(wgpu::PollType::wait_indefinitely())
                .map(|_| ())
                .map_err(|e| ResourceError::BackendError(format!("Device poll failed: {e:?}")))
        })?;
        if self.internal.completed.load(Ordering::Acquire) >= index.0 {
            Ok(())
        } else {
            Err(ResourceError::BackendError(format!(
                "Submission {} still pending after a blocking poll",
                index.0
            )))
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    // --- Shader Module Operations ---

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        if descriptor.stage == ShaderStage::Geometry {
            return Err(ShaderError::UnsupportedStage {
                label: descriptor.label.unwrap_or("unnamed").to_string(),
                stage: descriptor.stage,
            }
            .into());
        }
        let wgpu_source = match &descriptor.source {
            ShaderSourceData::Wgsl(cow_str) => wgpu::ShaderSource::Wgsl(cow_str.clone()),
        };

        let wgpu_module = self.with_wgpu_device(|device, _| {
            Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: descriptor.label,
                source: wgpu_source,
            }))
        })?;

        let id = ShaderModuleId(self.next_id());
        lock(&self.internal.shader_modules).insert(
            id,
            WgpuShaderModuleEntry {
                wgpu_module: Arc::new(wgpu_module),
                stage: descriptor.stage,
            },
        );
        log::debug!(
            "WgpuDevice: Created {} shader module '{:?}' with ID: {:?}",
            descriptor.stage,
            descriptor.label,
            id
        );
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        lock(&self.internal.shader_modules)
            .remove(&id)
            .map(|_| ())
            .ok_or(ShaderError::NotFound { id }.into())
    }

    // --- Bind Group Operations ---

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = descriptor
            .entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.into_wgpu(),
                ty: match entry.ty {
                    BindingType::UniformBuffer {
                        has_dynamic_offset,
                        min_binding_size,
                    } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset,
                        min_binding_size: min_binding_size.and_then(wgpu::BufferSize::new),
                    },
                    BindingType::Texture {
                        sample_type,
                        view_dimension,
                        multisampled,
                    } => wgpu::BindingType::Texture {
                        sample_type: sample_type.into_wgpu(),
                        view_dimension: view_dimension.into_wgpu(),
                        multisampled,
                    },
                    BindingType::Sampler(kind) => wgpu::BindingType::Sampler(kind.into_wgpu()),
                },
                count: None,
            })
            .collect();

        let wgpu_layout = self.with_wgpu_device(|device, _| {
            Ok(device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: descriptor.label,
                entries: &entries,
            }))
        })?;

        let id = BindGroupLayoutId(self.next_id());
        lock(&self.internal.bind_group_layouts).insert(
            id,
            WgpuBindGroupLayoutEntry {
                wgpu_layout: Arc::new(wgpu_layout),
            },
        );
        Ok(id)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        lock(&self.internal.bind_group_layouts)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_bind_group(&self, descriptor: &BindGroupDescriptor) -> Result<BindGroupId, ResourceError> {
        let layout = lock(&self.internal.bind_group_layouts)
            .get(&descriptor.layout)
            .map(|entry| Arc::clone(&entry.wgpu_layout))
            .ok_or(ResourceError::NotFound)?;

        // Resolve every resource first so the borrowed wgpu entries below
        // point at values that outlive the descriptor.
        enum Resolved {
            Buffer(Arc<wgpu::Buffer>, u64, Option<u64>),
            View(Arc<wgpu::TextureView>),
            Sampler(Arc<wgpu::Sampler>),
        }
        let mut resolved = Vec::with_capacity(descriptor.entries.len());
        for entry in descriptor.entries {
            let resource = match entry.resource {
                BindingResource::Buffer(binding) => Resolved::Buffer(
                    self.get_wgpu_buffer(binding.buffer)
                        .ok_or(ResourceError::NotFound)?,
                    binding.offset,
                    binding.size,
                ),
                BindingResource::TextureView(view) => Resolved::View(
                    self.get_wgpu_texture_view(view)
                        .ok_or(ResourceError::NotFound)?,
                ),
                BindingResource::Sampler(sampler) => Resolved::Sampler(
                    self.get_wgpu_sampler(sampler)
                        .ok_or(ResourceError::NotFound)?,
                ),
            };
            resolved.push((entry.binding, resource));
        }

        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Resolved::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: *offset,
                            size: size.and_then(wgpu::BufferSize::new),
                        })
                    }
                    Resolved::View(view) => wgpu::BindingResource::TextureView(view),
                    Resolved::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        let wgpu_group = self.with_wgpu_device(|device, _| {
            Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: descriptor.label,
                layout: &layout,
                entries: &entries,
            }))
        })?;

        let id = BindGroupId(self.next_id());
        lock(&self.internal.bind_groups).insert(
            id,
            WgpuBindGroupEntry {
                wgpu_group: Arc::new(wgpu_group),
            },
        );
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        lock(&self.internal.bind_groups)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        if !descriptor.push_constant_ranges.is_empty() {
            return Err(PipelineError::FeatureNotSupported(
                "push constants are not enabled on the wgpu backend".to_string(),
            )
            .into());
        }
        let layouts: Vec<Arc<wgpu::BindGroupLayout>> = {
            let map = lock(&self.internal.bind_group_layouts);
            descriptor
                .bind_group_layouts
                .iter()
                .map(|id| {
                    map.get(id)
                        .map(|entry| Arc::clone(&entry.wgpu_layout))
                        .ok_or(ResourceError::NotFound)
                })
                .collect::<Result<_, _>>()?
        };
        let layout_refs: Vec<Option<&wgpu::BindGroupLayout>> =
            layouts.iter().map(|l| Some(l.as_ref())).collect();

        let wgpu_layout = self.with_wgpu_device(|device, _| {
            Ok(device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: descriptor.label,
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            }))
        })?;

        let id = PipelineLayoutId(self.next_id());
        lock(&self.internal.pipeline_layouts).insert(
            id,
            WgpuPipelineLayoutEntry {
                wgpu_layout: Arc::new(wgpu_layout),
            },
        );
        Ok(id)
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError> {
        lock(&self.internal.pipeline_layouts)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    // --- Render Pipeline Operations ---

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let pipeline_label = descriptor.label.as_ref().map(|l| l.to_string());
        let missing = |id| {
            ResourceError::Pipeline(PipelineError::InvalidShaderModuleForPipeline {
                id,
                pipeline_label: pipeline_label.clone(),
            })
        };

        let (vertex_module, _) = self
            .find_shader_module(descriptor.vertex_shader_module)
            .ok_or_else(|| missing(descriptor.vertex_shader_module))?;
        let fragment_module = match descriptor.fragment_shader_module {
            Some(id) => Some(self.find_shader_module(id).ok_or_else(|| missing(id))?.0),
            None => None,
        };

        let polygon_mode = descriptor.primitive_state.polygon_mode;
        let feature_ok = match polygon_mode {
            PolygonMode::Fill => true,
            PolygonMode::Line => self.supports_feature(DeviceFeature::PolygonModeLine),
            PolygonMode::Point => self.supports_feature(DeviceFeature::PolygonModePoint),
        };
        if !feature_ok {
            return Err(PipelineError::FeatureNotSupported(format!(
                "polygon mode {polygon_mode:?}"
            ))
            .into());
        }

        let layout = match descriptor.layout {
            Some(id) => Some(
                lock(&self.internal.pipeline_layouts)
                    .get(&id)
                    .map(|entry| Arc::clone(&entry.wgpu_layout))
                    .ok_or(ResourceError::NotFound)?,
            ),
            None => None,
        };

        let vertex_attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers_layout
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: attr.format.into_wgpu(),
                        offset: attr.offset,
                        shader_location: attr.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers_layout
            .iter()
            .zip(&vertex_attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_target_states
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: target.format.into_wgpu(),
                    blend: target.blend.into_wgpu(),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = descriptor
            .depth_stencil_state
            .map(|ds| wgpu::DepthStencilState {
                format: ds.format.into_wgpu(),
                depth_write_enabled: Some(ds.depth_write_enabled),
                depth_compare: Some(ds.depth_compare.into_wgpu()),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: ds.bias.constant,
                    slope_scale: ds.bias.slope_scale,
                    clamp: ds.bias.clamp,
                },
            });

        let fragment_entry = descriptor.fragment_entry_point.as_deref();
        let label = descriptor.label.as_deref();

        let wgpu_pipeline = self.with_wgpu_device(|device, _| {
            Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label,
                layout: layout.as_deref(),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(descriptor.vertex_entry_point.as_ref()),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: fragment_module.as_ref().map(|module| wgpu::FragmentState {
                    module,
                    entry_point: fragment_entry,
                    targets: &color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: descriptor.primitive_state.topology.into_wgpu(),
                    strip_index_format: descriptor
                        .primitive_state
                        .strip_index_format
                        .map(IntoWgpu::into_wgpu),
                    front_face: descriptor.primitive_state.front_face.into_wgpu(),
                    cull_mode: descriptor.primitive_state.cull_mode.into_wgpu(),
                    polygon_mode: polygon_mode.into_wgpu(),
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: descriptor.sample_count.max(1),
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            }))
        })?;

        let id = RenderPipelineId(self.next_id());
        lock(&self.internal.pipelines).insert(
            id,
            WgpuRenderPipelineEntry {
                wgpu_pipeline: Arc::new(wgpu_pipeline),
            },
        );
        log::debug!("WgpuDevice: Created render pipeline '{:?}' with ID: {:?}", label, id);
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        lock(&self.internal.pipelines)
            .remove(&id)
            .map(|_| ())
            .ok_or(PipelineError::InvalidRenderPipeline { id }.into())
    }

    // --- Buffer Operations ---

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let size = descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let wgpu_buffer = self.with_wgpu_device(|device, _| {
            Ok(device.create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size,
                usage: descriptor.usage.into_wgpu(),
                mapped_at_creation: descriptor.mapped_at_creation,
            }))
        })?;

        let id = BufferId(self.next_id());
        lock(&self.internal.buffers).insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(wgpu_buffer),
                size,
            },
        );
        self.track_allocation(size);
        log::debug!(
            "WgpuDevice: Created buffer '{:?}' with ID: {:?}, size: {} bytes",
            descriptor.label,
            id,
            size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        if data.len() as u64 > descriptor.size {
            return Err(ResourceError::DataSizeMismatch {
                expected: descriptor.size as usize,
                actual: data.len(),
            });
        }
        // create_buffer_init sizes the buffer from its contents.
        let mut contents = data.to_vec();
        contents.resize(
            descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize,
            0,
        );
        let size = contents.len() as u64;

        let wgpu_buffer = self.with_wgpu_device(|device, _| {
            Ok(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: descriptor.label.as_deref(),
                contents: &contents,
                usage: descriptor.usage.into_wgpu(),
            }))
        })?;

        let id = BufferId(self.next_id());
        lock(&self.internal.buffers).insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(wgpu_buffer),
                size,
            },
        );
        self.track_allocation(size);
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.buffers)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        entry.wgpu_buffer.destroy();
        self.track_release(entry.size);
        Ok(())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let (buffer, size) = lock(&self.internal.buffers)
            .get(&id)
            .map(|entry| (Arc::clone(&entry.wgpu_buffer), entry.size))
            .ok_or(ResourceError::NotFound)?;
        if offset + data.len() as u64 > size {
            return Err(ResourceError::OutOfBounds);
        }

        // Queue writes must be a multiple of four bytes.
        let padded_len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if padded_len != data.len() as u64 {
            if offset + padded_len > size {
                return Err(ResourceError::OutOfBounds);
            }
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            return self.with_wgpu_device(|_, queue| {
                queue.write_buffer(&buffer, offset, &padded);
                Ok(())
            });
        }
        self.with_wgpu_device(|_, queue| {
            queue.write_buffer(&buffer, offset, data);
            Ok(())
        })
    }

    // --- Texture Operations ---

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        if descriptor.size.width == 0 || descriptor.size.height == 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "texture '{:?}' has a zero dimension",
                descriptor.label
            )));
        }
        let wgpu_texture = self.with_wgpu_device(|device, _| {
            Ok(device.create_texture(&wgpu::TextureDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size.into_wgpu(),
                mip_level_count: descriptor.mip_level_count.max(1),
                sample_count: descriptor.sample_count.max(1),
                dimension: descriptor.dimension.into_wgpu(),
                format: descriptor.format.into_wgpu(),
                usage: descriptor.usage.into_wgpu(),
                view_formats: &[],
            }))
        })?;

        let size = descriptor.base_level_size_in_bytes();
        let id = TextureId(self.next_id());
        lock(&self.internal.textures).insert(
            id,
            WgpuTextureEntry {
                wgpu_texture: Arc::new(wgpu_texture),
                size,
                format: descriptor.format,
                extent: descriptor.size,
            },
        );
        self.track_allocation(size);
        log::debug!(
            "WgpuDevice: Created texture '{:?}' with ID: {:?}, size: {} bytes",
            descriptor.label,
            id,
            size
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.textures)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        entry.wgpu_texture.destroy();
        self.track_release(entry.size);
        Ok(())
    }

    fn write_texture(
        &self,
        texture_id: TextureId,
        data: &[u8],
        layout: TextureDataLayout,
        origin: Origin3d,
        size: Extent3d,
    ) -> Result<(), ResourceError> {
        let (texture, extent) = lock(&self.internal.textures)
            .get(&texture_id)
            .map(|entry| (Arc::clone(&entry.wgpu_texture), entry.extent))
            .ok_or(ResourceError::NotFound)?;
        if origin.x + size.width > extent.width
            || origin.y + size.height > extent.height
            || origin.z + size.depth_or_array_layers > extent.depth_or_array_layers
        {
            return Err(ResourceError::OutOfBounds);
        }

        self.with_wgpu_device(|_, queue| {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: origin.into_wgpu(),
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: layout.bytes_per_row,
                    rows_per_image: layout.rows_per_image,
                },
                size.into_wgpu(),
            );
            Ok(())
        })
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let texture = lock(&self.internal.textures)
            .get(&texture_id)
            .map(|entry| Arc::clone(&entry.wgpu_texture))
            .ok_or(ResourceError::NotFound)?;

        let wgpu_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            format: descriptor.format.map(IntoWgpu::into_wgpu),
            dimension: descriptor.dimension.map(IntoWgpu::into_wgpu),
            usage: None,
            aspect: descriptor.aspect.into_wgpu(),
            base_mip_level: descriptor.base_mip_level,
            mip_level_count: descriptor.mip_level_count,
            base_array_layer: descriptor.base_array_layer,
            array_layer_count: descriptor.array_layer_count,
        });

        let id = TextureViewId(self.next_id());
        lock(&self.internal.texture_views).insert(
            id,
            WgpuTextureViewEntry {
                wgpu_view: Arc::new(wgpu_view),
            },
        );
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        lock(&self.internal.texture_views)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let clamp_to_border = self.supports_feature(DeviceFeature::AddressModeClampToBorder);
        let address = |mode: AddressMode| -> wgpu::AddressMode {
            if mode == AddressMode::ClampToBorder && !clamp_to_border {
                log::warn!("WgpuDevice: ClampToBorder unavailable, using ClampToEdge");
                return wgpu::AddressMode::ClampToEdge;
            }
            mode.into_wgpu()
        };
        let modes = [
            address(descriptor.address_mode_u),
            address(descriptor.address_mode_v),
            address(descriptor.address_mode_w),
        ];
        let border_color = modes
            .contains(&wgpu::AddressMode::ClampToBorder)
            .then_some(wgpu::SamplerBorderColor::OpaqueWhite);

        // Anisotropy is only valid when every filter is linear.
        let all_linear = descriptor.mag_filter == FilterMode::Linear
            && descriptor.min_filter == FilterMode::Linear
            && descriptor.mipmap_filter == FilterMode::Linear;
        let anisotropy_clamp = if all_linear {
            descriptor.anisotropy_clamp.max(1)
        } else {
            1
        };

        let wgpu_sampler = self.with_wgpu_device(|device, _| {
            Ok(device.create_sampler(&wgpu::SamplerDescriptor {
                label: descriptor.label.as_deref(),
                address_mode_u: modes[0],
                address_mode_v: modes[1],
                address_mode_w: modes[2],
                mag_filter: descriptor.mag_filter.into_wgpu(),
                min_filter: descriptor.min_filter.into_wgpu(),
                mipmap_filter: descriptor.mipmap_filter.into_wgpu(),
                lod_min_clamp: descriptor.lod_min_clamp,
                lod_max_clamp: descriptor.lod_max_clamp,
                compare: descriptor.compare.map(IntoWgpu::into_wgpu),
                anisotropy_clamp,
                border_color,
            }))
        })?;

        let id = SamplerId(self.next_id());
        lock(&self.internal.samplers).insert(
            id,
            WgpuSamplerEntry {
                wgpu_sampler: Arc::new(wgpu_sampler),
            },
        );
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        lock(&self.internal.samplers)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    // --- Command Operations ---

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        let encoder = self.with_encoder_device(|device| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label })
        });
        Box::new(WgpuCommandEncoder::new(encoder, self.clone()))
    }

    fn submit_command_buffer(
        &self,
        command_buffer: CommandBufferId,
    ) -> Result<SubmissionIndex, ResourceError> {
        let buffer = lock(&self.internal.pending_command_buffers)
            .remove(&command_buffer)
            .ok_or(ResourceError::NotFound)?;

        let index = self.internal.submitted.fetch_add(1, Ordering::AcqRel) + 1;
        let completed = Arc::clone(&self.internal.completed);
        self.with_wgpu_device(|_, queue| {
            queue.submit(std::iter::once(buffer));
            queue.on_submitted_work_done(move || {
                completed.fetch_max(index, Ordering::AcqRel);
            });
            Ok(())
        })?;
        Ok(SubmissionIndex(index))
    }

    // --- Swapchain ---

    fn swapchain_image_count(&self) -> u32 {
        lock(&self.internal.swapchain).images.len() as u32
    }

    fn swapchain_format(&self) -> RhiFormat {
        SWAPCHAIN_FORMAT
    }

    fn swapchain_extent(&self) -> Extent3d {
        lock(&self.internal.swapchain).extent
    }

    fn swapchain_image_view(&self, index: u32) -> Option<TextureViewId> {
        lock(&self.internal.swapchain)
            .images
            .get(index as usize)
            .map(|(_, view)| *view)
    }

    fn acquire_next_swapchain_image(&self) -> Result<u32, ResourceError> {
        let mut swapchain = lock(&self.internal.swapchain);
        let count = swapchain.images.len() as u32;
        if count == 0 {
            return Err(ResourceError::BackendError(
                "swapchain has no images".to_string(),
            ));
        }
        let index = swapchain.next % count;
        swapchain.next = (index + 1) % count;
        Ok(index)
    }

    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), ResourceError> {
        if width == 0 || height == 0 {
            log::warn!("WgpuDevice: ignoring swapchain resize to {width}x{height}");
            return Ok(());
        }
        // Images may still be in use by the queue.
        self.with_wgpu_device(|device, _| {
            device
                .poll(wgpu::PollType::wait_indefinitely())
                .map(|_| ())
                .map_err(|e| ResourceError::BackendError(format!("Device poll failed: {e:?}")))
        })?;
        let count = self.swapchain_image_count();
        self.build_swapchain_images(width, height, count)
    }

    fn read_texture(&self, texture_id: TextureId, layer: u32) -> Result<Vec<u8>, ResourceError> {
        let (texture, format, extent) = lock(&self.internal.textures)
            .get(&texture_id)
            .map(|entry| (Arc::clone(&entry.wgpu_texture), entry.format, entry.extent))
            .ok_or(ResourceError::NotFound)?;
        if layer >= extent.depth_or_array_layers {
            return Err(ResourceError::OutOfBounds);
        }

        let row_bytes = extent.width * format.bytes_per_pixel();
        let padded_row = row_bytes.next_multiple_of(COPY_ROW_ALIGNMENT);
        let staging_size = padded_row as u64 * extent.height as u64;

        self.with_wgpu_device(|device, queue| {
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("texture readback"),
                size: staging_size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture readback"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(extent.height),
                    },
                },
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: 1,
                },
            );
            queue.submit(std::iter::once(encoder.finish()));

            let (sender, receiver) = mpsc::channel();
            let slice = staging.slice(..);
            slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
            device
                .poll(wgpu::PollType::wait_indefinitely())
                .map_err(|e| ResourceError::BackendError(format!("Device poll failed: {e:?}")))?;
            receiver
                .recv()
                .map_err(|e| ResourceError::BackendError(format!("Readback dropped: {e}")))?
                .map_err(|e| ResourceError::BackendError(format!("Readback failed: {e:?}")))?;

            let mut pixels = Vec::with_capacity((row_bytes * extent.height) as usize);
            {
                let mapped = slice.get_mapped_range();
                for row in mapped.chunks(padded_row as usize) {
                    pixels.extend_from_slice(&row[..row_bytes as usize]);
                }
            }
            staging.unmap();
            Ok(pixels)
        })
    }

    // --- Device Info ---

    fn adapter_info(&self) -> RendererAdapterInfo {
        self.internal.adapter_info.clone()
    }

    fn supports_feature(&self, feature: DeviceFeature) -> bool {
        let features = self.internal.features;
        match feature {
            DeviceFeature::PushConstants | DeviceFeature::GeometryShader => false,
            DeviceFeature::PolygonModeLine => features.contains(wgpu::Features::POLYGON_MODE_LINE),
            DeviceFeature::PolygonModePoint => {
                features.contains(wgpu::Features::POLYGON_MODE_POINT)
            }
            DeviceFeature::AddressModeClampToBorder => {
                features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
