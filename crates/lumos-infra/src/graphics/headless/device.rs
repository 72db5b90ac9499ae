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

use lumos_core::math::LinearRgba;
use lumos_core::renderer::api::*;
use lumos_core::renderer::traits::{CommandEncoder, GraphicsDevice, SubmissionTracker};
use lumos_core::renderer::{PipelineError, ResourceError, ShaderError};
use lumos_core::RendererConfig;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::command::{HeadlessCommand, HeadlessEncoder, RecordedBuffer, RecordedSubmission};

/// Format of the headless swapchain images.
const SWAPCHAIN_FORMAT: RhiFormat = RhiFormat::R8G8B8A8Srgb;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Settings of a [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessConfig {
    /// Swapchain width.
    pub width: u32,
    /// Swapchain height.
    pub height: u32,
    /// Images in the swapchain ring.
    pub swapchain_images: u32,
    /// Capabilities reported by `supports_feature`.
    pub features: Vec<DeviceFeature>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            swapchain_images: 3,
            // The emulated GL 4.x context supports all of them.
            features: vec![
                DeviceFeature::PushConstants,
                DeviceFeature::PolygonModeLine,
                DeviceFeature::PolygonModePoint,
                DeviceFeature::GeometryShader,
                DeviceFeature::AddressModeClampToBorder,
            ],
        }
    }
}

impl HeadlessConfig {
    /// Swapchain settings taken from a renderer config, every feature on.
    pub fn from_renderer_config(config: &RendererConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            swapchain_images: config.swapchain_images.max(1),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct ModuleEntry {
    stage: ShaderStage,
}

#[derive(Debug)]
pub(crate) struct GroupEntry {
    pub(crate) layout: BindGroupLayoutId,
    pub(crate) entries: Vec<BindGroupEntry>,
}

#[derive(Debug)]
struct LayoutEntry {
    sets: Vec<BindGroupLayoutId>,
}

#[derive(Debug)]
pub(crate) struct PipelineEntry {
    layout: Option<PipelineLayoutId>,
}

#[derive(Debug)]
struct BufferEntry {
    data: Vec<u8>,
}

#[derive(Debug)]
struct TextureEntry {
    format: RhiFormat,
    extent: Extent3d,
    /// Mip 0 of every layer, layer after layer.
    data: Vec<u8>,
}

impl TextureEntry {
    fn layer_size(&self) -> usize {
        (self.extent.width * self.extent.height * self.format.bytes_per_pixel()) as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct ViewEntry {
    texture: TextureId,
    base_layer: u32,
    layer_count: u32,
}

/// Shared state of a headless device and its encoders.
#[derive(Debug, Default)]
pub(crate) struct HeadlessState {
    next_id: usize,
    modules: HashMap<ShaderModuleId, ModuleEntry>,
    pub(crate) bind_group_layouts: HashMap<BindGroupLayoutId, Vec<BindGroupLayoutEntry>>,
    pub(crate) bind_groups: HashMap<BindGroupId, GroupEntry>,
    pipeline_layouts: HashMap<PipelineLayoutId, LayoutEntry>,
    pub(crate) pipelines: HashMap<RenderPipelineId, PipelineEntry>,
    buffers: HashMap<BufferId, BufferEntry>,
    textures: HashMap<TextureId, TextureEntry>,
    views: HashMap<TextureViewId, ViewEntry>,
    samplers: HashMap<SamplerId, ()>,
    pub(crate) next_command_buffer: u64,
    pub(crate) pending: HashMap<CommandBufferId, RecordedBuffer>,
    submitted: u64,
    submissions: Vec<RecordedSubmission>,
    swapchain: Vec<(TextureId, TextureViewId)>,
    swapchain_extent: Extent3d,
    next_image: u32,
}

impl HeadlessState {
    fn next(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    /// Layout entries of every set of a pipeline, in set order.
    pub(crate) fn pipeline_set_layouts(
        &self,
        pipeline: RenderPipelineId,
    ) -> Option<Vec<Vec<BindGroupLayoutEntry>>> {
        let entry = self.pipelines.get(&pipeline)?;
        let Some(layout) = entry.layout else {
            return Some(Vec::new());
        };
        let layout = self.pipeline_layouts.get(&layout)?;
        layout
            .sets
            .iter()
            .map(|id| self.bind_group_layouts.get(id).cloned())
            .collect()
    }

    fn clear_view(&mut self, view: TextureViewId, texel: &[u8]) {
        let Some(view) = self.views.get(&view).copied() else {
            log::warn!("HeadlessDevice: clear of unknown view {view:?}");
            return;
        };
        let Some(texture) = self.textures.get_mut(&view.texture) else {
            return;
        };
        if texel.len() != texture.format.bytes_per_pixel() as usize {
            return;
        }
        let layer_size = texture.layer_size();
        let start = view.base_layer as usize * layer_size;
        let end = (start + view.layer_count as usize * layer_size).min(texture.data.len());
        for chunk in texture.data[start..end].chunks_exact_mut(texel.len()) {
            chunk.copy_from_slice(texel);
        }
    }

    fn view_format(&self, view: TextureViewId) -> Option<RhiFormat> {
        let view = self.views.get(&view)?;
        self.textures.get(&view.texture).map(|t| t.format)
    }

    /// Applies the memory side effects of a submitted command list.
    fn execute(&mut self, commands: &[HeadlessCommand]) {
        for command in commands {
            match command {
                HeadlessCommand::BeginPass {
                    colour,
                    depth,
                    depth_clear,
                    ..
                } => {
                    for (view, load) in colour {
                        if let LoadOp::Clear(colour) = load {
                            if let Some(texel) =
                                self.view_format(*view).and_then(|f| colour_texel(f, *colour))
                            {
                                self.clear_view(*view, &texel);
                            }
                        }
                    }
                    if let (Some(view), Some(value)) = (depth, depth_clear) {
                        if let Some(texel) =
                            self.view_format(*view).and_then(|f| depth_texel(f, *value))
                        {
                            self.clear_view(*view, &texel);
                        }
                    }
                }
                HeadlessCommand::CopyBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => {
                    let Some(bytes) = self.buffers.get(source).and_then(|b| {
                        let start = *source_offset as usize;
                        b.data.get(start..start + *size as usize).map(<[u8]>::to_vec)
                    }) else {
                        log::warn!("HeadlessDevice: copy from {source:?} out of bounds");
                        continue;
                    };
                    let Some(target) = self.buffers.get_mut(destination).and_then(|b| {
                        let start = *destination_offset as usize;
                        b.data.get_mut(start..start + *size as usize)
                    }) else {
                        log::warn!("HeadlessDevice: copy into {destination:?} out of bounds");
                        continue;
                    };
                    target.copy_from_slice(&bytes);
                }
                _ => {}
            }
        }
    }
}

/// Encodes a clear colour in a colour format. `None` for formats the
/// emulation does not write.
fn colour_texel(format: RhiFormat, colour: LinearRgba) -> Option<Vec<u8>> {
    let [r, g, b, a] = colour.to_array();
    let texel = match format {
        RhiFormat::R8G8B8A8Unorm => colour.to_rgba8().to_vec(),
        RhiFormat::R8G8B8A8Srgb => colour.to_srgba8().to_vec(),
        RhiFormat::B8G8R8A8Unorm => {
            let [r, g, b, a] = colour.to_rgba8();
            vec![b, g, r, a]
        }
        RhiFormat::B8G8R8A8Srgb => {
            let [r, g, b, a] = colour.to_srgba8();
            vec![b, g, r, a]
        }
        RhiFormat::R8Unorm => vec![colour.to_rgba8()[0]],
        RhiFormat::R32Float => r.to_le_bytes().to_vec(),
        RhiFormat::R32G32B32A32Float => [r, g, b, a]
            .iter()
            .flat_map(|c| c.to_le_bytes())
            .collect(),
        _ => return None,
    };
    Some(texel)
}

fn depth_texel(format: RhiFormat, depth: f32) -> Option<Vec<u8>> {
    match format {
        RhiFormat::D32Float => Some(depth.to_le_bytes().to_vec()),
        RhiFormat::D16Unorm => {
            let value = (depth.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
            Some(value.to_le_bytes().to_vec())
        }
        _ => None,
    }
}

fn binding_accepts(ty: &BindingType, resource: &BindingResource) -> bool {
    matches!(
        (ty, resource),
        (BindingType::UniformBuffer { .. }, BindingResource::Buffer(_))
            | (BindingType::Texture { .. }, BindingResource::TextureView(_))
            | (BindingType::Sampler(_), BindingResource::Sampler(_))
    )
}

/// A device that runs entirely on the CPU.
///
/// Every submission is recorded and can be inspected with
/// [`submissions`](Self::submissions); buffer and texture memory is real, so
/// uploads, clears and buffer copies can be checked byte for byte.
#[derive(Debug)]
pub struct HeadlessDevice {
    state: Arc<Mutex<HeadlessState>>,
    features: Vec<DeviceFeature>,
}

impl HeadlessDevice {
    /// Creates the device and its swapchain images.
    pub fn new(config: HeadlessConfig) -> Self {
        let device = Self {
            state: Arc::default(),
            features: config.features,
        };
        device.build_swapchain(config.width.max(1), config.height.max(1), config.swapchain_images);
        log::info!(
            "HeadlessDevice: created with {} swapchain image(s) of {}x{}",
            config.swapchain_images,
            config.width,
            config.height
        );
        device
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        lock(&self.state)
    }

    fn build_swapchain(&self, width: u32, height: u32, count: u32) {
        let mut state = self.lock();
        for (texture, view) in std::mem::take(&mut state.swapchain) {
            state.views.remove(&view);
            state.textures.remove(&texture);
        }
        let extent = Extent3d::d2(width, height);
        for _ in 0..count {
            let texture = TextureId(state.next());
            let size = (width * height * SWAPCHAIN_FORMAT.bytes_per_pixel()) as usize;
            state.textures.insert(
                texture,
                TextureEntry {
                    format: SWAPCHAIN_FORMAT,
                    extent,
                    data: vec![0; size],
                },
            );
            let view = TextureViewId(state.next());
            state.views.insert(
                view,
                ViewEntry {
                    texture,
                    base_layer: 0,
                    layer_count: 1,
                },
            );
            state.swapchain.push((texture, view));
        }
        state.swapchain_extent = extent;
        state.next_image = 0;
    }

    /// Every submission so far, oldest first.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.lock().submissions.clone()
    }

    /// The most recent submission.
    pub fn last_submission(&self) -> Option<RecordedSubmission> {
        self.lock().submissions.last().cloned()
    }

    /// Forgets recorded submissions, keeping resources.
    pub fn clear_submissions(&self) {
        self.lock().submissions.clear();
    }

    /// Draw calls across all recorded submissions.
    pub fn draw_call_count(&self) -> usize {
        self.lock()
            .submissions
            .iter()
            .map(RecordedSubmission::draw_count)
            .sum()
    }

    /// Current bytes of a buffer.
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.lock().buffers.get(&id).map(|b| b.data.clone())
    }

    /// Texture a view was created from.
    pub fn view_texture(&self, id: TextureViewId) -> Option<TextureId> {
        self.lock().views.get(&id).map(|v| v.texture)
    }

    /// Resources that have not been destroyed, swapchain images included.
    pub fn live_resource_count(&self) -> usize {
        let s = self.lock();
        s.modules.len()
            + s.bind_group_layouts.len()
            + s.bind_groups.len()
            + s.pipeline_layouts.len()
            + s.pipelines.len()
            + s.buffers.len()
            + s.textures.len()
            + s.views.len()
            + s.samplers.len()
    }

    /// Render pipelines alive.
    pub fn pipeline_count(&self) -> usize {
        self.lock().pipelines.len()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl SubmissionTracker for HeadlessDevice {
    fn poll_submission(&self, index: SubmissionIndex) -> bool {
        index.0 <= self.lock().submitted
    }

    fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), ResourceError> {
        if self.poll_submission(index) {
            Ok(())
        } else {
            Err(ResourceError::BackendError(format!(
                "submission {} was never made",
                index.0
            )))
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        if descriptor.stage == ShaderStage::Geometry
            && !self.supports_feature(DeviceFeature::GeometryShader)
        {
            return Err(ShaderError::UnsupportedStage {
                label: descriptor.label.unwrap_or("unnamed").to_string(),
                stage: descriptor.stage,
            }
            .into());
        }
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        if source.trim().is_empty() {
            return Err(ShaderError::CompilationError {
                label: descriptor.label.unwrap_or("unnamed").to_string(),
                details: "empty source".to_string(),
            }
            .into());
        }
        let mut state = self.lock();
        let id = ShaderModuleId(state.next());
        state.modules.insert(
            id,
            ModuleEntry {
                stage: descriptor.stage,
            },
        );
        log::debug!(
            "HeadlessDevice: Created {} shader module '{:?}' with ID: {:?}",
            descriptor.stage,
            descriptor.label,
            id
        );
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.lock()
            .modules
            .remove(&id)
            .map(|_| ())
            .ok_or(ShaderError::NotFound { id }.into())
    }

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let mut seen = Vec::with_capacity(descriptor.entries.len());
        for entry in descriptor.entries {
            if seen.contains(&entry.binding) {
                return Err(ResourceError::DuplicateBinding {
                    binding: entry.binding,
                });
            }
            seen.push(entry.binding);
        }
        let mut state = self.lock();
        let id = BindGroupLayoutId(state.next());
        state
            .bind_group_layouts
            .insert(id, descriptor.entries.to_vec());
        Ok(id)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        self.lock()
            .bind_group_layouts
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_bind_group(&self, descriptor: &BindGroupDescriptor) -> Result<BindGroupId, ResourceError> {
        let mut state = self.lock();
        let layout = state
            .bind_group_layouts
            .get(&descriptor.layout)
            .ok_or(ResourceError::NotFound)?;

        for (i, entry) in descriptor.entries.iter().enumerate() {
            if descriptor.entries[..i]
                .iter()
                .any(|other| other.binding == entry.binding)
            {
                return Err(ResourceError::DuplicateBinding {
                    binding: entry.binding,
                });
            }
            let declared = layout
                .iter()
                .find(|l| l.binding == entry.binding)
                .ok_or_else(|| {
                    ResourceError::InvalidDescriptor(format!(
                        "binding {} is not part of the layout",
                        entry.binding
                    ))
                })?;
            if !binding_accepts(&declared.ty, &entry.resource) {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "binding {} cannot hold {:?}",
                    entry.binding, entry.resource
                )));
            }
            match entry.resource {
                BindingResource::Buffer(binding) => {
                    let buffer = state
                        .buffers
                        .get(&binding.buffer)
                        .ok_or(ResourceError::NotFound)?;
                    let end = binding.offset + binding.size.unwrap_or(0);
                    if end > buffer.data.len() as u64 {
                        return Err(ResourceError::OutOfBounds);
                    }
                }
                BindingResource::TextureView(view) => {
                    if !state.views.contains_key(&view) {
                        return Err(ResourceError::NotFound);
                    }
                }
                BindingResource::Sampler(sampler) => {
                    if !state.samplers.contains_key(&sampler) {
                        return Err(ResourceError::NotFound);
                    }
                }
            }
        }

        let id = BindGroupId(state.next());
        state.bind_groups.insert(
            id,
            GroupEntry {
                layout: descriptor.layout,
                entries: descriptor.entries.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        self.lock()
            .bind_groups
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        if !descriptor.push_constant_ranges.is_empty()
            && !self.supports_feature(DeviceFeature::PushConstants)
        {
            return Err(PipelineError::FeatureNotSupported("push constants".to_string()).into());
        }
        let mut state = self.lock();
        if let Some(missing) = descriptor
            .bind_group_layouts
            .iter()
            .find(|id| !state.bind_group_layouts.contains_key(id))
        {
            return Err(PipelineError::LayoutCreationFailed(format!(
                "bind group layout {missing:?} does not exist"
            ))
            .into());
        }
        let id = PipelineLayoutId(state.next());
        state.pipeline_layouts.insert(
            id,
            LayoutEntry {
                sets: descriptor.bind_group_layouts.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError> {
        self.lock()
            .pipeline_layouts
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let pipeline_label = descriptor.label.as_ref().map(|l| l.to_string());
        let polygon_ok = match descriptor.primitive_state.polygon_mode {
            PolygonMode::Fill => true,
            PolygonMode::Line => self.supports_feature(DeviceFeature::PolygonModeLine),
            PolygonMode::Point => self.supports_feature(DeviceFeature::PolygonModePoint),
        };
        if !polygon_ok {
            return Err(PipelineError::FeatureNotSupported(format!(
                "polygon mode {:?}",
                descriptor.primitive_state.polygon_mode
            ))
            .into());
        }
        if let Some(ds) = &descriptor.depth_stencil_state {
            if !ds.format.is_depth() {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "{:?} is not a depth format",
                    ds.format
                )));
            }
        }

        let mut state = self.lock();
        let expect_stage = |id: ShaderModuleId, stage: ShaderStage| {
            match state.modules.get(&id) {
                Some(module) if module.stage == stage => Ok(()),
                _ => Err(ResourceError::Pipeline(
                    PipelineError::InvalidShaderModuleForPipeline {
                        id,
                        pipeline_label: pipeline_label.clone(),
                    },
                )),
            }
        };
        expect_stage(descriptor.vertex_shader_module, ShaderStage::Vertex)?;
        if let Some(fragment) = descriptor.fragment_shader_module {
            expect_stage(fragment, ShaderStage::Fragment)?;
        }
        if let Some(layout) = descriptor.layout {
            if !state.pipeline_layouts.contains_key(&layout) {
                return Err(ResourceError::NotFound);
            }
        }

        let id = RenderPipelineId(state.next());
        state.pipelines.insert(
            id,
            PipelineEntry {
                layout: descriptor.layout,
            },
        );
        log::debug!(
            "HeadlessDevice: Created render pipeline '{:?}' with ID: {:?}",
            pipeline_label,
            id
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.lock()
            .pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(PipelineError::InvalidRenderPipeline { id }.into())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let mut state = self.lock();
        let id = BufferId(state.next());
        state.buffers.insert(
            id,
            BufferEntry {
                data: vec![0; descriptor.size as usize],
            },
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
        let mut bytes = data.to_vec();
        bytes.resize(descriptor.size as usize, 0);
        let mut state = self.lock();
        let id = BufferId(state.next());
        state.buffers.insert(id, BufferEntry { data: bytes });
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.lock()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.lock();
        let buffer = state.buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let target = buffer
            .data
            .get_mut(start..start + data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        if descriptor.size.width == 0 || descriptor.size.height == 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "texture '{:?}' has a zero dimension",
                descriptor.label
            )));
        }
        let size = descriptor.base_level_size_in_bytes() as usize;
        let mut state = self.lock();
        let id = TextureId(state.next());
        state.textures.insert(
            id,
            TextureEntry {
                format: descriptor.format,
                extent: descriptor.size,
                data: vec![0; size],
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.lock()
            .textures
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_texture(
        &self,
        texture_id: TextureId,
        data: &[u8],
        layout: TextureDataLayout,
        origin: Origin3d,
        size: Extent3d,
    ) -> Result<(), ResourceError> {
        let mut state = self.lock();
        let texture = state
            .textures
            .get_mut(&texture_id)
            .ok_or(ResourceError::NotFound)?;
        let extent = texture.extent;
        if origin.x + size.width > extent.width
            || origin.y + size.height > extent.height
            || origin.z + size.depth_or_array_layers > extent.depth_or_array_layers
        {
            return Err(ResourceError::OutOfBounds);
        }

        let bpp = texture.format.bytes_per_pixel() as usize;
        let row_bytes = size.width as usize * bpp;
        let src_row_pitch = layout.bytes_per_row.map_or(row_bytes, |b| b as usize);
        let src_rows = layout.rows_per_image.unwrap_or(size.height) as usize;
        let layers = size.depth_or_array_layers as usize;
        let required = if size.height == 0 || layers == 0 {
            0
        } else {
            (layers - 1) * src_rows * src_row_pitch + (size.height as usize - 1) * src_row_pitch
                + row_bytes
        };
        if data.len() < required {
            return Err(ResourceError::DataSizeMismatch {
                expected: required,
                actual: data.len(),
            });
        }

        let layer_size = texture.layer_size();
        let dst_row_pitch = extent.width as usize * bpp;
        for layer in 0..layers {
            for row in 0..size.height as usize {
                let src = layer * src_rows * src_row_pitch + row * src_row_pitch;
                let dst = (origin.z as usize + layer) * layer_size
                    + (origin.y as usize + row) * dst_row_pitch
                    + origin.x as usize * bpp;
                texture.data[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
            }
        }
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let mut state = self.lock();
        let layers = state
            .textures
            .get(&texture_id)
            .ok_or(ResourceError::NotFound)?
            .extent
            .depth_or_array_layers;
        let layer_count = descriptor
            .array_layer_count
            .unwrap_or(layers.saturating_sub(descriptor.base_array_layer));
        if layer_count == 0 || descriptor.base_array_layer + layer_count > layers {
            return Err(ResourceError::OutOfBounds);
        }
        let id = TextureViewId(state.next());
        state.views.insert(
            id,
            ViewEntry {
                texture: texture_id,
                base_layer: descriptor.base_array_layer,
                layer_count,
            },
        );
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.lock()
            .views
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let uses_border = [
            descriptor.address_mode_u,
            descriptor.address_mode_v,
            descriptor.address_mode_w,
        ]
        .contains(&AddressMode::ClampToBorder);
        if uses_border && !self.supports_feature(DeviceFeature::AddressModeClampToBorder) {
            return Err(ResourceError::InvalidDescriptor(
                "ClampToBorder is not supported".to_string(),
            ));
        }
        let mut state = self.lock();
        let id = SamplerId(state.next());
        state.samplers.insert(id, ());
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        self.lock()
            .samplers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessEncoder::new(Arc::clone(&self.state), label))
    }

    fn submit_command_buffer(
        &self,
        command_buffer: CommandBufferId,
    ) -> Result<SubmissionIndex, ResourceError> {
        let mut state = self.lock();
        let recorded = state
            .pending
            .remove(&command_buffer)
            .ok_or(ResourceError::NotFound)?;
        state.execute(&recorded.commands);
        state.submitted += 1;
        let index = SubmissionIndex(state.submitted);
        state.submissions.push(RecordedSubmission {
            index,
            label: recorded.label,
            commands: recorded.commands,
        });
        Ok(index)
    }

    fn swapchain_image_count(&self) -> u32 {
        self.lock().swapchain.len() as u32
    }

    fn swapchain_format(&self) -> RhiFormat {
        SWAPCHAIN_FORMAT
    }

    fn swapchain_extent(&self) -> Extent3d {
        self.lock().swapchain_extent
    }

    fn swapchain_image_view(&self, index: u32) -> Option<TextureViewId> {
        self.lock()
            .swapchain
            .get(index as usize)
            .map(|(_, view)| *view)
    }

    fn acquire_next_swapchain_image(&self) -> Result<u32, ResourceError> {
        let mut state = self.lock();
        let count = state.swapchain.len() as u32;
        if count == 0 {
            return Err(ResourceError::BackendError(
                "swapchain has no images".to_string(),
            ));
        }
        let index = state.next_image % count;
        state.next_image = (index + 1) % count;
        Ok(index)
    }

    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), ResourceError> {
        if width == 0 || height == 0 {
            log::warn!("HeadlessDevice: ignoring swapchain resize to {width}x{height}");
            return Ok(());
        }
        let count = self.swapchain_image_count();
        self.build_swapchain(width, height, count);
        Ok(())
    }

    fn read_texture(&self, texture_id: TextureId, layer: u32) -> Result<Vec<u8>, ResourceError> {
        let state = self.lock();
        let texture = state
            .textures
            .get(&texture_id)
            .ok_or(ResourceError::NotFound)?;
        if layer >= texture.extent.depth_or_array_layers {
            return Err(ResourceError::OutOfBounds);
        }
        let size = texture.layer_size();
        let start = layer as usize * size;
        Ok(texture.data[start..start + size].to_vec())
    }

    fn adapter_info(&self) -> RendererAdapterInfo {
        RendererAdapterInfo {
            name: "Lumos Headless".to_string(),
            backend_type: GraphicsBackendType::Headless,
            device_type: RendererDeviceType::Cpu,
        }
    }

    fn supports_feature(&self, feature: DeviceFeature) -> bool {
        self.features.contains(&feature)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumos_core::renderer::shader::{FlatBinding, FlatBindingKind};

    fn small() -> HeadlessDevice {
        HeadlessDevice::new(HeadlessConfig {
            width: 4,
            height: 2,
            swapchain_images: 2,
            ..Default::default()
        })
    }

    fn wgsl(stage: ShaderStage) -> ShaderModuleDescriptor<'static> {
        ShaderModuleDescriptor {
            label: Some("test"),
            stage,
            source: ShaderSourceData::Wgsl("@vertex fn main() {}".into()),
            entry_point: "main",
        }
    }

    fn uniform(binding: u32, dynamic: bool) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer {
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
        }
    }

    fn pipeline(device: &HeadlessDevice, sets: &[BindGroupLayoutId]) -> RenderPipelineId {
        let vs = device.create_shader_module(&wgsl(ShaderStage::Vertex)).unwrap();
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: sets,
                push_constant_ranges: &[],
            })
            .unwrap();
        device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("test".into()),
                layout: Some(layout),
                vertex_shader_module: vs,
                vertex_entry_point: "main".into(),
                fragment_shader_module: None,
                fragment_entry_point: None,
                vertex_buffers_layout: Vec::new().into(),
                primitive_state: PrimitiveState::default(),
                depth_stencil_state: None,
                color_target_states: Vec::new().into(),
                sample_count: 1,
            })
            .unwrap()
    }

    #[test]
    fn swapchain_ring_rotates_and_resizes() {
        let device = small();
        assert_eq!(device.swapchain_image_count(), 2);
        assert_eq!(device.acquire_next_swapchain_image().unwrap(), 0);
        assert_eq!(device.acquire_next_swapchain_image().unwrap(), 1);
        assert_eq!(device.acquire_next_swapchain_image().unwrap(), 0);

        let before = device.swapchain_image_view(0).unwrap();
        device.resize_swapchain(8, 8).unwrap();
        assert_eq!(device.swapchain_extent(), Extent3d::d2(8, 8));
        assert_ne!(device.swapchain_image_view(0).unwrap(), before);
        assert!(device.view_texture(before).is_none());
    }

    #[test]
    fn writes_outside_a_buffer_are_rejected() {
        let device = small();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::UNIFORM,
                mapped_at_creation: false,
            })
            .unwrap();
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            device.write_buffer(buffer, 6, &[0; 4]),
            Err(ResourceError::OutOfBounds)
        ));
        assert_eq!(device.buffer_contents(buffer).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn texture_region_upload_lands_in_the_right_layer() {
        let device = small();
        let texture = device
            .create_texture(&TextureDescriptor {
                label: None,
                size: Extent3d {
                    width: 2,
                    height: 2,
                    depth_or_array_layers: 2,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: RhiFormat::R8Unorm,
                usage: TextureUsage::COPY_DST,
            })
            .unwrap();
        device
            .write_texture(
                texture,
                &[7, 9],
                TextureDataLayout {
                    bytes_per_row: Some(1),
                    rows_per_image: Some(2),
                },
                Origin3d { x: 1, y: 0, z: 1 },
                Extent3d {
                    width: 1,
                    height: 2,
                    depth_or_array_layers: 1,
                },
            )
            .unwrap();
        assert_eq!(device.read_texture(texture, 0).unwrap(), vec![0; 4]);
        assert_eq!(device.read_texture(texture, 1).unwrap(), vec![0, 7, 0, 9]);
    }

    #[test]
    fn geometry_modules_need_the_feature() {
        let device = HeadlessDevice::new(HeadlessConfig {
            features: Vec::new(),
            ..Default::default()
        });
        let err = device
            .create_shader_module(&wgsl(ShaderStage::Geometry))
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Shader(ShaderError::UnsupportedStage { .. })
        ));
        assert!(small().create_shader_module(&wgsl(ShaderStage::Geometry)).is_ok());
    }

    #[test]
    fn bind_groups_resolve_to_flat_slots() {
        let device = small();
        let set0 = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: &[uniform(0, false), uniform(1, true)],
            })
            .unwrap();
        let set1 = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: &[
                    BindGroupLayoutEntry {
                        binding: 2,
                        visibility: ShaderStageFlags::FRAGMENT,
                        ty: BindingType::Texture {
                            sample_type: TextureSampleType::Float { filterable: true },
                            view_dimension: TextureViewDimension::D2,
                            multisampled: false,
                        },
                    },
                    uniform(0, false),
                ],
            })
            .unwrap();
        let pipeline = pipeline(&device, &[set0, set1]);

        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 512,
                usage: BufferUsage::UNIFORM,
                mapped_at_creation: false,
            })
            .unwrap();
        let view = device.swapchain_image_view(1).unwrap();
        let whole = |buffer| {
            BindingResource::Buffer(BufferBinding {
                buffer,
                offset: 0,
                size: Some(64),
            })
        };
        let group0 = device
            .create_bind_group(&BindGroupDescriptor {
                label: None,
                layout: set0,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: whole(buffer),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: whole(buffer),
                    },
                ],
            })
            .unwrap();
        let group1 = device
            .create_bind_group(&BindGroupDescriptor {
                label: None,
                layout: set1,
                entries: &[
                    BindGroupEntry {
                        binding: 2,
                        resource: BindingResource::TextureView(view),
                    },
                    BindGroupEntry {
                        binding: 0,
                        resource: whole(buffer),
                    },
                ],
            })
            .unwrap();

        let mut encoder = device.create_command_encoder(Some("flat"));
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("main"),
                color_attachments: &[],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, group0, &[256]);
            pass.set_bind_group(1, group1, &[]);
            // Wrong number of dynamic offsets: skipped.
            pass.set_bind_group(0, group0, &[]);
            pass.draw(0..3, 0..1);
        }
        let index = device.submit_command_buffer(encoder.finish()).unwrap();
        assert!(device.poll_submission(index));

        let submission = device.last_submission().unwrap();
        let binds: Vec<(u32, u32, FlatBinding, Option<u32>)> = submission
            .commands
            .iter()
            .filter_map(|c| match c {
                HeadlessCommand::BindFlat {
                    set,
                    binding,
                    slot,
                    dynamic_offset,
                    ..
                } => Some((*set, *binding, *slot, *dynamic_offset)),
                _ => None,
            })
            .collect();
        let block = |slot| FlatBinding {
            kind: FlatBindingKind::UniformBlock,
            slot,
        };
        assert_eq!(
            binds,
            vec![
                (0, 0, block(0), None),
                (0, 1, block(1), Some(256)),
                (1, 0, block(2), None),
                (
                    1,
                    2,
                    FlatBinding {
                        kind: FlatBindingKind::TextureUnit,
                        slot: 18
                    },
                    None
                ),
            ]
        );
        assert_eq!(submission.draw_count(), 1);
        assert_eq!(submission.commands.last(), Some(&HeadlessCommand::EndPass));
    }

    #[test]
    fn bind_group_entries_must_match_the_layout() {
        let device = small();
        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: &[uniform(0, false)],
            })
            .unwrap();
        let view = device.swapchain_image_view(0).unwrap();
        let err = device
            .create_bind_group(&BindGroupDescriptor {
                label: None,
                layout,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(view),
                }],
            })
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidDescriptor(_)));
    }

    #[test]
    fn clears_and_copies_are_applied_on_submit() {
        let device = small();
        let view = device.swapchain_image_view(0).unwrap();
        let texture = device.view_texture(view).unwrap();
        let src = device
            .create_buffer_with_data(
                &BufferDescriptor {
                    label: None,
                    size: 4,
                    usage: BufferUsage::COPY_SRC,
                    mapped_at_creation: false,
                },
                &[1, 2, 3, 4],
            )
            .unwrap();
        let dst = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .unwrap();

        let mut encoder = device.create_command_encoder(None);
        {
            let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: Operations::clear(LinearRgba::RED),
                }],
                depth_stencil_attachment: None,
            });
        }
        encoder.copy_buffer_to_buffer(src, 0, dst, 4, 4);
        let command_buffer = encoder.finish();

        // Nothing happens before submission.
        assert_eq!(device.read_texture(texture, 0).unwrap()[..4], [0, 0, 0, 0]);
        device.submit_command_buffer(command_buffer).unwrap();

        let pixels = device.read_texture(texture, 0).unwrap();
        assert_eq!(pixels.len(), 4 * 2 * 4);
        assert!(pixels.chunks(4).all(|p| p == [255, 0, 0, 255]));
        assert_eq!(device.buffer_contents(dst).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn unknown_submissions_are_not_complete() {
        let device = small();
        assert!(!device.poll_submission(SubmissionIndex(1)));
        assert!(device.wait_for_submission(SubmissionIndex(1)).is_err());
        let encoder = device.create_command_encoder(None);
        let index = device.submit_command_buffer(encoder.finish()).unwrap();
        assert_eq!(index, SubmissionIndex(1));
        device.wait_for_submission(index).unwrap();
    }
}
