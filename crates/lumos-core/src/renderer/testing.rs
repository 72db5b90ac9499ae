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

//! In-memory device used by unit tests.

use crate::renderer::api::*;
use crate::renderer::error::{PipelineError, ResourceError};
use crate::renderer::traits::{CommandEncoder, GraphicsDevice, RenderPass, SubmissionTracker};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

/// A command seen by the mock encoder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCommand {
    BeginPass {
        label: Option<String>,
        colour: Vec<TextureViewId>,
        depth: Option<TextureViewId>,
    },
    SetPipeline(RenderPipelineId),
    SetBindGroup {
        index: u32,
        group: BindGroupId,
        offsets: Vec<u32>,
    },
    SetVertexBuffer(u32, BufferId),
    SetIndexBuffer(BufferId),
    PushConstants(u32, Vec<u8>),
    Draw(Range<u32>, Range<u32>),
    DrawIndexed(Range<u32>, Range<u32>),
    EndPass,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    buffers: HashMap<usize, Vec<u8>>,
    textures: HashMap<usize, HashMap<u32, Vec<u8>>>,
    views: HashSet<usize>,
    samplers: HashSet<usize>,
    modules: HashSet<usize>,
    bind_group_layouts: HashSet<usize>,
    bind_groups: HashMap<usize, Vec<BindGroupEntry>>,
    pipeline_layouts: HashSet<usize>,
    pipelines: HashSet<usize>,
    commands: Vec<MockCommand>,
    submissions: u64,
}

impl MockState {
    fn next(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

/// Device that keeps every resource in memory and records commands.
#[derive(Debug, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<MockState>>,
    features: Vec<DeviceFeature>,
}

impl MockDevice {
    /// A mock plus the same device as a trait object.
    pub(crate) fn shared() -> (Arc<MockDevice>, Arc<dyn GraphicsDevice>) {
        Self::with_features(Vec::new())
    }

    pub(crate) fn with_features(
        features: Vec<DeviceFeature>,
    ) -> (Arc<MockDevice>, Arc<dyn GraphicsDevice>) {
        let mock = Arc::new(MockDevice {
            state: Arc::default(),
            features,
        });
        let device: Arc<dyn GraphicsDevice> = mock.clone();
        (mock, device)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn buffer_data(&self, id: BufferId) -> Option<Vec<u8>> {
        self.lock().buffers.get(&id.0).cloned()
    }

    pub(crate) fn texture_data(&self, id: TextureId) -> Option<Vec<u8>> {
        self.texture_layer(id, 0)
    }

    pub(crate) fn texture_layer(&self, id: TextureId, layer: u32) -> Option<Vec<u8>> {
        self.lock()
            .textures
            .get(&id.0)
            .and_then(|layers| layers.get(&layer).cloned())
    }

    pub(crate) fn bind_group_entries(&self, id: BindGroupId) -> Option<Vec<BindGroupEntry>> {
        self.lock().bind_groups.get(&id.0).cloned()
    }

    pub(crate) fn commands(&self) -> Vec<MockCommand> {
        self.lock().commands.clone()
    }

    pub(crate) fn pipeline_count(&self) -> usize {
        self.lock().pipelines.len()
    }

    /// Every object that has not been destroyed.
    pub(crate) fn live_objects(&self) -> usize {
        let s = self.lock();
        s.buffers.len()
            + s.textures.len()
            + s.views.len()
            + s.samplers.len()
            + s.modules.len()
            + s.bind_group_layouts.len()
            + s.bind_groups.len()
            + s.pipeline_layouts.len()
            + s.pipelines.len()
    }
}

fn remove(set: &mut HashSet<usize>, id: usize) -> Result<(), ResourceError> {
    if set.remove(&id) {
        Ok(())
    } else {
        Err(ResourceError::NotFound)
    }
}

impl SubmissionTracker for MockDevice {
    fn poll_submission(&self, _index: SubmissionIndex) -> bool {
        true
    }

    fn wait_for_submission(&self, _index: SubmissionIndex) -> Result<(), ResourceError> {
        Ok(())
    }
}

impl GraphicsDevice for MockDevice {
    fn create_shader_module(
        &self,
        _descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let mut s = self.lock();
        let id = s.next();
        s.modules.insert(id);
        Ok(ShaderModuleId(id))
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        remove(&mut self.lock().modules, id.0)
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let mut s = self.lock();
        let id = s.next();
        s.bind_group_layouts.insert(id);
        Ok(BindGroupLayoutId(id))
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        remove(&mut self.lock().bind_group_layouts, id.0)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let mut s = self.lock();
        if !s.bind_group_layouts.contains(&descriptor.layout.0) {
            return Err(ResourceError::NotFound);
        }
        let id = s.next();
        s.bind_groups.insert(id, descriptor.entries.to_vec());
        Ok(BindGroupId(id))
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        self.lock()
            .bind_groups
            .remove(&id.0)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_pipeline_layout(
        &self,
        _descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        let mut s = self.lock();
        let id = s.next();
        s.pipeline_layouts.insert(id);
        Ok(PipelineLayoutId(id))
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError> {
        remove(&mut self.lock().pipeline_layouts, id.0)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut s = self.lock();
        if !s.modules.contains(&descriptor.vertex_shader_module.0) {
            return Err(PipelineError::InvalidShaderModuleForPipeline {
                id: descriptor.vertex_shader_module,
                pipeline_label: descriptor.label.as_deref().map(str::to_string),
            }
            .into());
        }
        let id = s.next();
        s.pipelines.insert(id);
        Ok(RenderPipelineId(id))
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        remove(&mut self.lock().pipelines, id.0)
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let mut s = self.lock();
        let id = s.next();
        s.buffers.insert(id, vec![0; descriptor.size as usize]);
        Ok(BufferId(id))
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let id = self.create_buffer(descriptor)?;
        self.write_buffer(id, 0, data)?;
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.lock()
            .buffers
            .remove(&id.0)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut s = self.lock();
        let buffer = s.buffers.get_mut(&id.0).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, _descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut s = self.lock();
        let id = s.next();
        s.textures.insert(id, HashMap::new());
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.lock()
            .textures
            .remove(&id.0)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_texture(
        &self,
        texture_id: TextureId,
        data: &[u8],
        _layout: TextureDataLayout,
        origin: Origin3d,
        _size: Extent3d,
    ) -> Result<(), ResourceError> {
        let mut s = self.lock();
        let layers = s.textures.get_mut(&texture_id.0).ok_or(ResourceError::NotFound)?;
        layers.insert(origin.z, data.to_vec());
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        _descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let mut s = self.lock();
        if !s.textures.contains_key(&texture_id.0) {
            return Err(ResourceError::NotFound);
        }
        let id = s.next();
        s.views.insert(id);
        Ok(TextureViewId(id))
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        remove(&mut self.lock().views, id.0)
    }

    fn create_sampler(&self, _descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let mut s = self.lock();
        let id = s.next();
        s.samplers.insert(id);
        Ok(SamplerId(id))
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        remove(&mut self.lock().samplers, id.0)
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(MockEncoder {
            state: self.state.clone(),
            commands: Vec::new(),
        })
    }

    fn submit_command_buffer(
        &self,
        _command_buffer: CommandBufferId,
    ) -> Result<SubmissionIndex, ResourceError> {
        let mut s = self.lock();
        s.submissions += 1;
        Ok(SubmissionIndex(s.submissions))
    }

    fn swapchain_image_count(&self) -> u32 {
        2
    }

    fn swapchain_format(&self) -> RhiFormat {
        RhiFormat::B8G8R8A8Srgb
    }

    fn swapchain_extent(&self) -> Extent3d {
        Extent3d::d2(64, 64)
    }

    fn swapchain_image_view(&self, index: u32) -> Option<TextureViewId> {
        (index < 2).then_some(TextureViewId(10_000 + index as usize))
    }

    fn acquire_next_swapchain_image(&self) -> Result<u32, ResourceError> {
        Ok(0)
    }

    fn resize_swapchain(&self, _width: u32, _height: u32) -> Result<(), ResourceError> {
        Ok(())
    }

    fn adapter_info(&self) -> RendererAdapterInfo {
        RendererAdapterInfo {
            name: "mock".to_string(),
            backend_type: GraphicsBackendType::Headless,
            ..Default::default()
        }
    }

    fn supports_feature(&self, feature: DeviceFeature) -> bool {
        self.features.contains(&feature)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MockEncoder {
    state: Arc<Mutex<MockState>>,
    commands: Vec<MockCommand>,
}

struct MockPass<'a> {
    commands: &'a mut Vec<MockCommand>,
}

impl Drop for MockPass<'_> {
    fn drop(&mut self) {
        self.commands.push(MockCommand::EndPass);
    }
}

impl<'a> RenderPass<'a> for MockPass<'a> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(MockCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, dynamic_offsets: &[u32]) {
        self.commands.push(MockCommand::SetBindGroup {
            index,
            group: bind_group,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.commands.push(MockCommand::SetVertexBuffer(slot, buffer));
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, _index_format: IndexFormat) {
        self.commands.push(MockCommand::SetIndexBuffer(buffer));
    }

    fn set_push_constants(&mut self, _stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.commands.push(MockCommand::PushConstants(offset, data.to_vec()));
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {}

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(MockCommand::Draw(vertices, instances));
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.commands.push(MockCommand::DrawIndexed(indices, instances));
    }
}

impl CommandEncoder for MockEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        self.commands.push(MockCommand::BeginPass {
            label: descriptor.label.map(str::to_string),
            colour: descriptor.color_attachments.iter().map(|a| a.view).collect(),
            depth: descriptor.depth_stencil_attachment.map(|d| d.view),
        });
        Box::new(MockPass {
            commands: &mut self.commands,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        _source: BufferId,
        _source_offset: u64,
        _destination: BufferId,
        _destination_offset: u64,
        _size: u64,
    ) {
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let mut state = self.state.lock().unwrap();
        state.commands.extend(self.commands);
        CommandBufferId(state.commands.len() as u64)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
