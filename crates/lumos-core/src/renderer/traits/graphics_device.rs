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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::any::Any;
use std::fmt::Debug;

/// Tracks completion of queue submissions.
///
/// Split from [`GraphicsDevice`] so frame pacing can be driven by anything
/// that knows when GPU work finished.
pub trait SubmissionTracker {
    /// Returns `true` once the GPU finished every command of `index`.
    /// Never blocks.
    fn poll_submission(&self, index: SubmissionIndex) -> bool;

    /// Blocks until the GPU finished every command of `index`.
    fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), ResourceError>;
}

/// The factory interface of a graphics backend.
///
/// Every GPU resource is created and destroyed through this trait. A device is
/// passed explicitly (usually inside a [`RenderContext`](crate::renderer::context::RenderContext)),
/// so a resource can never be created before a backend exists.
pub trait GraphicsDevice: SubmissionTracker + Send + Sync + Debug + 'static {
    /// Creates a shader module from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - The stage, entry point and preprocessed source.
    /// ## Returns
    /// The ID of the created shader module.
    /// ## Errors
    /// * `ResourceError::Shader` - If the backend rejects the source or stage.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys the shader module associated with the given ID.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a bind group layout (the shape of one descriptor set).
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Destroys a bind group layout.
    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError>;

    /// Creates a bind group binding concrete resources to a layout.
    /// ## Arguments
    /// * `descriptor` - The layout and the resource bound to each binding.
    /// ## Errors
    /// * `ResourceError::NotFound` - If the layout or a bound resource does not exist.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Creates a pipeline layout from bind group layouts and push-constant ranges.
    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError>;

    /// Destroys a pipeline layout.
    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError>;

    /// Creates a render pipeline from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - Shader modules, vertex layout and fixed-function state.
    /// ## Returns
    /// The ID of the created render pipeline.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If a module is missing or the backend rejects the state.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys the render pipeline associated with the given ID.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Creates a new GPU buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer initialized with `data`.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data to a GPU buffer.
    /// ## Arguments
    /// * `id` - The buffer to write to.
    /// * `offset` - Byte offset of the write.
    /// * `data` - Bytes to copy.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the write exceeds the buffer size.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a new GPU texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Uploads texel data into a region of a texture.
    /// ## Arguments
    /// * `texture_id` - The texture to write to.
    /// * `data` - Tightly packed texel bytes.
    /// * `layout` - Row and image pitch of `data`.
    /// * `origin` - First texel (and array layer) written.
    /// * `size` - Extent of the region.
    fn write_texture(
        &self,
        texture_id: TextureId,
        data: &[u8],
        layout: TextureDataLayout,
        origin: Origin3d,
        size: Extent3d,
    ) -> Result<(), ResourceError>;

    /// Creates a view into an existing texture.
    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError>;

    /// Destroys a sampler.
    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError>;

    /// Creates a new command encoder.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer to the queue.
    /// ## Returns
    /// The index used to track completion of this submission.
    fn submit_command_buffer(
        &self,
        command_buffer: CommandBufferId,
    ) -> Result<SubmissionIndex, ResourceError>;

    /// Number of images in the swapchain ring.
    fn swapchain_image_count(&self) -> u32;

    /// Format of the swapchain images.
    fn swapchain_format(&self) -> RhiFormat;

    /// Size of the swapchain images.
    fn swapchain_extent(&self) -> Extent3d;

    /// View of swapchain image `index`, if it exists.
    fn swapchain_image_view(&self, index: u32) -> Option<TextureViewId>;

    /// Acquires the next swapchain image and returns its index.
    fn acquire_next_swapchain_image(&self) -> Result<u32, ResourceError>;

    /// Recreates swapchain images at a new size.
    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), ResourceError>;

    /// Reads back one array layer of mip 0, tightly packed.
    ///
    /// Backends without readback keep the default.
    /// ## Errors
    /// * `ResourceError::BackendError` - If readback is unsupported or the copy failed.
    fn read_texture(&self, texture_id: TextureId, layer: u32) -> Result<Vec<u8>, ResourceError> {
        let _ = (texture_id, layer);
        Err(ResourceError::BackendError(
            "texture readback is not supported by this backend".to_string(),
        ))
    }

    /// Information about the adapter behind this device.
    fn adapter_info(&self) -> RendererAdapterInfo;

    /// Whether an optional capability is available.
    fn supports_feature(&self, feature: DeviceFeature) -> bool;

    /// Returns the device as `Any` for backend-specific downcasts.
    fn as_any(&self) -> &dyn Any;
}
