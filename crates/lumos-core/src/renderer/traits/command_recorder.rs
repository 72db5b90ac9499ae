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

use crate::renderer::api::bind_group::BindGroupId;
use crate::renderer::api::buffer::{BufferId, IndexFormat};
use crate::renderer::api::command::{CommandBufferId, RenderPassDescriptor};
use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::util::flags::ShaderStageFlags;
use std::any::Any;
use std::ops::Range;

/// An active render pass, used for recording draw commands.
///
/// Obtained from a [`CommandEncoder`]; the pass ends when the object is
/// dropped. Handles are plain ids, resolved by the backend at record time.
/// Unknown ids are logged and the command is skipped.
pub trait RenderPass<'pass> {
    /// Sets the active render pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a bind group at `index`, with one dynamic offset per dynamic
    /// uniform binding in the group.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, dynamic_offsets: &[u32]);

    /// Binds a vertex buffer to a slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Copies push-constant bytes for the given stages.
    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]);

    /// Restricts rasterization to a viewport.
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

/// Records a sequence of GPU commands into a [`CommandBufferId`].
pub trait CommandEncoder: Send {
    /// Begins a new render pass. Only one pass can be active at a time.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder>;

    /// Copies bytes between two buffers on the GPU timeline.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Finalizes recording; the returned id is submitted through the device.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns the encoder as `Any` for backend-specific access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
