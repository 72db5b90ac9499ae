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

use lumos_core::renderer::api::{
    BindGroupId, BufferId, CommandBufferId, IndexFormat, RenderPassDescriptor, RenderPipelineId,
    ShaderStageFlags,
};
use lumos_core::renderer::traits::{CommandEncoder, RenderPass};
use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

use super::conversions::IntoWgpu;
use super::device::WgpuDevice;

/// A render pass recording into a wgpu encoder. Ends when dropped.
pub struct WgpuRenderPass<'a> {
    pub(crate) pass: wgpu::RenderPass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl<'pass> RenderPass<'pass> for WgpuRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline_id: RenderPipelineId) {
        if let Some(pipeline) = self.device.get_wgpu_render_pipeline(pipeline_id) {
            self.pass.set_pipeline(&pipeline);
        } else {
            log::warn!("WgpuRenderPass: RenderPipelineId {:?} not found.", pipeline_id);
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group_id: BindGroupId, dynamic_offsets: &[u32]) {
        if let Some(bind_group) = self.device.get_wgpu_bind_group(bind_group_id) {
            self.pass
                .set_bind_group(index, bind_group.as_ref(), dynamic_offsets);
        } else {
            log::warn!("WgpuRenderPass: BindGroupId {:?} not found.", bind_group_id);
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer_id: BufferId, offset: u64) {
        if let Some(buffer) = self.device.get_wgpu_buffer(buffer_id) {
            self.pass.set_vertex_buffer(slot, buffer.slice(offset..));
        } else {
            log::warn!("WgpuRenderPass: Vertex BufferId {:?} not found.", buffer_id);
        }
    }

    fn set_index_buffer(&mut self, buffer_id: BufferId, offset: u64, index_format: IndexFormat) {
        if let Some(buffer) = self.device.get_wgpu_buffer(buffer_id) {
            self.pass
                .set_index_buffer(buffer.slice(offset..), index_format.into_wgpu());
        } else {
            log::warn!("WgpuRenderPass: Index BufferId {:?} not found.", buffer_id);
        }
    }

    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        // Never reached through Shader, which falls back to uniforms when the
        // device reports no push-constant support.
        log::warn!(
            "WgpuRenderPass: dropped {} push-constant byte(s) at offset {} for {:?}",
            data.len(),
            offset,
            stages
        );
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.pass.set_viewport(x, y, width, height, 0.0, 1.0);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.draw(vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }
}

/// Records commands into a `wgpu::CommandEncoder`.
pub struct WgpuCommandEncoder {
    encoder: wgpu::CommandEncoder,
    device: WgpuDevice,
}

impl WgpuCommandEncoder {
    pub(crate) fn new(encoder: wgpu::CommandEncoder, device: WgpuDevice) -> Self {
        Self { encoder, device }
    }

    /// Escape hatch for wgpu-specific work not covered by the core traits.
    pub fn wgpu_encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        // Resolve views up front; attachments whose view is gone are skipped.
        let mut colour: Vec<(Arc<wgpu::TextureView>, Option<Arc<wgpu::TextureView>>, _)> =
            Vec::with_capacity(descriptor.color_attachments.len());
        for att in descriptor.color_attachments {
            let Some(view) = self.device.get_wgpu_texture_view(att.view) else {
                log::warn!("WgpuCommandEncoder: colour view {:?} not found.", att.view);
                continue;
            };
            let resolve = att
                .resolve_target
                .and_then(|id| self.device.get_wgpu_texture_view(id));
            colour.push((view, resolve, att.ops));
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = colour
            .iter()
            .map(|(view, resolve, ops)| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    resolve_target: resolve.as_deref(),
                    ops: wgpu::Operations {
                        load: ops.load.into_wgpu(),
                        store: ops.store.into_wgpu(),
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let depth = descriptor.depth_stencil_attachment.and_then(|ds| {
            let view = self.device.get_wgpu_texture_view(ds.view);
            if view.is_none() {
                log::warn!("WgpuCommandEncoder: depth view {:?} not found.", ds.view);
            }
            view.map(|view| (view, ds.depth_ops))
        });
        let depth_stencil_attachment =
            depth
                .as_ref()
                .map(|(view, depth_ops)| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: depth_ops.map(|ops| wgpu::Operations {
                        load: ops.load.into_wgpu(),
                        store: ops.store.into_wgpu(),
                    }),
                    stencil_ops: None,
                });

        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: descriptor.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        Box::new(WgpuRenderPass {
            pass,
            device: &self.device,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        if let (Some(source_buffer), Some(destination_buffer)) = (
            self.device.get_wgpu_buffer(source),
            self.device.get_wgpu_buffer(destination),
        ) {
            self.encoder.copy_buffer_to_buffer(
                &source_buffer,
                source_offset,
                &destination_buffer,
                destination_offset,
                size,
            );
        } else {
            log::warn!(
                "WgpuCommandEncoder: copy between {:?} and {:?} skipped, buffer not found.",
                source,
                destination
            );
        }
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let this = *self;
        this.device.register_command_buffer(this.encoder.finish())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
