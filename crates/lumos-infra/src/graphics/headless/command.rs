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
use lumos_core::renderer::api::{
    BindGroupEntry, BindGroupId, BindGroupLayoutEntry, BindingResource, BindingType, BufferId,
    CommandBufferId, IndexFormat, LoadOp, RenderPassDescriptor, RenderPipelineId,
    ShaderStageFlags, SubmissionIndex, TextureViewId,
};
use lumos_core::renderer::shader::{BindingRemap, FlatBinding};
use lumos_core::renderer::traits::{CommandEncoder, RenderPass};
use std::any::Any;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use super::device::{lock, HeadlessState};

/// A command recorded by the headless device.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessCommand {
    /// A render pass started.
    BeginPass {
        /// Pass label.
        label: Option<String>,
        /// Colour views and how each is loaded.
        colour: Vec<(TextureViewId, LoadOp<LinearRgba>)>,
        /// Depth view, if any.
        depth: Option<TextureViewId>,
        /// Depth the depth view is cleared to.
        depth_clear: Option<f32>,
    },
    /// A pipeline was bound.
    SetPipeline(RenderPipelineId),
    /// One bind group entry resolved to its flat slot.
    BindFlat {
        /// Set index the group was bound at.
        set: u32,
        /// Binding inside the set.
        binding: u32,
        /// Flat slot the resource lands in.
        slot: FlatBinding,
        /// Bound resource.
        resource: BindingResource,
        /// Dynamic offset applied to a dynamic uniform binding.
        dynamic_offset: Option<u32>,
    },
    /// A vertex buffer was bound.
    SetVertexBuffer {
        /// Vertex buffer slot.
        slot: u32,
        /// Buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
    },
    /// An index buffer was bound.
    SetIndexBuffer {
        /// Buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
        /// Index width.
        format: IndexFormat,
    },
    /// Push-constant bytes were written.
    PushConstants {
        /// Stages receiving the bytes.
        stages: ShaderStageFlags,
        /// Byte offset in the block.
        offset: u32,
        /// Bytes written.
        data: Vec<u8>,
    },
    /// The viewport changed.
    SetViewport {
        /// Left edge.
        x: f32,
        /// Top edge.
        y: f32,
        /// Width.
        width: f32,
        /// Height.
        height: f32,
    },
    /// A non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Value added to each index.
        base_vertex: i32,
        /// Instance range.
        instances: Range<u32>,
    },
    /// The current render pass ended.
    EndPass,
    /// A buffer to buffer copy.
    CopyBuffer {
        /// Source buffer.
        source: BufferId,
        /// Offset in the source.
        source_offset: u64,
        /// Destination buffer.
        destination: BufferId,
        /// Offset in the destination.
        destination_offset: u64,
        /// Bytes copied.
        size: u64,
    },
}

/// Everything one `submit_command_buffer` call carried.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSubmission {
    /// Index returned by the submit.
    pub index: SubmissionIndex,
    /// Label of the encoder.
    pub label: Option<String>,
    /// Commands in recording order.
    pub commands: Vec<HeadlessCommand>,
}

impl RecordedSubmission {
    /// Number of draw calls, indexed or not.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    HeadlessCommand::Draw { .. } | HeadlessCommand::DrawIndexed { .. }
                )
            })
            .count()
    }

    /// Labels of the passes in recording order.
    pub fn pass_labels(&self) -> Vec<Option<String>> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                HeadlessCommand::BeginPass { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A finished encoder waiting for submission.
#[derive(Debug)]
pub(crate) struct RecordedBuffer {
    pub(crate) label: Option<String>,
    pub(crate) commands: Vec<HeadlessCommand>,
}

/// Records into a command list shared with its device.
pub(crate) struct HeadlessEncoder {
    state: Arc<Mutex<HeadlessState>>,
    label: Option<String>,
    commands: Vec<HeadlessCommand>,
}

impl HeadlessEncoder {
    pub(crate) fn new(state: Arc<Mutex<HeadlessState>>, label: Option<&str>) -> Self {
        Self {
            state,
            label: label.map(str::to_string),
            commands: Vec::new(),
        }
    }

    /// Resolves a group's entries against the bound pipeline's layouts.
    fn resolve_bind_group(
        &self,
        pipeline: Option<RenderPipelineId>,
        index: u32,
        group: BindGroupId,
        dynamic_offsets: &[u32],
    ) -> Option<Vec<HeadlessCommand>> {
        let state = lock(&self.state);
        let Some(pipeline) = pipeline else {
            log::warn!("HeadlessEncoder: bind group {group:?} bound before any pipeline");
            return None;
        };
        let set_layouts = state.pipeline_set_layouts(pipeline)?;
        let Some(group_entry) = state.bind_groups.get(&group) else {
            log::warn!("HeadlessEncoder: BindGroupId {group:?} not found.");
            return None;
        };
        let remap = match BindingRemap::from_layouts(set_layouts.iter().map(Vec::as_slice)) {
            Ok(remap) => remap,
            Err(e) => {
                log::warn!("HeadlessEncoder: pipeline {pipeline:?} has no flat binding layout: {e}");
                return None;
            }
        };
        let layout = state.bind_group_layouts.get(&group_entry.layout)?;

        let mut entries: Vec<&BindGroupEntry> = group_entry.entries.iter().collect();
        entries.sort_by_key(|e| e.binding);
        let dynamic_count = entries
            .iter()
            .filter(|e| is_dynamic(layout, e.binding))
            .count();
        if dynamic_count != dynamic_offsets.len() {
            log::warn!(
                "HeadlessEncoder: bind group {group:?} expects {dynamic_count} dynamic offset(s), got {}",
                dynamic_offsets.len()
            );
            return None;
        }

        let mut offsets = dynamic_offsets.iter().copied();
        let mut commands = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(slot) = remap.flat(index, entry.binding) else {
                log::warn!(
                    "HeadlessEncoder: set {index} binding {} is not declared by the pipeline layout",
                    entry.binding
                );
                continue;
            };
            let dynamic_offset = if is_dynamic(layout, entry.binding) {
                offsets.next()
            } else {
                None
            };
            commands.push(HeadlessCommand::BindFlat {
                set: index,
                binding: entry.binding,
                slot,
                resource: entry.resource,
                dynamic_offset,
            });
        }
        Some(commands)
    }
}

fn is_dynamic(layout: &[BindGroupLayoutEntry], binding: u32) -> bool {
    layout.iter().any(|l| {
        l.binding == binding
            && matches!(
                l.ty,
                BindingType::UniformBuffer {
                    has_dynamic_offset: true,
                    ..
                }
            )
    })
}

struct HeadlessPass<'a> {
    encoder: &'a mut HeadlessEncoder,
    pipeline: Option<RenderPipelineId>,
}

impl Drop for HeadlessPass<'_> {
    fn drop(&mut self) {
        self.encoder.commands.push(HeadlessCommand::EndPass);
    }
}

impl<'a> RenderPass<'a> for HeadlessPass<'a> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        if !lock(&self.encoder.state).pipelines.contains_key(&pipeline) {
            log::warn!("HeadlessPass: RenderPipelineId {pipeline:?} not found.");
        }
        self.pipeline = Some(pipeline);
        self.encoder
            .commands
            .push(HeadlessCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: BindGroupId,
        dynamic_offsets: &[u32],
    ) {
        if let Some(commands) =
            self.encoder
                .resolve_bind_group(self.pipeline, index, bind_group, dynamic_offsets)
        {
            self.encoder.commands.extend(commands);
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64) {
        self.encoder.commands.push(HeadlessCommand::SetVertexBuffer {
            slot,
            buffer,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat) {
        self.encoder.commands.push(HeadlessCommand::SetIndexBuffer {
            buffer,
            offset,
            format: index_format,
        });
    }

    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.encoder.commands.push(HeadlessCommand::PushConstants {
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.encoder.commands.push(HeadlessCommand::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if self.pipeline.is_none() {
            log::warn!("HeadlessPass: draw without a pipeline");
        }
        self.encoder
            .commands
            .push(HeadlessCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        if self.pipeline.is_none() {
            log::warn!("HeadlessPass: indexed draw without a pipeline");
        }
        self.encoder.commands.push(HeadlessCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }
}

impl CommandEncoder for HeadlessEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        self.commands.push(HeadlessCommand::BeginPass {
            label: descriptor.label.map(str::to_string),
            colour: descriptor
                .color_attachments
                .iter()
                .map(|a| (a.view, a.ops.load))
                .collect(),
            depth: descriptor.depth_stencil_attachment.map(|d| d.view),
            depth_clear: descriptor
                .depth_stencil_attachment
                .and_then(|d| d.depth_ops)
                .and_then(|ops| match ops.load {
                    LoadOp::Clear(value) => Some(value),
                    LoadOp::Load => None,
                }),
        });
        Box::new(HeadlessPass {
            encoder: self,
            pipeline: None,
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
        self.commands.push(HeadlessCommand::CopyBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let this = *self;
        let mut state = lock(&this.state);
        let id = CommandBufferId(state.next_command_buffer);
        state.next_command_buffer += 1;
        state.pending.insert(
            id,
            RecordedBuffer {
                label: this.label,
                commands: this.commands,
            },
        );
        id
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
