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

//! Vertex streaming shared by the batch lanes.

use super::uniforms::batch_layout;
use lumos_core::math::{LinearRgba, Mat4, Vec2, Vec3};
use lumos_core::renderer::resources::{
    Descriptor, DescriptorSet, PipelineDesc, UniformBuffer, VertexBuffer,
};
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{
    BufferId, GraphicsDevice, RenderError, ResourceError, UniformBlock, VertexBufferLayoutDescriptor,
    VertexFormat,
};
use lumos_core::RenderContext;
use std::sync::Arc;

/// A coloured, textured vertex of the quad and point batches.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BatchVertex {
    /// Position.
    pub position: [f32; 3],
    /// Linear colour.
    pub colour: [f32; 4],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

impl BatchVertex {
    /// Creates a vertex.
    pub fn new(position: Vec3, colour: LinearRgba, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            colour: colour.to_array(),
            uv: uv.to_array(),
        }
    }

    /// Locations 0 to 2.
    pub fn layout() -> VertexBufferLayoutDescriptor {
        VertexBufferLayoutDescriptor::packed(&[
            VertexFormat::Float32x3,
            VertexFormat::Float32x4,
            VertexFormat::Float32x2,
        ])
    }
}

/// A vertex of the line batch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    /// Position.
    pub position: [f32; 3],
    /// Linear colour.
    pub colour: [f32; 4],
}

impl LineVertex {
    /// Creates a vertex.
    pub fn new(position: Vec3, colour: LinearRgba) -> Self {
        Self {
            position: position.to_array(),
            colour: colour.to_array(),
        }
    }

    /// Locations 0 and 1.
    pub fn layout() -> VertexBufferLayoutDescriptor {
        VertexBufferLayoutDescriptor::packed(&[VertexFormat::Float32x3, VertexFormat::Float32x4])
    }
}

/// Indices for `quads` quads of four vertices each: `0 1 2 2 3 0`.
pub fn quad_indices(quads: u32) -> Vec<u32> {
    (0..quads)
        .flat_map(|q| {
            let base = q * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect()
}

#[derive(Debug, Default)]
struct SlotChunks {
    buffers: Vec<VertexBuffer>,
    chunk: usize,
    offset: u64,
}

/// Per-frame vertex storage made of fixed-size chunks.
///
/// Every frame slot owns its own chunks so a frame still in flight is never
/// overwritten. A push that does not fit in the current chunk moves to the
/// next one, allocating it on first use.
#[derive(Debug)]
pub(crate) struct VertexChunks {
    label: String,
    chunk_size: u64,
    slots: Vec<SlotChunks>,
    current: usize,
}

impl VertexChunks {
    pub fn new(label: &str, chunk_size: u64, slot_count: usize) -> Self {
        Self {
            label: label.to_string(),
            chunk_size,
            slots: (0..slot_count.max(1)).map(|_| SlotChunks::default()).collect(),
            current: 0,
        }
    }

    /// Rewinds the chunks of `slot`.
    pub fn begin_slot(&mut self, slot: usize) {
        self.current = slot % self.slots.len();
        let chunks = &mut self.slots[self.current];
        chunks.chunk = 0;
        chunks.offset = 0;
    }

    /// Writes `bytes` and returns where they landed.
    pub fn push(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        bytes: &[u8],
    ) -> Result<(BufferId, u64), ResourceError> {
        let len = bytes.len() as u64;
        if len > self.chunk_size {
            return Err(ResourceError::InvalidDescriptor(format!(
                "{}: {len} bytes exceed the {} byte chunk",
                self.label, self.chunk_size
            )));
        }
        let chunks = &mut self.slots[self.current];
        if chunks.offset + len > self.chunk_size {
            chunks.chunk += 1;
            chunks.offset = 0;
        }
        if chunks.chunk == chunks.buffers.len() {
            log::debug!(
                "{}: allocating chunk {} of slot {}",
                self.label,
                chunks.chunk,
                self.current
            );
            chunks.buffers.push(VertexBuffer::new(
                device,
                &format!("{} chunk {}", self.label, chunks.chunk),
                self.chunk_size,
            )?);
        }
        let buffer = &chunks.buffers[chunks.chunk];
        buffer.set_data(chunks.offset, bytes)?;
        let placed = (buffer.id(), chunks.offset);
        chunks.offset += len;
        Ok(placed)
    }

    /// Chunks allocated by `slot`.
    pub fn chunk_count(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, |s| s.buffers.len())
    }
}

/// One batch ready to record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PreparedBatch {
    pub buffer: BufferId,
    pub offset: u64,
    /// Vertices, or indices for indexed batches.
    pub count: u32,
}

/// Shader, `Batch` uniform and set 0 of a batch lane.
#[derive(Debug)]
pub(crate) struct BatchProgram {
    pub shader: Arc<Shader>,
    pub uniforms: UniformBuffer,
    pub block: UniformBlock,
    pub system: DescriptorSet,
}

impl BatchProgram {
    pub fn new(ctx: &RenderContext, name: &str, source: &str) -> Result<Self, RenderError> {
        let device = ctx.device();
        let shader = Shader::from_source(
            device,
            name,
            source,
            &super::shaders::includes(),
            &ShaderOptions::default(),
        )?;
        let block = UniformBlock::new(Arc::new(batch_layout()));
        shader.validate_uniform_layout("batch", block.layout())?;
        let uniforms = UniformBuffer::new(
            device,
            &format!("{name} uniforms"),
            block.layout().size() as u64,
        )?;
        let mut system = DescriptorSet::new(&shader, 0)?;
        system.update(vec![Descriptor::uniform(0, "batch", &uniforms)])?;
        Ok(Self {
            shader,
            uniforms,
            block,
            system,
        })
    }

    /// A swapchain pipeline description that keeps what earlier lanes drew.
    pub fn desc(&self, ctx: &RenderContext, name: &str) -> PipelineDesc {
        let mut desc = PipelineDesc::new(self.shader.clone(), name);
        desc.swapchain_target = true;
        desc.clear_targets = false;
        desc.clear_colour = ctx.config().clear_colour();
        desc
    }

    pub fn upload(&mut self, view_projection: Mat4) -> Result<(), RenderError> {
        self.block.set("view_projection", &view_projection)?;
        self.uniforms.set_data(self.block.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_indices_walk_four_vertices_per_quad() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
    }

    #[test]
    fn vertex_layouts_match_the_structs() {
        assert_eq!(
            BatchVertex::layout().array_stride,
            std::mem::size_of::<BatchVertex>() as u64
        );
        assert_eq!(
            LineVertex::layout().array_stride,
            std::mem::size_of::<LineVertex>() as u64
        );
    }
}
