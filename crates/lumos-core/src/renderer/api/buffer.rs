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

//! Buffer handles, descriptors and vertex layouts.

use crate::renderer::api::format::VertexFormat;
use std::borrow::Cow;

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

crate::lumos_bitflags! {
    /// Allowed usages of a buffer.
    pub struct BufferUsage: u32 {
        /// Can be mapped for reading.
        const MAP_READ = 1 << 0;
        /// Can be mapped for writing.
        const MAP_WRITE = 1 << 1;
        /// Source of a copy.
        const COPY_SRC = 1 << 2;
        /// Destination of a copy or queue write.
        const COPY_DST = 1 << 3;
        /// Index data.
        const INDEX = 1 << 4;
        /// Vertex data.
        const VERTEX = 1 << 5;
        /// Uniform block storage.
        const UNIFORM = 1 << 6;
        /// Storage buffer.
        const STORAGE = 1 << 7;
    }
}

/// Describes a buffer to create.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
    /// Whether the buffer starts mapped.
    pub mapped_at_creation: bool,
}

/// Width of index buffer elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// How often a vertex buffer advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Once per vertex.
    #[default]
    Vertex,
    /// Once per instance.
    Instance,
}

/// One attribute inside a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescriptor {
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset inside the vertex.
    pub offset: u64,
    /// Location the shader reads the attribute from.
    pub shader_location: u32,
}

/// Layout of one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexBufferLayoutDescriptor {
    /// Bytes between consecutive elements.
    pub array_stride: u64,
    /// Step mode.
    pub step_mode: VertexStepMode,
    /// Attributes in shader location order.
    pub attributes: Vec<VertexAttributeDescriptor>,
}

impl VertexBufferLayoutDescriptor {
    /// Builds a tightly packed per-vertex layout from formats, assigning
    /// consecutive locations and offsets.
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, format)| {
                let attribute = VertexAttributeDescriptor {
                    format: *format,
                    offset,
                    shader_location: location as u32,
                };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            array_stride: offset,
            step_mode: VertexStepMode::Vertex,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_layout_accumulates_offsets() {
        let layout = VertexBufferLayoutDescriptor::packed(&[
            VertexFormat::Float32x3,
            VertexFormat::Float32x4,
            VertexFormat::Float32x2,
        ]);
        assert_eq!(layout.array_stride, 36);
        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 28]);
        assert_eq!(layout.attributes[2].shader_location, 2);
    }
}
