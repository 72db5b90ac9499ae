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

//! Owning wrappers around vertex, index and uniform buffers.

use crate::renderer::api::buffer::{BufferDescriptor, BufferId, BufferUsage, IndexFormat};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

/// A GPU buffer released when dropped.
#[derive(Debug)]
struct GpuBuffer {
    device: Arc<dyn GraphicsDevice>,
    id: BufferId,
    size: u64,
    usage: BufferUsage,
    label: String,
}

impl GpuBuffer {
    fn new(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        size: u64,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Result<Self, ResourceError> {
        let descriptor = BufferDescriptor {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: usage | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        };
        let id = match data {
            Some(bytes) => device.create_buffer_with_data(&descriptor, bytes)?,
            None => device.create_buffer(&descriptor)?,
        };
        Ok(Self {
            device: device.clone(),
            id,
            size,
            usage,
            label: label.to_string(),
        })
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        if offset + data.len() as u64 > self.size {
            log::error!(
                "Buffer '{}': write of {} bytes at {} exceeds size {}",
                self.label,
                data.len(),
                offset,
                self.size
            );
            return Err(ResourceError::OutOfBounds);
        }
        self.device.write_buffer(self.id, offset, data)
    }

    fn recreate(&mut self, size: u64) -> Result<(), ResourceError> {
        let replacement = GpuBuffer::new(&self.device, &self.label, size, self.usage, None)?;
        *self = replacement;
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_buffer(self.id) {
            log::warn!("Buffer '{}': failed to destroy: {}", self.label, e);
        }
    }
}

/// CPU-visible window into a buffer, flushed to the GPU on [`unmap`](Self::unmap)
/// or drop.
///
/// Only the byte range that was actually written is uploaded.
#[derive(Debug)]
pub struct BufferMapping<'a> {
    buffer: &'a GpuBuffer,
    data: Vec<u8>,
    dirty: Option<Range<usize>>,
}

impl BufferMapping<'_> {
    /// Copies `bytes` at `offset` into the mapping.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), ResourceError> {
        let end = offset + bytes.len();
        if end > self.data.len() {
            return Err(ResourceError::OutOfBounds);
        }
        self.data[offset..end].copy_from_slice(bytes);
        self.dirty = Some(match self.dirty.take() {
            Some(range) => range.start.min(offset)..range.end.max(end),
            None => offset..end,
        });
        Ok(())
    }

    /// Size of the mapped range.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flushes written bytes and ends the mapping.
    pub fn unmap(mut self) -> Result<(), ResourceError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<(), ResourceError> {
        match self.dirty.take() {
            Some(range) => self
                .buffer
                .write(range.start as u64, &self.data[range]),
            None => Ok(()),
        }
    }
}

impl Drop for BufferMapping<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("Buffer '{}': failed to flush mapping: {}", self.buffer.label, e);
        }
    }
}

/// A buffer of vertices.
#[derive(Debug)]
pub struct VertexBuffer {
    inner: GpuBuffer,
}

impl VertexBuffer {
    /// An uninitialised buffer of `size` bytes, written later.
    pub fn new(device: &Arc<dyn GraphicsDevice>, label: &str, size: u64) -> Result<Self, ResourceError> {
        Ok(Self {
            inner: GpuBuffer::new(device, label, size, BufferUsage::VERTEX, None)?,
        })
    }

    /// A buffer initialised with `data`.
    pub fn from_data(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        data: &[u8],
    ) -> Result<Self, ResourceError> {
        Ok(Self {
            inner: GpuBuffer::new(device, label, data.len() as u64, BufferUsage::VERTEX, Some(data))?,
        })
    }

    /// Overwrites bytes starting at `offset`.
    pub fn set_data(&self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.inner.write(offset, data)
    }

    /// Maps the first `len` bytes for writing.
    pub fn map(&self, len: usize) -> BufferMapping<'_> {
        BufferMapping {
            buffer: &self.inner,
            data: vec![0; len.min(self.inner.size as usize)],
            dirty: None,
        }
    }

    /// Reallocates the buffer; previous contents are lost.
    pub fn resize(&mut self, size: u64) -> Result<(), ResourceError> {
        self.inner.recreate(size)
    }

    /// Backend handle.
    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size
    }
}

/// A buffer of 16 or 32-bit indices.
#[derive(Debug)]
pub struct IndexBuffer {
    inner: GpuBuffer,
    count: u32,
    format: IndexFormat,
}

impl IndexBuffer {
    /// A buffer of 32-bit indices.
    pub fn from_u32(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        indices: &[u32],
    ) -> Result<Self, ResourceError> {
        Self::from_bytes(device, label, bytemuck::cast_slice(indices), IndexFormat::Uint32)
    }

    /// A buffer of 16-bit indices.
    pub fn from_u16(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        indices: &[u16],
    ) -> Result<Self, ResourceError> {
        // Keep the upload 4-byte aligned.
        let mut bytes = bytemuck::cast_slice::<u16, u8>(indices).to_vec();
        let count = indices.len() as u32;
        if bytes.len() % 4 != 0 {
            bytes.extend_from_slice(&[0, 0]);
        }
        let mut buffer = Self::from_bytes(device, label, &bytes, IndexFormat::Uint16)?;
        buffer.count = count;
        Ok(buffer)
    }

    fn from_bytes(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        bytes: &[u8],
        format: IndexFormat,
    ) -> Result<Self, ResourceError> {
        Ok(Self {
            inner: GpuBuffer::new(device, label, bytes.len() as u64, BufferUsage::INDEX, Some(bytes))?,
            count: (bytes.len() as u64 / format.size()) as u32,
            format,
        })
    }

    /// An uninitialised buffer for up to `capacity` indices.
    pub fn with_capacity(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        capacity: u32,
        format: IndexFormat,
    ) -> Result<Self, ResourceError> {
        let size = (capacity as u64 * format.size()).div_ceil(4) * 4;
        Ok(Self {
            inner: GpuBuffer::new(device, label, size, BufferUsage::INDEX, None)?,
            count: capacity,
            format,
        })
    }

    /// Overwrites 32-bit indices starting at element `first`.
    pub fn set_u32(&self, first: u32, indices: &[u32]) -> Result<(), ResourceError> {
        if self.format != IndexFormat::Uint32 {
            return Err(ResourceError::InvalidDescriptor(
                "u32 indices written to a u16 index buffer".to_string(),
            ));
        }
        self.inner.write(first as u64 * 4, bytemuck::cast_slice(indices))
    }

    /// Number of indices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Index width.
    pub fn format(&self) -> IndexFormat {
        self.format
    }

    /// Backend handle.
    pub fn id(&self) -> BufferId {
        self.inner.id
    }
}

/// A uniform buffer.
#[derive(Debug)]
pub struct UniformBuffer {
    inner: GpuBuffer,
}

impl UniformBuffer {
    /// A zeroed uniform buffer of `size` bytes.
    pub fn new(device: &Arc<dyn GraphicsDevice>, label: &str, size: u64) -> Result<Self, ResourceError> {
        let zeroes = vec![0u8; size as usize];
        Ok(Self {
            inner: GpuBuffer::new(device, label, size, BufferUsage::UNIFORM, Some(&zeroes))?,
        })
    }

    /// A uniform buffer initialised with `data`.
    pub fn from_data(
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        data: &[u8],
    ) -> Result<Self, ResourceError> {
        Ok(Self {
            inner: GpuBuffer::new(device, label, data.len() as u64, BufferUsage::UNIFORM, Some(data))?,
        })
    }

    /// Overwrites the buffer from the start.
    pub fn set_data(&self, data: &[u8]) -> Result<(), ResourceError> {
        self.inner.write(0, data)
    }

    /// Overwrites bytes at `offset`.
    pub fn set_data_at(&self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.inner.write(offset, data)
    }

    /// Backend handle.
    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size
    }
}
