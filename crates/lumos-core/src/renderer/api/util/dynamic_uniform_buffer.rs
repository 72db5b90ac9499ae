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

//! Per-frame ring of uniform buffers addressed with dynamic offsets.

use crate::renderer::{
    api::{
        bind_group::{
            BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutId, BindingResource,
            BufferBinding,
        },
        buffer::{BufferDescriptor, BufferId, BufferUsage},
    },
    error::ResourceError,
    traits::GraphicsDevice,
};
use std::borrow::Cow;

/// Minimum dynamic offset alignment guaranteed by every supported API.
pub const MIN_UNIFORM_ALIGNMENT: u32 = 256;

/// Default number of elements in the first chunk of each slot.
pub const DEFAULT_MAX_ELEMENTS: u32 = 1024;

#[derive(Debug)]
struct Chunk {
    buffer: BufferId,
    bind_group: BindGroupId,
    capacity: u32,
    cursor: u32,
}

#[derive(Debug, Default)]
struct Slot {
    chunks: Vec<Chunk>,
    active: usize,
}

/// Where a pushed element lives: bind `bind_group` with `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicAllocation {
    /// Bind group covering the chunk the element was written to.
    pub bind_group: BindGroupId,
    /// Dynamic offset of the element.
    pub offset: u32,
}

/// Uniform storage for data written many times per frame (per-draw
/// transforms), one slot per frame in flight.
///
/// Each slot is a list of chunks. When the active chunk is full the next one
/// is used, or a chunk twice as large is created. Slots are reset when the
/// frame that owns them starts recording again.
#[derive(Debug)]
pub struct DynamicUniformRingBuffer {
    slots: Vec<Slot>,
    current: usize,
    element_size: u32,
    alignment: u32,
    layout: BindGroupLayoutId,
    binding: u32,
    label: String,
}

impl DynamicUniformRingBuffer {
    /// Creates a ring with `slot_count` slots.
    ///
    /// # Arguments
    ///
    /// * `device` - The device creating the buffers.
    /// * `layout` - Layout with a dynamic uniform buffer at `binding`.
    /// * `binding` - Binding index of the uniform inside the layout.
    /// * `element_size` - Size of one element as read by the shader.
    /// * `max_elements` - Initial capacity of each slot.
    /// * `slot_count` - Number of frames in flight.
    /// * `label` - Debug label.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &dyn GraphicsDevice,
        layout: BindGroupLayoutId,
        binding: u32,
        element_size: u32,
        max_elements: u32,
        slot_count: usize,
        label: impl Into<String>,
    ) -> Result<Self, ResourceError> {
        let mut ring = Self {
            slots: Vec::with_capacity(slot_count),
            current: 0,
            element_size,
            alignment: MIN_UNIFORM_ALIGNMENT,
            layout,
            binding,
            label: label.into(),
        };
        let capacity = ring.aligned(element_size) * max_elements.max(1);
        for slot_index in 0..slot_count.max(1) {
            let chunk = ring.create_chunk(device, slot_index, 0, capacity)?;
            ring.slots.push(Slot {
                chunks: vec![chunk],
                active: 0,
            });
        }
        Ok(ring)
    }

    fn aligned(&self, size: u32) -> u32 {
        size.div_ceil(self.alignment) * self.alignment
    }

    fn create_chunk(
        &self,
        device: &dyn GraphicsDevice,
        slot_index: usize,
        chunk_index: usize,
        capacity: u32,
    ) -> Result<Chunk, ResourceError> {
        let label = format!("{} [slot {} chunk {}]", self.label, slot_index, chunk_index);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(label)),
            size: capacity as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(self.label.as_str()),
            layout: self.layout,
            entries: &[BindGroupEntry {
                binding: self.binding,
                resource: BindingResource::Buffer(BufferBinding {
                    buffer,
                    offset: 0,
                    size: Some(self.element_size as u64),
                }),
            }],
        })?;
        log::debug!(
            "DynamicUniformRingBuffer({}): chunk {} of slot {} holds {} bytes",
            self.label,
            chunk_index,
            slot_index,
            capacity
        );
        Ok(Chunk {
            buffer,
            bind_group,
            capacity,
            cursor: 0,
        })
    }

    /// Selects the slot of the frame that starts recording and rewinds it.
    ///
    /// The caller guarantees the slot's previous GPU work has finished, which
    /// is what [`FramesInFlight`](super::FramesInFlight) enforces.
    pub fn begin_slot(&mut self, slot_index: usize) {
        self.current = slot_index % self.slots.len();
        let slot = &mut self.slots[self.current];
        for chunk in &mut slot.chunks {
            chunk.cursor = 0;
        }
        slot.active = 0;
    }

    /// Writes one element into the current slot.
    pub fn push(
        &mut self,
        device: &dyn GraphicsDevice,
        data: &[u8],
    ) -> Result<DynamicAllocation, ResourceError> {
        if data.len() as u32 > self.element_size {
            return Err(ResourceError::DataSizeMismatch {
                expected: self.element_size as usize,
                actual: data.len(),
            });
        }
        let aligned = self.aligned(self.element_size);
        let current = self.current;

        let (active, fits, has_next) = {
            let slot = &self.slots[current];
            let chunk = &slot.chunks[slot.active];
            (
                slot.active,
                chunk.cursor + aligned <= chunk.capacity,
                slot.active + 1 < slot.chunks.len(),
            )
        };

        if !fits {
            if has_next {
                self.slots[current].active = active + 1;
            } else {
                let grown = (self.slots[current].chunks[active].capacity * 2).max(aligned);
                let chunk_index = self.slots[current].chunks.len();
                let chunk = self.create_chunk(device, current, chunk_index, grown)?;
                let slot = &mut self.slots[current];
                slot.chunks.push(chunk);
                slot.active = chunk_index;
            }
        }

        let slot = &mut self.slots[current];
        let chunk = &mut slot.chunks[slot.active];
        let offset = chunk.cursor;
        device.write_buffer(chunk.buffer, offset as u64, data)?;
        chunk.cursor += aligned;

        Ok(DynamicAllocation {
            bind_group: chunk.bind_group,
            offset,
        })
    }

    /// Index of the slot being written.
    pub fn current_slot_index(&self) -> usize {
        self.current
    }

    /// Number of chunks allocated for a slot.
    pub fn chunk_count(&self, slot_index: usize) -> usize {
        self.slots.get(slot_index).map_or(0, |s| s.chunks.len())
    }

    /// Releases every buffer and bind group.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for slot in self.slots.drain(..) {
            for chunk in slot.chunks {
                if let Err(e) = device.destroy_bind_group(chunk.bind_group) {
                    log::warn!(
                        "DynamicUniformRingBuffer({}): failed to destroy bind group: {}",
                        self.label,
                        e
                    );
                }
                if let Err(e) = device.destroy_buffer(chunk.buffer) {
                    log::warn!(
                        "DynamicUniformRingBuffer({}): failed to destroy buffer: {}",
                        self.label,
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::bind_group::BindGroupLayoutDescriptor;
    use crate::renderer::testing::MockDevice;

    const ELEMENT: u32 = 64;

    fn ring(device: &dyn GraphicsDevice, max_elements: u32) -> DynamicUniformRingBuffer {
        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: &[],
            })
            .unwrap();
        DynamicUniformRingBuffer::new(device, layout, 0, ELEMENT, max_elements, 2, "draws").unwrap()
    }

    fn chunk_buffer(mock: &MockDevice, allocation: DynamicAllocation) -> BufferId {
        match &mock.bind_group_entries(allocation.bind_group).unwrap()[0].resource {
            BindingResource::Buffer(binding) => {
                assert_eq!(binding.size, Some(ELEMENT as u64));
                binding.buffer
            }
            other => panic!("chunk bound {other:?}"),
        }
    }

    #[test]
    fn full_chunk_grows_into_one_twice_as_large() {
        let (mock, device) = MockDevice::shared();
        let mut ring = ring(device.as_ref(), DEFAULT_MAX_ELEMENTS);
        ring.begin_slot(0);

        let mut last = None;
        for i in 0..DEFAULT_MAX_ELEMENTS {
            let allocation = ring.push(device.as_ref(), &[i as u8; 4]).unwrap();
            assert_eq!(allocation.offset, i * MIN_UNIFORM_ALIGNMENT);
            last = Some(allocation);
        }
        let last = last.unwrap();
        assert_eq!(ring.chunk_count(0), 1);
        let first_buffer = chunk_buffer(&mock, last);
        assert_eq!(
            mock.buffer_data(first_buffer).unwrap().len() as u32,
            DEFAULT_MAX_ELEMENTS * MIN_UNIFORM_ALIGNMENT
        );

        let overflow = ring.push(device.as_ref(), &[0xAB; ELEMENT as usize]).unwrap();
        assert_eq!(ring.chunk_count(0), 2);
        assert_eq!(ring.chunk_count(1), 1);
        assert_eq!(overflow.offset, 0);
        assert_ne!(overflow.bind_group, last.bind_group);

        let grown = mock.buffer_data(chunk_buffer(&mock, overflow)).unwrap();
        assert_eq!(grown.len() as u32, 2 * DEFAULT_MAX_ELEMENTS * MIN_UNIFORM_ALIGNMENT);
        assert_eq!(&grown[..ELEMENT as usize], &[0xAB; ELEMENT as usize][..]);
    }

    #[test]
    fn begin_slot_rewinds_and_reuses_chunks() {
        let (mock, device) = MockDevice::shared();
        let mut ring = ring(device.as_ref(), 2);
        ring.begin_slot(0);

        let first: Vec<_> = (0..3u8)
            .map(|i| ring.push(device.as_ref(), &[i; 8]).unwrap())
            .collect();
        assert_eq!(
            first.iter().map(|a| a.offset).collect::<Vec<_>>(),
            vec![0, MIN_UNIFORM_ALIGNMENT, 0]
        );
        assert_eq!(ring.chunk_count(0), 2);
        let objects = mock.live_objects();

        ring.begin_slot(1);
        assert_eq!(ring.current_slot_index(), 1);
        ring.begin_slot(2);
        assert_eq!(ring.current_slot_index(), 0);

        let second: Vec<_> = (0..3u8)
            .map(|i| ring.push(device.as_ref(), &[i + 10; 8]).unwrap())
            .collect();
        assert_eq!(second, first);
        assert_eq!(ring.chunk_count(0), 2);
        assert_eq!(ring.chunk_count(1), 1);
        assert_eq!(mock.live_objects(), objects);

        let data = mock.buffer_data(chunk_buffer(&mock, second[1])).unwrap();
        let at = MIN_UNIFORM_ALIGNMENT as usize;
        assert_eq!(&data[at..at + 8], &[11; 8]);
    }

    #[test]
    fn oversized_elements_are_rejected() {
        let (mock, device) = MockDevice::shared();
        let mut ring = ring(device.as_ref(), 4);
        ring.begin_slot(0);

        let err = ring
            .push(device.as_ref(), &[0; ELEMENT as usize + 1])
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::DataSizeMismatch {
                expected: 64,
                actual: 65
            }
        ));

        // The rejected push does not consume a slot.
        let next = ring.push(device.as_ref(), &[1; ELEMENT as usize]).unwrap();
        assert_eq!(next.offset, 0);
        assert_eq!(ring.chunk_count(0), 1);

        let before = mock.live_objects();
        ring.destroy(device.as_ref());
        assert_eq!(mock.live_objects(), before - 4);
    }
}
