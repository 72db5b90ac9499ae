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

//! Flattening of `(set, binding)` pairs for APIs without descriptor sets.

use super::reflection::{DescriptorKind, ShaderReflection};
use crate::renderer::api::bind_group::{BindGroupLayoutEntry, BindingType};
use crate::renderer::error::ShaderError;
use std::collections::BTreeMap;

/// Texture and sampler slots reserved per descriptor set.
pub const FLAT_BINDINGS_PER_SET: u32 = 16;

/// The namespace a flat slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlatBindingKind {
    /// A uniform (or storage) block binding point.
    UniformBlock,
    /// A texture unit.
    TextureUnit,
    /// A sampler unit.
    Sampler,
}

/// A binding point in a flat, GL-style namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlatBinding {
    /// Namespace.
    pub kind: FlatBindingKind,
    /// Slot inside the namespace.
    pub slot: u32,
}

/// Maps every reflected `(set, binding)` pair onto a flat slot.
///
/// Textures and samplers use `set * 16 + binding`. Uniform blocks share one
/// descriptor space and are numbered sequentially in `(set, binding)` order.
/// A texture or sampler at binding 16 or above would alias the next set and
/// is rejected with [`ShaderError::BindingOutOfRange`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingRemap {
    slots: BTreeMap<(u32, u32), FlatBinding>,
}

impl BindingRemap {
    /// Builds the remap for a shader.
    pub fn from_reflection(reflection: &ShaderReflection) -> Result<Self, ShaderError> {
        let mut slots = BTreeMap::new();
        let mut next_block = 0;
        // Descriptors are sorted by (set, binding).
        for descriptor in &reflection.descriptors {
            let key = (descriptor.set, descriptor.binding);
            let flat = match descriptor.kind {
                DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer => {
                    let slot = next_block;
                    next_block += 1;
                    FlatBinding {
                        kind: FlatBindingKind::UniformBlock,
                        slot,
                    }
                }
                DescriptorKind::SampledTexture | DescriptorKind::DepthTexture => FlatBinding {
                    kind: FlatBindingKind::TextureUnit,
                    slot: unit_slot(descriptor.set, descriptor.binding)?,
                },
                DescriptorKind::Sampler | DescriptorKind::ComparisonSampler => FlatBinding {
                    kind: FlatBindingKind::Sampler,
                    slot: unit_slot(descriptor.set, descriptor.binding)?,
                },
            };
            slots.insert(key, flat);
        }
        Ok(Self { slots })
    }

    /// Builds the remap from the bind group layouts of a pipeline, one slice
    /// of entries per set in set order.
    ///
    /// Produces the same slots as [`from_reflection`](Self::from_reflection)
    /// for layouts derived from that reflection, which lets a flat-binding
    /// backend resolve bind groups without seeing the shader.
    pub fn from_layouts<'a>(
        sets: impl IntoIterator<Item = &'a [BindGroupLayoutEntry]>,
    ) -> Result<Self, ShaderError> {
        let mut slots = BTreeMap::new();
        let mut next_block = 0;
        for (set, entries) in sets.into_iter().enumerate() {
            let set = set as u32;
            let mut sorted: Vec<&BindGroupLayoutEntry> = entries.iter().collect();
            sorted.sort_by_key(|e| e.binding);
            for entry in sorted {
                let flat = match entry.ty {
                    BindingType::UniformBuffer { .. } => {
                        let slot = next_block;
                        next_block += 1;
                        FlatBinding {
                            kind: FlatBindingKind::UniformBlock,
                            slot,
                        }
                    }
                    BindingType::Texture { .. } => FlatBinding {
                        kind: FlatBindingKind::TextureUnit,
                        slot: unit_slot(set, entry.binding)?,
                    },
                    BindingType::Sampler(_) => FlatBinding {
                        kind: FlatBindingKind::Sampler,
                        slot: unit_slot(set, entry.binding)?,
                    },
                };
                slots.insert((set, entry.binding), flat);
            }
        }
        Ok(Self { slots })
    }

    /// The flat slot of a binding, if the shader declares it.
    pub fn flat(&self, set: u32, binding: u32) -> Option<FlatBinding> {
        self.slots.get(&(set, binding)).copied()
    }

    /// Number of uniform block binding points in use.
    pub fn uniform_block_count(&self) -> usize {
        self.slots
            .values()
            .filter(|f| f.kind == FlatBindingKind::UniformBlock)
            .count()
    }

    /// Every mapping in `(set, binding)` order.
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u32), FlatBinding)> + '_ {
        self.slots.iter().map(|(k, v)| (*k, *v))
    }
}

fn unit_slot(set: u32, binding: u32) -> Result<u32, ShaderError> {
    if binding >= FLAT_BINDINGS_PER_SET {
        log::error!("BindingRemap: binding {binding} of set {set} exceeds {FLAT_BINDINGS_PER_SET} slots");
        return Err(ShaderError::BindingOutOfRange { set, binding });
    }
    Ok(set * FLAT_BINDINGS_PER_SET + binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::util::flags::ShaderStageFlags;
    use crate::renderer::shader::reflection::DescriptorInfo;

    fn descriptor(set: u32, binding: u32, kind: DescriptorKind) -> DescriptorInfo {
        DescriptorInfo {
            set,
            binding,
            name: format!("d{set}_{binding}"),
            kind,
            view_dimension: None,
            size: 0,
            stages: ShaderStageFlags::FRAGMENT,
            block: None,
        }
    }

    #[test]
    fn textures_use_sixteen_slots_per_set_and_blocks_are_sequential() {
        let reflection = ShaderReflection {
            descriptors: vec![
                descriptor(0, 0, DescriptorKind::UniformBuffer),
                descriptor(0, 3, DescriptorKind::UniformBuffer),
                descriptor(1, 0, DescriptorKind::SampledTexture),
                descriptor(1, 1, DescriptorKind::Sampler),
                descriptor(2, 0, DescriptorKind::UniformBuffer),
                descriptor(2, 2, DescriptorKind::DepthTexture),
            ],
            ..Default::default()
        };
        let remap = BindingRemap::from_reflection(&reflection).unwrap();

        assert_eq!(remap.flat(0, 3).unwrap().slot, 1);
        assert_eq!(remap.flat(2, 0).unwrap().slot, 2);
        assert_eq!(remap.uniform_block_count(), 3);

        let texture = remap.flat(1, 0).unwrap();
        assert_eq!(texture.kind, FlatBindingKind::TextureUnit);
        assert_eq!(texture.slot, 16);
        assert_eq!(remap.flat(2, 2).unwrap().slot, 34);
        assert_eq!(remap.flat(1, 1).unwrap().kind, FlatBindingKind::Sampler);
        assert!(remap.flat(5, 5).is_none());
    }

    #[test]
    fn layouts_resolve_like_reflection() {
        use crate::renderer::api::bind_group::{SamplerBindingType, TextureSampleType};
        use crate::renderer::api::texture::TextureViewDimension;

        let uniform = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer {
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        };
        let set0 = [uniform(3), uniform(0)];
        let set1 = [
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            },
        ];
        let set2 = [uniform(0)];
        let remap = BindingRemap::from_layouts([&set0[..], &set1[..], &set2[..]]).unwrap();

        let reflection = ShaderReflection {
            descriptors: vec![
                descriptor(0, 0, DescriptorKind::UniformBuffer),
                descriptor(0, 3, DescriptorKind::UniformBuffer),
                descriptor(1, 0, DescriptorKind::SampledTexture),
                descriptor(1, 1, DescriptorKind::Sampler),
                descriptor(2, 0, DescriptorKind::UniformBuffer),
            ],
            ..Default::default()
        };
        assert_eq!(remap, BindingRemap::from_reflection(&reflection).unwrap());
    }

    #[test]
    fn bindings_past_the_set_range_are_rejected() {
        use crate::renderer::api::bind_group::SamplerBindingType;

        let reflection = ShaderReflection {
            descriptors: vec![
                descriptor(0, 15, DescriptorKind::SampledTexture),
                descriptor(0, 16, DescriptorKind::Sampler),
                descriptor(1, 0, DescriptorKind::SampledTexture),
            ],
            ..Default::default()
        };
        assert!(matches!(
            BindingRemap::from_reflection(&reflection),
            Err(ShaderError::BindingOutOfRange { set: 0, binding: 16 })
        ));

        // Uniform blocks are numbered sequentially and have no per-set range.
        let blocks = ShaderReflection {
            descriptors: vec![descriptor(0, 20, DescriptorKind::UniformBuffer)],
            ..Default::default()
        };
        assert_eq!(BindingRemap::from_reflection(&blocks).unwrap().flat(0, 20).unwrap().slot, 0);

        let set0 = [BindGroupLayoutEntry {
            binding: 16,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler(SamplerBindingType::Filtering),
        }];
        assert!(matches!(
            BindingRemap::from_layouts([&set0[..]]),
            Err(ShaderError::BindingOutOfRange { set: 0, binding: 16 })
        ));
    }
}
