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

//! Bind group (descriptor set) layouts and instances at the device level.

use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::texture::{SamplerId, TextureViewDimension, TextureViewId};
use crate::renderer::api::util::flags::ShaderStageFlags;

/// An opaque handle to a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupLayoutId(pub usize);

/// An opaque handle to a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupId(pub usize);

/// How a texture binding is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    /// Floating point texels.
    Float {
        /// Whether linear filtering is allowed.
        filterable: bool,
    },
    /// Depth texels, usable with comparison samplers.
    Depth,
}

/// Kind of sampler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBindingType {
    /// Regular filtering sampler.
    Filtering,
    /// Sampler that never filters.
    NonFiltering,
    /// Depth comparison sampler.
    Comparison,
}

/// What kind of resource a binding expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A uniform buffer range.
    UniformBuffer {
        /// Whether a dynamic offset is supplied at bind time.
        has_dynamic_offset: bool,
        /// Minimum size of the bound range.
        min_binding_size: Option<u64>,
    },
    /// A sampled texture.
    Texture {
        /// Sample type.
        sample_type: TextureSampleType,
        /// View dimension.
        view_dimension: TextureViewDimension,
        /// Whether the texture is multisampled.
        multisampled: bool,
    },
    /// A sampler.
    Sampler(SamplerBindingType),
}

/// One binding slot of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// Binding index within the set.
    pub binding: u32,
    /// Stages that read the binding.
    pub visibility: ShaderStageFlags,
    /// Expected resource kind.
    pub ty: BindingType,
}

/// Describes a bind group layout.
#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// Debug label.
    pub label: Option<&'a str>,
    /// Binding slots.
    pub entries: &'a [BindGroupLayoutEntry],
}

/// A buffer range bound to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    /// Bound buffer.
    pub buffer: BufferId,
    /// Start of the range.
    pub offset: u64,
    /// Size of the range; `None` for the rest of the buffer.
    pub size: Option<u64>,
}

/// A resource bound to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    /// Uniform buffer range.
    Buffer(BufferBinding),
    /// Texture view.
    TextureView(TextureViewId),
    /// Sampler.
    Sampler(SamplerId),
}

/// A resource assigned to one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupEntry {
    /// Binding index within the set.
    pub binding: u32,
    /// Bound resource.
    pub resource: BindingResource,
}

/// Describes a bind group.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// Debug label.
    pub label: Option<&'a str>,
    /// Layout the group conforms to.
    pub layout: BindGroupLayoutId,
    /// Bound resources.
    pub entries: &'a [BindGroupEntry],
}
