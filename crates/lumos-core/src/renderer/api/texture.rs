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

//! Defines data structures related to GPU texture and sampler resources.

use crate::renderer::api::format::RhiFormat;
use crate::renderer::api::pipeline::CompareFunction;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// An opaque handle to a view into a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub usize);

/// Width, height and depth (or layer count) of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth for 3D textures, array layer count otherwise.
    pub depth_or_array_layers: u32,
}

impl Extent3d {
    /// A single-layer 2D extent.
    pub const fn d2(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }
}

/// A texel coordinate inside a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin3d {
    /// X texel.
    pub x: u32,
    /// Y texel.
    pub y: u32,
    /// Z texel or array layer.
    pub z: u32,
}

/// Layout of CPU data uploaded to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureDataLayout {
    /// Bytes between rows.
    pub bytes_per_row: Option<u32>,
    /// Rows between array layers.
    pub rows_per_image: Option<u32>,
}

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// One-dimensional.
    D1,
    /// Two-dimensional (also arrays and cubes).
    D2,
    /// Volumetric.
    D3,
}

/// The dimensionality of a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    /// 1D view.
    D1,
    /// 2D view of a single layer.
    D2,
    /// 2D array view.
    D2Array,
    /// Cubemap view of six layers.
    Cube,
    /// Array of cubemaps.
    CubeArray,
    /// 3D view.
    D3,
}

/// Which aspects of a texture a view accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageAspect {
    /// Every aspect.
    #[default]
    All,
    /// The stencil component only.
    StencilOnly,
    /// The depth component only.
    DepthOnly,
}

/// How coordinates outside `[0, 1]` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressMode {
    /// Wrap around.
    #[default]
    Repeat,
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Wrap around with mirroring.
    MirrorRepeat,
    /// Use a fixed border colour.
    ClampToBorder,
}

/// Texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

crate::lumos_bitflags! {
    /// Allowed usages of a texture.
    pub struct TextureUsage: u32 {
        /// Source of a copy.
        const COPY_SRC = 1 << 0;
        /// Destination of a copy or upload.
        const COPY_DST = 1 << 1;
        /// Sampled from shaders.
        const TEXTURE_BINDING = 1 << 2;
        /// Read/write storage access.
        const STORAGE_BINDING = 1 << 3;
        /// Colour or depth attachment of a render pass.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Describes a texture to create.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size and layer count.
    pub size: Extent3d,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// MSAA sample count.
    pub sample_count: u32,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Texel format.
    pub format: RhiFormat,
    /// Allowed usages.
    pub usage: TextureUsage,
}

impl TextureDescriptor<'_> {
    /// Bytes occupied by the base mip level of every layer.
    pub fn base_level_size_in_bytes(&self) -> u64 {
        self.size.width as u64
            * self.size.height as u64
            * self.size.depth_or_array_layers as u64
            * self.format.bytes_per_pixel() as u64
    }
}

/// Describes a view into a texture.
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Format override; defaults to the texture's format.
    pub format: Option<RhiFormat>,
    /// Dimension override; defaults to the texture's natural dimension.
    pub dimension: Option<TextureViewDimension>,
    /// Accessed aspect.
    pub aspect: ImageAspect,
    /// First mip level.
    pub base_mip_level: u32,
    /// Number of mip levels; `None` for all remaining.
    pub mip_level_count: Option<u32>,
    /// First array layer.
    pub base_array_layer: u32,
    /// Number of layers; `None` for all remaining.
    pub array_layer_count: Option<u32>,
}

/// Describes a sampler.
#[derive(Debug, Clone)]
pub struct SamplerDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// U addressing.
    pub address_mode_u: AddressMode,
    /// V addressing.
    pub address_mode_v: AddressMode,
    /// W addressing.
    pub address_mode_w: AddressMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Filter between mip levels.
    pub mipmap_filter: FilterMode,
    /// Minimum level of detail.
    pub lod_min_clamp: f32,
    /// Maximum level of detail.
    pub lod_max_clamp: f32,
    /// Comparison function for depth samplers.
    pub compare: Option<CompareFunction>,
    /// Maximum anisotropy; `1` disables it.
    pub anisotropy_clamp: u16,
}

impl Default for SamplerDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
        }
    }
}
