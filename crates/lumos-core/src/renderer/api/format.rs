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

//! Pixel and vertex formats understood by every backend.

use serde::{Deserialize, Serialize};

/// The texel format of a texture or render attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum RhiFormat {
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16G16Float,
    R16G16B16A16Float,
    R32Float,
    R32G32B32A32Float,
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
}

impl RhiFormat {
    /// Size of one texel in bytes.
    pub const fn bytes_per_pixel(&self) -> u32 {
        match self {
            RhiFormat::R8Unorm => 1,
            RhiFormat::R8G8Unorm | RhiFormat::D16Unorm => 2,
            RhiFormat::R8G8B8A8Unorm
            | RhiFormat::R8G8B8A8Srgb
            | RhiFormat::B8G8R8A8Unorm
            | RhiFormat::B8G8R8A8Srgb
            | RhiFormat::R16G16Float
            | RhiFormat::R32Float
            | RhiFormat::D24UnormS8Uint
            | RhiFormat::D32Float => 4,
            RhiFormat::R16G16B16A16Float => 8,
            RhiFormat::R32G32B32A32Float => 16,
        }
    }

    /// Whether this is a depth (or depth-stencil) format.
    pub const fn is_depth(&self) -> bool {
        matches!(
            self,
            RhiFormat::D16Unorm | RhiFormat::D24UnormS8Uint | RhiFormat::D32Float
        )
    }

    /// Whether the format carries a stencil aspect.
    pub const fn has_stencil(&self) -> bool {
        matches!(self, RhiFormat::D24UnormS8Uint)
    }

    /// Whether sampling decodes sRGB to linear.
    pub const fn is_srgb(&self) -> bool {
        matches!(self, RhiFormat::R8G8B8A8Srgb | RhiFormat::B8G8R8A8Srgb)
    }

    /// Whether the format stores floating point values.
    pub const fn is_float(&self) -> bool {
        matches!(
            self,
            RhiFormat::R16G16Float
                | RhiFormat::R16G16B16A16Float
                | RhiFormat::R32Float
                | RhiFormat::R32G32B32A32Float
        )
    }

    /// Whether linear filtering may be used when sampling this format.
    pub const fn is_filterable(&self) -> bool {
        !matches!(
            self,
            RhiFormat::R32Float | RhiFormat::R32G32B32A32Float | RhiFormat::D32Float
        )
    }

    /// Returns the sRGB or linear variant of an 8-bit colour format.
    pub const fn with_srgb(self, srgb: bool) -> Self {
        match (self, srgb) {
            (RhiFormat::R8G8B8A8Unorm, true) => RhiFormat::R8G8B8A8Srgb,
            (RhiFormat::R8G8B8A8Srgb, false) => RhiFormat::R8G8B8A8Unorm,
            (RhiFormat::B8G8R8A8Unorm, true) => RhiFormat::B8G8R8A8Srgb,
            (RhiFormat::B8G8R8A8Srgb, false) => RhiFormat::B8G8R8A8Unorm,
            (other, _) => other,
        }
    }
}

/// The format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Unorm8x4,
}

impl VertexFormat {
    /// Size of the attribute in bytes.
    pub const fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_are_flagged() {
        assert!(RhiFormat::D32Float.is_depth());
        assert!(RhiFormat::D24UnormS8Uint.has_stencil());
        assert!(!RhiFormat::R8G8B8A8Unorm.is_depth());
    }

    #[test]
    fn srgb_toggle_only_affects_8bit_colour() {
        assert_eq!(
            RhiFormat::R8G8B8A8Unorm.with_srgb(true),
            RhiFormat::R8G8B8A8Srgb
        );
        assert_eq!(
            RhiFormat::R16G16B16A16Float.with_srgb(true),
            RhiFormat::R16G16B16A16Float
        );
        assert_eq!(RhiFormat::R32G32B32A32Float.bytes_per_pixel(), 16);
    }
}
