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

//! Small bit-flag sets used throughout the rendering API.

use crate::renderer::api::shader::ShaderStage;

/// Declares a `Copy` bit-flag set with the usual set operations.
#[macro_export]
macro_rules! lumos_bitflags {
    (
        $(#[$outer:meta])*
        pub struct $name:ident: $ty:ty {
            $(
                $(#[$inner:meta])*
                const $flag:ident = $value:expr;
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name {
            bits: $ty,
        }

        impl $name {
            $(
                $(#[$inner])*
                pub const $flag: Self = Self { bits: $value };
            )*

            /// The empty set.
            pub const fn empty() -> Self {
                Self { bits: 0 }
            }

            /// Every declared flag.
            pub const fn all() -> Self {
                Self { bits: 0 $(| $value)* }
            }

            /// Raw bits.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Builds a set from raw bits, dropping undeclared ones.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self { bits: bits & Self::all().bits }
            }

            /// Whether every flag of `other` is set.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Whether at least one flag of `other` is set.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Whether no flag is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Union of both sets.
            pub const fn union(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self::Output {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                *self = self.union(rhs);
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self::Output {
                Self { bits: self.bits & rhs.bits }
            }
        }
    };
}

lumos_bitflags! {
    /// Shader stages that can access a binding or a push-constant range.
    pub struct ShaderStageFlags: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Geometry stage.
        const GEOMETRY = 1 << 2;
        /// Compute stage.
        const COMPUTE = 1 << 3;
    }
}

impl ShaderStageFlags {
    /// Vertex and fragment stages together.
    pub const VERTEX_FRAGMENT: Self = Self::VERTEX.union(Self::FRAGMENT);

    /// Flags holding exactly one stage.
    pub const fn from_stage(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Geometry => Self::GEOMETRY,
            ShaderStage::Compute => Self::COMPUTE,
        }
    }

    /// Whether the given stage is part of the set.
    pub const fn has_stage(&self, stage: ShaderStage) -> bool {
        self.contains(Self::from_stage(stage))
    }
}

impl From<ShaderStage> for ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        Self::from_stage(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains() {
        let flags = ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        assert_eq!(flags, ShaderStageFlags::VERTEX_FRAGMENT);
        assert!(flags.has_stage(ShaderStage::Vertex));
        assert!(!flags.has_stage(ShaderStage::Geometry));
        assert!(flags.intersects(ShaderStageFlags::FRAGMENT | ShaderStageFlags::COMPUTE));
    }

    #[test]
    fn truncate_drops_unknown_bits() {
        let flags = ShaderStageFlags::from_bits_truncate(0xFF);
        assert_eq!(flags, ShaderStageFlags::all());
        assert!(ShaderStageFlags::empty().is_empty());
    }
}
