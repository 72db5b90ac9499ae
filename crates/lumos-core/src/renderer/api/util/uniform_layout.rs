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

//! CPU-side description of uniform blocks with automatic offsets.
//!
//! A [`UniformLayout`] lists the fields of a uniform struct in declaration
//! order and computes every offset with the uniform address-space rules
//! (the std140-like rules WGSL applies to `var<uniform>`):
//!
//! | type            | align | size |
//! |-----------------|-------|------|
//! | `f32 i32 u32`   | 4     | 4    |
//! | `vec2`          | 8     | 8    |
//! | `vec3`          | 16    | 12   |
//! | `vec4`          | 16    | 16   |
//! | `mat3x3`        | 16    | 48   |
//! | `mat4x4`        | 16    | 64   |
//! | struct          | 16    | end rounded up to 16 |
//! | `array<T, N>`   | 16    | `N * round_up(16, size(T))` |
//!
//! The layout is checked against the shader's reflected struct with
//! [`UniformLayout::validate_against`], and [`UniformBlock`] writes values
//! by path (`"lights[2].color"`) into a staging byte buffer.

use crate::math::{LinearRgba, Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::renderer::error::{PipelineError, ResourceError};
use crate::renderer::shader::reflection::{ReflectedMember, ReflectedStruct};
use std::fmt::Write as _;
use std::sync::Arc;

/// Uniform buffers and struct members start on 16-byte boundaries.
pub const UNIFORM_STRUCT_ALIGNMENT: u32 = 16;

#[inline]
const fn round_up(alignment: u32, value: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// The type of one uniform field.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformType {
    /// `f32`
    Float,
    /// `i32`
    Int,
    /// `u32`
    UInt,
    /// `vec2<f32>`
    Vec2,
    /// `vec3<f32>`
    Vec3,
    /// `vec4<f32>`
    Vec4,
    /// `mat3x3<f32>`
    Mat3,
    /// `mat4x4<f32>`
    Mat4,
    /// A nested struct.
    Struct(Arc<UniformLayout>),
}

impl UniformType {
    /// Required alignment in the uniform address space.
    pub fn align(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3
            | UniformType::Vec4
            | UniformType::Mat3
            | UniformType::Mat4
            | UniformType::Struct(_) => UNIFORM_STRUCT_ALIGNMENT,
        }
    }

    /// Size in bytes, excluding trailing padding of arrays.
    pub fn size(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat3 => 48,
            UniformType::Mat4 => 64,
            UniformType::Struct(layout) => layout.size(),
        }
    }

    /// Distance between two elements of an array of this type.
    pub fn array_stride(&self) -> u32 {
        round_up(UNIFORM_STRUCT_ALIGNMENT, round_up(self.align(), self.size()))
    }

    fn name(&self) -> &str {
        match self {
            UniformType::Float => "f32",
            UniformType::Int => "i32",
            UniformType::UInt => "u32",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Mat3 => "mat3x3",
            UniformType::Mat4 => "mat4x4",
            UniformType::Struct(layout) => layout.name(),
        }
    }
}

/// A placed field of a [`UniformLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    /// Field name as declared in the shader.
    pub name: String,
    /// Element type.
    pub ty: UniformType,
    /// Element count for arrays.
    pub array_len: Option<u32>,
    /// Byte offset from the start of the enclosing struct.
    pub offset: u32,
}

impl UniformField {
    /// Bytes occupied by the field, including array padding.
    pub fn size(&self) -> u32 {
        match self.array_len {
            Some(len) => len * self.ty.array_stride(),
            None => self.ty.size(),
        }
    }

    fn align(&self) -> u32 {
        match self.array_len {
            Some(_) => round_up(UNIFORM_STRUCT_ALIGNMENT, self.ty.align()),
            None => self.ty.align(),
        }
    }
}

/// An ordered list of uniform fields with computed offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    name: String,
    fields: Vec<UniformField>,
    size: u32,
}

impl UniformLayout {
    /// Starts a layout for the struct called `name`.
    pub fn builder(name: impl Into<String>) -> UniformLayoutBuilder {
        UniformLayoutBuilder {
            name: name.into(),
            fields: Vec::new(),
            cursor: 0,
        }
    }

    /// Struct name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    /// Total size, rounded up to the struct alignment.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Finds a top-level field.
    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolves a path such as `lights[2].color` into a byte offset and the
    /// type stored there.
    pub fn locate(&self, path: &str) -> Result<(u32, &UniformType), ResourceError> {
        let unknown = || ResourceError::UnknownUniform(format!("{}.{}", self.name, path));
        let mut layout = self;
        let mut base = 0u32;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let (field_name, index) = parse_segment(segment).ok_or_else(unknown)?;
            let field = layout.field(field_name).ok_or_else(unknown)?;
            let mut offset = base + field.offset;

            match (field.array_len, index) {
                (Some(len), Some(i)) if i < len => offset += i * field.ty.array_stride(),
                (Some(_), Some(_)) => return Err(ResourceError::OutOfBounds),
                (None, Some(_)) => return Err(unknown()),
                // A bare array name addresses element 0.
                (_, None) => {}
            }

            if segments.peek().is_none() {
                return Ok((offset, &field.ty));
            }
            match &field.ty {
                UniformType::Struct(inner) => {
                    layout = inner.as_ref();
                    base = offset;
                }
                _ => return Err(unknown()),
            }
        }
        Err(unknown())
    }

    /// Compares the computed offsets with the struct a shader declares.
    ///
    /// Every field must exist in the shader at the same offset with the same
    /// size, nested structs are compared recursively, and the buffer sizes
    /// must agree once rounded to the uniform alignment.
    pub fn validate_against(&self, reflected: &ReflectedStruct) -> Result<(), PipelineError> {
        let mut details = String::new();
        compare_members(self, &reflected.members, "", &mut details);

        let reflected_size = round_up(UNIFORM_STRUCT_ALIGNMENT, reflected.span);
        if reflected_size != self.size {
            let _ = write!(
                details,
                "struct size is {} on the CPU but {} in the shader; ",
                self.size, reflected_size
            );
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::LayoutMismatch {
                block: self.name.clone(),
                details: details.trim_end_matches("; ").to_string(),
            })
        }
    }
}

fn compare_members(
    layout: &UniformLayout,
    members: &[ReflectedMember],
    prefix: &str,
    details: &mut String,
) {
    if layout.fields.len() != members.len() {
        let _ = write!(
            details,
            "{}{} has {} fields on the CPU but {} in the shader; ",
            prefix,
            layout.name,
            layout.fields.len(),
            members.len()
        );
    }

    for field in &layout.fields {
        let Some(member) = members.iter().find(|m| m.name == field.name) else {
            let _ = write!(details, "{}{} missing in shader; ", prefix, field.name);
            continue;
        };
        if member.offset != field.offset {
            let _ = write!(
                details,
                "{}{} at offset {} but shader expects {}; ",
                prefix, field.name, field.offset, member.offset
            );
        }
        if member.size != field.size() {
            let _ = write!(
                details,
                "{}{} ({}) is {} bytes but shader declares {}; ",
                prefix,
                field.name,
                field.ty.name(),
                field.size(),
                member.size
            );
        }
        if let (Some(stride), Some(_)) = (member.array_stride, field.array_len) {
            if stride != field.ty.array_stride() {
                let _ = write!(
                    details,
                    "{}{} array stride {} but shader uses {}; ",
                    prefix,
                    field.name,
                    field.ty.array_stride(),
                    stride
                );
            }
        }
        if let UniformType::Struct(inner) = &field.ty {
            let nested_prefix = format!("{}{}.", prefix, field.name);
            compare_members(inner, &member.members, &nested_prefix, details);
        }
    }
}

fn parse_segment(segment: &str) -> Option<(&str, Option<u32>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let close = segment.strip_suffix(']')?;
            let index = close[open + 1..].parse().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}

/// Builds a [`UniformLayout`] field by field.
#[derive(Debug)]
pub struct UniformLayoutBuilder {
    name: String,
    fields: Vec<UniformField>,
    cursor: u32,
}

impl UniformLayoutBuilder {
    /// Appends a scalar, vector, matrix or struct field.
    pub fn field(self, name: impl Into<String>, ty: UniformType) -> Self {
        self.push(name.into(), ty, None)
    }

    /// Appends a fixed-size array field.
    pub fn array(self, name: impl Into<String>, ty: UniformType, len: u32) -> Self {
        self.push(name.into(), ty, Some(len.max(1)))
    }

    fn push(mut self, name: String, ty: UniformType, array_len: Option<u32>) -> Self {
        let mut field = UniformField {
            name,
            ty,
            array_len,
            offset: 0,
        };
        // A member following a struct or an array starts on a new 16-byte row.
        let follows_aggregate = self
            .fields
            .last()
            .is_some_and(|f| f.array_len.is_some() || matches!(f.ty, UniformType::Struct(_)));
        let align = if follows_aggregate {
            field.align().max(UNIFORM_STRUCT_ALIGNMENT)
        } else {
            field.align()
        };
        field.offset = round_up(align, self.cursor);
        self.cursor = field.offset + field.size();
        self.fields.push(field);
        self
    }

    /// Finishes the layout.
    pub fn build(self) -> UniformLayout {
        UniformLayout {
            size: round_up(UNIFORM_STRUCT_ALIGNMENT, self.cursor.max(1)),
            name: self.name,
            fields: self.fields,
        }
    }
}

/// A value that can be written into a uniform field.
pub trait UniformValue {
    /// Declared type the value must be written to.
    fn uniform_type(&self) -> UniformType;
    /// Writes exactly `self.uniform_type().size()` bytes.
    fn write_bytes(&self, out: &mut [u8]);
}

macro_rules! pod_uniform_value {
    ($ty:ty, $variant:ident) => {
        impl UniformValue for $ty {
            fn uniform_type(&self) -> UniformType {
                UniformType::$variant
            }

            fn write_bytes(&self, out: &mut [u8]) {
                out.copy_from_slice(bytemuck::bytes_of(self));
            }
        }
    };
}

pod_uniform_value!(f32, Float);
pod_uniform_value!(i32, Int);
pod_uniform_value!(u32, UInt);
pod_uniform_value!(Vec2, Vec2);
pod_uniform_value!(Vec3, Vec3);
pod_uniform_value!(Vec4, Vec4);
pod_uniform_value!(Mat4, Mat4);

impl UniformValue for Mat3 {
    fn uniform_type(&self) -> UniformType {
        UniformType::Mat3
    }

    // Each column is padded to a vec4.
    fn write_bytes(&self, out: &mut [u8]) {
        for (i, column) in [self.x_axis, self.y_axis, self.z_axis].iter().enumerate() {
            let padded = column.extend(0.0);
            out[i * 16..(i + 1) * 16].copy_from_slice(bytemuck::bytes_of(&padded));
        }
    }
}

impl UniformValue for LinearRgba {
    fn uniform_type(&self) -> UniformType {
        UniformType::Vec4
    }

    fn write_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(bytemuck::bytes_of(self));
    }
}

/// Staging bytes for one uniform block, written by field path.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: Arc<UniformLayout>,
    data: Vec<u8>,
}

impl UniformBlock {
    /// A zero-filled block for `layout`.
    pub fn new(layout: Arc<UniformLayout>) -> Self {
        let data = vec![0u8; layout.size() as usize];
        Self { layout, data }
    }

    /// The layout this block follows.
    pub fn layout(&self) -> &Arc<UniformLayout> {
        &self.layout
    }

    /// Writes `value` at `path`.
    ///
    /// ## Errors
    /// * `ResourceError::UnknownUniform` - If the path does not exist.
    /// * `ResourceError::OutOfBounds` - If an array index is past the end.
    /// * `ResourceError::InvalidDescriptor` - If the value type differs from the field type.
    pub fn set<V: UniformValue>(&mut self, path: &str, value: &V) -> Result<(), ResourceError> {
        let (offset, ty) = self.layout.locate(path)?;
        let expected = value.uniform_type();
        if *ty != expected {
            return Err(ResourceError::InvalidDescriptor(format!(
                "uniform '{}' is {} but a {} was written",
                path,
                ty.name(),
                expected.name()
            )));
        }
        let start = offset as usize;
        let end = start + expected.size() as usize;
        value.write_bytes(&mut self.data[start..end]);
        Ok(())
    }

    /// Copies raw bytes at `path`; the length must not exceed the field.
    pub fn set_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), ResourceError> {
        let (offset, ty) = self.layout.locate(path)?;
        if bytes.len() > ty.size() as usize {
            return Err(ResourceError::DataSizeMismatch {
                expected: ty.size() as usize,
                actual: bytes.len(),
            });
        }
        let start = offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Zeroes the whole block.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// The packed bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_layout() -> Arc<UniformLayout> {
        Arc::new(
            UniformLayout::builder("Light")
                .field("position", UniformType::Vec4)
                .field("color", UniformType::Vec4)
                .field("direction", UniformType::Vec3)
                .field("intensity", UniformType::Float)
                .build(),
        )
    }

    #[test]
    fn vec3_followed_by_scalar_shares_a_row() {
        let layout = light_layout();
        assert_eq!(layout.field("direction").unwrap().offset, 32);
        assert_eq!(layout.field("intensity").unwrap().offset, 44);
        assert_eq!(layout.size(), 48);
    }

    #[test]
    fn scalar_arrays_use_a_sixteen_byte_stride() {
        let layout = UniformLayout::builder("Splits")
            .array("split_depths", UniformType::Float, 4)
            .field("count", UniformType::UInt)
            .build();
        assert_eq!(layout.field("split_depths").unwrap().size(), 64);
        assert_eq!(layout.field("count").unwrap().offset, 64);
        assert_eq!(layout.size(), 80);
    }

    #[test]
    fn mat3_is_three_padded_columns() {
        let layout = UniformLayout::builder("M")
            .field("scale", UniformType::Float)
            .field("normal", UniformType::Mat3)
            .field("tail", UniformType::Vec2)
            .build();
        assert_eq!(layout.field("normal").unwrap().offset, 16);
        assert_eq!(layout.field("tail").unwrap().offset, 64);
        assert_eq!(layout.size(), 80);
    }

    #[test]
    fn locate_resolves_nested_array_paths() {
        let layout = UniformLayout::builder("Lights")
            .field("count", UniformType::UInt)
            .array("lights", UniformType::Struct(light_layout()), 8)
            .build();
        let (offset, ty) = layout.locate("lights[2].color").unwrap();
        assert_eq!(offset, 16 + 2 * 48 + 16);
        assert_eq!(*ty, UniformType::Vec4);
        assert!(matches!(
            layout.locate("lights[8].color"),
            Err(ResourceError::OutOfBounds)
        ));
        assert!(matches!(
            layout.locate("lights[0].missing"),
            Err(ResourceError::UnknownUniform(_))
        ));
    }

    #[test]
    fn block_rejects_type_mismatch() {
        let mut block = UniformBlock::new(light_layout());
        block.set("intensity", &2.0f32).unwrap();
        assert_eq!(&block.as_bytes()[44..48], &2.0f32.to_le_bytes());
        assert!(block.set("intensity", &Vec4::ONE).is_err());
    }

    #[test]
    fn mat3_write_pads_columns() {
        let layout = Arc::new(
            UniformLayout::builder("M")
                .field("m", UniformType::Mat3)
                .build(),
        );
        let mut block = UniformBlock::new(layout);
        block.set("m", &Mat3::IDENTITY).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(block.as_bytes());
        assert_eq!(&floats[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn validation_reports_offset_drift() {
        let layout = light_layout();
        let reflected = ReflectedStruct {
            name: "Light".into(),
            span: 48,
            members: vec![
                ReflectedMember::leaf("position", 0, 16),
                ReflectedMember::leaf("color", 16, 16),
                ReflectedMember::leaf("direction", 32, 12),
                ReflectedMember::leaf("intensity", 44, 4),
            ],
        };
        assert!(layout.validate_against(&reflected).is_ok());

        let drifted = ReflectedStruct {
            members: vec![
                ReflectedMember::leaf("position", 0, 16),
                ReflectedMember::leaf("color", 16, 16),
                ReflectedMember::leaf("direction", 32, 12),
                ReflectedMember::leaf("intensity", 48, 4),
            ],
            span: 64,
            ..reflected
        };
        let err = layout.validate_against(&drifted).unwrap_err();
        match err {
            PipelineError::LayoutMismatch { block, details } => {
                assert_eq!(block, "Light");
                assert!(details.contains("intensity at offset 44 but shader expects 48"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
