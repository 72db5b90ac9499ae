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

//! Resource reflection of WGSL stages through `naga`.

use crate::renderer::api::bind_group::{
    BindGroupLayoutEntry, BindingType, SamplerBindingType, TextureSampleType,
};
use crate::renderer::api::shader::ShaderStage;
use crate::renderer::api::texture::TextureViewDimension;
use crate::renderer::api::util::flags::ShaderStageFlags;
use crate::renderer::error::ShaderError;
use naga::valid::{Capabilities, ValidationFlags, Validator};

/// What a reflected binding holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// `var<uniform>`.
    UniformBuffer,
    /// `var<storage>`.
    StorageBuffer,
    /// A float texture sampled with a filtering sampler.
    SampledTexture,
    /// A depth texture.
    DepthTexture,
    /// `sampler`.
    Sampler,
    /// `sampler_comparison`.
    ComparisonSampler,
}

/// A member of a reflected struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedMember {
    /// Member name.
    pub name: String,
    /// Byte offset inside the struct.
    pub offset: u32,
    /// Byte size.
    pub size: u32,
    /// Element stride for arrays.
    pub array_stride: Option<u32>,
    /// Members of a struct (or of an array's struct element).
    pub members: Vec<ReflectedMember>,
}

impl ReflectedMember {
    /// A scalar, vector or matrix member.
    pub fn leaf(name: impl Into<String>, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            array_stride: None,
            members: Vec::new(),
        }
    }
}

/// A struct as laid out by the shader compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedStruct {
    /// Type name.
    pub name: String,
    /// Size including trailing padding.
    pub span: u32,
    /// Members in declaration order.
    pub members: Vec<ReflectedMember>,
}

/// A resource binding declared by the shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    /// Descriptor set (`@group`).
    pub set: u32,
    /// Binding index (`@binding`).
    pub binding: u32,
    /// Variable name.
    pub name: String,
    /// Resource kind.
    pub kind: DescriptorKind,
    /// View dimension for textures.
    pub view_dimension: Option<TextureViewDimension>,
    /// Buffer size for uniform and storage buffers.
    pub size: u32,
    /// Stages reading the binding.
    pub stages: ShaderStageFlags,
    /// Struct layout of uniform buffers.
    pub block: Option<ReflectedStruct>,
}

/// A push-constant block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstantInfo {
    /// Variable name.
    pub name: String,
    /// Block size.
    pub size: u32,
    /// Stages reading the block.
    pub stages: ShaderStageFlags,
    /// Struct layout, when the block is a struct.
    pub block: Option<ReflectedStruct>,
}

/// Everything a pipeline needs to know about a shader's interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    /// Bindings sorted by `(set, binding)`.
    pub descriptors: Vec<DescriptorInfo>,
    /// Push-constant blocks.
    pub push_constants: Vec<PushConstantInfo>,
    /// Entry points and their stages.
    pub entry_points: Vec<(ShaderStage, String)>,
}

impl ShaderReflection {
    /// Parses and validates WGSL, then reflects its interface.
    ///
    /// `label` only decorates error messages.
    pub fn from_wgsl(source: &str, label: &str) -> Result<Self, ShaderError> {
        let module =
            naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::CompilationError {
                label: label.to_string(),
                details: e.emit_to_string(source),
            })?;
        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| ShaderError::CompilationError {
                label: label.to_string(),
                details: e.as_inner().to_string(),
            })?;
        Ok(Self::from_module(&module, &info))
    }

    fn from_module(module: &naga::Module, info: &naga::valid::ModuleInfo) -> Self {
        let entry_points: Vec<(ShaderStage, String)> = module
            .entry_points
            .iter()
            .map(|ep| (convert_stage(ep.stage), ep.name.clone()))
            .collect();
        let module_stages = entry_points
            .iter()
            .fold(ShaderStageFlags::empty(), |acc, (stage, _)| {
                acc | ShaderStageFlags::from_stage(*stage)
            });

        let mut reflection = ShaderReflection {
            entry_points,
            ..Default::default()
        };

        for (handle, global) in module.global_variables.iter() {
            let mut stages = ShaderStageFlags::empty();
            for (index, (stage, _)) in reflection.entry_points.iter().enumerate() {
                if !info.get_entry_point(index)[handle].is_empty() {
                    stages |= ShaderStageFlags::from_stage(*stage);
                }
            }
            if stages.is_empty() {
                stages = module_stages;
            }

            let name = global.name.clone().unwrap_or_default();
            let ty = &module.types[global.ty];
            let size = ty.inner.size(module.to_ctx());

            if global.space == naga::AddressSpace::PushConstant {
                reflection.push_constants.push(PushConstantInfo {
                    name,
                    size,
                    stages,
                    block: reflect_struct(module, global.ty),
                });
                continue;
            }

            let Some(binding) = &global.binding else {
                continue;
            };
            let (kind, view_dimension) = match (&global.space, &ty.inner) {
                (naga::AddressSpace::Uniform, _) => (DescriptorKind::UniformBuffer, None),
                (naga::AddressSpace::Storage { .. }, _) => (DescriptorKind::StorageBuffer, None),
                (_, naga::TypeInner::Sampler { comparison }) => {
                    let kind = if *comparison {
                        DescriptorKind::ComparisonSampler
                    } else {
                        DescriptorKind::Sampler
                    };
                    (kind, None)
                }
                (
                    _,
                    naga::TypeInner::Image {
                        dim,
                        arrayed,
                        class,
                    },
                ) => {
                    let kind = match class {
                        naga::ImageClass::Depth { .. } => DescriptorKind::DepthTexture,
                        _ => DescriptorKind::SampledTexture,
                    };
                    (kind, Some(convert_dimension(*dim, *arrayed)))
                }
                _ => continue,
            };

            reflection.descriptors.push(DescriptorInfo {
                set: binding.group,
                binding: binding.binding,
                name,
                kind,
                view_dimension,
                size,
                stages,
                block: match kind {
                    DescriptorKind::UniformBuffer => reflect_struct(module, global.ty),
                    _ => None,
                },
            });
        }

        reflection
            .descriptors
            .sort_by_key(|d| (d.set, d.binding));
        reflection
    }

    /// Merges the interface of another stage into this one.
    ///
    /// Bindings present in both are combined by widening their stage flags.
    pub fn merge(&mut self, other: ShaderReflection) {
        for descriptor in other.descriptors {
            match self
                .descriptors
                .iter_mut()
                .find(|d| d.set == descriptor.set && d.binding == descriptor.binding)
            {
                Some(existing) => existing.stages |= descriptor.stages,
                None => self.descriptors.push(descriptor),
            }
        }
        for block in other.push_constants {
            match self.push_constants.iter_mut().find(|p| p.name == block.name) {
                Some(existing) => existing.stages |= block.stages,
                None => self.push_constants.push(block),
            }
        }
        for entry in other.entry_points {
            if !self.entry_points.contains(&entry) {
                self.entry_points.push(entry);
            }
        }
        self.descriptors.sort_by_key(|d| (d.set, d.binding));
    }

    /// Number of descriptor sets, counting unused sets below the highest one.
    pub fn set_count(&self) -> u32 {
        self.descriptors.iter().map(|d| d.set + 1).max().unwrap_or(0)
    }

    /// Bindings of one set.
    pub fn descriptors_in_set(&self, set: u32) -> impl Iterator<Item = &DescriptorInfo> {
        self.descriptors.iter().filter(move |d| d.set == set)
    }

    /// Finds a binding by variable name.
    pub fn descriptor(&self, name: &str) -> Option<&DescriptorInfo> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Struct layout of the uniform buffer called `name`.
    pub fn uniform_block(&self, name: &str) -> Option<&ReflectedStruct> {
        self.descriptor(name).and_then(|d| d.block.as_ref())
    }

    /// First entry point of `stage`.
    pub fn entry_point(&self, stage: ShaderStage) -> Option<&str> {
        self.entry_points
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, name)| name.as_str())
    }

    /// Layout entries of one set; `dynamic` lists uniform bindings that take
    /// a dynamic offset.
    pub fn layout_entries(&self, set: u32, dynamic: &[(u32, u32)]) -> Vec<BindGroupLayoutEntry> {
        self.descriptors_in_set(set)
            .map(|d| BindGroupLayoutEntry {
                binding: d.binding,
                visibility: d.stages,
                ty: match d.kind {
                    DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer => {
                        BindingType::UniformBuffer {
                            has_dynamic_offset: dynamic.contains(&(d.set, d.binding)),
                            min_binding_size: (d.size > 0).then_some(d.size as u64),
                        }
                    }
                    DescriptorKind::SampledTexture => BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: d.view_dimension.unwrap_or(TextureViewDimension::D2),
                        multisampled: false,
                    },
                    DescriptorKind::DepthTexture => BindingType::Texture {
                        sample_type: TextureSampleType::Depth,
                        view_dimension: d.view_dimension.unwrap_or(TextureViewDimension::D2),
                        multisampled: false,
                    },
                    DescriptorKind::Sampler => BindingType::Sampler(SamplerBindingType::Filtering),
                    DescriptorKind::ComparisonSampler => {
                        BindingType::Sampler(SamplerBindingType::Comparison)
                    }
                },
            })
            .collect()
    }
}

fn convert_stage(stage: naga::ShaderStage) -> ShaderStage {
    match stage {
        naga::ShaderStage::Vertex => ShaderStage::Vertex,
        naga::ShaderStage::Fragment => ShaderStage::Fragment,
        naga::ShaderStage::Compute => ShaderStage::Compute,
    }
}

fn convert_dimension(dim: naga::ImageDimension, arrayed: bool) -> TextureViewDimension {
    match (dim, arrayed) {
        (naga::ImageDimension::D1, _) => TextureViewDimension::D1,
        (naga::ImageDimension::D2, false) => TextureViewDimension::D2,
        (naga::ImageDimension::D2, true) => TextureViewDimension::D2Array,
        (naga::ImageDimension::D3, _) => TextureViewDimension::D3,
        (naga::ImageDimension::Cube, false) => TextureViewDimension::Cube,
        (naga::ImageDimension::Cube, true) => TextureViewDimension::CubeArray,
    }
}

fn reflect_struct(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<ReflectedStruct> {
    let ty_ref = &module.types[ty];
    match &ty_ref.inner {
        naga::TypeInner::Struct { members, span } => Some(ReflectedStruct {
            name: ty_ref.name.clone().unwrap_or_default(),
            span: *span,
            members: reflect_members(module, members),
        }),
        _ => None,
    }
}

fn reflect_members(module: &naga::Module, members: &[naga::StructMember]) -> Vec<ReflectedMember> {
    members
        .iter()
        .map(|member| {
            let inner = &module.types[member.ty].inner;
            let (array_stride, nested) = match inner {
                naga::TypeInner::Array { base, stride, .. } => {
                    (Some(*stride), nested_members(module, *base))
                }
                _ => (None, nested_members(module, member.ty)),
            };
            ReflectedMember {
                name: member.name.clone().unwrap_or_default(),
                offset: member.offset,
                size: inner.size(module.to_ctx()),
                array_stride,
                members: nested,
            }
        })
        .collect()
}

fn nested_members(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Vec<ReflectedMember> {
    match &module.types[ty].inner {
        naga::TypeInner::Struct { members, .. } => reflect_members(module, members),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    position: vec3<f32>,
    exposure: f32,
}

struct Light {
    color: vec4<f32>,
    direction: vec4<f32>,
}

struct Lights {
    count: u32,
    items: array<Light, 4>,
}

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<uniform> lights: Lights;
@group(1) @binding(0) var albedo_texture: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;
@group(2) @binding(0) var shadow_map: texture_depth_2d_array;
@group(2) @binding(1) var shadow_sampler: sampler_comparison;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.view_proj * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let base = textureSample(albedo_texture, albedo_sampler, frag.xy);
    let lit = textureSampleCompare(shadow_map, shadow_sampler, frag.xy, 0, frag.z);
    return base * lit * lights.items[0].color * camera.exposure;
}
"#;

    #[test]
    fn reflects_bindings_and_stages() {
        let reflection = ShaderReflection::from_wgsl(SOURCE, "test").unwrap();
        assert_eq!(reflection.set_count(), 3);
        assert_eq!(reflection.entry_point(ShaderStage::Vertex), Some("vs_main"));
        assert_eq!(reflection.entry_point(ShaderStage::Fragment), Some("fs_main"));

        let camera = reflection.descriptor("camera").unwrap();
        assert_eq!(camera.kind, DescriptorKind::UniformBuffer);
        assert_eq!(camera.stages, ShaderStageFlags::VERTEX_FRAGMENT);

        let albedo = reflection.descriptor("albedo_texture").unwrap();
        assert_eq!((albedo.set, albedo.binding), (1, 0));
        assert_eq!(albedo.stages, ShaderStageFlags::FRAGMENT);

        let shadow = reflection.descriptor("shadow_map").unwrap();
        assert_eq!(shadow.kind, DescriptorKind::DepthTexture);
        assert_eq!(shadow.view_dimension, Some(TextureViewDimension::D2Array));
        assert_eq!(
            reflection.descriptor("shadow_sampler").unwrap().kind,
            DescriptorKind::ComparisonSampler
        );
    }

    #[test]
    fn reflects_struct_offsets() {
        let reflection = ShaderReflection::from_wgsl(SOURCE, "test").unwrap();
        let camera = reflection.uniform_block("camera").unwrap();
        assert_eq!(camera.name, "Camera");
        assert_eq!(camera.span, 80);
        let exposure = camera.members.iter().find(|m| m.name == "exposure").unwrap();
        assert_eq!(exposure.offset, 76);

        let lights = reflection.uniform_block("lights").unwrap();
        let items = &lights.members[1];
        assert_eq!(items.offset, 16);
        assert_eq!(items.array_stride, Some(32));
        assert_eq!(items.members.len(), 2);
    }

    #[test]
    fn layout_entries_mark_dynamic_uniforms() {
        let reflection = ShaderReflection::from_wgsl(SOURCE, "test").unwrap();
        let entries = reflection.layout_entries(0, &[(0, 1)]);
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            entries[1].ty,
            BindingType::UniformBuffer {
                has_dynamic_offset: true,
                ..
            }
        ));
        assert!(matches!(
            entries[0].ty,
            BindingType::UniformBuffer {
                has_dynamic_offset: false,
                ..
            }
        ));
    }

    #[test]
    fn invalid_source_reports_compilation_error() {
        let err = ShaderReflection::from_wgsl("fn broken( {", "broken").unwrap_err();
        assert!(matches!(err, ShaderError::CompilationError { label, .. } if label == "broken"));
    }
}
