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

//! Shader programs built from unified, preprocessed WGSL sources.
//!
//! A [`Shader`] owns one backend module per stage, the merged reflection of
//! all stages, the bind group layouts derived from it and the pipeline
//! layout. It is shared (`Arc<Shader>`) between every pipeline using it.

pub mod binding_remap;
pub mod preprocessor;
pub mod reflection;

pub use self::binding_remap::{BindingRemap, FlatBinding, FlatBindingKind, FLAT_BINDINGS_PER_SET};
pub use self::preprocessor::{EmbeddedIncludes, FileIncludeResolver, IncludeResolver, Preprocessor};
pub use self::reflection::{
    DescriptorInfo, DescriptorKind, PushConstantInfo, ReflectedMember, ReflectedStruct,
    ShaderReflection,
};

use crate::renderer::api::bind_group::{BindGroupLayoutDescriptor, BindGroupLayoutId};
use crate::renderer::api::backend::DeviceFeature;
use crate::renderer::api::pipeline::{PipelineLayoutDescriptor, PipelineLayoutId, PushConstantRange};
use crate::renderer::api::shader::{
    ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData, ShaderStage,
};
use crate::renderer::api::util::flags::ShaderStageFlags;
use crate::renderer::api::util::uniform_layout::UniformLayout;
use crate::renderer::error::{PipelineError, ResourceError, ShaderError};
use crate::renderer::traits::{GraphicsDevice, RenderPass};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

/// Build-time options of a shader.
#[derive(Debug, Clone, Default)]
pub struct ShaderOptions {
    /// Predefined preprocessor symbols.
    pub defines: Vec<(String, String)>,
    /// Uniform bindings `(set, binding)` bound with a dynamic offset.
    pub dynamic_uniforms: Vec<(u32, u32)>,
}

impl ShaderOptions {
    /// Adds a preprocessor define.
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    /// Marks a uniform binding as dynamically offset.
    pub fn dynamic_uniform(mut self, set: u32, binding: u32) -> Self {
        self.dynamic_uniforms.push((set, binding));
        self
    }
}

#[derive(Debug)]
struct StageModule {
    module: ShaderModuleId,
    entry_point: String,
}

#[derive(Debug)]
struct PushConstantBlock {
    info: PushConstantInfo,
    offset: u32,
}

#[derive(Debug, Default)]
struct PushConstantStorage {
    blocks: Vec<PushConstantBlock>,
    data: Vec<u8>,
}

/// A compiled, reflected shader program.
#[derive(Debug)]
pub struct Shader {
    id: u64,
    name: String,
    device: Arc<dyn GraphicsDevice>,
    stages: BTreeMap<ShaderStage, StageModule>,
    reflection: ShaderReflection,
    remap: BindingRemap,
    dynamic_uniforms: Vec<(u32, u32)>,
    bind_group_layouts: Vec<BindGroupLayoutId>,
    pipeline_layout: PipelineLayoutId,
    push_constants: Mutex<PushConstantStorage>,
}

impl Shader {
    /// Loads a shader file; includes resolve relative to the file's directory.
    pub fn from_file(
        device: &Arc<dyn GraphicsDevice>,
        path: impl AsRef<Path>,
        options: &ShaderOptions,
    ) -> Result<Arc<Self>, ResourceError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            log::error!("Shader: failed to read '{}': {}", path.display(), e);
            ShaderError::LoadError {
                path: path.display().to_string(),
                source_error: e.to_string(),
            }
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let resolver = FileIncludeResolver::new(root);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_source(device, &name, &source, &resolver, options)
    }

    /// Preprocesses, reflects and compiles a unified source.
    ///
    /// ## Errors
    /// * `ShaderError::CompilationError` - Preprocessing, parsing or validation failed.
    /// * `ShaderError::UnsupportedStage` - The backend cannot run a declared stage.
    /// * `PipelineError::FeatureNotSupported` - Push constants without device support.
    pub fn from_source(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        source: &str,
        resolver: &dyn IncludeResolver,
        options: &ShaderOptions,
    ) -> Result<Arc<Self>, ResourceError> {
        let result = Self::build(device, name, source, resolver, options);
        if let Err(e) = &result {
            log::error!("Shader '{}': {}", name, e);
        }
        result.map(Arc::new)
    }

    fn build(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        source: &str,
        resolver: &dyn IncludeResolver,
        options: &ShaderOptions,
    ) -> Result<Self, ResourceError> {
        let mut preprocessor = Preprocessor::new(resolver);
        for (define, value) in &options.defines {
            preprocessor = preprocessor.define(define.clone(), value.clone());
        }
        let expanded = preprocessor.expand(source, name)?;
        let mut sources = preprocessor::split_stages(&expanded, name)?;

        let mut reflection = ShaderReflection::default();
        if sources.is_empty() {
            // No markers: stages come from the module's entry points.
            reflection = ShaderReflection::from_wgsl(&expanded, name)?;
            for (stage, _) in &reflection.entry_points {
                sources.insert(*stage, expanded.clone());
            }
            if sources.is_empty() {
                return Err(ShaderError::CompilationError {
                    label: name.to_string(),
                    details: "no entry point found".to_string(),
                }
                .into());
            }
        } else {
            for (stage, stage_source) in &sources {
                if *stage == ShaderStage::Geometry {
                    continue;
                }
                let stage_label = format!("{name} ({stage})");
                let stage_reflection = ShaderReflection::from_wgsl(stage_source, &stage_label)?;
                if stage_reflection.entry_point(*stage).is_none() {
                    return Err(ShaderError::CompilationError {
                        label: stage_label,
                        details: format!("no @{stage} entry point in the {stage} section"),
                    }
                    .into());
                }
                reflection.merge(stage_reflection);
            }
        }

        if !reflection.push_constants.is_empty() && !device.supports_feature(DeviceFeature::PushConstants) {
            return Err(PipelineError::FeatureNotSupported(format!(
                "shader '{name}' declares push constants"
            ))
            .into());
        }

        let remap = BindingRemap::from_reflection(&reflection)?;

        let mut stages = BTreeMap::new();
        for (stage, stage_source) in &sources {
            let entry_point = reflection
                .entry_point(*stage)
                .unwrap_or("main")
                .to_string();
            let label = format!("{name} ({stage})");
            let created = device.create_shader_module(&ShaderModuleDescriptor {
                label: Some(&label),
                stage: *stage,
                source: ShaderSourceData::Wgsl(Cow::Borrowed(stage_source)),
                entry_point: &entry_point,
            });
            match created {
                Ok(module) => {
                    stages.insert(*stage, StageModule { module, entry_point });
                }
                Err(e) => {
                    for stage_module in stages.values() {
                        let _ = device.destroy_shader_module(stage_module.module);
                    }
                    return Err(e);
                }
            }
        }

        let mut bind_group_layouts = Vec::new();
        for set in 0..reflection.set_count() {
            let entries = reflection.layout_entries(set, &options.dynamic_uniforms);
            let label = format!("{name} set {set}");
            bind_group_layouts.push(device.create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some(&label),
                entries: &entries,
            })?);
        }

        let mut storage = PushConstantStorage::default();
        let mut ranges = Vec::new();
        let mut cursor = 0u32;
        for info in &reflection.push_constants {
            let offset = cursor.div_ceil(4) * 4;
            cursor = offset + info.size;
            ranges.push(PushConstantRange {
                stages: info.stages,
                range: offset..cursor,
            });
            storage.blocks.push(PushConstantBlock {
                info: info.clone(),
                offset,
            });
        }
        storage.data = vec![0; cursor as usize];

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &ranges,
        })?;

        log::debug!(
            "Shader '{}': {} stage(s), {} descriptor(s) in {} set(s)",
            name,
            stages.len(),
            reflection.descriptors.len(),
            bind_group_layouts.len()
        );

        Ok(Self {
            id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            device: device.clone(),
            stages,
            reflection,
            remap,
            dynamic_uniforms: options.dynamic_uniforms.clone(),
            bind_group_layouts,
            pipeline_layout,
            push_constants: Mutex::new(storage),
        })
    }

    /// Process-unique identity, used to key pipelines.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device owning the modules.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Stages present in the program.
    pub fn stages(&self) -> impl Iterator<Item = ShaderStage> + '_ {
        self.stages.keys().copied()
    }

    /// Whether `stage` is present.
    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Backend module of a stage.
    pub fn module(&self, stage: ShaderStage) -> Option<ShaderModuleId> {
        self.stages.get(&stage).map(|s| s.module)
    }

    /// Entry point of a stage.
    pub fn entry_point(&self, stage: ShaderStage) -> Option<&str> {
        self.stages.get(&stage).map(|s| s.entry_point.as_str())
    }

    /// Merged reflection of every stage.
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Flat binding slots for GL-style backends.
    pub fn binding_remap(&self) -> &BindingRemap {
        &self.remap
    }

    /// Layout of descriptor set `set`.
    pub fn bind_group_layout(&self, set: u32) -> Option<BindGroupLayoutId> {
        self.bind_group_layouts.get(set as usize).copied()
    }

    /// Pipeline layout covering every set and push-constant range.
    pub fn pipeline_layout(&self) -> PipelineLayoutId {
        self.pipeline_layout
    }

    /// Whether a uniform binding takes a dynamic offset.
    pub fn is_dynamic_uniform(&self, set: u32, binding: u32) -> bool {
        self.dynamic_uniforms.contains(&(set, binding))
    }

    /// Checks a CPU layout against the uniform block called `block`.
    pub fn validate_uniform_layout(
        &self,
        block: &str,
        layout: &UniformLayout,
    ) -> Result<(), PipelineError> {
        let reflected = self.reflection.uniform_block(block).ok_or_else(|| {
            PipelineError::LayoutMismatch {
                block: block.to_string(),
                details: format!("shader '{}' declares no uniform '{}'", self.name, block),
            }
        })?;
        layout.validate_against(reflected)
    }

    /// Overwrites a whole push-constant block.
    pub fn set_push_constant(&self, name: &str, bytes: &[u8]) -> Result<(), ShaderError> {
        let mut storage = self.lock_push_constants();
        let (offset, size) = storage
            .blocks
            .iter()
            .find(|b| b.info.name == name)
            .map(|b| (b.offset, b.info.size))
            .ok_or_else(|| ShaderError::UnknownPushConstant {
                name: name.to_string(),
            })?;
        if bytes.len() > size as usize {
            return Err(ShaderError::UnknownPushConstant {
                name: format!("{name} ({} bytes > {size})", bytes.len()),
            });
        }
        let start = offset as usize;
        storage.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Writes one member of a push-constant struct.
    pub fn set_uniform(&self, block: &str, member: &str, bytes: &[u8]) -> Result<(), ShaderError> {
        let mut storage = self.lock_push_constants();
        let unknown = || ShaderError::UnknownPushConstant {
            name: format!("{block}.{member}"),
        };
        let (start, size) = storage
            .blocks
            .iter()
            .find(|b| b.info.name == block)
            .and_then(|b| {
                let field = b.info.block.as_ref()?.members.iter().find(|m| m.name == member)?;
                Some((b.offset + field.offset, field.size))
            })
            .ok_or_else(unknown)?;
        if bytes.len() > size as usize {
            return Err(unknown());
        }
        let start = start as usize;
        storage.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// A copy of the push-constant bytes.
    pub fn push_constant_data(&self) -> Vec<u8> {
        self.lock_push_constants().data.clone()
    }

    /// Copies every push-constant block into the pass.
    pub fn bind_push_constants(&self, pass: &mut dyn RenderPass<'_>) {
        let storage = self.lock_push_constants();
        for block in &storage.blocks {
            let start = block.offset as usize;
            let end = start + block.info.size as usize;
            pass.set_push_constants(block.info.stages, block.offset, &storage.data[start..end]);
        }
    }

    /// Stages that read any resource of `set`.
    pub fn set_visibility(&self, set: u32) -> ShaderStageFlags {
        self.reflection
            .descriptors_in_set(set)
            .fold(ShaderStageFlags::empty(), |acc, d| acc | d.stages)
    }

    fn lock_push_constants(&self) -> std::sync::MutexGuard<'_, PushConstantStorage> {
        // Writers never panic while holding the lock; recover the data if one did.
        self.push_constants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_pipeline_layout(self.pipeline_layout) {
            log::warn!("Shader '{}': failed to destroy pipeline layout: {}", self.name, e);
        }
        for layout in &self.bind_group_layouts {
            let _ = self.device.destroy_bind_group_layout(*layout);
        }
        for stage in self.stages.values() {
            if let Err(e) = self.device.destroy_shader_module(stage.module) {
                log::warn!("Shader '{}': failed to destroy module: {}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::command::RenderPassDescriptor;
    use crate::renderer::api::util::uniform_layout::UniformType;
    use crate::renderer::testing::{MockCommand, MockDevice};

    const UNIFIED: &str = r#"
#include "camera.wgsl"
@group(0) @binding(0) var<uniform> camera: Camera;

#shader vertex
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.view_projection * vec4<f32>(position, 1.0);
}

#shader fragment
@fragment
fn fs_main() -> @location(0) vec4<f32> {
#ifdef RED
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
#else
    return camera.position;
#endif
}
"#;

    const PUSH: &str = r#"
struct Object {
    model: mat4x4<f32>,
    tint: vec4<f32>,
};
var<push_constant> object: Object;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return object.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return object.tint;
}
"#;

    fn includes() -> EmbeddedIncludes {
        EmbeddedIncludes::new().with(
            "camera.wgsl",
            "struct Camera {\n    view_projection: mat4x4<f32>,\n    position: vec4<f32>,\n};\n",
        )
    }

    #[test]
    fn unified_source_is_split_into_stages() {
        let (mock, device) = MockDevice::shared();
        let shader = Shader::from_source(
            &device,
            "unified",
            UNIFIED,
            &includes(),
            &ShaderOptions::default().define("RED", ""),
        )
        .unwrap();

        assert!(shader.has_stage(ShaderStage::Vertex));
        assert!(shader.has_stage(ShaderStage::Fragment));
        assert_eq!(shader.entry_point(ShaderStage::Vertex), Some("vs_main"));
        assert_eq!(shader.entry_point(ShaderStage::Fragment), Some("fs_main"));
        assert!(shader.bind_group_layout(0).is_some());
        assert!(shader.bind_group_layout(1).is_none());

        assert!(shader.set_visibility(0).contains(ShaderStageFlags::VERTEX));

        let live = mock.live_objects();
        drop(shader);
        assert!(mock.live_objects() < live);
    }

    #[test]
    fn invalid_source_is_a_compilation_error() {
        let (_mock, device) = MockDevice::shared();
        let err = Shader::from_source(
            &device,
            "broken",
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }",
            &EmbeddedIncludes::new(),
            &ShaderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Shader(ShaderError::CompilationError { .. })
        ));
    }

    #[test]
    fn missing_include_fails() {
        let (_mock, device) = MockDevice::shared();
        assert!(Shader::from_source(
            &device,
            "unified",
            UNIFIED,
            &EmbeddedIncludes::new(),
            &ShaderOptions::default(),
        )
        .is_err());
    }

    #[test]
    fn uniform_layout_is_validated_against_reflection() {
        let (_mock, device) = MockDevice::shared();
        let shader = Shader::from_source(
            &device,
            "unified",
            UNIFIED,
            &includes(),
            &ShaderOptions::default(),
        )
        .unwrap();

        let good = UniformLayout::builder("Camera")
            .field("view_projection", UniformType::Mat4)
            .field("position", UniformType::Vec4)
            .build();
        shader.validate_uniform_layout("camera", &good).unwrap();

        let swapped = UniformLayout::builder("Camera")
            .field("position", UniformType::Vec4)
            .field("view_projection", UniformType::Mat4)
            .build();
        assert!(matches!(
            shader.validate_uniform_layout("camera", &swapped),
            Err(PipelineError::LayoutMismatch { .. })
        ));
        assert!(shader.validate_uniform_layout("lights", &good).is_err());
    }

    #[test]
    fn push_constants_require_device_support() {
        let (_mock, device) = MockDevice::shared();
        let err = Shader::from_source(
            &device,
            "push",
            PUSH,
            &EmbeddedIncludes::new(),
            &ShaderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Pipeline(PipelineError::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn push_constants_are_copied_into_the_pass() {
        let (mock, device) = MockDevice::with_features(vec![DeviceFeature::PushConstants]);
        let shader = Shader::from_source(
            &device,
            "push",
            PUSH,
            &EmbeddedIncludes::new(),
            &ShaderOptions::default(),
        )
        .unwrap();

        let tint = [0.25f32, 0.5, 0.75, 1.0];
        shader
            .set_uniform("object", "tint", bytemuck::cast_slice(&tint))
            .unwrap();
        assert!(matches!(
            shader.set_uniform("object", "colour", &[0; 4]),
            Err(ShaderError::UnknownPushConstant { .. })
        ));
        assert!(shader.set_push_constant("object", &[0; 128]).is_err());

        let mut encoder = device.create_command_encoder(Some("push"));
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("push"),
                color_attachments: &[],
                depth_stencil_attachment: None,
            });
            shader.bind_push_constants(pass.as_mut());
        }
        encoder.finish();

        let pushed = mock
            .commands()
            .into_iter()
            .find_map(|c| match c {
                MockCommand::PushConstants(offset, bytes) => Some((offset, bytes)),
                _ => None,
            })
            .unwrap();
        assert_eq!(pushed.0, 0);
        assert_eq!(pushed.1.len(), 80);
        assert_eq!(&pushed.1[64..80], bytemuck::cast_slice::<f32, u8>(&tint));
    }
}
