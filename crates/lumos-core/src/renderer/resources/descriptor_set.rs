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

//! Descriptor sets: the resources bound to one bind group of a shader.
//!
//! A combined image sampler occupies two consecutive bindings: the texture at
//! `binding` and its sampler at `binding + 1`, matching how the WGSL shaders
//! declare them.

use super::buffers::UniformBuffer;
use super::texture::Texture2D;
use crate::renderer::api::bind_group::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutId, BindingResource,
    BufferBinding,
};
use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::texture::{SamplerId, TextureViewId};
use crate::renderer::api::util::flags::ShaderStageFlags;
use crate::renderer::error::ResourceError;
use crate::renderer::shader::{DescriptorKind, Shader};
use crate::renderer::traits::RenderPass;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Kind of a [`Descriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// A uniform buffer range.
    UniformBuffer,
    /// A texture with its sampler.
    ImageSampler,
}

/// The resource referenced by a [`Descriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    /// A range of a uniform buffer.
    UniformBuffer {
        /// Buffer handle.
        buffer: BufferId,
        /// First byte.
        offset: u64,
        /// Bound size; `None` binds the rest of the buffer.
        size: Option<u64>,
    },
    /// A texture view and the sampler used to read it.
    ImageSampler {
        /// View handle.
        view: TextureViewId,
        /// Sampler handle.
        sampler: SamplerId,
    },
}

/// One entry of a [`DescriptorSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    /// Binding index inside the set.
    pub binding: u32,
    /// Name, for diagnostics.
    pub name: String,
    /// Bound resource.
    pub resource: DescriptorResource,
    /// Stages that read the resource.
    pub stage: ShaderStageFlags,
}

impl Descriptor {
    /// A whole uniform buffer.
    pub fn uniform(binding: u32, name: &str, buffer: &UniformBuffer) -> Self {
        Self::uniform_range(binding, name, buffer.id(), 0, Some(buffer.size()))
    }

    /// A range of a uniform buffer.
    pub fn uniform_range(
        binding: u32,
        name: &str,
        buffer: BufferId,
        offset: u64,
        size: Option<u64>,
    ) -> Self {
        Self {
            binding,
            name: name.to_string(),
            resource: DescriptorResource::UniformBuffer {
                buffer,
                offset,
                size,
            },
            stage: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
        }
    }

    /// A 2D texture with its own sampler.
    pub fn texture(binding: u32, name: &str, texture: &Texture2D) -> Self {
        Self::image(binding, name, texture.view(), texture.sampler())
    }

    /// Any sampled view (cube, depth array, ...) with a sampler.
    pub fn image(binding: u32, name: &str, view: TextureViewId, sampler: SamplerId) -> Self {
        Self {
            binding,
            name: name.to_string(),
            resource: DescriptorResource::ImageSampler { view, sampler },
            stage: ShaderStageFlags::FRAGMENT,
        }
    }

    /// Overrides the stage flags.
    pub fn with_stage(mut self, stage: ShaderStageFlags) -> Self {
        self.stage = stage;
        self
    }

    /// Kind of the descriptor.
    pub fn kind(&self) -> DescriptorType {
        match self.resource {
            DescriptorResource::UniformBuffer { .. } => DescriptorType::UniformBuffer,
            DescriptorResource::ImageSampler { .. } => DescriptorType::ImageSampler,
        }
    }

    fn entries(&self) -> Vec<BindGroupEntry> {
        match self.resource {
            DescriptorResource::UniformBuffer {
                buffer,
                offset,
                size,
            } => vec![BindGroupEntry {
                binding: self.binding,
                resource: BindingResource::Buffer(BufferBinding {
                    buffer,
                    offset,
                    size,
                }),
            }],
            DescriptorResource::ImageSampler { view, sampler } => vec![
                BindGroupEntry {
                    binding: self.binding,
                    resource: BindingResource::TextureView(view),
                },
                BindGroupEntry {
                    binding: self.binding + 1,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        }
    }
}

/// Whether a bind group resource can fill a binding of the reflected kind.
fn resource_fits(resource: &BindingResource, kind: DescriptorKind) -> bool {
    match resource {
        BindingResource::Buffer(_) => matches!(
            kind,
            DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer
        ),
        BindingResource::TextureView(_) => matches!(
            kind,
            DescriptorKind::SampledTexture | DescriptorKind::DepthTexture
        ),
        BindingResource::Sampler(_) => matches!(
            kind,
            DescriptorKind::Sampler | DescriptorKind::ComparisonSampler
        ),
    }
}

/// The resources of one bind group of a shader.
///
/// [`update`](Self::update) always replaces the whole descriptor list and
/// rebuilds the backend bind group.
#[derive(Debug)]
pub struct DescriptorSet {
    shader: Arc<Shader>,
    set_index: u32,
    layout: BindGroupLayoutId,
    descriptors: Vec<Descriptor>,
    bind_group: Option<BindGroupId>,
    dynamic: bool,
}

impl DescriptorSet {
    /// Creates an empty set from the shader's reflected layout for `set_index`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidDescriptor`] if the shader declares no
    /// such set.
    pub fn new(shader: &Arc<Shader>, set_index: u32) -> Result<Self, ResourceError> {
        let layout = shader.bind_group_layout(set_index).ok_or_else(|| {
            ResourceError::InvalidDescriptor(format!(
                "shader '{}' has no descriptor set {}",
                shader.name(),
                set_index
            ))
        })?;
        let dynamic = shader
            .reflection()
            .descriptors_in_set(set_index)
            .any(|d| shader.is_dynamic_uniform(set_index, d.binding));
        Ok(Self {
            shader: shader.clone(),
            set_index,
            layout,
            descriptors: Vec::new(),
            bind_group: None,
            dynamic,
        })
    }

    /// Replaces every descriptor and rebuilds the bind group.
    ///
    /// ## Errors
    /// * `ResourceError::DuplicateBinding` - Two descriptors occupy the same binding.
    /// * `ResourceError::InvalidDescriptor` - A binding is missing from, or
    ///   not declared by, the shader's set, or holds the wrong kind of resource.
    pub fn update(&mut self, descriptors: Vec<Descriptor>) -> Result<(), ResourceError> {
        let mut entries = Vec::new();
        let mut used = BTreeSet::new();
        for descriptor in &descriptors {
            for entry in descriptor.entries() {
                if !used.insert(entry.binding) {
                    log::error!(
                        "DescriptorSet {} of '{}': binding {} used twice ('{}')",
                        self.set_index,
                        self.shader.name(),
                        entry.binding,
                        descriptor.name
                    );
                    return Err(ResourceError::DuplicateBinding {
                        binding: entry.binding,
                    });
                }
                entries.push(entry);
            }
        }

        let declared: BTreeMap<u32, DescriptorKind> = self
            .shader
            .reflection()
            .descriptors_in_set(self.set_index)
            .map(|d| (d.binding, d.kind))
            .collect();
        let declared_bindings: BTreeSet<u32> = declared.keys().copied().collect();
        if let Some(extra) = used.difference(&declared_bindings).next() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "binding {} is not declared in set {} of '{}'",
                extra,
                self.set_index,
                self.shader.name()
            )));
        }
        if let Some(missing) = declared_bindings.difference(&used).next() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "binding {} of set {} of '{}' has no resource",
                missing,
                self.set_index,
                self.shader.name()
            )));
        }
        for entry in &entries {
            let Some(&kind) = declared.get(&entry.binding) else {
                continue;
            };
            if !resource_fits(&entry.resource, kind) {
                log::error!(
                    "DescriptorSet {} of '{}': binding {} expects {:?}, got {:?}",
                    self.set_index,
                    self.shader.name(),
                    entry.binding,
                    kind,
                    entry.resource
                );
                return Err(ResourceError::InvalidDescriptor(format!(
                    "binding {} of set {} of '{}' expects {:?}",
                    entry.binding,
                    self.set_index,
                    self.shader.name(),
                    kind
                )));
            }
        }

        let device = self.shader.device();
        let label = format!("{} set {}", self.shader.name(), self.set_index);
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(&label),
            layout: self.layout,
            entries: &entries,
        })?;
        if let Some(old) = self.bind_group.replace(bind_group) {
            let _ = device.destroy_bind_group(old);
        }
        self.descriptors = descriptors;
        Ok(())
    }

    /// Binds the set at `group_index` for the next draws.
    ///
    /// `dynamic_offset` is only accepted when the set holds a uniform buffer
    /// declared with a dynamic offset; such sets default to offset 0.
    pub fn bind(
        &self,
        pass: &mut dyn RenderPass<'_>,
        group_index: u32,
        dynamic_offset: Option<u32>,
    ) -> Result<(), ResourceError> {
        let bind_group = self.bind_group.ok_or_else(|| {
            ResourceError::InvalidDescriptor(format!(
                "set {} of '{}' bound before update",
                self.set_index,
                self.shader.name()
            ))
        })?;
        match (self.dynamic, dynamic_offset) {
            (false, Some(_)) => Err(ResourceError::InvalidDescriptor(format!(
                "set {} of '{}' has no dynamic uniform buffer",
                self.set_index,
                self.shader.name()
            ))),
            (false, None) => {
                pass.set_bind_group(group_index, bind_group, &[]);
                Ok(())
            }
            (true, offset) => {
                pass.set_bind_group(group_index, bind_group, &[offset.unwrap_or(0)]);
                Ok(())
            }
        }
    }

    /// Current descriptors, in update order.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Index of the set in the shader.
    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    /// Backend bind group, once updated.
    pub fn bind_group(&self) -> Option<BindGroupId> {
        self.bind_group
    }

    /// Shader the set belongs to.
    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        if let Some(bind_group) = self.bind_group.take() {
            if let Err(e) = self.shader.device().destroy_bind_group(bind_group) {
                log::warn!("DescriptorSet: failed to destroy bind group: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::command::RenderPassDescriptor;
    use crate::renderer::shader::{EmbeddedIncludes, ShaderOptions};
    use crate::renderer::testing::{MockCommand, MockDevice};
    use crate::renderer::traits::GraphicsDevice;

    const SOURCE: &str = r#"
struct Object {
    model: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> object: Object;
@group(1) @binding(0) var albedo: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return object.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return textureSample(albedo, albedo_sampler, vec2<f32>(0.5, 0.5));
}
"#;

    fn shader(device: &Arc<dyn GraphicsDevice>, options: &ShaderOptions) -> Arc<Shader> {
        Shader::from_source(device, "textured", SOURCE, &EmbeddedIncludes::new(), options).unwrap()
    }

    #[test]
    fn update_rejects_duplicate_bindings() {
        let (_mock, device) = MockDevice::shared();
        let shader = shader(&device, &ShaderOptions::default());
        let texture = Texture2D::white(&device).unwrap();
        let mut set = DescriptorSet::new(&shader, 1).unwrap();

        // The image sampler at 0 also occupies binding 1.
        let err = set
            .update(vec![
                Descriptor::texture(0, "albedo", &texture),
                Descriptor::texture(1, "other", &texture),
            ])
            .unwrap_err();
        assert!(matches!(err, ResourceError::DuplicateBinding { binding: 1 }));
        assert!(set.bind_group().is_none());

        set.update(vec![Descriptor::texture(0, "albedo", &texture)]).unwrap();
        assert_eq!(set.descriptors().len(), 1);
        assert_eq!(set.descriptors()[0].kind(), DescriptorType::ImageSampler);
    }

    #[test]
    fn update_replaces_the_bind_group() {
        let (mock, device) = MockDevice::shared();
        let shader = shader(&device, &ShaderOptions::default());
        let first = Texture2D::white(&device).unwrap();
        let second = Texture2D::white(&device).unwrap();
        let mut set = DescriptorSet::new(&shader, 1).unwrap();

        set.update(vec![Descriptor::texture(0, "albedo", &first)]).unwrap();
        let old = set.bind_group().unwrap();
        set.update(vec![Descriptor::texture(0, "albedo", &second)]).unwrap();
        let new = set.bind_group().unwrap();

        assert_ne!(old, new);
        assert!(mock.bind_group_entries(old).is_none());
        let entries = mock.bind_group_entries(new).unwrap();
        assert_eq!(entries[0].resource, BindingResource::TextureView(second.view()));
        assert_eq!(entries[1].resource, BindingResource::Sampler(second.sampler()));
    }

    #[test]
    fn missing_and_undeclared_bindings_are_rejected() {
        let (_mock, device) = MockDevice::shared();
        let shader = shader(&device, &ShaderOptions::default());
        let buffer = UniformBuffer::new(&device, "object", 64).unwrap();
        let mut set = DescriptorSet::new(&shader, 0).unwrap();

        assert!(matches!(
            set.update(Vec::new()),
            Err(ResourceError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            set.update(vec![
                Descriptor::uniform(0, "object", &buffer),
                Descriptor::uniform(3, "extra", &buffer),
            ]),
            Err(ResourceError::InvalidDescriptor(_))
        ));
        set.update(vec![Descriptor::uniform(0, "object", &buffer)]).unwrap();
        assert!(DescriptorSet::new(&shader, 4).is_err());
    }

    #[test]
    fn resources_must_match_the_reflected_kind() {
        let (_mock, device) = MockDevice::shared();
        let shader = shader(&device, &ShaderOptions::default());
        let buffer = UniformBuffer::new(&device, "object", 64).unwrap();
        let texture = Texture2D::white(&device).unwrap();

        let mut object = DescriptorSet::new(&shader, 0).unwrap();
        let err = object
            .update(vec![Descriptor::texture(0, "object", &texture)])
            .unwrap_err();
        // The texture's sampler half lands on an undeclared binding first.
        assert!(matches!(err, ResourceError::InvalidDescriptor(_)));

        let mut material = DescriptorSet::new(&shader, 1).unwrap();
        let err = material
            .update(vec![
                Descriptor::uniform(0, "albedo", &buffer),
                Descriptor::uniform(1, "albedo_sampler", &buffer),
            ])
            .unwrap_err();
        match err {
            ResourceError::InvalidDescriptor(message) => {
                assert!(message.contains("binding 0"), "{message}");
                assert!(message.contains("SampledTexture"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(material.bind_group().is_none());

        material
            .update(vec![Descriptor::texture(0, "albedo", &texture)])
            .unwrap();
    }

    #[test]
    fn dynamic_offsets_only_on_dynamic_sets() {
        let (mock, device) = MockDevice::shared();
        let shader = shader(&device, &ShaderOptions::default().dynamic_uniform(0, 0));
        let buffer = UniformBuffer::new(&device, "object", 512).unwrap();
        let texture = Texture2D::white(&device).unwrap();

        let mut objects = DescriptorSet::new(&shader, 0).unwrap();
        objects
            .update(vec![Descriptor::uniform_range(0, "object", buffer.id(), 0, Some(64))])
            .unwrap();
        let mut material = DescriptorSet::new(&shader, 1).unwrap();
        material.update(vec![Descriptor::texture(0, "albedo", &texture)]).unwrap();

        let mut encoder = device.create_command_encoder(None);
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("test"),
                color_attachments: &[],
                depth_stencil_attachment: None,
            });
            objects.bind(pass.as_mut(), 0, Some(256)).unwrap();
            material.bind(pass.as_mut(), 1, None).unwrap();
            assert!(material.bind(pass.as_mut(), 1, Some(256)).is_err());
        }
        encoder.finish();

        let commands = mock.commands();
        assert!(commands.contains(&MockCommand::SetBindGroup {
            index: 0,
            group: objects.bind_group().unwrap(),
            offsets: vec![256],
        }));
        assert!(commands.contains(&MockCommand::SetBindGroup {
            index: 1,
            group: material.bind_group().unwrap(),
            offsets: vec![],
        }));
    }
}
