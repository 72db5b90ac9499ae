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

//! PBR materials: scalar properties, texture maps and their descriptor set.
//!
//! A material lives in descriptor set [`MATERIAL_SET`]. Binding 0 holds the
//! [`MaterialProperties`] uniform; each [`TextureSlot`] occupies the two
//! bindings after it (texture, then sampler).

use crate::lumos_bitflags;
use crate::math::LinearRgba;
use crate::renderer::api::bind_group::BindGroupId;
use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::pipeline::{BlendMode, CullMode, PolygonMode};
use crate::renderer::api::util::uniform_layout::{UniformLayout, UniformType};
use crate::renderer::error::ResourceError;
use crate::renderer::resources::{Descriptor, DescriptorSet, Texture2D, UniformBuffer};
use crate::renderer::shader::Shader;
use crate::renderer::traits::RenderPass;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Descriptor set index used by every material.
pub const MATERIAL_SET: u32 = 1;

const PROPERTIES_BINDING: u32 = 0;

/// How the texture maps of a material are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Workflow {
    /// One texture per parameter.
    #[default]
    SeparateTextures,
    /// glTF packing: roughness in green, metallic in blue.
    MetallicRoughness,
    /// Specular colour in rgb, glossiness in alpha.
    SpecularGlossiness,
}

impl Workflow {
    fn as_f32(self) -> f32 {
        match self {
            Workflow::SeparateTextures => 0.0,
            Workflow::MetallicRoughness => 1.0,
            Workflow::SpecularGlossiness => 2.0,
        }
    }
}

/// GPU layout of the material uniform (80 bytes).
///
/// The `using_*_map` fields are 1.0 when the matching map should be sampled.
/// They are forced to 0.0 on upload for every slot without a texture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialProperties {
    /// Base colour, multiplied with the albedo map.
    pub albedo_colour: [f32; 4],
    /// Emitted colour.
    pub emissive_colour: [f32; 4],
    /// Perceptual roughness.
    pub roughness: f32,
    /// Metalness.
    pub metallic: f32,
    /// Dielectric reflectance at normal incidence.
    pub reflectance: f32,
    /// Multiplier on `emissive_colour`.
    pub emissive_intensity: f32,
    /// Sample the albedo map.
    pub using_albedo_map: f32,
    /// Sample the metallic map.
    pub using_metallic_map: f32,
    /// Sample the roughness map.
    pub using_roughness_map: f32,
    /// Sample the normal map.
    pub using_normal_map: f32,
    /// Sample the ambient occlusion map.
    pub using_ao_map: f32,
    /// Sample the emissive map.
    pub using_emissive_map: f32,
    /// [`Workflow`] as a float.
    pub workflow: f32,
    /// Fragments with a lower alpha are discarded.
    pub alpha_cutoff: f32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            albedo_colour: LinearRgba::WHITE.to_array(),
            emissive_colour: LinearRgba::BLACK.to_array(),
            roughness: 0.7,
            metallic: 0.0,
            reflectance: 0.3,
            emissive_intensity: 1.0,
            using_albedo_map: 1.0,
            using_metallic_map: 1.0,
            using_roughness_map: 1.0,
            using_normal_map: 1.0,
            using_ao_map: 1.0,
            using_emissive_map: 1.0,
            workflow: Workflow::default().as_f32(),
            alpha_cutoff: 0.4,
        }
    }
}

impl MaterialProperties {
    /// Sets the texture workflow.
    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow.as_f32();
        self
    }

    /// The `using_*_map` flag of a slot.
    pub fn using_map(&self, slot: TextureSlot) -> f32 {
        match slot {
            TextureSlot::Albedo => self.using_albedo_map,
            TextureSlot::Metallic => self.using_metallic_map,
            TextureSlot::Roughness => self.using_roughness_map,
            TextureSlot::Normal => self.using_normal_map,
            TextureSlot::Ao => self.using_ao_map,
            TextureSlot::Emissive => self.using_emissive_map,
        }
    }

    fn using_map_mut(&mut self, slot: TextureSlot) -> &mut f32 {
        match slot {
            TextureSlot::Albedo => &mut self.using_albedo_map,
            TextureSlot::Metallic => &mut self.using_metallic_map,
            TextureSlot::Roughness => &mut self.using_roughness_map,
            TextureSlot::Normal => &mut self.using_normal_map,
            TextureSlot::Ao => &mut self.using_ao_map,
            TextureSlot::Emissive => &mut self.using_emissive_map,
        }
    }

    /// The uniform layout matching this struct, for validation against shaders.
    pub fn layout() -> UniformLayout {
        UniformLayout::builder("MaterialProperties")
            .field("albedo_colour", UniformType::Vec4)
            .field("emissive_colour", UniformType::Vec4)
            .field("roughness", UniformType::Float)
            .field("metallic", UniformType::Float)
            .field("reflectance", UniformType::Float)
            .field("emissive_intensity", UniformType::Float)
            .field("using_albedo_map", UniformType::Float)
            .field("using_metallic_map", UniformType::Float)
            .field("using_roughness_map", UniformType::Float)
            .field("using_normal_map", UniformType::Float)
            .field("using_ao_map", UniformType::Float)
            .field("using_emissive_map", UniformType::Float)
            .field("workflow", UniformType::Float)
            .field("alpha_cutoff", UniformType::Float)
            .build()
    }
}

/// One texture map of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// Base colour.
    Albedo,
    /// Metalness (or packed metallic-roughness).
    Metallic,
    /// Roughness.
    Roughness,
    /// Tangent-space normals.
    Normal,
    /// Ambient occlusion.
    Ao,
    /// Emission.
    Emissive,
}

impl TextureSlot {
    /// Every slot, in binding order.
    pub const ALL: [TextureSlot; 6] = [
        TextureSlot::Albedo,
        TextureSlot::Metallic,
        TextureSlot::Roughness,
        TextureSlot::Normal,
        TextureSlot::Ao,
        TextureSlot::Emissive,
    ];

    /// Texture binding in [`MATERIAL_SET`]; the sampler follows at `binding + 1`.
    pub const fn binding(self) -> u32 {
        1 + 2 * self as u32
    }

    /// Name of the texture variable in the shaders.
    pub const fn name(self) -> &'static str {
        match self {
            TextureSlot::Albedo => "albedo_map",
            TextureSlot::Metallic => "metallic_map",
            TextureSlot::Roughness => "roughness_map",
            TextureSlot::Normal => "normal_map",
            TextureSlot::Ao => "ao_map",
            TextureSlot::Emissive => "emissive_map",
        }
    }
}

/// Texture maps of a material. Empty slots fall back to a white texture.
#[derive(Debug, Clone, Default)]
pub struct MaterialTextures {
    /// Base colour map.
    pub albedo: Option<Arc<Texture2D>>,
    /// Metallic map.
    pub metallic: Option<Arc<Texture2D>>,
    /// Roughness map.
    pub roughness: Option<Arc<Texture2D>>,
    /// Normal map.
    pub normal: Option<Arc<Texture2D>>,
    /// Ambient occlusion map.
    pub ao: Option<Arc<Texture2D>>,
    /// Emissive map.
    pub emissive: Option<Arc<Texture2D>>,
}

impl MaterialTextures {
    /// The texture in `slot`.
    pub fn get(&self, slot: TextureSlot) -> Option<&Arc<Texture2D>> {
        match slot {
            TextureSlot::Albedo => self.albedo.as_ref(),
            TextureSlot::Metallic => self.metallic.as_ref(),
            TextureSlot::Roughness => self.roughness.as_ref(),
            TextureSlot::Normal => self.normal.as_ref(),
            TextureSlot::Ao => self.ao.as_ref(),
            TextureSlot::Emissive => self.emissive.as_ref(),
        }
    }

    /// Replaces the texture in `slot`.
    pub fn set(&mut self, slot: TextureSlot, texture: Option<Arc<Texture2D>>) {
        let target = match slot {
            TextureSlot::Albedo => &mut self.albedo,
            TextureSlot::Metallic => &mut self.metallic,
            TextureSlot::Roughness => &mut self.roughness,
            TextureSlot::Normal => &mut self.normal,
            TextureSlot::Ao => &mut self.ao,
            TextureSlot::Emissive => &mut self.emissive,
        };
        *target = texture;
    }
}

lumos_bitflags! {
    /// Render state switches of a material.
    pub struct MaterialFlags: u32 {
        /// Disable back-face culling.
        const TWO_SIDED = 1 << 0;
        /// Alpha blended and drawn after opaque geometry.
        const TRANSPARENT = 1 << 1;
        /// Test against the depth buffer.
        const DEPTH_TEST = 1 << 2;
        /// Rasterize edges only.
        const WIREFRAME = 1 << 3;
    }
}

#[derive(Debug)]
struct GpuState {
    shader_id: Option<u64>,
    pbr: bool,
    uniform: Option<UniformBuffer>,
    descriptor_set: Option<DescriptorSet>,
    textures_updated: bool,
    properties_dirty: bool,
}

/// A shared surface description.
///
/// Property and texture changes are picked up by the next
/// [`create_descriptor_set`](Self::create_descriptor_set); the descriptor set
/// is only rebuilt when a texture changed or the shader is different.
#[derive(Debug)]
pub struct Material {
    name: String,
    flags: RwLock<MaterialFlags>,
    textures: RwLock<MaterialTextures>,
    properties: RwLock<MaterialProperties>,
    gpu: Mutex<GpuState>,
}

impl Material {
    /// A material without textures.
    pub fn new(name: impl Into<String>, properties: MaterialProperties) -> Self {
        Self {
            name: name.into(),
            flags: RwLock::new(MaterialFlags::DEPTH_TEST),
            textures: RwLock::new(MaterialTextures::default()),
            properties: RwLock::new(properties),
            gpu: Mutex::new(GpuState {
                shader_id: None,
                pbr: true,
                uniform: None,
                descriptor_set: None,
                textures_updated: true,
                properties_dirty: true,
            }),
        }
    }

    /// Sets every texture map at construction.
    pub fn with_textures(self, textures: MaterialTextures) -> Self {
        self.set_textures(textures);
        self
    }

    /// Sets the render flags at construction.
    pub fn with_flags(self, flags: MaterialFlags) -> Self {
        self.set_flags(flags);
        self
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current render flags.
    pub fn flags(&self) -> MaterialFlags {
        *self
            .flags
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the render flags.
    pub fn set_flags(&self, flags: MaterialFlags) {
        *self
            .flags
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = flags;
    }

    /// A copy of the scalar properties as set by the user.
    pub fn properties(&self) -> MaterialProperties {
        *self
            .properties
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the scalar properties. Every draw using the material sees the
    /// change on its next bind.
    pub fn set_properties(&self, properties: MaterialProperties) {
        *self
            .properties
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = properties;
        self.lock_gpu().properties_dirty = true;
    }

    /// A copy of the texture maps.
    pub fn textures(&self) -> MaterialTextures {
        self.textures
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces every texture map.
    pub fn set_textures(&self, textures: MaterialTextures) {
        *self
            .textures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = textures;
        self.mark_textures_updated();
    }

    /// Replaces one texture map.
    pub fn set_texture(&self, slot: TextureSlot, texture: Option<Arc<Texture2D>>) {
        self.textures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set(slot, texture);
        self.mark_textures_updated();
    }

    /// Whether the material is alpha blended.
    pub fn is_transparent(&self) -> bool {
        self.flags().contains(MaterialFlags::TRANSPARENT)
    }

    /// Face culling implied by the flags.
    pub fn cull_mode(&self) -> CullMode {
        if self.flags().contains(MaterialFlags::TWO_SIDED) {
            CullMode::None
        } else {
            CullMode::Back
        }
    }

    /// Blending implied by the flags.
    pub fn blend_mode(&self) -> BlendMode {
        if self.is_transparent() {
            BlendMode::SrcAlphaOneMinusSrcAlpha
        } else {
            BlendMode::None
        }
    }

    /// Rasterization mode implied by the flags.
    pub fn polygon_mode(&self) -> PolygonMode {
        if self.flags().contains(MaterialFlags::WIREFRAME) {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        }
    }

    /// Builds or refreshes the descriptor set of the material for `shader`.
    ///
    /// Empty texture slots bind `default_texture` and have their
    /// `using_*_map` flag uploaded as 0.0. Without `pbr` only the albedo map
    /// is considered. Only the bindings the shader declares in
    /// [`MATERIAL_SET`] are filled.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if the shader has no material set or the
    /// backend rejects the uniform buffer or the bind group.
    pub fn create_descriptor_set(
        &self,
        shader: &Arc<Shader>,
        default_texture: &Arc<Texture2D>,
        pbr: bool,
    ) -> Result<(), ResourceError> {
        let mut gpu = self.lock_gpu();

        let shader_changed = gpu.shader_id != Some(shader.id()) || gpu.pbr != pbr;
        if shader_changed {
            gpu.descriptor_set = Some(DescriptorSet::new(shader, MATERIAL_SET)?);
            gpu.shader_id = Some(shader.id());
            gpu.pbr = pbr;
            gpu.textures_updated = true;
            gpu.properties_dirty = true;
        }
        if gpu.uniform.is_none() {
            let size = std::mem::size_of::<MaterialProperties>() as u64;
            gpu.uniform = Some(UniformBuffer::new(
                shader.device(),
                &format!("{} properties", self.name),
                size,
            )?);
            gpu.textures_updated = true;
            gpu.properties_dirty = true;
        }

        let textures = self.textures();
        if gpu.properties_dirty {
            let uploaded = self.resolved_properties(&textures, pbr);
            if let Some(uniform) = &gpu.uniform {
                uniform.set_data(bytemuck::bytes_of(&uploaded))?;
            }
            gpu.properties_dirty = false;
        }

        if gpu.textures_updated {
            let declared: Vec<u32> = shader
                .reflection()
                .descriptors_in_set(MATERIAL_SET)
                .map(|d| d.binding)
                .collect();
            let mut descriptors = Vec::new();
            if let Some(uniform) = &gpu.uniform {
                if declared.contains(&PROPERTIES_BINDING) {
                    descriptors.push(Descriptor::uniform(
                        PROPERTIES_BINDING,
                        "material_properties",
                        uniform,
                    ));
                }
            }
            for slot in TextureSlot::ALL {
                if !declared.contains(&slot.binding()) {
                    continue;
                }
                let texture = textures.get(slot).unwrap_or(default_texture);
                descriptors.push(Descriptor::texture(slot.binding(), slot.name(), texture));
            }
            if let Some(set) = gpu.descriptor_set.as_mut() {
                set.update(descriptors)?;
            }
            gpu.textures_updated = false;
            log::debug!(
                "Material '{}': descriptor set rebuilt for shader '{}'",
                self.name,
                shader.name()
            );
        }
        Ok(())
    }

    /// Binds the material's descriptor set at `group_index`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidDescriptor`] if
    /// [`create_descriptor_set`](Self::create_descriptor_set) never ran.
    pub fn bind(&self, pass: &mut dyn RenderPass<'_>, group_index: u32) -> Result<(), ResourceError> {
        let gpu = self.lock_gpu();
        match &gpu.descriptor_set {
            Some(set) => set.bind(pass, group_index, None),
            None => Err(ResourceError::InvalidDescriptor(format!(
                "material '{}' bound before its descriptor set was created",
                self.name
            ))),
        }
    }

    /// Backend bind group of the material, once created.
    pub fn bind_group(&self) -> Option<BindGroupId> {
        self.lock_gpu()
            .descriptor_set
            .as_ref()
            .and_then(DescriptorSet::bind_group)
    }

    /// Uniform buffer holding the uploaded properties, once created.
    pub fn uniform_buffer(&self) -> Option<BufferId> {
        self.lock_gpu().uniform.as_ref().map(UniformBuffer::id)
    }

    fn resolved_properties(&self, textures: &MaterialTextures, pbr: bool) -> MaterialProperties {
        let mut properties = self.properties();
        for slot in TextureSlot::ALL {
            let available = textures.get(slot).is_some() && (pbr || slot == TextureSlot::Albedo);
            if !available {
                *properties.using_map_mut(slot) = 0.0;
            }
        }
        properties
    }

    fn mark_textures_updated(&self) {
        let mut gpu = self.lock_gpu();
        gpu.textures_updated = true;
        gpu.properties_dirty = true;
    }

    fn lock_gpu(&self) -> MutexGuard<'_, GpuState> {
        self.gpu
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::bind_group::BindingResource;
    use crate::renderer::shader::{EmbeddedIncludes, ShaderOptions};
    use crate::renderer::testing::MockDevice;
    use crate::renderer::traits::GraphicsDevice;

    const SOURCE: &str = r#"
struct MaterialProperties {
    albedo_colour: vec4<f32>,
    emissive_colour: vec4<f32>,
    roughness: f32,
    metallic: f32,
    reflectance: f32,
    emissive_intensity: f32,
    using_albedo_map: f32,
    using_metallic_map: f32,
    using_roughness_map: f32,
    using_normal_map: f32,
    using_ao_map: f32,
    using_emissive_map: f32,
    workflow: f32,
    alpha_cutoff: f32,
};
@group(1) @binding(0) var<uniform> material: MaterialProperties;
@group(1) @binding(1) var albedo_map: texture_2d<f32>;
@group(1) @binding(2) var albedo_sampler: sampler;
@group(1) @binding(3) var metallic_map: texture_2d<f32>;
@group(1) @binding(4) var metallic_sampler: sampler;
@group(1) @binding(5) var roughness_map: texture_2d<f32>;
@group(1) @binding(6) var roughness_sampler: sampler;
@group(1) @binding(7) var normal_map: texture_2d<f32>;
@group(1) @binding(8) var normal_sampler: sampler;
@group(1) @binding(9) var ao_map: texture_2d<f32>;
@group(1) @binding(10) var ao_sampler: sampler;
@group(1) @binding(11) var emissive_map: texture_2d<f32>;
@group(1) @binding(12) var emissive_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let uv = vec2<f32>(0.5, 0.5);
    var colour = material.albedo_colour * textureSample(albedo_map, albedo_sampler, uv);
    colour += textureSample(metallic_map, metallic_sampler, uv) * material.using_metallic_map;
    colour += textureSample(roughness_map, roughness_sampler, uv) * material.using_roughness_map;
    colour += textureSample(normal_map, normal_sampler, uv) * material.using_normal_map;
    colour += textureSample(ao_map, ao_sampler, uv) * material.using_ao_map;
    colour += textureSample(emissive_map, emissive_sampler, uv) * material.using_emissive_map;
    return colour;
}
"#;

    fn pbr_shader(device: &Arc<dyn GraphicsDevice>) -> Arc<Shader> {
        Shader::from_source(
            device,
            "pbr",
            SOURCE,
            &EmbeddedIncludes::new(),
            &ShaderOptions::default(),
        )
        .unwrap()
    }

    fn uploaded(mock: &MockDevice, material: &Material) -> MaterialProperties {
        let bytes = mock.buffer_data(material.uniform_buffer().unwrap()).unwrap();
        bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<MaterialProperties>()])
    }

    #[test]
    fn properties_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<MaterialProperties>(), 80);
        assert_eq!(MaterialProperties::layout().size(), 80);

        let (_mock, device) = MockDevice::shared();
        let shader = pbr_shader(&device);
        let block = shader.reflection().uniform_block("material").unwrap();
        MaterialProperties::layout().validate_against(block).unwrap();
    }

    #[test]
    fn material_without_textures_falls_back_to_white() {
        let (mock, device) = MockDevice::shared();
        let shader = pbr_shader(&device);
        let white = Arc::new(Texture2D::white(&device).unwrap());
        let material = Material::new("plain", MaterialProperties::default());

        material.create_descriptor_set(&shader, &white, true).unwrap();

        let properties = uploaded(&mock, &material);
        for slot in TextureSlot::ALL {
            assert_eq!(properties.using_map(slot), 0.0, "{slot:?}");
        }
        // The user-facing copy is untouched.
        assert_eq!(material.properties().using_albedo_map, 1.0);

        let entries = mock.bind_group_entries(material.bind_group().unwrap()).unwrap();
        for slot in TextureSlot::ALL {
            let texture = entries.iter().find(|e| e.binding == slot.binding()).unwrap();
            assert_eq!(texture.resource, BindingResource::TextureView(white.view()));
            let sampler = entries.iter().find(|e| e.binding == slot.binding() + 1).unwrap();
            assert_eq!(sampler.resource, BindingResource::Sampler(white.sampler()));
        }
    }

    #[test]
    fn bound_texture_enables_its_flag_and_rebuilds_the_set() {
        let (mock, device) = MockDevice::shared();
        let shader = pbr_shader(&device);
        let white = Arc::new(Texture2D::white(&device).unwrap());
        let normal = Arc::new(
            Texture2D::from_source(&device, "normal", 1, 1, &[128, 128, 255, 255], Default::default())
                .unwrap(),
        );
        let material = Material::new("bumpy", MaterialProperties::default());
        material.create_descriptor_set(&shader, &white, true).unwrap();
        let first = material.bind_group().unwrap();

        // Nothing changed: the set is kept.
        material.create_descriptor_set(&shader, &white, true).unwrap();
        assert_eq!(material.bind_group().unwrap(), first);

        material.set_texture(TextureSlot::Normal, Some(normal.clone()));
        material.create_descriptor_set(&shader, &white, true).unwrap();
        let second = material.bind_group().unwrap();
        assert_ne!(first, second);

        let properties = uploaded(&mock, &material);
        assert_eq!(properties.using_normal_map, 1.0);
        assert_eq!(properties.using_albedo_map, 0.0);
        let entries = mock.bind_group_entries(second).unwrap();
        let slot = entries
            .iter()
            .find(|e| e.binding == TextureSlot::Normal.binding())
            .unwrap();
        assert_eq!(slot.resource, BindingResource::TextureView(normal.view()));
    }

    #[test]
    fn non_pbr_only_uses_the_albedo_map() {
        let (mock, device) = MockDevice::shared();
        let shader = pbr_shader(&device);
        let white = Arc::new(Texture2D::white(&device).unwrap());
        let map = Arc::new(Texture2D::white(&device).unwrap());
        let material = Material::new("flat", MaterialProperties::default()).with_textures(
            MaterialTextures {
                albedo: Some(map.clone()),
                roughness: Some(map),
                ..Default::default()
            },
        );

        material.create_descriptor_set(&shader, &white, false).unwrap();
        let properties = uploaded(&mock, &material);
        assert_eq!(properties.using_albedo_map, 1.0);
        assert_eq!(properties.using_roughness_map, 0.0);
    }

    #[test]
    fn flags_drive_pipeline_state() {
        let material = Material::new("glass", MaterialProperties::default())
            .with_flags(MaterialFlags::TRANSPARENT | MaterialFlags::TWO_SIDED);
        assert!(material.is_transparent());
        assert_eq!(material.cull_mode(), CullMode::None);
        assert_eq!(material.blend_mode(), BlendMode::SrcAlphaOneMinusSrcAlpha);
        assert_eq!(material.polygon_mode(), PolygonMode::Fill);
    }
}
