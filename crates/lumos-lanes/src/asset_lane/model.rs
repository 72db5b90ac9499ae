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

use ahash::AHashMap;
use lumos_core::renderer::resources::{LoadOptions, Texture2D, TextureParameters};
use lumos_core::renderer::scene::{
    Material, MaterialFlags, MaterialProperties, MaterialTextures, Mesh, MeshData, TextureSlot,
    Workflow,
};
use lumos_core::renderer::{GraphicsDevice, ResourceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading or instantiating a model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The file extension has no loader.
    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// `tobj` rejected the file.
    #[error("failed to parse OBJ: {0}")]
    Obj(#[from] tobj::LoadError),
    /// `gltf` rejected the file.
    #[error("failed to parse glTF: {0}")]
    Gltf(#[from] gltf::Error),
    /// The file parsed but holds no triangle geometry.
    #[error("model has no meshes")]
    Empty,
    /// A material description is not valid RON.
    #[error("failed to parse material description: {0}")]
    Material(#[from] ron::error::SpannedError),
    /// Uploading meshes or textures failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// Any other failure, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where a material map comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureRef {
    /// An image file, relative to the model's directory.
    File(PathBuf),
    /// An image decoded with the model, indexing [`ModelData::images`].
    Embedded(usize),
}

/// Decoded RGBA8 pixels shipped inside a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Debug name.
    pub name: String,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub pixels: Vec<u8>,
}

/// A serializable material, as read from a model file or a `.ron` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDesc {
    /// Material name.
    pub name: String,
    /// Linear base colour.
    pub albedo_colour: [f32; 4],
    /// Linear emitted colour.
    pub emissive_colour: [f32; 3],
    /// Multiplier on the emitted colour.
    pub emissive_intensity: f32,
    /// Perceptual roughness.
    pub roughness: f32,
    /// Metalness.
    pub metallic: f32,
    /// Dielectric reflectance.
    pub reflectance: f32,
    /// Alpha below which fragments are discarded.
    pub alpha_cutoff: f32,
    /// `metallic_map` packs roughness in green and metallic in blue.
    pub packed_metallic_roughness: bool,
    /// Disables back-face culling.
    pub two_sided: bool,
    /// Alpha blended.
    pub transparent: bool,
    /// Base colour map (sRGB).
    pub albedo_map: Option<TextureRef>,
    /// Metallic map, or the packed metallic-roughness map.
    pub metallic_map: Option<TextureRef>,
    /// Roughness map.
    pub roughness_map: Option<TextureRef>,
    /// Tangent-space normal map.
    pub normal_map: Option<TextureRef>,
    /// Ambient occlusion map.
    pub ao_map: Option<TextureRef>,
    /// Emission map (sRGB).
    pub emissive_map: Option<TextureRef>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        let properties = MaterialProperties::default();
        Self {
            name: "default".to_string(),
            albedo_colour: properties.albedo_colour,
            emissive_colour: [0.0; 3],
            emissive_intensity: properties.emissive_intensity,
            roughness: properties.roughness,
            metallic: properties.metallic,
            reflectance: properties.reflectance,
            alpha_cutoff: properties.alpha_cutoff,
            packed_metallic_roughness: false,
            two_sided: false,
            transparent: false,
            albedo_map: None,
            metallic_map: None,
            roughness_map: None,
            normal_map: None,
            ao_map: None,
            emissive_map: None,
        }
    }
}

impl MaterialDesc {
    /// Parses a RON description.
    pub fn from_ron_str(text: &str) -> Result<Self, ModelLoadError> {
        Ok(ron::from_str(text)?)
    }

    /// Serializes to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ModelLoadError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty)
            .map_err(|e| ModelLoadError::Other(anyhow::anyhow!("material '{}': {e}", self.name)))
    }

    /// The map in `slot`.
    pub fn map(&self, slot: TextureSlot) -> Option<&TextureRef> {
        match slot {
            TextureSlot::Albedo => self.albedo_map.as_ref(),
            TextureSlot::Metallic => self.metallic_map.as_ref(),
            TextureSlot::Roughness => self.roughness_map.as_ref(),
            TextureSlot::Normal => self.normal_map.as_ref(),
            TextureSlot::Ao => self.ao_map.as_ref(),
            TextureSlot::Emissive => self.emissive_map.as_ref(),
        }
    }

    /// GPU properties of the description.
    pub fn properties(&self) -> MaterialProperties {
        let [r, g, b] = self.emissive_colour;
        let workflow = if self.packed_metallic_roughness {
            Workflow::MetallicRoughness
        } else {
            Workflow::SeparateTextures
        };
        MaterialProperties {
            albedo_colour: self.albedo_colour,
            emissive_colour: [r, g, b, 1.0],
            roughness: self.roughness,
            metallic: self.metallic,
            reflectance: self.reflectance,
            emissive_intensity: self.emissive_intensity,
            alpha_cutoff: self.alpha_cutoff,
            ..MaterialProperties::default()
        }
        .with_workflow(workflow)
    }

    /// Render flags of the description.
    pub fn flags(&self) -> MaterialFlags {
        let mut flags = MaterialFlags::DEPTH_TEST;
        if self.two_sided {
            flags |= MaterialFlags::TWO_SIDED;
        }
        if self.transparent {
            flags |= MaterialFlags::TRANSPARENT;
        }
        flags
    }
}

/// Everything a loader produced for one file.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    /// Geometry with the index of its material.
    pub meshes: Vec<(MeshData, usize)>,
    /// Materials referenced by `meshes`.
    pub materials: Vec<MaterialDesc>,
    /// Images referenced through [`TextureRef::Embedded`].
    pub images: Vec<ImageData>,
}

impl ModelData {
    /// Index of a default material, appended on first use.
    pub(crate) fn default_material(&mut self, slot: &mut Option<usize>) -> usize {
        *slot.get_or_insert_with(|| {
            self.materials.push(MaterialDesc::default());
            self.materials.len() - 1
        })
    }

    /// Uploads every mesh, material and texture.
    ///
    /// File references are resolved against `base_dir`. A map that fails to
    /// load is logged and left empty, so the material samples white there.
    /// Textures shared by several materials are uploaded once.
    pub fn instantiate(
        &self,
        device: &Arc<dyn GraphicsDevice>,
        base_dir: impl AsRef<Path>,
    ) -> Result<Vec<(Arc<Mesh>, Arc<Material>)>, ModelLoadError> {
        let base_dir = base_dir.as_ref();
        let mut textures: AHashMap<(TextureRef, bool), Arc<Texture2D>> = AHashMap::new();
        let mut materials = Vec::with_capacity(self.materials.len());
        for desc in &self.materials {
            let mut maps = MaterialTextures::default();
            for slot in TextureSlot::ALL {
                let Some(texture_ref) = desc.map(slot) else {
                    continue;
                };
                let srgb = matches!(slot, TextureSlot::Albedo | TextureSlot::Emissive);
                let key = (texture_ref.clone(), srgb);
                if let Some(texture) = textures.get(&key) {
                    maps.set(slot, Some(texture.clone()));
                    continue;
                }
                match self.upload_texture(device, base_dir, texture_ref, srgb) {
                    Ok(texture) => {
                        let texture = Arc::new(texture);
                        textures.insert(key, texture.clone());
                        maps.set(slot, Some(texture));
                    }
                    Err(e) => log::warn!(
                        "ModelData: material '{}' {:?} map unavailable: {}",
                        desc.name,
                        slot,
                        e
                    ),
                }
            }
            materials.push(Arc::new(
                Material::new(desc.name.clone(), desc.properties())
                    .with_textures(maps)
                    .with_flags(desc.flags()),
            ));
        }

        let fallback = Arc::new(Material::new("default", MaterialProperties::default()));
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, (data, material))| -> Result<_, ModelLoadError> {
                let mesh = Arc::new(Mesh::new(device, &format!("mesh {i}"), data)?);
                let material = materials.get(*material).cloned().unwrap_or_else(|| {
                    log::warn!("ModelData: mesh {i} references missing material {material}");
                    fallback.clone()
                });
                Ok((mesh, material))
            })
            .collect()
    }

    fn upload_texture(
        &self,
        device: &Arc<dyn GraphicsDevice>,
        base_dir: &Path,
        texture_ref: &TextureRef,
        srgb: bool,
    ) -> Result<Texture2D, ResourceError> {
        let parameters = TextureParameters {
            srgb,
            ..TextureParameters::default()
        };
        match texture_ref {
            TextureRef::File(path) => {
                let path = base_dir.join(path);
                Texture2D::from_file(
                    device,
                    &path.display().to_string(),
                    &path,
                    parameters,
                    LoadOptions::default(),
                )
            }
            TextureRef::Embedded(index) => {
                let image = self.images.get(*index).ok_or_else(|| {
                    ResourceError::InvalidDescriptor(format!("embedded image {index} does not exist"))
                })?;
                Texture2D::from_source(
                    device,
                    &image.name,
                    image.width,
                    image.height,
                    &image.pixels,
                    parameters,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_descriptions_read_from_ron() {
        let desc = MaterialDesc::from_ron_str(
            r#"(
                name: "brass",
                metallic: 1.0,
                roughness: 0.25,
                two_sided: true,
                albedo_map: Some(File("brass_albedo.png")),
            )"#,
        )
        .unwrap();
        assert_eq!(desc.name, "brass");
        assert_eq!(desc.reflectance, MaterialDesc::default().reflectance);
        assert_eq!(desc.map(TextureSlot::Albedo), Some(&TextureRef::File("brass_albedo.png".into())));
        assert!(desc.flags().contains(MaterialFlags::TWO_SIDED));

        let text = desc.to_ron_string().unwrap();
        assert_eq!(MaterialDesc::from_ron_str(&text).unwrap(), desc);
    }

    #[test]
    fn packed_maps_select_the_metallic_roughness_workflow() {
        let desc = MaterialDesc {
            packed_metallic_roughness: true,
            emissive_colour: [1.0, 0.5, 0.0],
            ..MaterialDesc::default()
        };
        let properties = desc.properties();
        assert_eq!(properties.workflow, 1.0);
        assert_eq!(properties.emissive_colour, [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn default_material_is_appended_once() {
        let mut model = ModelData::default();
        let mut slot = None;
        assert_eq!(model.default_material(&mut slot), 0);
        assert_eq!(model.default_material(&mut slot), 0);
        assert_eq!(model.materials.len(), 1);
    }
}
