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

//! Wavefront OBJ models through `tobj`.

use super::{MaterialDesc, ModelData, ModelLoadError, ModelLoader, TextureRef};
use ahash::AHashMap;
use anyhow::Context;
use lumos_core::math::{Vec2, Vec3};
use lumos_core::renderer::scene::{MeshData, Vertex};
use std::path::{Path, PathBuf};

/// Loads `.obj` files and their `.mtl` libraries.
///
/// Faces are triangulated and re-indexed so every vertex has a single
/// index. Texture coordinates are flipped to a top-left origin. Missing
/// normals are rebuilt from the faces and tangents are always computed.
#[derive(Debug, Clone)]
pub struct ObjLoader {
    base: PathBuf,
}

impl ObjLoader {
    /// A loader resolving material libraries relative to `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }
}

impl ModelLoader for ObjLoader {
    fn load(&self, bytes: &[u8]) -> Result<ModelData, ModelLoadError> {
        let obj_text = std::str::from_utf8(bytes).context("OBJ file is not valid UTF-8")?;
        let (models, materials) = tobj::load_obj_buf(
            &mut std::io::Cursor::new(obj_text),
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            |path| {
                let path = self.base.join(path);
                tobj::load_mtl(&path).or_else(|e| {
                    log::warn!(
                        "ObjLoader: material library '{}' unavailable: {}",
                        path.display(),
                        e
                    );
                    Ok((Vec::new(), AHashMap::new()))
                })
            },
        )?;

        let mut model = ModelData {
            materials: materials
                .unwrap_or_default()
                .iter()
                .map(material_desc)
                .collect(),
            ..Default::default()
        };
        let material_count = model.materials.len();
        let mut fallback = None;
        for obj in &models {
            if obj.mesh.indices.is_empty() {
                continue;
            }
            let material = match obj.mesh.material_id {
                Some(id) if id < material_count => id,
                _ => model.default_material(&mut fallback),
            };
            model.meshes.push((mesh_data(&obj.mesh), material));
        }
        if model.meshes.is_empty() {
            return Err(ModelLoadError::Empty);
        }
        Ok(model)
    }
}

fn mesh_data(mesh: &tobj::Mesh) -> MeshData {
    let count = mesh.positions.len() / 3;
    let mut vertices: Vec<Vertex> = (0..count)
        .map(|i| {
            let position = Vec3::from_slice(&mesh.positions[i * 3..i * 3 + 3]);
            let uv = mesh
                .texcoords
                .get(i * 2..i * 2 + 2)
                .map_or(Vec2::ZERO, |t| Vec2::new(t[0], 1.0 - t[1]));
            let normal = mesh
                .normals
                .get(i * 3..i * 3 + 3)
                .map_or(Vec3::ZERO, Vec3::from_slice);
            let mut vertex = Vertex::new(position, uv, normal);
            if let Some(c) = mesh.vertex_color.get(i * 3..i * 3 + 3) {
                vertex.colour = [c[0], c[1], c[2], 1.0];
            }
            vertex
        })
        .collect();

    if mesh.normals.is_empty() {
        let mut normals = vec![Vec3::ZERO; count];
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            if a >= count || b >= count || c >= count {
                continue;
            }
            let (pa, pb, pc) = (
                vertices[a].position(),
                vertices[b].position(),
                vertices[c].position(),
            );
            // Area weighted.
            let face = (pb - pa).cross(pc - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            vertex.normal = normal.normalize_or_zero().to_array();
        }
    }

    let mut data = MeshData {
        vertices,
        indices: mesh.indices.clone(),
    };
    data.compute_tangents();
    data
}

fn texture(name: &Option<String>) -> Option<TextureRef> {
    name.as_ref()
        .filter(|n| !n.is_empty())
        .map(|n| TextureRef::File(PathBuf::from(n)))
}

fn param(material: &tobj::Material, key: &str) -> Option<f32> {
    material.unknown_param.get(key)?.trim().parse().ok()
}

/// Maps an MTL material, honouring the PBR extension (`Pr`, `Pm`, `Ke`,
/// `map_Pr`, `map_Pm`, `map_Ke`) when present.
fn material_desc(material: &tobj::Material) -> MaterialDesc {
    let defaults = MaterialDesc::default();
    let [r, g, b] = material.diffuse.unwrap_or([1.0; 3]);
    let alpha = material.dissolve.unwrap_or(1.0);
    // Phong exponent to perceptual roughness.
    let roughness = param(material, "Pr").unwrap_or_else(|| {
        material
            .shininess
            .map_or(defaults.roughness, |ns| (2.0 / (ns.max(0.0) + 2.0)).sqrt())
    });
    let emissive = material
        .unknown_param
        .get("Ke")
        .map(|value| {
            let parts: Vec<f32> = value
                .split_whitespace()
                .filter_map(|p| p.parse().ok())
                .collect();
            match parts.as_slice() {
                [r, g, b, ..] => [*r, *g, *b],
                [v] => [*v; 3],
                _ => [0.0; 3],
            }
        })
        .unwrap_or([0.0; 3]);
    let extension_map = |key: &str| {
        material
            .unknown_param
            .get(key)
            .and_then(|value| value.split_whitespace().last())
            .map(|n| TextureRef::File(PathBuf::from(n)))
    };

    MaterialDesc {
        name: material.name.clone(),
        albedo_colour: [r, g, b, alpha],
        emissive_colour: emissive,
        roughness: roughness.clamp(0.04, 1.0),
        metallic: param(material, "Pm").unwrap_or(0.0),
        transparent: alpha < 1.0,
        albedo_map: texture(&material.diffuse_texture),
        metallic_map: extension_map("map_Pm"),
        roughness_map: extension_map("map_Pr"),
        normal_map: texture(&material.normal_texture),
        ao_map: texture(&material.ambient_texture),
        emissive_map: extension_map("map_Ke"),
        ..defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumos_core::renderer::scene::TextureSlot;

    const QUAD: &str = "\
o quad
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn quads_are_triangulated_with_rebuilt_normals() {
        let model = ObjLoader::new(".").load(QUAD.as_bytes()).unwrap();
        assert_eq!(model.meshes.len(), 1);
        let (mesh, material) = &model.meshes[0];
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(*material, 0);
        assert_eq!(model.materials[0].name, "default");
        for vertex in &mesh.vertices {
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        }
        // v flipped to a top-left origin.
        assert_eq!(mesh.vertices[0].uv, [0.0, 1.0]);
    }

    #[test]
    fn files_without_faces_are_empty() {
        let err = ObjLoader::new(".").load(b"v 0 0 0\n").unwrap_err();
        assert!(matches!(err, ModelLoadError::Empty));
    }

    #[test]
    fn pbr_extension_parameters_are_read() {
        let mut material = tobj::Material {
            name: "gold".to_string(),
            diffuse: Some([1.0, 0.8, 0.3]),
            diffuse_texture: Some("gold.png".to_string()),
            ..Default::default()
        };
        material.unknown_param.insert("Pr".to_string(), "0.3".to_string());
        material.unknown_param.insert("Pm".to_string(), "1".to_string());
        material.unknown_param.insert("map_Ke".to_string(), "glow.png".to_string());

        let desc = material_desc(&material);
        assert_eq!(desc.roughness, 0.3);
        assert_eq!(desc.metallic, 1.0);
        assert_eq!(desc.albedo_colour, [1.0, 0.8, 0.3, 1.0]);
        assert_eq!(desc.map(TextureSlot::Albedo), Some(&TextureRef::File("gold.png".into())));
        assert_eq!(desc.map(TextureSlot::Emissive), Some(&TextureRef::File("glow.png".into())));
        assert!(!desc.transparent);
    }
}
