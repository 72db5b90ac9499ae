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

//! glTF 2.0 models (`.gltf` with external or embedded buffers, `.glb`).

use super::{ImageData, MaterialDesc, ModelData, ModelLoadError, ModelLoader, TextureRef};
use gltf::image::Format;
use gltf::mesh::Mode;
use lumos_core::math::{Mat3, Mat4, Vec2, Vec3};
use lumos_core::renderer::scene::{MeshData, Vertex};
use std::path::{Path, PathBuf};

/// Loads glTF documents, their buffers and their images.
///
/// Meshes are flattened: every triangle primitive reachable from the
/// default scene becomes one [`MeshData`] with its node's world transform
/// baked in. Documents without scenes contribute each mesh once, untransformed.
#[derive(Debug, Clone)]
pub struct GltfLoader {
    base: PathBuf,
}

impl GltfLoader {
    /// A loader resolving external buffers and images relative to `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }
}

impl ModelLoader for GltfLoader {
    fn load(&self, bytes: &[u8]) -> Result<ModelData, ModelLoadError> {
        let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
        let buffers = gltf::import_buffers(&document, Some(&self.base), blob)?;
        let images = gltf::import_images(&document, Some(&self.base), &buffers)?;

        let mut model = ModelData {
            materials: document.materials().map(|m| material_desc(&m)).collect(),
            images: images
                .iter()
                .enumerate()
                .map(|(i, image)| {
                    let pixels = to_rgba8(image.format, &image.pixels).unwrap_or_else(|| {
                        log::warn!(
                            "GltfLoader: image {} uses {:?}, replaced with white",
                            i,
                            image.format
                        );
                        vec![255; image.width as usize * image.height as usize * 4]
                    });
                    ImageData {
                        name: format!("gltf image {i}"),
                        width: image.width,
                        height: image.height,
                        pixels,
                    }
                })
                .collect(),
            ..Default::default()
        };

        let mut placed = Vec::new();
        match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    collect_meshes(&node, Mat4::IDENTITY, &mut placed);
                }
            }
            None => placed.extend(document.meshes().map(|mesh| (mesh, Mat4::IDENTITY))),
        }

        let mut fallback = None;
        for (mesh, transform) in placed {
            for primitive in mesh.primitives() {
                if primitive.mode() != Mode::Triangles {
                    log::warn!(
                        "GltfLoader: mesh '{}' primitive {} uses {:?}, skipped",
                        mesh.name().unwrap_or("unnamed"),
                        primitive.index(),
                        primitive.mode()
                    );
                    continue;
                }
                let reader =
                    primitive.reader(|buffer| Some(buffers[buffer.index()].0.as_slice()));
                let Some(positions) = reader.read_positions() else {
                    continue;
                };
                let positions: Vec<[f32; 3]> = positions.collect();
                let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
                let uvs: Option<Vec<[f32; 2]>> =
                    reader.read_tex_coords(0).map(|t| t.into_f32().collect());
                let tangents: Option<Vec<[f32; 4]>> =
                    reader.read_tangents().map(Iterator::collect);
                let colours: Option<Vec<[f32; 4]>> =
                    reader.read_colors(0).map(|c| c.into_rgba_f32().collect());
                let indices: Vec<u32> = reader
                    .read_indices()
                    .map(|i| i.into_u32().collect())
                    .unwrap_or_else(|| (0..positions.len() as u32).collect());

                let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();
                let vertices = positions
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let position = transform.transform_point3(Vec3::from_array(*p));
                        let normal = normals
                            .as_ref()
                            .and_then(|n| n.get(i))
                            .map_or(Vec3::Y, |n| {
                                (normal_matrix * Vec3::from_array(*n)).normalize_or_zero()
                            });
                        let uv = uvs
                            .as_ref()
                            .and_then(|t| t.get(i))
                            .map_or(Vec2::ZERO, |t| Vec2::from_array(*t));
                        let mut vertex = Vertex::new(position, uv, normal);
                        if let Some(c) = colours.as_ref().and_then(|c| c.get(i)) {
                            vertex.colour = *c;
                        }
                        if let Some(t) = tangents.as_ref().and_then(|t| t.get(i)) {
                            let direction =
                                transform.transform_vector3(Vec3::new(t[0], t[1], t[2]));
                            vertex.tangent = direction.normalize_or_zero().extend(t[3]).to_array();
                        }
                        vertex
                    })
                    .collect();

                let mut data = MeshData { vertices, indices };
                if tangents.is_none() {
                    data.compute_tangents();
                }
                let material = match primitive.material().index() {
                    Some(index) => index,
                    None => model.default_material(&mut fallback),
                };
                model.meshes.push((data, material));
            }
        }
        if model.meshes.is_empty() {
            return Err(ModelLoadError::Empty);
        }
        Ok(model)
    }
}

fn collect_meshes<'a>(
    node: &gltf::Node<'a>,
    parent: Mat4,
    out: &mut Vec<(gltf::Mesh<'a>, Mat4)>,
) {
    let transform = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        out.push((mesh, transform));
    }
    for child in node.children() {
        collect_meshes(&child, transform, out);
    }
}

fn material_desc(material: &gltf::Material<'_>) -> MaterialDesc {
    let pbr = material.pbr_metallic_roughness();
    let image = |texture: gltf::Texture<'_>| TextureRef::Embedded(texture.source().index());
    let metallic_roughness = pbr.metallic_roughness_texture().map(|i| image(i.texture()));
    let (transparent, alpha_cutoff) = match material.alpha_mode() {
        gltf::material::AlphaMode::Opaque => (false, 0.0),
        gltf::material::AlphaMode::Mask => (false, material.alpha_cutoff().unwrap_or(0.5)),
        gltf::material::AlphaMode::Blend => (true, 0.0),
    };
    MaterialDesc {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material {}", material.index().unwrap_or_default())),
        albedo_colour: pbr.base_color_factor(),
        emissive_colour: material.emissive_factor(),
        roughness: pbr.roughness_factor(),
        metallic: pbr.metallic_factor(),
        alpha_cutoff,
        packed_metallic_roughness: metallic_roughness.is_some(),
        two_sided: material.double_sided(),
        transparent,
        albedo_map: pbr.base_color_texture().map(|i| image(i.texture())),
        metallic_map: metallic_roughness,
        normal_map: material.normal_texture().map(|n| image(n.texture())),
        ao_map: material.occlusion_texture().map(|o| image(o.texture())),
        emissive_map: material.emissive_texture().map(|i| image(i.texture())),
        ..MaterialDesc::default()
    }
}

/// Expands decoded glTF pixels to RGBA8. Wide formats keep their high
/// byte; float formats are clamped to `[0, 1]`.
pub fn to_rgba8(format: Format, pixels: &[u8]) -> Option<Vec<u8>> {
    let unorm16 = |c: &[u8]| c[1];
    let float = |c: &[u8]| {
        let value = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    };
    let out = match format {
        Format::R8 => pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        Format::R8G8 => pixels.chunks_exact(2).flat_map(|p| [p[0], p[1], 0, 255]).collect(),
        Format::R8G8B8 => pixels.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect(),
        Format::R8G8B8A8 => pixels.to_vec(),
        Format::R16 => pixels
            .chunks_exact(2)
            .flat_map(|p| {
                let v = unorm16(p);
                [v, v, v, 255]
            })
            .collect(),
        Format::R16G16B16A16 => pixels
            .chunks_exact(8)
            .flat_map(|p| [unorm16(&p[0..2]), unorm16(&p[2..4]), unorm16(&p[4..6]), unorm16(&p[6..8])])
            .collect(),
        Format::R32G32B32A32FLOAT => pixels
            .chunks_exact(16)
            .flat_map(|p| [float(&p[0..4]), float(&p[4..8]), float(&p[8..12]), float(&p[12..16])])
            .collect(),
        _ => return None,
    };
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One triangle, positions only, buffer embedded as a data URI.
    const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [0.0, 2.0, 0.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        }]
    }"#;

    #[test]
    fn node_transforms_are_baked_into_positions() {
        let model = GltfLoader::new(".").load(TRIANGLE.as_bytes()).unwrap();
        assert_eq!(model.meshes.len(), 1);
        let (mesh, material) = &model.meshes[0];
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].position, [1.0, 2.0, 0.0]);
        assert_eq!(mesh.vertices[2].position, [0.0, 3.0, 0.0]);
        assert_eq!(model.materials[*material].name, "default");
    }

    #[test]
    fn narrow_formats_expand_to_rgba8() {
        assert_eq!(to_rgba8(Format::R8, &[7]), Some(vec![7, 7, 7, 255]));
        assert_eq!(to_rgba8(Format::R8G8B8, &[1, 2, 3]), Some(vec![1, 2, 3, 255]));
        let half = 0.5f32.to_le_bytes();
        let one = 1.0f32.to_le_bytes();
        let pixel: Vec<u8> = [half, one, one, one].concat();
        assert_eq!(to_rgba8(Format::R32G32B32A32FLOAT, &pixel), Some(vec![128, 255, 255, 255]));
    }
}
