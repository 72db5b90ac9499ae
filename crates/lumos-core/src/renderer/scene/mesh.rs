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

//! Meshes: CPU vertex data, GPU buffers and bounding volumes.

use crate::math::{Aabb, BoundingSphere, Vec2, Vec3};
use crate::renderer::api::buffer::VertexBufferLayoutDescriptor;
use crate::renderer::api::format::VertexFormat;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::{IndexBuffer, VertexBuffer};
use crate::renderer::traits::{GraphicsDevice, RenderPass};
use std::f32::consts::PI;
use std::sync::Arc;

/// The interleaved vertex format shared by every lit mesh.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Vertex colour.
    pub colour: [f32; 4],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Model-space normal.
    pub normal: [f32; 3],
    /// Tangent; `w` holds the bitangent sign.
    pub tangent: [f32; 4],
}

impl Vertex {
    /// A white vertex without tangent.
    pub fn new(position: Vec3, uv: Vec2, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            colour: [1.0; 4],
            uv: uv.to_array(),
            normal: normal.to_array(),
            tangent: [0.0; 4],
        }
    }

    /// Position as a vector.
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    /// Normal as a vector.
    pub fn normal(&self) -> Vec3 {
        Vec3::from(self.normal)
    }

    /// Buffer layout matching the shader locations 0..=4.
    pub fn layout() -> VertexBufferLayoutDescriptor {
        VertexBufferLayoutDescriptor::packed(&[
            VertexFormat::Float32x3,
            VertexFormat::Float32x4,
            VertexFormat::Float32x2,
            VertexFormat::Float32x3,
            VertexFormat::Float32x4,
        ])
    }
}

/// CPU-side geometry, as produced by loaders and generators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertices.
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Bounding box of every vertex position.
    pub fn bounds(&self) -> Aabb {
        self.vertices
            .iter()
            .fold(Aabb::INVALID, |aabb, v| aabb.merged_with_point(v.position()))
    }

    /// Recomputes tangents from positions and texture coordinates.
    pub fn compute_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            if a >= self.vertices.len() || b >= self.vertices.len() || c >= self.vertices.len() {
                continue;
            }
            let (v0, v1, v2) = (self.vertices[a], self.vertices[b], self.vertices[c]);
            let e1 = v1.position() - v0.position();
            let e2 = v2.position() - v0.position();
            let d1 = Vec2::from(v1.uv) - Vec2::from(v0.uv);
            let d2 = Vec2::from(v2.uv) - Vec2::from(v0.uv);
            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let t = (e1 * d2.y - e2 * d1.y) * r;
            let bt = (e2 * d1.x - e1 * d2.x) * r;
            for i in [a, b, c] {
                tangents[i] += t;
                bitangents[i] += bt;
            }
        }

        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let n = vertex.normal();
            // Gram-Schmidt against the normal.
            let t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
            let sign = if n.cross(t).dot(bitangents[i]) < 0.0 {
                -1.0
            } else {
                1.0
            };
            vertex.tangent = t.extend(sign).to_array();
        }
    }

    /// A unit quad in the XY plane facing +Z.
    pub fn quad() -> Self {
        let n = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0), n),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec2::new(1.0, 1.0), n),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 0.0), n),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec2::new(0.0, 0.0), n),
        ];
        let mut data = Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0],
        };
        data.compute_tangents();
        data
    }

    /// A cube spanning `[-1, 1]` with per-face normals.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::Z),
            (Vec3::Z, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y),
        ];
        let mut data = Self::default();
        for (normal, up) in faces {
            let right = up.cross(normal);
            let base = data.vertices.len() as u32;
            let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            for (x, y) in corners {
                data.vertices.push(Vertex::new(
                    normal + right * x + up * y,
                    Vec2::new((x + 1.0) * 0.5, (1.0 - y) * 0.5),
                    normal,
                ));
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        data.compute_tangents();
        data
    }

    /// A UV sphere of radius 1.
    pub fn sphere(sectors: u32, stacks: u32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(2);
        let mut data = Self::default();
        for i in 0..=stacks {
            let phi = PI / 2.0 - PI * i as f32 / stacks as f32;
            let (y, ring) = (phi.sin(), phi.cos());
            for j in 0..=sectors {
                let theta = 2.0 * PI * j as f32 / sectors as f32;
                let position = Vec3::new(ring * theta.cos(), y, -ring * theta.sin());
                data.vertices.push(Vertex::new(
                    position,
                    Vec2::new(j as f32 / sectors as f32, i as f32 / stacks as f32),
                    position.normalize_or_zero(),
                ));
            }
        }
        for i in 0..stacks {
            let row = i * (sectors + 1);
            let next = row + sectors + 1;
            for j in 0..sectors {
                if i != 0 {
                    data.indices.extend_from_slice(&[row + j, next + j, row + j + 1]);
                }
                if i != stacks - 1 {
                    data.indices
                        .extend_from_slice(&[row + j + 1, next + j, next + j + 1]);
                }
            }
        }
        data.compute_tangents();
        data
    }

    /// One triangle covering the whole screen in clip space.
    pub fn fullscreen_triangle() -> Self {
        let n = Vec3::Z;
        Self {
            vertices: vec![
                Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0), n),
                Vertex::new(Vec3::new(3.0, -1.0, 0.0), Vec2::new(2.0, 1.0), n),
                Vertex::new(Vec3::new(-1.0, 3.0, 0.0), Vec2::new(0.0, -1.0), n),
            ],
            indices: vec![0, 1, 2],
        }
    }
}

/// GPU geometry shared by every renderable that draws it.
#[derive(Debug)]
pub struct Mesh {
    name: String,
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    bounds: Aabb,
    sphere: BoundingSphere,
}

impl Mesh {
    /// Uploads `data`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidDescriptor`] for empty geometry or an index
    /// past the end of the vertex list.
    pub fn new(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        data: &MeshData,
    ) -> Result<Self, ResourceError> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "mesh '{name}' has no geometry"
            )));
        }
        if let Some(index) = data
            .indices
            .iter()
            .find(|i| **i as usize >= data.vertices.len())
        {
            return Err(ResourceError::InvalidDescriptor(format!(
                "mesh '{}' index {} exceeds {} vertices",
                name,
                index,
                data.vertices.len()
            )));
        }
        let bounds = data.bounds();
        let points: Vec<Vec3> = data.vertices.iter().map(Vertex::position).collect();
        let sphere = BoundingSphere::from_points(&points).unwrap_or_else(|| bounds.bounding_sphere());
        Ok(Self {
            name: name.to_string(),
            vertex_buffer: VertexBuffer::from_data(
                device,
                &format!("{name}_vertices"),
                bytemuck::cast_slice(&data.vertices),
            )?,
            index_buffer: IndexBuffer::from_u32(device, &format!("{name}_indices"), &data.indices)?,
            bounds,
            sphere,
        })
    }

    /// Binds the buffers and issues one indexed draw.
    pub fn draw(&self, pass: &mut dyn RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.id(), 0);
        pass.set_index_buffer(self.index_buffer.id(), 0, self.index_buffer.format());
        pass.draw_indexed(0..self.index_buffer.count(), 0, 0..1);
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model-space bounding box.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Model-space bounding sphere.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.sphere
    }

    /// Number of indices.
    pub fn index_count(&self) -> u32 {
        self.index_buffer.count()
    }

    /// Vertex buffer.
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    /// Index buffer.
    pub fn index_buffer(&self) -> &IndexBuffer {
        &self.index_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockDevice;
    use crate::math::Vec4;
    use approx::assert_relative_eq;

    #[test]
    fn vertex_layout_matches_struct() {
        assert_eq!(Vertex::layout().array_stride, std::mem::size_of::<Vertex>() as u64);
        assert_eq!(Vertex::layout().attributes[4].offset, 48);
    }

    #[test]
    fn cube_bounds_and_tangents() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        let bounds = cube.bounds();
        assert_eq!(bounds.min, Vec3::splat(-1.0));
        assert_eq!(bounds.max, Vec3::splat(1.0));
        for v in &cube.vertices {
            let tangent = Vec4::from(v.tangent).truncate();
            assert_relative_eq!(tangent.length(), 1.0, epsilon = 1e-4);
            assert_relative_eq!(tangent.dot(v.normal()), 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn sphere_vertices_lie_on_the_unit_sphere() {
        let sphere = MeshData::sphere(16, 8);
        for v in &sphere.vertices {
            assert_relative_eq!(v.position().length(), 1.0, epsilon = 1e-4);
        }
        assert!(sphere.indices.iter().all(|i| (*i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn mesh_rejects_out_of_range_indices() {
        let (_mock, device) = MockDevice::shared();
        let mut data = MeshData::quad();
        data.indices.push(17);
        assert!(Mesh::new(&device, "bad", &data).is_err());
    }

    #[test]
    fn mesh_uploads_interleaved_vertices() {
        let (mock, device) = MockDevice::shared();
        let data = MeshData::quad();
        let mesh = Mesh::new(&device, "quad", &data).unwrap();
        assert_eq!(mesh.index_count(), 6);
        let bytes = mock.buffer_data(mesh.vertex_buffer().id()).unwrap();
        assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<Vertex, u8>(&data.vertices));
        assert_relative_eq!(mesh.bounding_sphere().radius, 2f32.sqrt(), epsilon = 1e-5);
    }
}
