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

//! Renderable content: meshes, materials, cameras and the BRDF LUT.

pub mod brdf;
pub mod camera;
pub mod material;
pub mod mesh;

pub use self::brdf::{brdf_lut_texture, DEFAULT_LUT_SIZE, DEFAULT_SAMPLE_COUNT};
pub use self::camera::{Camera, CameraUniformData};
pub use self::material::{
    Material, MaterialFlags, MaterialProperties, MaterialTextures, TextureSlot, Workflow,
    MATERIAL_SET,
};
pub use self::mesh::{Mesh, MeshData, Vertex};
