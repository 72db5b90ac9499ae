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

//! Defines the intermediate `RenderWorld` and its associated data structures.
//!
//! The `RenderWorld` is a temporary, frame-by-frame description of what to
//! draw. The application fills it, every lane reads it, and it is cleared
//! before the next frame.

use super::pass_state::RenderCommand;
use lumos_core::math::{LinearRgba, Mat4, Vec2, Vec3};
use lumos_core::renderer::light::{LightSet, LightType};
use lumos_core::renderer::resources::{Texture2D, TextureCube};
use lumos_core::renderer::scene::{Camera, Material, Mesh};
use std::sync::Arc;

/// A mesh instance placed in the world.
#[derive(Debug, Clone)]
pub struct Renderable {
    /// Geometry.
    pub mesh: Arc<Mesh>,
    /// Surface.
    pub material: Arc<Material>,
    /// Model to world.
    pub transform: Mat4,
    /// Applied to texture coordinates.
    pub texture_matrix: Mat4,
    /// Whether the instance is drawn into shadow cascades.
    pub casts_shadows: bool,
}

impl Renderable {
    /// A shadow-casting instance with an identity texture matrix.
    pub fn new(mesh: Arc<Mesh>, material: Arc<Material>, transform: Mat4) -> Self {
        Self {
            mesh,
            material,
            transform,
            texture_matrix: Mat4::IDENTITY,
            casts_shadows: true,
        }
    }

    /// The draw command for this instance.
    pub fn command(&self) -> RenderCommand {
        RenderCommand {
            mesh: self.mesh.clone(),
            material: self.material.clone(),
            transform: self.transform,
            texture_matrix: self.texture_matrix,
        }
    }
}

/// Image-based lighting inputs.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Radiance cubemap, also drawn as the sky.
    pub skybox: Arc<TextureCube>,
    /// Diffuse irradiance; the radiance map is used when absent.
    pub irradiance: Option<Arc<TextureCube>>,
    /// Multiplier on both maps.
    pub intensity: f32,
}

impl Environment {
    /// An environment whose radiance map doubles as irradiance.
    pub fn new(skybox: Arc<TextureCube>) -> Self {
        Self {
            skybox,
            irradiance: None,
            intensity: 1.0,
        }
    }
}

/// A 2D sprite drawn by the batch lane.
#[derive(Debug, Clone)]
pub struct Quad {
    /// Maps the unit square `[-0.5, 0.5]²` to the 2D camera's space.
    pub transform: Mat4,
    /// Tint.
    pub colour: LinearRgba,
    /// Sprite image; white when absent.
    pub texture: Option<Arc<Texture2D>>,
    /// Texture coordinates of the bottom-left and top-right corners.
    pub uv: [Vec2; 2],
}

impl Quad {
    /// An untextured quad centred on `position`.
    pub fn coloured(position: Vec2, size: Vec2, colour: LinearRgba) -> Self {
        Self {
            transform: Mat4::from_translation(position.extend(0.0))
                * Mat4::from_scale(size.extend(1.0)),
            colour,
            texture: None,
            uv: [Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0)],
        }
    }

    /// A textured quad centred on `position`.
    pub fn textured(position: Vec2, size: Vec2, texture: Arc<Texture2D>) -> Self {
        Self {
            texture: Some(texture),
            ..Self::coloured(position, size, LinearRgba::WHITE)
        }
    }
}

/// A world-space line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// First end.
    pub start: Vec3,
    /// Second end.
    pub end: Vec3,
    /// Colour.
    pub colour: LinearRgba,
}

/// A camera-facing world-space dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Centre.
    pub position: Vec3,
    /// Diameter in world units.
    pub size: f32,
    /// Colour.
    pub colour: LinearRgba,
}

/// Everything the lanes draw in one frame.
#[derive(Debug, Clone, Default)]
pub struct RenderWorld {
    /// Main camera. Lanes drawing the 3D scene stay blank without one.
    pub camera: Option<Camera>,
    /// View-projection of the 2D batch lane; a pixel-space orthographic
    /// projection is used when absent.
    pub camera_2d: Option<Mat4>,
    /// Mesh instances.
    pub renderables: Vec<Renderable>,
    /// Lights. The first directional light casts the cascaded shadows.
    pub lights: LightSet,
    /// Image-based lighting and sky.
    pub environment: Option<Environment>,
    /// 2D sprites.
    pub quads: Vec<Quad>,
    /// Debug lines.
    pub lines: Vec<Line>,
    /// Debug points.
    pub points: Vec<Point>,
}

impl RenderWorld {
    /// Creates a new, empty `RenderWorld`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mesh instance.
    pub fn submit(&mut self, renderable: Renderable) {
        self.renderables.push(renderable);
    }

    /// Adds a light.
    pub fn add_light(&mut self, light: LightType) {
        self.lights.push(light);
    }

    /// Adds a 2D sprite.
    pub fn draw_quad(&mut self, quad: Quad) {
        self.quads.push(quad);
    }

    /// Adds a line segment.
    pub fn draw_line(&mut self, start: Vec3, end: Vec3, colour: LinearRgba) {
        self.lines.push(Line { start, end, colour });
    }

    /// Adds a point.
    pub fn draw_point(&mut self, position: Vec3, size: f32, colour: LinearRgba) {
        self.points.push(Point {
            position,
            size,
            colour,
        });
    }

    /// Clears all per-frame content; the camera and environment are kept.
    pub fn clear(&mut self) {
        self.renderables.clear();
        self.lights.lights.clear();
        self.quads.clear();
        self.lines.clear();
        self.points.clear();
    }
}
