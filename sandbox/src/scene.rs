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

//! The demo scene: a lit floor, a grid of PBR spheres, a glass cube, a
//! gradient sky, debug primitives and a couple of sprites.

use anyhow::Result;
use lumos_core::math::{LinearRgba, Mat4, Quat, Vec2, Vec3};
use lumos_core::renderer::resources::{TextureCube, TextureParameters, CUBE_FACES};
use lumos_core::renderer::scene::{Material, MaterialFlags, MaterialProperties, Mesh, MeshData};
use lumos_core::renderer::{DirectionalLight, GraphicsDevice, LightType, PointLight};
use lumos_core::RenderContext;
use lumos_lanes::asset_lane::load_model;
use lumos_lanes::render_lane::{Environment, Quad, Renderable};
use lumos_lanes::RenderWorld;
use std::path::Path;
use std::sync::Arc;

const SKY_SIZE: u32 = 16;
const GRID: i32 = 5;

fn material(name: &str, albedo: [f32; 4], roughness: f32, metallic: f32) -> Arc<Material> {
    Arc::new(Material::new(
        name,
        MaterialProperties {
            albedo_colour: albedo,
            roughness,
            metallic,
            ..Default::default()
        },
    ))
}

/// Six faces blending from a pale horizon to a deeper zenith.
fn gradient_sky(device: &Arc<dyn GraphicsDevice>) -> Result<Arc<TextureCube>> {
    let horizon = [200.0, 215.0, 235.0];
    let zenith = [60.0, 110.0, 190.0];
    let ground = [70.0, 65.0, 60.0];
    let texels = (SKY_SIZE * SKY_SIZE) as usize;

    // Face order: +X, -X, +Y, -Y, +Z, -Z.
    let faces: Vec<Vec<u8>> = (0..CUBE_FACES)
        .map(|face| {
            let mut pixels = Vec::with_capacity(texels * 4);
            for y in 0..SKY_SIZE {
                let t = y as f32 / (SKY_SIZE - 1) as f32;
                let colour: [f32; 3] = match face {
                    2 => zenith,
                    3 => ground,
                    _ => std::array::from_fn(|c| zenith[c] + (horizon[c] - zenith[c]) * t),
                };
                for _ in 0..SKY_SIZE {
                    pixels.extend(colour.iter().map(|c| *c as u8));
                    pixels.push(255);
                }
            }
            pixels
        })
        .collect();
    let faces: [&[u8]; CUBE_FACES] = std::array::from_fn(|i| faces[i].as_slice());
    let cube = TextureCube::from_faces(device, "sandbox_sky", SKY_SIZE, faces, TextureParameters::default())?;
    Ok(Arc::new(cube))
}

/// Builds the scene, adding the model at `model` when given.
pub fn build(ctx: &RenderContext, model: Option<&Path>) -> Result<RenderWorld> {
    let device = ctx.device();
    let mut world = RenderWorld::new();

    let floor_mesh = Arc::new(Mesh::new(device, "floor", &MeshData::quad())?);
    let floor = Mat4::from_scale_rotation_translation(
        Vec3::splat(10.0),
        Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
        Vec3::new(0.0, -1.0, 0.0),
    );
    let mut floor = Renderable::new(floor_mesh, material("floor", [0.6, 0.6, 0.6, 1.0], 0.9, 0.0), floor);
    floor.casts_shadows = false;
    world.submit(floor);

    let sphere = Arc::new(Mesh::new(device, "sphere", &MeshData::sphere(32, 16))?);
    for row in 0..GRID {
        for column in 0..GRID {
            let roughness = (column as f32 + 0.5) / GRID as f32;
            let metallic = row as f32 / (GRID - 1) as f32;
            let name = format!("sphere_{row}_{column}");
            let transform = Mat4::from_scale_rotation_translation(
                Vec3::splat(0.4),
                Quat::IDENTITY,
                Vec3::new((column - GRID / 2) as f32, row as f32 * 0.9 - 0.4, -2.0),
            );
            world.submit(Renderable::new(
                sphere.clone(),
                material(&name, [0.9, 0.3, 0.2, 1.0], roughness, metallic),
                transform,
            ));
        }
    }

    let glass = Arc::new(
        Material::new(
            "glass",
            MaterialProperties {
                albedo_colour: [0.6, 0.8, 1.0, 0.35],
                roughness: 0.1,
                ..Default::default()
            },
        )
        .with_flags(MaterialFlags::DEPTH_TEST | MaterialFlags::TRANSPARENT),
    );
    let cube = Arc::new(Mesh::new(device, "cube", &MeshData::cube())?);
    world.submit(Renderable::new(
        cube,
        glass,
        Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)),
    ));

    if let Some(path) = model {
        let data = load_model(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for (mesh, material) in data.instantiate(device, base)? {
            world.submit(Renderable::new(mesh, material, Mat4::from_translation(Vec3::new(3.0, 0.0, 1.0))));
        }
    }

    world.add_light(LightType::Directional(DirectionalLight {
        direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
        intensity: 2.0,
        ..Default::default()
    }));
    for colour in [LinearRgba::new(1.0, 0.6, 0.3, 1.0), LinearRgba::new(0.3, 0.6, 1.0, 1.0)] {
        world.add_light(LightType::Point(PointLight {
            color: colour,
            intensity: 8.0,
            range: 6.0,
            ..Default::default()
        }));
    }

    let mut environment = Environment::new(gradient_sky(device)?);
    environment.intensity = 0.6;
    world.environment = Some(environment);

    world.draw_line(Vec3::ZERO, Vec3::X, LinearRgba::new(1.0, 0.0, 0.0, 1.0));
    world.draw_line(Vec3::ZERO, Vec3::Y, LinearRgba::new(0.0, 1.0, 0.0, 1.0));
    world.draw_line(Vec3::ZERO, Vec3::Z, LinearRgba::new(0.0, 0.0, 1.0, 1.0));

    world.draw_quad(Quad::coloured(
        Vec2::new(80.0, 40.0),
        Vec2::new(140.0, 48.0),
        LinearRgba::new(0.05, 0.05, 0.08, 0.7),
    ));
    world.draw_quad(Quad::textured(
        Vec2::new(40.0, 40.0),
        Vec2::splat(32.0),
        ctx.white_texture().clone(),
    ));
    Ok(world)
}

/// Moves the point lights on a circle and marks their positions.
pub fn animate(world: &mut RenderWorld, frame: u32) {
    let time = frame as f32 / 60.0;
    let mut positions = Vec::new();
    for (i, light) in world.lights.lights.iter_mut().enumerate() {
        if let LightType::Point(point) = light {
            let angle = time + i as f32 * std::f32::consts::PI;
            point.position = Vec3::new(angle.cos() * 3.0, 1.5, angle.sin() * 3.0);
            positions.push((point.position, point.color));
        }
    }
    world.points.clear();
    for (position, colour) in positions {
        world.draw_point(position, 0.15, colour);
    }
}
