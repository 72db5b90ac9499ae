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

//! Lanes driven frame by frame on the headless backend.

use lumos_core::math::{LinearRgba, Mat4, Vec2, Vec3};
use lumos_core::renderer::resources::Texture2D;
use lumos_core::renderer::scene::{Camera, Material, MaterialFlags, MaterialProperties, Mesh, MeshData};
use lumos_core::renderer::shader::{Shader, ShaderOptions};
use lumos_core::renderer::{
    DirectionalLight, GraphicsBackendType, GraphicsDevice, LightType, PointLight,
};
use lumos_core::{RenderContext, RendererConfig};
use lumos_infra::{create_device, HeadlessDevice, RecordedSubmission};
use lumos_lanes::render_lane::shaders::{self, *};
use lumos_lanes::render_lane::uniforms::lighting_uniforms_layout;
use lumos_lanes::render_lane::{
    Batch2dLane, DeferredLightingLane, DeferredOffscreenLane, ForwardFilter, ForwardLane, GBuffer,
    LineLane, PointLane, Quad, Renderable, ShadowLane, SkyboxLane,
};
use lumos_lanes::{FrameGraph, RenderWorld};
use std::sync::Arc;

fn context_with(edit: impl FnOnce(&mut RendererConfig)) -> (Arc<dyn GraphicsDevice>, RenderContext) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = RendererConfig {
        backend: GraphicsBackendType::Headless,
        width: 16,
        height: 16,
        ..Default::default()
    };
    config.shadows.map_size = 64;
    edit(&mut config);
    let device = create_device(&config).unwrap();
    let context = RenderContext::with_lut_size(device.clone(), config, 8).unwrap();
    (device, context)
}

fn context() -> (Arc<dyn GraphicsDevice>, RenderContext) {
    context_with(|_| {})
}

fn last_submission(device: &Arc<dyn GraphicsDevice>) -> RecordedSubmission {
    device
        .as_any()
        .downcast_ref::<HeadlessDevice>()
        .unwrap()
        .last_submission()
        .unwrap()
}

fn labels(submission: &RecordedSubmission) -> Vec<String> {
    submission
        .pass_labels()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect()
}

fn camera() -> Camera {
    Camera::perspective(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, 1.0, 1.0, 0.1, 50.0)
}

fn cube(device: &Arc<dyn GraphicsDevice>) -> Arc<Mesh> {
    Arc::new(Mesh::new(device, "cube", &MeshData::cube()).unwrap())
}

fn lit_world(device: &Arc<dyn GraphicsDevice>) -> RenderWorld {
    let mut world = RenderWorld::new();
    world.camera = Some(camera());
    let material = Arc::new(Material::new("grey", MaterialProperties::default()));
    world.submit(Renderable::new(cube(device), material, Mat4::IDENTITY));
    world.add_light(LightType::Directional(DirectionalLight::default()));
    world
}

fn deferred_graph() -> FrameGraph {
    FrameGraph::new()
        .with_lane(ShadowLane::new())
        .with_lane(DeferredOffscreenLane::new())
        .with_lane(DeferredLightingLane::new())
        .with_lane(SkyboxLane::new())
        .with_lane(
            ForwardLane::new()
                .with_clear(false)
                .with_filter(ForwardFilter::TransparentOnly),
        )
        .with_lane(Batch2dLane::new())
        .with_lane(LineLane::new())
        .with_lane(PointLane::new())
}

#[test]
fn lane_shaders_compile() {
    let (device, _context) = context();
    let includes = shaders::includes();
    for (name, source) in [
        ("shadow", SHADOW_WGSL),
        ("forward", FORWARD_WGSL),
        ("gbuffer", GBUFFER_WGSL),
        ("deferred_lighting", DEFERRED_LIGHTING_WGSL),
        ("skybox", SKYBOX_WGSL),
        ("batch2d", BATCH2D_WGSL),
        ("line", LINE_WGSL),
        ("point", POINT_WGSL),
    ] {
        let shader = Shader::from_source(&device, name, source, &includes, &ShaderOptions::default());
        assert!(shader.is_ok(), "{name}: {:?}", shader.err());
    }
    let pcf = ShaderOptions::default().define("SHADOW_PCF", "");
    let shader =
        Shader::from_source(&device, "pcf", DEFERRED_LIGHTING_WGSL, &includes, &pcf).unwrap();
    shader
        .validate_uniform_layout("lighting", &lighting_uniforms_layout())
        .unwrap();
}

#[test]
fn deferred_frame_records_passes_in_lane_order() {
    let (device, context) = context();
    let mut graph = deferred_graph();
    let mut world = lit_world(&device);
    world.draw_quad(Quad::coloured(Vec2::new(8.0, 8.0), Vec2::splat(4.0), LinearRgba::WHITE));
    world.draw_line(Vec3::ZERO, Vec3::X, LinearRgba::WHITE);
    world.draw_point(Vec3::Y, 0.2, LinearRgba::WHITE);

    graph.render_frame(&context, &world).unwrap();

    let submission = last_submission(&device);
    let labels = labels(&submission);
    let cascades = context.config().shadows.cascade_count as usize;
    assert_eq!(labels.iter().filter(|l| *l == "ShadowLane").count(), cascades);
    let order: Vec<&str> = labels
        .iter()
        .map(String::as_str)
        .filter(|l| *l != "ShadowLane")
        .collect();
    assert_eq!(
        order,
        vec![
            "DeferredOffscreenLane",
            "DeferredLightingLane",
            "Batch2dLane",
            "LineLane",
            "PointLane"
        ]
    );
    let shadows = graph.lane::<ShadowLane>().unwrap();
    let shadow_draws: usize = (0..cascades).map(|c| shadows.submissions(c)).sum();
    assert!(shadow_draws > 0);
    // G-buffer cube, lighting triangle, then one quad, line and point batch.
    assert_eq!(submission.draw_count(), shadow_draws + 2 + 3);
    assert!(graph.resources().contains::<GBuffer>());
    assert_eq!(graph.frame_count(), 1);
}

#[test]
fn casters_outside_every_cascade_are_not_submitted() {
    let (device, context) = context();
    let mut graph = FrameGraph::new().with_lane(ShadowLane::new());
    let mut world = lit_world(&device);
    world.renderables[0].transform = Mat4::from_translation(Vec3::new(5000.0, 0.0, 0.0));

    graph.render_frame(&context, &world).unwrap();
    let shadows = graph.lane::<ShadowLane>().unwrap();
    assert!(shadows.shadow_data().should_render);
    for cascade in 0..shadows.shadow_data().cascade_count {
        assert_eq!(shadows.submissions(cascade), 0);
    }

    world.renderables[0].transform = Mat4::IDENTITY;
    graph.render_frame(&context, &world).unwrap();
    let shadows = graph.lane::<ShadowLane>().unwrap();
    assert!(shadows.submissions(0) > 0);
}

#[test]
fn shadows_need_a_directional_light() {
    let (device, context) = context();
    let mut graph = deferred_graph();
    let mut world = lit_world(&device);
    world.lights.lights.clear();
    world.add_light(LightType::Point(PointLight::default()));

    graph.render_frame(&context, &world).unwrap();
    assert!(!graph.lane::<ShadowLane>().unwrap().shadow_data().should_render);
    assert!(!labels(&last_submission(&device)).iter().any(|l| l == "ShadowLane"));
}

#[test]
fn frames_without_a_camera_draw_nothing() {
    let (device, context) = context();
    let mut graph = deferred_graph();
    let mut world = lit_world(&device);
    world.camera = None;

    graph.render_frame(&context, &world).unwrap();
    assert_eq!(last_submission(&device).draw_count(), 0);
}

#[test]
fn transparent_filter_only_queues_transparent_materials() {
    let (device, context) = context();
    let mut graph = FrameGraph::new()
        .with_lane(ForwardLane::new().with_filter(ForwardFilter::TransparentOnly));
    let mut world = lit_world(&device);
    let glass = Arc::new(
        Material::new("glass", MaterialProperties::default())
            .with_flags(MaterialFlags::DEPTH_TEST | MaterialFlags::TRANSPARENT),
    );
    world.submit(Renderable::new(
        cube(&device),
        glass,
        Mat4::from_translation(Vec3::X),
    ));

    graph.render_frame(&context, &world).unwrap();
    assert_eq!(graph.lane::<ForwardLane>().unwrap().queued(), 1);
    assert_eq!(last_submission(&device).draw_count(), 1);
}

#[test]
fn forward_lane_draws_the_scene_alone() {
    let (device, context) = context();
    let mut graph = FrameGraph::new().with_lane(ForwardLane::new());
    let world = lit_world(&device);

    graph.render_frame(&context, &world).unwrap();
    graph.render_frame(&context, &world).unwrap();
    let submission = last_submission(&device);
    assert_eq!(labels(&submission), vec!["ForwardLane".to_string()]);
    assert_eq!(submission.draw_count(), 1);
    assert_eq!(graph.frame_count(), 2);
}

#[test]
fn sprites_break_batches_on_texture_changes() {
    let (device, context) = context();
    let mut graph = FrameGraph::new().with_lane(Batch2dLane::new());
    let a = Arc::new(Texture2D::white(&device).unwrap());
    let b = Arc::new(Texture2D::white(&device).unwrap());
    let mut world = RenderWorld::new();
    for texture in [&a, &a, &b, &a] {
        world.draw_quad(Quad::textured(Vec2::splat(4.0), Vec2::splat(2.0), texture.clone()));
    }

    graph.render_frame(&context, &world).unwrap();
    let lane = graph.lane::<Batch2dLane>().unwrap();
    assert_eq!(lane.batch_count(), 3);
    assert_eq!(lane.cached_textures(), 2);
    assert_eq!(last_submission(&device).draw_count(), 3);
}

#[test]
fn full_line_batches_start_a_new_draw() {
    let (device, context) = context_with(|config| config.batches.max_lines = 2);
    let mut graph = FrameGraph::new().with_lane(LineLane::new());
    let mut world = RenderWorld::new();
    world.camera = Some(camera());
    for i in 0..5 {
        world.draw_line(Vec3::ZERO, Vec3::new(i as f32, 1.0, 0.0), LinearRgba::WHITE);
    }

    graph.render_frame(&context, &world).unwrap();
    assert_eq!(graph.lane::<LineLane>().unwrap().batch_count(), 3);
    assert_eq!(last_submission(&device).draw_count(), 3);
}

#[test]
fn resize_rebuilds_the_gbuffer() {
    let (device, context) = context();
    let mut graph = deferred_graph();
    let world = lit_world(&device);
    graph.render_frame(&context, &world).unwrap();

    graph.resize(&context, 0, 0).unwrap();
    assert_eq!(graph.resources().get::<GBuffer>().unwrap().albedo.width(), 16);

    graph.resize(&context, 32, 24).unwrap();
    let gbuffer = graph.resources().get::<GBuffer>().unwrap();
    assert_eq!((gbuffer.albedo.width(), gbuffer.albedo.height()), (32, 24));
    graph.render_frame(&context, &world).unwrap();
    assert_eq!(graph.frame_count(), 2);
}
