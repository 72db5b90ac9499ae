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

//! Core resources driven through the headless backend.

use lumos_core::math::LinearRgba;
use lumos_core::renderer::resources::{
    CommandBuffer, Descriptor, DescriptorSet, PipelineDesc, Texture2D, TextureParameters,
    UniformBuffer,
};
use lumos_core::renderer::shader::{EmbeddedIncludes, FlatBinding, FlatBindingKind, Shader, ShaderOptions};
use lumos_core::renderer::{
    GraphicsBackendType, GraphicsDevice, RhiFormat, TextureUsage,
};
use lumos_core::{RenderContext, RendererConfig};
use lumos_infra::{create_device, HeadlessCommand, HeadlessDevice};
use std::sync::Arc;

const TEXTURED: &str = r#"
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

fn context() -> (Arc<dyn GraphicsDevice>, RenderContext) {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = RendererConfig {
        backend: GraphicsBackendType::Headless,
        width: 16,
        height: 16,
        ..Default::default()
    };
    let device = create_device(&config).unwrap();
    let context = RenderContext::with_lut_size(device.clone(), config, 8).unwrap();
    (device, context)
}

fn headless(device: &Arc<dyn GraphicsDevice>) -> &HeadlessDevice {
    device.as_any().downcast_ref::<HeadlessDevice>().unwrap()
}

#[test]
fn textured_draw_clears_and_binds_flat_slots() {
    let (device, context) = context();
    let shader = Shader::from_source(
        &device,
        "textured",
        TEXTURED,
        &EmbeddedIncludes::new(),
        &ShaderOptions::default(),
    )
    .unwrap();

    let target = Arc::new(
        Texture2D::create(
            &device,
            "target",
            8,
            8,
            TextureParameters::render_target(RhiFormat::R8G8B8A8Unorm),
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
        .unwrap(),
    );
    let mut desc = PipelineDesc::new(shader.clone(), "textured");
    desc.colour_targets.push(target.clone());
    desc.depth_test = false;
    desc.depth_write = false;
    desc.clear_colour = LinearRgba::new(0.0, 1.0, 0.0, 1.0);
    let pipeline = context.pipeline(desc).unwrap();

    let object = UniformBuffer::new(&device, "object", 64).unwrap();
    let mut object_set = DescriptorSet::new(&shader, 0).unwrap();
    object_set
        .update(vec![Descriptor::uniform(0, "object", &object)])
        .unwrap();
    let mut material_set = DescriptorSet::new(&shader, 1).unwrap();
    material_set
        .update(vec![Descriptor::texture(0, "albedo", context.white_texture())])
        .unwrap();

    context.begin_frame().unwrap();
    let mut commands = CommandBuffer::begin(&device, "frame");
    {
        let mut pass = pipeline.begin(commands.encoder(), 0).unwrap();
        object_set.bind(pass.as_mut(), 0, None).unwrap();
        material_set.bind(pass.as_mut(), 1, None).unwrap();
        pass.draw(0..3, 0..1);
    }
    context.submit_frame(commands).unwrap();

    let pixels = device.read_texture(target.id(), 0).unwrap();
    assert_eq!(pixels.len(), 8 * 8 * 4);
    assert!(pixels.chunks(4).all(|p| p == [0, 255, 0, 255]));

    let submission = headless(&device).last_submission().unwrap();
    assert_eq!(submission.label.as_deref(), Some("frame"));
    assert_eq!(submission.draw_count(), 1);
    let slots: Vec<FlatBinding> = submission
        .commands
        .iter()
        .filter_map(|c| match c {
            HeadlessCommand::BindFlat { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(
        slots,
        vec![
            FlatBinding {
                kind: FlatBindingKind::UniformBlock,
                slot: 0
            },
            FlatBinding {
                kind: FlatBindingKind::TextureUnit,
                slot: 16
            },
            FlatBinding {
                kind: FlatBindingKind::Sampler,
                slot: 17
            },
        ]
    );
}

#[test]
fn texture_uploads_read_back_unchanged() {
    let (device, _context) = context();
    let pixels: Vec<u8> = (0..4 * 2 * 4).map(|i| i as u8).collect();
    let texture = Texture2D::from_source(
        &device,
        "ramp",
        4,
        2,
        &pixels,
        TextureParameters::default(),
    )
    .unwrap();
    assert_eq!(device.read_texture(texture.id(), 0).unwrap(), pixels);

    let flipped: Vec<u8> = pixels.iter().rev().copied().collect();
    texture.set_data(&flipped).unwrap();
    assert_eq!(device.read_texture(texture.id(), 0).unwrap(), flipped);
}

#[test]
fn dropped_resources_are_released() {
    let (device, context) = context();
    let before = headless(&device).live_resource_count();
    {
        let texture = Texture2D::white(&device).unwrap();
        let buffer = UniformBuffer::new(&device, "scratch", 256).unwrap();
        assert!(headless(&device).buffer_contents(buffer.id()).is_some());
        assert!(headless(&device).view_texture(texture.view()).is_some());
        assert!(headless(&device).live_resource_count() > before);
    }
    assert_eq!(headless(&device).live_resource_count(), before);
    drop(context);
}
