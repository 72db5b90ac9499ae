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

// Lumos Sandbox
// Drives the lane graph over a small scene for a fixed number of frames.

mod scene;

use anyhow::{Context, Result};
use clap::Parser;
use lumos_core::math::Vec3;
use lumos_core::renderer::scene::Camera;
use lumos_core::renderer::GraphicsBackendType;
use lumos_core::{RenderContext, RendererConfig};
use lumos_infra::{create_device, HeadlessDevice};
use lumos_lanes::render_lane::{
    Batch2dLane, DeferredLightingLane, DeferredOffscreenLane, ForwardFilter, ForwardLane,
    LineLane, PointLane, ShadowLane, SkyboxLane,
};
use lumos_lanes::FrameGraph;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sandbox", about = "Renders the Lumos demo scene")]
struct Args {
    /// RON renderer configuration; defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// OBJ or glTF model added to the scene.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Number of frames to render.
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Force the in-memory backend.
    #[arg(long)]
    headless: bool,

    /// Deferred debug view (1 albedo, 2 normals, 3 cascades, 4 shadows, 5 pbr).
    #[arg(long)]
    debug_mode: Option<u32>,

    /// Draw the scene with the forward lane only.
    #[arg(long)]
    forward: bool,
}

fn load_config(args: &Args) -> Result<RendererConfig> {
    let mut config = match &args.config {
        Some(path) => RendererConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RendererConfig::default(),
    };
    if args.headless {
        config.backend = GraphicsBackendType::Headless;
    }
    config.validate()?;
    Ok(config)
}

fn build_graph(args: &Args) -> FrameGraph {
    if args.forward {
        return FrameGraph::new()
            .with_lane(ShadowLane::new())
            .with_lane(ForwardLane::new().with_filter(ForwardFilter::OpaqueOnly))
            .with_lane(SkyboxLane::new())
            .with_lane(
                ForwardLane::new()
                    .with_clear(false)
                    .with_filter(ForwardFilter::TransparentOnly),
            )
            .with_lane(Batch2dLane::new())
            .with_lane(LineLane::new())
            .with_lane(PointLane::new());
    }
    let mut lighting = DeferredLightingLane::new();
    if let Some(mode) = args.debug_mode {
        lighting.set_debug_mode(mode);
    }
    FrameGraph::new()
        .with_lane(ShadowLane::new())
        .with_lane(DeferredOffscreenLane::new())
        .with_lane(lighting)
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

fn orbit_camera(frame: u32, aspect: f32) -> Camera {
    let angle = frame as f32 * 0.02;
    let eye = Vec3::new(angle.cos() * 8.0, 4.0, angle.sin() * 8.0);
    Camera::perspective(eye, Vec3::ZERO, 45f32.to_radians(), aspect, 0.1, 100.0)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("naga", log::LevelFilter::Warn)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let aspect = config.width as f32 / config.height.max(1) as f32;

    let device = create_device(&config)?;
    let info = device.adapter_info();
    log::info!(
        "Sandbox: rendering on '{}' ({:?}, {:?})",
        info.name,
        info.backend_type,
        info.device_type
    );

    let context = RenderContext::new(device.clone(), config)?;
    let mut world = scene::build(&context, args.model.as_deref())?;
    let mut graph = build_graph(&args);
    log::info!("Sandbox: lanes {:?}", graph.lane_names());

    for frame in 0..args.frames {
        world.camera = Some(orbit_camera(frame, aspect));
        scene::animate(&mut world, frame);
        graph.render_frame(&context, &world)?;
    }
    context.wait_idle()?;

    if let Some(headless) = device.as_any().downcast_ref::<HeadlessDevice>() {
        if let Some(last) = headless.last_submission() {
            log::info!(
                "Sandbox: last frame recorded {} draw(s) in passes {:?}",
                last.draw_count(),
                last.pass_labels()
            );
        }
    }
    log::info!("Sandbox: rendered {} frame(s)", graph.frame_count());
    Ok(())
}
