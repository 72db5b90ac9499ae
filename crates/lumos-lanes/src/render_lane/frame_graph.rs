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

//! Runs a list of lanes over one frame.

use super::{LaneResources, RenderLane, RenderWorld, SwapchainImage};
use lumos_core::renderer::resources::CommandBuffer;
use lumos_core::renderer::{CommandEncoder, RenderError, SubmissionIndex};
use lumos_core::RenderContext;

/// An ordered list of lanes sharing one [`LaneResources`] map.
///
/// Lanes run in insertion order, each through its whole pass protocol
/// before the next one starts, and all of them record into a single
/// command buffer per frame.
#[derive(Default)]
pub struct FrameGraph {
    lanes: Vec<Box<dyn RenderLane>>,
    resources: LaneResources,
    initialised: bool,
    frame_count: u64,
}

impl FrameGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a lane, builder style.
    pub fn with_lane(mut self, lane: impl RenderLane + 'static) -> Self {
        self.add_lane(Box::new(lane));
        self
    }

    /// Appends a lane. It is initialised before the next frame.
    pub fn add_lane(&mut self, lane: Box<dyn RenderLane>) {
        log::debug!("FrameGraph: added lane '{}'", lane.name());
        self.lanes.push(lane);
        self.initialised = false;
    }

    /// Names of the lanes in execution order.
    pub fn lane_names(&self) -> Vec<&'static str> {
        self.lanes.iter().map(|l| l.name()).collect()
    }

    /// The first lane of type `T`.
    pub fn lane<T: RenderLane + 'static>(&self) -> Option<&T> {
        self.lanes.iter().find_map(|l| l.as_any().downcast_ref::<T>())
    }

    /// Mutable access to the first lane of type `T`.
    pub fn lane_mut<T: RenderLane + 'static>(&mut self) -> Option<&mut T> {
        self.lanes
            .iter_mut()
            .find_map(|l| l.as_any_mut().downcast_mut::<T>())
    }

    /// Outputs the lanes shared during the last frame.
    pub fn resources(&self) -> &LaneResources {
        &self.resources
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Initialises every lane in order.
    ///
    /// # Errors
    ///
    /// Stops at the first lane that fails.
    pub fn initialise(&mut self, ctx: &RenderContext) -> Result<(), RenderError> {
        for lane in &mut self.lanes {
            lane.initialise(ctx, &mut self.resources).map_err(|e| {
                log::error!("FrameGraph: lane '{}' failed to initialise: {e}", lane.name());
                e
            })?;
        }
        self.initialised = true;
        log::info!("FrameGraph: {} lane(s) initialised", self.lanes.len());
        Ok(())
    }

    /// Renders `world` and submits the frame.
    ///
    /// Waits for the frame slot, acquires a swapchain image, runs every
    /// lane and submits one command buffer. When a lane fails the frame is
    /// abandoned and the error returned; the next frame starts clean.
    pub fn render_frame(
        &mut self,
        ctx: &RenderContext,
        world: &RenderWorld,
    ) -> Result<SubmissionIndex, RenderError> {
        if !self.initialised {
            self.initialise(ctx)?;
        }

        let slot = ctx.begin_frame()?;
        let image = match ctx.device().acquire_next_swapchain_image() {
            Ok(image) => image,
            Err(e) => {
                ctx.abandon_frame()?;
                return Err(e.into());
            }
        };
        self.resources.insert(SwapchainImage(image));
        log::trace!(
            "FrameGraph: frame {} in slot {slot}, swapchain image {image}",
            self.frame_count
        );

        let mut commands = CommandBuffer::begin(ctx.device(), "frame");
        if let Err(e) = self.record(ctx, world, commands.encoder()) {
            log::error!("FrameGraph: frame {} abandoned: {e}", self.frame_count);
            ctx.abandon_frame()?;
            return Err(e);
        }
        let index = ctx.submit_frame(commands)?;
        self.frame_count += 1;
        Ok(index)
    }

    fn record(
        &mut self,
        ctx: &RenderContext,
        world: &RenderWorld,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError> {
        let Self {
            lanes, resources, ..
        } = self;
        for lane in lanes.iter_mut() {
            lane.begin(ctx)?;
            lane.begin_scene(ctx, world, resources)?;
            lane.set_system_uniforms(ctx, resources)?;
            lane.present(ctx, resources, encoder)?;
            lane.end()?;
        }
        Ok(())
    }

    /// Rebuilds the swapchain and every size-dependent resource.
    ///
    /// A zero-sized window (minimised) is ignored.
    pub fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            log::debug!("FrameGraph: ignoring resize to {width}x{height}");
            return Ok(());
        }
        ctx.wait_idle()?;
        ctx.device().resize_swapchain(width, height)?;
        // Swapchain framebuffers are baked into cached pipelines.
        self.resources.clear();
        ctx.pipeline_cache().clear();
        self.initialised = false;
        self.initialise(ctx)?;
        log::info!("FrameGraph: resized to {width}x{height}");
        Ok(())
    }
}

impl std::fmt::Debug for FrameGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraph")
            .field("lanes", &self.lane_names())
            .field("initialised", &self.initialised)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}
