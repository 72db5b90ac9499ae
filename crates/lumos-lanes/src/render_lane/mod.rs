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

//! Render lanes and the frame graph that runs them.
//!
//! A lane is one pass of the frame (shadows, G-buffer, lighting, forward,
//! sky, batched primitives). Every lane walks the same per-frame protocol,
//! tracked by a [`PassState`]:
//!
//! ```text
//! begin -> begin_scene -> set_system_uniforms -> present -> end
//! ```
//!
//! Lanes publish what later lanes consume (shadow maps, G-buffer, scene
//! depth) through [`LaneResources`], so a lane never holds a reference to
//! another one.

use lumos_core::renderer::{CommandEncoder, RenderError};
use lumos_core::RenderContext;
use std::any::Any;

mod batch;
mod batch2d_lane;
mod cascades;
mod deferred_lighting_lane;
mod deferred_offscreen_lane;
mod draw;
mod forward_lane;
mod frame_graph;
mod line_lane;
mod pass_state;
mod point_lane;
mod resources;
mod shadow_lane;
mod skybox_lane;
mod world;

pub mod shaders;
pub mod uniforms;

pub use batch::{quad_indices, BatchVertex, LineVertex};
pub use batch2d_lane::*;
pub use cascades::*;
pub use deferred_lighting_lane::*;
pub use deferred_offscreen_lane::*;
pub use forward_lane::*;
pub use frame_graph::*;
pub use line_lane::*;
pub use pass_state::*;
pub use point_lane::*;
pub use resources::*;
pub use shadow_lane::*;
pub use skybox_lane::*;
pub use world::*;

/// A trait defining the behavior of a rendering lane.
///
/// Lanes are driven by a [`FrameGraph`], once per frame and in the order
/// they were added. Each method maps to one step of the pass protocol; the
/// lane's [`PassState`] rejects steps taken out of order with
/// [`RenderError::InvalidPassTransition`].
///
/// The lane uses abstractions from `lumos-core` (`CommandEncoder`,
/// `Pipeline`, `DescriptorSet`) and does not depend on a backend.
pub trait RenderLane: Send {
    /// Returns a human-readable identifier for this lane.
    ///
    /// Used for logging and as the debug label of the lane's passes.
    fn name(&self) -> &'static str;

    /// Creates the lane's shaders, pipelines and targets.
    ///
    /// Called before the first frame and again after every resize, when
    /// size-dependent targets must be rebuilt. Shared outputs are inserted
    /// into `resources` here.
    ///
    /// # Errors
    ///
    /// Fails if a shader does not compile or a resource cannot be created.
    fn initialise(
        &mut self,
        ctx: &RenderContext,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError>;

    /// Starts a frame: empties the queue and resets per-frame buffers.
    fn begin(&mut self, ctx: &RenderContext) -> Result<(), RenderError>;

    /// Captures the camera and queues what the lane draws this frame.
    ///
    /// # Arguments
    ///
    /// * `world`: The scene submitted for this frame.
    /// * `resources`: Shared outputs; a lane may refresh the ones it owns.
    fn begin_scene(
        &mut self,
        ctx: &RenderContext,
        world: &RenderWorld,
        resources: &mut LaneResources,
    ) -> Result<(), RenderError>;

    /// Uploads camera, light and other per-frame uniforms.
    fn set_system_uniforms(
        &mut self,
        ctx: &RenderContext,
        resources: &LaneResources,
    ) -> Result<(), RenderError>;

    /// Records the lane's passes into `encoder`.
    fn present(
        &mut self,
        ctx: &RenderContext,
        resources: &LaneResources,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError>;

    /// Closes the frame and returns the lane to idle.
    fn end(&mut self) -> Result<(), RenderError>;

    /// Current step of the pass protocol.
    fn phase(&self) -> PassPhase;

    /// Allows downcasting to the concrete lane type.
    fn as_any(&self) -> &dyn Any;

    /// Allows mutable downcasting to the concrete lane type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
