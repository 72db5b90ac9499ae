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

//! The per-frame phase machine every lane runs through.

use lumos_core::math::Mat4;
use lumos_core::renderer::scene::{Camera, Material, Mesh};
use lumos_core::renderer::RenderError;
use std::fmt;
use std::sync::Arc;

/// Where a lane is in its `begin → begin_scene → set_system_uniforms →
/// present → end` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassPhase {
    /// Between frames.
    #[default]
    Idle,
    /// `begin` ran; the queue is empty.
    Begun,
    /// The scene (camera, lights, renderables) is known.
    SceneReady,
    /// Per-frame uniforms are uploaded.
    UniformsSet,
    /// Commands are recorded.
    Presented,
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassPhase::Idle => "Idle",
            PassPhase::Begun => "Begun",
            PassPhase::SceneReady => "SceneReady",
            PassPhase::UniformsSet => "UniformsSet",
            PassPhase::Presented => "Presented",
        };
        f.write_str(name)
    }
}

/// One mesh draw queued for the current frame.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    /// Geometry.
    pub mesh: Arc<Mesh>,
    /// Surface.
    pub material: Arc<Material>,
    /// Model to world.
    pub transform: Mat4,
    /// Applied to texture coordinates.
    pub texture_matrix: Mat4,
}

impl RenderCommand {
    /// A command with an identity texture matrix.
    pub fn new(mesh: Arc<Mesh>, material: Arc<Material>, transform: Mat4) -> Self {
        Self {
            mesh,
            material,
            transform,
            texture_matrix: Mat4::IDENTITY,
        }
    }
}

/// Phase tracking plus the command queue of one lane.
///
/// Calls out of order fail with [`RenderError::InvalidPassTransition`] and
/// leave the state untouched. [`begin`](Self::begin) is the exception: it is
/// accepted from any phase so a frame abandoned halfway does not wedge the
/// lane, and it always empties the queue.
#[derive(Debug)]
pub struct PassState<C = RenderCommand> {
    name: String,
    phase: PassPhase,
    camera: Option<Camera>,
    queue: Vec<C>,
}

impl<C> PassState<C> {
    /// A fresh state for the lane called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: PassPhase::Idle,
            camera: None,
            queue: Vec::new(),
        }
    }

    /// Lane name used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current phase.
    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    fn transition(&mut self, from: PassPhase, to: PassPhase) -> Result<(), RenderError> {
        if self.phase != from {
            return Err(RenderError::InvalidPassTransition {
                pass: self.name.clone(),
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Starts a frame: empties the queue and forgets the previous camera.
    pub fn begin(&mut self) {
        if self.phase != PassPhase::Idle {
            log::warn!(
                "{}: begin called in phase {}, previous frame discarded",
                self.name,
                self.phase
            );
        }
        self.queue.clear();
        self.camera = None;
        self.phase = PassPhase::Begun;
    }

    /// Records the frame's camera. Without one the lane stays blank for the
    /// frame; the return value tells whether it will draw.
    pub fn begin_scene(&mut self, camera: Option<Camera>) -> Result<bool, RenderError> {
        self.transition(PassPhase::Begun, PassPhase::SceneReady)?;
        if camera.is_none() {
            log::warn!("{}: no camera this frame, nothing will be drawn", self.name);
        }
        self.camera = camera;
        Ok(self.camera.is_some())
    }

    /// Queues a command. Commands sent to a blank frame are dropped.
    pub fn submit(&mut self, command: C) -> Result<(), RenderError> {
        if !matches!(self.phase, PassPhase::SceneReady | PassPhase::UniformsSet) {
            return Err(RenderError::InvalidPassTransition {
                pass: self.name.clone(),
                from: self.phase.to_string(),
                to: "submit".to_string(),
            });
        }
        if self.camera.is_some() {
            self.queue.push(command);
        }
        Ok(())
    }

    /// Marks the per-frame uniforms as written.
    pub fn set_uniforms(&mut self) -> Result<(), RenderError> {
        self.transition(PassPhase::SceneReady, PassPhase::UniformsSet)
    }

    /// Marks the commands as recorded.
    pub fn present(&mut self) -> Result<(), RenderError> {
        self.transition(PassPhase::UniformsSet, PassPhase::Presented)
    }

    /// Closes the frame.
    pub fn end(&mut self) -> Result<(), RenderError> {
        self.transition(PassPhase::Presented, PassPhase::Idle)
    }

    /// Camera of the current frame.
    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Whether the frame has a camera and will draw.
    pub fn is_active(&self) -> bool {
        self.camera.is_some()
    }

    /// Queued commands.
    pub fn queue(&self) -> &[C] {
        &self.queue
    }

    /// Queued commands, for sorting.
    pub fn queue_mut(&mut self) -> &mut Vec<C> {
        &mut self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(state: &mut PassState<u32>) {
        state.begin();
        assert!(state.begin_scene(Some(Camera::default())).unwrap());
    }

    #[test]
    fn full_sequence_returns_to_idle() {
        let mut state = PassState::<u32>::new("Test");
        ready(&mut state);
        state.submit(1).unwrap();
        state.set_uniforms().unwrap();
        state.submit(2).unwrap();
        state.present().unwrap();
        state.end().unwrap();
        assert_eq!(state.phase(), PassPhase::Idle);
        assert_eq!(state.queue(), &[1, 2]);
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut state = PassState::<u32>::new("Test");
        assert!(matches!(
            state.present(),
            Err(RenderError::InvalidPassTransition { .. })
        ));
        assert!(state.submit(1).is_err());
        state.begin();
        let err = state.set_uniforms().unwrap_err();
        match err {
            RenderError::InvalidPassTransition { pass, from, to } => {
                assert_eq!(pass, "Test");
                assert_eq!(from, "Begun");
                assert_eq!(to, "UniformsSet");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(state.phase(), PassPhase::Begun);
    }

    #[test]
    fn begin_empties_the_queue() {
        let mut state = PassState::<u32>::new("Test");
        ready(&mut state);
        state.submit(7).unwrap();
        state.submit(8).unwrap();
        assert_eq!(state.queue().len(), 2);

        // Abandoned mid-frame: begin still recovers.
        state.begin();
        assert!(state.queue().is_empty());
        assert!(state.camera().is_none());
        assert_eq!(state.phase(), PassPhase::Begun);
    }

    #[test]
    fn missing_camera_leaves_the_frame_blank() {
        let mut state = PassState::<u32>::new("Test");
        state.begin();
        assert!(!state.begin_scene(None).unwrap());
        state.submit(3).unwrap();
        assert!(state.queue().is_empty());
        assert!(!state.is_active());
        state.set_uniforms().unwrap();
        state.present().unwrap();
        state.end().unwrap();
    }
}
