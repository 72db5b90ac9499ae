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

//! The render context: the device plus everything shared across lanes.

use crate::config::RendererConfig;
use crate::renderer::api::command::SubmissionIndex;
use crate::renderer::api::util::frame_sync::{FenceState, FramesInFlight};
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::resources::{CommandBuffer, Pipeline, PipelineCache, PipelineDesc, Texture2D};
use crate::renderer::scene::brdf::{brdf_lut_texture, DEFAULT_LUT_SIZE, DEFAULT_SAMPLE_COUNT};
use crate::renderer::traits::GraphicsDevice;
use std::sync::{Arc, Mutex, MutexGuard};

/// Fallback resources bound when the real one is missing.
#[derive(Debug, Clone)]
pub struct DefaultResources {
    /// 1x1 opaque white texture.
    pub white: Arc<Texture2D>,
    /// CPU generated split-sum BRDF LUT.
    pub brdf_lut: Arc<Texture2D>,
}

impl DefaultResources {
    fn create(device: &Arc<dyn GraphicsDevice>, lut_size: u32) -> Result<Self, ResourceError> {
        Ok(Self {
            white: Arc::new(Texture2D::white(device)?),
            brdf_lut: Arc::new(brdf_lut_texture(device, lut_size, DEFAULT_SAMPLE_COUNT)?),
        })
    }
}

/// Everything a lane needs besides its own resources.
///
/// A context cannot exist without a device, so no resource can be created
/// before a backend is initialised.
#[derive(Debug)]
pub struct RenderContext {
    device: Arc<dyn GraphicsDevice>,
    frames: Mutex<FramesInFlight>,
    pipeline_cache: PipelineCache,
    defaults: DefaultResources,
    config: RendererConfig,
}

impl RenderContext {
    /// Builds a context around an initialised device.
    ///
    /// # Errors
    ///
    /// Fails if `config.frames_in_flight` is out of range or the default
    /// resources cannot be created.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: RendererConfig) -> Result<Self, RenderError> {
        Self::with_lut_size(device, config, DEFAULT_LUT_SIZE)
    }

    /// Like [`new`](Self::new) with an explicit BRDF LUT resolution.
    pub fn with_lut_size(
        device: Arc<dyn GraphicsDevice>,
        config: RendererConfig,
        lut_size: u32,
    ) -> Result<Self, RenderError> {
        let frames = FramesInFlight::new(config.frames_in_flight)?;
        let defaults = DefaultResources::create(&device, lut_size)?;
        let info = device.adapter_info();
        log::info!(
            "RenderContext: '{}' on {:?}, {} frame(s) in flight",
            info.name,
            info.backend_type,
            frames.len()
        );
        Ok(Self {
            device,
            frames: Mutex::new(frames),
            pipeline_cache: PipelineCache::new(),
            defaults,
            config,
        })
    }

    /// The device every resource is created through.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Active configuration.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Fallback textures.
    pub fn defaults(&self) -> &DefaultResources {
        &self.defaults
    }

    /// Shared 1x1 white texture.
    pub fn white_texture(&self) -> &Arc<Texture2D> {
        &self.defaults.white
    }

    /// The pipeline cache shared by all lanes.
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    /// Returns the cached pipeline for `desc`, building it on first use.
    pub fn pipeline(&self, desc: PipelineDesc) -> Result<Arc<Pipeline>, ResourceError> {
        self.pipeline_cache.get(&self.device, desc)
    }

    /// Waits for the current frame slot to be reusable and starts recording
    /// into it. Returns the slot index for per-frame resources.
    pub fn begin_frame(&self) -> Result<usize, RenderError> {
        self.lock_frames().begin_frame(self.device.as_ref())
    }

    /// Index of the slot being recorded (or recorded next).
    pub fn frame_slot(&self) -> usize {
        self.lock_frames().current_slot()
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.lock_frames().len()
    }

    /// Submits the frame's commands and advances the frame ring.
    ///
    /// ## Errors
    /// * `RenderError::InvalidFrameState` - If no frame is being recorded.
    /// * `RenderError::ResourceError` - If the backend rejects the submission.
    pub fn submit_frame(&self, commands: CommandBuffer) -> Result<SubmissionIndex, RenderError> {
        let mut frames = self.lock_frames();
        let slot = frames.current_slot();
        if frames.state(slot) != Some(FenceState::Recording) {
            return Err(RenderError::InvalidFrameState(format!(
                "frame slot {slot} submitted without begin_frame"
            )));
        }
        let index = commands.submit()?;
        frames.submit(index)?;
        Ok(index)
    }

    /// Drops the frame being recorded without submitting it.
    pub fn abandon_frame(&self) -> Result<(), RenderError> {
        self.lock_frames().abandon()
    }

    /// Blocks until the GPU finished every submitted frame.
    pub fn wait_idle(&self) -> Result<(), RenderError> {
        self.lock_frames().wait_idle(self.device.as_ref())
    }

    fn lock_frames(&self) -> MutexGuard<'_, FramesInFlight> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::warn!("RenderContext: failed to drain the GPU on shutdown: {}", e);
        }
        self.pipeline_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockDevice;

    fn context() -> (Arc<MockDevice>, RenderContext) {
        let (mock, device) = MockDevice::shared();
        let context = RenderContext::with_lut_size(device, RendererConfig::default(), 4).unwrap();
        (mock, context)
    }

    #[test]
    fn frames_cycle_through_the_ring() {
        let (_mock, context) = context();
        assert_eq!(context.frames_in_flight(), 2);

        let slot = context.begin_frame().unwrap();
        assert_eq!(slot, 0);
        let commands = CommandBuffer::begin(context.device(), "frame");
        context.submit_frame(commands).unwrap();
        assert_eq!(context.frame_slot(), 1);

        // Submitting twice without begin is a state error.
        let commands = CommandBuffer::begin(context.device(), "frame");
        assert!(matches!(
            context.submit_frame(commands),
            Err(RenderError::InvalidFrameState(_))
        ));

        context.wait_idle().unwrap();
        assert_eq!(context.lock_frames().state(0), Some(FenceState::Reusable));
    }

    #[test]
    fn invalid_frame_count_is_rejected() {
        let (_mock, device) = MockDevice::shared();
        let config = RendererConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(RenderContext::with_lut_size(device, config, 4).is_err());
    }

    #[test]
    fn defaults_are_created_once() {
        let (mock, context) = context();
        assert_eq!(context.white_texture().width(), 1);
        assert_eq!(context.defaults().brdf_lut.width(), 4);
        let live = mock.live_objects();
        drop(context);
        assert!(mock.live_objects() < live);
    }
}
