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

//! Renderer configuration, stored on disk as RON.
//!
//! ```ron
//! (
//!     backend: Vulkan,
//!     width: 1280,
//!     height: 720,
//!     shadows: (cascade_count: 4, split_lambda: 0.91),
//! )
//! ```
//!
//! Every field has a default, so a file only lists what it changes.

use crate::math::LinearRgba;
use crate::renderer::api::backend::{GraphicsBackendType, PowerPreference};
use crate::renderer::api::util::frame_sync::MAX_FRAMES_IN_FLIGHT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on shadow cascades.
pub const MAX_CASCADES: u32 = 16;

/// Upper bound on lights packed by the deferred lighting pass.
pub const MAX_DEFERRED_LIGHTS: u32 = 32;

/// Errors raised while loading or validating a [`RendererConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("failed to access config file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The text is not valid RON for a [`RendererConfig`].
    #[error("failed to parse renderer config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// The config could not be serialized.
    #[error("failed to serialize renderer config: {0}")]
    Serialize(#[from] ron::Error),
    /// A value is outside its accepted range.
    #[error("invalid renderer config: {0}")]
    Invalid(String),
}

/// Cascaded shadow map settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Whether the shadow lane runs.
    pub enabled: bool,
    /// Number of cascades, `1..=16`.
    pub cascade_count: u32,
    /// Blend between logarithmic (1.0) and uniform (0.0) splits.
    pub split_lambda: f32,
    /// Edge length of each cascade's depth layer.
    pub map_size: u32,
    /// Radius of the smallest region a cascade covers.
    pub scene_radius: f32,
    /// Multiplier on `scene_radius`; the product is the lower bound of every
    /// cascade's bounding sphere.
    pub radius_multiplier: f32,
    /// Distance added in front of each cascade's near plane.
    pub near_plane_offset: f32,
    /// Distance added behind each cascade's far plane.
    pub far_plane_offset: f32,
    /// Constant depth bias used when comparing against the map.
    pub depth_bias: f32,
    /// Filter with percentage-closer filtering.
    pub pcf: bool,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cascade_count: 4,
            split_lambda: 0.91,
            map_size: 2048,
            scene_radius: 1.0,
            radius_multiplier: 1.0,
            near_plane_offset: -50.0,
            far_plane_offset: 50.0,
            depth_bias: 0.0005,
            pcf: true,
        }
    }
}

/// Deferred lighting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredSettings {
    /// Debug view: 0 lit, 1 albedo, 2 normals, 3 cascades, 4 shadow factor.
    pub debug_mode: u32,
    /// Lights packed per frame, `1..=32`.
    pub max_lights: u32,
}

impl Default for DeferredSettings {
    fn default() -> Self {
        Self {
            debug_mode: 0,
            max_lights: MAX_DEFERRED_LIGHTS,
        }
    }
}

/// Capacities of the CPU batched lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Quads per 2D batch before a flush.
    pub max_quads: u32,
    /// Lines per batch before a flush.
    pub max_lines: u32,
    /// Points per batch before a flush.
    pub max_points: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_quads: 10_000,
            max_lines: 10_000,
            max_points: 10_000,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Graphics API to run on.
    pub backend: GraphicsBackendType,
    /// Adapter preference.
    pub power_preference: PowerPreference,
    /// Width of the swapchain images.
    pub width: u32,
    /// Height of the swapchain images.
    pub height: u32,
    /// Number of swapchain images.
    pub swapchain_images: u32,
    /// Frames recorded ahead of the GPU, `1..=3`.
    pub frames_in_flight: usize,
    /// Clear colour of the first pass.
    pub clear_colour: [f32; 4],
    /// Shadow settings.
    pub shadows: ShadowSettings,
    /// Deferred lighting settings.
    pub deferred: DeferredSettings,
    /// Batch capacities.
    pub batches: BatchSettings,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: GraphicsBackendType::Auto,
            power_preference: PowerPreference::HighPerformance,
            width: 1280,
            height: 720,
            swapchain_images: 3,
            frames_in_flight: 2,
            clear_colour: [0.1, 0.1, 0.12, 1.0],
            shadows: ShadowSettings::default(),
            deferred: DeferredSettings::default(),
            batches: BatchSettings::default(),
        }
    }
}

impl RendererConfig {
    /// Parses a config from RON text and validates it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: RendererConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// for malformed RON, [`ConfigError::Invalid`] for out-of-range values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?;
        log::info!("RendererConfig: loaded {}", path.display());
        Ok(config)
    }

    /// Pretty RON text of the config.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Clamps soft limits and rejects values the renderer cannot run with.
    ///
    /// ## Errors
    /// * `ConfigError::Invalid` - Zero resolution, cascade count outside
    ///   `1..=16`, frames in flight outside `1..=3`, or no swapchain image.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "resolution {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if !(1..=MAX_CASCADES).contains(&self.shadows.cascade_count) {
            return Err(ConfigError::Invalid(format!(
                "cascade_count must be within 1..={MAX_CASCADES}, got {}",
                self.shadows.cascade_count
            )));
        }
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be within 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.swapchain_images == 0 {
            return Err(ConfigError::Invalid(
                "swapchain_images must be at least 1".to_string(),
            ));
        }
        if self.shadows.map_size == 0 {
            return Err(ConfigError::Invalid(
                "shadow map_size must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.shadows.split_lambda) {
            log::warn!(
                "RendererConfig: split_lambda {} clamped to [0, 1]",
                self.shadows.split_lambda
            );
            self.shadows.split_lambda = self.shadows.split_lambda.clamp(0.0, 1.0);
        }
        if !(1..=MAX_DEFERRED_LIGHTS).contains(&self.deferred.max_lights) {
            log::warn!(
                "RendererConfig: max_lights {} clamped to 1..={}",
                self.deferred.max_lights,
                MAX_DEFERRED_LIGHTS
            );
            self.deferred.max_lights = self.deferred.max_lights.clamp(1, MAX_DEFERRED_LIGHTS);
        }
        let batches = &mut self.batches;
        for (name, value) in [
            ("max_quads", &mut batches.max_quads),
            ("max_lines", &mut batches.max_lines),
            ("max_points", &mut batches.max_points),
        ] {
            if *value == 0 {
                log::warn!("RendererConfig: {name} of 0 raised to 1");
                *value = 1;
            }
        }
        Ok(())
    }

    /// The clear colour as a [`LinearRgba`].
    pub fn clear_colour(&self) -> LinearRgba {
        let [r, g, b, a] = self.clear_colour;
        LinearRgba::new(r, g, b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut config = RendererConfig::default();
        config.validate().unwrap();
        assert_eq!(config.shadows.cascade_count, 4);
        assert_eq!(config.shadows.split_lambda, 0.91);
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = RendererConfig::from_ron_str(
            "(backend: Headless, width: 320, height: 240, shadows: (cascade_count: 2))",
        )
        .unwrap();
        assert_eq!(config.backend, GraphicsBackendType::Headless);
        assert_eq!(config.width, 320);
        assert_eq!(config.shadows.cascade_count, 2);
        assert_eq!(config.shadows.map_size, 2048);
        assert_eq!(config.batches, BatchSettings::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            RendererConfig::from_ron_str("(shadows: (cascade_count: 17))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(frames_in_flight: 4)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(width: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(backend: Glide)"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn soft_limits_are_clamped() {
        let config =
            RendererConfig::from_ron_str("(shadows: (split_lambda: 1.5), deferred: (max_lights: 99))")
                .unwrap();
        assert_eq!(config.shadows.split_lambda, 1.0);
        assert_eq!(config.deferred.max_lights, MAX_DEFERRED_LIGHTS);
    }

    #[test]
    fn ron_text_round_trips() {
        let config = RendererConfig::default();
        let text = config.to_ron_string().unwrap();
        assert_eq!(RendererConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = RendererConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
