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

//! Light sources consumed by the lighting and shadow lanes.
//!
//! Lights carry their own world-space placement since the renderer has no
//! scene graph of its own; whatever owns the scene fills these in each frame.

use crate::math::{LinearRgba, Vec3, Vec4};

/// A light infinitely far away, shining along one direction (the sun).
///
/// Only the first directional light of a scene casts cascaded shadows.
///
/// # Examples
///
/// ```
/// use lumos_core::renderer::light::DirectionalLight;
/// use lumos_core::math::{Vec3, LinearRgba};
///
/// let sun = DirectionalLight {
///     direction: Vec3::new(-0.5, -1.0, -0.3).normalize(),
///     color: LinearRgba::new(1.0, 0.95, 0.8, 1.0),
///     intensity: 1.0,
/// };
/// assert!(sun.direction.y < 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in, from the light towards the scene.
    pub direction: Vec3,
    /// Linear colour.
    pub color: LinearRgba,
    /// Intensity multiplier.
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, -0.5).normalize(),
            color: LinearRgba::WHITE,
            intensity: 1.0,
        }
    }
}

/// An omni-directional light with distance falloff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World-space position.
    pub position: Vec3,
    /// Linear colour.
    pub color: LinearRgba,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Distance beyond which the light contributes nothing.
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: LinearRgba::WHITE,
            intensity: 10.0,
            range: 10.0,
        }
    }
}

/// A cone-shaped light with distance and angular falloff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// World-space position.
    pub position: Vec3,
    /// Direction of the cone axis.
    pub direction: Vec3,
    /// Linear colour.
    pub color: LinearRgba,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Distance beyond which the light contributes nothing.
    pub range: f32,
    /// Angle (radians) inside which the light is at full intensity.
    pub inner_cone_angle: f32,
    /// Angle (radians) beyond which the light is fully attenuated.
    pub outer_cone_angle: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: LinearRgba::WHITE,
            intensity: 20.0,
            range: 15.0,
            inner_cone_angle: 20.0_f32.to_radians(),
            outer_cone_angle: 35.0_f32.to_radians(),
        }
    }
}

/// Any supported light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightType {
    /// Sun-like light.
    Directional(DirectionalLight),
    /// Omni light.
    Point(PointLight),
    /// Cone light.
    Spot(SpotLight),
}

impl Default for LightType {
    fn default() -> Self {
        LightType::Directional(DirectionalLight::default())
    }
}

impl LightType {
    /// Numeric kind written into light uniforms (0 directional, 1 spot, 2 point).
    pub const fn kind_index(&self) -> u32 {
        match self {
            LightType::Directional(_) => 0,
            LightType::Spot(_) => 1,
            LightType::Point(_) => 2,
        }
    }

    /// Colour premultiplied by intensity, alpha carries the intensity.
    pub fn radiance(&self) -> Vec4 {
        let (color, intensity) = match self {
            LightType::Directional(l) => (l.color, l.intensity),
            LightType::Point(l) => (l.color, l.intensity),
            LightType::Spot(l) => (l.color, l.intensity),
        };
        Vec4::new(color.r, color.g, color.b, intensity)
    }

    /// Position in `xyz` and range in `w`; directional lights report zero.
    pub fn position_range(&self) -> Vec4 {
        match self {
            LightType::Directional(_) => Vec4::ZERO,
            LightType::Point(l) => l.position.extend(l.range),
            LightType::Spot(l) => l.position.extend(l.range),
        }
    }

    /// Normalised direction in `xyz`; the cosine of the outer cone in `w`
    /// for spot lights.
    pub fn direction_cone(&self) -> Vec4 {
        match self {
            LightType::Directional(l) => l.direction.normalize_or_zero().extend(0.0),
            LightType::Point(_) => Vec4::ZERO,
            LightType::Spot(l) => l
                .direction
                .normalize_or_zero()
                .extend(l.outer_cone_angle.cos()),
        }
    }
}

/// The set of lights visible to one frame.
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    /// Every light in submission order.
    pub lights: Vec<LightType>,
}

impl LightSet {
    /// The first directional light, which drives shadow cascades.
    pub fn main_directional(&self) -> Option<&DirectionalLight> {
        self.lights.iter().find_map(|light| match light {
            LightType::Directional(l) => Some(l),
            _ => None,
        })
    }

    /// Number of lights.
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// Whether the set holds no light.
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Adds a light.
    pub fn push(&mut self, light: LightType) {
        self.lights.push(light);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::EPSILON;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_directional_light_default() {
        let light = DirectionalLight::default();
        assert_eq!(light.color, LinearRgba::WHITE);
        assert!(approx_eq(light.direction.length(), 1.0));
    }

    #[test]
    fn test_spot_light_cone_in_w() {
        let light = LightType::Spot(SpotLight {
            outer_cone_angle: 60.0_f32.to_radians(),
            ..Default::default()
        });
        assert!(approx_eq(light.direction_cone().w, 0.5));
        assert_eq!(light.kind_index(), 1);
    }

    #[test]
    fn test_point_light_packs_range() {
        let light = LightType::Point(PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            range: 7.0,
            ..Default::default()
        });
        assert_eq!(light.position_range(), Vec4::new(1.0, 2.0, 3.0, 7.0));
        assert_eq!(light.direction_cone(), Vec4::ZERO);
    }

    #[test]
    fn test_main_directional_skips_other_lights() {
        let mut set = LightSet::default();
        assert!(set.main_directional().is_none());
        set.push(LightType::Point(PointLight::default()));
        set.push(LightType::Directional(DirectionalLight {
            intensity: 3.0,
            ..Default::default()
        }));
        let sun = set.main_directional().unwrap();
        assert!(approx_eq(sun.intensity, 3.0));
    }
}
