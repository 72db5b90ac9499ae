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

//! Cascade splitting and fitting for directional shadow maps.
//!
//! The camera's depth range is cut into up to [`MAX_CASCADES`] slices with a
//! blend of logarithmic and uniform split points. Each slice is enclosed in a
//! sphere, which keeps the light projection's size constant while the camera
//! rotates, and the projection is snapped to whole shadow-map texels so
//! shadow edges do not shimmer when the camera moves.

use lumos_core::config::{ShadowSettings, MAX_CASCADES};
use lumos_core::math::{BoundingSphere, Frustum, Mat4, Vec3, Vec4};
use lumos_core::renderer::scene::Camera;

/// Number of cascade slots in [`ShadowData`].
pub const CASCADE_SLOTS: usize = MAX_CASCADES as usize;

/// One slice of the camera frustum as seen by the light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    /// Light projection times light view.
    pub proj_view: Mat4,
    /// View-space distance where the slice ends.
    pub split_depth: f32,
    /// Culling volume of `proj_view`.
    pub frustum: Frustum,
}

impl Default for Cascade {
    fn default() -> Self {
        Self {
            proj_view: Mat4::IDENTITY,
            split_depth: 0.0,
            frustum: Frustum::from_view_projection(&Mat4::IDENTITY),
        }
    }
}

impl Cascade {
    /// Whether a world-space sphere may cast into this cascade.
    pub fn can_see(&self, sphere: &BoundingSphere) -> bool {
        self.frustum.intersects_sphere(sphere)
    }
}

/// Cascades of the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowData {
    /// Cascade slots; only the first `cascade_count` are meaningful.
    pub cascades: [Cascade; CASCADE_SLOTS],
    /// Number of cascades in use.
    pub cascade_count: usize,
    /// Inverse of cascade 0's light view.
    pub light_view: Mat4,
    /// Normalised direction the light travels in.
    pub light_direction: Vec3,
    /// Depth bias applied when comparing against the maps.
    pub bias: f32,
    /// False when there is no directional light to cast shadows.
    pub should_render: bool,
}

impl Default for ShadowData {
    fn default() -> Self {
        Self {
            cascades: [Cascade::default(); CASCADE_SLOTS],
            cascade_count: 0,
            light_view: Mat4::IDENTITY,
            light_direction: Vec3::NEG_Y,
            bias: 0.0,
            should_render: false,
        }
    }
}

impl ShadowData {
    /// The cascades in use.
    pub fn active(&self) -> &[Cascade] {
        &self.cascades[..self.cascade_count]
    }
}

/// Split points of `count` cascades as fractions of `[near, far]`.
///
/// Split `i` sits at `λ·log + (1 − λ)·uniform` where
/// `log = near·(far/near)^p`, `uniform = near + (far − near)·p` and
/// `p = (i + 1) / count`. The last split is always the far plane.
pub fn split_fractions(near: f32, far: f32, count: usize, lambda: f32) -> Vec<f32> {
    let range = far - near;
    let ratio = far / near;
    (0..count)
        .map(|i| {
            let p = (i + 1) as f32 / count as f32;
            let log = near * ratio.powf(p);
            let uniform = near + range * p;
            let d = lambda * (log - uniform) + uniform;
            (d - near) / range
        })
        .collect()
}

/// Fits the cascades of `camera` for a directional light travelling along
/// `light_direction`.
///
/// A zero direction yields `should_render == false`.
pub fn compute_cascades(
    camera: &Camera,
    light_direction: Vec3,
    settings: &ShadowSettings,
) -> ShadowData {
    let light_dir = light_direction.normalize_or_zero();
    if light_dir == Vec3::ZERO {
        log::warn!("ShadowData: directional light has no direction, shadows skipped");
        return ShadowData::default();
    }

    let count = (settings.cascade_count as usize).clamp(1, CASCADE_SLOTS);
    let (near, far) = (camera.near, camera.far);
    let range = far - near;
    let splits = split_fractions(near, far, count, settings.split_lambda);
    let frustum_corners = Frustum::corners(&camera.view_projection());
    let up = if light_dir.dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let min_radius = settings.scene_radius * settings.radius_multiplier;
    let half_map = settings.map_size.max(1) as f32 * 0.5;

    let mut data = ShadowData {
        cascade_count: count,
        light_direction: light_dir,
        bias: settings.depth_bias,
        should_render: true,
        ..Default::default()
    };

    let mut last_split = 0.0;
    for (i, &split) in splits.iter().enumerate() {
        let mut corners = frustum_corners;
        for j in 0..4 {
            let edge = frustum_corners[j + 4] - frustum_corners[j];
            corners[j + 4] = frustum_corners[j] + edge * split;
            corners[j] = frustum_corners[j] + edge * last_split;
        }

        let centre = corners.iter().copied().sum::<Vec3>() / 8.0;
        let radius = corners
            .iter()
            .map(|c| c.distance(centre))
            .fold(0.0f32, f32::max);
        let radius = ((radius * 16.0).ceil() / 16.0).max(min_radius);

        let light_view = Mat4::look_at_rh(centre - light_dir * radius, centre, up);
        let mut projection = Mat4::orthographic_rh(
            -radius,
            radius,
            -radius,
            radius,
            settings.near_plane_offset,
            2.0 * radius + settings.far_plane_offset,
        );

        // Snap the world origin to a texel so the map only moves in whole texels.
        let origin = (projection * light_view * Vec4::W).truncate().truncate() * half_map;
        let offset = (origin.round() - origin) / half_map;
        projection.w_axis.x += offset.x;
        projection.w_axis.y += offset.y;

        let proj_view = projection * light_view;
        data.cascades[i] = Cascade {
            proj_view,
            split_depth: near + split * range,
            frustum: Frustum::from_view_projection(&proj_view),
        };
        if i == 0 {
            data.light_view = light_view.inverse();
        }
        last_split = split;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera(near: f32, far: f32) -> Camera {
        Camera::perspective(
            Vec3::new(0.0, 5.0, 10.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            near,
            far,
        )
    }

    #[test]
    fn splits_cover_the_depth_range_without_gaps() {
        let splits = split_fractions(0.1, 1000.0, 4, 0.91);
        assert_eq!(splits.len(), 4);

        let mut previous = 0.0;
        for (i, split) in splits.iter().enumerate() {
            assert!(*split > previous, "split {i} does not advance");
            let p = (i + 1) as f32 / 4.0;
            let d = 0.91 * 0.1 * 10_000f32.powf(p) + 0.09 * (0.1 + 999.9 * p);
            assert_relative_eq!(*split, (d - 0.1) / 999.9, epsilon = 1e-5);
            previous = *split;
        }
        assert_relative_eq!(previous, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn single_logarithmic_cascade_spans_everything() {
        let splits = split_fractions(1.0, 100.0, 1, 1.0);
        assert_eq!(splits.len(), 1);
        assert_relative_eq!(splits[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_lambda_is_uniform() {
        let splits = split_fractions(1.0, 101.0, 4, 0.0);
        for (split, expected) in splits.iter().zip([0.25, 0.5, 0.75, 1.0]) {
            assert_relative_eq!(*split, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn cascade_split_depths_end_at_the_far_plane() {
        let settings = ShadowSettings::default();
        let data = compute_cascades(&camera(0.1, 1000.0), Vec3::new(0.3, -1.0, 0.2), &settings);
        assert!(data.should_render);
        assert_eq!(data.active().len(), 4);

        let mut previous = 0.1;
        for cascade in data.active() {
            assert!(cascade.split_depth > previous);
            previous = cascade.split_depth;
        }
        assert_relative_eq!(previous, 1000.0, epsilon = 1e-2);
    }

    #[test]
    fn each_cascade_sees_its_own_slice() {
        let cam = camera(0.5, 200.0);
        let settings = ShadowSettings::default();
        let data = compute_cascades(&cam, Vec3::new(-0.2, -1.0, -0.4), &settings);

        let forward = cam.forward();
        let mut start = cam.near;
        for cascade in data.active() {
            let middle = (start + cascade.split_depth) * 0.5;
            let point = cam.position + forward * middle;
            assert!(cascade.frustum.contains_point(point));
            start = cascade.split_depth;
        }
    }

    #[test]
    fn projections_are_snapped_to_texels() {
        let settings = ShadowSettings {
            map_size: 1024,
            ..Default::default()
        };
        let data = compute_cascades(&camera(0.1, 300.0), Vec3::new(0.5, -1.0, 0.1), &settings);
        for cascade in data.active() {
            let origin = (cascade.proj_view * Vec4::W).truncate().truncate() * 512.0;
            assert_relative_eq!(origin.x, origin.x.round(), epsilon = 1e-2);
            assert_relative_eq!(origin.y, origin.y.round(), epsilon = 1e-2);
        }
    }

    #[test]
    fn light_view_looks_along_the_light() {
        let direction = Vec3::new(0.0, -1.0, -1.0).normalize();
        let data = compute_cascades(&camera(0.1, 100.0), direction, &ShadowSettings::default());
        let looking = data.light_view.transform_vector3(Vec3::NEG_Z);
        assert_relative_eq!(looking.x, direction.x, epsilon = 1e-4);
        assert_relative_eq!(looking.y, direction.y, epsilon = 1e-4);
        assert_relative_eq!(looking.z, direction.z, epsilon = 1e-4);
    }

    #[test]
    fn tight_cascades_are_raised_to_the_minimum_radius() {
        let settings = ShadowSettings {
            scene_radius: 250.0,
            radius_multiplier: 2.0,
            ..Default::default()
        };
        let data = compute_cascades(&camera(0.1, 50.0), Vec3::NEG_Y, &settings);
        for cascade in data.active() {
            let m = cascade.proj_view;
            let row = Vec3::new(m.x_axis.x, m.y_axis.x, m.z_axis.x);
            assert_relative_eq!(1.0 / row.length(), 500.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn zero_direction_disables_shadows() {
        let data = compute_cascades(&Camera::default(), Vec3::ZERO, &ShadowSettings::default());
        assert!(!data.should_render);
        assert!(data.active().is_empty());
    }
}
