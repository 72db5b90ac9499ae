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

//! View frustums extracted from projection-view matrices.
//!
//! All projections in the renderer use a `[0, 1]` clip-space depth range.

use super::{Aabb, BoundingSphere, Mat4, Vec3, Vec4};

/// A plane `normal · p + distance = 0` with a unit-length normal pointing
/// towards the inside of the volume it bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vec3,
    /// Signed distance term.
    pub distance: f32,
}

impl Plane {
    /// Builds a normalized plane from raw `(a, b, c, d)` coefficients.
    pub fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            return Self {
                normal: Vec3::ZERO,
                distance: 0.0,
            };
        }
        Self {
            normal: normal / len,
            distance: v.w / len,
        }
    }

    /// Signed distance from `point` to the plane (positive on the inner side).
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Index of each frustum plane within [`Frustum::planes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FrustumPlane {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Near = 4,
    Far = 5,
}

/// Six inward-facing planes bounding a view volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Planes ordered as [`FrustumPlane`].
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum of a projection-view matrix (Gribb/Hartmann).
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Returns the plane of the given side.
    #[inline]
    pub fn plane(&self, which: FrustumPlane) -> &Plane {
        &self.planes[which as usize]
    }

    /// Whether a point lies inside the frustum.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }

    /// Whether a sphere is at least partially inside the frustum.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.signed_distance(sphere.center) >= -sphere.radius)
    }

    /// Whether a box is at least partially inside the frustum.
    ///
    /// Tests the box's positive vertex against each plane; conservative near
    /// frustum edges.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|p| {
            let positive = Vec3::select(p.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            p.signed_distance(positive) >= 0.0
        })
    }

    /// The eight world-space corners of the volume described by `view_proj`.
    ///
    /// The first four lie on the near plane, the last four on the far plane,
    /// both in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(view_proj: &Mat4) -> [Vec3; 8] {
        const NDC: [(f32, f32, f32); 8] = [
            (-1.0, 1.0, 0.0),
            (1.0, 1.0, 0.0),
            (1.0, -1.0, 0.0),
            (-1.0, -1.0, 0.0),
            (-1.0, 1.0, 1.0),
            (1.0, 1.0, 1.0),
            (1.0, -1.0, 1.0),
            (-1.0, -1.0, 1.0),
        ];
        let inverse = view_proj.inverse();
        NDC.map(|(x, y, z)| inverse.project_point3(Vec3::new(x, y, z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Mat4 {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        proj * view
    }

    #[test]
    fn sphere_in_front_is_visible() {
        let frustum = Frustum::from_view_projection(&camera());
        assert!(frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn sphere_behind_camera_is_culled() {
        let frustum = Frustum::from_view_projection(&camera());
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(
            Vec3::new(0.0, 0.0, -500.0),
            1.0
        )));
    }

    #[test]
    fn aabb_straddling_plane_is_visible() {
        let frustum = Frustum::from_view_projection(&camera());
        let aabb = Aabb::from_min_max(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(frustum.intersects_aabb(&aabb));
        let far_left = Aabb::from_center_half_extents(Vec3::new(-200.0, 0.0, -10.0), Vec3::ONE);
        assert!(!frustum.intersects_aabb(&far_left));
    }

    #[test]
    fn corners_lie_on_near_and_far_planes() {
        let corners = Frustum::corners(&camera());
        for c in &corners[..4] {
            assert_relative_eq!(c.z, -0.1, epsilon = 1e-4);
        }
        for c in &corners[4..] {
            assert_relative_eq!(c.z, -100.0, epsilon = 1e-1);
        }
    }

    #[test]
    fn planes_are_normalized() {
        let frustum = Frustum::from_view_projection(&camera());
        for plane in &frustum.planes {
            assert_relative_eq!(plane.normal.length(), 1.0, epsilon = 1e-5);
        }
    }
}
