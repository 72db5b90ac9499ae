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

//! Bounding volumes used for visibility culling.

use super::{Mat4, Vec3};

/// An Axis-Aligned Bounding Box.
///
/// Meshes carry one in model space; culling transforms it into world space with
/// [`Aabb::transform`] and then tests it (or its enclosing sphere) against a
/// [`Frustum`](super::Frustum).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The corner with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that acts as the identity for [`Aabb::merge`].
    pub const INVALID: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Creates a box from two corners given in any order.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a box from its centre and half-extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Creates the tightest box around `points`, or `None` when empty.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |acc, p| acc.merged_with_point(*p),
        ))
    }

    /// The centre point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the size on each axis.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether `min <= max` on every axis.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Whether `point` lies inside or on the boundary.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Box enclosing both boxes.
    #[inline]
    pub fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box enclosing this box and `point`.
    #[inline]
    pub fn merged_with_point(&self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Bounds of this box after an affine transformation.
    ///
    /// The centre is transformed directly and the extents are projected onto
    /// the absolute basis vectors, which avoids transforming all eight corners.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extents();
        let new_half = matrix.x_axis.truncate().abs() * half.x
            + matrix.y_axis.truncate().abs() * half.y
            + matrix.z_axis.truncate().abs() * half.z;
        Self::from_center_half_extents(center, new_half)
    }

    /// Smallest sphere centred on the box that encloses it.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.half_extents().length())
    }
}

impl Default for Aabb {
    #[inline]
    fn default() -> Self {
        Self::INVALID
    }
}

/// A sphere described by a centre and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Centre of the sphere.
    pub center: Vec3,
    /// Radius of the sphere, never negative.
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a sphere; a negative radius is taken as its absolute value.
    #[inline]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.abs(),
        }
    }

    /// Sphere centred on the average of `points` reaching the farthest one.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0f32, f32::max);
        Some(Self { center, radius })
    }

    /// Transforms the sphere, scaling the radius by the largest axis scale.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let scale = matrix
            .x_axis
            .truncate()
            .length()
            .max(matrix.y_axis.truncate().length())
            .max(matrix.z_axis.truncate().length());
        Self {
            center: matrix.transform_point3(self.center),
            radius: self.radius * scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn from_points_encloses_all_points() {
        let points = [
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-4.0, 5.0, 0.0),
            Vec3::new(0.0, 0.0, -6.0),
        ];
        let aabb = Aabb::from_points(&points).unwrap();
        assert_eq!(aabb.min, Vec3::new(-4.0, -2.0, -6.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 5.0, 3.0));
        assert!(points.iter().all(|p| aabb.contains_point(*p)));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn transform_translates_and_scales() {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0));
        let m = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))
            * Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let t = aabb.transform(&m);
        assert_eq!(t.min, Vec3::new(8.0, -1.0, -1.0));
        assert_eq!(t.max, Vec3::new(12.0, 1.0, 1.0));
    }

    #[test]
    fn merge_with_invalid_is_identity() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        assert_eq!(Aabb::INVALID.merge(&aabb), aabb);
        assert!(!Aabb::INVALID.is_valid());
    }

    #[test]
    fn sphere_from_points_reaches_farthest_point() {
        let sphere =
            BoundingSphere::from_points(&[Vec3::new(-2.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)])
                .unwrap();
        assert_eq!(sphere.center, Vec3::ZERO);
        assert_relative_eq!(sphere.radius, 2.0);
    }

    #[test]
    fn sphere_transform_uses_largest_scale() {
        let sphere = BoundingSphere::new(Vec3::ZERO, 1.0);
        let t = sphere.transform(&Mat4::from_scale(Vec3::new(1.0, 3.0, 2.0)));
        assert_relative_eq!(t.radius, 3.0);
    }
}
