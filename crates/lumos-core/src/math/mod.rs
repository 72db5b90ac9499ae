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

//! Math types used by the renderer.
//!
//! Vectors, matrices and quaternions come from `glam`; this module adds the
//! rendering-specific volumes (bounding boxes, spheres, frustums) and colours.

pub mod color;
pub mod frustum;
pub mod geometry;

pub use color::LinearRgba;
pub use frustum::{Frustum, Plane};
pub use geometry::{Aabb, BoundingSphere};
pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

/// Tolerance used by approximate float comparisons across the renderer.
pub const EPSILON: f32 = 1e-5;
