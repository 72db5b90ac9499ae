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

//! View and camera information.

use crate::math::{Frustum, Mat4, Vec3};

/// A perspective camera as seen by the renderer.
///
/// Projections use a `[0, 1]` depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World to view space.
    pub view: Mat4,
    /// View to clip space.
    pub projection: Mat4,
    /// World-space position.
    pub position: Vec3,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
}

impl Camera {
    /// A right-handed perspective camera looking at `target`.
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y_radians, aspect, near, far),
            position,
            near,
            far,
        }
    }

    /// `projection * view`.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Culling volume of the camera.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Forward direction in world space.
    pub fn forward(&self) -> Vec3 {
        -self.view.inverse().z_axis.truncate()
    }

    /// Distance from the camera along its forward axis.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.forward())
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(
            Vec3::new(0.0, 2.0, 6.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            1000.0,
        )
    }
}

/// The GPU-side representation of camera uniform data.
///
/// The layout must match the `Camera` uniform block declared by the shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniformData {
    /// `projection * view`.
    pub view_projection: [[f32; 4]; 4],
    /// World to view space.
    pub view: [[f32; 4]; 4],
    /// Camera position; w is padding.
    pub position: [f32; 4],
}

impl CameraUniformData {
    /// Packs a camera.
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_projection: camera.view_projection().to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn view_depth_grows_along_forward() {
        let camera = Camera::perspective(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 100.0);
        assert_relative_eq!(camera.forward().z, -1.0, epsilon = 1e-5);
        assert_relative_eq!(camera.view_depth(Vec3::new(3.0, 1.0, -10.0)), 10.0, epsilon = 1e-4);
        assert!(camera.frustum().contains_point(Vec3::new(0.0, 0.0, -5.0)));
    }

    #[test]
    fn uniform_data_is_packed() {
        assert_eq!(std::mem::size_of::<CameraUniformData>(), 144);
        let data = CameraUniformData::from_camera(&Camera::default());
        assert_eq!(data.position[3], 1.0);
    }
}
