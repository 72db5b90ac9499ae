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

//! CPU mirrors of the uniform blocks the lane shaders declare.

use lumos_core::config::MAX_DEFERRED_LIGHTS;
use lumos_core::math::{Mat4, Vec4};
use lumos_core::renderer::shader::Shader;
use lumos_core::renderer::{
    DynamicAllocation, DynamicUniformRingBuffer, GraphicsDevice, LightSet, LightType, RenderError,
    ResourceError, UniformBlock, UniformLayout, UniformType, DEFAULT_MAX_ELEMENTS,
};
use lumos_core::RenderContext;
use std::sync::Arc;

/// Lights the forward shader shades with.
pub const MAX_FORWARD_LIGHTS: usize = 16;

/// Per-draw `Object` block, pushed through a dynamic uniform ring.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    /// Model to world.
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`.
    pub normal: [[f32; 4]; 4],
    /// Applied to texture coordinates.
    pub texture_matrix: [[f32; 4]; 4],
}

impl ObjectUniform {
    /// Packs a draw's matrices.
    pub fn new(model: Mat4, texture_matrix: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            texture_matrix: texture_matrix.to_cols_array_2d(),
        }
    }
}

/// Per-draw uniforms bound at binding 0 of one set with a dynamic offset.
///
/// Wraps a [`DynamicUniformRingBuffer`] with one slot per frame in flight
/// and releases its buffers when dropped.
pub struct DrawUniforms {
    device: Arc<dyn GraphicsDevice>,
    ring: DynamicUniformRingBuffer,
}

impl DrawUniforms {
    /// Creates the ring for `set` of `shader`, which must declare binding 0
    /// of that set as a dynamic uniform.
    pub fn new(
        ctx: &RenderContext,
        shader: &Shader,
        set: u32,
        element_size: u32,
        label: &str,
    ) -> Result<Self, RenderError> {
        let layout = shader.bind_group_layout(set).ok_or_else(|| {
            RenderError::InitializationFailed(format!(
                "shader '{}' declares no set {set} for per-draw uniforms",
                shader.name()
            ))
        })?;
        let ring = DynamicUniformRingBuffer::new(
            ctx.device().as_ref(),
            layout,
            0,
            element_size,
            DEFAULT_MAX_ELEMENTS,
            ctx.frames_in_flight(),
            label,
        )?;
        Ok(Self {
            device: ctx.device().clone(),
            ring,
        })
    }

    /// Rewinds the slot of the frame being recorded.
    pub fn begin_frame(&mut self, slot: usize) {
        self.ring.begin_slot(slot);
    }

    /// Writes one element.
    pub fn push<T: bytemuck::Pod>(&mut self, value: &T) -> Result<DynamicAllocation, ResourceError> {
        self.ring
            .push(self.device.as_ref(), bytemuck::bytes_of(value))
    }
}

impl Drop for DrawUniforms {
    fn drop(&mut self) {
        self.ring.destroy(self.device.as_ref());
    }
}

impl std::fmt::Debug for DrawUniforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawUniforms")
            .field("ring", &self.ring)
            .finish_non_exhaustive()
    }
}

/// The `Light` struct: radiance, position and range, direction and outer
/// cone, then kind, inner cone and shadow flag.
pub fn light_layout() -> UniformLayout {
    UniformLayout::builder("Light")
        .field("colour", UniformType::Vec4)
        .field("position", UniformType::Vec4)
        .field("direction", UniformType::Vec4)
        .field("params", UniformType::Vec4)
        .build()
}

/// The `ForwardLights` block of the forward shader.
pub fn forward_lights_layout() -> UniformLayout {
    UniformLayout::builder("ForwardLights")
        .array(
            "lights",
            UniformType::Struct(Arc::new(light_layout())),
            MAX_FORWARD_LIGHTS as u32,
        )
        .field("ambient", UniformType::Vec4)
        .field("light_count", UniformType::UInt)
        .build()
}

/// The `LightingUniforms` block of the deferred lighting shader.
pub fn lighting_uniforms_layout() -> UniformLayout {
    UniformLayout::builder("LightingUniforms")
        .array(
            "lights",
            UniformType::Struct(Arc::new(light_layout())),
            MAX_DEFERRED_LIGHTS,
        )
        .array("shadow_transforms", UniformType::Mat4, 16)
        .array("split_depths", UniformType::Vec4, 16)
        .field("light_view", UniformType::Mat4)
        .field("camera_position", UniformType::Vec4)
        .field("view", UniformType::Mat4)
        .field("light_count", UniformType::UInt)
        .field("cascade_count", UniformType::UInt)
        .field("shadow_bias", UniformType::Float)
        .field("debug_mode", UniformType::UInt)
        .field("environment", UniformType::Vec4)
        .build()
}

/// The `Sky` block of the skybox shader.
pub fn sky_layout() -> UniformLayout {
    UniformLayout::builder("Sky")
        .field("view_projection", UniformType::Mat4)
        .field("params", UniformType::Vec4)
        .build()
}

/// The `Batch` block shared by the batch shaders.
pub fn batch_layout() -> UniformLayout {
    UniformLayout::builder("Batch")
        .field("view_projection", UniformType::Mat4)
        .build()
}

/// Writes `light` into `lights[index]` of `block`.
pub fn write_light(
    block: &mut UniformBlock,
    index: usize,
    light: &LightType,
    shadow_caster: bool,
) -> Result<(), ResourceError> {
    let inner_cone = match light {
        LightType::Spot(spot) => spot.inner_cone_angle.cos(),
        _ => 0.0,
    };
    let params = Vec4::new(
        light.kind_index() as f32,
        inner_cone,
        if shadow_caster { 1.0 } else { 0.0 },
        0.0,
    );
    block.set(&format!("lights[{index}].colour"), &light.radiance())?;
    block.set(&format!("lights[{index}].position"), &light.position_range())?;
    block.set(&format!("lights[{index}].direction"), &light.direction_cone())?;
    block.set(&format!("lights[{index}].params"), &params)?;
    Ok(())
}

/// Writes up to `capacity` lights and returns how many were written.
///
/// The first directional light is flagged as the shadow caster when
/// `shadows` is set. Extra lights are dropped with a warning.
pub fn write_lights(
    block: &mut UniformBlock,
    lights: &LightSet,
    capacity: usize,
    shadows: bool,
    owner: &str,
) -> Result<u32, ResourceError> {
    if lights.len() > capacity {
        log::warn!(
            "{owner}: {} lights submitted, only the first {capacity} are shaded",
            lights.len()
        );
    }
    let caster = lights
        .lights
        .iter()
        .position(|l| matches!(l, LightType::Directional(_)));
    let count = lights.len().min(capacity);
    for (index, light) in lights.lights.iter().take(count).enumerate() {
        write_light(block, index, light, shadows && caster == Some(index))?;
    }
    Ok(count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumos_core::math::Vec3;
    use lumos_core::renderer::{DirectionalLight, PointLight, SpotLight};

    fn vec4_at(block: &UniformBlock, offset: usize) -> Vec4 {
        let bytes = &block.as_bytes()[offset..offset + 16];
        Vec4::from_slice(bytemuck::cast_slice::<u8, f32>(bytes))
    }

    #[test]
    fn layouts_have_the_shader_sizes() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 192);
        assert_eq!(light_layout().size(), 64);
        assert_eq!(forward_lights_layout().size(), 1056);
        assert_eq!(lighting_uniforms_layout().size(), 3504);
        assert_eq!(
            lighting_uniforms_layout().field("environment").map(|f| f.offset),
            Some(3488)
        );
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let object = ObjectUniform::new(model, Mat4::IDENTITY);
        assert_eq!(object.normal[0][0], 0.5);
        assert_eq!(object.texture_matrix, Mat4::IDENTITY.to_cols_array_2d());
    }

    #[test]
    fn lights_are_packed_with_their_kind() {
        let mut block = UniformBlock::new(Arc::new(forward_lights_layout()));
        let mut lights = LightSet::default();
        lights.push(LightType::Point(PointLight::default()));
        lights.push(LightType::Directional(DirectionalLight::default()));
        lights.push(LightType::Spot(SpotLight::default()));

        let count = write_lights(&mut block, &lights, MAX_FORWARD_LIGHTS, true, "test").unwrap();
        assert_eq!(count, 3);
        // params of lights[0..3] sit 48 bytes into each 64-byte record.
        assert_eq!(vec4_at(&block, 48), Vec4::new(2.0, 0.0, 0.0, 0.0));
        assert_eq!(vec4_at(&block, 64 + 48), Vec4::new(0.0, 0.0, 1.0, 0.0));
        let spot = vec4_at(&block, 128 + 48);
        assert_eq!(spot.x, 1.0);
        assert!((spot.y - 20.0_f32.to_radians().cos()).abs() < 1e-6);
    }

    #[test]
    fn overflowing_lights_are_dropped() {
        let mut block = UniformBlock::new(Arc::new(forward_lights_layout()));
        let lights = LightSet {
            lights: vec![LightType::Point(PointLight::default()); MAX_FORWARD_LIGHTS + 4],
        };
        let count = write_lights(&mut block, &lights, MAX_FORWARD_LIGHTS, false, "test").unwrap();
        assert_eq!(count as usize, MAX_FORWARD_LIGHTS);
    }
}
