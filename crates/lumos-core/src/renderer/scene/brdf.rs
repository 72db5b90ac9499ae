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

//! CPU generation of the split-sum BRDF look-up texture.
//!
//! The texture maps `(n·v, roughness)` to the scale and bias applied to F0 by
//! image based lighting. It is used whenever no precomputed LUT file is
//! supplied.

use crate::math::{Vec2, Vec3};
use crate::renderer::api::format::RhiFormat;
use crate::renderer::api::texture::{AddressMode, FilterMode};
use crate::renderer::error::ResourceError;
use crate::renderer::resources::{Texture2D, TextureParameters};
use crate::renderer::traits::GraphicsDevice;
use std::f32::consts::PI;
use std::sync::Arc;

/// Default edge length of the generated LUT.
pub const DEFAULT_LUT_SIZE: u32 = 128;

/// Default number of importance samples per texel.
pub const DEFAULT_SAMPLE_COUNT: u32 = 256;

fn hammersley(i: u32, count: u32) -> Vec2 {
    Vec2::new(i as f32 / count as f32, i.reverse_bits() as f32 * 2.328_306_4e-10)
}

fn importance_sample_ggx(xi: Vec2, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    // Tangent space around N = +Z.
    Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

fn geometry_schlick_ggx(n_dot: f32, roughness: f32) -> f32 {
    let k = roughness * roughness / 2.0;
    n_dot / (n_dot * (1.0 - k) + k)
}

/// Integrates the specular BRDF for one `(n·v, roughness)` pair.
///
/// Returns `(scale, bias)` such that the pre-integrated specular term is
/// `F0 * scale + bias`.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, samples: u32) -> Vec2 {
    let n_dot_v = n_dot_v.clamp(1e-4, 1.0);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);

    let mut scale = 0.0;
    let mut bias = 0.0;
    for i in 0..samples {
        let h = importance_sample_ggx(hammersley(i, samples), roughness);
        let l = 2.0 * v.dot(h) * h - v;

        let n_dot_l = l.z.max(0.0);
        if n_dot_l <= 0.0 {
            continue;
        }
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);

        let g = geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
        let g_vis = g * v_dot_h / (n_dot_h * n_dot_v).max(1e-6);
        let fc = (1.0 - v_dot_h).powi(5);

        scale += (1.0 - fc) * g_vis;
        bias += fc * g_vis;
    }
    Vec2::new(scale, bias) / samples.max(1) as f32
}

/// Texel values of a `size x size` LUT, rows ordered by roughness.
pub fn generate_lut(size: u32, samples: u32) -> Vec<Vec2> {
    let mut texels = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            texels.push(integrate_brdf(n_dot_v, roughness, samples));
        }
    }
    texels
}

// Normal range only; values below the smallest normal half flush to zero.
fn f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = bits & 0x007f_ffff;
    if exponent <= 0 {
        sign
    } else if exponent >= 31 {
        sign | 0x7c00
    } else {
        sign | ((exponent as u16) << 10) | (mantissa >> 13) as u16
    }
}

/// Generates the LUT and uploads it as an `R16G16Float` texture.
///
/// ## Errors
/// Returns a [`ResourceError`] if the backend rejects the texture.
pub fn brdf_lut_texture(
    device: &Arc<dyn GraphicsDevice>,
    size: u32,
    samples: u32,
) -> Result<Texture2D, ResourceError> {
    let texels = generate_lut(size, samples);
    let mut bytes = Vec::with_capacity(texels.len() * 4);
    for texel in &texels {
        bytes.extend_from_slice(&f16_bits(texel.x).to_le_bytes());
        bytes.extend_from_slice(&f16_bits(texel.y).to_le_bytes());
    }
    log::debug!("BRDF LUT: generated {size}x{size} with {samples} samples");
    Texture2D::from_source(
        device,
        "brdf_lut",
        size,
        size,
        &bytes,
        TextureParameters {
            format: RhiFormat::R16G16Float,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            wrap: AddressMode::ClampToEdge,
            srgb: false,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockDevice;
    use approx::assert_abs_diff_eq;

    #[test]
    fn smooth_surface_head_on_reflects_everything() {
        let value = integrate_brdf(1.0, 0.0, 64);
        assert_abs_diff_eq!(value.x, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(value.y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn lut_values_stay_in_range() {
        let lut = generate_lut(8, 64);
        assert_eq!(lut.len(), 64);
        for texel in &lut {
            assert!(texel.x >= 0.0 && texel.y >= 0.0);
            assert!(texel.x + texel.y <= 1.05, "{texel:?}");
        }
        // Rough grazing texels lose energy compared to smooth head-on ones.
        let smooth_head_on = lut[7];
        let rough_grazing = lut[7 * 8];
        assert!(rough_grazing.x + rough_grazing.y < smooth_head_on.x + smooth_head_on.y);
    }

    #[test]
    fn half_conversion() {
        assert_eq!(f16_bits(1.0), 0x3c00);
        assert_eq!(f16_bits(0.5), 0x3800);
        assert_eq!(f16_bits(0.0), 0);
        assert_eq!(f16_bits(-2.0), 0xc000);
    }

    #[test]
    fn texture_is_uploaded_as_rg16f() {
        let (mock, device) = MockDevice::shared();
        let lut = brdf_lut_texture(&device, 4, 16).unwrap();
        assert_eq!(lut.format(), RhiFormat::R16G16Float);
        assert_eq!(mock.texture_data(lut.id()).unwrap().len(), 4 * 4 * 4);
    }
}
