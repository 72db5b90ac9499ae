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

//! Built-in WGSL sources of the render lanes.
//!
//! Entry shaders pull their shared pieces in with `#include`; [`includes`]
//! returns the table those directives resolve against. Every entry shader
//! names its stages `vs_main` and `fs_main` (the shadow shader has no
//! fragment stage).
//!
//! # Shared pieces
//!
//! - `camera.wgsl` - the `Camera` block, laid out like `CameraUniformData`
//! - `object.wgsl` - per-draw `Object` block (model, normal and texture matrices)
//! - `vertex.wgsl` - vertex input matching `Vertex::layout`
//! - `material.wgsl` - material set 1 and `sample_surface`
//! - `lighting.wgsl` - `Light`, the Cook-Torrance BRDF and tone mapping
//! - `batch.wgsl` - view-projection block of the batch lanes

use lumos_core::renderer::shader::EmbeddedIncludes;

/// `Camera` uniform block.
pub const CAMERA_WGSL: &str = include_str!("camera.wgsl");

/// Per-draw `Object` block.
pub const OBJECT_WGSL: &str = include_str!("object.wgsl");

/// Mesh vertex input and the varyings of surface shaders.
pub const VERTEX_WGSL: &str = include_str!("vertex.wgsl");

/// Material set with its six texture maps.
///
/// `sample_surface` resolves albedo, normal, metalness, roughness, occlusion
/// and emission for a fragment, honouring the material's workflow.
pub const MATERIAL_WGSL: &str = include_str!("material.wgsl");

/// Light record and shading functions.
///
/// Implements the metallic-roughness Cook-Torrance BRDF:
/// - GGX/Trowbridge-Reitz normal distribution
/// - Schlick-GGX geometry function
/// - Fresnel-Schlick approximation
pub const LIGHTING_WGSL: &str = include_str!("lighting.wgsl");

/// Depth-only cascade shader.
pub const SHADOW_WGSL: &str = include_str!("shadow.wgsl");

/// Forward PBR shader lit by up to 16 lights.
pub const FORWARD_WGSL: &str = include_str!("forward.wgsl");

/// Geometry pass writing the four G-buffer targets.
pub const GBUFFER_WGSL: &str = include_str!("gbuffer.wgsl");

/// Full-screen lighting pass over the G-buffer with cascaded shadows and
/// image-based ambient light. Defining `SHADOW_PCF` enables 3x3 filtering.
pub const DEFERRED_LIGHTING_WGSL: &str = include_str!("deferred_lighting.wgsl");

/// Cubemap sky drawn on the far plane.
pub const SKYBOX_WGSL: &str = include_str!("skybox.wgsl");

/// View-projection block shared by the batch shaders.
pub const BATCH_WGSL: &str = include_str!("batch.wgsl");

/// Textured, tinted 2D quads.
pub const BATCH2D_WGSL: &str = include_str!("batch2d.wgsl");

/// Coloured line segments.
pub const LINE_WGSL: &str = include_str!("line.wgsl");

/// Camera-facing discs.
pub const POINT_WGSL: &str = include_str!("point.wgsl");

/// Include table for the entry shaders.
pub fn includes() -> EmbeddedIncludes {
    EmbeddedIncludes::new()
        .with("camera.wgsl", CAMERA_WGSL)
        .with("object.wgsl", OBJECT_WGSL)
        .with("vertex.wgsl", VERTEX_WGSL)
        .with("material.wgsl", MATERIAL_WGSL)
        .with("lighting.wgsl", LIGHTING_WGSL)
        .with("batch.wgsl", BATCH_WGSL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumos_core::renderer::shader::Preprocessor;

    const ENTRY_SHADERS: [(&str, &str); 9] = [
        ("shadow", SHADOW_WGSL),
        ("forward", FORWARD_WGSL),
        ("gbuffer", GBUFFER_WGSL),
        ("deferred_lighting", DEFERRED_LIGHTING_WGSL),
        ("skybox", SKYBOX_WGSL),
        ("batch2d", BATCH2D_WGSL),
        ("line", LINE_WGSL),
        ("point", POINT_WGSL),
        ("batch", BATCH_WGSL),
    ];

    #[test]
    fn entry_shaders_have_a_vertex_stage() {
        for (name, source) in ENTRY_SHADERS.iter().take(8) {
            assert!(source.contains("@vertex"), "{name} has no vertex stage");
            assert!(source.contains("fn vs_main"), "{name} has no vs_main");
        }
        assert!(!SHADOW_WGSL.contains("@fragment"));
        assert!(FORWARD_WGSL.contains("@fragment"));
    }

    #[test]
    fn includes_expand_once() {
        let includes = includes();
        for (name, source) in ENTRY_SHADERS {
            let expanded = Preprocessor::new(&includes)
                .expand(source, name)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert!(!expanded.contains("#include"), "{name} kept an include");
            assert!(expanded.matches("struct Light {").count() <= 1);
        }
    }

    #[test]
    fn pcf_switches_the_shadow_filter() {
        let includes = includes();
        let filtered = Preprocessor::new(&includes)
            .define("SHADOW_PCF", "")
            .expand(DEFERRED_LIGHTING_WGSL, "deferred_lighting")
            .unwrap();
        let single = Preprocessor::new(&includes)
            .expand(DEFERRED_LIGHTING_WGSL, "deferred_lighting")
            .unwrap();
        assert!(filtered.contains("lit / 9.0"));
        assert!(!single.contains("lit / 9.0"));
    }
}
