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

//! Fixed-function pipeline state and device-level pipeline descriptors.

use crate::renderer::api::bind_group::BindGroupLayoutId;
use crate::renderer::api::buffer::{IndexFormat, VertexBufferLayoutDescriptor};
use crate::renderer::api::format::RhiFormat;
use crate::renderer::api::shader::ShaderModuleId;
use crate::renderer::api::util::flags::ShaderStageFlags;
use std::borrow::Cow;
use std::hash::{Hash, Hasher};
use std::ops::Range;

/// An opaque handle to a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub usize);

/// An opaque handle to a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineLayoutId(pub usize);

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Winding of front-facing triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Which faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

/// Colour blending preset of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Blending disabled; the source replaces the destination.
    #[default]
    None,
    /// Classic `src * a + dst * (1 - a)`.
    SrcAlphaOneMinusSrcAlpha,
    /// Additive `src * a + dst`.
    Additive,
    /// Premultiplied alpha `src + dst * (1 - a)`.
    Premultiplied,
}

/// Depth or stencil comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum CompareFunction {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveState {
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
    /// Index format used to restart strips.
    pub strip_index_format: Option<IndexFormat>,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Culled faces.
    pub cull_mode: CullMode,
    /// Fill mode.
    pub polygon_mode: PolygonMode,
}

/// Depth bias applied to rasterized depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBiasState {
    /// Constant bias.
    pub constant: i32,
    /// Bias scaled by the polygon slope.
    pub slope_scale: f32,
    /// Maximum bias.
    pub clamp: f32,
}

impl Eq for DepthBiasState {}

impl Hash for DepthBiasState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.constant.hash(state);
        self.slope_scale.to_bits().hash(state);
        self.clamp.to_bits().hash(state);
    }
}

/// Depth test and write state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Depth attachment format.
    pub format: RhiFormat,
    /// Whether depth is written.
    pub depth_write_enabled: bool,
    /// Depth test.
    pub depth_compare: CompareFunction,
    /// Depth bias.
    pub bias: DepthBiasState,
}

/// One colour target of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    /// Attachment format.
    pub format: RhiFormat,
    /// Blending preset.
    pub blend: BlendMode,
}

/// A push-constant byte range visible to some stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Stages reading the range.
    pub stages: ShaderStageFlags,
    /// Byte range.
    pub range: Range<u32>,
}

/// Describes a pipeline layout.
#[derive(Debug, Clone)]
pub struct PipelineLayoutDescriptor<'a> {
    /// Debug label.
    pub label: Option<&'a str>,
    /// Bind group layouts in group order.
    pub bind_group_layouts: &'a [BindGroupLayoutId],
    /// Push-constant ranges.
    pub push_constant_ranges: &'a [PushConstantRange],
}

/// Describes a render pipeline at the device level.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Layout; `None` lets the backend derive one.
    pub layout: Option<PipelineLayoutId>,
    /// Vertex module.
    pub vertex_shader_module: ShaderModuleId,
    /// Vertex entry point.
    pub vertex_entry_point: Cow<'a, str>,
    /// Fragment module, absent for depth-only pipelines.
    pub fragment_shader_module: Option<ShaderModuleId>,
    /// Fragment entry point.
    pub fragment_entry_point: Option<Cow<'a, str>>,
    /// Vertex buffer layouts.
    pub vertex_buffers_layout: Cow<'a, [VertexBufferLayoutDescriptor]>,
    /// Rasterizer state.
    pub primitive_state: PrimitiveState,
    /// Depth state.
    pub depth_stencil_state: Option<DepthStencilState>,
    /// Colour targets.
    pub color_target_states: Cow<'a, [ColorTargetState]>,
    /// MSAA sample count.
    pub sample_count: u32,
}
