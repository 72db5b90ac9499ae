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

//! Shader module handles and descriptors.

use std::borrow::Cow;
use std::fmt;

/// An opaque handle to a compiled shader module owned by a [`GraphicsDevice`](crate::renderer::GraphicsDevice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleId(pub usize);

/// A programmable stage of the GPU pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Per-vertex stage.
    Vertex,
    /// Per-fragment stage.
    Fragment,
    /// Per-primitive stage between vertex and fragment.
    Geometry,
    /// General purpose compute stage.
    Compute,
}

impl ShaderStage {
    /// Parses the stage name used after a `#shader` marker.
    pub fn from_marker(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vert" => Some(Self::Vertex),
            "fragment" | "frag" | "pixel" => Some(Self::Fragment),
            "geometry" | "geom" => Some(Self::Geometry),
            "compute" | "comp" => Some(Self::Compute),
            _ => None,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Source code handed to the backend for one stage.
#[derive(Debug, Clone)]
pub enum ShaderSourceData<'a> {
    /// WGSL text.
    Wgsl(Cow<'a, str>),
}

/// Describes a single-stage shader module to be created by the device.
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// Debug label.
    pub label: Option<&'a str>,
    /// Stage this module implements.
    pub stage: ShaderStage,
    /// Preprocessed source.
    pub source: ShaderSourceData<'a>,
    /// Entry point of the stage inside `source`.
    pub entry_point: &'a str,
}
