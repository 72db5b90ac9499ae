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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::shader::{ShaderModuleId, ShaderStage};
use crate::renderer::shader::FLAT_BINDINGS_PER_SET;
use std::fmt;

/// An error related to loading, preprocessing or compiling a shader.
#[derive(Debug)]
pub enum ShaderError {
    /// The shader source (or one of its includes) could not be read.
    LoadError {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error text.
        source_error: String,
    },
    /// Preprocessing, parsing or validation failed.
    CompilationError {
        /// Shader label.
        label: String,
        /// Compiler output.
        details: String,
    },
    /// The backend cannot run this stage.
    UnsupportedStage {
        /// Shader label.
        label: String,
        /// Rejected stage.
        stage: ShaderStage,
    },
    /// The requested shader module does not exist.
    NotFound {
        /// Missing module.
        id: ShaderModuleId,
    },
    /// The entry point is not declared by the module.
    InvalidEntryPoint {
        /// Module.
        id: ShaderModuleId,
        /// Entry point that was not found.
        entry_point: String,
    },
    /// No push-constant block or member with this name exists.
    UnknownPushConstant {
        /// Requested name.
        name: String,
    },
    /// A texture or sampler binding does not fit its set's flat slot range.
    BindingOutOfRange {
        /// Descriptor set.
        set: u32,
        /// Binding index inside the set.
        binding: u32,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::LoadError { path, source_error } => {
                write!(
                    f,
                    "Failed to load shader source from '{path}': {source_error}"
                )
            }
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader compilation failed for '{label}': {details}")
            }
            ShaderError::UnsupportedStage { label, stage } => {
                write!(
                    f,
                    "Shader '{label}' uses the {stage} stage, which this backend cannot run"
                )
            }
            ShaderError::NotFound { id } => {
                write!(f, "Shader module not found for ID: {id:?}")
            }
            ShaderError::InvalidEntryPoint { id, entry_point } => {
                write!(
                    f,
                    "Invalid entry point '{entry_point}' for shader module {id:?}"
                )
            }
            ShaderError::UnknownPushConstant { name } => {
                write!(f, "No push constant named '{name}'")
            }
            ShaderError::BindingOutOfRange { set, binding } => {
                write!(
                    f,
                    "Binding {binding} of set {set} exceeds the {FLAT_BINDINGS_PER_SET} texture and sampler slots per set"
                )
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation of a graphics pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The pipeline layout could not be derived from reflection.
    LayoutCreationFailed(String),
    /// The backend failed to compile the pipeline.
    CompilationFailed {
        /// Pipeline label.
        label: Option<String>,
        /// Backend message.
        details: String,
    },
    /// A shader module referenced by the pipeline is missing.
    InvalidShaderModuleForPipeline {
        /// Missing module.
        id: ShaderModuleId,
        /// Pipeline label.
        pipeline_label: Option<String>,
    },
    /// The pipeline id is unknown.
    InvalidRenderPipeline {
        /// Unknown id.
        id: RenderPipelineId,
    },
    /// A pipeline that needs a render target was described without one.
    MissingAttachment(String),
    /// A CPU-side uniform layout disagrees with the shader's declaration.
    LayoutMismatch {
        /// Uniform block name.
        block: String,
        /// Description of every disagreement.
        details: String,
    },
    /// A required device feature is unavailable.
    FeatureNotSupported(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::LayoutCreationFailed(msg) => {
                write!(f, "Pipeline layout creation failed: {msg}")
            }
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
            PipelineError::InvalidShaderModuleForPipeline { id, pipeline_label } => {
                write!(
                    f,
                    "Invalid shader module {:?} for pipeline '{}'",
                    id,
                    pipeline_label.as_deref().unwrap_or("Unknown")
                )
            }
            PipelineError::InvalidRenderPipeline { id } => {
                write!(f, "Invalid render pipeline ID: {id:?}")
            }
            PipelineError::MissingAttachment(msg) => {
                write!(f, "Pipeline is missing a render target: {msg}")
            }
            PipelineError::LayoutMismatch { block, details } => {
                write!(f, "Uniform block '{block}' does not match the shader: {details}")
            }
            PipelineError::FeatureNotSupported(msg) => {
                write!(f, "Feature not supported: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A resource could not be found.
    NotFound,
    /// The handle used to reference a resource is invalid.
    InvalidHandle,
    /// An error originating from the backend implementation.
    BackendError(String),
    /// Access outside a resource's bounds.
    OutOfBounds,
    /// Uploaded data does not match the resource's size.
    DataSizeMismatch {
        /// Bytes the resource holds.
        expected: usize,
        /// Bytes that were supplied.
        actual: usize,
    },
    /// Two descriptors in one set share a binding index.
    DuplicateBinding {
        /// Offending binding.
        binding: u32,
    },
    /// A file-backed resource failed to load.
    LoadFailed {
        /// Path of the file.
        path: String,
        /// Reason reported by the loader.
        reason: String,
    },
    /// A named uniform member or descriptor does not exist.
    UnknownUniform(String),
    /// The descriptor is malformed for the requested operation.
    InvalidDescriptor(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => {
                write!(f, "Resource access out of bounds.")
            }
            ResourceError::DataSizeMismatch { expected, actual } => {
                write!(f, "Data size mismatch: expected {expected} bytes, got {actual}")
            }
            ResourceError::DuplicateBinding { binding } => {
                write!(f, "Binding {binding} is used more than once in a descriptor set")
            }
            ResourceError::LoadFailed { path, reason } => {
                write!(f, "Failed to load '{path}': {reason}")
            }
            ResourceError::UnknownUniform(name) => write!(f, "Unknown uniform '{name}'"),
            ResourceError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error raised while driving frames and passes.
#[derive(Debug)]
pub enum RenderError {
    /// A failure occurred during backend initialization.
    InitializationFailed(String),
    /// A critical rendering operation failed.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// A pass method was called out of order.
    InvalidPassTransition {
        /// Pass name.
        pass: String,
        /// Phase the pass was in.
        from: String,
        /// Requested phase.
        to: String,
    },
    /// A frame-in-flight slot was used in the wrong fence state.
    InvalidFrameState(String),
    /// The graphics device was lost.
    DeviceLost,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize graphics backend: {msg}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::InvalidPassTransition { pass, from, to } => {
                write!(f, "Pass '{pass}' cannot go from {from} to {to}")
            }
            RenderError::InvalidFrameState(msg) => {
                write!(f, "Invalid frame-in-flight state: {msg}")
            }
            RenderError::DeviceLost => write!(
                f,
                "The graphics device was lost and needs to be reinitialized."
            ),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<ShaderError> for RenderError {
    fn from(err: ShaderError) -> Self {
        RenderError::ResourceError(err.into())
    }
}

impl From<PipelineError> for RenderError {
    fn from(err: PipelineError) -> Self {
        RenderError::ResourceError(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::LoadError {
            path: "shaders/forward.wgsl".to_string(),
            source_error: "File not found".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Failed to load shader source from 'shaders/forward.wgsl': File not found"
        );
    }

    #[test]
    fn resource_error_display_wrapping_shader_error() {
        let res_err: ResourceError = ShaderError::NotFound {
            id: ShaderModuleId(42),
        }
        .into();
        assert_eq!(
            format!("{res_err}"),
            "Shader resource error: Shader module not found for ID: ShaderModuleId(42)"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn render_error_chains_to_the_root_cause() {
        let render_err: RenderError = ShaderError::NotFound {
            id: ShaderModuleId(7),
        }
        .into();
        let resource = render_err.source().unwrap();
        assert!(resource.source().is_some());
    }

    #[test]
    fn size_mismatch_reports_both_sizes() {
        let err = ResourceError::DataSizeMismatch {
            expected: 16,
            actual: 12,
        };
        assert_eq!(err.to_string(), "Data size mismatch: expected 16 bytes, got 12");
    }
}
