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

//! Owning wrappers over backend resources.
//!
//! Every wrapper keeps the device that created it and releases its ids when
//! dropped.

pub mod buffers;
pub mod command_buffer;
pub mod descriptor_set;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod texture;
pub mod texture_cube;
pub mod texture_depth;

pub use self::buffers::{BufferMapping, IndexBuffer, UniformBuffer, VertexBuffer};
pub use self::command_buffer::CommandBuffer;
pub use self::descriptor_set::{Descriptor, DescriptorResource, DescriptorSet, DescriptorType};
pub use self::framebuffer::{Framebuffer, FramebufferDesc};
pub use self::pipeline::{Pipeline, PipelineCache, PipelineCacheStats, PipelineDesc};
pub use self::render_pass::{AttachmentInfo, AttachmentKind, RenderPassDesc, RenderPassTemplate};
pub use self::texture::{LoadOptions, Texture2D, TextureParameters};
pub use self::texture_cube::{TextureCube, CUBE_FACES};
pub use self::texture_depth::{TextureDepth, TextureDepthArray, MAX_DEPTH_LAYERS};
