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

//! Command buffer handles and render pass descriptors.

use crate::math::LinearRgba;
use crate::renderer::api::texture::TextureViewId;

/// An opaque handle to a finished, not yet submitted, command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandBufferId(pub u64);

/// Monotonic index of a queue submission, used to track GPU completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionIndex(pub u64);

/// What happens to an attachment when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<V> {
    /// Keep the previous contents.
    Load,
    /// Clear to a value.
    Clear(V),
}

/// What happens to an attachment when a pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Keep the results.
    Store,
    /// Results may be discarded.
    Discard,
}

/// Load and store operations of an attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operations<V> {
    /// Load operation.
    pub load: LoadOp<V>,
    /// Store operation.
    pub store: StoreOp,
}

impl<V> Operations<V> {
    /// Loads previous contents and stores results.
    pub fn load() -> Self {
        Self {
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Clears to `value` and stores results.
    pub fn clear(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Store,
        }
    }
}

/// A colour attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassColorAttachment {
    /// Rendered view.
    pub view: TextureViewId,
    /// Resolve target for multisampled views.
    pub resolve_target: Option<TextureViewId>,
    /// Load/store behaviour.
    pub ops: Operations<LinearRgba>,
}

/// The depth attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDepthStencilAttachment {
    /// Depth view (one layer for array targets).
    pub view: TextureViewId,
    /// Depth load/store behaviour.
    pub depth_ops: Option<Operations<f32>>,
}

/// Describes a render pass to begin on an encoder.
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor<'a> {
    /// Debug label.
    pub label: Option<&'a str>,
    /// Colour attachments in location order.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// Optional depth attachment.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}
