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

//! Render pass templates: attachment formats and load behaviour.

use super::framebuffer::Framebuffer;
use crate::math::LinearRgba;
use crate::renderer::api::command::{
    Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
};
use crate::renderer::api::format::RhiFormat;
use crate::renderer::error::PipelineError;
use crate::renderer::traits::{CommandEncoder, RenderPass};

/// Role of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// Colour target.
    Colour,
    /// Single-layer depth buffer.
    Depth,
    /// One layer of a depth array.
    DepthArray,
    /// One face of a cubemap.
    Cube,
}

impl AttachmentKind {
    /// Whether the attachment holds depth.
    pub fn is_depth(&self) -> bool {
        matches!(self, AttachmentKind::Depth | AttachmentKind::DepthArray)
    }
}

/// One attachment of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentInfo {
    /// Role.
    pub kind: AttachmentKind,
    /// Texel format.
    pub format: RhiFormat,
}

/// Describes the attachments of a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    /// Attachments in order; colour attachments keep their relative order as
    /// shader output locations.
    pub attachments: Vec<AttachmentInfo>,
    /// Clear attachments when the pass begins; otherwise load them.
    pub clear: bool,
    /// Whether the colour output is the swapchain image.
    pub swapchain_target: bool,
    /// Debug name.
    pub debug_name: String,
}

/// A validated [`RenderPassDesc`] that can begin passes on an encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassTemplate {
    desc: RenderPassDesc,
}

impl RenderPassTemplate {
    /// Validates the description.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingAttachment`] if there is no attachment at all,
    /// more than one depth attachment, or a depth attachment with a colour
    /// format.
    pub fn new(desc: RenderPassDesc) -> Result<Self, PipelineError> {
        if desc.attachments.is_empty() {
            return Err(PipelineError::MissingAttachment(format!(
                "render pass '{}' has no attachment",
                desc.debug_name
            )));
        }
        let depth: Vec<_> = desc.attachments.iter().filter(|a| a.kind.is_depth()).collect();
        if depth.len() > 1 {
            return Err(PipelineError::MissingAttachment(format!(
                "render pass '{}' has {} depth attachments",
                desc.debug_name,
                depth.len()
            )));
        }
        if let Some(bad) = desc
            .attachments
            .iter()
            .find(|a| a.kind.is_depth() != a.format.is_depth())
        {
            return Err(PipelineError::MissingAttachment(format!(
                "render pass '{}': {:?} attachment with format {:?}",
                desc.debug_name, bad.kind, bad.format
            )));
        }
        Ok(Self { desc })
    }

    /// The description.
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    /// Formats of the colour attachments, in location order.
    pub fn colour_formats(&self) -> Vec<RhiFormat> {
        self.desc
            .attachments
            .iter()
            .filter(|a| !a.kind.is_depth())
            .map(|a| a.format)
            .collect()
    }

    /// Format of the depth attachment, if any.
    pub fn depth_format(&self) -> Option<RhiFormat> {
        self.desc
            .attachments
            .iter()
            .find(|a| a.kind.is_depth())
            .map(|a| a.format)
    }

    /// Opens a pass drawing into `framebuffer`.
    ///
    /// Colour attachments clear to `clear_colour` and depth to `1.0` when the
    /// template clears; otherwise previous contents are loaded.
    pub fn begin<'e>(
        &self,
        encoder: &'e mut dyn CommandEncoder,
        framebuffer: &Framebuffer,
        clear_colour: LinearRgba,
    ) -> Box<dyn RenderPass<'e> + 'e> {
        let colour_attachments: Vec<_> = framebuffer
            .colour_views()
            .iter()
            .map(|view| RenderPassColorAttachment {
                view: *view,
                resolve_target: None,
                ops: if self.desc.clear {
                    Operations::clear(clear_colour)
                } else {
                    Operations::load()
                },
            })
            .collect();
        let depth_attachment = framebuffer
            .depth_view()
            .map(|view| RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(if self.desc.clear {
                    Operations::clear(1.0)
                } else {
                    Operations::load()
                }),
            });
        encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some(&self.desc.debug_name),
            color_attachments: &colour_attachments,
            depth_stencil_attachment: depth_attachment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(attachments: Vec<AttachmentInfo>) -> RenderPassDesc {
        RenderPassDesc {
            attachments,
            clear: true,
            swapchain_target: false,
            debug_name: "test".to_string(),
        }
    }

    #[test]
    fn splits_colour_and_depth_formats() {
        let template = RenderPassTemplate::new(desc(vec![
            AttachmentInfo {
                kind: AttachmentKind::Colour,
                format: RhiFormat::R16G16B16A16Float,
            },
            AttachmentInfo {
                kind: AttachmentKind::Depth,
                format: RhiFormat::D32Float,
            },
            AttachmentInfo {
                kind: AttachmentKind::Colour,
                format: RhiFormat::R8G8B8A8Unorm,
            },
        ]))
        .unwrap();
        assert_eq!(
            template.colour_formats(),
            vec![RhiFormat::R16G16B16A16Float, RhiFormat::R8G8B8A8Unorm]
        );
        assert_eq!(template.depth_format(), Some(RhiFormat::D32Float));
    }

    #[test]
    fn rejects_invalid_attachment_sets() {
        assert!(RenderPassTemplate::new(desc(Vec::new())).is_err());
        let depth = AttachmentInfo {
            kind: AttachmentKind::Depth,
            format: RhiFormat::D32Float,
        };
        assert!(RenderPassTemplate::new(desc(vec![depth, depth])).is_err());
        assert!(RenderPassTemplate::new(desc(vec![AttachmentInfo {
            kind: AttachmentKind::Colour,
            format: RhiFormat::D16Unorm,
        }]))
        .is_err());
    }
}
