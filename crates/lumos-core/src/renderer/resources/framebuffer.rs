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

//! Framebuffers: the concrete views a render pass draws into.

use super::render_pass::RenderPassTemplate;
use crate::renderer::api::texture::TextureViewId;
use crate::renderer::error::PipelineError;

/// Inputs of [`Framebuffer::new`].
#[derive(Debug, Clone)]
pub struct FramebufferDesc<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Array layer, cube face or swapchain image the framebuffer targets.
    pub layer: u32,
    /// Colour views in location order.
    pub colour_views: Vec<TextureViewId>,
    /// Depth view.
    pub depth_view: Option<TextureViewId>,
    /// Template the views must match.
    pub render_pass: &'a RenderPassTemplate,
}

/// A set of attachment views matching a [`RenderPassTemplate`].
///
/// Views are borrowed by id; the textures are owned by whoever built the
/// framebuffer (a pipeline or a lane).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    layer: u32,
    colour_views: Vec<TextureViewId>,
    depth_view: Option<TextureViewId>,
}

impl Framebuffer {
    /// Builds a framebuffer, checking it against the template's attachments.
    pub fn new(desc: FramebufferDesc<'_>) -> Result<Self, PipelineError> {
        let expected_colour = desc.render_pass.colour_formats().len();
        let name = &desc.render_pass.desc().debug_name;
        if desc.colour_views.len() != expected_colour {
            return Err(PipelineError::MissingAttachment(format!(
                "framebuffer for '{}' has {} colour views, expected {}",
                name,
                desc.colour_views.len(),
                expected_colour
            )));
        }
        if desc.depth_view.is_some() != desc.render_pass.depth_format().is_some() {
            return Err(PipelineError::MissingAttachment(format!(
                "framebuffer for '{name}' depth view does not match the pass"
            )));
        }
        Ok(Self {
            width: desc.width,
            height: desc.height,
            layer: desc.layer,
            colour_views: desc.colour_views,
            depth_view: desc.depth_view,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Targeted layer, face or swapchain image.
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Colour views in location order.
    pub fn colour_views(&self) -> &[TextureViewId] {
        &self.colour_views
    }

    /// Depth view.
    pub fn depth_view(&self) -> Option<TextureViewId> {
        self.depth_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::format::RhiFormat;
    use crate::renderer::resources::render_pass::{AttachmentInfo, AttachmentKind, RenderPassDesc};

    #[test]
    fn view_count_must_match_the_template() {
        let template = RenderPassTemplate::new(RenderPassDesc {
            attachments: vec![AttachmentInfo {
                kind: AttachmentKind::DepthArray,
                format: RhiFormat::D32Float,
            }],
            clear: true,
            swapchain_target: false,
            debug_name: "shadow".to_string(),
        })
        .unwrap();

        let ok = Framebuffer::new(FramebufferDesc {
            width: 1024,
            height: 1024,
            layer: 2,
            colour_views: Vec::new(),
            depth_view: Some(TextureViewId(7)),
            render_pass: &template,
        })
        .unwrap();
        assert_eq!(ok.layer(), 2);

        assert!(Framebuffer::new(FramebufferDesc {
            width: 1024,
            height: 1024,
            layer: 0,
            colour_views: vec![TextureViewId(1)],
            depth_view: Some(TextureViewId(7)),
            render_pass: &template,
        })
        .is_err());
    }
}
