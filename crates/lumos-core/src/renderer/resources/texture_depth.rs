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

//! Depth attachments: single-layer depth buffers and layered shadow maps.

use super::texture::TextureObjects;
use crate::renderer::api::format::RhiFormat;
use crate::renderer::api::pipeline::CompareFunction;
use crate::renderer::api::texture::{
    AddressMode, Extent3d, FilterMode, ImageAspect, SamplerDescriptor, SamplerId,
    TextureDescriptor, TextureDimension, TextureId, TextureUsage, TextureViewDescriptor,
    TextureViewDimension, TextureViewId,
};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;
use std::sync::Arc;

/// Maximum number of layers of a [`TextureDepthArray`].
pub const MAX_DEPTH_LAYERS: u32 = 16;

fn build_depth(
    device: &Arc<dyn GraphicsDevice>,
    name: &str,
    width: u32,
    height: u32,
    layers: u32,
    format: RhiFormat,
    comparison: bool,
) -> Result<TextureObjects, ResourceError> {
    if !format.is_depth() {
        return Err(ResourceError::InvalidDescriptor(format!(
            "'{name}' uses non-depth format {format:?}"
        )));
    }
    if width == 0 || height == 0 || layers == 0 {
        return Err(ResourceError::InvalidDescriptor(format!(
            "'{name}' has a zero dimension ({width}x{height}x{layers})"
        )));
    }
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(Cow::Borrowed(name)),
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    })?;

    let mut objects = TextureObjects {
        device: device.clone(),
        texture,
        views: Vec::new(),
        sampler: SamplerId(0),
    };

    let built = (|| {
        // Sampling view first, then one attachment view per layer.
        let sample_dimension = if layers > 1 {
            TextureViewDimension::D2Array
        } else {
            TextureViewDimension::D2
        };
        objects.views.push(device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Owned(format!("{name}_sample"))),
                dimension: Some(sample_dimension),
                aspect: ImageAspect::DepthOnly,
                array_layer_count: Some(layers),
                ..Default::default()
            },
        )?);
        for layer in 0..layers {
            objects.views.push(device.create_texture_view(
                texture,
                &TextureViewDescriptor {
                    label: Some(Cow::Owned(format!("{name}_layer{layer}"))),
                    dimension: Some(TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                },
            )?);
        }
        let filter = if comparison {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };
        objects.sampler = device.create_sampler(&SamplerDescriptor {
            label: Some(Cow::Owned(format!("{name}_sampler"))),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            compare: comparison.then_some(CompareFunction::LessEqual),
            ..Default::default()
        })?;
        Ok::<(), ResourceError>(())
    })();

    if let Err(e) = built {
        for view in objects.views.drain(..) {
            let _ = device.destroy_texture_view(view);
        }
        let _ = device.destroy_texture(texture);
        return Err(e);
    }
    Ok(objects)
}

/// A single depth buffer.
#[derive(Debug)]
pub struct TextureDepth {
    name: String,
    width: u32,
    height: u32,
    format: RhiFormat,
    comparison: bool,
    objects: TextureObjects,
}

impl TextureDepth {
    /// Creates a depth buffer. A `comparison` sampler enables hardware PCF
    /// when the buffer is sampled.
    pub fn create(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        width: u32,
        height: u32,
        format: RhiFormat,
        comparison: bool,
    ) -> Result<Self, ResourceError> {
        let objects = build_depth(device, name, width, height, 1, format, comparison)?;
        log::debug!("TextureDepth '{}': created {}x{} {:?}", name, width, height, format);
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            format,
            comparison,
            objects,
        })
    }

    /// Rebuilds the buffer at a new size. Previous contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let objects = build_depth(
            &self.objects.device,
            &self.name,
            width,
            height,
            1,
            self.format,
            self.comparison,
        )?;
        let mut old = std::mem::replace(&mut self.objects, objects);
        old.release(&self.name);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Depth format.
    pub fn format(&self) -> RhiFormat {
        self.format
    }

    /// Backend texture handle.
    pub fn id(&self) -> TextureId {
        self.objects.texture
    }

    /// Depth-only view used for sampling.
    pub fn sample_view(&self) -> TextureViewId {
        self.objects.views[0]
    }

    /// View used as a render pass attachment.
    pub fn view(&self) -> TextureViewId {
        self.objects.views[1]
    }

    /// Sampler; a comparison sampler if requested at creation.
    pub fn sampler(&self) -> SamplerId {
        self.objects.sampler
    }
}

impl Drop for TextureDepth {
    fn drop(&mut self) {
        self.objects.release(&self.name);
    }
}

/// A layered depth texture, one layer per shadow cascade.
#[derive(Debug)]
pub struct TextureDepthArray {
    name: String,
    width: u32,
    height: u32,
    layers: u32,
    format: RhiFormat,
    objects: TextureObjects,
}

impl TextureDepthArray {
    /// Creates a depth array with `layers` layers (1..=16) and a comparison
    /// sampler.
    pub fn create(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        width: u32,
        height: u32,
        layers: u32,
        format: RhiFormat,
    ) -> Result<Self, ResourceError> {
        if layers > MAX_DEPTH_LAYERS {
            return Err(ResourceError::InvalidDescriptor(format!(
                "'{name}' requests {layers} layers, at most {MAX_DEPTH_LAYERS} are supported"
            )));
        }
        // Always expose an array view, even for a single layer.
        let objects = build_depth(device, name, width, height, layers.max(2), format, true)?;
        log::debug!(
            "TextureDepthArray '{}': created {}x{}x{} {:?}",
            name,
            width,
            height,
            layers,
            format
        );
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            layers,
            format,
            objects,
        })
    }

    /// Width of a layer in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of a layer in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of usable layers.
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Depth format.
    pub fn format(&self) -> RhiFormat {
        self.format
    }

    /// Backend texture handle.
    pub fn id(&self) -> TextureId {
        self.objects.texture
    }

    /// The `D2Array` view sampled by lighting shaders.
    pub fn array_view(&self) -> TextureViewId {
        self.objects.views[0]
    }

    /// The attachment view of one layer.
    pub fn layer_view(&self, layer: u32) -> Option<TextureViewId> {
        (layer < self.layers).then(|| self.objects.views[layer as usize + 1])
    }

    /// Comparison sampler.
    pub fn sampler(&self) -> SamplerId {
        self.objects.sampler
    }
}

impl Drop for TextureDepthArray {
    fn drop(&mut self) {
        self.objects.release(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockDevice;

    #[test]
    fn array_has_one_view_per_layer() {
        let (_mock, device) = MockDevice::shared();
        let array =
            TextureDepthArray::create(&device, "shadow", 512, 512, 4, RhiFormat::D32Float).unwrap();
        let views: Vec<_> = (0..4).map(|l| array.layer_view(l).unwrap()).collect();
        assert_eq!(views.len(), 4);
        assert!(!views.contains(&array.array_view()));
        assert!(array.layer_view(4).is_none());
    }

    #[test]
    fn rejects_colour_formats_and_too_many_layers() {
        let (_mock, device) = MockDevice::shared();
        assert!(TextureDepth::create(&device, "d", 4, 4, RhiFormat::R8G8B8A8Unorm, false).is_err());
        assert!(TextureDepthArray::create(&device, "d", 4, 4, 17, RhiFormat::D32Float).is_err());
    }

    #[test]
    fn resize_replaces_objects() {
        let (mock, device) = MockDevice::shared();
        let mut depth =
            TextureDepth::create(&device, "depth", 16, 16, RhiFormat::D32Float, false).unwrap();
        let before = mock.live_objects();
        let old_id = depth.id();
        depth.resize(32, 8).unwrap();
        assert_ne!(depth.id(), old_id);
        assert_eq!((depth.width(), depth.height()), (32, 8));
        assert_eq!(mock.live_objects(), before);
    }
}
