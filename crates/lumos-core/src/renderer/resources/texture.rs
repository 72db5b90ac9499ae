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

//! Two-dimensional textures.

use crate::renderer::api::format::RhiFormat;
use crate::renderer::api::texture::{
    AddressMode, Extent3d, FilterMode, Origin3d, SamplerDescriptor, SamplerId, TextureDataLayout,
    TextureDescriptor, TextureDimension, TextureId, TextureUsage, TextureViewDescriptor,
    TextureViewId,
};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

/// Sampling and storage parameters of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureParameters {
    /// Storage format. Colour formats are switched to their sRGB variant when
    /// `srgb` is set.
    pub format: RhiFormat,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Address mode on every axis.
    pub wrap: AddressMode,
    /// Whether texels are stored in sRGB.
    pub srgb: bool,
}

impl Default for TextureParameters {
    fn default() -> Self {
        Self {
            format: RhiFormat::R8G8B8A8Unorm,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            wrap: AddressMode::Repeat,
            srgb: false,
        }
    }
}

impl TextureParameters {
    /// The format textures are actually created with.
    pub fn effective_format(&self) -> RhiFormat {
        self.format.with_srgb(self.srgb)
    }

    /// Parameters for sRGB colour maps (albedo, emissive).
    pub fn srgb_colour() -> Self {
        Self {
            srgb: true,
            ..Default::default()
        }
    }

    /// Parameters for render targets sampled once per pixel.
    pub fn render_target(format: RhiFormat) -> Self {
        Self {
            format,
            wrap: AddressMode::ClampToEdge,
            ..Default::default()
        }
    }

    pub(crate) fn sampler_descriptor<'a>(&self, label: &'a str) -> SamplerDescriptor<'a> {
        SamplerDescriptor {
            label: Some(Cow::Borrowed(label)),
            address_mode_u: self.wrap,
            address_mode_v: self.wrap,
            address_mode_w: self.wrap,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.min_filter,
            ..Default::default()
        }
    }
}

/// Options for decoding image files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Flip rows so the first row is the bottom of the image.
    pub flip_y: bool,
    /// Decode as 32-bit float RGBA regardless of the file extension.
    pub hdr: bool,
}

/// GPU objects backing a texture, released together.
#[derive(Debug)]
pub(crate) struct TextureObjects {
    pub(crate) device: Arc<dyn GraphicsDevice>,
    pub(crate) texture: TextureId,
    pub(crate) views: Vec<TextureViewId>,
    pub(crate) sampler: SamplerId,
}

impl TextureObjects {
    pub(crate) fn release(&mut self, name: &str) {
        for view in self.views.drain(..) {
            if let Err(e) = self.device.destroy_texture_view(view) {
                log::warn!("Texture '{}': failed to destroy view: {}", name, e);
            }
        }
        if let Err(e) = self.device.destroy_sampler(self.sampler) {
            log::warn!("Texture '{}': failed to destroy sampler: {}", name, e);
        }
        if let Err(e) = self.device.destroy_texture(self.texture) {
            log::warn!("Texture '{}': failed to destroy texture: {}", name, e);
        }
    }
}

/// A sampled 2D texture with its default view and sampler.
#[derive(Debug)]
pub struct Texture2D {
    name: String,
    width: u32,
    height: u32,
    format: RhiFormat,
    parameters: TextureParameters,
    objects: TextureObjects,
}

impl Texture2D {
    /// Creates an empty texture, typically a render target filled by a pass.
    ///
    /// `TEXTURE_BINDING` and `COPY_DST` are always added to `usage`.
    pub fn create(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        width: u32,
        height: u32,
        parameters: TextureParameters,
        usage: TextureUsage,
    ) -> Result<Self, ResourceError> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "texture '{name}' has a zero dimension ({width}x{height})"
            )));
        }
        let format = parameters.effective_format();
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed(name)),
            size: Extent3d::d2(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: usage | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = match device.create_texture_view(texture, &TextureViewDescriptor::default()) {
            Ok(view) => view,
            Err(e) => {
                let _ = device.destroy_texture(texture);
                return Err(e);
            }
        };
        let sampler = match device.create_sampler(&parameters.sampler_descriptor(name)) {
            Ok(sampler) => sampler,
            Err(e) => {
                let _ = device.destroy_texture_view(view);
                let _ = device.destroy_texture(texture);
                return Err(e);
            }
        };
        log::debug!("Texture2D '{}': created {}x{} {:?}", name, width, height, format);
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            format,
            parameters,
            objects: TextureObjects {
                device: device.clone(),
                texture,
                views: vec![view],
                sampler,
            },
        })
    }

    /// Creates a texture and uploads `pixels`, which must hold exactly
    /// `width * height * bytes_per_pixel` bytes.
    ///
    /// ## Errors
    ///
    /// [`ResourceError::DataSizeMismatch`] when the pixel buffer has the wrong
    /// length.
    pub fn from_source(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        parameters: TextureParameters,
    ) -> Result<Self, ResourceError> {
        let expected = width as usize * height as usize * parameters.format.bytes_per_pixel() as usize;
        if pixels.len() != expected {
            return Err(ResourceError::DataSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        let texture = Self::create(device, name, width, height, parameters, TextureUsage::empty())?;
        texture.upload(pixels)?;
        Ok(texture)
    }

    /// Decodes an image file and uploads it.
    ///
    /// `.hdr` and `.exr` files, or any file when `options.hdr` is set, are
    /// stored as `R32G32B32A32Float` and the format in `parameters` is
    /// ignored. Other files become 8-bit RGBA.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::LoadFailed`] if the file is missing or cannot
    /// be decoded. The failure is also logged.
    pub fn from_file(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        path: impl AsRef<Path>,
        parameters: TextureParameters,
        options: LoadOptions,
    ) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let load_failed = |reason: String| {
            log::error!("Texture2D '{}': failed to load {}: {}", name, path.display(), reason);
            ResourceError::LoadFailed {
                path: path.display().to_string(),
                reason,
            }
        };

        if !path.exists() {
            return Err(load_failed("file not found".to_string()));
        }
        let mut image = image::open(path).map_err(|e| load_failed(e.to_string()))?;
        if options.flip_y {
            image = image.flipv();
        }

        let is_hdr_file = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("hdr") || e.eq_ignore_ascii_case("exr"))
            .unwrap_or(false);

        let (width, height) = (image.width(), image.height());
        if options.hdr || is_hdr_file {
            let texels = image.to_rgba32f();
            let parameters = TextureParameters {
                format: RhiFormat::R32G32B32A32Float,
                srgb: false,
                ..parameters
            };
            Self::from_source(
                device,
                name,
                width,
                height,
                bytemuck::cast_slice(texels.as_raw()),
                parameters,
            )
        } else {
            let texels = image.to_rgba8();
            let parameters = TextureParameters {
                format: RhiFormat::R8G8B8A8Unorm,
                ..parameters
            };
            Self::from_source(device, name, width, height, texels.as_raw(), parameters)
        }
    }

    /// A 1x1 opaque white texture, bound wherever a material has no map.
    pub fn white(device: &Arc<dyn GraphicsDevice>) -> Result<Self, ResourceError> {
        Self::from_source(
            device,
            "default_white",
            1,
            1,
            &[255, 255, 255, 255],
            TextureParameters::default(),
        )
    }

    /// Overwrites the whole image. Dimensions never change.
    ///
    /// ## Errors
    ///
    /// [`ResourceError::DataSizeMismatch`] unless `pixels` holds exactly
    /// `width * height * bytes_per_pixel` bytes.
    pub fn set_data(&self, pixels: &[u8]) -> Result<(), ResourceError> {
        let expected = self.byte_size();
        if pixels.len() != expected {
            log::error!(
                "Texture2D '{}': set_data with {} bytes, expected {}",
                self.name,
                pixels.len(),
                expected
            );
            return Err(ResourceError::DataSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        self.upload(pixels)
    }

    fn upload(&self, pixels: &[u8]) -> Result<(), ResourceError> {
        self.objects.device.write_texture(
            self.objects.texture,
            pixels,
            TextureDataLayout {
                bytes_per_row: Some(self.width * self.format.bytes_per_pixel()),
                rows_per_image: Some(self.height),
            },
            Origin3d::default(),
            Extent3d::d2(self.width, self.height),
        )
    }

    fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Storage format.
    pub fn format(&self) -> RhiFormat {
        self.format
    }

    /// Parameters the texture was created with.
    pub fn parameters(&self) -> TextureParameters {
        self.parameters
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend texture handle.
    pub fn id(&self) -> TextureId {
        self.objects.texture
    }

    /// Default view covering the whole texture.
    pub fn view(&self) -> TextureViewId {
        self.objects.views[0]
    }

    /// Sampler built from the texture parameters.
    pub fn sampler(&self) -> SamplerId {
        self.objects.sampler
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        self.objects.release(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockDevice;

    #[test]
    fn set_data_keeps_dimensions_and_rejects_mismatched_sizes() {
        let (mock, device) = MockDevice::shared();
        let texture = Texture2D::from_source(
            &device,
            "checker",
            2,
            2,
            &[0u8; 16],
            TextureParameters::default(),
        )
        .unwrap();

        texture.set_data(&[7u8; 16]).unwrap();
        assert_eq!((texture.width(), texture.height()), (2, 2));
        assert_eq!(mock.texture_data(texture.id()).unwrap(), vec![7u8; 16]);

        let err = texture.set_data(&[0u8; 12]).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::DataSizeMismatch {
                expected: 16,
                actual: 12
            }
        ));
        assert_eq!(mock.texture_data(texture.id()).unwrap(), vec![7u8; 16]);
    }

    #[test]
    fn from_source_validates_length() {
        let (_mock, device) = MockDevice::shared();
        let result = Texture2D::from_source(
            &device,
            "short",
            4,
            4,
            &[0u8; 10],
            TextureParameters::default(),
        );
        assert!(matches!(result, Err(ResourceError::DataSizeMismatch { .. })));
    }

    #[test]
    fn srgb_flag_switches_format() {
        let (_mock, device) = MockDevice::shared();
        let texture = Texture2D::create(
            &device,
            "albedo",
            8,
            8,
            TextureParameters::srgb_colour(),
            TextureUsage::empty(),
        )
        .unwrap();
        assert_eq!(texture.format(), RhiFormat::R8G8B8A8Srgb);
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let (_mock, device) = MockDevice::shared();
        let result = Texture2D::from_file(
            &device,
            "missing",
            "does/not/exist.png",
            TextureParameters::default(),
            LoadOptions::default(),
        );
        assert!(matches!(result, Err(ResourceError::LoadFailed { .. })));
    }

    #[test]
    fn drop_releases_every_object() {
        let (mock, device) = MockDevice::shared();
        {
            let _white = Texture2D::white(&device).unwrap();
            assert_eq!(mock.live_objects(), 3);
        }
        assert_eq!(mock.live_objects(), 0);
    }
}
