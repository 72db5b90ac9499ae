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

//! Cubemap textures (environment and irradiance maps).

use super::texture::{TextureObjects, TextureParameters};
use crate::renderer::api::format::RhiFormat;
use crate::renderer::api::texture::{
    Extent3d, Origin3d, SamplerId, TextureDataLayout, TextureDescriptor, TextureDimension,
    TextureId, TextureUsage, TextureViewDescriptor, TextureViewDimension, TextureViewId,
};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;
use std::sync::Arc;

/// Number of faces of a cubemap, in `+X, -X, +Y, -Y, +Z, -Z` order.
pub const CUBE_FACES: usize = 6;

/// A six-layer cubemap with a `Cube` view for sampling and one 2D view per
/// face for rendering.
#[derive(Debug)]
pub struct TextureCube {
    name: String,
    size: u32,
    mip_levels: u32,
    format: RhiFormat,
    objects: TextureObjects,
}

impl TextureCube {
    /// Creates an empty cubemap usable as a render target.
    pub fn create(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        size: u32,
        mip_levels: u32,
        parameters: TextureParameters,
    ) -> Result<Self, ResourceError> {
        if size == 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "cubemap '{name}' has a zero size"
            )));
        }
        let format = parameters.effective_format();
        let mip_levels = mip_levels.max(1);
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed(name)),
            size: Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: CUBE_FACES as u32,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_DST
                | TextureUsage::RENDER_ATTACHMENT,
        })?;

        let mut objects = TextureObjects {
            device: device.clone(),
            texture,
            views: Vec::with_capacity(CUBE_FACES + 1),
            sampler: SamplerId(0),
        };
        let built = (|| {
            objects.views.push(device.create_texture_view(
                texture,
                &TextureViewDescriptor {
                    label: Some(Cow::Owned(format!("{name}_cube"))),
                    dimension: Some(TextureViewDimension::Cube),
                    array_layer_count: Some(CUBE_FACES as u32),
                    ..Default::default()
                },
            )?);
            for face in 0..CUBE_FACES as u32 {
                objects.views.push(device.create_texture_view(
                    texture,
                    &TextureViewDescriptor {
                        label: Some(Cow::Owned(format!("{name}_face{face}"))),
                        dimension: Some(TextureViewDimension::D2),
                        base_array_layer: face,
                        array_layer_count: Some(1),
                        mip_level_count: Some(1),
                        ..Default::default()
                    },
                )?);
            }
            objects.sampler = device.create_sampler(&parameters.sampler_descriptor(name))?;
            Ok::<(), ResourceError>(())
        })();

        if let Err(e) = built {
            for view in objects.views.drain(..) {
                let _ = device.destroy_texture_view(view);
            }
            let _ = device.destroy_texture(texture);
            return Err(e);
        }

        log::debug!("TextureCube '{}': created {}x{} ({} mips)", name, size, size, mip_levels);
        Ok(Self {
            name: name.to_string(),
            size,
            mip_levels,
            format,
            objects,
        })
    }

    /// Creates a cubemap from six square faces of `size * size` texels each.
    ///
    /// ## Errors
    ///
    /// [`ResourceError::DataSizeMismatch`] if any face has the wrong length.
    pub fn from_faces(
        device: &Arc<dyn GraphicsDevice>,
        name: &str,
        size: u32,
        faces: [&[u8]; CUBE_FACES],
        parameters: TextureParameters,
    ) -> Result<Self, ResourceError> {
        let expected = size as usize * size as usize * parameters.format.bytes_per_pixel() as usize;
        if let Some(face) = faces.iter().find(|f| f.len() != expected) {
            return Err(ResourceError::DataSizeMismatch {
                expected,
                actual: face.len(),
            });
        }
        let cube = Self::create(device, name, size, 1, parameters)?;
        for (layer, face) in faces.iter().enumerate() {
            cube.write_face(layer as u32, face)?;
        }
        Ok(cube)
    }

    fn write_face(&self, layer: u32, pixels: &[u8]) -> Result<(), ResourceError> {
        self.objects.device.write_texture(
            self.objects.texture,
            pixels,
            TextureDataLayout {
                bytes_per_row: Some(self.size * self.format.bytes_per_pixel()),
                rows_per_image: Some(self.size),
            },
            Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            Extent3d::d2(self.size, self.size),
        )
    }

    /// Edge length of a face in texels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Storage format.
    pub fn format(&self) -> RhiFormat {
        self.format
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend texture handle.
    pub fn id(&self) -> TextureId {
        self.objects.texture
    }

    /// The `Cube` view used for sampling.
    pub fn view(&self) -> TextureViewId {
        self.objects.views[0]
    }

    /// The 2D view of one face, used as a render target.
    pub fn face_view(&self, face: usize) -> Option<TextureViewId> {
        (face < CUBE_FACES).then(|| self.objects.views[face + 1])
    }

    /// Sampler built from the creation parameters.
    pub fn sampler(&self) -> SamplerId {
        self.objects.sampler
    }
}

impl Drop for TextureCube {
    fn drop(&mut self) {
        self.objects.release(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockDevice;

    #[test]
    fn faces_upload_to_their_layers() {
        let (mock, device) = MockDevice::shared();
        let faces: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 4]).collect();
        let refs = [
            faces[0].as_slice(),
            faces[1].as_slice(),
            faces[2].as_slice(),
            faces[3].as_slice(),
            faces[4].as_slice(),
            faces[5].as_slice(),
        ];
        let cube =
            TextureCube::from_faces(&device, "sky", 1, refs, TextureParameters::default()).unwrap();

        assert_eq!(mock.texture_layer(cube.id(), 3).unwrap(), vec![3u8; 4]);
        assert!(cube.face_view(5).is_some());
        assert!(cube.face_view(6).is_none());
        assert_ne!(cube.view(), cube.face_view(0).unwrap());
    }

    #[test]
    fn wrong_face_size_is_rejected() {
        let (_mock, device) = MockDevice::shared();
        let good = [0u8; 16];
        let bad = [0u8; 8];
        let result = TextureCube::from_faces(
            &device,
            "sky",
            2,
            [&good, &good, &bad, &good, &good, &good],
            TextureParameters::default(),
        );
        assert!(matches!(
            result,
            Err(ResourceError::DataSizeMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }
}
