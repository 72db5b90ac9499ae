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

//! A typed blackboard lanes use to hand outputs to later lanes.

use super::cascades::ShadowData;
use lumos_core::renderer::resources::{Texture2D, TextureDepth, TextureDepthArray};
use lumos_core::renderer::RenderError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Values shared between the lanes of one [`FrameGraph`](super::FrameGraph),
/// keyed by their concrete type.
///
/// Producers insert during `initialise` (targets) or `begin_scene`
/// (per-frame data); consumers read in later lanes. A lane that needs an
/// entry nobody produced reports it through [`require`](Self::require).
#[derive(Default)]
pub struct LaneResources {
    data: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl LaneResources {
    /// Creates an empty blackboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a shared reference to a value by type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.data.get(&TypeId::of::<T>())?.downcast_ref()
    }

    /// Returns a mutable reference to a value by type.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Like [`get`](Self::get), failing with a message naming the type.
    pub fn require<T: Any>(&self) -> Result<&T, RenderError> {
        self.get::<T>().ok_or_else(|| {
            RenderError::RenderingFailed(format!(
                "{} was not produced by any earlier lane",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Checks whether a value of the given type is present.
    pub fn contains<T: Any>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns a value by type.
    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast().ok().map(|b| *b))
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl fmt::Debug for LaneResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneResources")
            .field("entries", &self.data.len())
            .finish()
    }
}

/// Cascade depth layers and this frame's cascade data, produced by the
/// shadow lane.
#[derive(Debug, Clone)]
pub struct ShadowMaps {
    /// One depth layer per cascade.
    pub array: Arc<TextureDepthArray>,
    /// Matrices and splits of the current frame.
    pub data: ShadowData,
}

/// Geometry buffer written by the deferred offscreen lane.
#[derive(Debug, Clone)]
pub struct GBuffer {
    /// Linear albedo; alpha carries the emissive factor.
    pub albedo: Arc<Texture2D>,
    /// World position; `w` is 1 where geometry was drawn.
    pub position: Arc<Texture2D>,
    /// World normal.
    pub normal: Arc<Texture2D>,
    /// Metallic, roughness, ambient occlusion, reflectance.
    pub pbr: Arc<Texture2D>,
    /// Depth of the geometry pass.
    pub depth: Arc<TextureDepth>,
}

/// Depth buffer shared by every lane drawing into the swapchain.
#[derive(Debug, Clone)]
pub struct SceneDepth(pub Arc<TextureDepth>);

/// Swapchain image acquired for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_keyed_by_type() {
        let mut resources = LaneResources::new();
        resources.insert(SwapchainImage(2));
        resources.insert(5u32);
        assert_eq!(resources.get::<SwapchainImage>(), Some(&SwapchainImage(2)));
        assert_eq!(resources.get::<u32>(), Some(&5));

        resources.insert(SwapchainImage(0));
        assert_eq!(resources.get::<SwapchainImage>(), Some(&SwapchainImage(0)));

        if let Some(value) = resources.get_mut::<u32>() {
            *value += 1;
        }
        assert_eq!(resources.remove::<u32>(), Some(6));
        assert!(!resources.contains::<u32>());
    }

    #[test]
    fn require_names_the_missing_type() {
        let resources = LaneResources::new();
        let err = resources.require::<SwapchainImage>().unwrap_err();
        assert!(err.to_string().contains("SwapchainImage"));
    }
}
