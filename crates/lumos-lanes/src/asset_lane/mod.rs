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

//! Model loading: OBJ and glTF files turned into [`ModelData`].
//!
//! Loaders only convert what `tobj` and `gltf` parse into engine types:
//! [`MeshData`](lumos_core::renderer::scene::MeshData) per primitive and a
//! [`MaterialDesc`] per material. [`ModelData::instantiate`] then uploads
//! them through a device.

mod gltf_loader;
mod model;
mod obj_loader;

pub use gltf_loader::*;
pub use model::*;
pub use obj_loader::*;

use std::path::Path;

/// A parser for one model format.
///
/// Implementors turn the raw bytes of a file into [`ModelData`]. Files the
/// model references (material libraries, buffers, images) are resolved
/// relative to the loader's base directory.
pub trait ModelLoader: Send + Sync {
    /// Parses `bytes`.
    fn load(&self, bytes: &[u8]) -> Result<ModelData, ModelLoadError>;
}

/// Loads a model file, picking the loader from the extension
/// (`.obj`, `.gltf`, `.glb`).
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelData, ModelLoadError> {
    let path = path.as_ref();
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let loader: Box<dyn ModelLoader> = match extension.as_str() {
        "obj" => Box::new(ObjLoader::new(base)),
        "gltf" | "glb" => Box::new(GltfLoader::new(base)),
        _ => return Err(ModelLoadError::UnsupportedFormat(path.display().to_string())),
    };
    let bytes = std::fs::read(path).map_err(|source| ModelLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let model = loader.load(&bytes)?;
    log::info!(
        "load_model: '{}' loaded ({} meshes, {} materials)",
        path.display(),
        model.meshes.len(),
        model.materials.len()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = load_model("scene.fbx").unwrap_err();
        assert!(matches!(err, ModelLoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_files_report_the_path() {
        let err = load_model("does/not/exist.obj").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.obj"));
    }
}
