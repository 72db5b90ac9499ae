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

use crate::renderer::api::command::SubmissionIndex;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::{CommandEncoder, GraphicsDevice};
use std::sync::Arc;

/// A recording command buffer: an encoder plus the device it submits to.
pub struct CommandBuffer {
    device: Arc<dyn GraphicsDevice>,
    encoder: Box<dyn CommandEncoder>,
    label: String,
}

impl CommandBuffer {
    /// Starts recording.
    pub fn begin(device: &Arc<dyn GraphicsDevice>, label: &str) -> Self {
        Self {
            device: device.clone(),
            encoder: device.create_command_encoder(Some(label)),
            label: label.to_string(),
        }
    }

    /// The encoder passes are recorded into.
    pub fn encoder(&mut self) -> &mut dyn CommandEncoder {
        self.encoder.as_mut()
    }

    /// Ends recording and submits the commands.
    pub fn submit(self) -> Result<SubmissionIndex, ResourceError> {
        let id = self.encoder.finish();
        let index = self.device.submit_command_buffer(id)?;
        log::trace!("CommandBuffer '{}': submitted as {:?}", self.label, index);
        Ok(index)
    }

    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
