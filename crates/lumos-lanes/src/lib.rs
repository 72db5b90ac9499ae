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

//! # Lumos Lanes
//!
//! The render lanes executed by a [`FrameGraph`](render_lane::FrameGraph)
//! every frame, the cascade and batching math behind them, and the loaders
//! turning model files into [`MeshData`](lumos_core::renderer::scene::MeshData).

#![warn(missing_docs)]

pub mod asset_lane;
pub mod render_lane;

pub use render_lane::{FrameGraph, LaneResources, PassPhase, PassState, RenderLane, RenderWorld};
