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

//! A CPU device with no GPU behind it.
//!
//! Resources live in memory and every recorded command is kept per
//! submission, so lanes can be driven and inspected in CI. Binding follows
//! the OpenGL model: each bind group entry is resolved to a flat texture
//! unit, sampler unit or uniform block slot when the group is bound.
//! Clears, buffer copies and texture uploads are applied to memory; draws
//! are only recorded.

mod command;
mod device;

pub use self::command::{HeadlessCommand, RecordedSubmission};
pub use self::device::{HeadlessConfig, HeadlessDevice};
