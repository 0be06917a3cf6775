// Copyright 2026 The Feature Platform Coordinator Authors
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

//! The coordinator-layer error type. Leaf error kinds (not-found,
//! dependency-not-ready, provider failures, ...) come from
//! [`fpcoord_common::Error`]; this layer only adds the one condition that is
//! meaningful solely to a running coordinator loop.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Core(#[from] fpcoord_common::Error),

    /// A suspension point (lock acquire, metadata I/O, provider call,
    /// watcher wait) observed the shutdown signal before completing.
    #[error("coordinator is shutting down")]
    ShuttingDown,
}

impl CoordinatorError {
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, CoordinatorError::ShuttingDown)
    }
}
