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

//! The coordinator library: the per-kind dispatch routines, the watch
//! loops that drive them, and every collaborator they sit on (providers,
//! runners, the job spawner, the template resolver, completion watchers,
//! the metadata/coordination client, and distributed locking). The
//! `fpcoord_cmd` binary is a thin CLI wrapper over [`coordinator::Coordinator`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod manager;
pub mod provider;
pub mod runner;
pub mod spawner;
pub mod template;
pub mod watcher;

pub use config::{CoordinatorConfig, DependencyPolicy};
pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
