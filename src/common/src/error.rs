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

use thiserror::Error;

/// A specialized `Result` for coordinator-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy from §7. `AlreadyExists` and lock contention are
/// deliberately absent: the former is folded into a success-shaped
/// `CreateOutcome` at the provider boundary (§4.1), and the latter is never
/// surfaced past the lock-acquisition call site (§7.7).
#[derive(Error, Debug)]
pub enum Error {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("invalid cast: expected {expected}, provider {provider} is not one")]
    InvalidCast { provider: String, expected: &'static str },

    #[error("unresolved template reference: {0}")]
    TemplateUnresolved(String),

    #[error("dependency not ready: {0}")]
    DependencyNotReady(String),

    #[error("dependency cycle detected starting at {0}")]
    DependencyCycle(String),

    #[error("unknown runner: {0}")]
    UnknownRunner(String),

    #[error("runner already registered: {0}")]
    DuplicateRunner(String),

    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error represents a transient, retryable condition per
    /// §7.4 — the caller should requeue rather than fail the resource.
    pub fn is_dependency_not_ready(&self) -> bool {
        matches!(self, Error::DependencyNotReady(_))
    }
}
