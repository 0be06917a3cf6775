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

use std::time::Duration;

use crate::runner::CloudTag;

/// Process-wide configuration for a coordinator instance. The CLI-facing
/// `clap` struct lives in the `fpcoord_cmd` binary and is converted into
/// this plain config, keeping the library crate free of a CLI dependency.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub cloud: CloudTag,
    pub lease_ttl: Duration,
    /// Backoff before a requeued, dependency-blocked job is re-observed
    /// (§4.6 "ADDED" dependency-not-ready policy).
    pub dependency_backoff: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cloud: CloudTag::Local,
            lease_ttl: crate::lock::DEFAULT_LEASE_TTL,
            dependency_backoff: Duration::from_secs(2),
        }
    }
}

/// How a dependency-not-ready condition is handled, chosen by call site
/// rather than by job kind (§4.6 "ADDED").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Leave the job key in place, release the lock, let the watch loop
    /// observe it again after a backoff.
    Requeue,
    /// Drop the event without advancing `LastUpdated`; the next scheduled
    /// tick will try again.
    Skip,
}
