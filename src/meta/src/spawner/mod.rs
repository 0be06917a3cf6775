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

//! The job spawner (C4, §4.4): launches a registered runner, either
//! directly in-process or as a Kubernetes Job/CronJob in a cluster.

pub mod cluster;
pub mod local;

use async_trait::async_trait;
use fpcoord_common::{ResourceId, Result, Schedule};

use crate::runner::Runner;

/// Parallelism and environment a cluster-backed job needs beyond its own
/// config payload (§6 worker environment).
#[derive(Debug, Clone)]
pub struct ClusterJobSpec {
    pub num_tasks: u32,
}

#[async_trait]
pub trait JobSpawner: Send + Sync {
    /// Builds (and, for the cluster variant, submits) a runner for
    /// `name`/`config`. Unknown runner names must error before any
    /// submission (§4.4).
    async fn get_job_runner(
        &self,
        name: &str,
        config: &[u8],
        resource_id: &ResourceId,
        spec: ClusterJobSpec,
    ) -> Result<Box<dyn Runner>>;

    /// Creates (or reconciles) a persistent cron object running `name` with
    /// `config` on `schedule`. A no-op for spawners that have no cluster-
    /// native cron primitive to reuse.
    async fn ensure_cron_job(
        &self,
        name: &str,
        config: &[u8],
        resource_id: &ResourceId,
        schedule: &Schedule,
    ) -> Result<()>;
}
