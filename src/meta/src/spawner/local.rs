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

//! The in-process job spawner: looks up the factory in the [`RunnerRegistry`]
//! and instantiates the runner directly, with no cluster object to manage
//! (§4.4).

use std::sync::Arc;

use async_trait::async_trait;
use fpcoord_common::{ResourceId, Result, Schedule};
use tracing::warn;

use super::{ClusterJobSpec, JobSpawner};
use crate::runner::registry::RunnerRegistry;
use crate::runner::Runner;

pub struct LocalJobSpawner {
    registry: Arc<RunnerRegistry>,
}

impl LocalJobSpawner {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl JobSpawner for LocalJobSpawner {
    async fn get_job_runner(
        &self,
        name: &str,
        config: &[u8],
        _resource_id: &ResourceId,
        _spec: ClusterJobSpec,
    ) -> Result<Box<dyn Runner>> {
        self.registry.create(name, config)
    }

    async fn ensure_cron_job(
        &self,
        _name: &str,
        _config: &[u8],
        resource_id: &ResourceId,
        schedule: &Schedule,
    ) -> Result<()> {
        // The in-process spawner has no scheduler of its own (§9: scheduling
        // is delegated to cluster-native cron objects). A schedule on a
        // resource running under the local spawner is accepted but inert;
        // operators running local mode are expected to drive re-runs
        // externally (e.g. a host cron calling the client SDK).
        if schedule.is_scheduled() {
            warn!(
                resource = %resource_id,
                schedule = schedule.expr().unwrap_or_default(),
                "local job spawner has no cron primitive; schedule will not fire automatically"
            );
        }
        Ok(())
    }
}
