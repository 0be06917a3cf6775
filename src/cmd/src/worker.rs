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

//! `fpcoord worker`: the one-shot entry point a `ClusterJobSpawner`-submitted
//! pod runs (§6). Reads `NAME`/`CONFIG`/`TASK_INDEX` from the environment,
//! looks the runner up by name, and awaits its completion.
//!
//! `ETCD_ENDPOINTS` is also set on every worker pod per §6 but is unused
//! here: the in-memory providers this workspace ships (§1) are resolved by
//! process-local name lookup, not by reconnecting to an external store, so a
//! worker pod only completes successfully when it happens to share a
//! process with the coordinator that registered those providers (i.e. under
//! `LocalJobSpawner`). A real warehouse/online-store driver would read
//! `ETCD_ENDPOINTS` (or its own connection string) here instead.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fpcoord_meta::runner::registry::RunnerRegistry;
use fpcoord_meta::runner::{MaterializedChunkRunnerConfig, RUNNER_COPY_TO_ONLINE};
use fpcoord_meta::watcher::Watcher;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let name = std::env::var("NAME").map_err(|_| anyhow::anyhow!("NAME environment variable not set"))?;
    let config_b64 = std::env::var("CONFIG").map_err(|_| anyhow::anyhow!("CONFIG environment variable not set"))?;
    let mut config = BASE64.decode(config_b64.as_bytes())?;
    let task_index: Option<u64> = std::env::var("TASK_INDEX").ok().and_then(|s| s.parse().ok());

    info!(runner = %name, task_index, "starting worker");

    // A `COPY_TO_ONLINE` cluster job carries one config shared by every
    // sharded task (§4.2 step 5); each pod's own chunk is its `TASK_INDEX`.
    if name == RUNNER_COPY_TO_ONLINE {
        if let Some(task_index) = task_index {
            let mut chunk_config: MaterializedChunkRunnerConfig = serde_json::from_slice(&config)?;
            chunk_config.chunk_index = task_index;
            config = serde_json::to_vec(&chunk_config)?;
        }
    }

    let registry = RunnerRegistry::new();
    fpcoord_meta::runner::copy_to_online::register(&registry)?;
    fpcoord_meta::runner::materialize::register(&registry)?;
    fpcoord_meta::runner::create_transformation::register(&registry)?;
    fpcoord_meta::runner::create_training_set::register(&registry)?;

    let runner = registry.create(&name, &config)?;
    let watcher = runner.run().await;
    watcher.wait().await?;

    info!(runner = %name, "worker finished");
    Ok(())
}
