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

//! The `CREATE_TRANSFORMATION` runner: the cron-triggered rerun of a
//! scheduled transformation (§4.4, §4.6). The SQL has already been resolved
//! against its dependencies' canonical tables at submission time (§4.5);
//! the worker just hands it to the offline provider again.

use std::sync::Arc;

use async_trait::async_trait;
use fpcoord_common::Error;

use super::registry::{RunnerFactory, RunnerRegistry};
use super::{CreateTransformationRunnerConfig, Runner, RUNNER_CREATE_TRANSFORMATION};
use crate::provider::memory::MemoryOfflineStore;
use crate::provider::{OfflineStore, OfflineStoreRef};
use crate::watcher::{watch_task, WatcherRef};

struct CreateTransformationRunner {
    config: CreateTransformationRunnerConfig,
    offline: OfflineStoreRef,
}

#[async_trait]
impl Runner for CreateTransformationRunner {
    fn name(&self) -> &'static str {
        RUNNER_CREATE_TRANSFORMATION
    }

    async fn run(self: Box<Self>) -> WatcherRef {
        let CreateTransformationRunner { config, offline } = *self;
        watch_task(async move {
            offline.create_transformation(&config.resource_id, &config.resolved_sql).await?;
            Ok(())
        })
    }
}

fn resolve_offline(config: &CreateTransformationRunnerConfig) -> fpcoord_common::Result<OfflineStoreRef> {
    match config.offline_type.as_str() {
        "memory_offline" => {
            let name = config
                .offline_config
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::ProviderNotFound("memory_offline config missing `name`".into()))?;
            MemoryOfflineStore::lookup(name)
                .map(|s| s as OfflineStoreRef)
                .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
        }
        other => Err(Error::ProviderNotFound(other.to_string())),
    }
}

pub fn register(registry: &RunnerRegistry) -> fpcoord_common::Result<()> {
    let factory: RunnerFactory = Arc::new(|bytes: &[u8]| {
        let config: CreateTransformationRunnerConfig =
            serde_json::from_slice(bytes).map_err(|e| Error::Provider(e.into()))?;
        let offline = resolve_offline(&config)?;
        Ok(Box::new(CreateTransformationRunner { config, offline }) as Box<dyn Runner>)
    });
    registry.register(RUNNER_CREATE_TRANSFORMATION, factory)
}

#[cfg(test)]
mod tests {
    use fpcoord_common::{ResourceId, ResourceKind};

    use super::*;
    use crate::provider::Provider;

    #[tokio::test]
    async fn reruns_transformation_with_already_resolved_sql() {
        let offline = MemoryOfflineStore::new("create-transformation-test");
        let registry = RunnerRegistry::new();
        register(&registry).unwrap();

        let config = CreateTransformationRunnerConfig {
            offline_type: offline.provider_type().to_string(),
            offline_config: offline.config(),
            resource_id: ResourceId::new(ResourceKind::Transformation, "cron_transform", "v1"),
            resolved_sql: "select * from \"orders\"".into(),
        };
        let bytes = serde_json::to_vec(&config).unwrap();
        let runner = registry.create(RUNNER_CREATE_TRANSFORMATION, &bytes).unwrap();
        let watcher = runner.run().await;
        watcher.wait().await.unwrap();
    }
}
