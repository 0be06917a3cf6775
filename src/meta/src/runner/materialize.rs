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

//! The `MATERIALIZE` runner: the cron-triggered re-run of a scheduled
//! feature's materialization (§4.4 "scheduled resources"). Unlike the
//! initial submission, which the coordinator drives directly through
//! [`crate::coordinator::routines::materialize_feature`], a cron tick has no
//! coordinator process attached to it, so this runner reruns the chunked
//! algorithm (§4.2) standalone, fanning its own chunk copies out to an
//! in-process [`LocalJobSpawner`] regardless of where the tick itself was
//! scheduled.

use std::sync::Arc;

use async_trait::async_trait;
use fpcoord_common::Error;
use tracing::info;

use super::registry::{RunnerFactory, RunnerRegistry};
use super::{MaterializeRunnerConfig, Runner, RUNNER_MATERIALIZE};
use crate::provider::memory::{MemoryOfflineStore, MemoryOnlineStore};
use crate::provider::{OfflineStoreRef, OnlineStoreRef};
use crate::spawner::local::LocalJobSpawner;
use crate::watcher::{watch_task, WatcherRef};

struct MaterializeRunner {
    config: MaterializeRunnerConfig,
    offline: OfflineStoreRef,
    online: OnlineStoreRef,
}

#[async_trait]
impl Runner for MaterializeRunner {
    fn name(&self) -> &'static str {
        RUNNER_MATERIALIZE
    }

    async fn run(self: Box<Self>) -> WatcherRef {
        let MaterializeRunner { config, offline, online } = *self;
        watch_task(async move {
            info!(resource = %config.id, cloud = ?config.cloud, "rerunning scheduled materialization");
            let registry = RunnerRegistry::new();
            super::copy_to_online::register(&registry)?;
            let spawner = LocalJobSpawner::new(registry);
            let watcher = crate::coordinator::routines::run_materialization(
                &config.id,
                &config.source_table,
                config.value_type,
                offline,
                online,
                &spawner,
                super::CloudTag::Local,
            )
            .await?;
            watcher.wait().await
        })
    }
}

fn resolve_offline(config: &MaterializeRunnerConfig) -> fpcoord_common::Result<OfflineStoreRef> {
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

fn resolve_online(config: &MaterializeRunnerConfig) -> fpcoord_common::Result<OnlineStoreRef> {
    match config.online_type.as_str() {
        "memory_online" => {
            let name = config
                .online_config
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::ProviderNotFound("memory_online config missing `name`".into()))?;
            MemoryOnlineStore::lookup(name)
                .map(|s| s as OnlineStoreRef)
                .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
        }
        other => Err(Error::ProviderNotFound(other.to_string())),
    }
}

/// Registers the `MATERIALIZE` factory; only meaningful in worker processes
/// that also carry `RUNNER_COPY_TO_ONLINE` (see `materialize_feature` in
/// this module), since a re-materialization always dispatches chunk copies
/// of its own.
pub fn register(registry: &RunnerRegistry) -> fpcoord_common::Result<()> {
    let factory: RunnerFactory = Arc::new(|bytes: &[u8]| {
        let config: MaterializeRunnerConfig = serde_json::from_slice(bytes).map_err(|e| Error::Provider(e.into()))?;
        let offline = resolve_offline(&config)?;
        let online = resolve_online(&config)?;
        Ok(Box::new(MaterializeRunner { config, offline, online }) as Box<dyn Runner>)
    });
    registry.register(RUNNER_MATERIALIZE, factory)
}

#[cfg(test)]
mod tests {
    use fpcoord_common::{ResourceId, ResourceKind, Value, ValueType};

    use super::*;
    use crate::provider::{OfflineStore, OnlineStore, Provider, Row};

    #[tokio::test]
    async fn reruns_materialization_and_lands_every_row_online() {
        let offline = MemoryOfflineStore::new("materialize-test-offline");
        let online = MemoryOnlineStore::new("materialize-test-online");
        offline.seed_external_table(
            "orders_raw",
            vec![
                Row { entity: "a".into(), value: Value::Int(1), ts: 1 },
                Row { entity: "b".into(), value: Value::Int(2), ts: 2 },
            ],
        );

        let id = ResourceId::new(ResourceKind::Feature, "cron_feature", "v1");
        let registry = RunnerRegistry::new();
        register(&registry).unwrap();

        let config = MaterializeRunnerConfig {
            online_type: online.provider_type().to_string(),
            offline_type: offline.provider_type().to_string(),
            online_config: online.config(),
            offline_config: offline.config(),
            id: id.clone(),
            source_table: "orders_raw".into(),
            value_type: ValueType::Int,
            cloud: super::super::CloudTag::Local,
        };
        let bytes = serde_json::to_vec(&config).unwrap();
        let runner = registry.create(RUNNER_MATERIALIZE, &bytes).unwrap();
        let watcher = runner.run().await;
        watcher.wait().await.unwrap();

        let table = online.get_table(&id).await.unwrap().unwrap();
        assert_eq!(table.get("a").await.unwrap(), Some(Value::Int(1)));
        assert_eq!(table.get("b").await.unwrap(), Some(Value::Int(2)));
    }
}
