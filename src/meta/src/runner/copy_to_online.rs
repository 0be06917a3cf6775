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

//! The `COPY_TO_ONLINE` runner (§4.2 step 4): copies one chunk of a
//! materialization's rows into the feature's online table. Reconstructs its
//! offline/online handles from the type tag and config carried in its own
//! serialized payload rather than capturing an `Arc` directly, matching the
//! worker-process contract described on [`crate::provider::Provider`].

use std::sync::Arc;

use async_trait::async_trait;
use fpcoord_common::Error;

use super::registry::{RunnerFactory, RunnerRegistry};
use super::{MaterializedChunkRunnerConfig, Runner, RUNNER_COPY_TO_ONLINE};
use crate::provider::memory::{MemoryOfflineStore, MemoryOnlineStore};
use crate::provider::{OfflineStoreRef, OnlineStoreRef, OnlineTable};
use crate::watcher::{watch_task, WatcherRef};

struct CopyToOnlineRunner {
    config: MaterializedChunkRunnerConfig,
    offline: OfflineStoreRef,
    online: OnlineStoreRef,
}

#[async_trait]
impl Runner for CopyToOnlineRunner {
    fn name(&self) -> &'static str {
        RUNNER_COPY_TO_ONLINE
    }

    async fn run(self: Box<Self>) -> WatcherRef {
        let CopyToOnlineRunner { config, offline, online } = *self;
        watch_task(async move {
            let materialization = offline
                .get_materialization(&config.resource_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("materialization {} vanished mid-copy", config.materialization_id))?;
            let table = online
                .get_table(&config.resource_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("online table for {} vanished mid-copy", config.resource_id))?;
            let offset = config.chunk_index * config.chunk_size;
            let rows = materialization.read_chunk(offset, config.chunk_size).await?;
            for row in rows {
                table.set(&row.entity, row.value).await?;
            }
            Ok(())
        })
    }
}

fn resolve_offline(config: &MaterializedChunkRunnerConfig) -> fpcoord_common::Result<OfflineStoreRef> {
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

fn resolve_online(config: &MaterializedChunkRunnerConfig) -> fpcoord_common::Result<OnlineStoreRef> {
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

/// Registers the `COPY_TO_ONLINE` factory. Call once per process before any
/// job referencing it is dispatched (§4.3).
pub fn register(registry: &RunnerRegistry) -> fpcoord_common::Result<()> {
    let factory: RunnerFactory = Arc::new(|bytes: &[u8]| {
        let config: MaterializedChunkRunnerConfig =
            serde_json::from_slice(bytes).map_err(|e| Error::Provider(e.into()))?;
        let offline = resolve_offline(&config)?;
        let online = resolve_online(&config)?;
        Ok(Box::new(CopyToOnlineRunner { config, offline, online }) as Box<dyn Runner>)
    });
    registry.register(RUNNER_COPY_TO_ONLINE, factory)
}

#[cfg(test)]
mod tests {
    use fpcoord_common::{ResourceId, ResourceKind, Value};

    use super::*;
    use crate::provider::{OfflineStore, OnlineStore, Provider, Row};

    #[tokio::test]
    async fn copies_one_chunk_of_rows_into_the_online_table() {
        let offline = MemoryOfflineStore::new("copy-test-offline");
        let online = MemoryOnlineStore::new("copy-test-online");
        offline.seed_external_table(
            "orders_raw",
            vec![
                Row {
                    entity: "a".into(),
                    value: Value::Int(1),
                    ts: 1,
                },
                Row {
                    entity: "b".into(),
                    value: Value::Int(2),
                    ts: 2,
                },
            ],
        );

        let id = ResourceId::new(ResourceKind::Feature, "copy_test_feature", "v1");
        let materialization = offline.create_materialization(&id, "orders_raw").await.unwrap();
        online.create_table(&id, fpcoord_common::ValueType::Int).await.unwrap();

        let registry = RunnerRegistry::new();
        register(&registry).unwrap();

        let config = MaterializedChunkRunnerConfig {
            online_type: online.provider_type().to_string(),
            offline_type: offline.provider_type().to_string(),
            online_config: online.config(),
            offline_config: offline.config(),
            materialization_id: materialization.id().to_string(),
            resource_id: id.clone(),
            chunk_index: 0,
            chunk_size: 2,
        };
        let bytes = serde_json::to_vec(&config).unwrap();
        let runner = registry.create(RUNNER_COPY_TO_ONLINE, &bytes).unwrap();
        let watcher = runner.run().await;
        watcher.wait().await.unwrap();

        let table = online.get_table(&id).await.unwrap().unwrap();
        assert_eq!(table.get("a").await.unwrap(), Some(Value::Int(1)));
        assert_eq!(table.get("b").await.unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn unknown_provider_type_errors_before_dispatch() {
        let config = MaterializedChunkRunnerConfig {
            online_type: "some_cloud_kv".into(),
            offline_type: "some_cloud_warehouse".into(),
            online_config: serde_json::json!({}),
            offline_config: serde_json::json!({}),
            materialization_id: "x".into(),
            resource_id: ResourceId::new(ResourceKind::Feature, "f", "v1"),
            chunk_index: 0,
            chunk_size: 1,
        };
        let err = match resolve_offline(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, Error::ProviderNotFound(_)));
    }
}
