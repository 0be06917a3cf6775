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

//! The `CREATE_TRAINING_SET` runner: the cron-triggered rerun of a scheduled
//! training set (§4.4, §4.6). The label and feature tables are already
//! resolved at submission time, same as [`super::create_transformation`].

use std::sync::Arc;

use async_trait::async_trait;
use fpcoord_common::Error;

use super::registry::{RunnerFactory, RunnerRegistry};
use super::{CreateTrainingSetRunnerConfig, Runner, RUNNER_CREATE_TRAINING_SET};
use crate::provider::memory::MemoryOfflineStore;
use crate::provider::{OfflineStore, OfflineStoreRef, OfflineTableRef, ResolvedTrainingSetDef};
use crate::watcher::{watch_task, WatcherRef};

struct CreateTrainingSetRunner {
    config: CreateTrainingSetRunnerConfig,
    offline: OfflineStoreRef,
}

#[async_trait]
impl Runner for CreateTrainingSetRunner {
    fn name(&self) -> &'static str {
        RUNNER_CREATE_TRAINING_SET
    }

    async fn run(self: Box<Self>) -> WatcherRef {
        let CreateTrainingSetRunner { config, offline } = *self;
        watch_task(async move {
            let provider_name = offline.provider_type().to_string();
            let resolved = ResolvedTrainingSetDef {
                id: config.resource_id.clone(),
                label_table: OfflineTableRef {
                    provider_name: provider_name.clone(),
                    resolved_table: config.label_table.clone(),
                },
                feature_tables: config
                    .feature_tables
                    .iter()
                    .map(|table| OfflineTableRef {
                        provider_name: provider_name.clone(),
                        resolved_table: table.clone(),
                    })
                    .collect(),
            };
            offline.create_training_set(&resolved).await?;
            Ok(())
        })
    }
}

fn resolve_offline(config: &CreateTrainingSetRunnerConfig) -> fpcoord_common::Result<OfflineStoreRef> {
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
        let config: CreateTrainingSetRunnerConfig =
            serde_json::from_slice(bytes).map_err(|e| Error::Provider(e.into()))?;
        let offline = resolve_offline(&config)?;
        Ok(Box::new(CreateTrainingSetRunner { config, offline }) as Box<dyn Runner>)
    });
    registry.register(RUNNER_CREATE_TRAINING_SET, factory)
}

#[cfg(test)]
mod tests {
    use fpcoord_common::{ResourceId, ResourceKind, Value};

    use super::*;
    use crate::provider::{Provider, Row};

    #[tokio::test]
    async fn reruns_training_set_assembly_against_already_resolved_tables() {
        let offline = MemoryOfflineStore::new("create-training-set-test");
        offline.seed_external_table(
            "labels_v1",
            vec![Row { entity: "a".into(), value: Value::Int(1), ts: 10 }],
        );
        offline.seed_external_table(
            "features_v1",
            vec![Row { entity: "a".into(), value: Value::Int(7), ts: 5 }],
        );

        let registry = RunnerRegistry::new();
        register(&registry).unwrap();

        let config = CreateTrainingSetRunnerConfig {
            offline_type: offline.provider_type().to_string(),
            offline_config: offline.config(),
            label_table: "labels_v1".into(),
            feature_tables: vec!["features_v1".into()],
            resource_id: ResourceId::new(ResourceKind::TrainingSet, "cron_training_set", "v1"),
        };
        let bytes = serde_json::to_vec(&config).unwrap();
        let runner = registry.create(RUNNER_CREATE_TRAINING_SET, &bytes).unwrap();
        let watcher = runner.run().await;
        watcher.wait().await.unwrap();
    }
}
