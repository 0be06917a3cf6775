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

//! The per-kind dispatch routines (§4.6): primary-source registration, SQL
//! transformation, feature materialization, and training-set creation. Each
//! routine is a pure function of its resource definition and the metadata
//! client, dispatching provider calls directly for quick operations and
//! going through the [`JobSpawner`] for the ones the spec calls out as
//! worker-shaped (materialization, training-set assembly).

use std::collections::HashMap;

use fpcoord_common::{
    Error, FeatureDef, LabelDef, NameVariant, PrimaryDef, Result, TrainingSetDef, TransformationDef, ValueType,
};

use crate::manager::{MetadataClient, ResourceRecord};
use crate::provider::{
    Materialization, OfflineStore, OfflineStoreRef, OnlineStore, OnlineStoreRef, Provider, ResolvedTrainingSetDef,
};
use crate::runner::{compute_chunk_plan, ChunkPlan, Runner};
use crate::spawner::{ClusterJobSpec, JobSpawner};
use crate::template::{self, TableMapping};
use crate::watcher::{Watcher, WatcherRef};

/// A resolved, ready-to-use pair of provider handles looked up by name from
/// a registry the coordinator owns. Out of scope here: how providers are
/// configured (§1) — only that the coordinator can cast them to the trait
/// the routine needs, erroring on a mismatch (§4.6 "cross-casting is a hard
/// error").
pub struct Providers {
    pub offline: HashMap<String, OfflineStoreRef>,
    pub online: HashMap<String, OnlineStoreRef>,
}

impl Providers {
    pub fn offline(&self, name: &str) -> Result<OfflineStoreRef> {
        self.offline
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
    }

    pub fn online(&self, name: &str) -> Result<OnlineStoreRef> {
        self.online
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
    }
}

fn require_ready(record: &ResourceRecord, what: &NameVariant) -> Result<()> {
    if record.status.is_ready_like() {
        Ok(())
    } else {
        Err(Error::DependencyNotReady(what.to_string()))
    }
}

/// Looks up `nv` across every kind it could name and requires it to already
/// be ready. Every per-kind routine that consumes a dependency (rather than
/// declaring one) goes through this single lookup.
async fn resolve_dependency(metadata: &dyn MetadataClient, nv: &NameVariant) -> Result<ResourceRecord> {
    let record = metadata
        .get_source_variant(nv)
        .await?
        .or(metadata.get_feature_variant(nv).await?)
        .or(metadata.get_label_variant(nv).await?)
        .ok_or_else(|| Error::NotFound(nv.to_string()))?;
    require_ready(&record, nv)?;
    Ok(record)
}

/// §4.6 "Primary source registration": verify the provider is offline,
/// verify the external name is non-empty, register it.
pub async fn register_primary(def: &PrimaryDef, providers: &Providers) -> Result<()> {
    if def.external_table.trim().is_empty() {
        return Err(Error::NotFound(format!(
            "primary source {} names no external table",
            def.id
        )));
    }
    let offline = providers.offline(&def.provider)?;
    offline
        .register_primary_from_existing(&def.id, &def.external_table)
        .await
        .map_err(Error::Provider)?;
    Ok(())
}

/// Builds the `"<name>.<variant>"` -> provider-canonical-table mapping a
/// transformation's template resolves against, erroring if any dependency
/// is absent or not ready (`mapNameVariantsToTables`, §4.5).
pub async fn map_name_variants_to_tables(
    metadata: &dyn MetadataClient,
    deps: &[NameVariant],
) -> Result<TableMapping> {
    let mut mapping = TableMapping::new();
    for nv in deps {
        let record = resolve_dependency(metadata, nv).await?;
        mapping.insert(nv.mapping_key(), record.def.id().to_string());
    }
    Ok(mapping)
}

/// §4.6 "SQL transformation": every dependency must be ready, the template
/// resolves against their canonical table names, and the resolved SQL is
/// hand off to the offline provider.
pub async fn run_transformation(
    def: &TransformationDef,
    metadata: &dyn MetadataClient,
    providers: &Providers,
) -> Result<()> {
    let mapping = map_name_variants_to_tables(metadata, &def.dependencies).await?;
    let resolved_sql = template::resolve(&def.template, &mapping)?;
    let offline = providers.offline(&def.provider)?;
    offline
        .create_transformation(&def.id, &resolved_sql)
        .await
        .map_err(Error::Provider)?;
    Ok(())
}

/// §4.6 "Feature materialization": verify the source is ready, verify the
/// declared providers cast correctly, run the chunked materialization
/// (§4.2), and await completion.
pub async fn materialize_feature(
    def: &FeatureDef,
    metadata: &dyn MetadataClient,
    providers: &Providers,
    spawner: &dyn JobSpawner,
    cloud: crate::runner::CloudTag,
) -> Result<()> {
    let source = resolve_dependency(metadata, &def.source).await?;
    let source_table = source.def.id().to_string();

    let offline = providers.offline(&def.offline_provider)?;
    let online = providers.online(&def.online_provider)?;

    let watcher = run_materialization(&def.id, &source_table, def.value_type, offline, online, spawner, cloud).await?;
    watcher.wait().await.map_err(Error::Provider)?;
    Ok(())
}

/// §4.6 "Label" dependency resolution: a label has no materialized form of
/// its own besides an offline table mirroring its ready source, used by
/// training sets exactly like a primary table or transformation output.
pub async fn register_label(def: &LabelDef, metadata: &dyn MetadataClient, providers: &Providers) -> Result<()> {
    let source = resolve_dependency(metadata, &def.source).await?;
    let source_table = source.def.id().to_string();
    let offline = providers.offline(&def.provider)?;
    offline
        .register_label(&def.id, &source_table)
        .await
        .map_err(Error::Provider)?;
    Ok(())
}

/// The chunked materialization algorithm itself (C2, §4.2), split out so it
/// can be exercised directly by tests without going through the full
/// `materialize_feature` readiness gate.
pub async fn run_materialization(
    feature_id: &fpcoord_common::ResourceId,
    source_table: &str,
    value_type: ValueType,
    offline: OfflineStoreRef,
    online: OnlineStoreRef,
    spawner: &dyn JobSpawner,
    cloud: crate::runner::CloudTag,
) -> Result<WatcherRef> {
    let materialization = offline
        .create_materialization(feature_id, source_table)
        .await
        .map_err(Error::Provider)?;
    online.create_table(feature_id, value_type).await.map_err(Error::Provider)?;

    let num_rows = materialization.num_rows().await.map_err(Error::Provider)?;
    let ChunkPlan { chunk_size, num_chunks } = compute_chunk_plan(num_rows);

    if num_chunks == 0 {
        // §9 open question, resolved: an empty feature yields an empty
        // online table and is immediately complete.
        return Ok(crate::watcher::completed_watcher(Ok(())));
    }

    let config = crate::runner::MaterializedChunkRunnerConfig {
        online_type: online.provider_type().to_string(),
        offline_type: offline.provider_type().to_string(),
        online_config: online.config(),
        offline_config: offline.config(),
        materialization_id: materialization.id().to_string(),
        resource_id: feature_id.clone(),
        chunk_index: 0,
        chunk_size,
    };

    match cloud {
        crate::runner::CloudTag::Cluster => {
            let bytes = serde_json::to_vec(&config).map_err(|e| Error::Provider(e.into()))?;
            let runner = spawner
                .get_job_runner(
                    crate::runner::RUNNER_COPY_TO_ONLINE,
                    &bytes,
                    feature_id,
                    ClusterJobSpec {
                        num_tasks: num_chunks as u32,
                    },
                )
                .await?;
            Ok(runner.run().await)
        }
        crate::runner::CloudTag::Local => {
            let mut watchers = Vec::with_capacity(num_chunks as usize);
            for chunk_index in 0..num_chunks {
                let mut chunk_config = config.clone();
                chunk_config.chunk_index = chunk_index;
                let bytes = serde_json::to_vec(&chunk_config).map_err(|e| Error::Provider(e.into()))?;
                let runner = spawner
                    .get_job_runner(
                        crate::runner::RUNNER_COPY_TO_ONLINE,
                        &bytes,
                        feature_id,
                        ClusterJobSpec { num_tasks: 1 },
                    )
                    .await?;
                watchers.push(runner.run().await);
            }
            Ok(crate::watcher::MultiplexWatcher::new(watchers))
        }
    }
}

/// §4.6 "Training-set creation": label and every feature must be ready, the
/// provider must be offline, and the assembly runs as a worker.
pub async fn create_training_set(
    def: &TrainingSetDef,
    metadata: &dyn MetadataClient,
    providers: &Providers,
) -> Result<()> {
    let label = metadata
        .get_label_variant(&def.label)
        .await?
        .ok_or_else(|| Error::NotFound(def.label.to_string()))?;
    require_ready(&label, &def.label)?;

    let mut feature_tables = Vec::with_capacity(def.features.len());
    for nv in &def.features {
        let record = metadata
            .get_feature_variant(nv)
            .await?
            .ok_or_else(|| Error::NotFound(nv.to_string()))?;
        require_ready(&record, nv)?;
        feature_tables.push(crate::provider::OfflineTableRef {
            provider_name: def.provider.clone(),
            resolved_table: record.def.id().to_string(),
        });
    }

    let offline = providers.offline(&def.provider)?;
    let resolved = ResolvedTrainingSetDef {
        id: def.id.clone(),
        label_table: crate::provider::OfflineTableRef {
            provider_name: def.provider.clone(),
            resolved_table: label.def.id().to_string(),
        },
        feature_tables,
    };
    offline.create_training_set(&resolved).await.map_err(Error::Provider)?;
    Ok(())
}

/// Bounded DFS over a transformation's declared dependency names, run at
/// submission time to reject a cycle before it can wedge every participant
/// in `Pending` forever (§9).
pub async fn detect_transformation_cycle(
    metadata: &dyn MetadataClient,
    start: &fpcoord_common::ResourceId,
    deps: &[NameVariant],
) -> Result<()> {
    let mut stack: Vec<NameVariant> = deps.to_vec();
    let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();

    while let Some(nv) = stack.pop() {
        if nv.name == start.name && nv.variant == start.variant {
            return Err(Error::DependencyCycle(start.to_string()));
        }
        if !visited.insert(nv.mapping_key()) {
            continue;
        }
        let Some(record) = metadata.get_source_variant(&nv).await?.or(
            match metadata.get_feature_variant(&nv).await? {
                Some(r) => Some(r),
                None => metadata.get_label_variant(&nv).await?,
            },
        ) else {
            continue;
        };
        if let fpcoord_common::ResourceDef::Transformation(t) = &record.def {
            stack.extend(t.dependencies.iter().cloned());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use fpcoord_common::{ResourceId, ResourceKind, Schedule};

    use super::*;
    use crate::manager::memory::InMemoryStore;
    use crate::provider::memory::{MemoryOfflineStore, MemoryOnlineStore};
    use crate::runner::registry::RunnerRegistry;
    use crate::spawner::local::LocalJobSpawner;

    fn providers(offline: OfflineStoreRef, online: OnlineStoreRef) -> Providers {
        let mut offline_map = HashMap::new();
        offline_map.insert("wh".to_string(), offline);
        let mut online_map = HashMap::new();
        online_map.insert("kv".to_string(), online);
        Providers {
            offline: offline_map,
            online: online_map,
        }
    }

    #[tokio::test]
    async fn transformation_blocks_on_unready_dependency() {
        let metadata = InMemoryStore::new();
        let offline = MemoryOfflineStore::new("wh");
        let online = MemoryOnlineStore::new("kv");
        let p = providers(offline.clone(), online.clone());

        metadata
            .create_all(vec![fpcoord_common::ResourceDef::Primary(PrimaryDef {
                id: ResourceId::new(ResourceKind::Primary, "orders", ""),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "orders_raw".into(),
            })])
            .await
            .unwrap();
        // Status is `Created`, not `Ready` — the gate must fire.

        let def = TransformationDef {
            id: ResourceId::new(ResourceKind::Transformation, "clean_orders", "v1"),
            owner: "alice".into(),
            provider: "wh".into(),
            schedule: Schedule::none(),
            template: "select * from {{orders.}}".into(),
            dependencies: vec![NameVariant::new("orders", "")],
        };

        let err = run_transformation(&def, metadata.as_ref(), &p).await.unwrap_err();
        assert!(err.is_dependency_not_ready());
    }

    #[tokio::test]
    async fn materialization_empty_feature_is_immediately_ready_online() {
        let offline = MemoryOfflineStore::new("wh");
        let online = MemoryOnlineStore::new("kv");
        let registry = RunnerRegistry::new();
        let spawner = LocalJobSpawner::new(registry);

        let id = ResourceId::new(ResourceKind::Feature, "empty_feature", "v1");
        let watcher = run_materialization(
            &id,
            "nonexistent_source",
            ValueType::Int,
            offline,
            online,
            &spawner,
            crate::runner::CloudTag::Local,
        )
        .await
        .unwrap();
        assert!(watcher.is_complete());
        assert!(watcher.wait().await.is_ok());
    }
}
