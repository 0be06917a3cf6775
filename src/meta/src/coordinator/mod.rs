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

//! The coordinator core (C6, §4.6): the two watch loops and `execute_job`,
//! the entry point the watch-for-new-jobs loop dispatches to and that tests
//! call directly to exercise the idempotent-dispatch property (§5).

pub mod routines;

use std::sync::Arc;

use fpcoord_common::{keys, NameVariant, ResourceDef, ResourceId, ResourceStatus};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::config::{CoordinatorConfig, DependencyPolicy};
use crate::error::{CoordinatorError, Result};
use crate::lock;
use crate::manager::{CoordinationClient, MetadataClient, WatchEvent};
use crate::spawner::JobSpawner;
use routines::Providers;

/// §4.6 "ADDED": a direct job submission that hits an unready dependency is
/// requeued rather than failed.
const JOB_DEPENDENCY_POLICY: DependencyPolicy = DependencyPolicy::Requeue;
/// A scheduled update that hits an unready dependency is dropped instead:
/// requeuing a cron tick would pile up duplicate work on every missed cycle.
const UPDATE_DEPENDENCY_POLICY: DependencyPolicy = DependencyPolicy::Skip;

/// A running coordinator instance: one per process, sharing its metadata,
/// coordination, provider, and spawner handles across every job it claims.
pub struct Coordinator {
    metadata: Arc<dyn MetadataClient>,
    coordination: Arc<dyn CoordinationClient>,
    providers: Providers,
    spawner: Arc<dyn JobSpawner>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        coordination: Arc<dyn CoordinationClient>,
        providers: Providers,
        spawner: Arc<dyn JobSpawner>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            metadata,
            coordination,
            providers,
            spawner,
            config,
        }
    }

    /// Runs the watch-for-new-jobs and watch-for-update-events loops until
    /// `shutdown` reports `true`, then waits for both to drain.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        let jobs = tokio::spawn({
            let coordinator = self.clone();
            let shutdown = shutdown.clone();
            async move { coordinator.watch_jobs_loop(shutdown).await }
        });
        let updates = tokio::spawn({
            let coordinator = self.clone();
            let shutdown = shutdown.clone();
            async move { coordinator.watch_updates_loop(shutdown).await }
        });

        let (jobs_result, updates_result) = tokio::join!(jobs, updates);
        jobs_result.map_err(|e| CoordinatorError::Core(fpcoord_common::Error::Provider(e.into())))??;
        updates_result.map_err(|e| CoordinatorError::Core(fpcoord_common::Error::Provider(e.into())))??;
        Ok(())
    }

    async fn watch_jobs_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut stream = self.metadata.watch_jobs().await?;
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("watch_jobs loop observed shutdown");
                        return Ok(());
                    }
                }
                event = stream.recv() => {
                    let Some(WatchEvent::Put(key)) = event else {
                        if event.is_none() {
                            return Ok(());
                        }
                        continue;
                    };
                    let Some(id) = keys::parse_resource_key(keys::JOB_PREFIX, &key) else {
                        continue;
                    };
                    let coordinator = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = coordinator.execute_job(&id).await {
                            if !e.is_shutting_down() {
                                warn!(resource = %id, error = %e, "job execution failed");
                            }
                        }
                    });
                }
            }
        }
    }

    async fn watch_updates_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut stream = self.metadata.watch_updates().await?;
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("watch_updates loop observed shutdown");
                        return Ok(());
                    }
                }
                event = stream.recv() => {
                    let Some(WatchEvent::Put(key)) = event else {
                        if event.is_none() {
                            return Ok(());
                        }
                        continue;
                    };
                    let Some(id) = keys::parse_resource_key(keys::UPDATE_PREFIX, &key) else {
                        continue;
                    };
                    let coordinator = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = coordinator.execute_update(&id).await {
                            if !e.is_shutting_down() {
                                warn!(resource = %id, error = %e, "update handling failed");
                            }
                        }
                    });
                }
            }
        }
    }

    /// §4.6 "Watch-for-new-jobs" steps 1-6, callable directly so tests can
    /// exercise idempotent dispatch without going through the watch loop.
    #[instrument(skip(self), fields(resource = %id))]
    pub async fn execute_job(&self, id: &ResourceId) -> Result<()> {
        let job_key = keys::job_key(id);
        let Some(guard) = lock::try_acquire(self.coordination.as_ref(), &job_key, self.config.lease_ttl).await?
        else {
            return Ok(());
        };

        let outcome = self.execute_job_locked(id).await;

        match &outcome {
            Ok(Requeued::No) | Err(_) => {
                self.metadata.delete_job(id).await?;
            }
            Ok(Requeued::Yes) => {
                // Leave the job key in place; the next watch tick (or this
                // one, via a backoff sleep) will observe it again.
            }
        }
        lock::release(self.coordination.as_ref(), guard).await?;

        match outcome {
            Ok(Requeued::Yes) => {
                tokio::time::sleep(self.config.dependency_backoff).await;
                Ok(())
            }
            Ok(Requeued::No) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn execute_job_locked(&self, id: &ResourceId) -> Result<Requeued> {
        let Some(record) = self.metadata.get_resource(id).await? else {
            return Ok(Requeued::No);
        };
        if record.status.is_terminal_success() {
            return Ok(Requeued::No);
        }

        self.metadata.set_status(id, ResourceStatus::Pending).await?;

        let dispatch_result = self.dispatch(&record.def).await;

        match dispatch_result {
            Ok(()) => {
                let ready_status = match &record.def {
                    ResourceDef::Feature(_) => ResourceStatus::ReadyOnline,
                    _ => ResourceStatus::Ready,
                };
                self.metadata.set_status(id, ready_status).await?;
                if record.def.schedule().is_scheduled() {
                    self.ensure_cron(&record.def).await?;
                }
                Ok(Requeued::No)
            }
            Err(e) if e.is_dependency_not_ready() => match JOB_DEPENDENCY_POLICY {
                DependencyPolicy::Requeue => Ok(Requeued::Yes),
                DependencyPolicy::Skip => Err(CoordinatorError::Core(e)),
            },
            Err(e) => {
                self.metadata
                    .set_status(id, ResourceStatus::Failed { message: e.to_string() })
                    .await?;
                Err(CoordinatorError::Core(e))
            }
        }
    }

    async fn dispatch(&self, def: &ResourceDef) -> fpcoord_common::Result<()> {
        match def {
            ResourceDef::Primary(d) => routines::register_primary(d, &self.providers).await,
            ResourceDef::Transformation(d) => {
                routines::run_transformation(d, self.metadata.as_ref(), &self.providers).await
            }
            ResourceDef::Feature(d) => {
                routines::materialize_feature(
                    d,
                    self.metadata.as_ref(),
                    &self.providers,
                    self.spawner.as_ref(),
                    self.config.cloud,
                )
                .await
            }
            ResourceDef::Label(d) => routines::register_label(d, self.metadata.as_ref(), &self.providers).await,
            ResourceDef::TrainingSet(d) => {
                routines::create_training_set(d, self.metadata.as_ref(), &self.providers).await
            }
        }
    }

    /// Builds the standalone config a cron-triggered worker needs to rerun
    /// this resource without a coordinator attached (§4.4), resolving
    /// dependencies now so the worker carries already-resolved table names
    /// rather than needing its own metadata-client connection.
    async fn ensure_cron(&self, def: &ResourceDef) -> Result<()> {
        let schedule = def.schedule();
        let (runner_name, config) = match def {
            ResourceDef::Transformation(d) => {
                let mapping = routines::map_name_variants_to_tables(self.metadata.as_ref(), &d.dependencies).await?;
                let resolved_sql =
                    crate::template::resolve(&d.template, &mapping).map_err(fpcoord_common::Error::from)?;
                let offline = self.providers.offline(&d.provider)?;
                let payload = crate::runner::CreateTransformationRunnerConfig {
                    offline_type: offline.provider_type().to_string(),
                    offline_config: offline.config(),
                    resource_id: d.id.clone(),
                    resolved_sql,
                };
                (
                    crate::runner::RUNNER_CREATE_TRANSFORMATION,
                    serde_json::to_vec(&payload).map_err(|e| fpcoord_common::Error::Provider(e.into()))?,
                )
            }
            ResourceDef::Feature(d) => {
                let mapping = routines::map_name_variants_to_tables(self.metadata.as_ref(), &[d.source.clone()]).await?;
                let source_table = mapping
                    .get(&d.source.mapping_key())
                    .cloned()
                    .ok_or_else(|| fpcoord_common::Error::NotFound(d.source.to_string()))?;
                let offline = self.providers.offline(&d.offline_provider)?;
                let online = self.providers.online(&d.online_provider)?;
                let payload = crate::runner::MaterializeRunnerConfig {
                    online_type: online.provider_type().to_string(),
                    offline_type: offline.provider_type().to_string(),
                    online_config: online.config(),
                    offline_config: offline.config(),
                    id: d.id.clone(),
                    source_table,
                    value_type: d.value_type,
                    cloud: self.config.cloud,
                };
                (
                    crate::runner::RUNNER_MATERIALIZE,
                    serde_json::to_vec(&payload).map_err(|e| fpcoord_common::Error::Provider(e.into()))?,
                )
            }
            ResourceDef::TrainingSet(d) => {
                let mut deps = vec![d.label.clone()];
                deps.extend(d.features.iter().cloned());
                let mapping = routines::map_name_variants_to_tables(self.metadata.as_ref(), &deps).await?;
                let label_table = mapping
                    .get(&d.label.mapping_key())
                    .cloned()
                    .ok_or_else(|| fpcoord_common::Error::NotFound(d.label.to_string()))?;
                let mut feature_tables = Vec::with_capacity(d.features.len());
                for nv in &d.features {
                    feature_tables.push(
                        mapping
                            .get(&nv.mapping_key())
                            .cloned()
                            .ok_or_else(|| fpcoord_common::Error::NotFound(nv.to_string()))?,
                    );
                }
                let offline = self.providers.offline(&d.provider)?;
                let payload = crate::runner::CreateTrainingSetRunnerConfig {
                    offline_type: offline.provider_type().to_string(),
                    offline_config: offline.config(),
                    label_table,
                    feature_tables,
                    resource_id: d.id.clone(),
                };
                (
                    crate::runner::RUNNER_CREATE_TRAINING_SET,
                    serde_json::to_vec(&payload).map_err(|e| fpcoord_common::Error::Provider(e.into()))?,
                )
            }
            ResourceDef::Primary(_) | ResourceDef::Label(_) => return Ok(()),
        };
        self.spawner
            .ensure_cron_job(runner_name, &config, def.id(), &schedule)
            .await?;
        Ok(())
    }

    /// §4.6 "Watch-for-update-events": acquire a lock, bump `LastUpdated`,
    /// delete the event key, release the lock. Never touches `status` — a
    /// scheduled tick only re-confirms liveness, it cannot regress a
    /// resource's state (§3 monotonicity).
    #[instrument(skip(self), fields(resource = %id))]
    pub async fn execute_update(&self, id: &ResourceId) -> Result<()> {
        let update_key = keys::update_key(id);
        let Some(guard) = lock::try_acquire(self.coordination.as_ref(), &update_key, self.config.lease_ttl).await?
        else {
            return Ok(());
        };

        let result = self.execute_update_locked(id).await;
        self.metadata.delete_update_event(id).await?;
        lock::release(self.coordination.as_ref(), guard).await?;
        result
    }

    async fn execute_update_locked(&self, id: &ResourceId) -> Result<()> {
        let Some(record) = self.metadata.get_resource(id).await? else {
            return Ok(());
        };
        if !record.status.is_terminal_success() {
            // A schedule firing on a resource that never reached steady
            // state isn't meaningful yet; drop it (§4.6 ADDED: cron-fired
            // updates are skipped, never requeued).
            warn!(resource = %id, "scheduled update observed on a non-ready resource; skipping");
            return Ok(());
        }
        let deps_ready = self.dependencies_ready(&record.def).await?;
        if !deps_ready {
            match UPDATE_DEPENDENCY_POLICY {
                DependencyPolicy::Skip => {
                    warn!(resource = %id, "scheduled update skipped: a dependency regressed out of ready");
                    return Ok(());
                }
                DependencyPolicy::Requeue => {
                    self.metadata.put_update_event(id).await?;
                    return Ok(());
                }
            }
        }
        self.metadata.set_update_status(id, now_unix_seconds()).await?;
        Ok(())
    }

    async fn dependencies_ready(&self, def: &ResourceDef) -> Result<bool> {
        for nv in def.dependencies() {
            if !self.dependency_is_ready(&nv).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn dependency_is_ready(&self, nv: &NameVariant) -> Result<bool> {
        let record = self
            .metadata
            .get_source_variant(nv)
            .await?
            .or(self.metadata.get_feature_variant(nv).await?)
            .or(self.metadata.get_label_variant(nv).await?);
        Ok(record.is_some_and(|r| r.status.is_ready_like()))
    }
}

/// Whether `execute_job_locked` left the job key in place for a later retry.
enum Requeued {
    Yes,
    No,
}

fn now_unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use fpcoord_common::{FeatureDef, NameVariant, PrimaryDef, ResourceId, ResourceKind, Schedule, ValueType};

    use super::*;
    use crate::manager::memory::InMemoryStore;
    use crate::provider::memory::{MemoryOfflineStore, MemoryOnlineStore};
    use crate::provider::{OfflineStore, OnlineStore};
    use crate::runner::registry::RunnerRegistry;
    use crate::spawner::local::LocalJobSpawner;

    fn test_coordinator() -> (Arc<Coordinator>, Arc<InMemoryStore>, Arc<MemoryOfflineStore>, Arc<MemoryOnlineStore>) {
        let metadata = InMemoryStore::new();
        let offline = MemoryOfflineStore::new("wh");
        let online = MemoryOnlineStore::new("kv");

        let mut offline_map = HashMap::new();
        offline_map.insert("wh".to_string(), offline.clone() as crate::provider::OfflineStoreRef);
        let mut online_map = HashMap::new();
        online_map.insert("kv".to_string(), online.clone() as crate::provider::OnlineStoreRef);
        let providers = Providers {
            offline: offline_map,
            online: online_map,
        };

        let registry = RunnerRegistry::new();
        crate::runner::copy_to_online::register(&registry).unwrap();
        crate::runner::materialize::register(&registry).unwrap();
        crate::runner::create_transformation::register(&registry).unwrap();
        crate::runner::create_training_set::register(&registry).unwrap();
        let spawner: Arc<dyn JobSpawner> = Arc::new(LocalJobSpawner::new(registry));

        let config = CoordinatorConfig {
            dependency_backoff: Duration::from_millis(5),
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(Coordinator::new(metadata.clone(), metadata.clone(), providers, spawner, config));
        (coordinator, metadata, offline, online)
    }

    #[tokio::test]
    async fn execute_job_on_ready_is_noop() {
        let (coordinator, metadata, ..) = test_coordinator();
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        metadata
            .create_all(vec![ResourceDef::Primary(PrimaryDef {
                id: id.clone(),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "orders_raw".into(),
            })])
            .await
            .unwrap();
        metadata.set_status(&id, ResourceStatus::Ready).await.unwrap();
        metadata.put_job(&id).await.unwrap();

        coordinator.execute_job(&id).await.unwrap();

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Ready);
        assert!(!metadata.has_job(&id).await.unwrap());
    }

    #[tokio::test]
    async fn execute_job_registers_primary_and_advances_to_ready() {
        let (coordinator, metadata, offline, _online) = test_coordinator();
        offline.seed_external_table("orders_raw", vec![]);
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        metadata
            .create_all(vec![ResourceDef::Primary(PrimaryDef {
                id: id.clone(),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "orders_raw".into(),
            })])
            .await
            .unwrap();
        metadata.put_job(&id).await.unwrap();

        coordinator.execute_job(&id).await.unwrap();

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Ready);
        assert!(!metadata.has_job(&id).await.unwrap());
    }

    #[tokio::test]
    async fn execute_job_requeues_on_unready_dependency_leaving_job_key() {
        let (coordinator, metadata, ..) = test_coordinator();
        let id = ResourceId::new(ResourceKind::Feature, "avg_purchase", "v1");
        metadata
            .create_all(vec![ResourceDef::Feature(FeatureDef {
                id: id.clone(),
                owner: "alice".into(),
                source: NameVariant::new("orders", ""),
                offline_provider: "wh".into(),
                online_provider: "kv".into(),
                schedule: Schedule::none(),
                value_type: ValueType::Int,
            })])
            .await
            .unwrap();
        metadata.put_job(&id).await.unwrap();

        coordinator.execute_job(&id).await.unwrap();

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Pending);
        assert!(metadata.has_job(&id).await.unwrap());
    }

    #[tokio::test]
    async fn execute_job_on_scheduled_feature_builds_and_submits_cron_config() {
        let (coordinator, metadata, offline, online) = test_coordinator();
        offline.seed_external_table("orders_raw", vec![]);
        let source_id = ResourceId::new(ResourceKind::Primary, "orders", "");
        let feature_id = ResourceId::new(ResourceKind::Feature, "avg_purchase", "v1");
        metadata
            .create_all(vec![
                ResourceDef::Primary(PrimaryDef {
                    id: source_id.clone(),
                    owner: "alice".into(),
                    provider: "wh".into(),
                    external_table: "orders_raw".into(),
                }),
                ResourceDef::Feature(FeatureDef {
                    id: feature_id.clone(),
                    owner: "alice".into(),
                    source: NameVariant::new("orders", ""),
                    offline_provider: "wh".into(),
                    online_provider: "kv".into(),
                    schedule: Schedule::cron("@daily"),
                    value_type: ValueType::Int,
                }),
            ])
            .await
            .unwrap();
        metadata.set_status(&source_id, ResourceStatus::Ready).await.unwrap();
        metadata.put_job(&feature_id).await.unwrap();

        // LocalJobSpawner::ensure_cron_job is a logging no-op, so this only
        // verifies the resolved-dependency config building in `ensure_cron`
        // does not error for a scheduled resource.
        coordinator.execute_job(&feature_id).await.unwrap();

        let record = metadata.get_resource(&feature_id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::ReadyOnline);
        assert!(online.get_table(&feature_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn execute_update_skips_without_bumping_non_ready_resource() {
        let (coordinator, metadata, ..) = test_coordinator();
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        metadata
            .create_all(vec![ResourceDef::Primary(PrimaryDef {
                id: id.clone(),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "orders_raw".into(),
            })])
            .await
            .unwrap();
        metadata.put_update_event(&id).await.unwrap();

        coordinator.execute_update(&id).await.unwrap();

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert!(record.last_updated.is_none());
        assert!(!metadata.has_job(&id).await.unwrap());
    }

    #[tokio::test]
    async fn execute_update_advances_last_updated_on_ready_resource() {
        let (coordinator, metadata, ..) = test_coordinator();
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        metadata
            .create_all(vec![ResourceDef::Primary(PrimaryDef {
                id: id.clone(),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "orders_raw".into(),
            })])
            .await
            .unwrap();
        metadata.set_status(&id, ResourceStatus::Ready).await.unwrap();
        metadata.put_update_event(&id).await.unwrap();

        coordinator.execute_update(&id).await.unwrap();

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Ready);
        assert!(record.last_updated.is_some());
    }

    #[tokio::test]
    async fn execute_job_fails_primary_registration_on_missing_external_table() {
        // No call to `seed_external_table`: the external table never exists.
        let (coordinator, metadata, ..) = test_coordinator();
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        metadata
            .create_all(vec![ResourceDef::Primary(PrimaryDef {
                id: id.clone(),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "".into(),
            })])
            .await
            .unwrap();
        metadata.put_job(&id).await.unwrap();

        let result = coordinator.execute_job(&id).await;
        assert!(result.is_err());

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert!(matches!(record.status, ResourceStatus::Failed { .. }));
        assert!(!metadata.has_job(&id).await.unwrap());
    }

    #[tokio::test]
    async fn happy_path_feature_materialization_lands_every_row_online() {
        use fpcoord_common::Value;

        let (coordinator, metadata, offline, online) = test_coordinator();
        let rows: Vec<(&str, i64)> = vec![("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)];
        offline.seed_external_table(
            "orders_raw",
            rows.iter()
                .map(|(entity, value)| crate::provider::Row {
                    entity: entity.to_string(),
                    value: Value::Int(*value),
                    ts: 0,
                })
                .collect(),
        );

        let source_id = ResourceId::new(ResourceKind::Primary, "orders", "");
        let feature_id = ResourceId::new(ResourceKind::Feature, "avg_purchase", "v1");
        metadata
            .create_all(vec![
                ResourceDef::Primary(PrimaryDef {
                    id: source_id.clone(),
                    owner: "alice".into(),
                    provider: "wh".into(),
                    external_table: "orders_raw".into(),
                }),
                ResourceDef::Feature(FeatureDef {
                    id: feature_id.clone(),
                    owner: "alice".into(),
                    source: NameVariant::new("orders", ""),
                    offline_provider: "wh".into(),
                    online_provider: "kv".into(),
                    schedule: Schedule::none(),
                    value_type: ValueType::Int,
                }),
            ])
            .await
            .unwrap();
        metadata.set_status(&source_id, ResourceStatus::Ready).await.unwrap();
        metadata.put_job(&feature_id).await.unwrap();

        coordinator.execute_job(&feature_id).await.unwrap();

        let record = metadata.get_resource(&feature_id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::ReadyOnline);

        let table = online.get_table(&feature_id).await.unwrap().unwrap();
        for (entity, value) in &rows {
            assert_eq!(table.get(entity).await.unwrap(), Some(Value::Int(*value)));
        }
    }

    #[tokio::test]
    async fn training_set_joins_feature_and_label_over_the_same_entities() {
        use fpcoord_common::{LabelDef, TrainingSetDef, Value};

        let (coordinator, metadata, offline, _online) = test_coordinator();
        let rows: Vec<(&str, i64)> = vec![("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)];
        offline.seed_external_table(
            "orders_raw",
            rows.iter()
                .map(|(entity, value)| crate::provider::Row {
                    entity: entity.to_string(),
                    value: Value::Int(*value),
                    ts: 0,
                })
                .collect(),
        );

        let source_id = ResourceId::new(ResourceKind::Primary, "orders", "");
        let feature_id = ResourceId::new(ResourceKind::Feature, "avg_purchase", "v1");
        let label_id = ResourceId::new(ResourceKind::Label, "churned", "v1");
        let ts_id = ResourceId::new(ResourceKind::TrainingSet, "churn_train", "v1");
        metadata
            .create_all(vec![
                ResourceDef::Primary(PrimaryDef {
                    id: source_id.clone(),
                    owner: "alice".into(),
                    provider: "wh".into(),
                    external_table: "orders_raw".into(),
                }),
                ResourceDef::Feature(FeatureDef {
                    id: feature_id.clone(),
                    owner: "alice".into(),
                    source: NameVariant::new("orders", ""),
                    offline_provider: "wh".into(),
                    online_provider: "kv".into(),
                    schedule: Schedule::none(),
                    value_type: ValueType::Int,
                }),
                ResourceDef::Label(LabelDef {
                    id: label_id.clone(),
                    owner: "alice".into(),
                    source: NameVariant::new("orders", ""),
                    provider: "wh".into(),
                    value_type: ValueType::Int,
                }),
                ResourceDef::TrainingSet(TrainingSetDef {
                    id: ts_id.clone(),
                    owner: "alice".into(),
                    provider: "wh".into(),
                    schedule: Schedule::none(),
                    label: NameVariant::new("churned", "v1"),
                    features: vec![NameVariant::new("avg_purchase", "v1")],
                }),
            ])
            .await
            .unwrap();
        metadata.set_status(&source_id, ResourceStatus::Ready).await.unwrap();

        metadata.put_job(&feature_id).await.unwrap();
        coordinator.execute_job(&feature_id).await.unwrap();
        metadata.put_job(&label_id).await.unwrap();
        coordinator.execute_job(&label_id).await.unwrap();
        metadata.put_job(&ts_id).await.unwrap();
        coordinator.execute_job(&ts_id).await.unwrap();

        let record = metadata.get_resource(&ts_id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Ready);

        let handle = offline.get_training_set(&ts_id).await.unwrap().unwrap();
        let training_rows = handle.rows().await.unwrap();
        assert_eq!(training_rows.len(), 5);
        for row in &training_rows {
            assert_eq!(row.features.len(), 1);
            assert_eq!(row.features[0], row.label);
        }
    }

    #[tokio::test]
    async fn concurrent_dispatch_produces_exactly_one_transition_sequence() {
        let (coordinator, metadata, offline, _online) = test_coordinator();
        offline.seed_external_table("orders_raw", vec![]);
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        metadata
            .create_all(vec![ResourceDef::Primary(PrimaryDef {
                id: id.clone(),
                owner: "alice".into(),
                provider: "wh".into(),
                external_table: "orders_raw".into(),
            })])
            .await
            .unwrap();
        metadata.put_job(&id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { coordinator.execute_job(&id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = metadata.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Ready);
        assert!(!metadata.has_job(&id).await.unwrap());
    }
}
