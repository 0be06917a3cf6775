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

//! A single-process, strongly-consistent fake of the metadata/coordination
//! store, used by every coordinator test in this workspace. Mirrors the
//! teacher's `MemStore` counterpart to `EtcdMetaStore` (referenced from
//! `rpc/server.rs`'s `crate::storage` imports).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fpcoord_common::{keys, Error, NameVariant, ResourceDef, ResourceId, ResourceStatus, Result};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::{CoordinationClient, LockGuard, MetadataClient, ResourceRecord, WatchEvent, WatchStream};

struct LockEntry {
    owner: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    resources: HashMap<String, ResourceRecord>,
    kv: HashMap<String, String>,
    locks: HashMap<String, LockEntry>,
    job_subs: Vec<mpsc::Sender<WatchEvent>>,
    update_subs: Vec<mpsc::Sender<WatchEvent>>,
}

/// An in-memory metadata + coordination store. One instance is shared (via
/// `Arc`) across every simulated coordinator in a multi-coordinator test, so
/// lock contention between them is real contention on the same `Mutex`.
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    async fn find_by_name_variant(&self, kind: fpcoord_common::ResourceKind, nv: &NameVariant) -> Option<ResourceRecord> {
        let state = self.state.lock().await;
        state
            .resources
            .values()
            .find(|r| {
                let id = r.def.id();
                id.kind == kind && id.name == nv.name && id.variant == nv.variant
            })
            .cloned()
    }

    async fn notify(subs: &mut Vec<mpsc::Sender<WatchEvent>>, event: WatchEvent) {
        subs.retain(|tx| !tx.is_closed());
        for tx in subs.iter() {
            let _ = tx.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl MetadataClient for InMemoryStore {
    async fn create_all(&self, defs: Vec<ResourceDef>) -> Result<()> {
        let mut state = self.state.lock().await;
        for def in defs {
            let id = def.id().clone();
            state.resources.insert(
                id.to_string(),
                ResourceRecord {
                    def,
                    status: ResourceStatus::Created,
                    last_updated: None,
                },
            );
        }
        Ok(())
    }

    async fn get_resource(&self, id: &ResourceId) -> Result<Option<ResourceRecord>> {
        Ok(self.state.lock().await.resources.get(&id.to_string()).cloned())
    }

    async fn get_source_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        Ok(self.find_by_name_variant(fpcoord_common::ResourceKind::Primary, nv).await)
    }

    async fn get_feature_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        Ok(self.find_by_name_variant(fpcoord_common::ResourceKind::Feature, nv).await)
    }

    async fn get_label_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        Ok(self.find_by_name_variant(fpcoord_common::ResourceKind::Label, nv).await)
    }

    async fn get_training_set_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        Ok(self.find_by_name_variant(fpcoord_common::ResourceKind::TrainingSet, nv).await)
    }

    async fn set_status(&self, id: &ResourceId, status: ResourceStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .resources
            .get_mut(&id.to_string())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.status = status;
        Ok(())
    }

    async fn set_update_status(&self, id: &ResourceId, last_updated: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .resources
            .get_mut(&id.to_string())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.last_updated = Some(last_updated);
        Ok(())
    }

    async fn has_job(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.state.lock().await.kv.contains_key(&keys::job_key(id)))
    }

    async fn put_job(&self, id: &ResourceId) -> Result<()> {
        let key = keys::job_key(id);
        let mut state = self.state.lock().await;
        state.kv.insert(key.clone(), String::new());
        Self::notify(&mut state.job_subs, WatchEvent::Put(key)).await;
        Ok(())
    }

    async fn delete_job(&self, id: &ResourceId) -> Result<()> {
        let key = keys::job_key(id);
        let mut state = self.state.lock().await;
        state.kv.remove(&key);
        Self::notify(&mut state.job_subs, WatchEvent::Delete(key)).await;
        Ok(())
    }

    async fn put_update_event(&self, id: &ResourceId) -> Result<()> {
        let key = keys::update_key(id);
        let mut state = self.state.lock().await;
        state.kv.insert(key.clone(), String::new());
        Self::notify(&mut state.update_subs, WatchEvent::Put(key)).await;
        Ok(())
    }

    async fn delete_update_event(&self, id: &ResourceId) -> Result<()> {
        let key = keys::update_key(id);
        let mut state = self.state.lock().await;
        state.kv.remove(&key);
        Self::notify(&mut state.update_subs, WatchEvent::Delete(key)).await;
        Ok(())
    }

    async fn watch_jobs(&self) -> Result<WatchStream> {
        let (tx, rx) = mpsc::channel(256);
        let mut state = self.state.lock().await;
        for key in state.kv.keys().filter(|k| k.starts_with(keys::JOB_PREFIX)).cloned().collect::<Vec<_>>() {
            let _ = tx.try_send(WatchEvent::Put(key));
        }
        state.job_subs.push(tx);
        Ok(rx)
    }

    async fn watch_updates(&self) -> Result<WatchStream> {
        let (tx, rx) = mpsc::channel(256);
        let mut state = self.state.lock().await;
        for key in state.kv.keys().filter(|k| k.starts_with(keys::UPDATE_PREFIX)).cloned().collect::<Vec<_>>() {
            let _ = tx.try_send(WatchEvent::Put(key));
        }
        state.update_subs.push(tx);
        Ok(rx)
    }

    async fn fetch_source(&self, nv: &NameVariant) -> Result<ResourceRecord> {
        self.get_source_variant(nv)
            .await?
            .ok_or_else(|| Error::NotFound(format!("source {nv}")))
    }

    async fn fetch_label(&self, nv: &NameVariant) -> Result<ResourceRecord> {
        self.get_label_variant(nv)
            .await?
            .ok_or_else(|| Error::NotFound(format!("label {nv}")))
    }

    async fn fetch_features(&self, nvs: &[NameVariant]) -> Result<Vec<ResourceRecord>> {
        let mut out = Vec::with_capacity(nvs.len());
        for nv in nvs {
            let record = self
                .get_feature_variant(nv)
                .await?
                .ok_or_else(|| Error::NotFound(format!("feature {nv}")))?;
            out.push(record);
        }
        Ok(out)
    }
}

#[async_trait]
impl CoordinationClient for InMemoryStore {
    async fn try_lock(&self, key: &str, lease_ttl: Duration) -> Result<Option<LockGuard>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if let Some(entry) = state.locks.get(key) {
            if entry.expires_at > now {
                return Ok(None);
            }
        }
        let owner = Uuid::new_v4();
        state.locks.insert(
            key.to_string(),
            LockEntry {
                owner,
                expires_at: now + lease_ttl,
            },
        );
        Ok(Some(LockGuard::new(key, owner)))
    }

    async fn unlock(&self, guard: LockGuard) -> Result<()> {
        let owner = *guard
            .payload
            .downcast_ref::<Uuid>()
            .expect("in-memory lock guard payload is always a Uuid");
        let mut state = self.state.lock().await;
        if let Some(entry) = state.locks.get(&guard.key) {
            if entry.owner == owner {
                state.locks.remove(&guard.key);
            }
        }
        Ok(())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream> {
        if prefix == keys::JOB_PREFIX {
            return self.watch_jobs().await;
        }
        if prefix == keys::UPDATE_PREFIX {
            return self.watch_updates().await;
        }
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.state.lock().await.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.kv.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.lock().await.kv.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fpcoord_common::{NameVariant, PrimaryDef, ResourceId, ResourceKind, Schedule};

    use super::*;

    fn primary(name: &str) -> ResourceDef {
        ResourceDef::Primary(PrimaryDef {
            id: ResourceId::new(ResourceKind::Primary, name, ""),
            owner: "alice".into(),
            provider: "warehouse".into(),
            external_table: "orders_raw".into(),
        })
    }

    #[tokio::test]
    async fn lock_contention_is_exclusive() {
        let store = InMemoryStore::new();
        let first = store.try_lock("LOCK__x", Duration::from_secs(5)).await.unwrap();
        assert!(first.is_some());
        let second = store.try_lock("LOCK__x", Duration::from_secs(5)).await.unwrap();
        assert!(second.is_none(), "a held lock must not be acquirable again");

        store.unlock(first.unwrap()).await.unwrap();
        let third = store.try_lock("LOCK__x", Duration::from_secs(5)).await.unwrap();
        assert!(third.is_some(), "releasing the lock must allow reacquisition");
    }

    #[tokio::test]
    async fn lease_expiry_allows_reacquisition_without_explicit_unlock() {
        let store = InMemoryStore::new();
        let _guard = store.try_lock("LOCK__y", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let reacquired = store.try_lock("LOCK__y", Duration::from_secs(5)).await.unwrap();
        assert!(reacquired.is_some());
    }

    #[tokio::test]
    async fn create_all_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.create_all(vec![primary("orders")]).await.unwrap();
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        let record = store.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Created);
        assert_eq!(record.def.schedule(), Schedule::none());

        let nv = NameVariant::new("orders", "");
        assert!(store.get_source_variant(&nv).await.unwrap().is_some());
    }
}
