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

//! An etcd-backed `MetadataClient`/`CoordinationClient`. Resource records
//! are JSON blobs under a `RESOURCE__<id>` key; job/update/lock keys are
//! the bare presence markers from §6. Grounded on the teacher's own
//! `etcd_client::ConnectOptions` usage in `rpc/server.rs`.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions, EventType, GetOptions, LeaseGrantOptions, LockOptions, PutOptions, WatchOptions,
};
use fpcoord_common::{keys, Error, NameVariant, ResourceDef, ResourceId, ResourceStatus, Result};
use tokio::sync::mpsc;

use super::{CoordinationClient, LockGuard, MetadataClient, ResourceRecord, WatchEvent, WatchStream};

const RESOURCE_PREFIX: &str = "RESOURCE__";

pub struct EtcdClients {
    client: Client,
}

impl EtcdClients {
    pub async fn connect(endpoints: &[String], options: Option<ConnectOptions>) -> Result<Self> {
        let client = Client::connect(endpoints, options)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("failed to connect to etcd: {e}")))?;
        Ok(Self { client })
    }

    fn resource_key(id: &ResourceId) -> String {
        format!("{RESOURCE_PREFIX}{id}")
    }

    async fn load_record(&self, id: &ResourceId) -> Result<Option<ResourceRecord>> {
        let mut client = self.client.clone();
        let resp = client
            .get(Self::resource_key(id), None)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd get failed: {e}")))?;
        let Some(kv) = resp.kvs().first() else {
            return Ok(None);
        };
        let record: StoredRecord = serde_json::from_slice(kv.value())
            .map_err(|e| Error::Provider(anyhow::anyhow!("corrupt resource record for {id}: {e}")))?;
        Ok(Some(record.into()))
    }

    async fn store_record(&self, record: &ResourceRecord) -> Result<()> {
        let mut client = self.client.clone();
        let key = Self::resource_key(record.def.id());
        let stored = StoredRecord::from(record.clone());
        let bytes = serde_json::to_vec(&stored)
            .map_err(|e| Error::Provider(anyhow::anyhow!("failed to serialize resource record: {e}")))?;
        client
            .put(key, bytes, None)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd put failed: {e}")))?;
        Ok(())
    }

    async fn find_by_name_variant(&self, kind: fpcoord_common::ResourceKind, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        let mut client = self.client.clone();
        let resp = client
            .get(RESOURCE_PREFIX, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd prefix get failed: {e}")))?;
        for kv in resp.kvs() {
            let record: StoredRecord = match serde_json::from_slice(kv.value()) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let record: ResourceRecord = record.into();
            let id = record.def.id();
            if id.kind == kind && id.name == nv.name && id.variant == nv.variant {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// The wire-serializable shadow of [`ResourceRecord`]. Kept distinct so the
/// in-process type can stay free of `serde` derives it doesn't otherwise
/// need.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredRecord {
    def: ResourceDef,
    status: ResourceStatus,
    last_updated: Option<i64>,
}

impl From<ResourceRecord> for StoredRecord {
    fn from(r: ResourceRecord) -> Self {
        Self {
            def: r.def,
            status: r.status,
            last_updated: r.last_updated,
        }
    }
}

impl From<StoredRecord> for ResourceRecord {
    fn from(r: StoredRecord) -> Self {
        Self {
            def: r.def,
            status: r.status,
            last_updated: r.last_updated,
        }
    }
}

#[async_trait]
impl MetadataClient for EtcdClients {
    async fn create_all(&self, defs: Vec<ResourceDef>) -> Result<()> {
        for def in defs {
            self.store_record(&ResourceRecord {
                def,
                status: ResourceStatus::Created,
                last_updated: None,
            })
            .await?;
        }
        Ok(())
    }

    async fn get_resource(&self, id: &ResourceId) -> Result<Option<ResourceRecord>> {
        self.load_record(id).await
    }

    async fn get_source_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        self.find_by_name_variant(fpcoord_common::ResourceKind::Primary, nv).await
    }

    async fn get_feature_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        self.find_by_name_variant(fpcoord_common::ResourceKind::Feature, nv).await
    }

    async fn get_label_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        self.find_by_name_variant(fpcoord_common::ResourceKind::Label, nv).await
    }

    async fn get_training_set_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>> {
        self.find_by_name_variant(fpcoord_common::ResourceKind::TrainingSet, nv).await
    }

    async fn set_status(&self, id: &ResourceId, status: ResourceStatus) -> Result<()> {
        let mut record = self.load_record(id).await?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.status = status;
        self.store_record(&record).await
    }

    async fn set_update_status(&self, id: &ResourceId, last_updated: i64) -> Result<()> {
        let mut record = self.load_record(id).await?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.last_updated = Some(last_updated);
        self.store_record(&record).await
    }

    async fn has_job(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.get(&keys::job_key(id)).await?.is_some())
    }

    async fn put_job(&self, id: &ResourceId) -> Result<()> {
        self.put(&keys::job_key(id), "").await
    }

    async fn delete_job(&self, id: &ResourceId) -> Result<()> {
        self.delete(&keys::job_key(id)).await
    }

    async fn put_update_event(&self, id: &ResourceId) -> Result<()> {
        self.put(&keys::update_key(id), "").await
    }

    async fn delete_update_event(&self, id: &ResourceId) -> Result<()> {
        self.delete(&keys::update_key(id)).await
    }

    async fn watch_jobs(&self) -> Result<WatchStream> {
        self.watch_prefix(keys::JOB_PREFIX).await
    }

    async fn watch_updates(&self) -> Result<WatchStream> {
        self.watch_prefix(keys::UPDATE_PREFIX).await
    }

    async fn fetch_source(&self, nv: &NameVariant) -> Result<ResourceRecord> {
        self.get_source_variant(nv).await?.ok_or_else(|| Error::NotFound(format!("source {nv}")))
    }

    async fn fetch_label(&self, nv: &NameVariant) -> Result<ResourceRecord> {
        self.get_label_variant(nv).await?.ok_or_else(|| Error::NotFound(format!("label {nv}")))
    }

    async fn fetch_features(&self, nvs: &[NameVariant]) -> Result<Vec<ResourceRecord>> {
        let mut out = Vec::with_capacity(nvs.len());
        for nv in nvs {
            out.push(
                self.get_feature_variant(nv)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("feature {nv}")))?,
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl CoordinationClient for EtcdClients {
    async fn try_lock(&self, key: &str, lease_ttl: Duration) -> Result<Option<LockGuard>> {
        let mut client = self.client.clone();
        let lease = client
            .lease_grant(lease_ttl.as_secs() as i64, Some(LeaseGrantOptions::new()))
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd lease_grant failed: {e}")))?;

        // `lock` blocks until acquired, which would hang a coordinator that
        // should skip contended work instead (§4.6 step 1: "if busy,
        // skip"). We race it against a short deadline so contention reads
        // as `Ok(None)` rather than blocking the watch loop.
        let acquire = client.lock(key, Some(LockOptions::new().with_lease(lease.id())));
        let Ok(lock_result) = tokio::time::timeout(Duration::from_millis(50), acquire).await else {
            return Ok(None);
        };
        let lock_resp = lock_result.map_err(|e| Error::Provider(anyhow::anyhow!("etcd lock failed: {e}")))?;
        Ok(Some(LockGuard::new(key, lock_resp.key().to_vec())))
    }

    async fn unlock(&self, guard: LockGuard) -> Result<()> {
        let lock_key = *guard
            .payload
            .downcast::<Vec<u8>>()
            .expect("etcd lock guard payload is always the lock's own key");
        let mut client = self.client.clone();
        client
            .unlock(lock_key)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd unlock failed: {e}")))?;
        Ok(())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream> {
        let mut client = self.client.clone();
        let (_watcher, mut stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd watch failed: {e}")))?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Ok(Some(resp)) = stream.message().await {
                for event in resp.events() {
                    let Some(kv) = event.kv() else { continue };
                    let Ok(key) = std::str::from_utf8(kv.key()) else { continue };
                    let mapped = match event.event_type() {
                        EventType::Put => WatchEvent::Put(key.to_string()),
                        EventType::Delete => WatchEvent::Delete(key.to_string()),
                    };
                    if tx.send(mapped).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .put(key, value, Option::<PutOptions>::None)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd put failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut client = self.client.clone();
        let resp = client
            .get(key, None)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd get failed: {e}")))?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(
                kv.value_str()
                    .map_err(|e| Error::Provider(anyhow::anyhow!("non-utf8 etcd value: {e}")))?
                    .to_string(),
            )),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .delete(key, None)
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("etcd delete failed: {e}")))?;
        Ok(())
    }
}
