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

//! The metadata client interface (C8, §4.8) and the coordination-store
//! primitives (locks, leases, watch) it is built on. [`etcd`] backs both
//! with a real etcd cluster; [`memory`] is the strongly-consistent,
//! single-process fake every coordinator test runs against.

pub mod etcd;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use fpcoord_common::{NameVariant, ResourceDef, ResourceId, ResourceStatus, Result};

/// A resource as stored in metadata: its definition plus mutable status and
/// last-scheduled-update timestamp.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub def: ResourceDef,
    pub status: ResourceStatus,
    pub last_updated: Option<i64>,
}

/// An event observed on a watched key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put(String),
    Delete(String),
}

pub type WatchStream = tokio::sync::mpsc::Receiver<WatchEvent>;

/// Typed reads/writes of resource definitions and status, plus job-key
/// bookkeeping and dependency traversal (§4.8). Reads and writes are
/// strongly consistent with respect to the backing coordination store.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn create_all(&self, defs: Vec<ResourceDef>) -> Result<()>;

    async fn get_resource(&self, id: &ResourceId) -> Result<Option<ResourceRecord>>;
    async fn get_source_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>>;
    async fn get_feature_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>>;
    async fn get_label_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>>;
    async fn get_training_set_variant(&self, nv: &NameVariant) -> Result<Option<ResourceRecord>>;

    async fn set_status(&self, id: &ResourceId, status: ResourceStatus) -> Result<()>;
    async fn set_update_status(&self, id: &ResourceId, last_updated: i64) -> Result<()>;

    /// True iff a `JOB__*` key exists for `id` (work is outstanding).
    async fn has_job(&self, id: &ResourceId) -> Result<bool>;
    async fn put_job(&self, id: &ResourceId) -> Result<()>;
    async fn delete_job(&self, id: &ResourceId) -> Result<()>;
    async fn put_update_event(&self, id: &ResourceId) -> Result<()>;
    async fn delete_update_event(&self, id: &ResourceId) -> Result<()>;

    async fn watch_jobs(&self) -> Result<WatchStream>;
    async fn watch_updates(&self) -> Result<WatchStream>;

    /// Resolves a dependency's provider-side table name, erroring if the
    /// dependency is absent or not yet `Ready`/`ReadyOnline` (§4.5,
    /// `mapNameVariantsToTables`).
    async fn fetch_source(&self, nv: &NameVariant) -> Result<ResourceRecord>;
    async fn fetch_label(&self, nv: &NameVariant) -> Result<ResourceRecord>;
    async fn fetch_features(&self, nvs: &[NameVariant]) -> Result<Vec<ResourceRecord>>;
}

/// Mutual exclusion and watch over raw coordination-store keys (C8
/// substrate). A lock's durable release mechanism is lease expiry (§5): the
/// lease is short, and a coordinator crash simply lets it lapse. The
/// explicit `unlock` call is the fast path taken on every normal exit from
/// a job task.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    async fn try_lock(&self, key: &str, lease_ttl: Duration) -> Result<Option<LockGuard>>;
    async fn unlock(&self, guard: LockGuard) -> Result<()>;
    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// An acquired lock, opaque to callers beyond the key it protects. Each
/// `CoordinationClient` implementation stashes what it needs to release the
/// lock (an etcd lock key, an in-memory owner token, ...) behind `payload`.
pub struct LockGuard {
    pub key: String,
    pub(crate) payload: Box<dyn std::any::Any + Send>,
}

impl LockGuard {
    pub fn new(key: impl Into<String>, payload: impl std::any::Any + Send) -> Self {
        Self {
            key: key.into(),
            payload: Box::new(payload),
        }
    }
}
