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

//! The provider abstraction (C1, §4.1): a uniform capability surface over
//! offline warehouses and online key-value stores. Concrete warehouse/store
//! drivers are out of scope (§1); [`memory`] provides the reference
//! implementation used by the worked examples in §8 and by every coordinator
//! test in this workspace.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use fpcoord_common::{ResourceId, Value, ValueType};

pub type OfflineResult<T> = anyhow::Result<T>;
pub type OnlineResult<T> = anyhow::Result<T>;

/// Whether a `CreateX` call produced a fresh artifact or observed one that
/// already existed. The coordinator treats both as success (§4.1, §7.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

impl CreateOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, CreateOutcome::Created)
    }
}

/// A table schema: an ordered list of typed, named columns.
#[derive(Debug, Clone)]
pub struct Schema {
    pub columns: Vec<(String, ValueType)>,
}

/// An immutable offline-table reference returned once the table exists.
#[derive(Debug, Clone)]
pub struct OfflineTableRef {
    pub provider_name: String,
    pub resolved_table: String,
}

/// A row of an offline table: entity key plus typed value, as consumed by
/// materialization and training-set iteration.
#[derive(Debug, Clone)]
pub struct Row {
    pub entity: String,
    pub value: Value,
    pub ts: i64,
}

/// A provider-side immutable snapshot of a feature's offline table (§3).
#[async_trait]
pub trait Materialization: Send + Sync {
    fn id(&self) -> &str;
    async fn num_rows(&self) -> OfflineResult<u64>;
    /// Reads rows `[offset, offset + limit)` in point-in-time order.
    async fn read_chunk(&self, offset: u64, limit: u64) -> OfflineResult<Vec<Row>>;
}

/// A materialized training row: feature values joined to a label at the
/// label's entity/timestamp (§8 scenario 2).
#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub features: Vec<Value>,
    pub label: Value,
}

#[async_trait]
pub trait TrainingSetHandle: Send + Sync {
    async fn rows(&self) -> OfflineResult<Vec<TrainingRow>>;
}

/// A training-set definition resolved to concrete provider-side tables,
/// handed to `OfflineStore::create_training_set`.
#[derive(Debug, Clone)]
pub struct ResolvedTrainingSetDef {
    pub id: ResourceId,
    pub label_table: OfflineTableRef,
    pub feature_tables: Vec<OfflineTableRef>,
}

/// Every store exposes its type tag and serialized config so a runner can be
/// reconstructed inside a worker process that never saw the original
/// in-process `Arc` (§4.1).
pub trait Provider: Send + Sync {
    fn provider_type(&self) -> &'static str;
    fn config(&self) -> serde_json::Value;
}

#[async_trait]
pub trait OfflineStore: Provider {
    async fn create_primary_table(&self, id: &ResourceId, schema: Schema) -> OfflineResult<CreateOutcome>;
    async fn register_primary_from_existing(
        &self,
        id: &ResourceId,
        external_name: &str,
    ) -> OfflineResult<OfflineTableRef>;
    async fn create_transformation(&self, id: &ResourceId, resolved_sql: &str) -> OfflineResult<CreateOutcome>;
    async fn get_primary_table(&self, id: &ResourceId) -> OfflineResult<Option<OfflineTableRef>>;
    async fn get_transformation_table(&self, id: &ResourceId) -> OfflineResult<Option<OfflineTableRef>>;
    async fn get_materialization(&self, id: &ResourceId) -> OfflineResult<Option<Arc<dyn Materialization>>>;
    /// Snapshots `source_table`'s rows into a materialization keyed by
    /// `feature_id` (§3: "provider-side immutable snapshot").
    async fn create_materialization(
        &self,
        feature_id: &ResourceId,
        source_table: &str,
    ) -> OfflineResult<Arc<dyn Materialization>>;
    /// Registers a label as an offline table derived from `source_table`'s
    /// rows, so a training set can join against it the same way it joins
    /// against a feature or a primary table.
    async fn register_label(&self, id: &ResourceId, source_table: &str) -> OfflineResult<CreateOutcome>;
    async fn create_training_set(&self, def: &ResolvedTrainingSetDef) -> OfflineResult<CreateOutcome>;
    async fn get_training_set(&self, id: &ResourceId) -> OfflineResult<Option<Arc<dyn TrainingSetHandle>>>;
    async fn create_resource_table(&self, id: &ResourceId, schema: Schema) -> OfflineResult<CreateOutcome>;
}

#[async_trait]
pub trait OnlineTable: Send + Sync {
    async fn get(&self, entity: &str) -> OnlineResult<Option<Value>>;
    async fn set(&self, entity: &str, value: Value) -> OnlineResult<()>;
}

#[async_trait]
pub trait OnlineStore: Provider {
    async fn create_table(&self, id: &ResourceId, value_type: ValueType) -> OnlineResult<CreateOutcome>;
    async fn get_table(&self, id: &ResourceId) -> OnlineResult<Option<Arc<dyn OnlineTable>>>;
}

pub type OfflineStoreRef = Arc<dyn OfflineStore>;
pub type OnlineStoreRef = Arc<dyn OnlineStore>;
