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

//! An in-memory `OfflineStore`/`OnlineStore` pair. Stands in for a real
//! warehouse/online-store driver (out of scope per §1) so the coordinator's
//! own logic is independently testable, mirroring the teacher's
//! `MemStore`/`EtcdMetaStore` duality referenced in `rpc/server.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use fpcoord_common::{ResourceId, Value, ValueType};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{
    CreateOutcome, Materialization, OfflineResult, OfflineStore, OfflineTableRef, OnlineResult,
    OnlineStore, OnlineTable, Provider, ResolvedTrainingSetDef, Row, Schema, TrainingRow,
    TrainingSetHandle,
};

/// Process-wide name -> instance lookup, so a runner dispatched with only a
/// provider type tag and its `{"name": ...}` config (§4.1) can get back the
/// same live store a real warehouse driver would reconnect to by address.
static OFFLINE_INSTANCES: Lazy<Mutex<HashMap<String, Arc<MemoryOfflineStore>>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static ONLINE_INSTANCES: Lazy<Mutex<HashMap<String, Arc<MemoryOnlineStore>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Default)]
struct OfflineState {
    primary: HashMap<String, OfflineTableRef>,
    transformations: HashMap<String, OfflineTableRef>,
    external_tables: HashMap<String, Vec<Row>>,
    materializations: HashMap<String, Arc<MemMaterialization>>,
    training_sets: HashMap<String, Arc<MemTrainingSet>>,
}

/// An in-memory offline warehouse. `seed_external_table` lets tests and the
/// §8 worked examples populate rows a "primary" source would otherwise read
/// from a real warehouse.
pub struct MemoryOfflineStore {
    name: String,
    state: Mutex<OfflineState>,
}

impl MemoryOfflineStore {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let store = Arc::new(Self {
            name: name.clone(),
            state: Mutex::new(OfflineState::default()),
        });
        OFFLINE_INSTANCES.lock().insert(name, store.clone());
        store
    }

    /// Looks an instance back up by the name embedded in its `config()`.
    pub fn lookup(name: &str) -> Option<Arc<Self>> {
        OFFLINE_INSTANCES.lock().get(name).cloned()
    }

    pub fn seed_external_table(&self, name: &str, rows: Vec<Row>) {
        self.state
            .lock()
            .external_tables
            .insert(name.to_string(), rows);
    }

    /// Used by the SQL-transformation routine to read a dependency's rows
    /// for in-memory "execution" of a resolved template. A real warehouse
    /// would run the SQL itself; here we just replay the first referenced
    /// table's rows, which is sufficient for the template-resolution and
    /// readiness-gating properties this workspace actually tests.
    pub fn rows_of(&self, resolved_table: &str) -> Vec<Row> {
        let state = self.state.lock();
        state
            .external_tables
            .get(resolved_table)
            .cloned()
            .unwrap_or_default()
    }
}

impl Provider for MemoryOfflineStore {
    fn provider_type(&self) -> &'static str {
        "memory_offline"
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name })
    }
}

#[async_trait]
impl OfflineStore for MemoryOfflineStore {
    async fn create_primary_table(&self, id: &ResourceId, _schema: Schema) -> OfflineResult<CreateOutcome> {
        let mut state = self.state.lock();
        let key = id.to_string();
        if state.primary.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.primary.insert(
            key.clone(),
            OfflineTableRef {
                provider_name: self.name.clone(),
                resolved_table: key,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn register_primary_from_existing(
        &self,
        id: &ResourceId,
        external_name: &str,
    ) -> OfflineResult<OfflineTableRef> {
        let mut state = self.state.lock();
        let rows = state
            .external_tables
            .get(external_name)
            .cloned()
            .ok_or_else(|| anyhow!("external table `{external_name}` does not exist"))?;
        let table_ref = OfflineTableRef {
            provider_name: self.name.clone(),
            resolved_table: external_name.to_string(),
        };
        state.primary.insert(id.to_string(), table_ref.clone());
        // Also indexed under the primary's own id, the same way
        // `create_materialization`/`register_label`/`create_transformation`
        // alias their outputs, so a downstream dependency resolves a
        // primary source by resource id exactly like it resolves any other
        // kind of source.
        state.external_tables.insert(id.to_string(), rows);
        Ok(table_ref)
    }

    async fn create_transformation(&self, id: &ResourceId, resolved_sql: &str) -> OfflineResult<CreateOutcome> {
        let mut state = self.state.lock();
        let key = id.to_string();
        if state.transformations.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        // No real SQL engine: the "output table" of a transformation is
        // whatever its first resolved dependency's rows were. This keeps
        // downstream features/labels over a transformation iterable in
        // tests without implementing a query planner (out of scope, §1).
        let source_table = extract_first_quoted_identifier(resolved_sql);
        let rows = source_table
            .as_deref()
            .map(|t| state.external_tables.get(t).cloned().unwrap_or_default())
            .unwrap_or_default();
        state.external_tables.insert(key.clone(), rows);
        state.transformations.insert(
            key.clone(),
            OfflineTableRef {
                provider_name: self.name.clone(),
                resolved_table: key,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn get_primary_table(&self, id: &ResourceId) -> OfflineResult<Option<OfflineTableRef>> {
        Ok(self.state.lock().primary.get(&id.to_string()).cloned())
    }

    async fn get_transformation_table(&self, id: &ResourceId) -> OfflineResult<Option<OfflineTableRef>> {
        Ok(self.state.lock().transformations.get(&id.to_string()).cloned())
    }

    async fn get_materialization(&self, id: &ResourceId) -> OfflineResult<Option<Arc<dyn Materialization>>> {
        Ok(self
            .state
            .lock()
            .materializations
            .get(&id.to_string())
            .map(|m| m.clone() as Arc<dyn Materialization>))
    }

    async fn create_materialization(
        &self,
        feature_id: &ResourceId,
        source_table: &str,
    ) -> OfflineResult<Arc<dyn Materialization>> {
        let key = feature_id.to_string();
        let mut state = self.state.lock();
        if let Some(existing) = state.materializations.get(&key) {
            return Ok(existing.clone());
        }
        let rows = state.external_tables.get(source_table).cloned().unwrap_or_default();
        let mat = Arc::new(MemMaterialization {
            id: key.clone(),
            rows: rows.clone(),
        });
        state.materializations.insert(key.clone(), mat.clone());
        // Also indexed under the feature's own id so a downstream training
        // set (or another feature) can resolve it the same way it resolves
        // a primary table or transformation output.
        state.external_tables.insert(key, rows);
        Ok(mat)
    }

    async fn register_label(&self, id: &ResourceId, source_table: &str) -> OfflineResult<CreateOutcome> {
        let mut state = self.state.lock();
        let key = id.to_string();
        if state.external_tables.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let rows = state.external_tables.get(source_table).cloned().unwrap_or_default();
        state.external_tables.insert(key, rows);
        Ok(CreateOutcome::Created)
    }

    async fn create_training_set(&self, def: &ResolvedTrainingSetDef) -> OfflineResult<CreateOutcome> {
        let key = def.id.to_string();
        let mut state = self.state.lock();
        if state.training_sets.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let label_rows = state
            .external_tables
            .get(&def.label_table.resolved_table)
            .cloned()
            .unwrap_or_default();
        let feature_rows: Vec<Vec<Row>> = def
            .feature_tables
            .iter()
            .map(|t| state.external_tables.get(&t.resolved_table).cloned().unwrap_or_default())
            .collect();

        // Point-in-time join on entity: for each label row, take the most
        // recent feature row at or before the label's timestamp.
        let mut joined = Vec::with_capacity(label_rows.len());
        for label_row in &label_rows {
            let mut feature_values = Vec::with_capacity(feature_rows.len());
            for rows in &feature_rows {
                let pit = rows
                    .iter()
                    .filter(|r| r.entity == label_row.entity && r.ts <= label_row.ts)
                    .max_by_key(|r| r.ts);
                match pit {
                    Some(r) => feature_values.push(r.value.clone()),
                    None => continue,
                }
            }
            if feature_values.len() == feature_rows.len() {
                joined.push(TrainingRow {
                    features: feature_values,
                    label: label_row.value.clone(),
                });
            }
        }

        state.training_sets.insert(
            key,
            Arc::new(MemTrainingSet { rows: joined }),
        );
        Ok(CreateOutcome::Created)
    }

    async fn get_training_set(&self, id: &ResourceId) -> OfflineResult<Option<Arc<dyn TrainingSetHandle>>> {
        Ok(self
            .state
            .lock()
            .training_sets
            .get(&id.to_string())
            .map(|t| t.clone() as Arc<dyn TrainingSetHandle>))
    }

    async fn create_resource_table(&self, id: &ResourceId, _schema: Schema) -> OfflineResult<CreateOutcome> {
        let mut state = self.state.lock();
        let key = id.to_string();
        if state.external_tables.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.external_tables.insert(key, vec![]);
        Ok(CreateOutcome::Created)
    }
}

fn extract_first_quoted_identifier(sql: &str) -> Option<String> {
    let start = sql.find('"')? + 1;
    let end = sql[start..].find('"')? + start;
    Some(sql[start..end].to_string())
}

struct MemMaterialization {
    id: String,
    rows: Vec<Row>,
}

#[async_trait]
impl Materialization for MemMaterialization {
    fn id(&self) -> &str {
        &self.id
    }

    async fn num_rows(&self) -> OfflineResult<u64> {
        Ok(self.rows.len() as u64)
    }

    async fn read_chunk(&self, offset: u64, limit: u64) -> OfflineResult<Vec<Row>> {
        let start = offset as usize;
        let end = (start + limit as usize).min(self.rows.len());
        if start >= self.rows.len() {
            return Ok(vec![]);
        }
        Ok(self.rows[start..end].to_vec())
    }
}

struct MemTrainingSet {
    rows: Vec<TrainingRow>,
}

#[async_trait]
impl TrainingSetHandle for MemTrainingSet {
    async fn rows(&self) -> OfflineResult<Vec<TrainingRow>> {
        Ok(self.rows.clone())
    }
}

#[derive(Default)]
struct OnlineState {
    tables: HashMap<String, Arc<MemOnlineTable>>,
}

pub struct MemoryOnlineStore {
    name: String,
    state: Mutex<OnlineState>,
}

impl MemoryOnlineStore {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let store = Arc::new(Self {
            name: name.clone(),
            state: Mutex::new(OnlineState::default()),
        });
        ONLINE_INSTANCES.lock().insert(name, store.clone());
        store
    }

    pub fn lookup(name: &str) -> Option<Arc<Self>> {
        ONLINE_INSTANCES.lock().get(name).cloned()
    }
}

impl Provider for MemoryOnlineStore {
    fn provider_type(&self) -> &'static str {
        "memory_online"
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name })
    }
}

#[async_trait]
impl OnlineStore for MemoryOnlineStore {
    async fn create_table(&self, id: &ResourceId, _value_type: ValueType) -> OnlineResult<CreateOutcome> {
        let mut state = self.state.lock();
        let key = id.to_string();
        if state.tables.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.tables.insert(key, Arc::new(MemOnlineTable::default()));
        Ok(CreateOutcome::Created)
    }

    async fn get_table(&self, id: &ResourceId) -> OnlineResult<Option<Arc<dyn OnlineTable>>> {
        Ok(self
            .state
            .lock()
            .tables
            .get(&id.to_string())
            .map(|t| t.clone() as Arc<dyn OnlineTable>))
    }
}

#[derive(Default)]
struct MemOnlineTable {
    rows: Mutex<HashMap<String, Value>>,
    #[allow(dead_code)]
    writes: AtomicU64,
}

#[async_trait]
impl OnlineTable for MemOnlineTable {
    async fn get(&self, entity: &str) -> OnlineResult<Option<Value>> {
        Ok(self.rows.lock().get(entity).cloned())
    }

    async fn set(&self, entity: &str, value: Value) -> OnlineResult<()> {
        self.rows.lock().insert(entity.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
