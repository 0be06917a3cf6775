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

//! Runner configs and the chunked materialization algorithm (C2, §4.2).
//! Runners are a tagged variant discriminated by name (§9): this module
//! defines the config payloads and the `Runner` trait; [`registry`] is the
//! name -> factory dispatch table.

pub mod copy_to_online;
pub mod create_training_set;
pub mod create_transformation;
pub mod materialize;
pub mod registry;

use async_trait::async_trait;
use fpcoord_common::{ResourceId, ValueType};
use serde::{Deserialize, Serialize};

use crate::watcher::WatcherRef;

pub const RUNNER_COPY_TO_ONLINE: &str = "COPY_TO_ONLINE";
pub const RUNNER_MATERIALIZE: &str = "MATERIALIZE";
pub const RUNNER_CREATE_TRAINING_SET: &str = "CREATE_TRAINING_SET";
pub const RUNNER_CREATE_TRANSFORMATION: &str = "CREATE_TRANSFORMATION";

/// Every runner name a worker pod can be asked to run. A spawner that
/// cannot consult a live [`registry::RunnerRegistry`] (e.g. one submitting
/// cluster objects rather than constructing runners in-process) checks
/// against this list instead, so an unknown name still errors before any
/// side effect (§4.4).
const KNOWN_RUNNER_NAMES: &[&str] = &[
    RUNNER_COPY_TO_ONLINE,
    RUNNER_MATERIALIZE,
    RUNNER_CREATE_TRAINING_SET,
    RUNNER_CREATE_TRANSFORMATION,
];

pub fn is_known_runner(name: &str) -> bool {
    KNOWN_RUNNER_NAMES.contains(&name)
}

/// Where a runner's work is physically executed, per the resource's
/// provider-independent schedule/placement policy (§4.2 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudTag {
    Cluster,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializedChunkRunnerConfig {
    pub online_type: String,
    pub offline_type: String,
    pub online_config: serde_json::Value,
    pub offline_config: serde_json::Value,
    pub materialization_id: String,
    pub resource_id: ResourceId,
    pub chunk_index: u64,
    pub chunk_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeRunnerConfig {
    pub online_type: String,
    pub offline_type: String,
    pub online_config: serde_json::Value,
    pub offline_config: serde_json::Value,
    pub id: ResourceId,
    pub source_table: String,
    pub value_type: ValueType,
    pub cloud: CloudTag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTrainingSetRunnerConfig {
    pub offline_type: String,
    pub offline_config: serde_json::Value,
    pub label_table: String,
    pub feature_tables: Vec<String>,
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransformationRunnerConfig {
    pub offline_type: String,
    pub offline_config: serde_json::Value,
    pub resource_id: ResourceId,
    pub resolved_sql: String,
}

/// A unit of dispatchable work. `run` starts the work (possibly
/// fire-and-forget in a background task) and returns a [`Watcher`] the
/// caller awaits for completion (§4.3, §4.7).
#[async_trait]
pub trait Runner: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(self: Box<Self>) -> WatcherRef;
}

/// A single chunk's row extent, the unit of parallelism fanned out to
/// workers (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: u64,
    pub num_chunks: u64,
}

/// `chunkSize = min(n, 1024)`, `numChunks = ceil(n / chunkSize)`, with
/// `numChunks = 0` iff `n == 0` (§4.2 step 3, §8 "chunk arithmetic").
pub fn compute_chunk_plan(num_rows: u64) -> ChunkPlan {
    const MAX_CHUNK_SIZE: u64 = 1024;
    if num_rows == 0 {
        return ChunkPlan {
            chunk_size: 0,
            num_chunks: 0,
        };
    }
    let chunk_size = num_rows.min(MAX_CHUNK_SIZE);
    let num_chunks = (num_rows + chunk_size - 1) / chunk_size;
    ChunkPlan {
        chunk_size,
        num_chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_arithmetic_never_undercounts_and_caps_chunk_size() {
        for &n in &[0u64, 1, 1023, 1024, 1025, 2048, 10_000, 1_048_577] {
            let plan = compute_chunk_plan(n);
            assert!(plan.chunk_size <= 1024, "n={n}");
            if n == 0 {
                assert_eq!(plan.num_chunks, 0);
                continue;
            }
            assert!(plan.num_chunks >= 1);
            assert!(
                plan.num_chunks * plan.chunk_size >= n,
                "n={n} chunks={} size={}",
                plan.num_chunks,
                plan.chunk_size
            );
            // At most one partial chunk: every chunk but the last is full.
            let full_chunks_rows = (plan.num_chunks - 1) * plan.chunk_size;
            assert!(full_chunks_rows < n || plan.num_chunks == 1);
        }
    }

    #[test]
    fn chunk_size_never_exceeds_row_count() {
        let plan = compute_chunk_plan(5);
        assert_eq!(plan.chunk_size, 5);
        assert_eq!(plan.num_chunks, 1);
    }
}
