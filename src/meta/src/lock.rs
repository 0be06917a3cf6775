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

//! Per-resource distributed locking on top of a [`CoordinationClient`]
//! (§3 "lock key", §4.6 step 1, §5). A lock is held for at most one job
//! task at a time; lease expiry is the crash-recovery mechanism, not
//! something this module has to reason about.

use std::time::Duration;

use fpcoord_common::{keys, Result};

use crate::manager::{CoordinationClient, LockGuard};

/// The lease TTL used for per-resource job/update locks. Short enough that
/// a crashed coordinator's lock lapses quickly (§5), long enough to cover a
/// single metadata round-trip plus dispatch.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

/// Attempts to acquire the lock protecting `wrapped_key` (a job or update
/// key). Returns `Ok(None)` on contention — another coordinator owns the
/// job — which callers treat as "skip, not an error" (§7.7).
pub async fn try_acquire(
    coordination: &dyn CoordinationClient,
    wrapped_key: &str,
    ttl: Duration,
) -> Result<Option<LockGuard>> {
    coordination.try_lock(&keys::lock_key(wrapped_key), ttl).await
}

pub async fn release(coordination: &dyn CoordinationClient, guard: LockGuard) -> Result<()> {
    coordination.unlock(guard).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::manager::memory::InMemoryStore;

    #[tokio::test]
    async fn only_one_coordinator_observes_an_acquired_lock() {
        let store: Arc<InMemoryStore> = InMemoryStore::new();
        let job_key = "JOB__FEATURE__x__v1";

        let a = try_acquire(store.as_ref(), job_key, DEFAULT_LEASE_TTL).await.unwrap();
        let b = try_acquire(store.as_ref(), job_key, DEFAULT_LEASE_TTL).await.unwrap();
        assert!(a.is_some());
        assert!(b.is_none());

        release(store.as_ref(), a.unwrap()).await.unwrap();
        let c = try_acquire(store.as_ref(), job_key, DEFAULT_LEASE_TTL).await.unwrap();
        assert!(c.is_some());
    }
}
