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

//! Coordination-store key construction and parsing (§6). Presence of a
//! `JOB__*` key signifies enqueued work; presence of an `UPDATE__*` key
//! signifies a fired schedule; `LOCK__*` wraps either for mutual exclusion.

use crate::resource::{ResourceId, ResourceKind};

pub const JOB_PREFIX: &str = "JOB__";
pub const UPDATE_PREFIX: &str = "UPDATE__";
pub const LOCK_PREFIX: &str = "LOCK__";

pub fn job_key(id: &ResourceId) -> String {
    format!("{JOB_PREFIX}{id}")
}

pub fn update_key(id: &ResourceId) -> String {
    format!("{UPDATE_PREFIX}{id}")
}

/// Locks wrap the key they protect, so a job lock and an update lock on the
/// same resource never collide with each other's bookkeeping key.
pub fn lock_key(wrapped: &str) -> String {
    format!("{LOCK_PREFIX}{wrapped}")
}

/// A fixed, collision-free name for the cluster cron object backing a
/// resource's schedule, stable across coordinator restarts so reconciliation
/// finds the same object (§6).
pub fn cron_job_name(id: &ResourceId) -> String {
    format!(
        "fpcoord-cron-{}-{}-{}",
        id.kind.as_key_segment().to_lowercase(),
        sanitize(&id.name),
        sanitize(&id.variant)
    )
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .to_lowercase()
}

/// Parses a `JOB__<kind>__<name>__<variant>` (or `UPDATE__...`) key back
/// into a `ResourceId`. Returns `None` on malformed input rather than
/// erroring, since watch loops see keys written by any client and a
/// malformed key is simply not ours to act on.
pub fn parse_resource_key(prefix: &str, key: &str) -> Option<ResourceId> {
    let rest = key.strip_prefix(prefix)?;
    let mut parts = rest.splitn(3, "__");
    let kind_str = parts.next()?;
    let name = parts.next()?;
    let variant = parts.next().unwrap_or("");
    let kind = match kind_str {
        "PRIMARY" => ResourceKind::Primary,
        "TRANSFORMATION" => ResourceKind::Transformation,
        "FEATURE" => ResourceKind::Feature,
        "LABEL" => ResourceKind::Label,
        "TRAINING_SET" => ResourceKind::TrainingSet,
        "SOURCE" => ResourceKind::Source,
        _ => return None,
    };
    Some(ResourceId::new(kind, name, variant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_round_trips_through_parse() {
        let id = ResourceId::new(ResourceKind::Transformation, "clean_events", "v3");
        let key = job_key(&id);
        assert_eq!(key, "JOB__TRANSFORMATION__clean_events__v3");
        assert_eq!(parse_resource_key(JOB_PREFIX, &key), Some(id));
    }

    #[test]
    fn update_key_uses_its_own_prefix() {
        let id = ResourceId::new(ResourceKind::Feature, "avg_purchase", "");
        let key = update_key(&id);
        assert_eq!(key, "UPDATE__FEATURE__avg_purchase__");
        assert!(parse_resource_key(JOB_PREFIX, &key).is_none());
        assert_eq!(parse_resource_key(UPDATE_PREFIX, &key), Some(id));
    }

    #[test]
    fn cron_job_name_is_deterministic_and_collision_free_across_kinds() {
        let feature = ResourceId::new(ResourceKind::Feature, "x", "v1");
        let label = ResourceId::new(ResourceKind::Label, "x", "v1");
        assert_eq!(cron_job_name(&feature), cron_job_name(&feature));
        assert_ne!(cron_job_name(&feature), cron_job_name(&label));
    }

    #[test]
    fn lock_key_wraps_the_job_key_not_the_bare_resource() {
        let id = ResourceId::new(ResourceKind::Primary, "orders", "");
        let job = job_key(&id);
        assert_eq!(lock_key(&job), format!("LOCK__{job}"));
    }
}
