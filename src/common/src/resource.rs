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

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a declared resource. Stable, uppercase wire form is used in
/// coordination-store keys (`JOB__<kind>__<name>__<variant>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Primary,
    Transformation,
    Feature,
    Label,
    TrainingSet,
    Source,
}

impl ResourceKind {
    pub fn as_key_segment(&self) -> &'static str {
        match self {
            ResourceKind::Primary => "PRIMARY",
            ResourceKind::Transformation => "TRANSFORMATION",
            ResourceKind::Feature => "FEATURE",
            ResourceKind::Label => "LABEL",
            ResourceKind::TrainingSet => "TRAINING_SET",
            ResourceKind::Source => "SOURCE",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key_segment())
    }
}

/// A name/variant pair, the unit other resources depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameVariant {
    pub name: String,
    pub variant: String,
}

impl NameVariant {
    pub fn new(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
        }
    }

    /// The `"<name>.<variant>"` form used as a template-resolver mapping key.
    pub fn mapping_key(&self) -> String {
        format!("{}.{}", self.name, self.variant)
    }
}

impl fmt::Display for NameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.variant)
    }
}

/// (name, variant, kind), globally unique per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
    pub variant: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            variant: variant.into(),
        }
    }

    pub fn name_variant(&self) -> NameVariant {
        NameVariant::new(self.name.clone(), self.variant.clone())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}__{}", self.kind, self.name, self.variant)
    }
}

/// Resource status. Monotone within a kind: `Created` -> `Pending` ->
/// (`Ready` | `ReadyOnline` | `Failed`). `Failed` is terminal from the
/// coordinator's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Created,
    Pending,
    Ready,
    ReadyOnline,
    Failed { message: String },
}

impl ResourceStatus {
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, ResourceStatus::Ready | ResourceStatus::ReadyOnline)
    }

    pub fn is_ready_like(&self) -> bool {
        self.is_terminal_success()
    }

    /// Whether transitioning from `self` to `next` respects the monotonicity
    /// invariant in §3: no transition out of `Ready`/`ReadyOnline` except a
    /// no-op (scheduled updates only touch `LastUpdated`, never status).
    pub fn can_transition_to(&self, next: &ResourceStatus) -> bool {
        use ResourceStatus::*;
        match (self, next) {
            (Created, Pending) => true,
            (Pending, Ready) | (Pending, ReadyOnline) | (Pending, Failed { .. }) => true,
            (Failed { .. }, Pending) => true,
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Created => write!(f, "created"),
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::ReadyOnline => write!(f, "ready_online"),
            ResourceStatus::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// A five-field cron expression. Empty/`None` means "no schedule".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schedule(pub Option<String>);

impl Schedule {
    pub fn none() -> Self {
        Schedule(None)
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        let expr = expr.into();
        if expr.trim().is_empty() {
            Schedule(None)
        } else {
            Schedule(Some(expr))
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.0.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn expr(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryDef {
    pub id: ResourceId,
    pub owner: String,
    pub provider: String,
    pub external_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationDef {
    pub id: ResourceId,
    pub owner: String,
    pub provider: String,
    pub schedule: Schedule,
    pub template: String,
    pub dependencies: Vec<NameVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    pub id: ResourceId,
    pub owner: String,
    pub source: NameVariant,
    pub offline_provider: String,
    pub online_provider: String,
    pub schedule: Schedule,
    pub value_type: crate::value::ValueType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDef {
    pub id: ResourceId,
    pub owner: String,
    pub source: NameVariant,
    pub provider: String,
    pub value_type: crate::value::ValueType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSetDef {
    pub id: ResourceId,
    pub owner: String,
    pub provider: String,
    pub schedule: Schedule,
    pub label: NameVariant,
    pub features: Vec<NameVariant>,
}

/// Tagged union over the per-kind resource definitions. The dispatch table
/// in `fpcoord_meta::coordinator::routines` matches on this rather than
/// using subtype inheritance, per §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceDef {
    Primary(PrimaryDef),
    Transformation(TransformationDef),
    Feature(FeatureDef),
    Label(LabelDef),
    TrainingSet(TrainingSetDef),
}

impl ResourceDef {
    pub fn id(&self) -> &ResourceId {
        match self {
            ResourceDef::Primary(d) => &d.id,
            ResourceDef::Transformation(d) => &d.id,
            ResourceDef::Feature(d) => &d.id,
            ResourceDef::Label(d) => &d.id,
            ResourceDef::TrainingSet(d) => &d.id,
        }
    }

    pub fn schedule(&self) -> Schedule {
        match self {
            ResourceDef::Primary(_) => Schedule::none(),
            ResourceDef::Transformation(d) => d.schedule.clone(),
            ResourceDef::Feature(d) => d.schedule.clone(),
            ResourceDef::Label(_) => Schedule::none(),
            ResourceDef::TrainingSet(d) => d.schedule.clone(),
        }
    }

    /// Direct dependencies as name/variant pairs, used for readiness checks
    /// and cycle detection (§9).
    pub fn dependencies(&self) -> Vec<NameVariant> {
        match self {
            ResourceDef::Primary(_) => vec![],
            ResourceDef::Transformation(d) => d.dependencies.clone(),
            ResourceDef::Feature(d) => vec![d.source.clone()],
            ResourceDef::Label(d) => vec![d.source.clone()],
            ResourceDef::TrainingSet(d) => {
                let mut deps = vec![d.label.clone()];
                deps.extend(d.features.iter().cloned());
                deps
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotone() {
        use ResourceStatus::*;
        assert!(Created.can_transition_to(&Pending));
        assert!(Pending.can_transition_to(&Ready));
        assert!(Pending.can_transition_to(&ReadyOnline));
        assert!(Pending.can_transition_to(&Failed {
            message: "boom".into()
        }));

        // Nothing transitions back out of a terminal-success state.
        assert!(!Ready.can_transition_to(&Created));
        assert!(!Ready.can_transition_to(&Pending));
        assert!(!ReadyOnline.can_transition_to(&Pending));
        assert!(!Failed {
            message: "x".into()
        }
        .can_transition_to(&Ready));

        // A scheduled update only ever re-confirms the same status.
        assert!(Ready.can_transition_to(&Ready));
    }

    #[test]
    fn schedule_empty_string_means_unscheduled() {
        assert!(!Schedule::cron("").is_scheduled());
        assert!(!Schedule::cron("   ").is_scheduled());
        assert!(Schedule::cron("*/1 * * * *").is_scheduled());
        assert!(!Schedule::none().is_scheduled());
    }

    #[test]
    fn resource_id_display_matches_key_segment_convention() {
        let id = ResourceId::new(ResourceKind::Feature, "avg_purchase", "v1");
        assert_eq!(id.to_string(), "FEATURE__avg_purchase__v1");
    }
}
