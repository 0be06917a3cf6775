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

//! Shared data model for the feature-platform coordinator: resource
//! identifiers, status, coordination-store keys, and the error kinds that
//! flow between the provider, runner, and coordinator layers.

pub mod error;
pub mod keys;
pub mod resource;
pub mod value;

pub use error::{Error, Result};
pub use resource::{
    FeatureDef, LabelDef, NameVariant, PrimaryDef, ResourceDef, ResourceId, ResourceKind,
    ResourceStatus, Schedule, TrainingSetDef, TransformationDef,
};
pub use value::{Value, ValueType};
