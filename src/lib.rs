// Copyright 2024 Saptak Santra
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

//! Columnar ECS - data-oriented Entity Component System core
//!
//! Single-threaded simulation kernel: generational entity handles,
//! Structure-of-Arrays component columns with sparse-set indexing,
//! signature queries, a fixed-timestep scheduler with declared system
//! dependencies, and a double-buffered event bus.

pub mod archetype;
pub mod column;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod query;
pub mod schedule;
pub mod stats;
pub mod system;
pub mod time;
pub mod world;

// Re-exports for convenience
pub use column::{ColumnStats, DuplicateAdd, FieldsMut, FieldsRef};
pub use component::{ComponentData, ComponentTypeId, FieldDescriptor, FieldKind, FieldValue, Schema};
pub use entity::{EntityHandle, EntityStats};
pub use error::{EcsError, Result};
pub use event::{EventPayload, EventRecord, EventTypeId, OverflowPolicy, SubscriberToken};
pub use event_bus::{EventBusStats, EventSender};
pub use query::QuerySpec;
pub use stats::{SchedulerStats, SystemStats, WorldStats};
pub use system::{fn_system, infer_phase, BoxedSystem, Phase, System, SystemAccess};
pub use world::{World, WorldConfig};
