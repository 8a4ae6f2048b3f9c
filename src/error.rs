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

//! Error types

use std::fmt;

/// ECS error type
///
/// Structural and resource errors surface here. Policy signals (load factor,
/// slow systems) are not errors; they are reported through stats.
#[derive(Debug, Clone, PartialEq)]
pub enum EcsError {
    /// Handle generation does not match the slot (entity was destroyed)
    StaleHandle,

    /// Component or event type id was never registered
    UnknownType,

    /// Component or event type id registered twice
    AlreadyRegistered,

    /// Entity already has this component (duplicate-add policy is Reject)
    AlreadyPresent,

    /// Entity does not have this component
    NotPresent,

    /// Field name or scalar kind does not match the registered schema
    SchemaMismatch(String),

    /// A system with this name is already registered
    DuplicateName,

    /// System dependencies form a cycle; payload names the participants
    CyclicDependency(Vec<String>),

    /// System set cannot change while a frame is executing
    ScheduleLocked,

    /// No registered system has this name
    UnknownSystem,

    /// Entity index space (or the configured cap) is used up
    Exhausted,

    /// Allocation failed while growing a column; the column keeps its old capacity
    AllocFailure,

    /// Event channel is at its configured cap
    QueueFull,

    /// Subscription token does not name a live subscriber
    UnknownToken,

    /// Event inbox is no longer attached to a world
    Disconnected,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::StaleHandle => write!(f, "Stale entity handle"),
            EcsError::UnknownType => write!(f, "Unknown component or event type"),
            EcsError::AlreadyRegistered => write!(f, "Type already registered"),
            EcsError::AlreadyPresent => write!(f, "Component already present on entity"),
            EcsError::NotPresent => write!(f, "Component not present on entity"),
            EcsError::SchemaMismatch(msg) => write!(f, "Schema mismatch: {msg}"),
            EcsError::DuplicateName => write!(f, "Duplicate system name"),
            EcsError::CyclicDependency(names) => {
                write!(f, "System dependency cycle: {}", names.join(" -> "))
            }
            EcsError::ScheduleLocked => write!(f, "System set cannot change during a frame"),
            EcsError::UnknownSystem => write!(f, "No registered system has this name"),
            EcsError::Exhausted => write!(f, "Entity capacity exhausted"),
            EcsError::AllocFailure => write!(f, "Allocation failed while growing column"),
            EcsError::QueueFull => write!(f, "Event channel is full"),
            EcsError::UnknownToken => write!(f, "Unknown subscription token"),
            EcsError::Disconnected => write!(f, "Event inbox is detached from its world"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
