//! Observability snapshot.
//!
//! `World::stats()` assembles this once on demand; nothing here runs on the
//! hot path. The snapshot serializes to JSON for external tooling, but the
//! core mandates no wire protocol beyond that.

use serde::Serialize;

use crate::column::ColumnStats;
use crate::entity::EntityStats;
use crate::event_bus::EventBusStats;

/// Per-system timing row
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub name: String,
    pub last_ms: f64,
    pub avg_ms: f64,
    pub calls: u64,
}

/// Scheduler state at snapshot time
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub accumulator: f64,
    pub fixed_dt: f32,
    pub paused: bool,
    pub last_slowest: Option<String>,
}

/// Full world snapshot
#[derive(Debug, Clone, Serialize)]
pub struct WorldStats {
    pub entities: EntityStats,
    pub columns: Vec<ColumnStats>,
    /// Rows in execution order
    pub systems: Vec<SystemStats>,
    pub scheduler: SchedulerStats,
    pub events: EventBusStats,
    /// Clamped dt of the last frames, oldest first, at most 60 entries
    pub dt_history: Vec<f32>,
}

impl WorldStats {
    /// Render the snapshot as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("stats snapshot always serializes")
    }
}
