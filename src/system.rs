//! System trait, phases, and per-system execution records.
//!
//! Systems are owned by the scheduler and borrow the world only for the
//! duration of one `update` call. Dependencies and component access sets
//! are declared at registration; access sets are advisory (the core does
//! not enforce aliasing yet).

use std::time::{Duration, Instant};

use crate::component::ComponentTypeId;
use crate::error::Result;
use crate::world::World;

/// Execution class of a system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Runs once per fixed step with the fixed dt
    Fixed,
    /// Runs once per host frame with the wall dt (render-class work)
    Variable,
}

/// Fallback phase guess from the system name. Declaring the phase at
/// registration is the contract; this prefix heuristic exists only for
/// hosts that register legacy name-only system lists.
pub fn infer_phase(name: &str) -> Phase {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("render") || lower.starts_with("draw") || lower.starts_with("ui") {
        Phase::Variable
    } else {
        Phase::Fixed
    }
}

/// Advisory read/write component sets declared by a system
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: Vec<ComponentTypeId>,
    pub writes: Vec<ComponentTypeId>,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        let hits = |a: &[ComponentTypeId], b: &[ComponentTypeId]| {
            a.iter().any(|id| b.contains(id))
        };
        hits(&self.writes, &other.writes)
            || hits(&self.writes, &other.reads)
            || hits(&self.reads, &other.writes)
    }
}

/// A unit of simulation work
pub trait System {
    /// Advance the system by `dt` seconds against the world
    fn update(&mut self, dt: f32, world: &mut World) -> Result<()>;
}

impl<F> System for F
where
    F: FnMut(f32, &mut World) -> Result<()>,
{
    fn update(&mut self, dt: f32, world: &mut World) -> Result<()> {
        self(dt, world)
    }
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

/// Box a closure as a system. The explicit `FnMut` bound lets closure
/// argument and return types infer at the call site.
pub fn fn_system<F>(f: F) -> BoxedSystem
where
    F: FnMut(f32, &mut World) -> Result<()> + 'static,
{
    Box::new(f)
}

/// Scheduler-owned record: the system plus its registration metadata and
/// running timing counters.
pub struct SystemRecord {
    pub(crate) name: String,
    pub(crate) phase: Phase,
    pub(crate) deps: Vec<String>,
    pub(crate) access: SystemAccess,
    pub(crate) system: BoxedSystem,
    pub(crate) last_time: Duration,
    pub(crate) cumulative_time: Duration,
    pub(crate) calls: u64,
}

impl SystemRecord {
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        deps: Vec<String>,
        access: SystemAccess,
        system: BoxedSystem,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            deps,
            access,
            system,
            last_time: Duration::ZERO,
            cumulative_time: Duration::ZERO,
            calls: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the system once and fold the elapsed time into the record.
    /// A failing system is logged and does not abort the frame.
    pub(crate) fn run_timed(&mut self, dt: f32, world: &mut World) -> Duration {
        let start = Instant::now();
        if let Err(err) = self.system.update(dt, world) {
            tracing::error!(system = %self.name, %err, "system update failed");
        }
        let elapsed = start.elapsed();
        self.last_time = elapsed;
        self.cumulative_time += elapsed;
        self.calls += 1;
        elapsed
    }

    pub fn last_time(&self) -> Duration {
        self.last_time
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Mean elapsed time over all calls
    pub fn avg_time(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.cumulative_time / self.calls as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_phase_prefixes() {
        assert_eq!(infer_phase("RenderSprites"), Phase::Variable);
        assert_eq!(infer_phase("draw_overlay"), Phase::Variable);
        assert_eq!(infer_phase("ui_layout"), Phase::Variable);
        assert_eq!(infer_phase("Movement"), Phase::Fixed);
    }

    #[test]
    fn test_access_conflicts() {
        let a = SystemAccess {
            reads: vec![],
            writes: vec![ComponentTypeId(1)],
        };
        let b = SystemAccess {
            reads: vec![ComponentTypeId(1)],
            writes: vec![],
        };
        let c = SystemAccess {
            reads: vec![ComponentTypeId(2)],
            writes: vec![],
        };
        assert!(a.conflicts_with(&b));
        assert!(!b.conflicts_with(&c));
        assert!(!b.conflicts_with(&b)); // read-read never conflicts
    }
}
