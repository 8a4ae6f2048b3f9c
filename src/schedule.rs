//! Scheduler: system registry, dependency ordering, frame clock.
//!
//! Dependencies form a DAG over system names. Every register/unregister
//! re-sorts via Kahn's algorithm; among ready nodes the earliest-registered
//! system wins, so ordering is deterministic frame over frame. A cycle
//! rejects the offending registration and the prior valid order survives.

use std::collections::BTreeSet;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::system::{Phase, SystemRecord};
use crate::time::FrameClock;

pub struct Scheduler {
    /// Registration order is the tie-break order, so records never reorder
    pub(crate) systems: Vec<SystemRecord>,
    /// Topological execution order as indices into `systems`
    pub(crate) order: Vec<usize>,
    pub(crate) clock: FrameClock,
    pub(crate) last_slowest: Option<String>,
}

impl Scheduler {
    pub fn new(clock: FrameClock) -> Self {
        Self {
            systems: Vec::new(),
            order: Vec::new(),
            clock,
            last_slowest: None,
        }
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Add a system. Fails with `DuplicateName` on a name collision and
    /// `CyclicDependency` if the new node closes a cycle; in both cases the
    /// scheduler is left exactly as it was.
    pub fn register(&mut self, record: SystemRecord) -> Result<()> {
        if self.systems.iter().any(|s| s.name() == record.name()) {
            return Err(EcsError::DuplicateName);
        }

        self.systems.push(record);
        match self.sort() {
            Ok(order) => {
                self.order = order;
                Ok(())
            }
            Err(err) => {
                self.systems.pop();
                Err(err)
            }
        }
    }

    /// Remove a system by name. Removal cannot introduce a cycle, so the
    /// remaining set always re-sorts cleanly.
    pub fn unregister(&mut self, name: &str) -> Result<()> {
        let idx = self
            .systems
            .iter()
            .position(|s| s.name() == name)
            .ok_or(EcsError::UnknownSystem)?;
        self.systems.remove(idx);
        self.order = self.sort()?;
        Ok(())
    }

    /// System names in execution order. Empty while a frame has the system
    /// set detached (records are back before `update` returns).
    pub fn execution_order(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|&i| self.systems.get(i).map(|s| s.name().to_string()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.systems.iter().any(|s| s.name() == name)
    }

    /// Record the slowest system observed in the last frame
    pub(crate) fn note_frame_timings(&mut self, slowest: Option<(String, Duration)>) {
        if let Some((name, _)) = slowest {
            self.last_slowest = Some(name);
        }
    }

    pub fn last_slowest(&self) -> Option<&str> {
        self.last_slowest.as_deref()
    }

    /// Kahn's algorithm. Edges run dep -> dependent. Unknown dependency
    /// names are warned about and skipped; the declaration stays on the
    /// record and becomes a real edge if that system registers later.
    fn sort(&self) -> Result<Vec<usize>> {
        let n = self.systems.len();
        let mut by_name: FxHashMap<&str, usize> = FxHashMap::default();
        for (i, s) in self.systems.iter().enumerate() {
            by_name.insert(s.name(), i);
        }

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        for (i, s) in self.systems.iter().enumerate() {
            for dep in &s.deps {
                match by_name.get(dep.as_str()) {
                    Some(&j) => {
                        edges[j].push(i);
                        in_degree[i] += 1;
                    }
                    None => {
                        tracing::warn!(
                            system = s.name(),
                            dependency = dep.as_str(),
                            "dependency on unknown system ignored"
                        );
                    }
                }
            }
        }

        // Ready set keyed by registration index: insertion order breaks ties
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&i) = ready.iter().next() {
            ready.remove(&i);
            order.push(i);
            for &j in &edges[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() != n {
            let participants = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.systems[i].name().to_string())
                .collect();
            return Err(EcsError::CyclicDependency(participants));
        }
        Ok(order)
    }

    /// Per-phase execution plan as indices into `systems`
    pub(crate) fn plan(&self, phase: Phase) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|&i| self.systems[i].phase() == phase)
            .collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(FrameClock::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{fn_system, Phase, SystemAccess, SystemRecord};

    fn noop(name: &str, deps: &[&str]) -> SystemRecord {
        SystemRecord::new(
            name,
            Phase::Fixed,
            deps.iter().map(|d| d.to_string()).collect(),
            SystemAccess::empty(),
            fn_system(|_dt, _world| Ok(())),
        )
    }

    #[test]
    fn test_dependencies_order_execution() {
        let mut sched = Scheduler::default();
        // Registered out of order: C first, then A, then B
        sched.register(noop("C", &["B"])).unwrap();
        sched.register(noop("A", &[])).unwrap();
        sched.register(noop("B", &["A"])).unwrap();

        assert_eq!(sched.execution_order(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut sched = Scheduler::default();
        sched.register(noop("second", &[])).unwrap();
        sched.register(noop("first", &[])).unwrap();
        // No edges at all: registration order is the execution order
        assert_eq!(sched.execution_order(), vec!["second", "first"]);
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let mut sched = Scheduler::default();
        sched.register(noop("Y", &["X"])).unwrap(); // X unknown: warned, ignored
        assert_eq!(sched.execution_order(), vec!["Y"]);

        // Registering X materializes Y -> X and closes the cycle
        let err = sched.register(noop("X", &["Y"])).unwrap_err();
        match err {
            EcsError::CyclicDependency(names) => {
                assert!(names.contains(&"X".to_string()));
                assert!(names.contains(&"Y".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }

        // Prior valid order is preserved
        assert!(!sched.contains("X"));
        assert_eq!(sched.execution_order(), vec!["Y"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut sched = Scheduler::default();
        sched.register(noop("physics", &[])).unwrap();
        assert_eq!(
            sched.register(noop("physics", &[])).unwrap_err(),
            EcsError::DuplicateName
        );
    }

    #[test]
    fn test_unregister_restores_previous_order() {
        let mut sched = Scheduler::default();
        sched.register(noop("A", &[])).unwrap();
        sched.register(noop("B", &["A"])).unwrap();
        let before = sched.execution_order();

        sched.register(noop("C", &["B"])).unwrap();
        sched.unregister("C").unwrap();
        assert_eq!(sched.execution_order(), before);

        assert_eq!(
            sched.unregister("C").unwrap_err(),
            EcsError::UnknownSystem
        );
    }

    #[test]
    fn test_phase_plans_filter() {
        let mut sched = Scheduler::default();
        sched.register(noop("sim", &[])).unwrap();
        let mut render = noop("render", &[]);
        render.phase = Phase::Variable;
        sched.register(render).unwrap();

        assert_eq!(sched.plan(Phase::Fixed).len(), 1);
        assert_eq!(sched.plan(Phase::Variable).len(), 1);
    }
}
