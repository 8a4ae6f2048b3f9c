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

//! World: the facade that owns every subsystem.
//!
//! The World exclusively owns entity slots, component columns, the
//! scheduler, the archetype index, the query cache, and the event bus.
//! Systems borrow it mutably for the duration of their `update` slice; no
//! ownership cycles exist anywhere in the graph.

use std::cell::RefCell;
use std::time::Duration;

use ahash::AHashMap;
use serde::Serialize;

use crate::archetype::{signature_of, ArchetypeIndex, ArchetypeSignature};
use crate::column::{Column, DuplicateAdd, FieldsMut, FieldsRef};
use crate::component::{ComponentData, ComponentTypeId, Schema};
use crate::entity::{EntityAllocator, EntityHandle};
use crate::error::{EcsError, Result};
use crate::event::{EventHandler, EventPayload, EventTypeId, OverflowPolicy, SubscriberToken};
use crate::event_bus::{EventBus, EventSender};
use crate::query::{QueryCache, QuerySpec};
use crate::schedule::Scheduler;
use crate::stats::{SchedulerStats, SystemStats, WorldStats};
use crate::system::{BoxedSystem, Phase, SystemAccess, SystemRecord};
use crate::time::{FrameClock, DEFAULT_FIXED_DT, DEFAULT_MAX_DT};

/// Tunables fixed at world construction
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorldConfig {
    /// Entity index cap; `create_entity` fails with `Exhausted` beyond it
    pub max_entities: u32,
    /// Generation ceiling per slot; reaching it retires the slot
    pub generation_cap: u32,
    /// Behavior of `add_component` on an entity that already has the type
    pub duplicate_add: DuplicateAdd,
    pub fixed_dt: f32,
    pub max_dt: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_entities: u32::MAX,
            generation_cap: u32::MAX,
            duplicate_add: DuplicateAdd::Replace,
            fixed_dt: DEFAULT_FIXED_DT,
            max_dt: DEFAULT_MAX_DT,
        }
    }
}

/// Central ECS world
pub struct World {
    config: WorldConfig,
    entities: EntityAllocator,
    columns: AHashMap<ComponentTypeId, Column>,
    archetypes: ArchetypeIndex,
    scheduler: Scheduler,
    bus: EventBus,
    query_cache: RefCell<QueryCache>,
    /// Set while a frame is in flight; locks the system set
    in_update: bool,
    frames: u64,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            config,
            entities: EntityAllocator::new(config.max_entities, config.generation_cap),
            columns: AHashMap::new(),
            archetypes: ArchetypeIndex::new(),
            scheduler: Scheduler::new(FrameClock::new(config.fixed_dt, config.max_dt)),
            bus: EventBus::new(),
            query_cache: RefCell::new(QueryCache::new()),
            in_update: false,
            frames: 0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // ========== Registration ==========

    /// Declare a component column once; the schema is fixed from here on
    pub fn register_component(&mut self, type_id: ComponentTypeId, schema: Schema) -> Result<()> {
        if self.columns.contains_key(&type_id) {
            return Err(EcsError::AlreadyRegistered);
        }
        self.columns.insert(type_id, Column::new(type_id, schema));
        Ok(())
    }

    /// Declare an event channel once
    pub fn register_event(&mut self, type_id: EventTypeId, name: impl Into<String>) -> Result<()> {
        self.bus.register(type_id, name)
    }

    /// Bound an event channel's queue
    pub fn set_event_cap(
        &mut self,
        type_id: EventTypeId,
        cap: Option<usize>,
        overflow: OverflowPolicy,
    ) -> Result<()> {
        self.bus.set_cap(type_id, cap, overflow)
    }

    /// Add a system with declared dependencies. Fails with `DuplicateName`
    /// or `CyclicDependency` (the registration is rolled back), and with
    /// `ScheduleLocked` from inside a running frame.
    pub fn register_system(
        &mut self,
        name: &str,
        phase: Phase,
        deps: &[&str],
        system: BoxedSystem,
    ) -> Result<()> {
        self.register_system_with_access(name, phase, deps, SystemAccess::empty(), system)
    }

    /// Like `register_system`, with advisory component read/write sets
    pub fn register_system_with_access(
        &mut self,
        name: &str,
        phase: Phase,
        deps: &[&str],
        access: SystemAccess,
        system: BoxedSystem,
    ) -> Result<()> {
        if self.in_update {
            return Err(EcsError::ScheduleLocked);
        }
        self.scheduler.register(SystemRecord::new(
            name,
            phase,
            deps.iter().map(|d| d.to_string()).collect(),
            access,
            system,
        ))
    }

    pub fn unregister_system(&mut self, name: &str) -> Result<()> {
        if self.in_update {
            return Err(EcsError::ScheduleLocked);
        }
        self.scheduler.unregister(name)
    }

    /// System names in execution order
    pub fn execution_order(&self) -> Vec<String> {
        self.scheduler.execution_order()
    }

    // ========== Entities ==========

    pub fn create_entity(&mut self) -> Result<EntityHandle> {
        let handle = self.entities.create()?;
        self.archetypes.insert(handle, ArchetypeSignature::new());
        Ok(handle)
    }

    /// Destroy a live entity: purge it from every column, drop it from its
    /// archetype bucket, and invalidate every copy of the handle.
    pub fn destroy_entity(&mut self, handle: EntityHandle) -> Result<()> {
        let signature: ArchetypeSignature = signature_of(self.entities.components(handle)?);

        for type_id in &signature {
            if let Some(column) = self.columns.get_mut(type_id) {
                let removed = column.remove(handle);
                debug_assert!(removed.is_ok(), "BUG: slot listed a type its column lacks");
            }
        }

        self.archetypes.remove(handle, &signature);
        self.entities.destroy(handle)
    }

    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.entities.is_alive(handle)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    // ========== Components ==========

    /// Attach a component. Duplicate adds follow the configured policy:
    /// `Replace` overwrites in place (the archetype is unchanged), `Reject`
    /// fails with `AlreadyPresent`.
    pub fn add_component(
        &mut self,
        handle: EntityHandle,
        type_id: ComponentTypeId,
        data: ComponentData,
    ) -> Result<()> {
        self.entities.check(handle)?;
        let column = self.columns.get_mut(&type_id).ok_or(EcsError::UnknownType)?;

        let was_present = column.has(handle);
        column.add(handle, &data, self.config.duplicate_add)?;
        if was_present {
            // In-place replace: no structural change, caches stay valid
            return Ok(());
        }

        let old = signature_of(self.entities.components(handle)?);
        self.entities.attach(handle, type_id)?;
        let new = signature_of(self.entities.components(handle)?);
        self.archetypes.relocate(handle, &old, new);
        Ok(())
    }

    /// Detach a component; dense storage is cleared to field defaults
    pub fn remove_component(
        &mut self,
        handle: EntityHandle,
        type_id: ComponentTypeId,
    ) -> Result<()> {
        self.entities.check(handle)?;
        let column = self.columns.get_mut(&type_id).ok_or(EcsError::UnknownType)?;
        column.remove(handle)?;

        let old = signature_of(self.entities.components(handle)?);
        self.entities.detach(handle, type_id)?;
        let new = signature_of(self.entities.components(handle)?);
        self.archetypes.relocate(handle, &old, new);
        Ok(())
    }

    /// Read-only field view
    pub fn get_component(
        &self,
        handle: EntityHandle,
        type_id: ComponentTypeId,
    ) -> Result<FieldsRef<'_>> {
        self.entities.check(handle)?;
        let column = self.columns.get(&type_id).ok_or(EcsError::UnknownType)?;
        column.get(handle)
    }

    /// Mutable field view
    pub fn get_component_mut(
        &mut self,
        handle: EntityHandle,
        type_id: ComponentTypeId,
    ) -> Result<FieldsMut<'_>> {
        self.entities.check(handle)?;
        let column = self.columns.get_mut(&type_id).ok_or(EcsError::UnknownType)?;
        column.get_mut(handle)
    }

    pub fn has_component(&self, handle: EntityHandle, type_id: ComponentTypeId) -> bool {
        self.entities.is_alive(handle)
            && self
                .columns
                .get(&type_id)
                .map(|c| c.has(handle))
                .unwrap_or(false)
    }

    // ========== Queries ==========

    /// Live entities whose component set contains every `required` id and
    /// none of the `forbidden` ids, in driver-slot order. Results are
    /// memoized until the next structural mutation.
    pub fn query(
        &self,
        required: &[ComponentTypeId],
        forbidden: &[ComponentTypeId],
    ) -> Result<Vec<EntityHandle>> {
        let spec = QuerySpec::new(required, forbidden);
        self.query_cache.borrow_mut().get_or_resolve(
            spec,
            self.archetypes.epoch(),
            &self.columns,
            &self.entities,
        )
    }

    // ========== Events ==========

    /// Emit into the channel's write queue; delivery happens at the next
    /// frame barrier. Returns the event's sequence number.
    pub fn send_event(
        &mut self,
        type_id: EventTypeId,
        payload: EventPayload,
        sender: EntityHandle,
    ) -> Result<u64> {
        self.bus.send(type_id, payload, sender)
    }

    pub fn subscribe(
        &mut self,
        type_id: EventTypeId,
        handler: EventHandler,
    ) -> Result<SubscriberToken> {
        self.bus.subscribe(type_id, handler)
    }

    pub fn unsubscribe(&mut self, token: SubscriberToken) -> Result<()> {
        self.bus.unsubscribe(token)
    }

    /// Cloneable handle for producers outside the tick (other threads).
    /// Their events join the normal barrier flow on the next update.
    pub fn event_sender(&self) -> EventSender {
        self.bus.sender()
    }

    // ========== Frame control ==========

    /// Halt Fixed-phase execution starting next frame. Variable-phase
    /// systems keep running so overlays stay responsive.
    pub fn pause(&mut self) {
        self.scheduler.clock.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.clock.resume();
    }

    /// Run exactly one fixed iteration on the next `update`
    pub fn step(&mut self) {
        self.scheduler.clock.step();
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.clock.is_paused()
    }

    /// Advance one host frame.
    ///
    /// Order per call: drain the external inbox, clamp and accumulate `dt`,
    /// run every Fixed-phase system once per whole fixed step in
    /// topological order, swap-and-drain the event buffers (the frame
    /// barrier), then run every Variable-phase system once with the wall
    /// dt.
    pub fn update(&mut self, dt: f32) {
        if self.in_update {
            tracing::warn!("re-entrant world update ignored");
            return;
        }

        self.bus.drain_inbox();
        let plan = self.scheduler.clock.begin_frame(dt);
        let fixed_dt = self.scheduler.clock.fixed_dt();

        let fixed_plan = self.scheduler.plan(Phase::Fixed);
        let variable_plan = self.scheduler.plan(Phase::Variable);

        // Detach the system set so systems can borrow the world mutably.
        // The set is locked (ScheduleLocked) until it is reattached.
        let mut systems = std::mem::take(&mut self.scheduler.systems);
        self.in_update = true;

        let mut slowest: Option<(String, Duration)> = None;
        let mut note = |record: &SystemRecord, elapsed: Duration| {
            if slowest.as_ref().map(|(_, t)| elapsed > *t).unwrap_or(true) {
                slowest = Some((record.name().to_string(), elapsed));
            }
        };

        for _ in 0..plan.fixed_steps {
            for &i in &fixed_plan {
                let elapsed = systems[i].run_timed(fixed_dt, self);
                note(&systems[i], elapsed);
            }
        }

        // Frame barrier: everything emitted by the fixed block is delivered
        // here; emissions during the drain wait for the next barrier.
        self.bus.dispatch();

        for &i in &variable_plan {
            let elapsed = systems[i].run_timed(plan.dt, self);
            note(&systems[i], elapsed);
        }

        drop(note);
        self.in_update = false;
        self.scheduler.systems = systems;
        self.scheduler.note_frame_timings(slowest);
        self.frames += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    // ========== Observability ==========

    /// Assemble the full snapshot. Columns sort by type id and systems
    /// appear in execution order, so successive snapshots diff cleanly.
    pub fn stats(&self) -> WorldStats {
        let mut columns: Vec<_> = self.columns.values().map(Column::stats).collect();
        columns.sort_by_key(|c| c.type_id);

        // .get(): a system reading stats mid-frame sees no rows rather
        // than indexing the detached system set
        let systems = self
            .scheduler
            .order
            .iter()
            .filter_map(|&i| self.scheduler.systems.get(i))
            .map(|record| SystemStats {
                name: record.name().to_string(),
                last_ms: record.last_time().as_secs_f64() * 1000.0,
                avg_ms: record.avg_time().as_secs_f64() * 1000.0,
                calls: record.calls(),
            })
            .collect();

        WorldStats {
            entities: self.entities.stats(),
            columns,
            systems,
            scheduler: SchedulerStats {
                accumulator: self.scheduler.clock.accumulator(),
                fixed_dt: self.scheduler.clock.fixed_dt(),
                paused: self.scheduler.clock.is_paused(),
                last_slowest: self.scheduler.last_slowest().map(String::from),
            },
            events: self.bus.stats(),
            dt_history: self.scheduler.clock.history().snapshot(),
        }
    }

    /// Entities currently in the bucket with exactly this signature
    pub fn archetype_entities(&self, type_ids: &[ComponentTypeId]) -> Vec<EntityHandle> {
        let sig = signature_of(type_ids);
        let mut out: Vec<_> = self
            .archetypes
            .bucket(&sig)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.bucket_count()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
