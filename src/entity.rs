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

//! Entity handles and the generational slot allocator.
//!
//! A handle is `(index, generation)`. The index locates a slot in the
//! allocator's table; the generation distinguishes reuses of that slot, so
//! a handle kept across a destroy goes stale instead of aliasing the next
//! entity that lands in the same slot.

use serde::Serialize;
use smallvec::SmallVec;

use crate::component::ComponentTypeId;
use crate::error::{EcsError, Result};

/// Opaque entity reference: slot index plus the slot's generation at
/// creation time. Copyable, never an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index of this handle
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a single u64 (generation in the high half)
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpack from the u64 form produced by [`to_bits`](Self::to_bits)
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// One entry of the slot table
#[derive(Debug, Clone)]
struct EntitySlot {
    generation: u32,
    alive: bool,
    /// Component type ids attached to the entity, kept sorted. This doubles
    /// as the entity's archetype signature.
    components: SmallVec<[ComponentTypeId; 8]>,
}

/// Snapshot of allocator counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EntityStats {
    pub alive: usize,
    pub created: u64,
    pub destroyed: u64,
    pub reused: u64,
    /// Alive entities over total slots ever minted
    pub load_factor: f32,
}

/// Generational entity allocator: slot table plus a free-list of released
/// indices. Indices come from the free-list first; a new index is minted
/// only when the free-list is empty.
pub struct EntityAllocator {
    slots: Vec<EntitySlot>,
    free: Vec<u32>,
    alive: usize,
    created: u64,
    destroyed: u64,
    reused: u64,
    max_entities: u32,
    generation_cap: u32,
}

impl EntityAllocator {
    pub fn new(max_entities: u32, generation_cap: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            alive: 0,
            created: 0,
            destroyed: 0,
            reused: 0,
            max_entities,
            generation_cap,
        }
    }

    /// Allocate a handle with a fresh or reused index
    pub fn create(&mut self) -> Result<EntityHandle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            slot.components.clear();
            self.alive += 1;
            self.created += 1;
            self.reused += 1;
            return Ok(EntityHandle::new(index, slot.generation));
        }

        if self.slots.len() as u32 >= self.max_entities {
            return Err(EcsError::Exhausted);
        }

        let index = self.slots.len() as u32;
        self.slots.push(EntitySlot {
            generation: 0,
            alive: true,
            components: SmallVec::new(),
        });
        self.alive += 1;
        self.created += 1;
        Ok(EntityHandle::new(index, 0))
    }

    /// Release a handle. The slot's generation is bumped so every copy of
    /// the handle goes stale, and the index returns to the free-list.
    pub fn destroy(&mut self, handle: EntityHandle) -> Result<()> {
        self.check(handle)?;

        let slot = &mut self.slots[handle.index() as usize];
        slot.alive = false;
        slot.components.clear();
        self.alive -= 1;
        self.destroyed += 1;

        // Generation overflow is a fatal invariant: abort in debug, retire
        // the slot (no reuse, no wrap) in release with a diagnostic.
        if slot.generation >= self.generation_cap {
            debug_assert!(
                false,
                "BUG: generation overflow on entity slot {}",
                handle.index()
            );
            tracing::error!(
                index = handle.index(),
                "entity slot retired: generation cap reached"
            );
            slot.generation = self.generation_cap;
            return Ok(());
        }

        slot.generation += 1;
        self.free.push(handle.index());
        Ok(())
    }

    /// O(1) liveness check
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.slots
            .get(handle.index() as usize)
            .map(|slot| slot.alive && slot.generation == handle.generation())
            .unwrap_or(false)
    }

    /// Liveness check that surfaces `StaleHandle`
    pub fn check(&self, handle: EntityHandle) -> Result<()> {
        if self.is_alive(handle) {
            Ok(())
        } else {
            Err(EcsError::StaleHandle)
        }
    }

    /// Sorted component type ids attached to a live entity
    pub fn components(&self, handle: EntityHandle) -> Result<&[ComponentTypeId]> {
        self.check(handle)?;
        Ok(&self.slots[handle.index() as usize].components)
    }

    /// Record a component attach; keeps the slot's list sorted
    pub fn attach(&mut self, handle: EntityHandle, type_id: ComponentTypeId) -> Result<()> {
        self.check(handle)?;
        let components = &mut self.slots[handle.index() as usize].components;
        if let Err(pos) = components.binary_search(&type_id) {
            components.insert(pos, type_id);
        }
        Ok(())
    }

    /// Record a component detach
    pub fn detach(&mut self, handle: EntityHandle, type_id: ComponentTypeId) -> Result<()> {
        self.check(handle)?;
        let components = &mut self.slots[handle.index() as usize].components;
        if let Ok(pos) = components.binary_search(&type_id) {
            components.remove(pos);
        }
        Ok(())
    }

    /// Iterate live handles in index order. This is the deterministic
    /// world-wide iteration order queries with no required set use.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.alive
                .then(|| EntityHandle::new(index as u32, slot.generation))
        })
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Counter snapshot; never computed on the hot path
    pub fn stats(&self) -> EntityStats {
        let load_factor = if self.slots.is_empty() {
            0.0
        } else {
            self.alive as f32 / self.slots.len() as f32
        };
        EntityStats {
            alive: self.alive,
            created: self.created,
            destroyed: self.destroyed,
            reused: self.reused,
            load_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> EntityAllocator {
        EntityAllocator::new(u32::MAX, u32::MAX)
    }

    #[test]
    fn test_create_is_alive() {
        let mut alloc = allocator();
        let e = alloc.create().unwrap();
        assert!(alloc.is_alive(e));
        assert_eq!(e.index(), 0);
        assert_eq!(e.generation(), 0);
    }

    #[test]
    fn test_destroy_invalidates_handle() {
        let mut alloc = allocator();
        let e = alloc.create().unwrap();
        alloc.destroy(e).unwrap();
        assert!(!alloc.is_alive(e));
        assert_eq!(alloc.destroy(e), Err(EcsError::StaleHandle));
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut alloc = allocator();
        let a = alloc.create().unwrap();
        alloc.destroy(a).unwrap();

        let b = alloc.create().unwrap();
        assert_eq!(b.index(), a.index());
        assert!(b.generation() > a.generation());
        assert!(!alloc.is_alive(a));
        assert!(alloc.is_alive(b));
        assert_eq!(alloc.stats().reused, 1);
    }

    #[test]
    fn test_fresh_index_only_when_free_list_empty() {
        let mut alloc = allocator();
        let a = alloc.create().unwrap();
        let b = alloc.create().unwrap();
        assert_ne!(a.index(), b.index());

        alloc.destroy(a).unwrap();
        let c = alloc.create().unwrap();
        assert_eq!(c.index(), a.index());
    }

    #[test]
    fn test_exhausted() {
        let mut alloc = EntityAllocator::new(2, u32::MAX);
        alloc.create().unwrap();
        alloc.create().unwrap();
        assert_eq!(alloc.create(), Err(EcsError::Exhausted));
    }

    #[test]
    fn test_bits_round_trip() {
        let h = EntityHandle::new(7, 3);
        assert_eq!(EntityHandle::from_bits(h.to_bits()), h);
    }

    #[test]
    fn test_iter_alive_index_order() {
        let mut alloc = allocator();
        let a = alloc.create().unwrap();
        let b = alloc.create().unwrap();
        let c = alloc.create().unwrap();
        alloc.destroy(b).unwrap();

        let alive: Vec<_> = alloc.iter_alive().collect();
        assert_eq!(alive, vec![a, c]);
    }

    #[test]
    fn test_stats_counts() {
        let mut alloc = allocator();
        let a = alloc.create().unwrap();
        let _b = alloc.create().unwrap();
        alloc.destroy(a).unwrap();
        alloc.create().unwrap();

        let stats = alloc.stats();
        assert_eq!(stats.alive, 2);
        assert_eq!(stats.created, 3);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.reused, 1);
        assert!(stats.load_factor > 0.99);
    }
}
