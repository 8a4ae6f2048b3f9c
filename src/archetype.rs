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

//! Archetype index: entities grouped by their component-type set.
//!
//! The signature is the canonical sorted list of type ids, used directly as
//! the bucket key. Every structural mutation bumps a global epoch counter
//! that query caches use as their invalidation token.

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::component::ComponentTypeId;
use crate::entity::EntityHandle;

/// Canonical (sorted) component-type set
pub type ArchetypeSignature = SmallVec<[ComponentTypeId; 8]>;

/// Build a canonical signature from an unsorted id list
pub fn signature_of(type_ids: &[ComponentTypeId]) -> ArchetypeSignature {
    let mut sig: ArchetypeSignature = SmallVec::from_slice(type_ids);
    sig.sort_unstable();
    sig.dedup();
    sig
}

/// Buckets of entities keyed by signature, plus the structural epoch
pub struct ArchetypeIndex {
    buckets: AHashMap<ArchetypeSignature, AHashSet<EntityHandle>>,
    epoch: u64,
}

impl ArchetypeIndex {
    pub fn new() -> Self {
        Self {
            buckets: AHashMap::new(),
            epoch: 0,
        }
    }

    /// Structural-mutation counter; bumped by every insert/remove/relocate
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Place a new entity in its bucket (the empty signature for a fresh
    /// entity with no components)
    pub fn insert(&mut self, handle: EntityHandle, signature: ArchetypeSignature) {
        self.buckets.entry(signature).or_default().insert(handle);
        self.epoch += 1;
    }

    /// Drop an entity from its bucket; empty buckets are pruned
    pub fn remove(&mut self, handle: EntityHandle, signature: &ArchetypeSignature) {
        if let Some(bucket) = self.buckets.get_mut(signature) {
            bucket.remove(&handle);
            if bucket.is_empty() {
                self.buckets.remove(signature);
            }
        }
        self.epoch += 1;
    }

    /// Move an entity between buckets after a component add/remove
    pub fn relocate(
        &mut self,
        handle: EntityHandle,
        old: &ArchetypeSignature,
        new: ArchetypeSignature,
    ) {
        if let Some(bucket) = self.buckets.get_mut(old) {
            bucket.remove(&handle);
            if bucket.is_empty() {
                self.buckets.remove(old);
            }
        }
        self.buckets.entry(new).or_default().insert(handle);
        self.epoch += 1;
    }

    /// Entities currently exhibiting exactly this signature
    pub fn bucket(&self, signature: &ArchetypeSignature) -> Option<&AHashSet<EntityHandle>> {
        self.buckets.get(signature)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &ArchetypeSignature> {
        self.buckets.keys()
    }
}

impl Default for ArchetypeIndex {
    fn default() -> Self {
        Self::new()
    }
}
