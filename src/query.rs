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

//! Query resolution: `(required, forbidden)` constraints over columns.
//!
//! The smallest required column drives iteration; every other constraint is
//! an O(1) sparse-map probe per candidate. Results come back in the driver's
//! slot order, which is stable only until the next structural mutation.

use ahash::AHashMap;

use crate::archetype::{signature_of, ArchetypeSignature};
use crate::column::Column;
use crate::component::ComponentTypeId;
use crate::entity::{EntityAllocator, EntityHandle};
use crate::error::{EcsError, Result};

/// A query constraint pair. Both sides are canonicalized (sorted, deduped)
/// so equal constraints hash equally for the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    required: ArchetypeSignature,
    forbidden: ArchetypeSignature,
}

impl QuerySpec {
    pub fn new(required: &[ComponentTypeId], forbidden: &[ComponentTypeId]) -> Self {
        Self {
            required: signature_of(required),
            forbidden: signature_of(forbidden),
        }
    }

    pub fn required(&self) -> &[ComponentTypeId] {
        &self.required
    }

    pub fn forbidden(&self) -> &[ComponentTypeId] {
        &self.forbidden
    }
}

/// Resolve a query against the live columns.
///
/// Every referenced type id must name a registered column; unknown ids fail
/// with `UnknownType` before any iteration happens.
pub(crate) fn resolve(
    spec: &QuerySpec,
    columns: &AHashMap<ComponentTypeId, Column>,
    entities: &EntityAllocator,
) -> Result<Vec<EntityHandle>> {
    for id in spec.required.iter().chain(spec.forbidden.iter()) {
        if !columns.contains_key(id) {
            return Err(EcsError::UnknownType);
        }
    }

    // No required set: walk all live entities in index order
    if spec.required.is_empty() {
        return Ok(entities
            .iter_alive()
            .filter(|&h| !spec.forbidden.iter().any(|id| columns[id].has(h)))
            .collect());
    }

    // Pick the driver: smallest column, lower type id on ties. The spec
    // list is sorted, so min_by_key's first-wins behavior is the tie-break.
    let driver = spec
        .required
        .iter()
        .min_by_key(|id| columns[id].len())
        .expect("required is non-empty");

    let result = columns[driver]
        .handles()
        .filter(|&h| {
            spec.required
                .iter()
                .filter(|id| *id != driver)
                .all(|id| columns[id].has(h))
                && !spec.forbidden.iter().any(|id| columns[id].has(h))
        })
        .collect();
    Ok(result)
}

struct CachedQuery {
    epoch: u64,
    result: Vec<EntityHandle>,
}

/// Memoized query results keyed by constraint pair. Entries are valid only
/// for the archetype epoch they were computed at; any structural mutation
/// bumps the epoch and lapses every entry.
pub struct QueryCache {
    entries: AHashMap<QuerySpec, CachedQuery>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    pub fn get_or_resolve(
        &mut self,
        spec: QuerySpec,
        epoch: u64,
        columns: &AHashMap<ComponentTypeId, Column>,
        entities: &EntityAllocator,
    ) -> Result<Vec<EntityHandle>> {
        if let Some(cached) = self.entries.get(&spec) {
            if cached.epoch == epoch {
                return Ok(cached.result.clone());
            }
        }

        let result = resolve(&spec, columns, entities)?;
        self.entries.insert(
            spec,
            CachedQuery {
                epoch,
                result: result.clone(),
            },
        );
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DuplicateAdd;
    use crate::component::{ComponentData, Schema};

    const A: ComponentTypeId = ComponentTypeId(1);
    const B: ComponentTypeId = ComponentTypeId(2);

    fn world_fixture() -> (
        AHashMap<ComponentTypeId, Column>,
        EntityAllocator,
        Vec<EntityHandle>,
    ) {
        let mut columns = AHashMap::new();
        columns.insert(A, Column::new(A, Schema::new("A")));
        columns.insert(B, Column::new(B, Schema::new("B")));

        let mut alloc = EntityAllocator::new(u32::MAX, u32::MAX);
        let hs: Vec<_> = (0..3).map(|_| alloc.create().unwrap()).collect();

        let empty = ComponentData::new();
        for &h in &hs {
            columns
                .get_mut(&A)
                .unwrap()
                .add(h, &empty, DuplicateAdd::Replace)
                .unwrap();
        }
        columns
            .get_mut(&B)
            .unwrap()
            .add(hs[1], &empty, DuplicateAdd::Replace)
            .unwrap();

        (columns, alloc, hs)
    }

    #[test]
    fn test_required_intersection() {
        let (columns, alloc, hs) = world_fixture();
        let spec = QuerySpec::new(&[A, B], &[]);
        let result = resolve(&spec, &columns, &alloc).unwrap();
        assert_eq!(result, vec![hs[1]]);
    }

    #[test]
    fn test_forbidden_excludes() {
        let (columns, alloc, hs) = world_fixture();
        let spec = QuerySpec::new(&[A], &[B]);
        let result = resolve(&spec, &columns, &alloc).unwrap();
        assert_eq!(result, vec![hs[0], hs[2]]);
    }

    #[test]
    fn test_empty_required_iterates_all() {
        let (columns, alloc, hs) = world_fixture();
        let spec = QuerySpec::new(&[], &[]);
        let result = resolve(&spec, &columns, &alloc).unwrap();
        assert_eq!(result, hs);

        let spec = QuerySpec::new(&[], &[B]);
        let result = resolve(&spec, &columns, &alloc).unwrap();
        assert_eq!(result, vec![hs[0], hs[2]]);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let (columns, alloc, _hs) = world_fixture();
        let spec = QuerySpec::new(&[ComponentTypeId(99)], &[]);
        assert_eq!(
            resolve(&spec, &columns, &alloc),
            Err(EcsError::UnknownType)
        );
    }

    #[test]
    fn test_driver_is_smallest_column() {
        // B has one entry, so it drives; the result order is B's slot
        // order even though A lists everyone.
        let (columns, alloc, hs) = world_fixture();
        let spec = QuerySpec::new(&[B, A], &[]);
        let result = resolve(&spec, &columns, &alloc).unwrap();
        assert_eq!(result, vec![hs[1]]);
    }

    #[test]
    fn test_cache_epoch_invalidation() {
        let (mut columns, alloc, hs) = world_fixture();
        let mut cache = QueryCache::new();

        let r1 = cache
            .get_or_resolve(QuerySpec::new(&[A], &[]), 7, &columns, &alloc)
            .unwrap();
        assert_eq!(r1.len(), 3);

        // Mutate behind the cache's back; same epoch still serves the memo
        columns.get_mut(&A).unwrap().remove(hs[0]).unwrap();
        let r2 = cache
            .get_or_resolve(QuerySpec::new(&[A], &[]), 7, &columns, &alloc)
            .unwrap();
        assert_eq!(r2.len(), 3);

        // New epoch recomputes
        let r3 = cache
            .get_or_resolve(QuerySpec::new(&[A], &[]), 8, &columns, &alloc)
            .unwrap();
        assert_eq!(r3.len(), 2);
    }
}
