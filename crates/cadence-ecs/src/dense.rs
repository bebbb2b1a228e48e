//! Dense (packed, swap-remove) component storage.

use std::cmp::Ordering;

use crate::entity::{Entity, EntityRange};
use crate::error::abort_with;
use crate::sparse::PagedSparse;

/// Entities and components kept in two parallel dense arrays, indexed
/// through a paged sparse set. Removal swaps the last element into the
/// removed slot, so iteration order is insertion-modulo-deletions, not
/// entity-sorted (spec §3).
pub struct DenseTable<T> {
    sparse: PagedSparse,
    entities: Vec<Entity>,
    components: Vec<T>,
}

impl<T> DenseTable<T> {
    pub fn new() -> Self {
        Self {
            sparse: PagedSparse::new(),
            entities: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, e: Entity) -> bool {
        self.sparse.get(e).is_some()
    }

    pub fn get(&self, e: Entity) -> Option<&T> {
        self.sparse.get(e).map(|i| &self.components[i])
    }

    pub fn get_mut(&mut self, e: Entity) -> Option<&mut T> {
        let idx = self.sparse.get(e)?;
        Some(&mut self.components[idx])
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Appends at `len()`. Adding an entity that already has a
    /// component in this table is a precondition violation (abort).
    pub fn add(&mut self, e: Entity, value: T) -> &mut T {
        if self.sparse.get(e).is_some() {
            abort_with("cadence-ecs: duplicate add into a dense table");
        }
        let idx = self.entities.len();
        self.sparse.set(e, idx);
        self.entities.push(e);
        self.components.push(value);
        &mut self.components[idx]
    }

    /// Replaces the component if `e` is already present, otherwise
    /// constructs it.
    pub fn try_add(&mut self, e: Entity, value: T) -> &mut T {
        if let Some(idx) = self.sparse.get(e) {
            self.components[idx] = value;
            &mut self.components[idx]
        } else {
            self.add(e, value)
        }
    }

    /// Ensures `e` is present (default-constructing it if not), then
    /// runs `updater` against it.
    pub fn try_add_with(&mut self, e: Entity, updater: impl FnOnce(&mut T))
    where
        T: Default,
    {
        let idx = match self.sparse.get(e) {
            Some(idx) => idx,
            None => {
                self.add(e, T::default());
                self.entities.len() - 1
            }
        };
        updater(&mut self.components[idx]);
    }

    /// Batch-appends a contiguous id range, cloning `value` for each.
    pub fn add_range(&mut self, range: EntityRange, value: T)
    where
        T: Clone,
    {
        for e in range {
            self.add(e, value.clone());
        }
    }

    fn remove_impl(&mut self, e: Entity) -> Option<T> {
        let idx = self.sparse.get(e)?;
        self.sparse.clear_entry(e);
        let last = self.entities.len() - 1;
        self.entities.swap(idx, last);
        self.components.swap(idx, last);
        self.entities.pop();
        let removed = self.components.pop().unwrap();
        if idx != last {
            self.sparse.set(self.entities[idx], idx);
        }
        Some(removed)
    }

    pub fn remove(&mut self, e: Entity) {
        if self.remove_impl(e).is_none() {
            abort_with("cadence-ecs: remove of an entity absent from this dense table");
        }
    }

    pub fn try_remove(&mut self, e: Entity) -> bool {
        self.remove_impl(e).is_some()
    }

    pub fn remove_range(&mut self, range: EntityRange) {
        for e in range {
            self.try_remove(e);
        }
    }

    pub fn extract(&mut self, e: Entity) -> T {
        self.remove_impl(e)
            .unwrap_or_else(|| abort_with("cadence-ecs: extract of an entity absent from this dense table"))
    }

    /// Sorts `entities` by `cmp`, applying the same permutation to
    /// `components` and rebuilding the sparse mapping.
    pub fn sort(&mut self, mut cmp: impl FnMut(Entity, Entity) -> Ordering) {
        let mut order: Vec<usize> = (0..self.entities.len()).collect();
        order.sort_by(|&a, &b| cmp(self.entities[a], self.entities[b]));
        // `order[k]` is the source index of the k-th-smallest element, but
        // `apply_permutation` scatters (moves the element at `i` to
        // `perm[i]`), so we need `order`'s inverse: `rank[order[k]] = k`
        // sends the element currently at `order[k]` to its sorted slot `k`.
        let mut rank = vec![0usize; order.len()];
        for (k, &src) in order.iter().enumerate() {
            rank[src] = k;
        }
        apply_permutation(&mut self.entities, &rank);
        apply_permutation(&mut self.components, &rank);
        for (i, &e) in self.entities.iter().enumerate() {
            self.sparse.set(e, i);
        }
    }

    /// Visits every live `(Entity, &mut T)`; stops early if `f`
    /// returns `false`.
    pub fn traverse(&mut self, mut f: impl FnMut(Entity, &mut T) -> bool) {
        for (e, c) in self.entities.iter().zip(self.components.iter_mut()) {
            if !f(*e, c) {
                break;
            }
        }
    }

    pub fn traverse_ref(&self, mut f: impl FnMut(Entity, &T) -> bool) {
        for (e, c) in self.entities.iter().zip(self.components.iter()) {
            if !f(*e, c) {
                break;
            }
        }
    }
}

impl<T> Default for DenseTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies `perm[i] = j` ("the element currently at slot i moves to
/// slot j") to `values` in place by following permutation cycles.
fn apply_permutation<T>(values: &mut [T], perm: &[usize]) {
    let mut perm = perm.to_vec();
    for i in 0..perm.len() {
        while perm[i] != i {
            let j = perm[i];
            values.swap(i, j);
            perm.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_returns_the_stored_value() {
        let mut t = DenseTable::new();
        t.add(Entity(3), "hello");
        assert_eq!(t.get(Entity(3)), Some(&"hello"));
        assert_eq!(t.get(Entity(4)), None);
    }

    #[test]
    fn remove_swaps_last_and_keeps_sparse_mapping_consistent() {
        let mut t = DenseTable::new();
        for i in 0..5u32 {
            t.add(Entity(i), i * 10);
        }
        t.remove(Entity(1));
        assert!(!t.contains(Entity(1)));
        for (i, &e) in t.entities().iter().enumerate() {
            assert_eq!(t.get(e).copied(), Some(i as u32 * 10));
        }
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn sort_orders_entities_and_keeps_mapping_consistent() {
        let mut t = DenseTable::new();
        for &i in &[3u32, 1, 4, 1_u32 + 4, 0] {
            t.try_add(Entity(i), i);
        }
        t.sort(|a, b| a.0.cmp(&b.0));
        let ids: Vec<u32> = t.entities().iter().map(|e| e.0).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        for (i, &e) in t.entities().iter().enumerate() {
            assert_eq!(t.get(e), Some(&e.0));
            let _ = i;
        }
    }

    #[test]
    fn traverse_stops_early_when_callback_returns_false() {
        let mut t = DenseTable::new();
        for i in 0..10u32 {
            t.add(Entity(i), i);
        }
        let mut visited = 0;
        t.traverse(|_, _| {
            visited += 1;
            visited < 3
        });
        assert_eq!(visited, 3);
    }
}
