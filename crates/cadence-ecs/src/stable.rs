//! Stable (paged, tombstoned) component storage: components never move
//! on add/remove, only on an explicit `pack()`.

use crate::entity::{Entity, EntityRange};
use crate::error::abort_with;
use crate::sparse::PagedSparse;

const PAGE_SIZE: usize = 1024;

type Page<T> = Box<[Option<T>; PAGE_SIZE]>;

fn new_page<T>() -> Page<T> {
    Box::new(std::array::from_fn(|_| None))
}

/// Same API surface as [`crate::DenseTable`], but a removed slot is
/// tombstoned (entity set to [`Entity::NONE`]) instead of compacted;
/// existing components keep their slot — and therefore their address —
/// until the next [`StableTable::pack`].
pub struct StableTable<T> {
    sparse: PagedSparse,
    entities: Vec<Entity>,
    pages: Vec<Option<Page<T>>>,
    tombstones: Vec<usize>,
}

impl<T> StableTable<T> {
    pub fn new() -> Self {
        Self {
            sparse: PagedSparse::new(),
            entities: Vec::new(),
            pages: Vec::new(),
            tombstones: Vec::new(),
        }
    }

    fn split(slot: usize) -> (usize, usize) {
        (slot / PAGE_SIZE, slot % PAGE_SIZE)
    }

    fn slot_mut(&mut self, slot: usize) -> &mut Option<T> {
        let (page, offset) = Self::split(slot);
        if page >= self.pages.len() {
            self.pages.resize_with(page + 1, || None);
        }
        let slab = self.pages[page].get_or_insert_with(new_page);
        &mut slab[offset]
    }

    fn slot_ref(&self, slot: usize) -> Option<&T> {
        let (page, offset) = Self::split(slot);
        self.pages.get(page)?.as_ref()?[offset].as_ref()
    }

    pub fn len(&self) -> usize {
        self.entities.len() - self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn contains(&self, e: Entity) -> bool {
        self.sparse.get(e).is_some()
    }

    pub fn get(&self, e: Entity) -> Option<&T> {
        self.slot_ref(self.sparse.get(e)?)
    }

    pub fn get_mut(&mut self, e: Entity) -> Option<&mut T> {
        let slot = self.sparse.get(e)?;
        self.slot_mut(slot).as_mut()
    }

    /// The stable slot index backing `e` — stable across add/remove,
    /// invalidated only by `pack()`.
    pub fn unstable_index(&self, e: Entity) -> Option<usize> {
        self.sparse.get(e)
    }

    pub fn at_index(&self, index: usize) -> Option<&T> {
        self.slot_ref(index)
    }

    pub fn add(&mut self, e: Entity, value: T) -> &mut T {
        if self.sparse.get(e).is_some() {
            abort_with("cadence-ecs: duplicate add into a stable table");
        }
        let slot = match self.tombstones.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.entities.len();
                self.entities.push(Entity::NONE);
                slot
            }
        };
        self.entities[slot] = e;
        self.sparse.set(e, slot);
        *self.slot_mut(slot) = Some(value);
        self.slot_mut(slot).as_mut().unwrap()
    }

    pub fn try_add(&mut self, e: Entity, value: T) -> &mut T {
        if let Some(slot) = self.sparse.get(e) {
            *self.slot_mut(slot) = Some(value);
            self.slot_mut(slot).as_mut().unwrap()
        } else {
            self.add(e, value)
        }
    }

    pub fn try_add_with(&mut self, e: Entity, updater: impl FnOnce(&mut T))
    where
        T: Default,
    {
        if self.sparse.get(e).is_none() {
            self.add(e, T::default());
        }
        let slot = self.sparse.get(e).unwrap();
        updater(self.slot_mut(slot).as_mut().unwrap());
    }

    pub fn add_range(&mut self, range: EntityRange, value: T)
    where
        T: Clone,
    {
        for e in range {
            self.add(e, value.clone());
        }
    }

    fn remove_impl(&mut self, e: Entity) -> Option<T> {
        let slot = self.sparse.get(e)?;
        self.sparse.clear_entry(e);
        self.entities[slot] = Entity::NONE;
        let value = self.slot_mut(slot).take();
        self.tombstones.push(slot);
        value
    }

    pub fn remove(&mut self, e: Entity) {
        if self.remove_impl(e).is_none() {
            abort_with("cadence-ecs: remove of an entity absent from this stable table");
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
            .unwrap_or_else(|| abort_with("cadence-ecs: extract of an entity absent from this stable table"))
    }

    pub fn traverse(&mut self, mut f: impl FnMut(Entity, &mut T) -> bool) {
        for slot in 0..self.entities.len() {
            let e = self.entities[slot];
            if e.is_none() {
                continue;
            }
            if let Some(value) = self.slot_mut(slot).as_mut() {
                if !f(e, value) {
                    break;
                }
            }
        }
    }

    pub fn traverse_ref(&self, mut f: impl FnMut(Entity, &T) -> bool) {
        for (slot, &e) in self.entities.iter().enumerate() {
            if e.is_none() {
                continue;
            }
            if let Some(value) = self.slot_ref(slot) {
                if !f(e, value) {
                    break;
                }
            }
        }
    }

    /// Compacts every live `(entity, component)` pair into a fresh,
    /// tombstone-free layout. Pointer/slot stability is not preserved
    /// across this call — only between successive packs.
    pub fn pack(&mut self) {
        let mut live = Vec::with_capacity(self.entities.len() - self.tombstones.len());
        for slot in 0..self.entities.len() {
            let e = self.entities[slot];
            if e.is_none() {
                continue;
            }
            if let Some(value) = self.slot_mut(slot).take() {
                live.push((e, value));
            }
        }
        self.entities.clear();
        self.pages.clear();
        self.tombstones.clear();
        self.sparse = PagedSparse::new();
        for (e, value) in live {
            self.add(e, value);
        }
    }
}

impl<T> Default for StableTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_tombstones_without_moving_survivors() {
        let mut t = StableTable::new();
        for i in 0..5u32 {
            t.add(Entity(i), i * 10);
        }
        let slot_of_4 = t.unstable_index(Entity(4)).unwrap();
        t.remove(Entity(1));
        assert!(!t.contains(Entity(1)));
        assert_eq!(t.unstable_index(Entity(4)), Some(slot_of_4));
        assert_eq!(t.get(Entity(4)), Some(&40));
        assert_eq!(t.tombstone_count(), 1);
    }

    #[test]
    fn pack_clears_tombstones_and_preserves_pairing() {
        let mut t = StableTable::new();
        for i in 0..6u32 {
            t.add(Entity(i), i * 10);
        }
        t.remove(Entity(1));
        t.remove(Entity(3));
        assert_eq!(t.tombstone_count(), 2);
        t.pack();
        assert_eq!(t.tombstone_count(), 0);
        for i in [0u32, 2, 4, 5] {
            assert_eq!(t.get(Entity(i)), Some(&(i * 10)));
        }
        assert_eq!(t.len(), 4);
    }
}
