//! Slots currently bound to on-screen pages

use std::collections::VecDeque;

use super::pool::{PageSlot, SlotId, SlotPool};

/// Active page slots in the order their pages became visible.
///
/// The same page may be bound more than once (a pager can instantiate a page
/// again before destroying the old view); unbinding by page always removes
/// the oldest match, mirroring how a pager destroys its least recently
/// created page first.
#[derive(Debug, Default)]
pub struct ActiveRegistry {
    entries: VecDeque<PageSlot>,
}

impl ActiveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slot` as showing `page`
    pub fn bind(&mut self, mut slot: PageSlot, page: usize) -> SlotId {
        slot.bind(page);
        let id = slot.id();
        self.entries.push_back(slot);
        id
    }

    /// Point an active slot at a different page without returning it to the pool
    pub fn rebind(&mut self, id: SlotId, page: usize) -> bool {
        match self.get_mut(id) {
            Some(slot) => {
                slot.bind(page);
                true
            }
            None => false,
        }
    }

    /// Unbind the oldest slot showing `page` and release it to `pool`
    pub fn unbind_page(&mut self, page: usize, pool: &mut SlotPool) -> Option<SlotId> {
        let pos = self
            .entries
            .iter()
            .position(|slot| slot.bound_page() == Some(page))?;
        self.release_at(pos, pool)
    }

    /// Unbind a specific slot and release it to `pool`
    pub fn unbind_slot(&mut self, id: SlotId, pool: &mut SlotPool) -> Option<SlotId> {
        let pos = self.entries.iter().position(|slot| slot.id() == id)?;
        self.release_at(pos, pool)
    }

    fn release_at(&mut self, pos: usize, pool: &mut SlotPool) -> Option<SlotId> {
        let slot = self.entries.remove(pos)?;
        let id = slot.id();
        pool.release(slot);
        Some(id)
    }

    /// Release every active slot, oldest first
    pub fn drain_into(&mut self, pool: &mut SlotPool) {
        while let Some(slot) = self.entries.pop_front() {
            pool.release(slot);
        }
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&PageSlot> {
        self.entries.iter().find(|slot| slot.id() == id)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut PageSlot> {
        self.entries.iter_mut().find(|slot| slot.id() == id)
    }

    /// Oldest slot bound to `page`
    #[must_use]
    pub fn slot_for_page(&self, page: usize) -> Option<SlotId> {
        self.entries
            .iter()
            .find(|slot| slot.bound_page() == Some(page))
            .map(PageSlot::id)
    }

    /// Bound pages in admission order
    #[must_use]
    pub fn pages(&self) -> Vec<usize> {
        self.entries.iter().filter_map(PageSlot::bound_page).collect()
    }

    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_keeps_admission_order() {
        let mut pool = SlotPool::new(3);
        let mut registry = ActiveRegistry::new();
        for page in [2, 0, 1] {
            registry.bind(pool.acquire(), page);
        }
        assert_eq!(registry.pages(), vec![2, 0, 1]);
    }

    #[test]
    fn unbind_returns_slot_to_pool() {
        let mut pool = SlotPool::new(2);
        let mut registry = ActiveRegistry::new();
        let id = registry.bind(pool.acquire(), 7);

        assert_eq!(registry.unbind_page(7, &mut pool), Some(id));
        assert!(registry.is_empty());
        assert!(pool.contains(id));
        assert_eq!(pool.free_len(), 2);
    }

    #[test]
    fn duplicate_page_unbinds_oldest_first() {
        let mut pool = SlotPool::new(3);
        let mut registry = ActiveRegistry::new();
        let first = registry.bind(pool.acquire(), 4);
        let _middle = registry.bind(pool.acquire(), 5);
        let second = registry.bind(pool.acquire(), 4);

        assert_eq!(registry.unbind_page(4, &mut pool), Some(first));
        assert_eq!(registry.slot_for_page(4), Some(second));
        assert_eq!(registry.pages(), vec![5, 4]);
    }

    #[test]
    fn unbind_unknown_is_none() {
        let mut pool = SlotPool::new(1);
        let mut registry = ActiveRegistry::new();
        assert_eq!(registry.unbind_page(3, &mut pool), None);
        assert_eq!(registry.unbind_slot(SlotId(42), &mut pool), None);
    }

    #[test]
    fn rebind_bumps_generation() {
        let mut pool = SlotPool::new(1);
        let mut registry = ActiveRegistry::new();
        let id = registry.bind(pool.acquire(), 0);
        let before = registry.get(id).map(PageSlot::generation);

        assert!(registry.rebind(id, 1));
        let slot = registry.get(id).expect("still active");
        assert_eq!(slot.bound_page(), Some(1));
        assert!(Some(slot.generation()) > before);
    }

    #[test]
    fn drain_releases_everything() {
        let mut pool = SlotPool::new(3);
        let mut registry = ActiveRegistry::new();
        for page in 0..3 {
            registry.bind(pool.acquire(), page);
        }
        registry.drain_into(&mut pool);
        assert!(registry.is_empty());
        assert_eq!(pool.free_len(), 3);
    }
}
