//! Bounded store of the best partial tours of one beam-search round.
//!
//! Only the cheapest partial tour matters for each `(endpoint, visited set)`
//! pair, so tours are deduplicated by that key. At most `capacity` tours are
//! retained; when full, a cheaper newcomer replaces the most expensive one.
//!
//! Layout is struct-of-arrays: `slots` holds the tours, `heap` is a 1-indexed
//! max-heap of `(cost, slot)` entries, and `slot_heap` maps every slot back
//! to its heap position so that both the worst tour and any keyed tour are
//! found in O(1).

use std::collections::HashMap;

use crate::heuristics::partial::{PartialTour, VisitedSet};
use crate::instance::{Cost, NodeId};

type Key = (NodeId, VisitedSet);

/// Upper bound on storage reserved up front, wider beams grow on demand
const PREALLOCATED: usize = 1 << 16;

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    cost: Cost,
    slot: usize,
}

/// Best-of-H partial tours keyed by `(endpoint, visited set)`
#[derive(Debug, Clone)]
pub struct Keeper {
    capacity: usize,
    index: HashMap<Key, usize>,
    heap: Vec<HeapEntry>,
    slots: Vec<PartialTour>,
    slot_heap: Vec<usize>,
    slot_keys: Vec<Key>,
}

impl Keeper {
    pub fn new(capacity: usize) -> Self {
        let reserved = capacity.min(PREALLOCATED);
        let mut heap = Vec::with_capacity(reserved + 1);
        heap.push(HeapEntry { cost: 0, slot: 0 });
        Keeper {
            capacity,
            index: HashMap::with_capacity(reserved),
            heap,
            slots: Vec::with_capacity(reserved),
            slot_heap: Vec::with_capacity(reserved),
            slot_keys: Vec::with_capacity(reserved),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Retained tours in storage order
    pub fn partials(&self) -> &[PartialTour] {
        &self.slots
    }

    /// Cost of the most expensive retained tour
    pub fn worst_cost(&self) -> Option<Cost> {
        self.heap.get(1).map(|e| e.cost)
    }

    /// Cheapest retained tour
    pub fn best(&self) -> Option<&PartialTour> {
        self.slots.iter().min_by_key(|pt| pt.cost)
    }

    /// Offer a tour whose current endpoint is `endpoint`.
    ///
    /// Returns true if the tour was retained.
    pub fn add(&mut self, pt: PartialTour, endpoint: NodeId) -> bool {
        let key = (endpoint, pt.visited);
        let cost = pt.cost;

        if let Some(&slot) = self.index.get(&key) {
            if cost >= self.slots[slot].cost {
                return false;
            }
            self.slots[slot] = pt;
            let hidx = self.slot_heap[slot];
            self.sift_down(hidx, cost);
            return true;
        }

        if self.slots.len() < self.capacity {
            let slot = self.slots.len();
            self.slots.push(pt);
            self.slot_keys.push(key);
            self.slot_heap.push(0);
            self.index.insert(key, slot);
            self.heap_insert(HeapEntry { cost, slot });
            true
        } else if self.capacity > 0 && cost < self.heap[1].cost {
            let slot = self.heap[1].slot;
            let evicted = std::mem::replace(&mut self.slot_keys[slot], key);
            self.index.remove(&evicted);
            self.index.insert(key, slot);
            self.slots[slot] = pt;
            self.sift_down(1, cost);
            true
        } else {
            false
        }
    }

    /// Drop every tour, keeping allocated capacity
    pub fn clear(&mut self) {
        self.index.clear();
        self.heap.truncate(1);
        self.slots.clear();
        self.slot_heap.clear();
        self.slot_keys.clear();
    }

    /// Try to improve up to `limit` tours sitting at heap leaves.
    ///
    /// `improve` must return a tour with the same key and a cost no higher
    /// than the one it was given. Lowering a leaf never breaks the max-heap,
    /// so no re-heapify is needed. Returns the number of improved tours.
    pub fn refine_leaves<F>(&mut self, limit: usize, mut improve: F) -> usize
    where
        F: FnMut(&PartialTour) -> Option<PartialTour>,
    {
        let last = self.heap.len() - 1;
        let first_leaf = last / 2 + 1;
        let mut improved = 0;

        for hidx in (first_leaf..=last).rev().take(limit) {
            let slot = self.heap[hidx].slot;
            if let Some(better) = improve(&self.slots[slot]) {
                debug_assert!(better.cost <= self.heap[hidx].cost);
                debug_assert!(better.visited == self.slots[slot].visited);
                if better.cost < self.heap[hidx].cost {
                    self.heap[hidx].cost = better.cost;
                    self.slots[slot] = better;
                    improved += 1;
                }
            }
        }

        improved
    }

    /// Check the max-heap property
    pub fn is_heap(&self) -> bool {
        (2..self.heap.len()).all(|i| self.heap[i / 2].cost >= self.heap[i].cost)
    }

    /// Check that heap, slots and index agree with each other
    pub fn is_consistent(&self) -> bool {
        self.heap.len() == self.slots.len() + 1
            && self.index.len() == self.slots.len()
            && (0..self.slots.len()).all(|slot| {
                let hidx = self.slot_heap[slot];
                hidx >= 1
                    && hidx < self.heap.len()
                    && self.heap[hidx].slot == slot
                    && self.heap[hidx].cost == self.slots[slot].cost
                    && self.index.get(&self.slot_keys[slot]) == Some(&slot)
                    && self.slot_keys[slot].1 == self.slots[slot].visited
            })
    }

    fn heap_swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.slot_heap[self.heap[a].slot] = a;
        self.slot_heap[self.heap[b].slot] = b;
    }

    fn heap_insert(&mut self, entry: HeapEntry) {
        let mut hidx = self.heap.len();
        self.slot_heap[entry.slot] = hidx;
        self.heap.push(entry);
        while hidx > 1 && self.heap[hidx].cost > self.heap[hidx / 2].cost {
            self.heap_swap(hidx, hidx / 2);
            hidx /= 2;
        }
    }

    // Lowers the key at `hidx`; in a max-heap that means moving it down.
    fn sift_down(&mut self, mut hidx: usize, cost: Cost) {
        self.heap[hidx].cost = cost;
        let len = self.heap.len();
        loop {
            let left = hidx * 2;
            let right = left + 1;
            let mut largest = hidx;
            if left < len && self.heap[left].cost > self.heap[largest].cost {
                largest = left;
            }
            if right < len && self.heap[right].cost > self.heap[largest].cost {
                largest = right;
            }
            if largest == hidx {
                break;
            }
            self.heap_swap(hidx, largest);
            hidx = largest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn tour_with(visited: &[NodeId], cost: Cost) -> PartialTour {
        let mut pt = PartialTour::seed(0);
        for &node in visited {
            pt = pt.prolonged(node, 0, true);
        }
        pt.cost = cost;
        pt
    }

    #[test]
    fn test_single_width_keeps_cheaper() {
        let mut keeper = Keeper::new(1);
        assert!(keeper.add(tour_with(&[1, 2], 10), 2));
        assert!(keeper.add(tour_with(&[2, 1], 4), 2));
        assert!(!keeper.add(tour_with(&[1, 2], 6), 2));

        assert_eq!(keeper.len(), 1);
        assert_eq!(keeper.partials()[0].cost, 4);
        assert_eq!(keeper.partials()[0].forward.to_vec(true, true), vec![0, 2, 1]);
    }

    #[test]
    fn test_eviction_rekeys_slot() {
        let mut keeper = Keeper::new(1);
        keeper.add(tour_with(&[1], 10), 1);
        // different key, cheaper: evicts the first one
        assert!(keeper.add(tour_with(&[2], 5), 2));
        // the evicted key is gone, so this must compete with the root
        assert!(!keeper.add(tour_with(&[1], 7), 1));
        assert!(keeper.add(tour_with(&[1], 3), 1));

        assert_eq!(keeper.len(), 1);
        assert_eq!(keeper.partials()[0].forward_end(), 1);
        assert!(keeper.is_consistent());
    }

    #[test]
    fn test_clear_keeps_working() {
        let mut keeper = Keeper::new(3);
        keeper.add(tour_with(&[1], 1), 1);
        keeper.add(tour_with(&[2], 2), 2);
        keeper.clear();

        assert!(keeper.is_empty());
        assert_eq!(keeper.worst_cost(), None);
        keeper.add(tour_with(&[1], 9), 1);
        assert_eq!(keeper.worst_cost(), Some(9));
        assert!(keeper.is_consistent());
    }

    #[test]
    fn test_random_adds_keep_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let capacity = 8;
        let mut keeper = Keeper::new(capacity);
        let mut best_seen: HashMap<Key, Cost> = HashMap::new();

        for _ in 0..2000 {
            let a = rng.gen_range(1..6);
            let b = rng.gen_range(1..6);
            let endpoint = b;
            let pt = tour_with(&[a, b], rng.gen_range(0..100));
            let key = (endpoint, pt.visited);
            let entry = best_seen.entry(key).or_insert(pt.cost);
            *entry = (*entry).min(pt.cost);

            keeper.add(pt, endpoint);

            assert!(keeper.len() <= capacity);
            assert!(keeper.is_heap());
            assert!(keeper.is_consistent());
        }

        let mut keys = std::collections::HashSet::new();
        for slot in 0..keeper.len() {
            let key = keeper.slot_keys[slot];
            assert!(keys.insert(key));
            assert_eq!(keeper.slots[slot].cost, best_seen[&key]);
        }
    }

    #[test]
    fn test_refine_leaves_preserves_heap() {
        let mut keeper = Keeper::new(7);
        for node in 1..=7 {
            keeper.add(tour_with(&[node], node as Cost * 10), node);
        }

        let improved = keeper.refine_leaves(2, |pt| {
            let mut better = pt.clone();
            better.cost -= 5;
            Some(better)
        });

        assert_eq!(improved, 2);
        assert!(keeper.is_heap());
        assert!(keeper.is_consistent());
    }
}
