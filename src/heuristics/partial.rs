//! Partial tours built from both ends.
//!
//! The forward path grows from the start city on day 0 onwards, the backward
//! path grows from the start city on the last day towards earlier days. Once
//! the two endpoints are joined by a flight the partial tour becomes a cycle.

use crate::heuristics::path::TourPath;
use crate::instance::{Cost, NodeId, MAX_NODES, VISITED_WORDS};

/// Fixed-capacity bitset of visited cities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VisitedSet([u64; VISITED_WORDS]);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        debug_assert!(node < MAX_NODES);
        self.0[node / 64] & (1u64 << (node % 64)) != 0
    }

    #[inline]
    pub fn insert(&mut self, node: NodeId) {
        debug_assert!(node < MAX_NODES);
        self.0[node / 64] |= 1u64 << (node % 64);
    }

    #[inline]
    pub fn with(mut self, node: NodeId) -> Self {
        self.insert(node);
        self
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }
}

/// A tour under construction
#[derive(Debug, Clone)]
pub struct PartialTour {
    pub forward: TourPath,
    pub backward: TourPath,
    /// Cities added to either path. The start city is not marked on seed.
    pub visited: VisitedSet,
    pub cost: Cost,
}

impl PartialTour {
    /// Empty tour sitting at `start`
    pub fn seed(start: NodeId) -> Self {
        PartialTour {
            forward: TourPath::new(start),
            backward: TourPath::new(start),
            visited: VisitedSet::new(),
            cost: 0,
        }
    }

    /// Current end of the forward path
    #[inline]
    pub fn forward_end(&self) -> NodeId {
        self.forward.head()
    }

    /// Current end of the backward path
    #[inline]
    pub fn backward_end(&self) -> NodeId {
        self.backward.head()
    }

    /// Copy of this tour with one more city on the chosen side.
    ///
    /// The caller guarantees that `node` is unvisited and that the flight
    /// priced `arc_cost` exists.
    #[inline]
    pub fn prolonged(&self, node: NodeId, arc_cost: Cost, forward: bool) -> Self {
        let (forward_path, backward_path) = if forward {
            (self.forward.prolonged(node), self.backward.clone())
        } else {
            (self.forward.clone(), self.backward.prolonged(node))
        };
        PartialTour {
            forward: forward_path,
            backward: backward_path,
            visited: self.visited.with(node),
            cost: self.cost + arc_cost,
        }
    }

    /// Merge both paths of a closed tour into one city sequence.
    ///
    /// The result is the forward path from the start followed by the
    /// backward path in travel order without its head, which duplicates the
    /// forward end after closure. The second value is the position of the
    /// forward end (the joining point) in the sequence.
    pub fn extract_tour(&self) -> (Vec<NodeId>, usize) {
        let mut tour = self.forward.to_vec(true, true);
        let joining_index = tour.len() - 1;
        tour.extend(self.backward.iter().skip(1));
        (tour, joining_index)
    }
}
