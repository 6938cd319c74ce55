//! Randomized local search on day-constrained tours.
//!
//! Each trial swaps a few random pairs of cities, tracking the cost change
//! through the four flights around each swapped position. A trial that hits a
//! missing flight or makes the tour more expensive is rolled back by
//! replaying its swaps in reverse order, so the tour is always feasible and
//! its cost never increases.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::instance::{Cost, CostTable, NodeId, NO_ARC};
use crate::solution::Solution;

/// Maximum number of swapped pairs per trial
pub const MAX_PERTURBATIONS: usize = 5;

/// How often the wall clock is consulted
const CLOCK_CHECK_INTERVAL: u64 = 256;

/// Trait for local search improvement methods
pub trait LocalSearch {
    fn improve(&self, table: &CostTable, solution: &mut Solution) -> bool;
    fn name(&self) -> &str;
}

/// Swap engine over a window of a city sequence.
///
/// The flight between `seq[i]` and `seq[i + 1]` is taken on day
/// `first_day + i`. Only positions in `movable` are ever swapped.
struct Perturber<'t> {
    table: &'t CostTable,
    first_day: usize,
    movable: Vec<usize>,
    max_perturbations: usize,
    pairs: Vec<(usize, usize)>,
}

impl<'t> Perturber<'t> {
    /// `None` when the window has fewer than two movable positions
    fn new(
        table: &'t CostTable,
        first_day: usize,
        len: usize,
        pinned: Option<usize>,
        max_perturbations: usize,
    ) -> Option<Self> {
        if len < 4 {
            return None;
        }
        let movable: Vec<usize> = (1..len - 1).filter(|&p| Some(p) != pinned).collect();
        if movable.len() < 2 {
            return None;
        }
        Some(Perturber {
            table,
            first_day,
            movable,
            max_perturbations: max_perturbations.max(1),
            pairs: Vec::with_capacity(max_perturbations.max(1)),
        })
    }

    /// Sum of the flights touching positions `lo` and `hi`, `None` if one is
    /// missing. Adjacent positions share a flight, which is counted once.
    #[inline]
    fn boundary_cost(&self, seq: &[NodeId], lo: usize, hi: usize) -> Option<Cost> {
        let arcs = [lo - 1, lo, hi - 1, hi];
        let mut total = 0;
        for (i, &pos) in arcs.iter().enumerate() {
            if i == 2 && hi == lo + 1 {
                continue;
            }
            let price = self.table.raw(self.first_day + pos, seq[pos], seq[pos + 1]);
            if price == NO_ARC {
                return None;
            }
            total += Cost::from(price);
        }
        Some(total)
    }

    fn rollback(&self, seq: &mut [NodeId], done: usize) {
        for &(lo, hi) in self.pairs[..done].iter().rev() {
            seq.swap(lo, hi);
        }
    }

    /// Run one trial. Returns the new cost if accepted; otherwise `seq` is
    /// left exactly as it was.
    fn trial<R: Rng>(&mut self, seq: &mut [NodeId], best: Cost, rng: &mut R) -> Option<Cost> {
        let k = rng.gen_range(1..=self.max_perturbations);
        self.pairs.clear();
        for _ in 0..k {
            let a = self.movable[rng.gen_range(0..self.movable.len())];
            let b = self.movable[rng.gen_range(0..self.movable.len())];
            self.pairs.push((a.min(b), a.max(b)));
        }

        let mut cost = best;
        for i in 0..self.pairs.len() {
            let (lo, hi) = self.pairs[i];
            if lo == hi {
                continue;
            }
            let Some(before) = self.boundary_cost(seq, lo, hi) else {
                self.rollback(seq, i);
                return None;
            };
            seq.swap(lo, hi);
            match self.boundary_cost(seq, lo, hi) {
                Some(after) => cost += after - before,
                None => {
                    self.rollback(seq, i + 1);
                    return None;
                }
            }
        }

        if cost <= best {
            Some(cost)
        } else {
            self.rollback(seq, self.pairs.len());
            None
        }
    }
}

/// Improve a window of a partial tour for a fixed number of trials.
///
/// `seq` holds cities in travel order, the first flight being taken on
/// `first_day`. Both ends of the window and the `pinned` position stay in
/// place, so the set of cities and both endpoints are unchanged. Returns the
/// new cost, never higher than `cost`.
pub fn perturb_window<R: Rng>(
    table: &CostTable,
    seq: &mut [NodeId],
    first_day: usize,
    pinned: Option<usize>,
    cost: Cost,
    max_perturbations: usize,
    iterations: u64,
    rng: &mut R,
) -> Cost {
    let Some(mut perturber) = Perturber::new(table, first_day, seq.len(), pinned, max_perturbations) else {
        return cost;
    };

    let mut best = cost;
    for _ in 0..iterations {
        if let Some(accepted) = perturber.trial(seq, best, rng) {
            best = accepted;
        }
    }
    best
}

/// Random perturbation settings
#[derive(Debug, Clone)]
pub struct PerturbationConfig {
    /// Maximum swapped pairs per trial
    pub max_perturbations: usize,
    /// Trial cap
    pub max_iterations: u64,
    /// Wall-clock budget in seconds
    pub time_limit: Option<f64>,
    /// Random seed
    pub seed: u64,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        PerturbationConfig {
            max_perturbations: MAX_PERTURBATIONS,
            max_iterations: u64::MAX,
            time_limit: None,
            seed: 42,
        }
    }
}

/// Outcome of a perturbation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerturbationStats {
    pub cost: Cost,
    pub iterations: u64,
    pub accepted: u64,
}

/// Accept-if-not-worse random swap search on complete tours.
///
/// Stops on the iteration cap, the time limit, or when the shared stop flag
/// is raised, whichever comes first. The flag is polled between trials.
pub struct RandomPerturbation<'a> {
    pub config: PerturbationConfig,
    stop: Option<&'a AtomicBool>,
}

impl<'a> RandomPerturbation<'a> {
    pub fn new(config: PerturbationConfig) -> Self {
        RandomPerturbation { config, stop: None }
    }

    /// Observe a cancellation flag shared with other workers
    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stopped(&self) -> bool {
        self.stop.map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    /// Improve a closed tour of `n + 1` cities in place.
    ///
    /// `cost` must be the current cost of `tour`. The first and last
    /// positions hold the start city and never move, nor does `pinned`.
    pub fn improve_tour(
        &self,
        table: &CostTable,
        tour: &mut [NodeId],
        cost: Cost,
        pinned: Option<usize>,
    ) -> PerturbationStats {
        let mut stats = PerturbationStats { cost, iterations: 0, accepted: 0 };
        let Some(mut perturber) = Perturber::new(table, 0, tour.len(), pinned, self.config.max_perturbations) else {
            return stats;
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let deadline = self
            .config
            .time_limit
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

        while stats.iterations < self.config.max_iterations && !self.stopped() {
            if let Some(deadline) = deadline {
                if stats.iterations % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                    break;
                }
            }
            if let Some(accepted) = perturber.trial(tour, stats.cost, &mut rng) {
                if accepted < stats.cost {
                    log::trace!("perturbation improved {} -> {}", stats.cost, accepted);
                }
                stats.cost = accepted;
                stats.accepted += 1;
            }
            stats.iterations += 1;
        }

        stats
    }
}

impl LocalSearch for RandomPerturbation<'_> {
    fn improve(&self, table: &CostTable, solution: &mut Solution) -> bool {
        if !solution.feasible {
            return false;
        }
        let before = solution.cost;
        let pinned = Some(solution.joining_index);
        let stats = self.improve_tour(table, &mut solution.tour, before, pinned);

        solution.cost = stats.cost;
        solution.iterations = Some(solution.iterations.unwrap_or(0) + stats.iterations);
        stats.cost < before
    }

    fn name(&self) -> &str {
        "RandomPerturbation"
    }
}
