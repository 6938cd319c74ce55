//! Bidirectional beam-search dynamic programming.
//!
//! Round `t` extends every retained partial tour by one flight, either from
//! the forward end on the next free day at the front, or into the backward
//! end on the next free day at the back. The [`Keeper`] keeps the best
//! `beam_width` partial tours per round. After `n - 1` rounds a closing
//! flight joins both ends and the cheapest closed tour wins.
//!
//! Every `chunk_search_size` rounds a few partial tours at the heap leaves
//! are polished with random swaps inside each half.

use std::time::Instant;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::heuristics::keeper::Keeper;
use crate::heuristics::local_search::{perturb_window, MAX_PERTURBATIONS};
use crate::heuristics::partial::PartialTour;
use crate::heuristics::path::TourPath;
use crate::instance::{Cost, CostTable, NodeId, MAX_NODES, NO_ARC};
use crate::solution::Solution;

/// Rounds between two in-beam refinement passes
pub const CHUNK_SEARCH_SIZE: usize = 10;

/// Work budget used to derive the default beam width (`BEAM_WORK / n²`)
pub const BEAM_WORK: usize = 100_000_000;

const MIN_BEAM_WIDTH: usize = 16;
const MAX_BEAM_WIDTH: usize = 200_000;

/// Default beam width for `n` cities.
///
/// One round costs about `width * n` extensions and there are `n` rounds.
pub fn default_beam_width(n: usize) -> usize {
    (BEAM_WORK / (n * n).max(1)).clamp(MIN_BEAM_WIDTH, MAX_BEAM_WIDTH)
}

/// Side of the partial tour extended in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Direction schedule for the parallel worker `variant`.
///
/// The first four variants are fixed (forward, backward, alternating, and
/// forward then backward halves); later ones are random per `seed`.
pub fn direction_schedule(variant: usize, n: usize, seed: u64) -> Vec<Direction> {
    use Direction::*;
    match variant {
        0 => vec![Forward; n],
        1 => vec![Backward; n],
        2 => (0..n).map(|t| if t % 2 == 0 { Forward } else { Backward }).collect(),
        3 => (0..n).map(|t| if t < n / 2 { Forward } else { Backward }).collect(),
        _ => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed ^ variant as u64);
            (0..n).map(|_| if rng.gen_bool(0.5) { Forward } else { Backward }).collect()
        }
    }
}

/// Beam search configuration
#[derive(Debug, Clone)]
pub struct BeamConfig {
    /// Maximum partial tours kept per round
    pub beam_width: usize,
    /// Rounds between refinement passes, 0 disables refinement
    pub chunk_search_size: usize,
    /// Partial tours refined per pass
    pub refine_limit: usize,
    /// Swap trials per refined half
    pub refine_iterations: u64,
    /// Maximum swapped pairs per refinement trial
    pub max_perturbations: usize,
    /// Random seed for refinement
    pub seed: u64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        BeamConfig {
            beam_width: 1000,
            chunk_search_size: CHUNK_SEARCH_SIZE,
            refine_limit: 16,
            refine_iterations: 32,
            max_perturbations: MAX_PERTURBATIONS,
            seed: 42,
        }
    }
}

/// Beam search driver following one direction schedule
pub struct BeamSearch {
    pub config: BeamConfig,
    directions: Vec<Direction>,
}

impl BeamSearch {
    pub fn new(config: BeamConfig, directions: Vec<Direction>) -> Self {
        BeamSearch { config, directions }
    }

    /// Forward-only search, exact when the beam is wide enough
    pub fn forward(config: BeamConfig, n: usize) -> Self {
        Self::new(config, vec![Direction::Forward; n])
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    #[inline]
    fn direction(&self, round: usize) -> Direction {
        self.directions.get(round).copied().unwrap_or(Direction::Forward)
    }

    /// Search a tour from `start`. `None` means no tour was found.
    pub fn run(&self, table: &CostTable, start: NodeId) -> Option<Solution> {
        let n = table.dimension();
        if n < 2 || start >= n || n > MAX_NODES {
            return None;
        }

        let started = Instant::now();
        let width = self.config.beam_width.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut keeper = Keeper::new(width);
        let mut next = Keeper::new(width);
        keeper.add(PartialTour::seed(start), start);

        let mut f_steps = 0;
        let mut b_steps = 0;

        for round in 0..n - 1 {
            match self.direction(round) {
                Direction::Forward => {
                    let day = f_steps;
                    for pt in keeper.partials() {
                        let from = pt.forward_end();
                        for to in (0..n).filter(|&to| to != start && !pt.visited.contains(to)) {
                            let price = table.raw(day, from, to);
                            if price != NO_ARC {
                                next.add(pt.prolonged(to, Cost::from(price), true), to);
                            }
                        }
                    }
                    f_steps += 1;
                }
                Direction::Backward => {
                    let day = n - 1 - b_steps;
                    for pt in keeper.partials() {
                        let into = pt.backward_end();
                        for to in (0..n).filter(|&to| to != start && !pt.visited.contains(to)) {
                            let price = table.raw(day, to, into);
                            if price != NO_ARC {
                                next.add(pt.prolonged(to, Cost::from(price), false), to);
                            }
                        }
                    }
                    b_steps += 1;
                }
            }

            keeper.clear();
            std::mem::swap(&mut keeper, &mut next);

            if keeper.is_empty() {
                log::debug!("round {}: no partial tour survived", round);
                return None;
            }
            log::trace!(
                "round {}: {} partial tours, worst cost {:?}",
                round,
                keeper.len(),
                keeper.worst_cost()
            );

            let chunk = self.config.chunk_search_size;
            if chunk > 0 && (round + 1) % chunk == 0 && round + 2 < n {
                let improved = keeper.refine_leaves(self.config.refine_limit, |pt| {
                    self.refine(table, pt, &mut rng)
                });
                log::trace!("round {}: refined {} partial tours", round, improved);
            }
        }

        // close the cycle: the only free flight joins the two ends
        let day = f_steps;
        debug_assert_eq!(day, n - 1 - b_steps);
        let closing = self.direction(n - 1);
        for pt in keeper.partials() {
            let (fwd, back) = (pt.forward_end(), pt.backward_end());
            let price = table.raw(day, fwd, back);
            if price == NO_ARC {
                continue;
            }
            match closing {
                Direction::Forward => next.add(pt.prolonged(back, Cost::from(price), true), back),
                Direction::Backward => next.add(pt.prolonged(fwd, Cost::from(price), false), fwd),
            };
        }

        let best = match next.best() {
            Some(best) => best,
            None => {
                log::debug!("no partial tour could be closed");
                return None;
            }
        };
        let (tour, joining_index) = best.extract_tour();
        let mut solution = Solution::from_tour(table, tour, joining_index, "BeamSearch");
        if !solution.feasible {
            log::warn!("beam search produced an infeasible tour: {:?}", solution.tour);
            return None;
        }
        debug_assert_eq!(solution.cost, best.cost);
        solution.computation_time = started.elapsed().as_secs_f64();
        Some(solution)
    }

    /// Polish both halves of a partial tour with random swaps. Endpoints and
    /// the visited set are unchanged. Returns `None` unless the cost dropped.
    fn refine<R: Rng>(&self, table: &CostTable, pt: &PartialTour, rng: &mut R) -> Option<PartialTour> {
        let n = table.dimension();
        let max_perturbations = self.config.max_perturbations;
        let iterations = self.config.refine_iterations;

        let mut forward = pt.forward.to_vec(true, true);
        let forward_cost = window_cost(table, &forward, 0)?;
        let mut backward = pt.backward.to_vec(true, false);
        let back_day = n + 1 - backward.len();
        let backward_cost = window_cost(table, &backward, back_day)?;

        let new_forward = perturb_window(table, &mut forward, 0, None, forward_cost, max_perturbations, iterations, rng);
        let new_backward = perturb_window(
            table,
            &mut backward,
            back_day,
            None,
            backward_cost,
            max_perturbations,
            iterations,
            rng,
        );
        if new_forward + new_backward >= pt.cost {
            return None;
        }

        let forward_path = if new_forward < forward_cost {
            TourPath::from_sequence(&forward)?
        } else {
            pt.forward.clone()
        };
        let backward_path = if new_backward < backward_cost {
            backward.reverse();
            TourPath::from_sequence(&backward)?
        } else {
            pt.backward.clone()
        };

        Some(PartialTour {
            forward: forward_path,
            backward: backward_path,
            visited: pt.visited,
            cost: new_forward + new_backward,
        })
    }
}

/// Cost of the flights along `seq`, the first one taken on `first_day`
fn window_cost(table: &CostTable, seq: &[NodeId], first_day: usize) -> Option<Cost> {
    seq.windows(2)
        .enumerate()
        .map(|(i, w)| table.price(first_day + i, w[0], w[1]).map(Cost::from))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> CostTable {
        CostTable::from_arcs(3, &[(0, 1, 0, 5), (1, 2, 1, 3), (2, 0, 2, 2)])
    }

    fn random_table(n: usize, density: f64, seed: u64) -> CostTable {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table = CostTable::new(n);
        for day in 0..n {
            for from in 0..n {
                for to in 0..n {
                    if from != to && rng.gen_bool(density) {
                        table.set(day, from, to, rng.gen_range(1..100));
                    }
                }
            }
        }
        table
    }

    fn brute_force(table: &CostTable, start: NodeId) -> Option<Cost> {
        fn go(table: &CostTable, tour: &mut Vec<NodeId>, used: &mut [bool], best: &mut Option<Cost>) {
            let n = table.dimension();
            if tour.len() == n {
                tour.push(tour[0]);
                if let Some(cost) = table.tour_cost(tour) {
                    *best = Some(best.map_or(cost, |b: Cost| b.min(cost)));
                }
                tour.pop();
                return;
            }
            for next in 0..n {
                if !used[next] {
                    used[next] = true;
                    tour.push(next);
                    go(table, tour, used, best);
                    tour.pop();
                    used[next] = false;
                }
            }
        }

        let mut used = vec![false; table.dimension()];
        used[start] = true;
        let mut best = None;
        go(table, &mut vec![start], &mut used, &mut best);
        best
    }

    #[test]
    fn test_single_cycle_every_schedule() {
        let table = triangle();
        for variant in 0..6 {
            let beam = BeamSearch::new(BeamConfig::default(), direction_schedule(variant, 3, 1));
            let solution = beam.run(&table, 0).unwrap();

            assert_eq!(solution.cost, 10);
            assert_eq!(solution.tour, vec![0, 1, 2, 0]);
        }
    }

    #[test]
    fn test_no_departure_from_start() {
        let table = CostTable::from_arcs(3, &[(1, 2, 1, 3), (2, 0, 2, 2), (0, 1, 1, 5)]);
        for variant in 0..4 {
            let beam = BeamSearch::new(BeamConfig::default(), direction_schedule(variant, 3, 1));
            assert!(beam.run(&table, 0).is_none());
        }
    }

    #[test]
    fn test_wide_forward_beam_is_exact() {
        for seed in 0..5 {
            let table = random_table(7, 0.6, seed);
            // 7 endpoints * 2^7 visited sets bound the number of keys
            let config = BeamConfig {
                beam_width: 7 * 128,
                chunk_search_size: 0,
                ..Default::default()
            };
            let found = BeamSearch::forward(config, 7).run(&table, 0).map(|s| s.cost);
            assert_eq!(found, brute_force(&table, 0));
        }
    }

    #[test]
    fn test_bidirectional_tours_are_valid() {
        for seed in 0..5 {
            let table = random_table(8, 0.7, 100 + seed);
            let optimum = brute_force(&table, 3);
            for variant in 0..6 {
                let config = BeamConfig {
                    beam_width: 64,
                    chunk_search_size: 2,
                    refine_limit: 8,
                    refine_iterations: 20,
                    seed,
                    ..Default::default()
                };
                let beam = BeamSearch::new(config, direction_schedule(variant, 8, seed));
                if let Some(solution) = beam.run(&table, 3) {
                    assert!(table.is_feasible(&solution.tour));
                    assert_eq!(solution.tour[0], 3);
                    assert_eq!(table.tour_cost(&solution.tour), Some(solution.cost));
                    assert!(solution.cost >= optimum.unwrap());
                }
            }
        }
    }

    #[test]
    fn test_schedules() {
        assert_eq!(direction_schedule(2, 4, 0), vec![
            Direction::Forward,
            Direction::Backward,
            Direction::Forward,
            Direction::Backward
        ]);
        assert_eq!(direction_schedule(5, 30, 9), direction_schedule(5, 30, 9));
        assert_eq!(direction_schedule(3, 5, 0)[4], Direction::Backward);
    }

    #[test]
    fn test_default_beam_width_shrinks() {
        assert!(default_beam_width(300) < default_beam_width(30));
        assert_eq!(default_beam_width(1), MAX_BEAM_WIDTH);
        assert!(default_beam_width(100_000) >= MIN_BEAM_WIDTH);
    }
}
