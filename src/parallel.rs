//! Parallel multi-start search.
//!
//! Every worker runs a beam search with its own direction schedule, then
//! polishes the tour with random perturbations until the shared stop flag is
//! raised at the deadline. The cheapest tour over all workers wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::heuristics::beam::{default_beam_width, direction_schedule, BeamConfig, BeamSearch, CHUNK_SEARCH_SIZE};
use crate::heuristics::local_search::{LocalSearch, PerturbationConfig, RandomPerturbation, MAX_PERTURBATIONS};
use crate::instance::{CostTable, NodeId};
use crate::solution::Solution;

/// How often the coordinator checks whether all workers are done
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Parallel search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Number of worker threads, one direction schedule each
    pub workers: usize,
    /// Wall-clock budget in seconds, measured from the call to `solve`
    pub time_limit: f64,
    /// Beam width, derived from the instance size when `None`
    pub beam_width: Option<usize>,
    /// Rounds between in-beam refinement passes
    pub chunk_search_size: usize,
    /// Partial tours refined per pass
    pub refine_limit: usize,
    /// Swap trials per refined half
    pub refine_iterations: u64,
    /// Maximum swapped pairs per local search trial
    pub max_perturbations: usize,
    /// Local search trial cap per worker
    pub max_iterations: u64,
    /// Base random seed
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            workers: 4,
            time_limit: 28.0,
            beam_width: None,
            chunk_search_size: CHUNK_SEARCH_SIZE,
            refine_limit: 16,
            refine_iterations: 32,
            max_perturbations: MAX_PERTURBATIONS,
            max_iterations: u64::MAX,
            seed: 42,
        }
    }
}

/// Runs one beam search plus local search per worker and keeps the best
pub struct ParallelSearch {
    pub config: SearchConfig,
}

impl ParallelSearch {
    pub fn new(config: SearchConfig) -> Self {
        ParallelSearch { config }
    }

    /// Solve from `start`. `None` when no worker found a tour.
    pub fn solve(&self, table: &CostTable, start: NodeId) -> Option<Solution> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs_f64(self.config.time_limit.max(0.0));
        let n = table.dimension();
        let beam_width = self.config.beam_width.unwrap_or_else(|| default_beam_width(n));
        let workers = self.config.workers.max(1);
        let stop = AtomicBool::new(false);

        log::info!(
            "searching {} cities with {} workers, beam width {}, {:.1}s budget",
            n,
            workers,
            beam_width,
            self.config.time_limit
        );

        let results: Vec<Option<Solution>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let stop = &stop;
                    scope.spawn(move || self.run_worker(worker, table, start, beam_width, stop, started))
                })
                .collect();

            while !handles.iter().all(|h| h.is_finished()) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(POLL_INTERVAL));
            }
            stop.store(true, Ordering::Relaxed);

            handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| match handle.join() {
                    Ok(result) => result,
                    Err(_) => {
                        log::warn!("worker {} panicked", worker);
                        None
                    }
                })
                .collect()
        });

        let best = select_best(results);
        match &best {
            Some(solution) => log::info!(
                "best cost {} from worker {:?} after {:.2}s",
                solution.cost,
                solution.worker,
                started.elapsed().as_secs_f64()
            ),
            None => log::info!("no worker found a tour"),
        }
        best
    }

    fn run_worker(
        &self,
        worker: usize,
        table: &CostTable,
        start: NodeId,
        beam_width: usize,
        stop: &AtomicBool,
        started: Instant,
    ) -> Option<Solution> {
        let seed = self
            .config
            .seed
            .wrapping_add((worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let directions = direction_schedule(worker, table.dimension(), seed);
        let beam = BeamSearch::new(
            BeamConfig {
                beam_width,
                chunk_search_size: self.config.chunk_search_size,
                refine_limit: self.config.refine_limit,
                refine_iterations: self.config.refine_iterations,
                max_perturbations: self.config.max_perturbations,
                seed,
            },
            directions,
        );

        let mut solution = match beam.run(table, start) {
            Some(solution) => solution,
            None => {
                log::info!("worker {}: no tour found", worker);
                return None;
            }
        };
        log::info!(
            "worker {}: beam search cost {} after {:.2}s",
            worker,
            solution.cost,
            started.elapsed().as_secs_f64()
        );

        let search = RandomPerturbation::new(PerturbationConfig {
            max_perturbations: self.config.max_perturbations,
            max_iterations: self.config.max_iterations,
            time_limit: None,
            seed,
        })
        .with_stop_flag(stop);
        let beam_cost = solution.cost;
        search.improve(table, &mut solution);

        solution.worker = Some(worker);
        solution.algorithm = format!("BeamSearch+{}", search.name());
        solution.computation_time = started.elapsed().as_secs_f64();
        log::info!(
            "worker {}: local search {} -> {} in {} iterations",
            worker,
            beam_cost,
            solution.cost,
            solution.iterations.unwrap_or(0)
        );
        Some(solution)
    }
}

/// Cheapest feasible solution; ties go to the earliest entry
pub fn select_best(results: Vec<Option<Solution>>) -> Option<Solution> {
    results
        .into_iter()
        .flatten()
        .filter(|s| s.feasible)
        .min_by_key(|s| s.cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn quick_config() -> SearchConfig {
        SearchConfig {
            workers: 5,
            time_limit: 5.0,
            beam_width: Some(500),
            max_iterations: 5_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_triangle() {
        let table = CostTable::from_arcs(3, &[(0, 1, 0, 5), (1, 2, 1, 3), (2, 0, 2, 2)]);
        let solution = ParallelSearch::new(quick_config()).solve(&table, 0).unwrap();

        assert_eq!(solution.cost, 10);
        assert_eq!(solution.tour, vec![0, 1, 2, 0]);
        assert_eq!(solution.worker, Some(0));
    }

    #[test]
    fn test_infeasible_instance() {
        let table = CostTable::from_arcs(3, &[(1, 2, 1, 3), (2, 0, 2, 2)]);
        assert!(ParallelSearch::new(quick_config()).solve(&table, 0).is_none());
    }

    #[test]
    fn test_random_instance_is_feasible() {
        let n = 20;
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut table = CostTable::new(n);
        for day in 0..n {
            for from in 0..n {
                for to in 0..n {
                    if from != to && rng.gen_bool(0.5) {
                        table.set(day, from, to, rng.gen_range(10..500));
                    }
                }
            }
        }

        let solution = ParallelSearch::new(quick_config()).solve(&table, 4).unwrap();
        assert!(table.is_feasible(&solution.tour));
        assert_eq!(table.tour_cost(&solution.tour), Some(solution.cost));
        assert_eq!(solution.tour[0], 4);
    }

    #[test]
    fn test_deadline_stops_unbounded_search() {
        let table = CostTable::from_arcs(
            5,
            &[(0, 1, 0, 1), (1, 2, 1, 1), (2, 3, 2, 1), (3, 4, 3, 1), (4, 0, 4, 1), (0, 2, 0, 1)],
        );
        let config = SearchConfig {
            workers: 2,
            time_limit: 0.2,
            beam_width: Some(100),
            ..Default::default()
        };
        let started = Instant::now();
        let solution = ParallelSearch::new(config).solve(&table, 0).unwrap();

        assert_eq!(solution.cost, 5);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_select_best_prefers_lowest_worker_on_ties() {
        let mut a = Solution::new();
        a.feasible = true;
        a.cost = 7;
        a.worker = Some(1);
        let mut b = a.clone();
        b.worker = Some(2);
        let mut c = a.clone();
        c.cost = 9;
        c.worker = Some(0);

        let best = select_best(vec![None, Some(c), Some(a), Some(b)]).unwrap();
        assert_eq!(best.worker, Some(1));
        assert!(select_best(vec![None, None]).is_none());
    }
}
