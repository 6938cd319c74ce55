//! Time-Dependent TSP Solver Library
//!
//! Finds a cheap round trip through `n` cities over `n` days, where the price
//! of each flight depends on the day it is taken.
//!
//! # Features
//!
//! - Bidirectional beam-search dynamic programming over partial tours
//! - Persistent paths so partial tours share their history
//! - Bounded best-of-H keeper with O(log H) eviction
//! - Random multi-swap local search with rollback
//! - Parallel workers with diverse direction schedules under a deadline
//!
//! # Example
//!
//! ```no_run
//! use tdtsp_solver::instance::Instance;
//! use tdtsp_solver::parallel::{ParallelSearch, SearchConfig};
//!
//! let mut instance = Instance::from_file("input.txt").unwrap();
//! instance.costs.prune_unreachable(instance.start);
//!
//! let search = ParallelSearch::new(SearchConfig::default());
//! if let Some(solution) = search.solve(&instance.costs, instance.start) {
//!     println!("Solution cost: {}", solution.cost);
//! }
//! ```

pub mod instance;
pub mod solution;
pub mod heuristics;
pub mod parallel;

pub use instance::{CostTable, Instance};
pub use solution::Solution;
