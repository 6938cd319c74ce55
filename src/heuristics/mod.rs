//! Heuristics module for the time-dependent TSP.
//!
//! This module exports the beam search and its building blocks, plus the
//! random perturbation local search.

pub mod path;
pub mod partial;
pub mod keeper;
pub mod beam;
pub mod local_search;

pub use path::*;
pub use partial::*;
pub use keeper::*;
pub use beam::*;
pub use local_search::*;
