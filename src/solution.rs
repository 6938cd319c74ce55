//! Solution representation and output formatting.
//!
//! A solution is a closed tour of `n + 1` cities where the flight between
//! positions `t` and `t + 1` is taken on day `t`.

use std::io::Write;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::instance::{Cost, CostTable, Instance, NodeId, Price};

/// Represents a solution to the time-dependent TSP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// The tour as a sequence of city ids, starting and ending at the start city
    pub tour: Vec<NodeId>,
    /// Total price of all flights
    pub cost: Cost,
    /// Whether every city is visited once and every flight exists
    pub feasible: bool,
    /// Position where the forward and backward halves were merged
    pub joining_index: usize,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Worker that produced this solution (parallel search only)
    pub worker: Option<usize>,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of local search iterations (if applicable)
    pub iterations: Option<u64>,
}

impl Solution {
    /// Create a new empty solution
    pub fn new() -> Self {
        Solution {
            tour: Vec::new(),
            cost: Cost::MAX,
            feasible: false,
            joining_index: 0,
            algorithm: String::new(),
            worker: None,
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create a solution from a tour
    pub fn from_tour(table: &CostTable, tour: Vec<NodeId>, joining_index: usize, algorithm: &str) -> Self {
        let mut solution = Solution {
            tour,
            joining_index,
            algorithm: algorithm.to_string(),
            ..Solution::new()
        };
        solution.validate(table);
        solution
    }

    /// Recompute cost and feasibility from the tour
    pub fn validate(&mut self, table: &CostTable) {
        self.feasible = table.is_feasible(&self.tour);
        self.cost = if self.feasible {
            table.tour_cost(&self.tour).unwrap_or(Cost::MAX)
        } else {
            Cost::MAX
        };
    }

    /// Flights of the tour, ordered by day
    pub fn flights(&self, table: &CostTable) -> Vec<Flight> {
        self.tour
            .windows(2)
            .enumerate()
            .filter_map(|(day, w)| {
                table.price(day, w[0], w[1]).map(|price| Flight {
                    from: w[0],
                    to: w[1],
                    day,
                    price,
                })
            })
            .collect()
    }

    /// Translate the solution to city codes
    pub fn itinerary(&self, instance: &Instance) -> Result<Itinerary> {
        let code = |id: NodeId| -> Result<String> {
            instance
                .cities
                .id_to_code(id)
                .map(str::to_string)
                .with_context(|| format!("unknown city id {}", id))
        };

        let flights = self
            .flights(&instance.costs)
            .into_iter()
            .map(|f| -> Result<FlightRecord> {
                Ok(FlightRecord {
                    from: code(f.from)?,
                    to: code(f.to)?,
                    day: f.day,
                    price: f.price,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Itinerary { cost: self.cost, flights })
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Cost: {}", self.cost)?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        if let Some(worker) = self.worker {
            writeln!(f, "  Worker: {}", worker)?;
        }
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        writeln!(f, "  Tour: {:?}", self.tour)
    }
}

/// One flight of a tour, in city ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flight {
    pub from: NodeId,
    pub to: NodeId,
    pub day: usize,
    pub price: Price,
}

/// One flight of a tour, in city codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub from: String,
    pub to: String,
    pub day: usize,
    pub price: Price,
}

/// Printable result: total cost and the day-ordered flights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Itinerary {
    pub cost: Cost,
    pub flights: Vec<FlightRecord>,
}

impl Itinerary {
    /// Write the cost line followed by `FROM TO DAY PRICE` lines
    pub fn write_text<W: Write>(&self, mut out: W, cost_only: bool) -> Result<()> {
        writeln!(out, "{}", self.cost)?;
        if cost_only {
            return Ok(());
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(out);
        for flight in &self.flights {
            writer.serialize(flight)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Instance {
        "AAA\nAAA BBB 0 5\nBBB CCC 1 3\nCCC AAA 2 2\n".parse().unwrap()
    }

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new();
        assert!(sol.tour.is_empty());
        assert!(!sol.feasible);
        assert_eq!(sol.cost, Cost::MAX);
    }

    #[test]
    fn test_from_tour_validates() {
        let instance = triangle();
        let good = Solution::from_tour(&instance.costs, vec![0, 1, 2, 0], 3, "test");
        let bad = Solution::from_tour(&instance.costs, vec![0, 2, 1, 0], 3, "test");

        assert!(good.feasible);
        assert_eq!(good.cost, 10);
        assert!(!bad.feasible);
        assert_eq!(bad.cost, Cost::MAX);
    }

    #[test]
    fn test_text_output() {
        let instance = triangle();
        let sol = Solution::from_tour(&instance.costs, vec![0, 1, 2, 0], 3, "test");
        let itinerary = sol.itinerary(&instance).unwrap();

        let mut out = Vec::new();
        itinerary.write_text(&mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "10\nAAA BBB 0 5\nBBB CCC 1 3\nCCC AAA 2 2\n"
        );

        let mut out = Vec::new();
        itinerary.write_text(&mut out, true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "10\n");
    }

    #[test]
    fn test_json_output() {
        let instance = triangle();
        let sol = Solution::from_tour(&instance.costs, vec![0, 1, 2, 0], 3, "test");
        let json = sol.itinerary(&instance).unwrap().to_json().unwrap();
        let parsed: Itinerary = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.cost, 10);
        assert_eq!(parsed.flights.len(), 3);
        assert_eq!(parsed.flights[2].to, "AAA");
    }
}
