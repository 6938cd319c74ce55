//! Module for parsing and representing time-dependent TSP instances.
//!
//! An instance is a start city plus a day-indexed price table: the price of
//! flying from one city to another depends on the day the flight is taken.
//! The text format is one start city code on the first line, followed by
//! `FROM TO DAY PRICE` lines. Missing flights are stored as [`NO_ARC`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Dense city identifier (also used as a day number, both range over `0..n`)
pub type NodeId = usize;

/// Price of a single flight as stored in the table
pub type Price = u32;

/// Accumulated tour cost
pub type Cost = i64;

/// Sentinel stored in the table for a flight that does not exist
pub const NO_ARC: Price = Price::MAX;

/// Number of 64-bit words in a visited set
pub const VISITED_WORDS: usize = 5;

/// Largest number of cities a search supports
pub const MAX_NODES: usize = 64 * VISITED_WORDS;

/// Day-indexed price table: `price(day, from, to)`.
///
/// Stored flat, day-major, so that one day's prices are a contiguous block of
/// `n * n` entries.
#[derive(Debug, Clone)]
pub struct CostTable {
    n: usize,
    prices: Vec<Price>,
}

impl CostTable {
    /// Create a table of `n` days over `n` cities with no flights
    pub fn new(n: usize) -> Self {
        CostTable {
            n,
            prices: vec![NO_ARC; n * n * n],
        }
    }

    /// Build a table from `(from, to, day, price)` tuples, keeping the cheapest
    /// duplicate
    pub fn from_arcs(n: usize, arcs: &[(NodeId, NodeId, usize, Price)]) -> Self {
        let mut table = CostTable::new(n);
        for &(from, to, day, price) in arcs {
            table.set(day, from, to, price);
        }
        table
    }

    #[inline]
    fn offset(&self, day: usize, from: NodeId, to: NodeId) -> usize {
        (day * self.n + from) * self.n + to
    }

    /// Number of cities, which is also the number of days
    #[inline]
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Raw table entry, [`NO_ARC`] when there is no flight
    #[inline]
    pub fn raw(&self, day: usize, from: NodeId, to: NodeId) -> Price {
        self.prices[self.offset(day, from, to)]
    }

    /// Price of a flight if it exists
    #[inline]
    pub fn price(&self, day: usize, from: NodeId, to: NodeId) -> Option<Price> {
        match self.raw(day, from, to) {
            NO_ARC => None,
            price => Some(price),
        }
    }

    /// Record a flight, keeping the cheaper one if it is already present
    pub fn set(&mut self, day: usize, from: NodeId, to: NodeId, price: Price) {
        let offset = self.offset(day, from, to);
        let slot = &mut self.prices[offset];
        if *slot == NO_ARC || *slot > price {
            *slot = price;
        }
    }

    /// Remove a flight from the table
    pub fn remove(&mut self, day: usize, from: NodeId, to: NodeId) {
        let offset = self.offset(day, from, to);
        self.prices[offset] = NO_ARC;
    }

    /// Total number of flights present
    pub fn arc_count(&self) -> usize {
        self.prices.iter().filter(|&&p| p != NO_ARC).count()
    }

    /// Cost of a closed tour, `None` if the tour uses a missing flight.
    ///
    /// The flight between `tour[t]` and `tour[t + 1]` is taken on day `t`.
    pub fn tour_cost(&self, tour: &[NodeId]) -> Option<Cost> {
        tour.windows(2)
            .enumerate()
            .map(|(day, w)| self.price(day, w[0], w[1]).map(Cost::from))
            .sum()
    }

    /// Check that a tour visits every city exactly once, returns to its
    /// start, and only uses existing flights
    pub fn is_feasible(&self, tour: &[NodeId]) -> bool {
        let n = self.n;
        if n == 0 || tour.len() != n + 1 || tour[0] != tour[n] {
            return false;
        }

        let mut seen = vec![false; n];
        for &node in &tour[..n] {
            if node >= n || seen[node] {
                return false;
            }
            seen[node] = true;
        }

        self.tour_cost(tour).is_some()
    }

    /// Clear every flight of `day` for which `keep(from, to)` is false.
    /// Returns the number of removed flights.
    fn retain_arcs<F>(&mut self, day: usize, keep: F) -> usize
    where
        F: Fn(NodeId, NodeId) -> bool + Sync,
    {
        let n = self.n;
        let block = &mut self.prices[day * n * n..(day + 1) * n * n];
        block
            .par_chunks_mut(n)
            .enumerate()
            .map(|(from, row)| {
                let mut removed = 0usize;
                for (to, price) in row.iter_mut().enumerate() {
                    if *price != NO_ARC && !keep(from, to) {
                        *price = NO_ARC;
                        removed += 1;
                    }
                }
                removed
            })
            .sum()
    }

    /// Remove flights that can never be part of a tour from `start`.
    ///
    /// The forward pass drops flights leaving a city that cannot be reached
    /// on that day, flights back into `start` before the last day and
    /// flights elsewhere on the last day. The backward pass drops flights
    /// landing in a city from which `start` cannot be reached by the end of
    /// the last day. Returns the number of removed flights.
    pub fn prune_unreachable(&mut self, start: NodeId) -> usize {
        let n = self.n;
        if n == 0 {
            return 0;
        }
        let mut removed = 0;

        let mut reachable = vec![false; n];
        reachable[start] = true;
        for day in 0..n {
            let last = day == n - 1;
            let from_ok = reachable.clone();
            removed += self.retain_arcs(day, |from, to| {
                from_ok[from] && from != to && (to == start) == last
            });

            reachable.iter_mut().for_each(|r| *r = false);
            for from in (0..n).filter(|&from| from_ok[from]) {
                for to in 0..n {
                    if self.raw(day, from, to) != NO_ARC {
                        reachable[to] = true;
                    }
                }
            }
        }

        let mut can_finish = vec![false; n];
        can_finish[start] = true;
        for day in (0..n).rev() {
            let to_ok = can_finish.clone();
            removed += self.retain_arcs(day, |_, to| to_ok[to]);

            for (from, finish) in can_finish.iter_mut().enumerate() {
                *finish = (0..n).any(|to| self.raw(day, from, to) != NO_ARC);
            }
        }

        removed
    }

    /// Gather statistics about the table
    pub fn statistics(&self) -> TableStatistics {
        let n = self.n;
        let mut arcs_per_day = Vec::with_capacity(n);
        let mut min_price = Price::MAX;
        let mut max_price = 0;
        let mut total: u64 = 0;

        for day in 0..n {
            let block = &self.prices[day * n * n..(day + 1) * n * n];
            let mut count = 0;
            for &price in block.iter().filter(|&&p| p != NO_ARC) {
                count += 1;
                min_price = min_price.min(price);
                max_price = max_price.max(price);
                total += u64::from(price);
            }
            arcs_per_day.push(count);
        }

        let num_arcs: usize = arcs_per_day.iter().sum();
        TableStatistics {
            dimension: n,
            num_arcs,
            min_arcs_per_day: arcs_per_day.iter().copied().min().unwrap_or(0),
            max_arcs_per_day: arcs_per_day.iter().copied().max().unwrap_or(0),
            empty_days: arcs_per_day.iter().filter(|&&c| c == 0).count(),
            min_price: if num_arcs > 0 { min_price } else { 0 },
            max_price,
            avg_price: if num_arcs > 0 { total as f64 / num_arcs as f64 } else { 0.0 },
        }
    }
}

/// Statistics about a price table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatistics {
    pub dimension: usize,
    pub num_arcs: usize,
    pub min_arcs_per_day: usize,
    pub max_arcs_per_day: usize,
    pub empty_days: usize,
    pub min_price: Price,
    pub max_price: Price,
    pub avg_price: f64,
}

impl std::fmt::Display for TableStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Cities / days: {}", self.dimension)?;
        writeln!(f, "  Flights: {}", self.num_arcs)?;
        writeln!(f, "  Flights per day: {} .. {}", self.min_arcs_per_day, self.max_arcs_per_day)?;
        writeln!(f, "  Days without flights: {}", self.empty_days)?;
        writeln!(f, "  Price range: {} .. {}", self.min_price, self.max_price)?;
        writeln!(f, "  Avg price: {:.2}", self.avg_price)
    }
}

/// Mapping between city codes and dense ids
#[derive(Debug, Clone, Default)]
pub struct Cities {
    codes: Vec<String>,
    ids: HashMap<String, NodeId>,
}

impl Cities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `code`, assigning the next free one on first sight
    pub fn intern(&mut self, code: &str) -> NodeId {
        if let Some(&id) = self.ids.get(code) {
            return id;
        }
        let id = self.codes.len();
        self.codes.push(code.to_string());
        self.ids.insert(code.to_string(), id);
        id
    }

    pub fn code_to_id(&self, code: &str) -> Option<NodeId> {
        self.ids.get(code).copied()
    }

    pub fn id_to_code(&self, id: NodeId) -> Option<&str> {
        self.codes.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// A complete problem instance
#[derive(Debug, Clone)]
pub struct Instance {
    /// City the tour starts and ends in
    pub start: NodeId,
    /// City code translation
    pub cities: Cities,
    /// Day-indexed prices
    pub costs: CostTable,
}

impl Instance {
    /// Number of cities (and days)
    pub fn dimension(&self) -> usize {
        self.costs.dimension()
    }

    /// Parse an instance from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Cannot open file {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse an instance from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut cities = Cities::new();
        let mut start = None;
        let mut arcs: Vec<(NodeId, NodeId, usize, Price)> = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.context("Read error")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if start.is_none() {
                let code = line.split_whitespace().next().unwrap_or(line);
                start = Some(cities.intern(code));
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                bail!(
                    "line {}: expected `FROM TO DAY PRICE`, got {} fields",
                    line_no + 1,
                    fields.len()
                );
            }
            let day: usize = fields[2]
                .parse()
                .with_context(|| format!("line {}: invalid day `{}`", line_no + 1, fields[2]))?;
            let price: Price = fields[3]
                .parse()
                .with_context(|| format!("line {}: invalid price `{}`", line_no + 1, fields[3]))?;
            if price == NO_ARC {
                bail!("line {}: price {} is out of range", line_no + 1, price);
            }

            let from = cities.intern(fields[0]);
            let to = cities.intern(fields[1]);
            if from == to {
                log::debug!("line {}: ignoring flight from {} to itself", line_no + 1, fields[0]);
                continue;
            }
            arcs.push((from, to, day, price));
        }

        let start = match start {
            Some(start) => start,
            None => bail!("missing start city"),
        };

        let n = cities.len();
        if n > MAX_NODES {
            bail!("{} cities exceed the supported maximum of {}", n, MAX_NODES);
        }
        if let Some(&(_, _, day, _)) = arcs.iter().find(|a| a.2 >= n) {
            bail!("day {} is out of range for {} cities", day, n);
        }

        let costs = CostTable::from_arcs(n, &arcs);
        Ok(Instance { start, cities, costs })
    }
}

impl FromStr for Instance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_reader(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "PRG\n\
        PRG TXL 0 5\n\
        TXL BCN 1 3\n\
        BCN PRG 2 2\n\
        PRG BCN 0 9\n\
        PRG TXL 0 4\n";

    #[test]
    fn test_parse_sample() {
        let instance: Instance = SAMPLE.parse().unwrap();

        assert_eq!(instance.dimension(), 3);
        assert_eq!(instance.start, 0);
        assert_eq!(instance.cities.id_to_code(1), Some("TXL"));
        assert_eq!(instance.cities.code_to_id("BCN"), Some(2));
        // cheapest duplicate wins
        assert_eq!(instance.costs.price(0, 0, 1), Some(4));
        assert_eq!(instance.costs.price(1, 0, 1), None);
        assert_eq!(instance.costs.arc_count(), 4);
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Instance>().is_err());
        assert!("PRG\nPRG TXL 0\n".parse::<Instance>().is_err());
        assert!("PRG\nPRG TXL zero 5\n".parse::<Instance>().is_err());
        assert!("PRG\nPRG TXL 7 5\n".parse::<Instance>().is_err());
    }

    #[test]
    fn test_tour_cost_and_feasibility() {
        let table = CostTable::from_arcs(3, &[(0, 1, 0, 5), (1, 2, 1, 3), (2, 0, 2, 2)]);

        assert_eq!(table.tour_cost(&[0, 1, 2, 0]), Some(10));
        assert!(table.is_feasible(&[0, 1, 2, 0]));
        assert!(!table.is_feasible(&[0, 2, 1, 0]));
        assert!(!table.is_feasible(&[0, 1, 1, 0]));
        assert!(!table.is_feasible(&[0, 1, 2]));
    }

    #[test]
    fn test_prune_unreachable() {
        // day 1 flight 2 -> 1 can never be used: city 2 is not reachable on day 1
        let mut table = CostTable::from_arcs(
            3,
            &[(0, 1, 0, 5), (1, 2, 1, 3), (2, 0, 2, 2), (2, 1, 1, 1), (1, 0, 0, 7)],
        );
        let removed = table.prune_unreachable(0);

        assert_eq!(removed, 2);
        assert_eq!(table.arc_count(), 3);
        assert!(table.is_feasible(&[0, 1, 2, 0]));
    }

    #[test]
    fn test_statistics() {
        let table = CostTable::from_arcs(3, &[(0, 1, 0, 5), (1, 2, 1, 3)]);
        let stats = table.statistics();

        assert_eq!(stats.num_arcs, 2);
        assert_eq!(stats.empty_days, 1);
        assert_eq!(stats.min_price, 3);
        assert_eq!(stats.max_price, 5);
    }
}
