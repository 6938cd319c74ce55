//! Time-Dependent TSP Solver - Command Line Interface
//!
//! Reads a start city and day-indexed flight prices, searches a cheap round
//! trip within a wall-clock budget, and prints the itinerary.

use clap::{Parser, Subcommand, ValueEnum};
use tdtsp_solver::heuristics::beam::{default_beam_width, CHUNK_SEARCH_SIZE};
use tdtsp_solver::heuristics::local_search::MAX_PERTURBATIONS;
use tdtsp_solver::instance::Instance;
use tdtsp_solver::parallel::{ParallelSearch, SearchConfig};

use anyhow::{anyhow, Context, Result};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Upper bound on the default number of workers
const MAX_DEFAULT_WORKERS: usize = 8;

#[derive(Parser)]
#[command(name = "tdtsp-solver")]
#[command(version = "1.0")]
#[command(about = "A beam-search solver for the time-dependent TSP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a round trip
    Solve {
        /// Input file, standard input when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Total wall-clock budget in seconds, including input parsing
        #[arg(short, long, default_value = "30")]
        time_limit: f64,

        /// Seconds kept in reserve before the time limit
        #[arg(long, default_value = "1.5")]
        safety_margin: f64,

        /// Number of parallel workers (defaults to the available cores, at most 8)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Beam width (defaults to a value derived from the number of cities)
        #[arg(short, long)]
        beam_width: Option<usize>,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Maximum swapped pairs per local search trial
        #[arg(long, default_value_t = MAX_PERTURBATIONS)]
        max_perturbations: usize,

        /// Rounds between in-beam refinement passes (0 disables them)
        #[arg(long, default_value_t = CHUNK_SEARCH_SIZE)]
        chunk_search_size: usize,

        /// Skip removal of unusable flights before the search
        #[arg(long)]
        no_prune: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only print the total cost
        #[arg(long)]
        cost_only: bool,

        /// Write the result to a file instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print statistics about an instance
    Analyze {
        /// Input file, standard input when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum OutputFormat {
    /// Cost line followed by `FROM TO DAY PRICE` lines
    Text,
    /// JSON document
    Json,
}

struct SolveOptions {
    input: Option<PathBuf>,
    time_limit: f64,
    safety_margin: f64,
    workers: Option<usize>,
    beam_width: Option<usize>,
    seed: u64,
    max_perturbations: usize,
    chunk_search_size: usize,
    no_prune: bool,
    format: OutputFormat,
    cost_only: bool,
    output: Option<PathBuf>,
    verbose: bool,
}

fn main() {
    let started = Instant::now();
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Solve {
            input,
            time_limit,
            safety_margin,
            workers,
            beam_width,
            seed,
            max_perturbations,
            chunk_search_size,
            no_prune,
            format,
            cost_only,
            output,
            verbose,
        } => solve_instance(
            started,
            SolveOptions {
                input,
                time_limit,
                safety_margin,
                workers,
                beam_width,
                seed,
                max_perturbations,
                chunk_search_size,
                no_prune,
                format,
                cost_only,
                output,
                verbose,
            },
        ),

        Commands::Analyze { input } => analyze_instance(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_instance(input: &Option<PathBuf>) -> Result<Instance> {
    match input {
        Some(path) => Instance::from_file(path),
        None => Instance::from_reader(BufReader::new(io::stdin().lock()))
            .context("Cannot read instance from standard input"),
    }
}

fn solve_instance(started: Instant, opts: SolveOptions) -> Result<()> {
    let mut instance = load_instance(&opts.input)?;
    let n = instance.dimension();
    log::info!("loaded {} cities, {} flights", n, instance.costs.arc_count());

    if !opts.no_prune {
        let removed = instance.costs.prune_unreachable(instance.start);
        log::info!("pruned {} unusable flights", removed);
    }

    let workers = opts
        .workers
        .unwrap_or_else(|| rayon::current_num_threads().min(MAX_DEFAULT_WORKERS));
    let budget = opts.time_limit - opts.safety_margin - started.elapsed().as_secs_f64();
    let config = SearchConfig {
        workers,
        time_limit: budget.max(0.0),
        beam_width: opts.beam_width,
        chunk_search_size: opts.chunk_search_size,
        max_perturbations: opts.max_perturbations,
        seed: opts.seed,
        ..Default::default()
    };

    if opts.verbose {
        eprintln!("Cities: {}", n);
        eprintln!("Workers: {}", workers);
        eprintln!("Beam width: {}", opts.beam_width.unwrap_or_else(|| default_beam_width(n)));
        eprintln!("Search budget: {:.2}s", config.time_limit);
    }

    let solution = ParallelSearch::new(config)
        .solve(&instance.costs, instance.start)
        .ok_or_else(|| anyhow!("no tour found"))?;

    if opts.verbose {
        eprintln!("{}", solution);
    }

    let itinerary = solution.itinerary(&instance)?;
    let mut out: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => Box::new(io::BufWriter::new(io::stdout().lock())),
    };

    match opts.format {
        OutputFormat::Text => itinerary.write_text(&mut out, opts.cost_only)?,
        OutputFormat::Json => {
            if opts.cost_only {
                writeln!(out, "{}", itinerary.cost)?;
            } else {
                writeln!(out, "{}", itinerary.to_json()?)?;
            }
        }
    }
    out.flush()?;

    log::info!("done in {:.2}s", started.elapsed().as_secs_f64());
    Ok(())
}

fn analyze_instance(input: Option<PathBuf>) -> Result<()> {
    let mut instance = load_instance(&input)?;

    println!("========== Instance Analysis ==========\n");
    let start_code = instance.cities.id_to_code(instance.start).unwrap_or("?");
    println!("Start city: {}", start_code);
    println!("{}", instance.costs.statistics());

    let removed = instance.costs.prune_unreachable(instance.start);
    println!("After pruning ({} unusable flights removed):", removed);
    println!("{}", instance.costs.statistics());
    println!("Default beam width: {}", default_beam_width(instance.dimension()));
    Ok(())
}
