use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::WrapErr;
use log::info;

use concolic_rs::config::{ExplorationConfig, TimeoutLadder};
use concolic_rs::engine::ExplorationEngine;
use concolic_rs::script::load_module;
use concolic_rs::solver::process::ProcessSolver;
use concolic_rs::solver::search::SearchSolver;
use concolic_rs::solver::SolverAdapter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SolverKind {
    /// Built-in propagation and candidate search.
    Search,
    /// `z3` binary on the PATH.
    Z3,
    /// `cvc5` binary on the PATH.
    Cvc5,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Explore the paths of a target module")]
struct Cli {
    /// Target module; its entry point is the function named after the file stem.
    #[arg(value_name = "MODULE")]
    module: PathBuf,

    /// Number of solver workers.
    #[arg(long, value_name = "INT", default_value = "1")]
    workers: usize,

    /// Stop after this many runs.
    #[arg(long, value_name = "INT")]
    max_iterations: Option<usize>,

    /// Solver timeouts in milliseconds, comma-separated.
    #[arg(long, value_name = "MS", value_delimiter = ',')]
    timeouts: Vec<u64>,

    #[arg(long, value_enum, default_value = "search")]
    solver: SolverKind,

    /// Write the constraint tree in DOT format to this file.
    #[arg(long, value_name = "FILE")]
    dot: Option<PathBuf>,

    /// More logging (repeat for trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn level(&self) -> simplelog::LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => simplelog::LevelFilter::Warn,
            (false, 0) => simplelog::LevelFilter::Info,
            (false, 1) => simplelog::LevelFilter::Debug,
            (false, _) => simplelog::LevelFilter::Trace,
        }
    }

    fn config(&self) -> color_eyre::Result<ExplorationConfig> {
        let mut config = ExplorationConfig::default().with_workers(self.workers);
        if !self.timeouts.is_empty() {
            config = config.with_ladder(TimeoutLadder::from_millis(&self.timeouts)?);
        }
        if let Some(n) = self.max_iterations {
            config = config.with_max_iterations(n);
        }
        Ok(config)
    }

    fn solver(&self) -> Arc<dyn SolverAdapter> {
        match self.solver {
            SolverKind::Search => Arc::new(SearchSolver::new()),
            SolverKind::Z3 => Arc::new(ProcessSolver::z3()),
            SolverKind::Cvc5 => Arc::new(ProcessSolver::cvc5()),
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.level(),
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = Instant::now();

    let target = load_module(&args.module).wrap_err_with(|| format!("failed to load `{}`", args.module.display()))?;
    let config = args.config()?;
    let solver = args.solver();
    info!("solver: {}", solver.name());

    let invocation = target.invocation().clone();
    let engine = ExplorationEngine::new(invocation, target, solver, config)?;
    let result = engine.explore();

    for (i, (inputs, outcome)) in result.runs().enumerate() {
        println!("#{} {} -> {}", i + 1, inputs, outcome);
    }

    let tree = result.tree.stats();
    let failures = result.failures().count();
    println!(
        "{} run(s), {} failure(s), {} node(s), {} archived, max depth {}",
        result.generated_inputs.len(),
        failures,
        tree.nodes,
        tree.archived,
        tree.max_depth
    );

    if let Some(path) = &args.dot {
        std::fs::write(path, result.tree.to_dot()).wrap_err_with(|| format!("failed to write `{}`", path.display()))?;
        info!("constraint tree written to {}", path.display());
    }

    info!("total time: {:.3} s", time_total.elapsed().as_secs_f64());

    Ok(())
}
