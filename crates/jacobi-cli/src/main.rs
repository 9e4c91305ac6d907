//! Jacobi command-line interface.
//!
//! Solve systems from TOML job files or directly from a system file:
//! ```sh
//! jacobi-cli run job.toml
//! jacobi-cli solve matrix_data.txt --strategy distributed --units 4
//! jacobi-cli generate matrix_data.txt 500 --seed 7
//! jacobi-cli bench matrix_data.txt --workers 1,2,4,8
//! mpirun -n 4 jacobi-cli mpi matrix_data.txt   # with --features mpi
//! ```

mod config;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jacobi_core::{ConvergenceNorm, SolverConfig};

#[derive(Parser)]
#[command(name = "jacobi-cli")]
#[command(about = "Parallel Jacobi iterative solver for dense linear systems")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Iteration controls shared by the direct subcommands.
#[derive(clap::Args)]
struct SolverArgs {
    /// Convergence tolerance on the change between iterates.
    #[arg(long, default_value_t = 1e-5)]
    tolerance: f64,
    /// Maximum number of sweeps.
    #[arg(long, default_value_t = 10_000)]
    max_iterations: usize,
    /// Norm of the change: linf or l1.
    #[arg(long, default_value_t = ConvergenceNorm::LInf)]
    norm: ConvergenceNorm,
}

impl SolverArgs {
    fn to_config(&self) -> SolverConfig {
        SolverConfig::new(self.tolerance, self.max_iterations).with_norm(self.norm)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a solve from a TOML job file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a job file and its system without solving.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Solve a system file and print the report.
    Solve {
        /// System file.
        input: PathBuf,
        /// serial, shared or distributed.
        #[arg(short, long, default_value = "shared")]
        strategy: String,
        /// Worker threads for the shared strategy.
        #[arg(short, long)]
        threads: Option<usize>,
        /// Units for the distributed strategy.
        #[arg(short, long, default_value_t = 4)]
        units: usize,
        #[command(flatten)]
        solver: SolverArgs,
    },
    /// Write a random strictly diagonally dominant system.
    Generate {
        /// Destination file.
        output: PathBuf,
        /// Matrix dimension.
        n: usize,
        /// Seed for reproducible systems.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Compare wall time of every strategy on one system.
    Bench {
        /// System file.
        input: PathBuf,
        /// Thread and unit counts to try.
        #[arg(short, long, value_delimiter = ',', default_values_t = [1, 2, 4, 8])]
        workers: Vec<usize>,
        /// Runs per configuration.
        #[arg(short, long, default_value_t = 3)]
        repeat: usize,
        #[command(flatten)]
        solver: SolverArgs,
    },
    /// Run one unit of a distributed solve under mpirun.
    #[cfg(feature = "mpi")]
    Mpi {
        /// System file, read by rank 0.
        input: PathBuf,
        #[command(flatten)]
        solver: SolverArgs,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Jacobi Solver");
            println!("=============");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job)?;
            runner::print_report(&result);

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_solution {
                runner::write_solution_text(&result, &out_dir.join("solution.txt"))?;
            }
            if job.output.save_json {
                runner::write_solution_json(&result, &out_dir.join("solution.json"))?;
            }
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let system = jacobi_core::io::read_system(&job.input)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "System: {}x{}, strictly diagonally dominant: {}",
                system.dim(),
                system.dim(),
                system.is_diagonally_dominant()
            );
            Ok(())
        }
        Commands::Solve {
            input,
            strategy,
            threads,
            units,
            solver,
        } => {
            let strategy = config::parse_strategy(&strategy, threads, units)?;
            let system = jacobi_core::io::read_system(&input)?;
            println!(
                "Running {} Jacobi solver on {}x{} system",
                strategy,
                system.dim(),
                system.dim()
            );
            let result = runner::solve_timed(system, &solver.to_config(), strategy)?;
            runner::print_report(&result);
            Ok(())
        }
        Commands::Generate { output, n, seed } => runner::generate(&output, n, seed),
        Commands::Bench {
            input,
            workers,
            repeat,
            solver,
        } => {
            runner::bench(&input, &solver.to_config(), &workers, repeat)?;
            Ok(())
        }
        #[cfg(feature = "mpi")]
        Commands::Mpi { input, solver } => runner::run_mpi(&input, &solver.to_config()),
    }
}
