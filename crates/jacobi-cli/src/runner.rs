//! Job runner: ties together input loading, strategy selection and reporting.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use jacobi_compute::{create_executor, ExecutionStrategy};
use jacobi_core::io::{generate_diagonally_dominant, read_system, save_system};
use jacobi_core::{LinearSystem, SolveResult, SolverConfig};

use crate::config::JobConfig;

/// Entries of `x` printed in console reports.
const PRINT_LIMIT: usize = 10;

/// Results from one solve run.
pub struct RunOutput {
    pub system: LinearSystem,
    pub result: SolveResult,
    pub strategy: ExecutionStrategy,
    pub elapsed: Duration,
    pub residual: f64,
}

/// Load the job's system and solve it with the configured strategy.
pub fn run_job(job: &JobConfig) -> Result<RunOutput> {
    let system = read_system(&job.input)
        .with_context(|| format!("Failed to load system from {}", job.input.display()))?;
    let config = job.solver_config();
    let strategy = job.strategy()?;

    println!(
        "Solving {}x{} system with {} (tolerance {:e}, max {} iterations, {} norm)",
        system.dim(),
        system.dim(),
        strategy,
        config.tolerance,
        config.max_iterations,
        config.norm
    );
    if !system.is_diagonally_dominant() {
        println!("Note: matrix is not strictly diagonally dominant; convergence is not guaranteed.");
    }

    solve_timed(system, &config, strategy)
}

/// Solve with one strategy, measuring wall time.
pub fn solve_timed(
    system: LinearSystem,
    config: &SolverConfig,
    strategy: ExecutionStrategy,
) -> Result<RunOutput> {
    let executor = create_executor(strategy)?;
    let start = Instant::now();
    let result = executor
        .solve(&system, config)
        .with_context(|| format!("{} solve failed", executor.method_name()))?;
    let elapsed = start.elapsed();
    let residual = system.residual_inf_norm(&result.x)?;
    info!(
        "{}: {} iterations in {:.3?}",
        executor.method_name(),
        result.iterations,
        elapsed
    );

    Ok(RunOutput {
        system,
        result,
        strategy,
        elapsed,
        residual,
    })
}

/// Print the outcome of a run.
pub fn print_report(output: &RunOutput) {
    let result = &output.result;
    if result.converged {
        println!("Converged in {} iterations", result.iterations);
    } else {
        println!(
            "Did not converge: stopped after {} iterations",
            result.iterations
        );
    }
    println!("Final error: {:.12e}", result.final_error);
    println!("Residual ||b - Ax||_inf: {:.6e}", output.residual);
    println!("Execution time: {:.6} seconds", output.elapsed.as_secs_f64());

    let n = result.x.len();
    let shown = n.min(PRINT_LIMIT);
    println!();
    println!("Solution (first {} entries):", shown);
    for (i, v) in result.x.iter().take(shown).enumerate() {
        println!("x[{}] = {:.12}", i, v);
    }
    if n > shown {
        println!("... (total {} values)", n);
    }
}

/// Write the solution vector as text, one `x[i] = value` line per entry.
pub fn write_solution_text(output: &RunOutput, path: &Path) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("Cannot create {}", path.display()))?;
    let mut file = std::io::BufWriter::new(file);
    let result = &output.result;

    writeln!(file, "# Jacobi solver, version {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# strategy: {}", output.strategy)?;
    writeln!(
        file,
        "# N: {}, iterations: {}, converged: {}",
        output.system.dim(),
        result.iterations,
        result.converged
    )?;
    writeln!(file, "# final_error: {:.12e}", result.final_error)?;
    writeln!(file, "# residual_inf: {:.12e}", output.residual)?;
    for (i, v) in result.x.iter().enumerate() {
        writeln!(file, "x[{}] = {:.12}", i, v)?;
    }
    file.flush()?;

    println!("Solution written to: {}", path.display());
    Ok(())
}

/// Write the full solve result to a JSON file.
pub fn write_solution_json(output: &RunOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let report = serde_json::json!({
        "strategy": output.strategy,
        "n": output.system.dim(),
        "elapsed_seconds": output.elapsed.as_secs_f64(),
        "residual_inf": output.residual,
        "result": output.result,
    });
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Solution (JSON) written to: {}", path.display());
    Ok(())
}

/// Write a random strictly diagonally dominant system.
pub fn generate(path: &Path, n: usize, seed: Option<u64>) -> Result<()> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let system = generate_diagonally_dominant(n, &mut rng)?;
    save_system(&system, path)
        .with_context(|| format!("Cannot write system to {}", path.display()))?;
    println!("Generated {}x{} system: {}", n, n, path.display());
    Ok(())
}

/// One line of a benchmark table.
pub struct BenchRow {
    pub strategy: ExecutionStrategy,
    pub workers: usize,
    pub elapsed: Duration,
    pub iterations: usize,
    pub converged: bool,
}

impl BenchRow {
    /// Speedup relative to `baseline`.
    pub fn speedup(&self, baseline: Duration) -> f64 {
        baseline.as_secs_f64() / self.elapsed.as_secs_f64().max(f64::MIN_POSITIVE)
    }
}

/// Time every strategy on one system and print a comparison table.
///
/// Each configuration is solved `repeat` times and the mean is reported.
pub fn bench(
    input: &Path,
    config: &SolverConfig,
    workers: &[usize],
    repeat: usize,
) -> Result<Vec<BenchRow>> {
    let system = read_system(input)
        .with_context(|| format!("Failed to load system from {}", input.display()))?;
    let repeat = repeat.max(1);

    let mut plan = vec![(ExecutionStrategy::Serial, 1)];
    for &w in workers {
        plan.push((ExecutionStrategy::SharedMemory { threads: Some(w) }, w));
    }
    for &w in workers {
        plan.push((ExecutionStrategy::Distributed { units: w }, w));
    }

    println!(
        "Benchmarking {}x{} system, {} run(s) per configuration",
        system.dim(),
        system.dim(),
        repeat
    );

    let mut rows = Vec::with_capacity(plan.len());
    for (strategy, w) in plan {
        let executor = create_executor(strategy)?;
        let mut total = Duration::ZERO;
        let mut last = None;
        for _ in 0..repeat {
            let start = Instant::now();
            let result = executor
                .solve(&system, config)
                .with_context(|| format!("{} solve failed", strategy))?;
            total += start.elapsed();
            last = Some(result);
        }
        let Some(result) = last else {
            continue;
        };
        rows.push(BenchRow {
            strategy,
            workers: w,
            elapsed: mean_duration(total, repeat),
            iterations: result.iterations,
            converged: result.converged,
        });
    }

    print_bench_table(&rows);
    Ok(rows)
}

/// Mean of `runs` timings totalling `total`.
fn mean_duration(total: Duration, runs: usize) -> Duration {
    total.div_f64(runs.max(1) as f64)
}

fn print_bench_table(rows: &[BenchRow]) {
    let Some(baseline) = rows.first().map(|r| r.elapsed) else {
        return;
    };
    println!();
    println!(
        "{:<32} | {:>7} | {:>12} | {:>8} | {:>10} | {:>10}",
        "strategy", "workers", "time (ms)", "speedup", "efficiency", "iterations"
    );
    println!("{}", "-".repeat(94));
    for row in rows {
        let speedup = row.speedup(baseline);
        println!(
            "{:<32} | {:>7} | {:>12.3} | {:>8.2} | {:>9.1}% | {:>10}{}",
            row.strategy.to_string(),
            row.workers,
            row.elapsed.as_secs_f64() * 1000.0,
            speedup,
            100.0 * speedup / row.workers as f64,
            row.iterations,
            if row.converged { "" } else { " (cap)" }
        );
    }
}

/// Run this process's unit of an MPI job; rank 0 reads the system and reports.
#[cfg(feature = "mpi")]
pub fn run_mpi(input: &Path, config: &SolverConfig) -> Result<()> {
    use jacobi_compute::distributed::mpi::MpiCommunicator;
    use jacobi_compute::distributed::{run_unit, Communicator, RootInput};

    let comm = MpiCommunicator::initialize()?;

    let system = if comm.is_root() {
        match read_system(input) {
            Ok(system) => Some(system),
            Err(e) => {
                log::error!("Failed to load system from {}: {}", input.display(), e);
                comm.abort(1)
            }
        }
    } else {
        None
    };
    let initial = vec![0.0; system.as_ref().map_or(0, LinearSystem::dim)];
    let root_input = system.as_ref().map(|system| RootInput {
        system,
        initial: &initial,
    });

    if let Some(system) = &system {
        println!(
            "Solving {}x{} system with distributed ({} MPI processes)",
            system.dim(),
            system.dim(),
            comm.size()
        );
    }

    let start = Instant::now();
    let result = run_unit(&comm, root_input, config)?;
    let elapsed = start.elapsed();

    if let (Some(result), Some(system)) = (result, system) {
        let residual = system.residual_inf_norm(&result.x)?;
        print_report(&RunOutput {
            system,
            result,
            strategy: ExecutionStrategy::Distributed { units: comm.size() },
            elapsed,
            residual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("jacobi-cli-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_generate_then_solve_and_export() {
        let dir = scratch_dir("export");
        let input = dir.join("system.txt");
        generate(&input, 6, Some(3)).unwrap();

        let system = read_system(&input).unwrap();
        let output = solve_timed(
            system,
            &SolverConfig::new(1e-10, 1000),
            ExecutionStrategy::SharedMemory { threads: Some(2) },
        )
        .unwrap();
        assert!(output.result.converged);
        assert!(output.residual < 1e-6);

        let text = dir.join("solution.txt");
        let json = dir.join("solution.json");
        write_solution_text(&output, &text).unwrap();
        write_solution_json(&output, &json).unwrap();

        let written = std::fs::read_to_string(&text).unwrap();
        assert_eq!(written.lines().filter(|l| l.starts_with("x[")).count(), 6);

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed["n"], 6);
        assert_eq!(parsed["result"]["x"].as_array().unwrap().len(), 6);
        assert_eq!(parsed["strategy"]["strategy"], "shared_memory");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_mean_duration_handles_large_run_counts() {
        assert_eq!(
            mean_duration(Duration::from_secs(4), 4),
            Duration::from_secs(1)
        );
        // a count that truncates to zero as u32 must not divide by zero
        let runs = (u32::MAX as usize).saturating_add(1);
        assert!(mean_duration(Duration::from_secs(1), runs) < Duration::from_micros(1));
        assert_eq!(mean_duration(Duration::from_secs(2), 0), Duration::from_secs(2));
    }

    #[test]
    fn test_bench_covers_every_strategy() {
        let dir = scratch_dir("bench");
        let input = dir.join("system.txt");
        generate(&input, 8, Some(5)).unwrap();

        let rows = bench(&input, &SolverConfig::default(), &[1, 2], 1).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].strategy, ExecutionStrategy::Serial);
        assert!(rows.iter().all(|r| r.converged));
        assert!(rows.iter().all(|r| r.iterations == rows[0].iterations));

        std::fs::remove_dir_all(&dir).ok();
    }
}
