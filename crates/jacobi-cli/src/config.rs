//! TOML configuration deserialisation for solver jobs.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use jacobi_compute::ExecutionStrategy;
use jacobi_core::{ConvergenceNorm, SolverConfig};
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    /// System file, relative paths resolved against the job file.
    pub input: PathBuf,
    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Iteration controls from TOML.
#[derive(Debug, Deserialize)]
pub struct SolverSection {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// "linf" (default) or "l1".
    #[serde(default)]
    pub norm: ConvergenceNorm,
    #[serde(default)]
    pub record_history: bool,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            norm: ConvergenceNorm::default(),
            record_history: false,
        }
    }
}

fn default_tolerance() -> f64 {
    1e-5
}
fn default_max_iterations() -> usize {
    10_000
}

/// Execution strategy from TOML.
#[derive(Debug, Deserialize)]
pub struct ExecutionSection {
    /// "serial", "shared" (default) or "distributed".
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Worker threads for "shared"; the host's parallelism when absent.
    pub threads: Option<usize>,
    /// Units for "distributed".
    #[serde(default = "default_units")]
    pub units: usize,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            threads: None,
            units: default_units(),
        }
    }
}

fn default_strategy() -> String {
    "shared".into()
}
fn default_units() -> usize {
    4
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the solution as text (default: true).
    #[serde(default = "default_true")]
    pub save_solution: bool,
    /// Whether to also save the full result as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_solution: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            tolerance: self.solver.tolerance,
            max_iterations: self.solver.max_iterations,
            norm: self.solver.norm,
            record_history: self.solver.record_history,
        }
    }

    pub fn strategy(&self) -> anyhow::Result<ExecutionStrategy> {
        parse_strategy(&self.execution.strategy, self.execution.threads, self.execution.units)
    }
}

/// Map a strategy name and its unit counts onto an [`ExecutionStrategy`].
pub fn parse_strategy(
    name: &str,
    threads: Option<usize>,
    units: usize,
) -> anyhow::Result<ExecutionStrategy> {
    Ok(match name {
        "serial" => ExecutionStrategy::Serial,
        "shared" | "shared-memory" | "threads" => ExecutionStrategy::SharedMemory { threads },
        "distributed" => ExecutionStrategy::Distributed { units },
        other => bail!(
            "Unknown strategy '{}'. Valid strategies: serial, shared, distributed",
            other
        ),
    })
}

/// Load and parse a TOML job configuration file.
///
/// A relative `input` is taken relative to the job file's directory.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read job file {}", path.display()))?;
    let mut config = parse_config(&content)
        .with_context(|| format!("Invalid job file {}", path.display()))?;
    if config.input.is_relative() {
        if let Some(dir) = path.parent() {
            config.input = dir.join(&config.input);
        }
    }
    Ok(config)
}

/// Parse and check a job configuration.
pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    config.solver_config().validate()?;
    config.strategy()?;
    Ok(config)
}
