//! Executor abstraction and the solver error type.
//!
//! The [`JacobiExecutor`] trait is the contract every execution strategy
//! implements: same start vector, same kernel, same convergence rule. Callers
//! (the CLI, benchmarks, tests) hold executors as trait objects and never see
//! how the sweeps are scheduled.

pub mod serial;

use thiserror::Error;

use crate::kernel::extract_diagonal;
use crate::types::{LinearSystem, SolveResult, SolverConfig};

/// Errors that can occur while loading or solving a system.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Malformed input at line {line}: {message}")]
    MalformedInput { line: usize, message: String },

    #[error("Singular pivot at row {row}: |A[{row}][{row}]| = {value:e} is too small")]
    SingularPivot { row: usize, value: f64 },

    #[error("Cannot partition {rows} rows across {units} units")]
    InvalidPartition { rows: usize, units: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Execution backend error: {0}")]
    Backend(String),
}

/// A strategy for running Jacobi sweeps to termination.
pub trait JacobiExecutor: Send + Sync {
    /// Solve starting from `initial`.
    ///
    /// Implementations must reject a singular pivot before the first sweep and
    /// must report hitting the sweep cap through
    /// [`SolveResult::converged`](crate::types::SolveResult) rather than as an
    /// error.
    fn solve_from(
        &self,
        system: &LinearSystem,
        initial: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolverError>;

    /// Solve starting from the zero vector.
    fn solve(&self, system: &LinearSystem, config: &SolverConfig) -> Result<SolveResult, SolverError> {
        let zeros = vec![0.0; system.dim()];
        self.solve_from(system, &zeros, config)
    }

    /// Human-readable name of the strategy.
    fn method_name(&self) -> &str;
}

/// Checks every executor runs before allocating iteration buffers.
///
/// Returns the cached diagonal of `system`.
pub fn prepare(
    system: &LinearSystem,
    initial: &[f64],
    config: &SolverConfig,
) -> Result<Vec<f64>, SolverError> {
    config.validate()?;
    if initial.len() != system.dim() {
        return Err(SolverError::DimensionMismatch {
            expected: system.dim(),
            found: initial.len(),
        });
    }
    extract_diagonal(system)
}
