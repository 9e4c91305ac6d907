//! Execution strategy selection and backend errors.
//!
//! The [`ExecutionStrategy`] enum names the ways a Jacobi solve can be
//! scheduled; [`create_executor`] turns one into a boxed
//! [`JacobiExecutor`] so that callers stay strategy-agnostic.

use std::fmt;
use std::num::NonZeroUsize;

use jacobi_core::{JacobiExecutor, LinearSystem, SerialExecutor, SolveResult, SolverConfig, SolverError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors originating from execution backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Unit {rank} disconnected before completing a collective")]
    Disconnected { rank: usize },

    #[error("Collective mismatch with unit {rank}: {message}")]
    ProtocolMismatch { rank: usize, message: String },

    #[error("Unit {rank} panicked")]
    UnitPanicked { rank: usize },
}

impl From<ComputeError> for SolverError {
    fn from(err: ComputeError) -> Self {
        SolverError::Backend(err.to_string())
    }
}

/// How the sweeps of one solve are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One thread, rows in order.
    Serial,
    /// A pool of worker threads over shared buffers. `None` uses the host's
    /// available parallelism.
    SharedMemory { threads: Option<usize> },
    /// Independent units exchanging data only through collectives.
    Distributed { units: usize },
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::SharedMemory { threads: None }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Serial => write!(f, "serial"),
            ExecutionStrategy::SharedMemory { threads: Some(t) } => {
                write!(f, "shared-memory ({} threads)", t)
            }
            ExecutionStrategy::SharedMemory { threads: None } => {
                write!(f, "shared-memory ({} threads)", default_parallelism())
            }
            ExecutionStrategy::Distributed { units } => write!(f, "distributed ({} units)", units),
        }
    }
}

/// Hardware concurrency of the host, at least 1.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Build the executor for `strategy`.
pub fn create_executor(strategy: ExecutionStrategy) -> Result<Box<dyn JacobiExecutor>, ComputeError> {
    match strategy {
        ExecutionStrategy::Serial => Ok(Box::new(SerialExecutor::new())),
        ExecutionStrategy::SharedMemory { threads } => {
            #[cfg(feature = "cpu")]
            {
                let threads = threads.unwrap_or_else(default_parallelism);
                Ok(Box::new(crate::cpu::SharedMemoryExecutor::with_threads(threads)))
            }
            #[cfg(not(feature = "cpu"))]
            {
                let _ = threads;
                Err(ComputeError::Unavailable(
                    "shared-memory executor requires the `cpu` feature".into(),
                ))
            }
        }
        ExecutionStrategy::Distributed { units } => {
            #[cfg(feature = "distributed")]
            {
                Ok(Box::new(crate::distributed::DistributedExecutor::new(units)))
            }
            #[cfg(not(feature = "distributed"))]
            {
                let _ = units;
                Err(ComputeError::Unavailable(
                    "distributed executor requires the `distributed` feature".into(),
                ))
            }
        }
    }
}

/// Solve `system` from the zero vector with the chosen strategy.
pub fn solve(
    system: &LinearSystem,
    config: &SolverConfig,
    strategy: ExecutionStrategy,
) -> Result<SolveResult, SolverError> {
    create_executor(strategy)?.solve(system, config)
}
