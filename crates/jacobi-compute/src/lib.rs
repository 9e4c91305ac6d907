//! # Jacobi Compute
//!
//! Parallel execution strategies for the Jacobi solver. Each strategy
//! implements [`JacobiExecutor`](jacobi_core::JacobiExecutor) on top of the
//! kernel, partitioner and convergence evaluator in `jacobi-core`, so callers
//! pick a strategy with [`ExecutionStrategy`] and never touch threads or
//! collectives themselves.
//!
//! ## Available strategies
//!
//! | Strategy | Feature flag | Transport |
//! |----------|-------------|-----------|
//! | Serial | always | none |
//! | Shared memory (Rayon) | `cpu` (default) | shared buffers |
//! | Distributed | `distributed` (default) | in-process channels |
//! | Distributed (MPI) | `mpi` | MPI collectives, one process per unit |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "distributed")]
pub mod distributed;

pub use backend::{create_executor, default_parallelism, solve, ComputeError, ExecutionStrategy};

#[cfg(feature = "cpu")]
pub use cpu::SharedMemoryExecutor;

#[cfg(feature = "distributed")]
pub use distributed::DistributedExecutor;
