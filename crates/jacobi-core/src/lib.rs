//! # Jacobi Core
//!
//! The numerical backbone of the Jacobi workspace. This crate holds everything
//! that does not depend on how the iteration is scheduled: the dense system
//! representation, the row partitioner, the per-row update kernel, the
//! convergence evaluator and a serial reference executor.
//!
//! ## Architecture
//!
//! Every execution strategy implements the [`solver::JacobiExecutor`] trait.
//! The serial implementation lives here ([`solver::serial::SerialExecutor`]);
//! the shared-memory and distributed strategies live in `jacobi-compute` and
//! reuse [`kernel`], [`partition`] and [`convergence`] unchanged, so every
//! strategy performs bit-for-bit the same arithmetic per row.
//!
//! ## Modules
//!
//! - [`types`] — Linear system, solver configuration and solve results.
//! - [`partition`] — Contiguous row-block assignment per execution unit.
//! - [`kernel`] — Jacobi row update and pivot validation.
//! - [`convergence`] — Per-unit error contributions and their reduction.
//! - [`state`] — Double-buffered iteration state.
//! - [`io`] — Plain-text input format, writer and test-system generator.
//! - [`solver`] — Executor trait, error type and serial reference solver.

pub mod convergence;
pub mod io;
pub mod kernel;
pub mod partition;
pub mod solver;
pub mod state;
pub mod types;

pub use convergence::ConvergenceNorm;
pub use partition::{partition, RowAssignment};
pub use solver::serial::SerialExecutor;
pub use solver::{JacobiExecutor, SolverError};
pub use types::{LinearSystem, SolveResult, SolverConfig, Termination};
