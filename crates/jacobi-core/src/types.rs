//! Core types shared across the Jacobi workspace.
//!
//! This module defines the dense linear system handed to every executor, the
//! solver configuration, and the structured result an executor returns.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::convergence::ConvergenceNorm;
use crate::solver::SolverError;

/// A dense square system $\mathbf{A}\mathbf{x} = \mathbf{b}$.
///
/// The matrix is held in one contiguous row-major buffer; row `i` occupies
/// `[i * n, i * n + n)`. Rows are exposed as slices so that the kernel and the
/// distributed scatter can work on contiguous blocks without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    n: usize,
    matrix: Vec<f64>,
    rhs: Vec<f64>,
}

impl LinearSystem {
    /// Build a system from a flat row-major matrix and a right-hand side.
    pub fn new(n: usize, matrix: Vec<f64>, rhs: Vec<f64>) -> Result<Self, SolverError> {
        if n == 0 {
            return Err(SolverError::InvalidConfig(
                "system dimension must be positive".into(),
            ));
        }
        let entries = matrix_len(n)?;
        if matrix.len() != entries {
            return Err(SolverError::DimensionMismatch {
                expected: entries,
                found: matrix.len(),
            });
        }
        if rhs.len() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                found: rhs.len(),
            });
        }
        Ok(Self { n, matrix, rhs })
    }

    /// Build a system from `ndarray` containers.
    ///
    /// Any memory layout is accepted; elements are copied out in logical
    /// row-major order.
    pub fn from_arrays(matrix: Array2<f64>, rhs: Array1<f64>) -> Result<Self, SolverError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(SolverError::DimensionMismatch {
                expected: rows,
                found: cols,
            });
        }
        Self::new(rows, matrix.iter().copied().collect(), rhs.to_vec())
    }

    /// Matrix dimension `N`.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Row `i` of the matrix.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.matrix[i * self.n..(i + 1) * self.n]
    }

    /// Contiguous block of `count` rows starting at `start`.
    pub fn row_block(&self, start: usize, count: usize) -> &[f64] {
        &self.matrix[start * self.n..(start + count) * self.n]
    }

    /// Diagonal entry `A[i][i]`.
    #[inline]
    pub fn diagonal_entry(&self, i: usize) -> f64 {
        self.matrix[i * self.n + i]
    }

    /// The whole matrix as a flat row-major slice.
    pub fn matrix(&self) -> &[f64] {
        &self.matrix
    }

    /// Right-hand side `b`.
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Copy the matrix into an owned `ndarray` for diagnostics and tests.
    pub fn to_array(&self) -> Array2<f64> {
        let n = self.n;
        Array2::from_shape_fn((n, n), |(i, j)| self.matrix[i * n + j])
    }

    /// Whether every row satisfies strict diagonal dominance,
    /// $|a_{ii}| > \sum_{j \ne i} |a_{ij}|$.
    ///
    /// Dominance is only a sufficient condition for convergence; the solvers
    /// never require it.
    pub fn is_diagonally_dominant(&self) -> bool {
        (0..self.n).all(|i| {
            let row = self.row(i);
            let off: f64 = row.iter().map(|v| v.abs()).sum::<f64>() - row[i].abs();
            row[i].abs() > off
        })
    }

    /// Infinity norm of the residual, $\|\mathbf{b} - \mathbf{A}\mathbf{x}\|_\infty$.
    pub fn residual_inf_norm(&self, x: &[f64]) -> Result<f64, SolverError> {
        if x.len() != self.n {
            return Err(SolverError::DimensionMismatch {
                expected: self.n,
                found: x.len(),
            });
        }
        let x = ArrayView1::from(x);
        Ok((0..self.n)
            .map(|i| (self.rhs[i] - ArrayView1::from(self.row(i)).dot(&x)).abs())
            .fold(0.0, f64::max))
    }
}

/// Number of entries in an `n`-by-`n` matrix.
pub fn matrix_len(n: usize) -> Result<usize, SolverError> {
    n.checked_mul(n).ok_or_else(|| {
        SolverError::InvalidConfig(format!("a {0}x{0} matrix does not fit in memory", n))
    })
}

/// Iteration controls shared by every executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverConfig {
    /// Convergence threshold on the chosen norm of $x^{(k+1)} - x^{(k)}$.
    pub tolerance: f64,
    /// Hard cap on the number of sweeps.
    pub max_iterations: usize,
    /// Norm used to reduce per-row changes into one global error.
    pub norm: ConvergenceNorm,
    /// Keep the global error of every sweep in [`SolveResult::error_history`].
    #[serde(default)]
    pub record_history: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 10_000,
            norm: ConvergenceNorm::LInf,
            record_history: false,
        }
    }
}

impl SolverConfig {
    /// Config with the given tolerance and cap, default norm.
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            ..Default::default()
        }
    }

    pub fn with_norm(mut self, norm: ConvergenceNorm) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_history(mut self) -> Self {
        self.record_history = true;
        self
    }

    /// Reject configurations under which the loop is meaningless.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SolverError::InvalidConfig(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Terminal state of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The global error dropped to or below the tolerance.
    Converged,
    /// The sweep cap was reached first; `x` is the best effort.
    MaxIterationsReached,
}

/// Structured outcome of a solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResult {
    /// Final iterate.
    pub x: Vec<f64>,
    /// Number of sweeps performed.
    pub iterations: usize,
    /// Global error of the last sweep.
    pub final_error: f64,
    /// `true` only when `termination` is [`Termination::Converged`].
    pub converged: bool,
    pub termination: Termination,
    /// Global error per sweep, empty unless history recording was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_history: Vec<f64>,
}

impl SolveResult {
    pub fn new(
        x: Vec<f64>,
        iterations: usize,
        final_error: f64,
        termination: Termination,
        error_history: Vec<f64>,
    ) -> Self {
        Self {
            x,
            iterations,
            final_error,
            converged: termination == Termination::Converged,
            termination,
            error_history,
        }
    }
}
