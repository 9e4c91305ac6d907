//! Double-buffered iteration state and the shared iteration loop.
//!
//! A solve owns two full-length vectors. During a sweep `prev` is read-only
//! and `next` is written; afterwards the two swap roles by exchanging the
//! vectors' heap pointers, so no sweep allocates. The loop itself
//! ([`IterationState::run`]) is the same for every executor: only the sweep
//! closure differs, which is where threads or collectives come in.

use log::{debug, trace, warn};

use crate::convergence::has_converged;
use crate::solver::SolverError;
use crate::types::{SolveResult, SolverConfig, Termination};

/// Borrowed view handed to the sweep closure for one iteration.
pub struct Sweep<'a> {
    /// Cached diagonal of the rows this state iterates over.
    pub diagonal: &'a [f64],
    /// Previous iterate (global `x`).
    pub prev: &'a [f64],
    /// Destination for the new iterate (global `x`).
    pub next: &'a mut [f64],
    /// Zero-based index of the sweep being performed.
    pub iteration: usize,
}

/// Buffers and counters owned by one solve.
#[derive(Debug)]
pub struct IterationState {
    current: Vec<f64>,
    next: Vec<f64>,
    diagonal: Vec<f64>,
    iterations: usize,
}

impl IterationState {
    /// Start from `initial`; `diagonal` holds the pivots of the rows the
    /// caller will update (all rows, or only a unit's block).
    pub fn new(initial: Vec<f64>, diagonal: Vec<f64>) -> Self {
        let next = vec![0.0; initial.len()];
        Self {
            current: initial,
            next,
            diagonal,
            iterations: 0,
        }
    }

    /// The most recent iterate.
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    /// Iterate until the error returned by `sweep` meets the tolerance or the
    /// sweep cap is reached.
    ///
    /// `sweep` must fill `next` completely and return the global error of the
    /// change from `prev`. Every participant of a distributed solve receives
    /// the same error, so every participant leaves the loop on the same sweep.
    pub fn run<F>(mut self, config: &SolverConfig, mut sweep: F) -> Result<SolveResult, SolverError>
    where
        F: FnMut(Sweep<'_>) -> Result<f64, SolverError>,
    {
        let mut history = Vec::new();
        let mut error;

        let termination = loop {
            error = sweep(Sweep {
                diagonal: &self.diagonal,
                prev: &self.current,
                next: &mut self.next,
                iteration: self.iterations,
            })?;
            self.swap();
            self.iterations += 1;

            if config.record_history {
                history.push(error);
            }
            trace!("sweep {}: error = {:.6e}", self.iterations, error);

            if has_converged(error, config.tolerance) {
                break Termination::Converged;
            }
            if self.iterations >= config.max_iterations {
                break Termination::MaxIterationsReached;
            }
        };

        match termination {
            Termination::Converged => debug!(
                "converged after {} sweeps (error {:.3e} <= {:.3e})",
                self.iterations, error, config.tolerance
            ),
            Termination::MaxIterationsReached => warn!(
                "stopped at the {}-sweep cap with error {:.3e} > {:.3e}",
                self.iterations, error, config.tolerance
            ),
        }

        Ok(SolveResult::new(
            self.current,
            self.iterations,
            error,
            termination,
            history,
        ))
    }
}
