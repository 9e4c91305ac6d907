//! Single-threaded reference executor.
//!
//! One sweep updates every row in order from the previous iterate. The
//! parallel executors perform the same per-row arithmetic and are checked
//! against this one.

use log::debug;

use super::{prepare, JacobiExecutor, SolverError};
use crate::kernel::sweep_block;
use crate::state::IterationState;
use crate::types::{LinearSystem, SolveResult, SolverConfig};

/// Serial Jacobi solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl SerialExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl JacobiExecutor for SerialExecutor {
    fn solve_from(
        &self,
        system: &LinearSystem,
        initial: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolverError> {
        let diagonal = prepare(system, initial, config)?;
        debug!("serial solve: N={}, norm={}", system.dim(), config.norm);

        let norm = config.norm;
        IterationState::new(initial.to_vec(), diagonal).run(config, |sweep| {
            sweep_block(
                system.matrix(),
                system.rhs(),
                sweep.diagonal,
                0,
                sweep.prev,
                sweep.next,
            );
            Ok(norm.local_error(sweep.next, sweep.prev))
        })
    }

    fn method_name(&self) -> &str {
        "serial"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Termination;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_three_by_three_converges_to_ones() {
        let system = LinearSystem::from_arrays(
            array![[10.0, 1.0, 1.0], [1.0, 10.0, 1.0], [1.0, 1.0, 10.0]],
            array![12.0, 12.0, 12.0],
        )
        .unwrap();
        let result = SerialExecutor.solve(&system, &SolverConfig::default()).unwrap();
        assert!(result.converged);
        for xi in &result.x {
            assert_abs_diff_eq!(*xi, 1.0, epsilon = 1e-5);
        }
        assert!(result.iterations < 50);
    }

    #[test]
    fn test_non_dominant_system_stops_at_cap() {
        // spectral radius of the iteration matrix is 2, so the iterates diverge
        let system = LinearSystem::from_arrays(array![[1.0, 2.0], [2.0, 1.0]], array![1.0, 1.0])
            .unwrap();
        let result = SerialExecutor
            .solve(&system, &SolverConfig::new(1e-8, 25))
            .unwrap();
        assert_eq!(result.iterations, 25);
        assert_eq!(result.termination, Termination::MaxIterationsReached);
        assert!(!result.converged);
    }

    #[test]
    fn test_initial_guess_length_is_checked() {
        let system = LinearSystem::from_arrays(array![[2.0]], array![1.0]).unwrap();
        assert!(matches!(
            SerialExecutor.solve_from(&system, &[0.0, 0.0], &SolverConfig::default()),
            Err(SolverError::DimensionMismatch { expected: 1, found: 2 })
        ));
    }
}
