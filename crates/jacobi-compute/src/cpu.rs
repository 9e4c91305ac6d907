//! Shared-memory executor using a Rayon pool.
//!
//! Each sweep hands one row block per worker to the pool. All workers read the
//! same `prev` buffer and write disjoint slices of the same `next` buffer,
//! which [`split_rows_mut`] carves out up front, so the update phase needs no
//! locks. Collecting the per-worker errors only returns once every worker has
//! finished writing; that join is the barrier between the update phase and the
//! error reduction, and the buffer swap happens after it.

use jacobi_core::kernel::sweep_block;
use jacobi_core::partition::{partition, split_rows_mut};
use jacobi_core::solver::prepare;
use jacobi_core::state::IterationState;
use jacobi_core::{JacobiExecutor, LinearSystem, SolveResult, SolverConfig, SolverError};
use log::debug;
use rayon::prelude::*;

use crate::backend::{default_parallelism, ComputeError};

/// CPU executor that parallelises sweeps across a fixed number of threads.
#[derive(Debug, Clone, Copy)]
pub struct SharedMemoryExecutor {
    num_threads: usize,
}

impl SharedMemoryExecutor {
    /// Create an executor using the host's available parallelism.
    pub fn new() -> Self {
        Self {
            num_threads: default_parallelism(),
        }
    }

    /// Create an executor with a specified thread count.
    ///
    /// A count of zero is rejected with `InvalidPartition` when solving.
    pub fn with_threads(num_threads: usize) -> Self {
        Self { num_threads }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl Default for SharedMemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl JacobiExecutor for SharedMemoryExecutor {
    fn solve_from(
        &self,
        system: &LinearSystem,
        initial: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolverError> {
        let blocks = partition(system.dim(), self.num_threads)?;
        let diagonal = prepare(system, initial, config)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("jacobi-worker-{}", i))
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;

        debug!(
            "shared-memory solve: N={}, threads={}, norm={}",
            system.dim(),
            self.num_threads,
            config.norm
        );

        let norm = config.norm;
        let state = IterationState::new(initial.to_vec(), diagonal);

        pool.install(|| {
            state.run(config, |sweep| {
                let diagonal = sweep.diagonal;
                let prev = sweep.prev;
                let outputs = split_rows_mut(sweep.next, &blocks, 1);

                let contributions: Vec<f64> = blocks
                    .par_iter()
                    .zip(outputs.into_par_iter())
                    .map(|(block, out)| {
                        let rows = block.range();
                        sweep_block(
                            system.row_block(block.start, block.count),
                            &system.rhs()[rows.clone()],
                            &diagonal[rows.clone()],
                            block.start,
                            prev,
                            out,
                        );
                        norm.local_error(out, &prev[rows])
                    })
                    .collect();

                Ok(norm.combine(contributions))
            })
        })
    }

    fn method_name(&self) -> &str {
        "shared-memory"
    }
}
