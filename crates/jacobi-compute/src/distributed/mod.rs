//! Distributed-memory executor.
//!
//! The solve follows a root-coordinated collective protocol:
//!
//! 1. The root validates the system and broadcasts a header carrying `N`, the
//!    solver configuration and a status code. A rejected system is reported
//!    through the header, so every unit fails together instead of some units
//!    waiting on collectives the root will never issue.
//! 2. Every unit derives the same row partition and receives its block of
//!    `A` and `b` through two scatters.
//! 3. The root broadcasts the start vector; every unit holds a full-length
//!    `x` because each row's dot product needs all of it.
//! 4. Each sweep a unit updates only its rows, the blocks are all-gathered
//!    into the next global `x`, and the per-unit errors are all-reduced
//!    (sum for L1, max for L∞). All units see the same reduced value and
//!    therefore leave the loop on the same sweep.
//!
//! The protocol is written against the [`Communicator`] trait. The
//! [`DistributedExecutor`] runs it on in-process units joined by channels; with
//! the `mpi` feature the same [`run_unit`] runs across MPI processes.

pub mod comm;
pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

use std::thread;

use jacobi_core::kernel::sweep_block;
use jacobi_core::partition::{counts, partition};
use jacobi_core::solver::prepare;
use jacobi_core::state::IterationState;
use jacobi_core::{
    ConvergenceNorm, JacobiExecutor, LinearSystem, SolveResult, SolverConfig, SolverError,
};
use log::{debug, error};

use crate::backend::ComputeError;
pub use comm::{Communicator, ReduceOp, ROOT};
pub use local::LocalCommunicator;

/// What only the root holds at the start of a solve.
#[derive(Debug, Clone, Copy)]
pub struct RootInput<'a> {
    pub system: &'a LinearSystem,
    pub initial: &'a [f64],
}

const STATUS_OK: u64 = 0;
const STATUS_SINGULAR_PIVOT: u64 = 1;
const STATUS_DIMENSION_MISMATCH: u64 = 2;
const STATUS_REJECTED: u64 = 3;

const HEADER_LEN: usize = 8;

/// Solve parameters as broadcast by the root.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Header {
    status: u64,
    dim: usize,
    tolerance: f64,
    max_iterations: usize,
    norm: ConvergenceNorm,
    record_history: bool,
    detail: u64,
    value: f64,
}

impl Header {
    fn accepted(dim: usize, config: &SolverConfig) -> Self {
        Self {
            status: STATUS_OK,
            dim,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            norm: config.norm,
            record_history: config.record_history,
            detail: 0,
            value: 0.0,
        }
    }

    fn rejected(err: &SolverError) -> Self {
        let mut header = Self::accepted(0, &SolverConfig::default());
        match err {
            SolverError::SingularPivot { row, value } => {
                header.status = STATUS_SINGULAR_PIVOT;
                header.detail = *row as u64;
                header.value = *value;
            }
            SolverError::DimensionMismatch { expected, found } => {
                header.status = STATUS_DIMENSION_MISMATCH;
                header.dim = *expected;
                header.detail = *found as u64;
            }
            _ => header.status = STATUS_REJECTED,
        }
        header
    }

    fn encode(&self) -> [u64; HEADER_LEN] {
        [
            self.status,
            self.dim as u64,
            self.tolerance.to_bits(),
            self.max_iterations as u64,
            match self.norm {
                ConvergenceNorm::L1 => 1,
                ConvergenceNorm::LInf => 0,
            },
            u64::from(self.record_history),
            self.detail,
            self.value.to_bits(),
        ]
    }

    fn decode(words: &[u64; HEADER_LEN]) -> Self {
        Self {
            status: words[0],
            dim: words[1] as usize,
            tolerance: f64::from_bits(words[2]),
            max_iterations: words[3] as usize,
            norm: if words[4] == 1 {
                ConvergenceNorm::L1
            } else {
                ConvergenceNorm::LInf
            },
            record_history: words[5] != 0,
            detail: words[6],
            value: f64::from_bits(words[7]),
        }
    }

    /// The error a non-root unit reports for a rejected header.
    fn to_error(self) -> Option<SolverError> {
        match self.status {
            STATUS_OK => None,
            STATUS_SINGULAR_PIVOT => Some(SolverError::SingularPivot {
                row: self.detail as usize,
                value: self.value,
            }),
            STATUS_DIMENSION_MISMATCH => Some(SolverError::DimensionMismatch {
                expected: self.dim,
                found: self.detail as usize,
            }),
            _ => Some(SolverError::InvalidConfig("rejected by the root unit".into())),
        }
    }

    fn config(&self) -> SolverConfig {
        SolverConfig {
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            norm: self.norm,
            record_history: self.record_history,
        }
    }
}

fn reduce_op(norm: ConvergenceNorm) -> ReduceOp {
    match norm {
        ConvergenceNorm::L1 => ReduceOp::Sum,
        ConvergenceNorm::LInf => ReduceOp::Max,
    }
}

/// Run one unit's share of a distributed solve.
///
/// The root passes `Some(input)` and receives `Some(result)`; every other unit
/// passes `None`, takes its configuration from the root's header, and returns
/// `None` once the group has terminated. All units must call this together.
pub fn run_unit<C>(
    comm: &C,
    input: Option<RootInput<'_>>,
    config: &SolverConfig,
) -> Result<Option<SolveResult>, SolverError>
where
    C: Communicator + ?Sized,
{
    let rank = comm.rank();
    let is_root = comm.is_root();
    if is_root != input.is_some() {
        return Err(ComputeError::ProtocolMismatch {
            rank,
            message: "exactly the root unit must hold the system".into(),
        }
        .into());
    }

    // 1. header
    let mut root_failure = None;
    let header = match input {
        Some(root) => match prepare(root.system, root.initial, config) {
            Ok(_) => Header::accepted(root.system.dim(), config),
            Err(err) => {
                let header = Header::rejected(&err);
                root_failure = Some(err);
                header
            }
        },
        None => Header::accepted(0, config),
    };
    let mut words = header.encode();
    comm.broadcast_u64(&mut words)?;
    let header = Header::decode(&words);

    if let Some(err) = root_failure {
        return Err(err);
    }
    if let Some(err) = header.to_error() {
        return Err(err);
    }

    let n = header.dim;
    let config = header.config();

    // 2. row blocks
    let blocks = partition(n, comm.size())?;
    let mine = blocks[rank];
    let row_counts = counts(&blocks);
    let entry_counts: Vec<usize> = row_counts.iter().map(|c| c * n).collect();

    let mut local_matrix = vec![0.0; mine.count * n];
    let mut local_rhs = vec![0.0; mine.count];
    comm.scatter_f64(
        input.map(|root| root.system.matrix()),
        &entry_counts,
        &mut local_matrix,
    )?;
    comm.scatter_f64(input.map(|root| root.system.rhs()), &row_counts, &mut local_rhs)?;

    let local_diagonal: Vec<f64> = (0..mine.count)
        .map(|li| local_matrix[li * n + mine.start + li])
        .collect();

    // 3. start vector
    let mut x = match input {
        Some(root) => root.initial.to_vec(),
        None => vec![0.0; n],
    };
    comm.broadcast_f64(&mut x)?;

    debug!(
        "unit {}/{}: rows {}..{} of {}",
        rank,
        comm.size(),
        mine.start,
        mine.end(),
        n
    );

    // 4. sweeps
    let op = reduce_op(config.norm);
    let norm = config.norm;
    let mut local_next = vec![0.0; mine.count];

    let result = IterationState::new(x, local_diagonal).run(&config, |sweep| {
        sweep_block(
            &local_matrix,
            &local_rhs,
            sweep.diagonal,
            mine.start,
            sweep.prev,
            &mut local_next,
        );
        let local_error = norm.local_error(&local_next, &sweep.prev[mine.range()]);

        comm.all_gather_f64(&local_next, &row_counts, sweep.next)?;
        Ok(comm.all_reduce_f64(local_error, op)?)
    })?;

    Ok(is_root.then_some(result))
}

/// Executor running every unit on its own thread in this process.
#[derive(Debug, Clone, Copy)]
pub struct DistributedExecutor {
    units: usize,
}

impl DistributedExecutor {
    pub fn new(units: usize) -> Self {
        Self { units }
    }

    pub fn units(&self) -> usize {
        self.units
    }
}

impl JacobiExecutor for DistributedExecutor {
    fn solve_from(
        &self,
        system: &LinearSystem,
        initial: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolverError> {
        // fail before spawning anything
        partition(system.dim(), self.units)?;

        let root_input = RootInput { system, initial };
        let outcomes = run_group(self.units, |comm| {
            let input = comm.is_root().then_some(root_input);
            run_unit(comm, input, config)
        });

        collect_root_result(outcomes)
    }

    fn method_name(&self) -> &str {
        "distributed"
    }
}

type UnitOutcome = Result<Option<SolveResult>, SolverError>;

/// Run `body` once per unit of a `units`-unit in-process group, each on its
/// own named thread, and collect the outcomes in rank order.
///
/// A unit that panics is reported as [`ComputeError::UnitPanicked`]; its
/// dropped endpoint makes its peers fail with a disconnection.
fn run_group<F>(units: usize, body: F) -> Vec<UnitOutcome>
where
    F: Fn(&LocalCommunicator) -> UnitOutcome + Sync,
{
    thread::scope(|scope| {
        let body = &body;
        let handles: Vec<_> = LocalCommunicator::group(units)
            .into_iter()
            .map(|comm| {
                let rank = comm.rank();
                let spawned = thread::Builder::new()
                    .name(format!("jacobi-unit-{}", rank))
                    .spawn_scoped(scope, move || body(&comm));
                (rank, spawned)
            })
            .collect();

        handles
            .into_iter()
            .map(|(rank, spawned)| match spawned {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(ComputeError::UnitPanicked { rank }.into())),
                Err(e) => Err(ComputeError::Unavailable(format!(
                    "could not start unit {}: {}",
                    rank, e
                ))
                .into()),
            })
            .collect()
    })
}

/// Pick the root's result, or the most informative failure.
///
/// When one unit fails its peers only observe a disconnection, so a
/// non-backend error from any unit is preferred over the root's.
fn collect_root_result(outcomes: Vec<UnitOutcome>) -> Result<SolveResult, SolverError> {
    let mut root_result = None;
    let mut first_backend = None;
    let mut first_other = None;

    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(Some(result)) => root_result = Some(result),
            Ok(None) => {}
            Err(err) => {
                error!("unit {} failed: {}", rank, err);
                match err {
                    SolverError::Backend(_) => {
                        first_backend.get_or_insert(err);
                    }
                    _ => {
                        first_other.get_or_insert(err);
                    }
                }
            }
        }
    }

    if let Some(err) = first_other.or(first_backend) {
        return Err(err);
    }
    root_result.ok_or_else(|| {
        ComputeError::ProtocolMismatch {
            rank: ROOT,
            message: "root finished without a result".into(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacobi_core::SerialExecutor;

    fn sample_system() -> LinearSystem {
        LinearSystem::new(
            3,
            vec![10.0, 1.0, 1.0, 1.0, 10.0, 1.0, 1.0, 1.0, 10.0],
            vec![12.0, 12.0, 12.0],
        )
        .unwrap()
    }

    #[test]
    fn test_header_round_trip() {
        let config = SolverConfig::new(3.5e-7, 1234)
            .with_norm(ConvergenceNorm::L1)
            .with_history();
        let header = Header::accepted(17, &config);
        let decoded = Header::decode(&header.encode());
        assert_eq!(decoded, header);
        assert_eq!(decoded.config(), config);
    }

    #[test]
    fn test_rejected_header_reproduces_pivot_error() {
        let err = SolverError::SingularPivot { row: 4, value: 0.0 };
        let header = Header::decode(&Header::rejected(&err).encode());
        assert!(matches!(
            header.to_error(),
            Some(SolverError::SingularPivot { row: 4, .. })
        ));
    }

    #[test]
    fn test_matches_serial_for_each_unit_count() {
        let system = sample_system();
        let config = SolverConfig::default();
        let serial = SerialExecutor.solve(&system, &config).unwrap();
        for units in 1..=5 {
            let result = DistributedExecutor::new(units).solve(&system, &config).unwrap();
            assert_eq!(result.x, serial.x, "{} units", units);
            assert_eq!(result.iterations, serial.iterations);
        }
    }

    #[test]
    fn test_every_unit_reports_singular_pivot() {
        let system = LinearSystem::new(2, vec![0.0, 1.0, 1.0, 3.0], vec![1.0, 1.0]).unwrap();
        let config = SolverConfig::default();

        let outcomes = run_group(3, |comm| {
            let input = comm.is_root().then_some(RootInput {
                system: &system,
                initial: &[0.0, 0.0],
            });
            run_unit(comm, input, &config)
        });

        for outcome in outcomes {
            assert!(matches!(
                outcome,
                Err(SolverError::SingularPivot { row: 0, .. })
            ));
        }
    }

    #[test]
    fn test_zero_units_is_invalid_partition() {
        let err = DistributedExecutor::new(0)
            .solve(&sample_system(), &SolverConfig::default())
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidPartition { rows: 3, units: 0 }));
    }

    fn is_backend(outcome: &UnitOutcome) -> bool {
        matches!(outcome, Err(SolverError::Backend(_)))
    }

    #[test]
    fn test_unit_leaving_after_header_fails_its_peers() {
        let system = sample_system();
        let config = SolverConfig::default();
        let outcomes = run_group(3, |comm| {
            if comm.rank() == 2 {
                // take part in the header only, then leave
                let mut header = [0_u64; HEADER_LEN];
                comm.broadcast_u64(&mut header)?;
                return Ok(None);
            }
            let input = comm.is_root().then_some(RootInput {
                system: &system,
                initial: &[0.0; 3],
            });
            run_unit(comm, input, &config)
        });

        assert_eq!(outcomes.len(), 3);
        assert!(is_backend(&outcomes[0]), "{:?}", outcomes[0]);
        assert!(is_backend(&outcomes[1]), "{:?}", outcomes[1]);
        assert!(matches!(outcomes[2], Ok(None)));
        assert!(matches!(
            collect_root_result(outcomes),
            Err(SolverError::Backend(_))
        ));
    }

    #[test]
    fn test_panicking_unit_is_reported() {
        let system = sample_system();
        let config = SolverConfig::default();
        let outcomes = run_group(2, |comm| {
            if comm.rank() == 1 {
                panic!("unit lost");
            }
            run_unit(
                comm,
                Some(RootInput {
                    system: &system,
                    initial: &[0.0; 3],
                }),
                &config,
            )
        });

        match &outcomes[1] {
            Err(SolverError::Backend(msg)) => assert!(msg.contains("Unit 1 panicked"), "{}", msg),
            other => panic!("expected a panicked unit, got {:?}", other),
        }
        match &outcomes[0] {
            Err(SolverError::Backend(msg)) => assert!(msg.contains("disconnected"), "{}", msg),
            other => panic!("expected a disconnection, got {:?}", other),
        }
    }

    #[test]
    fn test_specific_failure_wins_over_backend_errors() {
        let outcomes = vec![
            Err(SolverError::Backend("unit 0 disconnected".into())),
            Err(SolverError::SingularPivot { row: 5, value: 0.0 }),
            Ok(None),
        ];
        assert!(matches!(
            collect_root_result(outcomes),
            Err(SolverError::SingularPivot { row: 5, .. })
        ));
    }

    #[test]
    fn test_failure_wins_over_root_result() {
        let result = SerialExecutor
            .solve(&sample_system(), &SolverConfig::default())
            .unwrap();
        let outcomes = vec![
            Ok(Some(result)),
            Err(SolverError::Backend("unit 1 panicked".into())),
        ];
        assert!(matches!(
            collect_root_result(outcomes),
            Err(SolverError::Backend(_))
        ));
    }

    #[test]
    fn test_missing_root_result_is_a_protocol_error() {
        for outcomes in [vec![], vec![Ok(None), Ok(None)]] {
            match collect_root_result(outcomes) {
                Err(SolverError::Backend(msg)) => assert!(msg.contains("without a result")),
                other => panic!("expected a protocol error, got {:?}", other),
            }
        }
    }
}
