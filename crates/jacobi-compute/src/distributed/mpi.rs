//! MPI transport for running one unit per process.
//!
//! Launch with `mpirun -n P jacobi-cli mpi system.txt`; rank 0 reads the
//! system and every rank calls [`run_unit`](super::run_unit) with an
//! [`MpiCommunicator`].

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::Communicator as _;
use mpi::traits::*;
use mpi::Count;

use super::comm::{displacements, Communicator, ReduceOp, ROOT};
use crate::backend::ComputeError;

/// World communicator of an initialised MPI environment.
///
/// MPI is finalised when this value is dropped.
pub struct MpiCommunicator {
    world: SimpleCommunicator,
    _universe: Universe,
}

impl MpiCommunicator {
    /// Initialise MPI. Fails if it was already initialised in this process.
    pub fn initialize() -> Result<Self, ComputeError> {
        let universe = mpi::initialize()
            .ok_or_else(|| ComputeError::Unavailable("MPI is already initialised".into()))?;
        let world = universe.world();
        Ok(Self {
            world,
            _universe: universe,
        })
    }

    /// Terminate every process of the job.
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }

    fn counts_and_displacements(
        &self,
        counts: &[usize],
    ) -> Result<(Vec<Count>, Vec<Count>), ComputeError> {
        if counts.len() != self.size() {
            return Err(ComputeError::ProtocolMismatch {
                rank: self.rank(),
                message: format!("{} counts for a group of {}", counts.len(), self.size()),
            });
        }
        let convert = |values: Vec<usize>| -> Result<Vec<Count>, ComputeError> {
            values
                .into_iter()
                .map(|v| {
                    Count::try_from(v).map_err(|_| ComputeError::ProtocolMismatch {
                        rank: self.rank(),
                        message: format!("segment of {} elements exceeds the MPI count range", v),
                    })
                })
                .collect()
        };
        Ok((convert(counts.to_vec())?, convert(displacements(counts))?))
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn broadcast_u64(&self, buf: &mut [u64]) -> Result<(), ComputeError> {
        self.world.process_at_rank(ROOT as i32).broadcast_into(buf);
        Ok(())
    }

    fn broadcast_f64(&self, buf: &mut [f64]) -> Result<(), ComputeError> {
        self.world.process_at_rank(ROOT as i32).broadcast_into(buf);
        Ok(())
    }

    fn scatter_f64(
        &self,
        send: Option<&[f64]>,
        counts: &[usize],
        recv: &mut [f64],
    ) -> Result<(), ComputeError> {
        let (counts, displs) = self.counts_and_displacements(counts)?;
        let root = self.world.process_at_rank(ROOT as i32);
        if self.is_root() {
            let send = send.ok_or_else(|| ComputeError::ProtocolMismatch {
                rank: ROOT,
                message: "root must supply the scatter source".into(),
            })?;
            let partition = Partition::new(send, counts, displs);
            root.scatter_varcount_into_root(&partition, recv);
        } else {
            root.scatter_varcount_into(recv);
        }
        Ok(())
    }

    fn gather_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        recv: Option<&mut [f64]>,
    ) -> Result<(), ComputeError> {
        let (counts, displs) = self.counts_and_displacements(counts)?;
        let root = self.world.process_at_rank(ROOT as i32);
        if self.is_root() {
            let recv = recv.ok_or_else(|| ComputeError::ProtocolMismatch {
                rank: ROOT,
                message: "root must supply the gather destination".into(),
            })?;
            let mut partition = PartitionMut::new(recv, counts, displs);
            root.gather_varcount_into_root(send, &mut partition);
        } else {
            root.gather_varcount_into(send);
        }
        Ok(())
    }

    fn all_reduce_f64(&self, local: f64, op: ReduceOp) -> Result<f64, ComputeError> {
        let mut global = 0.0_f64;
        let op = match op {
            ReduceOp::Sum => SystemOperation::sum(),
            ReduceOp::Max => SystemOperation::max(),
        };
        self.world.all_reduce_into(&local, &mut global, op);
        Ok(global)
    }

    fn all_gather_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        recv: &mut [f64],
    ) -> Result<(), ComputeError> {
        let (counts, displs) = self.counts_and_displacements(counts)?;
        let mut partition = PartitionMut::new(recv, counts, displs);
        self.world.all_gather_varcount_into(send, &mut partition);
        Ok(())
    }
}
