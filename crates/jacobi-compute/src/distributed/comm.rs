//! Collective communication abstraction.
//!
//! Units of a distributed solve share no memory; everything they exchange
//! goes through the blocking collectives below. Every unit must issue the
//! same collectives in the same order. A unit that stops participating makes
//! the others fail with [`ComputeError::Disconnected`] (in-process transport)
//! or abort through the MPI runtime, never a silent partial result.

use crate::backend::ComputeError;

/// Rank that owns the full system and assembles the global vector.
pub const ROOT: usize = 0;

/// Reduction operator for [`Communicator::all_reduce_f64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
}

impl ReduceOp {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Max => a.max(b),
        }
    }
}

/// Blocking collectives over a fixed group of units.
///
/// Variable-count operations take `counts`, the number of elements each rank
/// contributes or receives, in rank order; displacements are implied by the
/// running sum, matching a contiguous row partition.
pub trait Communicator {
    /// This unit's rank.
    fn rank(&self) -> usize;

    /// Number of units in the group.
    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Replace `buf` on every unit with the root's contents.
    fn broadcast_u64(&self, buf: &mut [u64]) -> Result<(), ComputeError>;

    /// Replace `buf` on every unit with the root's contents.
    fn broadcast_f64(&self, buf: &mut [f64]) -> Result<(), ComputeError>;

    /// Deliver `counts[r]` consecutive elements of the root's `send` to rank
    /// `r`'s `recv`. `send` is only read on the root.
    fn scatter_f64(
        &self,
        send: Option<&[f64]>,
        counts: &[usize],
        recv: &mut [f64],
    ) -> Result<(), ComputeError>;

    /// Concatenate every rank's `send` into the root's `recv`, in rank order.
    /// `recv` is only written on the root.
    fn gather_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        recv: Option<&mut [f64]>,
    ) -> Result<(), ComputeError>;

    /// Combine one scalar per unit; every unit receives the same result.
    fn all_reduce_f64(&self, local: f64, op: ReduceOp) -> Result<f64, ComputeError>;

    /// Concatenate every rank's `send` into `recv` on every unit.
    ///
    /// The default is a gather to the root followed by a broadcast.
    fn all_gather_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        recv: &mut [f64],
    ) -> Result<(), ComputeError> {
        if self.is_root() {
            self.gather_f64(send, counts, Some(&mut *recv))?;
        } else {
            self.gather_f64(send, counts, None)?;
        }
        self.broadcast_f64(recv)
    }
}

/// Start offset of each rank's segment.
pub fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |offset, &c| {
            let start = *offset;
            *offset += c;
            Some(start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_displacements_are_prefix_sums() {
        assert_eq!(displacements(&[3, 3, 2, 0, 2]), vec![0, 3, 6, 8, 8]);
        assert!(displacements(&[]).is_empty());
    }

    #[test]
    fn test_reduce_ops() {
        assert_eq!(ReduceOp::Sum.apply(1.5, 2.0), 3.5);
        assert_eq!(ReduceOp::Max.apply(1.5, 2.0), 2.0);
    }
}
