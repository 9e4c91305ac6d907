//! Contiguous row-block partitioning.
//!
//! `N` rows are split across `P` execution units as `N / P` rows each, with the
//! `N % P` remainder rows handed one apiece to the lowest-indexed units. Blocks
//! are laid out in unit order, so unit `u` owns a single contiguous range and
//! the concatenation of all blocks is exactly `0..N`.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::solver::SolverError;

/// The rows owned by one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowAssignment {
    /// Index of the owning unit (thread or rank).
    pub unit: usize,
    /// First global row of the block.
    pub start: usize,
    /// Number of rows in the block; zero when there are more units than rows.
    pub count: usize,
}

impl RowAssignment {
    /// One past the last global row.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Global rows covered by this block.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Assign `rows` rows to `units` units.
///
/// Fails with [`SolverError::InvalidPartition`] when either argument is zero.
pub fn partition(rows: usize, units: usize) -> Result<Vec<RowAssignment>, SolverError> {
    if rows == 0 || units == 0 {
        return Err(SolverError::InvalidPartition { rows, units });
    }

    let base = rows / units;
    let remainder = rows % units;

    let mut start = 0;
    let assignments = (0..units)
        .map(|unit| {
            let count = base + usize::from(unit < remainder);
            let block = RowAssignment { unit, start, count };
            start += count;
            block
        })
        .collect();

    Ok(assignments)
}

/// Row count per unit, in unit order.
pub fn counts(assignments: &[RowAssignment]) -> Vec<usize> {
    assignments.iter().map(|a| a.count).collect()
}

/// Split a row-indexed buffer into one disjoint mutable slice per assignment.
///
/// `width` is the number of elements per row (1 for vectors, `N` for matrix
/// blocks). The assignments must be contiguous and start at row zero, as
/// produced by [`partition`].
pub fn split_rows_mut<'a, T>(
    mut buffer: &'a mut [T],
    assignments: &[RowAssignment],
    width: usize,
) -> Vec<&'a mut [T]> {
    let mut blocks = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let (head, tail) = std::mem::take(&mut buffer).split_at_mut(assignment.count * width);
        blocks.push(head);
        buffer = tail;
    }
    blocks
}
