//! The Jacobi row update.
//!
//! For row $i$ the new estimate is
//!
//! $$x_i^{(k+1)} = \frac{b_i - \left(\sum_j a_{ij} x_j^{(k)} - a_{ii} x_i^{(k)}\right)}{a_{ii}}$$
//!
//! The full dot product is taken and the diagonal term subtracted afterwards,
//! which keeps the inner loop free of the `j != i` branch. Every executor calls
//! [`sweep_block`] on the rows it owns, reading the previous iterate and
//! writing only its own output slice.

use crate::solver::SolverError;
use crate::types::LinearSystem;

/// Pivots with magnitude below this are treated as zero.
pub const PIVOT_EPSILON: f64 = 1e-20;

/// New value of one row.
#[inline]
pub fn update_row(row: &[f64], x_prev: &[f64], i: usize, rhs_i: f64, diag_i: f64) -> f64 {
    let dot: f64 = row.iter().zip(x_prev).map(|(a, x)| a * x).sum();
    (rhs_i - (dot - diag_i * x_prev[i])) / diag_i
}

/// Update a contiguous block of rows.
///
/// * `block`: the rows' matrix entries, `out.len() * x_prev.len()` values.
/// * `rhs`, `diagonal`: the block's entries of `b` and of the cached diagonal.
/// * `start`: global index of the first row in the block.
/// * `out`: destination, one value per row of the block.
pub fn sweep_block(
    block: &[f64],
    rhs: &[f64],
    diagonal: &[f64],
    start: usize,
    x_prev: &[f64],
    out: &mut [f64],
) {
    let n = x_prev.len();
    for (local, value) in out.iter_mut().enumerate() {
        let row = &block[local * n..(local + 1) * n];
        *value = update_row(row, x_prev, start + local, rhs[local], diagonal[local]);
    }
}

/// Cache the diagonal of `system`, rejecting the first near-zero pivot.
///
/// Runs once per solve before any iteration so that a singular row aborts the
/// whole solve with no partial result.
pub fn extract_diagonal(system: &LinearSystem) -> Result<Vec<f64>, SolverError> {
    (0..system.dim())
        .map(|i| {
            let value = system.diagonal_entry(i);
            if value.abs() < PIVOT_EPSILON || !value.is_finite() {
                Err(SolverError::SingularPivot { row: i, value })
            } else {
                Ok(value)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_update_row_matches_branching_form() {
        let row = [4.0, -1.0, 2.0, 0.5];
        let x = [0.3, -0.7, 1.1, 2.0];
        let i = 2;
        let b = 5.0;

        let skip: f64 = (0..4).filter(|&j| j != i).map(|j| row[j] * x[j]).sum();
        let expected = (b - skip) / row[i];

        assert_abs_diff_eq!(update_row(&row, &x, i, b, row[i]), expected, epsilon = 1e-14);
    }

    #[test]
    fn test_sweep_block_writes_only_its_rows() {
        let system = LinearSystem::from_arrays(
            array![[10.0, 1.0, 1.0], [1.0, 10.0, 1.0], [1.0, 1.0, 10.0]],
            array![12.0, 12.0, 12.0],
        )
        .unwrap();
        let diagonal = extract_diagonal(&system).unwrap();
        let x_prev = [0.0; 3];

        let mut out = [f64::NAN; 2];
        sweep_block(
            system.row_block(1, 2),
            &system.rhs()[1..3],
            &diagonal[1..3],
            1,
            &x_prev,
            &mut out,
        );
        assert_abs_diff_eq!(out[0], 1.2, epsilon = 1e-14);
        assert_abs_diff_eq!(out[1], 1.2, epsilon = 1e-14);
    }

    #[test]
    fn test_zero_pivot_is_rejected() {
        let system = LinearSystem::from_arrays(
            array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 2.0, 0.0]],
            array![1.0, 1.0, 1.0],
        )
        .unwrap();
        match extract_diagonal(&system) {
            Err(SolverError::SingularPivot { row, .. }) => assert_eq!(row, 2),
            other => panic!("expected SingularPivot, got {:?}", other),
        }
    }

    #[test]
    fn test_tiny_pivot_is_rejected() {
        let system = LinearSystem::from_arrays(array![[1e-30]], array![1.0]).unwrap();
        assert!(matches!(
            extract_diagonal(&system),
            Err(SolverError::SingularPivot { row: 0, .. })
        ));
    }
}
