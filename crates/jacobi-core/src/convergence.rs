//! Convergence evaluation.
//!
//! Each execution unit reduces the per-row changes $|x_i^{(k+1)} - x_i^{(k)}|$
//! of the rows it owns into one local contribution; the contributions are then
//! combined into the global error with the same operator. Both supported norms
//! are associative, so the global value does not depend on how rows were
//! partitioned beyond floating-point summation order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Norm applied to the change between successive iterates.
///
/// The two norms give different iteration counts for the same tolerance: the
/// L1 sum grows with `N`, the L∞ maximum does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceNorm {
    /// Sum of absolute changes.
    L1,
    /// Largest absolute change.
    #[default]
    LInf,
}

impl ConvergenceNorm {
    /// Neutral element of the reduction.
    #[inline]
    pub fn identity(self) -> f64 {
        0.0
    }

    /// Fold two partial errors.
    #[inline]
    pub fn combine_pair(self, a: f64, b: f64) -> f64 {
        match self {
            ConvergenceNorm::L1 => a + b,
            ConvergenceNorm::LInf => a.max(b),
        }
    }

    /// Local contribution of one unit's rows.
    pub fn local_error(self, next: &[f64], prev: &[f64]) -> f64 {
        next.iter()
            .zip(prev)
            .map(|(n, p)| (n - p).abs())
            .fold(self.identity(), |acc, d| self.combine_pair(acc, d))
    }

    /// Global error from per-unit contributions.
    pub fn combine<I>(self, contributions: I) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        contributions
            .into_iter()
            .fold(self.identity(), |acc, e| self.combine_pair(acc, e))
    }
}

impl fmt::Display for ConvergenceNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceNorm::L1 => write!(f, "l1"),
            ConvergenceNorm::LInf => write!(f, "linf"),
        }
    }
}

impl FromStr for ConvergenceNorm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l1" | "sum" => Ok(ConvergenceNorm::L1),
            "linf" | "inf" | "max" => Ok(ConvergenceNorm::LInf),
            other => Err(format!("unknown norm '{}', expected 'l1' or 'linf'", other)),
        }
    }
}

/// Convergence test: the error is at or below the tolerance.
#[inline]
pub fn has_converged(global_error: f64, tolerance: f64) -> bool {
    global_error <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_error_per_norm() {
        let next = [1.0, 2.5, -1.0];
        let prev = [0.5, 2.0, 1.0];
        assert_eq!(ConvergenceNorm::L1.local_error(&next, &prev), 3.0);
        assert_eq!(ConvergenceNorm::LInf.local_error(&next, &prev), 2.0);
    }

    #[test]
    fn test_combine_matches_single_pass() {
        let next = [0.1, 0.4, 0.9, 1.6, 2.5];
        let prev = [0.0; 5];
        for norm in [ConvergenceNorm::L1, ConvergenceNorm::LInf] {
            let whole = norm.local_error(&next, &prev);
            let split = norm.combine([
                norm.local_error(&next[..2], &prev[..2]),
                norm.local_error(&next[2..], &prev[2..]),
                norm.local_error(&[], &[]),
            ]);
            assert!((whole - split).abs() < 1e-15, "{} mismatch", norm);
        }
    }

    #[test]
    fn test_has_converged_is_inclusive() {
        assert!(has_converged(1e-5, 1e-5));
        assert!(has_converged(0.0, 0.0));
        assert!(!has_converged(1.1e-5, 1e-5));
    }

    #[test]
    fn test_norm_parsing() {
        assert_eq!("L1".parse::<ConvergenceNorm>().unwrap(), ConvergenceNorm::L1);
        assert_eq!("max".parse::<ConvergenceNorm>().unwrap(), ConvergenceNorm::LInf);
        assert!("l2".parse::<ConvergenceNorm>().is_err());
        assert_eq!(ConvergenceNorm::LInf.to_string(), "linf");
    }

    #[test]
    fn test_norm_serde_names() {
        let json = serde_json::to_string(&ConvergenceNorm::L1).unwrap();
        assert_eq!(json, "\"l1\"");
        let back: ConvergenceNorm = serde_json::from_str("\"linf\"").unwrap();
        assert_eq!(back, ConvergenceNorm::LInf);
    }
}
