//! Plain-text system files.
//!
//! The format is whitespace separated:
//! ```text
//! <N>
//! a_00 a_01 ... a_0(N-1)
//! ...
//! a_(N-1)0 ... a_(N-1)(N-1)
//! b_0 b_1 ... b_(N-1)
//! ```
//! Line breaks are not significant to the parser; they are only used to
//! report where a bad token sits.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use rand::Rng;

use crate::solver::SolverError;
use crate::types::{matrix_len, LinearSystem};

/// Parse a system from the text format.
pub fn parse_system(content: &str) -> Result<LinearSystem, SolverError> {
    let mut tokens = content
        .lines()
        .enumerate()
        .flat_map(|(idx, line)| line.split_whitespace().map(move |tok| (idx + 1, tok)));
    let last_line = content.lines().count().max(1);

    let (line, first) = tokens.next().ok_or_else(|| SolverError::MalformedInput {
        line: 1,
        message: "empty input, expected the matrix dimension".into(),
    })?;
    let n: i64 = first.parse().map_err(|_| SolverError::MalformedInput {
        line,
        message: format!("matrix dimension must be an integer, got '{}'", first),
    })?;
    if n <= 0 {
        return Err(SolverError::MalformedInput {
            line,
            message: format!("matrix dimension must be positive, got {}", n),
        });
    }
    let n = usize::try_from(n).map_err(|_| SolverError::MalformedInput {
        line,
        message: format!("matrix dimension {} does not fit in memory", n),
    })?;
    let entries = n.checked_mul(n).ok_or_else(|| SolverError::MalformedInput {
        line,
        message: format!("matrix dimension {} does not fit in memory", n),
    })?;

    let mut next_value = |what: &str, index: usize| -> Result<f64, SolverError> {
        let (line, tok) = tokens.next().ok_or_else(|| SolverError::MalformedInput {
            line: last_line,
            message: format!("unexpected end of input while reading {} entry {}", what, index),
        })?;
        let value: f64 = tok.parse().map_err(|_| SolverError::MalformedInput {
            line,
            message: format!("invalid {} entry {}: '{}'", what, index, tok),
        })?;
        if !value.is_finite() {
            return Err(SolverError::MalformedInput {
                line,
                message: format!("non-finite {} entry {}: '{}'", what, index, tok),
            });
        }
        Ok(value)
    };

    // at most one value per two bytes of input, whatever the header claims
    let budget = content.len() / 2 + 1;
    let mut matrix = Vec::with_capacity(entries.min(budget));
    for k in 0..entries {
        matrix.push(next_value("matrix", k)?);
    }
    let mut rhs = Vec::with_capacity(n.min(budget));
    for k in 0..n {
        rhs.push(next_value("rhs", k)?);
    }

    let trailing = tokens.count();
    if trailing > 0 {
        warn!("ignoring {} trailing tokens after the right-hand side", trailing);
    }

    LinearSystem::new(n, matrix, rhs)
}

/// Read and parse a system file.
pub fn read_system(path: &Path) -> Result<LinearSystem, SolverError> {
    let content = fs::read_to_string(path)?;
    let system = parse_system(&content)?;
    debug!("loaded {}x{} system from {}", system.dim(), system.dim(), path.display());
    Ok(system)
}

/// Write a system in the text format.
pub fn write_system<W: Write>(system: &LinearSystem, writer: W) -> io::Result<()> {
    let mut out = BufWriter::new(writer);
    let n = system.dim();
    writeln!(out, "{}", n)?;
    for i in 0..n {
        write_line(&mut out, system.row(i))?;
    }
    write_line(&mut out, system.rhs())?;
    out.flush()
}

fn write_line<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    for (j, v) in values.iter().enumerate() {
        if j > 0 {
            write!(out, " ")?;
        }
        write!(out, "{:.6}", v)?;
    }
    writeln!(out)
}

/// Write a system file, creating parent directories as needed.
pub fn save_system(system: &LinearSystem, path: &Path) -> Result<(), SolverError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    write_system(system, fs::File::create(path)?)?;
    Ok(())
}

/// Random strictly diagonally dominant test system.
///
/// Off-diagonal entries are integers in `[0, 10)`; each diagonal entry is the
/// row's off-diagonal sum plus an integer in `[1, 11)`; `b` holds integers in
/// `[0, 100)`.
pub fn generate_diagonally_dominant<R: Rng + ?Sized>(
    n: usize,
    rng: &mut R,
) -> Result<LinearSystem, SolverError> {
    let mut matrix = vec![0.0; matrix_len(n)?];
    for i in 0..n {
        let row = &mut matrix[i * n..(i + 1) * n];
        let mut off_sum = 0.0;
        for (j, entry) in row.iter_mut().enumerate() {
            if j != i {
                *entry = f64::from(rng.random_range(0..10u32));
                off_sum += *entry;
            }
        }
        row[i] = off_sum + f64::from(rng.random_range(0..10u32)) + 1.0;
    }
    let rhs = (0..n).map(|_| f64::from(rng.random_range(0..100u32))).collect();
    LinearSystem::new(n, matrix, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SAMPLE: &str = "3\n10 1 1\n1 10 1\n1 1 10\n12 12 12\n";

    #[test]
    fn test_parse_sample() {
        let system = parse_system(SAMPLE).unwrap();
        assert_eq!(system.dim(), 3);
        assert_eq!(system.row(0), &[10.0, 1.0, 1.0]);
        assert_eq!(system.rhs(), &[12.0, 12.0, 12.0]);
    }

    #[test]
    fn test_parse_ignores_line_layout() {
        let system = parse_system("2 4.0 -1.5\n\n 2e0 3\n 1 2").unwrap();
        assert_eq!(system.matrix(), &[4.0, -1.5, 2.0, 3.0]);
        assert_eq!(system.rhs(), &[1.0, 2.0]);
    }

    #[test]
    fn test_malformed_inputs() {
        let cases = [
            ("", 1),
            ("0\n", 1),
            ("-3\n", 1),
            ("two\n", 1),
            ("2\n1 2\n3 x\n1 1\n", 3),
            ("2\n1 2\n3 4\n1\n", 4),
            ("2\n1 2\n3 inf\n1 1\n", 3),
            ("3000000000\n1 2 3\n", 2),
            ("4294967296\n", 1),
        ];
        for (input, expected_line) in cases {
            match parse_system(input) {
                Err(SolverError::MalformedInput { line, .. }) => {
                    assert_eq!(line, expected_line, "input {:?}", input)
                }
                other => panic!("input {:?}: expected MalformedInput, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_trailing_tokens_are_ignored() {
        let system = parse_system("1\n2\n4\n99 99\n").unwrap();
        assert_eq!(system.rhs(), &[4.0]);
    }

    #[test]
    fn test_write_then_parse() {
        let mut rng = StdRng::seed_from_u64(7);
        let system = generate_diagonally_dominant(6, &mut rng).unwrap();
        let mut buf = Vec::new();
        write_system(&system, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1 + 6 + 1);
        assert_eq!(parse_system(&text).unwrap(), system);
    }

    #[test]
    fn test_generated_systems_are_dominant() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in [1, 2, 5, 32] {
            let system = generate_diagonally_dominant(n, &mut rng).unwrap();
            assert!(system.is_diagonally_dominant());
            assert!(system.rhs().iter().all(|b| (0.0..100.0).contains(b)));
        }
    }

    #[test]
    fn test_generator_rejects_unrepresentable_dimension() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            generate_diagonally_dominant(usize::MAX, &mut rng),
            Err(SolverError::InvalidConfig(_))
        ));
        assert!(generate_diagonally_dominant(0, &mut rng).is_err());
    }
}
