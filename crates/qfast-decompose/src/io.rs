//! Reading unitaries from text and writing gate lists.
//!
//! A text unitary has one matrix row per line. Three row layouts are
//! accepted, and a file must use one of them throughout:
//!
//! ```text
//! # interleaved: re im re im ...      (2·N numbers per row)
//! 0 0 1 0
//! 1 0 0 0
//! # real only                         (N numbers per row)
//! 0 1
//! 1 0
//! # complex tokens                    (N tokens per row)
//! (0+0j) (1+0j)
//! (1+0j) (0+0j)
//! ```
//!
//! Blank lines and `#` comments are ignored. Gate lists are written as JSON
//! arrays of [`GateRecord`]s.

use std::fmt::Write as _;
use std::path::Path;

use tracing::debug;

use qfast_linalg::{CMatrix, Complex64};

use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::{Gate, GateRecord};

/// Parse a text unitary.
///
/// The result is only checked for shape; unitarity is validated by the
/// consumer.
pub fn parse_unitary(text: &str) -> DecomposeResult<CMatrix> {
    let mut rows: Vec<(usize, Vec<Complex64>, bool)> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let complex = tokens.iter().filter(|t| is_complex_token(t)).count();
        if complex == tokens.len() {
            let row = tokens
                .iter()
                .map(|t| parse_complex(t).ok_or_else(|| parse_error(line_no, format!("invalid complex number '{t}'"))))
                .collect::<DecomposeResult<Vec<_>>>()?;
            rows.push((line_no, row, true));
        } else if complex == 0 {
            let values = tokens
                .iter()
                .map(|t| t.parse::<f64>().map_err(|_| parse_error(line_no, format!("invalid number '{t}'"))))
                .collect::<DecomposeResult<Vec<_>>>()?;
            let row = values.into_iter().map(|v| Complex64::new(v, 0.0)).collect();
            rows.push((line_no, row, false));
        } else {
            return Err(parse_error(
                line_no,
                "row mixes complex tokens with plain numbers".into(),
            ));
        }
    }

    let dim = rows.len();
    if dim == 0 {
        return Err(parse_error(1, "no matrix rows found".into()));
    }

    let mut matrix = CMatrix::zeros(dim, dim);
    let mut first: Option<(usize, Layout)> = None;
    for (r, (line_no, row, complex)) in rows.into_iter().enumerate() {
        let layout = match (complex, row.len()) {
            (true, len) if len == dim => Layout::Complex,
            (false, len) if len == dim => Layout::Real,
            (false, len) if len == 2 * dim => Layout::Interleaved,
            (_, len) => {
                return Err(parse_error(
                    line_no,
                    format!("expected {dim} complex or {} real values, found {len}", 2 * dim),
                ));
            }
        };
        match first {
            None => first = Some((line_no, layout)),
            Some((first_line, first_layout)) if first_layout != layout => {
                return Err(parse_error(
                    line_no,
                    format!(
                        "row uses the {} layout but line {first_line} uses the {} layout",
                        layout.name(),
                        first_layout.name()
                    ),
                ));
            }
            Some(_) => {}
        }

        let entries: Vec<Complex64> = match layout {
            Layout::Interleaved => row
                .chunks_exact(2)
                .map(|pair| Complex64::new(pair[0].re, pair[1].re))
                .collect(),
            Layout::Real | Layout::Complex => row,
        };
        for (c, z) in entries.into_iter().enumerate() {
            matrix[(r, c)] = z;
        }
    }
    debug!(dim, "parsed unitary");
    Ok(matrix)
}

/// Read and parse a text unitary from `path`.
pub fn load_unitary(path: impl AsRef<Path>) -> DecomposeResult<CMatrix> {
    let text = std::fs::read_to_string(path)?;
    parse_unitary(&text)
}

/// Render `u` in the interleaved layout accepted by [`parse_unitary`].
pub fn format_unitary(u: &CMatrix) -> String {
    let mut out = String::new();
    for row in u.row_iter() {
        let line = row
            .iter()
            .map(|z| format!("{:e} {:e}", z.re, z.im))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "{line}");
    }
    out
}

/// Serialize a gate list as pretty JSON.
pub fn gates_to_json(gates: &[Gate]) -> DecomposeResult<String> {
    let records: Vec<GateRecord> = gates.iter().map(Gate::to_record).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Deserialize and validate a gate list.
pub fn gates_from_json(json: &str) -> DecomposeResult<Vec<Gate>> {
    let records: Vec<GateRecord> = serde_json::from_str(json)?;
    records.into_iter().map(Gate::from_record).collect()
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Real,
    Interleaved,
    Complex,
}

impl Layout {
    fn name(self) -> &'static str {
        match self {
            Layout::Real => "real",
            Layout::Interleaved => "interleaved",
            Layout::Complex => "complex",
        }
    }
}

fn is_complex_token(token: &str) -> bool {
    token.starts_with('(') || token.ends_with(['j', 'J', ')'])
}

fn parse_error(line: usize, message: String) -> DecomposeError {
    DecomposeError::Parse { line, message }
}

/// Parse `a`, `bj`, `a+bj` or `(a-bj)`.
fn parse_complex(token: &str) -> Option<Complex64> {
    let body = token.trim_start_matches('(').trim_end_matches(')');
    let Some(imag) = body.strip_suffix(['j', 'J']) else {
        return body.parse().ok().map(|re| Complex64::new(re, 0.0));
    };

    // Split at the last sign that is not part of an exponent.
    let bytes = imag.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E'));
    let (re, im) = match split {
        Some(i) => (imag[..i].parse().ok()?, &imag[i..]),
        None => (0.0, imag),
    };
    let im = match im {
        "" | "+" => 1.0,
        "-" => -1.0,
        s => s.parse().ok()?,
    };
    Some(Complex64::new(re, im))
}
