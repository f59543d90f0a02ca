//! Qubit permutation matrices.
//!
//! [`permutation_matrix`] returns `P` such that `P (A ⊗ I) Pᵗ` applies a
//! `k`-qubit operator `A` at the qubits named by `location`, with
//! `location[0]` receiving the most significant qubit of `A`.

use tracing::trace;

use crate::error::LinalgResult;
use crate::matrix::CMatrix;
use crate::pauli::validate_qubits;

/// Swap the bits at positions `a` and `b` of `index`.
#[inline]
pub fn swap_bit(index: usize, a: usize, b: usize) -> usize {
    let bit_a = (index >> a) & 1;
    let bit_b = (index >> b) & 1;
    if bit_a == bit_b {
        index
    } else {
        index ^ ((1 << a) | (1 << b))
    }
}

/// Sequence of adjacent qubit swaps that moves canonical qubit `j` onto
/// `location[j]`.
///
/// Each entry `(p, p + 1)` exchanges the contents of neighbouring physical
/// qubits. Every placement is one transposition of the current position
/// with the target, written as a ladder of adjacent swaps that leaves the
/// qubits in between where they were, so earlier placements are never
/// disturbed.
pub fn swap_sequence(num_qubits: usize, location: &[usize]) -> LinalgResult<Vec<(usize, usize)>> {
    validate_qubits(num_qubits, location)?;

    // occupant[p] = canonical qubit currently sitting at physical qubit p
    let mut occupant: Vec<usize> = (0..num_qubits).collect();
    let mut swaps = Vec::new();
    for (canonical, &target) in location.iter().enumerate() {
        let current = occupant
            .iter()
            .position(|&c| c == canonical)
            .unwrap_or(canonical);
        if current != target {
            occupant.swap(current, target);
            swaps.extend(adjacent_transposition(current, target));
        }
    }
    Ok(swaps)
}

/// Adjacent swaps whose composition exchanges positions `a` and `b`:
/// up the ladder from the lower position, then back down one short.
fn adjacent_transposition(a: usize, b: usize) -> impl Iterator<Item = (usize, usize)> {
    let (lo, hi) = (a.min(b), a.max(b));
    (lo..hi)
        .chain((lo..hi.saturating_sub(1)).rev())
        .map(|p| (p, p + 1))
}

/// Basis-state map of the permutation: column `b` of `P` has its one at `map[b]`.
pub fn permutation_map(num_qubits: usize, location: &[usize]) -> LinalgResult<Vec<usize>> {
    let swaps = swap_sequence(num_qubits, location)?;
    let dim = 1usize << num_qubits;
    let map = (0..dim)
        .map(|index| {
            swaps.iter().fold(index, |acc, &(p, q)| {
                swap_bit(acc, num_qubits - 1 - p, num_qubits - 1 - q)
            })
        })
        .collect();
    Ok(map)
}

/// Permutation matrix relocating canonical qubits `0..k` onto `location`.
pub fn permutation_matrix(num_qubits: usize, location: &[usize]) -> LinalgResult<CMatrix> {
    let map = permutation_map(num_qubits, location)?;
    let dim = map.len();
    let mut p = CMatrix::zeros(dim, dim);
    for (col, &row) in map.iter().enumerate() {
        p[(row, col)] = num_complex::Complex64::new(1.0, 0.0);
    }
    trace!(num_qubits, ?location, "built permutation matrix");
    Ok(p)
}

/// `A` applied at `location` of an `n`-qubit register, built entry by entry.
///
/// Independent of [`permutation_matrix`]; entry `(r, c)` is
/// `A[r|loc, c|loc]` when `r` and `c` agree on every other qubit and zero
/// otherwise.
pub fn embed_operator(a: &CMatrix, num_qubits: usize, location: &[usize]) -> LinalgResult<CMatrix> {
    validate_qubits(num_qubits, location)?;
    let k = location.len();
    let sub_dim = 1usize << k;
    if a.nrows() != sub_dim || a.ncols() != sub_dim {
        return Err(crate::error::LinalgError::DimensionMismatch {
            expected: sub_dim,
            actual: a.nrows(),
        });
    }

    let dim = 1usize << num_qubits;
    let loc_mask = location
        .iter()
        .fold(0usize, |mask, &q| mask | (1 << (num_qubits - 1 - q)));
    let extract = |index: usize| {
        location.iter().fold(0usize, |acc, &q| {
            (acc << 1) | ((index >> (num_qubits - 1 - q)) & 1)
        })
    };

    let mut out = CMatrix::zeros(dim, dim);
    for r in 0..dim {
        for c in 0..dim {
            if (r & !loc_mask) == (c & !loc_mask) {
                out[(r, c)] = a[(extract(r), extract(c))];
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{identity, kron, max_abs_diff};
    use crate::pauli::PauliOp;

    #[test]
    fn test_swap_bit() {
        assert_eq!(swap_bit(0b01, 0, 1), 0b10);
        assert_eq!(swap_bit(0b11, 0, 1), 0b11);
        assert_eq!(swap_bit(0b100, 2, 0), 0b001);
    }

    #[test]
    fn test_identity_location_is_identity() {
        let p = permutation_matrix(3, &[0, 1]).unwrap();
        assert!(max_abs_diff(&p, &identity(8)) < 1e-15);
    }

    #[test]
    fn test_swap_sequence_places_each_qubit() {
        let swaps = swap_sequence(4, &[3, 0]).unwrap();
        let mut occupant: Vec<usize> = (0..4).collect();
        for (p, q) in swaps {
            occupant.swap(p, q);
        }
        assert_eq!(occupant[3], 0);
        assert_eq!(occupant[0], 1);
    }

    #[test]
    fn test_swap_sequence_is_adjacent() {
        let swaps = swap_sequence(6, &[5, 0, 3]).unwrap();
        assert!(swaps.iter().all(|&(p, q)| q == p + 1));

        let mut occupant: Vec<usize> = (0..6).collect();
        for (p, q) in swaps {
            occupant.swap(p, q);
        }
        assert_eq!(occupant[5], 0);
        assert_eq!(occupant[0], 1);
        assert_eq!(occupant[3], 2);
    }

    #[test]
    fn test_adjacent_transposition_exchanges_endpoints() {
        let mut slots = vec!['a', 'b', 'c', 'd'];
        for (p, q) in adjacent_transposition(3, 0) {
            slots.swap(p, q);
        }
        assert_eq!(slots, vec!['d', 'b', 'c', 'a']);
        assert_eq!(adjacent_transposition(2, 3).collect::<Vec<_>>(), vec![(2, 3)]);
    }

    #[test]
    fn test_relocated_x_acts_on_target_qubit() {
        let x_i = kron(&PauliOp::X.matrix(), &identity(4));
        let p = permutation_matrix(3, &[2]).unwrap();
        let moved = &p * x_i * p.transpose();
        let expected = kron(&identity(4), &PauliOp::X.matrix());
        assert!(max_abs_diff(&moved, &expected) < 1e-15);
    }

    #[test]
    fn test_embed_operator_matches_kron() {
        let a = kron(&PauliOp::Y.matrix(), &PauliOp::Z.matrix());
        let embedded = embed_operator(&a, 3, &[0, 1]).unwrap();
        assert!(max_abs_diff(&embedded, &kron(&a, &identity(2))) < 1e-15);
    }

    #[test]
    fn test_rejects_invalid_location() {
        assert!(permutation_matrix(3, &[1, 1]).is_err());
        assert!(permutation_matrix(3, &[4]).is_err());
        assert!(embed_operator(&identity(2), 3, &[0, 1]).is_err());
    }
}
