//! Dense complex matrix helpers shared by every layer of the decomposer.
//!
//! All operators are stored as [`CMatrix`] (`nalgebra::DMatrix<Complex64>`).
//! Qubit `q` of an `n`-qubit operator occupies bit `n - 1 - q` of the basis
//! index, so qubit 0 is the most significant and `kron(A, B)` places `A` on
//! the lower-numbered qubits.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::{LinalgError, LinalgResult};

/// Dense complex matrix.
pub type CMatrix = DMatrix<Complex64>;

/// Maximum number of QR sweeps allowed in SVD and Schur factorizations.
pub(crate) const MAX_FACTOR_ITERATIONS: usize = 10_000;

/// Identity of the given dimension.
#[inline]
pub fn identity(dim: usize) -> CMatrix {
    CMatrix::identity(dim, dim)
}

/// Kronecker product `a ⊗ b`.
#[inline]
pub fn kron(a: &CMatrix, b: &CMatrix) -> CMatrix {
    a.kronecker(b)
}

/// Return the qubit count of a square `2^n x 2^n` matrix.
pub fn qubit_count(m: &CMatrix) -> LinalgResult<usize> {
    if !m.is_square() {
        return Err(LinalgError::NotSquare {
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    qubits_for_dim(m.nrows())
}

/// Return `n` such that `dim == 2^n`.
pub fn qubits_for_dim(dim: usize) -> LinalgResult<usize> {
    if dim == 0 || !dim.is_power_of_two() {
        return Err(LinalgError::NotPowerOfTwo(dim));
    }
    Ok(dim.trailing_zeros() as usize)
}

/// Largest absolute entry of `a - b`. Shapes must agree.
pub fn max_abs_diff(a: &CMatrix, b: &CMatrix) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}

/// Largest entry-wise deviation of `U U†` and `U† U` from the identity.
pub fn unitarity_deviation(u: &CMatrix) -> f64 {
    if !u.is_square() {
        return f64::INFINITY;
    }
    let id = identity(u.nrows());
    let adj = u.adjoint();
    let left = max_abs_diff(&(u * &adj), &id);
    let right = max_abs_diff(&(&adj * u), &id);
    left.max(right)
}

/// Check `U U† = U† U = I` entry-wise within `tol`.
#[inline]
pub fn is_unitary(u: &CMatrix, tol: f64) -> bool {
    unitarity_deviation(u) <= tol
}

/// Largest entry-wise deviation of `H` from `H†`.
pub fn hermiticity_deviation(h: &CMatrix) -> f64 {
    if !h.is_square() {
        return f64::INFINITY;
    }
    max_abs_diff(h, &h.adjoint())
}

/// Check `H = H†` entry-wise within `tol`.
#[inline]
pub fn is_hermitian(h: &CMatrix, tol: f64) -> bool {
    hermiticity_deviation(h) <= tol
}

/// Maximum absolute row sum.
pub fn inf_norm(m: &CMatrix) -> f64 {
    m.row_iter()
        .map(|row| row.iter().map(|z| z.norm()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// `Tr(A B)` without forming the product.
pub fn trace_of_product(a: &CMatrix, b: &CMatrix) -> Complex64 {
    let mut acc = Complex64::new(0.0, 0.0);
    for i in 0..a.nrows() {
        for j in 0..a.ncols() {
            acc += a[(i, j)] * b[(j, i)];
        }
    }
    acc
}

/// Hilbert-Schmidt distance `1 - |Tr(A† B)| / dim`.
pub fn hilbert_schmidt_distance(a: &CMatrix, b: &CMatrix) -> f64 {
    let overlap = trace_of_product(&a.adjoint(), b);
    1.0 - overlap.norm() / a.nrows() as f64
}

/// Nearest unitary in Frobenius norm: with `M = V Σ W†` returns `V W†`.
pub fn closest_unitary(m: &CMatrix) -> LinalgResult<CMatrix> {
    qubit_count(m)?;
    let svd = m
        .clone()
        .try_svd(true, true, f64::EPSILON, MAX_FACTOR_ITERATIONS)
        .ok_or_else(|| LinalgError::NumericalDegeneracy("SVD did not converge".into()))?;
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => Ok(u * v_t),
        _ => Err(LinalgError::NumericalDegeneracy(
            "SVD did not return singular vectors".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_qubit_count() {
        assert_eq!(qubit_count(&identity(8)).unwrap(), 3);
        assert!(matches!(
            qubit_count(&identity(6)),
            Err(LinalgError::NotPowerOfTwo(6))
        ));
        assert!(matches!(
            qubit_count(&CMatrix::zeros(2, 4)),
            Err(LinalgError::NotSquare { rows: 2, cols: 4 })
        ));
    }

    #[test]
    fn test_is_unitary() {
        let h = CMatrix::from_row_slice(
            2,
            2,
            &[c(1.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(-1.0, 0.0)],
        ) * c(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        assert!(is_unitary(&h, 1e-14));

        let not = CMatrix::from_row_slice(2, 2, &[c(1.0, 0.0), c(1.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)]);
        assert!(!is_unitary(&not, 1e-3));
    }

    #[test]
    fn test_closest_unitary_restores_unitarity() {
        let mut m = identity(4);
        m[(0, 1)] = c(1e-3, 2e-3);
        m[(2, 2)] = c(1.01, 0.0);
        assert!(!is_unitary(&m, 1e-6));

        let u = closest_unitary(&m).unwrap();
        assert!(is_unitary(&u, 1e-12));
        assert!(max_abs_diff(&u, &m) < 2e-2);
    }

    #[test]
    fn test_hilbert_schmidt_distance_ignores_global_phase() {
        let a = identity(4);
        let b = identity(4) * c(0.0, 1.0);
        assert!(hilbert_schmidt_distance(&a, &b).abs() < 1e-15);
    }

    #[test]
    fn test_inf_norm() {
        let m = CMatrix::from_row_slice(2, 2, &[c(3.0, 4.0), c(1.0, 0.0), c(0.0, 0.0), c(0.0, 2.0)]);
        assert!((inf_norm(&m) - 6.0).abs() < 1e-15);
    }
}
