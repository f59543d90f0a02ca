//! Matrix exponential with directional derivatives.
//!
//! [`dexpmv`] evaluates `F = exp(M)` together with
//! `dF_j = d/dε exp(M + ε dM_j)|ε=0` for a batch of tangents that share the
//! base point `M`. It uses scaling and squaring around a fixed order-6
//! diagonal Padé approximant and carries every tangent through each stage:
//!
//! 1. choose `r` so that `‖M‖∞ / 2^r ≤ 1` and scale `M`, `dM_j` by `2^-r`
//! 2. accumulate `N = Σ c_k Mᵏ`, `D = Σ (-1)ᵏ c_k Mᵏ` and the matching
//!    derivative sums, with `d(Mᵏ) = dM·Mᵏ⁻¹ + M·d(Mᵏ⁻¹)`
//! 3. solve `F = D⁻¹ N` and `dF = D⁻¹ (dN - dD·F)` with one LU factorization
//! 4. square `r` times using `dF ← dF·F + F·dF`, `F ← F·F`
//!
//! For skew-Hermitian `M` the approximant is exactly unitary, because
//! `D = N†` in that case.

use num_complex::Complex64;
use tracing::trace;

use crate::error::{LinalgError, LinalgResult};
use crate::matrix::{CMatrix, identity, inf_norm};

/// Order of the diagonal Padé approximant.
pub const PADE_ORDER: usize = 6;

/// Padé coefficients `c_1..c_q` (`c_0 = 1`).
fn pade_coefficients() -> [f64; PADE_ORDER] {
    let q = PADE_ORDER as f64;
    let mut coeffs = [0.0; PADE_ORDER];
    let mut c = 0.5;
    coeffs[0] = c;
    for k in 2..=PADE_ORDER {
        let kf = k as f64;
        c *= (q - kf + 1.0) / (kf * (2.0 * q - kf + 1.0));
        coeffs[k - 1] = c;
    }
    coeffs
}

/// Number of squarings needed to bring `‖M‖∞` down to at most one.
fn squaring_count(norm: f64) -> i32 {
    if norm > 0.0 && norm.is_finite() {
        (norm.log2() + 1.0).max(0.0) as i32
    } else {
        0
    }
}

fn validate(m: &CMatrix, tangents: &[CMatrix]) -> LinalgResult<()> {
    if !m.is_square() {
        return Err(LinalgError::NotSquare {
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    for dm in tangents {
        if dm.shape() != m.shape() {
            return Err(LinalgError::DimensionMismatch {
                expected: m.nrows(),
                actual: dm.nrows().max(dm.ncols()),
            });
        }
    }
    Ok(())
}

/// Exponential of `M` and its directional derivatives along every tangent.
///
/// Returns `(exp(M), [dexp(M)[dM_0], dexp(M)[dM_1], ...])`.
pub fn dexpmv(m: &CMatrix, tangents: &[CMatrix]) -> LinalgResult<(CMatrix, Vec<CMatrix>)> {
    validate(m, tangents)?;

    let dim = m.nrows();
    let r = squaring_count(inf_norm(m));
    let scale = Complex64::new(2f64.powi(-r), 0.0);
    let a = m * scale;

    let coeffs = pade_coefficients();

    // powers[k] = aᵏ⁺¹
    let mut powers = Vec::with_capacity(PADE_ORDER);
    powers.push(a.clone());
    for k in 1..PADE_ORDER {
        let next = &a * &powers[k - 1];
        powers.push(next);
    }

    let mut num = identity(dim);
    let mut den = identity(dim);
    for (k, (c, x)) in coeffs.iter().zip(&powers).enumerate() {
        let term = x * Complex64::new(*c, 0.0);
        num += &term;
        if (k + 1) % 2 == 0 {
            den += &term;
        } else {
            den -= &term;
        }
    }

    let lu = den.lu();
    let mut f = lu
        .solve(&num)
        .ok_or_else(|| LinalgError::NumericalDegeneracy("Padé denominator is singular".into()))?;

    let mut derivs = Vec::with_capacity(tangents.len());
    for dm in tangents {
        let da = dm * scale;
        let mut y = da.clone();
        let mut dnum = &da * Complex64::new(coeffs[0], 0.0);
        let mut dden = -dnum.clone();
        for k in 1..PADE_ORDER {
            y = &da * &powers[k - 1] + &a * &y;
            let term = &y * Complex64::new(coeffs[k], 0.0);
            dnum += &term;
            if (k + 1) % 2 == 0 {
                dden += &term;
            } else {
                dden -= &term;
            }
        }
        let rhs = dnum - dden * &f;
        let df = lu.solve(&rhs).ok_or_else(|| {
            LinalgError::NumericalDegeneracy("Padé denominator is singular".into())
        })?;
        derivs.push(df);
    }

    for _ in 0..r {
        for df in &mut derivs {
            *df = &*df * &f + &f * &*df;
        }
        f = &f * &f;
    }

    trace!(dim, squarings = r, tangents = tangents.len(), "dexpmv");
    Ok((f, derivs))
}

/// Exponential of `M` and its derivative along a single tangent `dM`.
pub fn dexpm(m: &CMatrix, dm: &CMatrix) -> LinalgResult<(CMatrix, CMatrix)> {
    let (f, mut derivs) = dexpmv(m, std::slice::from_ref(dm))?;
    let df = derivs
        .pop()
        .ok_or_else(|| LinalgError::NumericalDegeneracy("missing derivative".into()))?;
    Ok((f, df))
}

/// Matrix exponential `exp(M)`.
pub fn expm(m: &CMatrix) -> LinalgResult<CMatrix> {
    dexpmv(m, &[]).map(|(f, _)| f)
}
