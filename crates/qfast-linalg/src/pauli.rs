//! Tensor-product Pauli basis.
//!
//! The `n`-qubit basis holds the `4^n` operators `σ_{p_0} ⊗ … ⊗ σ_{p_{n-1}}`
//! with `p_q ∈ {I, X, Y, Z}`. Element `i` is addressed by the base-4 code of
//! `(p_0, …, p_{n-1})` with qubit 0 as the most significant digit, so
//! `I=0, X=1, Y=2, Z=3` and e.g. `XZ` on two qubits has index `1·4 + 3 = 7`.
//!
//! Full bases are memoized per order in a [`PauliBasis`] table. Projections
//! onto a qubit subset are built directly from the row action of each Pauli
//! string, which keeps them cheap even when the full basis would not fit in
//! memory.
//!
//! ```rust
//! use qfast_linalg::pauli::{norder_paulis, pauli_expansion};
//!
//! let basis = norder_paulis(2);
//! assert_eq!(basis.len(), 16);
//!
//! // XZ has a single unit coefficient at index 7.
//! let alpha = pauli_expansion(&basis[7]).unwrap();
//! assert!((alpha[7] - 1.0).abs() < 1e-15);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use itertools::Itertools;
use nalgebra::DVector;
use num_complex::Complex64;
use tracing::debug;

use crate::error::{LinalgError, LinalgResult};
use crate::expm::expm;
use crate::matrix::{
    CMatrix, MAX_FACTOR_ITERATIONS, hermiticity_deviation, kron, qubit_count, unitarity_deviation,
};

/// Largest Hermiticity error accepted by [`pauli_expansion`].
pub const HERMITIAN_TOLERANCE: f64 = 1e-8;

/// Largest unitarity error accepted by [`log_no_i`].
pub const LOG_UNITARY_TOLERANCE: f64 = 1e-8;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Single-qubit Pauli operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauliOp {
    /// Identity.
    I,
    /// Pauli X (bit flip).
    X,
    /// Pauli Y.
    Y,
    /// Pauli Z (phase flip).
    Z,
}

impl PauliOp {
    /// All four operators in basis order.
    pub const ALL: [PauliOp; 4] = [PauliOp::I, PauliOp::X, PauliOp::Y, PauliOp::Z];

    /// Base-4 digit of this operator.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            PauliOp::I => 0,
            PauliOp::X => 1,
            PauliOp::Y => 2,
            PauliOp::Z => 3,
        }
    }

    /// Operator for a base-4 digit.
    pub fn from_index(digit: usize) -> Option<Self> {
        Self::ALL.get(digit).copied()
    }

    /// 2x2 matrix of this operator.
    pub fn matrix(self) -> CMatrix {
        let entries = match self {
            PauliOp::I => [ONE, ZERO, ZERO, ONE],
            PauliOp::X => [ZERO, ONE, ONE, ZERO],
            PauliOp::Y => [ZERO, -I, I, ZERO],
            PauliOp::Z => [ONE, ZERO, ZERO, -ONE],
        };
        CMatrix::from_row_slice(2, 2, &entries)
    }

    /// Whether the operator flips the computational basis state.
    #[inline]
    fn flips(self) -> bool {
        matches!(self, PauliOp::X | PauliOp::Y)
    }

    /// Matrix element `⟨bit ⊕ flip| σ |bit⟩` read along row `bit`.
    #[inline]
    fn row_phase(self, bit: usize) -> Complex64 {
        match (self, bit) {
            (PauliOp::I | PauliOp::X, _) => ONE,
            (PauliOp::Y, 0) => -I,
            (PauliOp::Y, _) => I,
            (PauliOp::Z, 0) => ONE,
            (PauliOp::Z, _) => -ONE,
        }
    }
}

impl fmt::Display for PauliOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            PauliOp::I => 'I',
            PauliOp::X => 'X',
            PauliOp::Y => 'Y',
            PauliOp::Z => 'Z',
        };
        write!(f, "{c}")
    }
}

/// Dense matrix of the Pauli string `ops[0] ⊗ ops[1] ⊗ …`.
///
/// Every row of a Pauli string holds exactly one non-zero entry, so the
/// matrix is filled directly instead of through repeated Kronecker products.
pub fn pauli_string(ops: &[PauliOp]) -> CMatrix {
    let n = ops.len();
    let dim = 1usize << n;
    let flip_mask = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| op.flips())
        .fold(0usize, |mask, (q, _)| mask | (1 << (n - 1 - q)));

    let mut m = CMatrix::zeros(dim, dim);
    for row in 0..dim {
        let phase = ops.iter().enumerate().fold(ONE, |acc, (q, op)| {
            acc * op.row_phase((row >> (n - 1 - q)) & 1)
        });
        m[(row, row ^ flip_mask)] = phase;
    }
    m
}

/// Decode a basis index into its per-qubit operators.
pub fn pauli_ops(index: usize, num_qubits: usize) -> Vec<PauliOp> {
    (0..num_qubits)
        .map(|q| {
            let digit = (index >> (2 * (num_qubits - 1 - q))) & 3;
            PauliOp::ALL[digit]
        })
        .collect()
}

/// Memoized table of full Pauli bases, one entry per order.
#[derive(Debug, Default)]
pub struct PauliBasis {
    orders: RwLock<Vec<Arc<[CMatrix]>>>,
}

impl PauliBasis {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table shared by every gate.
    pub fn global() -> &'static PauliBasis {
        static GLOBAL: OnceLock<PauliBasis> = OnceLock::new();
        GLOBAL.get_or_init(PauliBasis::new)
    }

    /// The `4^n` Paulis of order `n`, built on first request.
    pub fn order(&self, n: usize) -> Arc<[CMatrix]> {
        {
            let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(basis) = orders.get(n) {
                return Arc::clone(basis);
            }
        }

        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        if orders.is_empty() {
            orders.push(Arc::from(vec![CMatrix::identity(1, 1)]));
        }
        while orders.len() <= n {
            let prev = Arc::clone(&orders[orders.len() - 1]);
            let singles: Vec<CMatrix> = PauliOp::ALL.iter().map(|op| op.matrix()).collect();
            let next: Vec<CMatrix> = prev
                .iter()
                .cartesian_product(singles.iter())
                .map(|(p, s)| kron(p, s))
                .collect();
            debug!(order = orders.len(), size = next.len(), "built Pauli basis");
            orders.push(Arc::from(next));
        }
        Arc::clone(&orders[n])
    }

    /// Number of orders currently held (order 0 included).
    pub fn cached_orders(&self) -> usize {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every memoized basis.
    pub fn reset(&self) {
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// The `4^n` Paulis of order `n` from the global table.
pub fn norder_paulis(n: usize) -> Arc<[CMatrix]> {
    PauliBasis::global().order(n)
}

/// Check that `qubits` is a non-empty list of distinct indices below `num_qubits`.
pub fn validate_qubits(num_qubits: usize, qubits: &[usize]) -> LinalgResult<()> {
    let invalid = qubits.is_empty()
        || qubits.iter().any(|&q| q >= num_qubits)
        || !qubits.iter().all_unique();
    if invalid {
        return Err(LinalgError::InvalidQubits {
            qubits: qubits.to_vec(),
            num_qubits,
        });
    }
    Ok(())
}

/// The `4^k` `n`-qubit Paulis supported on `qubits` (identity elsewhere).
///
/// Element order follows the `k`-qubit basis with `qubits[0]` carrying the
/// most significant digit, so element `i` equals the `k`-qubit Pauli `i`
/// applied at `qubits`.
pub fn pauli_projection(num_qubits: usize, qubits: &[usize]) -> LinalgResult<Vec<CMatrix>> {
    validate_qubits(num_qubits, qubits)?;

    let projections = std::iter::repeat_n(PauliOp::ALL, qubits.len())
        .multi_cartesian_product()
        .map(|sub| {
            let mut ops = vec![PauliOp::I; num_qubits];
            for (&q, op) in qubits.iter().zip(sub) {
                ops[q] = op;
            }
            pauli_string(&ops)
        })
        .collect();
    Ok(projections)
}

/// `Σ coeffs_i · basis_i`.
pub fn pauli_sum(coeffs: &[f64], basis: &[CMatrix]) -> LinalgResult<CMatrix> {
    if coeffs.len() != basis.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: basis.len(),
            actual: coeffs.len(),
        });
    }
    let dim = basis.first().map_or(1, |b| b.nrows());
    let mut h = CMatrix::zeros(dim, dim);
    for (&a, sigma) in coeffs.iter().zip(basis) {
        if a != 0.0 {
            h += sigma * Complex64::new(a, 0.0);
        }
    }
    Ok(h)
}

/// Real Pauli coefficients of a Hermitian operator.
///
/// The basis is orthogonal under the trace inner product with
/// `Tr(σ_i σ_j) = 2^n δ_ij`, so the inverse of the basis matrix is its
/// scaled transpose and `α_i = Re Tr(σ_i H) / 2^n`.
pub fn pauli_expansion(h: &CMatrix) -> LinalgResult<Vec<f64>> {
    let n = qubit_count(h)?;
    let deviation = hermiticity_deviation(h);
    if deviation > HERMITIAN_TOLERANCE {
        return Err(LinalgError::NotHermitian(deviation));
    }

    let dim = 1usize << n;
    let coeffs = (0..1usize << (2 * n))
        .map(|index| {
            let ops = pauli_ops(index, n);
            let flip_mask = ops
                .iter()
                .enumerate()
                .filter(|(_, op)| op.flips())
                .fold(0usize, |mask, (q, _)| mask | (1 << (n - 1 - q)));
            // Tr(σ H) = Σ_row σ[row, row ^ mask] · H[row ^ mask, row]
            let trace = (0..dim).fold(ZERO, |acc, row| {
                let phase = ops.iter().enumerate().fold(ONE, |p, (q, op)| {
                    p * op.row_phase((row >> (n - 1 - q)) & 1)
                });
                acc + phase * h[(row ^ flip_mask, row)]
            });
            trace.re / dim as f64
        })
        .collect();
    Ok(coeffs)
}

/// `exp(i · Σ α_i σ_i)` for a coefficient vector of length `4^k`.
pub fn unitary_from_pauli_coefs(alpha: &[f64]) -> LinalgResult<CMatrix> {
    let len = alpha.len();
    if len == 0 || !len.is_power_of_two() || len.trailing_zeros() % 2 != 0 {
        return Err(LinalgError::NotPowerOfFour(len));
    }
    let n = (len.trailing_zeros() / 2) as usize;
    let basis = norder_paulis(n);
    let h = pauli_sum(alpha, &basis)?;
    expm(&(h * I))
}

/// Hermitian `H` with `U = exp(i H)`.
///
/// Uses a complex Schur factorization `U = Q T Q†`. `T` is diagonal for a
/// unitary input; each diagonal entry is pushed back onto the unit circle
/// before its principal argument is taken, and the result is symmetrized.
pub fn log_no_i(u: &CMatrix) -> LinalgResult<CMatrix> {
    qubit_count(u)?;
    let deviation = unitarity_deviation(u);
    if deviation > LOG_UNITARY_TOLERANCE {
        return Err(LinalgError::NotUnitary(deviation));
    }

    let schur = nalgebra::Schur::try_new(u.clone(), f64::EPSILON, MAX_FACTOR_ITERATIONS)
        .ok_or_else(|| LinalgError::NumericalDegeneracy("Schur factorization failed".into()))?;
    let (q, t) = schur.unpack();

    let mut angles = Vec::with_capacity(t.nrows());
    for i in 0..t.nrows() {
        let lambda = t[(i, i)];
        let modulus = lambda.norm();
        if modulus < 0.5 {
            return Err(LinalgError::NumericalDegeneracy(format!(
                "Schur eigenvalue {lambda} is far from the unit circle"
            )));
        }
        angles.push(Complex64::new((lambda / modulus).arg(), 0.0));
    }

    let h = &q * CMatrix::from_diagonal(&DVector::from_vec(angles)) * q.adjoint();
    Ok((&h + h.adjoint()) * Complex64::new(0.5, 0.0))
}
