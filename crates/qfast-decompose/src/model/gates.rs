//! Parameterized gates and their analytic Jacobians.
//!
//! Both gate kinds are generated by a real coefficient vector `α` of length
//! `4^k` over the `k`-qubit Pauli basis, scaled by `-i / 2^n` where `n` is
//! the register width:
//!
//! ```text
//! FixedGate    M(α)    = exp(-i/2^n · Σ α_i σ_i)          at one location
//! GenericGate  M(α, l) = softmax(T·l)-weighted mixture over live locations
//! ```
//!
//! The gate's own `2^k x 2^k` matrix is therefore
//! `unitary_from_pauli_coefs(-α / 2^n)`.

use std::sync::Arc;

use num_complex::Complex64;
use rand::Rng;
use rand::rngs::StdRng;

use qfast_linalg::{
    CMatrix, dexpmv, expm, identity, kron, norder_paulis, pauli_projection, pauli_sum,
    permutation_matrix, unitary_from_pauli_coefs,
};

use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::{Gate, Location};
use crate::model::ModelStrategy;

/// A map from a real parameter vector to an `n`-qubit operator.
pub trait ParameterizedGate: Send + Sync {
    /// Length of the parameter vector.
    fn num_params(&self) -> usize;

    /// Operator at `x`.
    fn matrix(&self, x: &[f64]) -> DecomposeResult<CMatrix>;

    /// Operator at `x` and its partial derivative along every parameter.
    fn matrix_and_jacobian(&self, x: &[f64]) -> DecomposeResult<(CMatrix, Vec<CMatrix>)>;

    /// Location the gate currently acts on.
    fn location(&self, x: &[f64]) -> Location;

    /// Fresh starting parameters.
    fn initial_params(&self, rng: &mut StdRng) -> Vec<f64>;
}

/// `-i / 2^n`, the generator scale shared by every gate of a model.
#[inline]
fn generator_scale(num_qubits: usize) -> Complex64 {
    Complex64::new(0.0, -1.0 / (1u64 << num_qubits) as f64)
}

/// Basis elements multiplied by the generator scale.
fn scaled_basis(basis: impl IntoIterator<Item = CMatrix>, scale: Complex64) -> Arc<[CMatrix]> {
    basis.into_iter().map(|sigma| sigma * scale).collect()
}

fn check_len(x: &[f64], expected: usize) -> DecomposeResult<()> {
    if x.len() != expected {
        return Err(DecomposeError::InvalidConfig(format!(
            "gate expects {expected} parameters, got {}",
            x.len()
        )));
    }
    Ok(())
}

fn random_alpha(len: usize, rng: &mut StdRng) -> Vec<f64> {
    (0..len).map(|_| rng.r#gen::<f64>()).collect()
}

/// `P (A ⊗ I) Pᵗ`.
fn relocate(perm: &CMatrix, a: &CMatrix, pad: &CMatrix) -> CMatrix {
    perm * kron(a, pad) * perm.transpose()
}

/// How a gate's generators reach the full register.
#[derive(Debug, Clone)]
enum Embedding {
    /// `n`-qubit generators `-i/2^n · σ` projected onto the location.
    Projected { sigmav: Arc<[CMatrix]> },
    /// `k`-qubit generators relocated with a permutation matrix.
    Permuted {
        sigma: Arc<[CMatrix]>,
        perm: Arc<CMatrix>,
    },
}

impl Embedding {
    fn build(
        strategy: ModelStrategy,
        num_qubits: usize,
        location: &Location,
    ) -> DecomposeResult<Self> {
        let scale = generator_scale(num_qubits);
        Ok(match strategy {
            ModelStrategy::SoftPauli => Embedding::Projected {
                sigmav: scaled_basis(pauli_projection(num_qubits, location.qubits())?, scale),
            },
            ModelStrategy::Permutation => Embedding::Permuted {
                sigma: scaled_basis(norder_paulis(location.len()).iter().cloned(), scale),
                perm: Arc::new(permutation_matrix(num_qubits, location.qubits())?),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// FixedGate
// ---------------------------------------------------------------------------

/// Gate with a fixed location; parameters are the Pauli coefficients.
#[derive(Debug, Clone)]
pub struct FixedGate {
    num_qubits: usize,
    gate_size: usize,
    location: Location,
    embedding: Embedding,
}

impl FixedGate {
    /// Build a gate of `gate_size` qubits at `location` of a `num_qubits` register.
    pub fn new(
        num_qubits: usize,
        gate_size: usize,
        location: Location,
        strategy: ModelStrategy,
    ) -> DecomposeResult<Self> {
        validate_sizes(num_qubits, gate_size)?;
        validate_location(&location, num_qubits, gate_size)?;
        let embedding = Embedding::build(strategy, num_qubits, &location)?;
        Ok(Self {
            num_qubits,
            gate_size,
            location,
            embedding,
        })
    }

    /// Location of the gate.
    pub fn fixed_location(&self) -> &Location {
        &self.location
    }

    /// Number of qubits the gate acts on.
    pub fn gate_size(&self) -> usize {
        self.gate_size
    }

    /// The gate's own `2^k x 2^k` unitary at `alpha`.
    pub fn gate_matrix(&self, alpha: &[f64]) -> DecomposeResult<CMatrix> {
        check_len(alpha, self.num_params())?;
        let dim = (1u64 << self.num_qubits) as f64;
        let coefs: Vec<f64> = alpha.iter().map(|a| -a / dim).collect();
        Ok(unitary_from_pauli_coefs(&coefs)?)
    }

    /// Finalized [`Gate`] value at `alpha`.
    pub fn to_gate(&self, alpha: &[f64]) -> DecomposeResult<Gate> {
        Gate::new(self.gate_matrix(alpha)?, self.location.clone())
    }

    fn pad(&self) -> CMatrix {
        identity(1 << (self.num_qubits - self.gate_size))
    }
}

impl ParameterizedGate for FixedGate {
    fn num_params(&self) -> usize {
        1 << (2 * self.gate_size)
    }

    fn matrix(&self, x: &[f64]) -> DecomposeResult<CMatrix> {
        check_len(x, self.num_params())?;
        match &self.embedding {
            Embedding::Projected { sigmav } => Ok(expm(&pauli_sum(x, sigmav)?)?),
            Embedding::Permuted { sigma, perm } => {
                let u = expm(&pauli_sum(x, sigma)?)?;
                Ok(relocate(perm, &u, &self.pad()))
            }
        }
    }

    fn matrix_and_jacobian(&self, x: &[f64]) -> DecomposeResult<(CMatrix, Vec<CMatrix>)> {
        check_len(x, self.num_params())?;
        match &self.embedding {
            Embedding::Projected { sigmav } => Ok(dexpmv(&pauli_sum(x, sigmav)?, sigmav)?),
            Embedding::Permuted { sigma, perm } => {
                let (u, du) = dexpmv(&pauli_sum(x, sigma)?, sigma)?;
                let pad = self.pad();
                let jac = du.iter().map(|d| relocate(perm, d, &pad)).collect();
                Ok((relocate(perm, &u, &pad), jac))
            }
        }
    }

    fn location(&self, _x: &[f64]) -> Location {
        self.location.clone()
    }

    fn initial_params(&self, rng: &mut StdRng) -> Vec<f64> {
        random_alpha(self.num_params(), rng)
    }
}

// ---------------------------------------------------------------------------
// GenericGate
// ---------------------------------------------------------------------------

/// Gate whose location is a softmax mixture over candidate locations.
///
/// Parameters are `α ++ l`: the shared Pauli coefficients followed by one
/// logit per *live* candidate. The live set is an owned index list into
/// the candidate table so that search states can be saved and restored
/// with [`live`](Self::live) and [`set_live`](Self::set_live).
#[derive(Debug, Clone)]
pub struct GenericGate {
    num_qubits: usize,
    gate_size: usize,
    strategy: ModelStrategy,
    temperature: f64,
    candidates: Vec<Location>,
    embeddings: Vec<Embedding>,
    live: Vec<usize>,
}

impl GenericGate {
    /// Build a head gate over `candidates`.
    pub fn new(
        num_qubits: usize,
        gate_size: usize,
        candidates: Vec<Location>,
        strategy: ModelStrategy,
        temperature: f64,
    ) -> DecomposeResult<Self> {
        validate_sizes(num_qubits, gate_size)?;
        if candidates.is_empty() {
            return Err(DecomposeError::NoLocations { gate_size });
        }
        for location in &candidates {
            validate_location(location, num_qubits, gate_size)?;
        }
        let embeddings = candidates
            .iter()
            .map(|location| Embedding::build(strategy, num_qubits, location))
            .collect::<DecomposeResult<Vec<_>>>()?;
        let live = (0..candidates.len()).collect();
        Ok(Self {
            num_qubits,
            gate_size,
            strategy,
            temperature,
            candidates,
            embeddings,
            live,
        })
    }

    /// Every candidate location, live or not.
    pub fn candidates(&self) -> &[Location] {
        &self.candidates
    }

    /// Indices of the live candidates.
    pub fn live(&self) -> &[usize] {
        &self.live
    }

    /// Restore a live set previously read with [`live`](Self::live).
    pub fn set_live(&mut self, live: Vec<usize>) -> DecomposeResult<()> {
        if live.is_empty() || live.iter().any(|&i| i >= self.candidates.len()) {
            return Err(DecomposeError::InvalidConfig(format!(
                "live set {live:?} is not a non-empty subset of {} candidates",
                self.candidates.len()
            )));
        }
        self.live = live;
        Ok(())
    }

    /// Live candidate locations in order.
    pub fn live_locations(&self) -> impl Iterator<Item = &Location> + '_ {
        self.live.iter().map(|&i| &self.candidates[i])
    }

    /// Remove `location` from the live set.
    ///
    /// The last live candidate is never removed.
    pub fn restrict(&mut self, location: &Location) {
        if self.live.len() <= 1 {
            return;
        }
        self.live.retain(|&i| &self.candidates[i] != location);
    }

    /// Make every candidate live again.
    pub fn lift_restrictions(&mut self) {
        self.live = (0..self.candidates.len()).collect();
    }

    /// True when at most one candidate is live.
    pub fn cannot_restrict(&self) -> bool {
        self.live.len() <= 1
    }

    /// Softmax temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Number of Pauli coefficients.
    pub fn num_alpha(&self) -> usize {
        1 << (2 * self.gate_size)
    }

    /// The Pauli-coefficient block of `x`.
    pub fn alpha<'a>(&self, x: &'a [f64]) -> &'a [f64] {
        &x[..self.num_alpha().min(x.len())]
    }

    /// Live candidate at `argmax(l)`.
    pub fn chosen_location(&self, x: &[f64]) -> Location {
        let logits = &x[self.num_alpha().min(x.len())..];
        let best = argmax(logits);
        self.candidates[self.live[best.min(self.live.len() - 1)]].clone()
    }

    /// Convert into a [`FixedGate`] at `location`, reusing its generators.
    pub fn freeze(&self, location: &Location) -> DecomposeResult<FixedGate> {
        let index = self
            .candidates
            .iter()
            .position(|c| c == location)
            .ok_or_else(|| DecomposeError::InvalidLocation {
                location: location.qubits().to_vec(),
                num_qubits: self.num_qubits,
            })?;
        Ok(FixedGate {
            num_qubits: self.num_qubits,
            gate_size: self.gate_size,
            location: location.clone(),
            embedding: self.embeddings[index].clone(),
        })
    }

    /// Embedding strategy of the gate.
    pub fn strategy(&self) -> ModelStrategy {
        self.strategy
    }

    fn weights(&self, logits: &[f64]) -> Vec<f64> {
        softmax(logits, self.temperature)
    }

    fn pad(&self) -> CMatrix {
        identity(1 << (self.num_qubits - self.gate_size))
    }

    fn evaluate(&self, x: &[f64], with_jacobian: bool) -> DecomposeResult<(CMatrix, Vec<CMatrix>)> {
        check_len(x, self.num_params())?;
        let (alpha, logits) = x.split_at(self.num_alpha());
        let w = self.weights(logits);
        let t = self.temperature;

        match self.strategy {
            ModelStrategy::SoftPauli => {
                let mut per_location = Vec::with_capacity(self.live.len());
                let mut h = CMatrix::zeros(1 << self.num_qubits, 1 << self.num_qubits);
                for (&i, &wi) in self.live.iter().zip(&w) {
                    let Embedding::Projected { sigmav } = &self.embeddings[i] else {
                        return Err(embedding_mismatch());
                    };
                    let a = pauli_sum(alpha, sigmav)?;
                    h += &a * Complex64::new(wi, 0.0);
                    per_location.push(a);
                }
                if !with_jacobian {
                    return Ok((expm(&h)?, Vec::new()));
                }

                let mut tangents = Vec::with_capacity(self.num_params());
                for p in 0..self.num_alpha() {
                    let mut d = CMatrix::zeros(h.nrows(), h.ncols());
                    for (&i, &wi) in self.live.iter().zip(&w) {
                        if let Embedding::Projected { sigmav } = &self.embeddings[i] {
                            d += &sigmav[p] * Complex64::new(wi, 0.0);
                        }
                    }
                    tangents.push(d);
                }
                // ∂H/∂l_m = T w_m (A_m - H)
                for (a, &wm) in per_location.iter().zip(&w) {
                    tangents.push((a - &h) * Complex64::new(t * wm, 0.0));
                }
                Ok(dexpmv(&h, &tangents)?)
            }
            ModelStrategy::Permutation => {
                let Embedding::Permuted { sigma, .. } = &self.embeddings[self.live[0]] else {
                    return Err(embedding_mismatch());
                };
                let pad = self.pad();
                let dim = 1usize << self.num_qubits;
                let mut perm = CMatrix::zeros(dim, dim);
                let mut perms = Vec::with_capacity(self.live.len());
                for (&i, &wi) in self.live.iter().zip(&w) {
                    let Embedding::Permuted { perm: p, .. } = &self.embeddings[i] else {
                        return Err(embedding_mismatch());
                    };
                    perm += &**p * Complex64::new(wi, 0.0);
                    perms.push(Arc::clone(p));
                }

                let hs = pauli_sum(alpha, sigma)?;
                if !with_jacobian {
                    return Ok((relocate(&perm, &expm(&hs)?, &pad), Vec::new()));
                }

                let (u, du) = dexpmv(&hs, sigma)?;
                let big = kron(&u, &pad);
                let perm_t = perm.transpose();
                let m = &perm * &big * &perm_t;

                let mut jac: Vec<CMatrix> = du.iter().map(|d| relocate(&perm, d, &pad)).collect();
                // ∂M/∂l_m = T w_m (P_m B Pᵗ + P B P_mᵗ - 2 M)
                let big_perm_t = &big * &perm_t;
                let perm_big = &perm * &big;
                for (p_m, &wm) in perms.iter().zip(&w) {
                    let term = &**p_m * &big_perm_t + &perm_big * p_m.transpose()
                        - &m * Complex64::new(2.0, 0.0);
                    jac.push(term * Complex64::new(t * wm, 0.0));
                }
                Ok((m, jac))
            }
        }
    }
}

impl ParameterizedGate for GenericGate {
    fn num_params(&self) -> usize {
        self.num_alpha() + self.live.len()
    }

    fn matrix(&self, x: &[f64]) -> DecomposeResult<CMatrix> {
        self.evaluate(x, false).map(|(m, _)| m)
    }

    fn matrix_and_jacobian(&self, x: &[f64]) -> DecomposeResult<(CMatrix, Vec<CMatrix>)> {
        self.evaluate(x, true)
    }

    fn location(&self, x: &[f64]) -> Location {
        self.chosen_location(x)
    }

    fn initial_params(&self, rng: &mut StdRng) -> Vec<f64> {
        let mut x = random_alpha(self.num_alpha(), rng);
        x.resize(self.num_params(), 0.0);
        x
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn embedding_mismatch() -> DecomposeError {
    DecomposeError::InvalidConfig("gate embeddings disagree with the model strategy".into())
}

fn validate_sizes(num_qubits: usize, gate_size: usize) -> DecomposeResult<()> {
    if gate_size == 0 || gate_size > num_qubits {
        return Err(DecomposeError::InvalidGateSize {
            gate_size,
            num_qubits,
        });
    }
    Ok(())
}

fn validate_location(location: &Location, num_qubits: usize, gate_size: usize) -> DecomposeResult<()> {
    location.validate(num_qubits)?;
    if location.len() != gate_size {
        return Err(DecomposeError::LocationMismatch {
            dim: 1 << gate_size,
            location: location.qubits().to_vec(),
        });
    }
    Ok(())
}

/// `exp(β (x - max x)) / Σ exp(β (x - max x))`.
pub(crate) fn softmax(x: &[f64], beta: f64) -> Vec<f64> {
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = x.iter().map(|v| (beta * (v - max)).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Index of the first maximum.
fn argmax(x: &[f64]) -> usize {
    x.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
