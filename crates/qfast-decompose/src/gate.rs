//! Immutable gate values produced by the decomposer.
//!
//! A [`Gate`] pairs a `2^k x 2^k` unitary with the [`Location`] (ordered
//! qubit tuple) it acts on. Gate lists are always kept in application
//! order: the circuit operator of `[g_0, g_1, …]` is `… g_1 · g_0`.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use qfast_linalg::{CMatrix, Complex64, embed_operator, identity, qubits_for_dim, unitarity_deviation};

use crate::error::{DecomposeError, DecomposeResult};

/// Largest unitarity deviation accepted for a gate or a sub-problem target.
pub const GATE_UNITARY_TOLERANCE: f64 = 1e-10;

/// Ordered tuple of distinct qubit indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(Vec<usize>);

impl Location {
    /// Wrap a qubit list without validation.
    pub fn new(qubits: Vec<usize>) -> Self {
        Self(qubits)
    }

    /// The canonical location `(0, 1, …, n-1)`.
    pub fn identity(num_qubits: usize) -> Self {
        Self((0..num_qubits).collect())
    }

    /// Qubit indices in order.
    #[inline]
    pub fn qubits(&self) -> &[usize] {
        &self.0
    }

    /// Number of qubits.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty tuple.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `qubit` belongs to this location.
    #[inline]
    pub fn contains(&self, qubit: usize) -> bool {
        self.0.contains(&qubit)
    }

    /// Whether this is `(0, 1, …, len-1)`.
    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &q)| i == q)
    }

    /// Check the tuple is non-empty, distinct and inside a `num_qubits` register.
    pub fn validate(&self, num_qubits: usize) -> DecomposeResult<()> {
        if self.0.is_empty() || !self.0.iter().all_unique() || self.0.iter().any(|&q| q >= num_qubits) {
            return Err(DecomposeError::InvalidLocation {
                location: self.0.clone(),
                num_qubits,
            });
        }
        Ok(())
    }

    /// Translate sub-register indices through a parent location.
    ///
    /// Index `i` of a sub-problem solved on `parent` refers to qubit
    /// `parent[i]` of the enclosing register.
    pub fn remap(&self, parent: &Location) -> DecomposeResult<Location> {
        self.0
            .iter()
            .map(|&q| parent.0.get(q).copied())
            .collect::<Option<Vec<_>>>()
            .map(Location)
            .ok_or_else(|| DecomposeError::InvalidLocation {
                location: self.0.clone(),
                num_qubits: parent.len(),
            })
    }
}

impl From<Vec<usize>> for Location {
    fn from(qubits: Vec<usize>) -> Self {
        Self(qubits)
    }
}

impl From<&[usize]> for Location {
    fn from(qubits: &[usize]) -> Self {
        Self(qubits.to_vec())
    }
}

impl AsRef<[usize]> for Location {
    fn as_ref(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}

/// A unitary acting on a qubit location.
#[derive(Debug, Clone)]
pub struct Gate {
    unitary: CMatrix,
    location: Location,
}

impl Gate {
    /// Validate and build a gate.
    ///
    /// The matrix must be `2^|location|` square and unitary within
    /// [`GATE_UNITARY_TOLERANCE`]; the location must not repeat a qubit.
    pub fn new(unitary: CMatrix, location: impl Into<Location>) -> DecomposeResult<Self> {
        let location = location.into();
        location.validate(usize::MAX)?;

        let dim = unitary.nrows();
        let width = qubits_for_dim(dim).ok();
        if !unitary.is_square() || width != Some(location.len()) {
            return Err(DecomposeError::LocationMismatch {
                dim,
                location: location.0,
            });
        }

        let deviation = unitarity_deviation(&unitary);
        if deviation > GATE_UNITARY_TOLERANCE {
            return Err(DecomposeError::NotUnitary {
                deviation,
                tolerance: GATE_UNITARY_TOLERANCE,
            });
        }
        Ok(Self { unitary, location })
    }

    /// The gate's own `2^k x 2^k` matrix.
    #[inline]
    pub fn unitary(&self) -> &CMatrix {
        &self.unitary
    }

    /// Qubits the gate acts on.
    #[inline]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Number of qubits the gate acts on.
    #[inline]
    pub fn num_qubits(&self) -> usize {
        self.location.len()
    }

    /// Same matrix, location translated through `parent`.
    pub fn relocated(&self, parent: &Location) -> DecomposeResult<Gate> {
        Ok(Gate {
            unitary: self.unitary.clone(),
            location: self.location.remap(parent)?,
        })
    }

    /// The gate lifted onto a `num_qubits` register.
    pub fn embedded(&self, num_qubits: usize) -> DecomposeResult<CMatrix> {
        self.location.validate(num_qubits)?;
        Ok(embed_operator(&self.unitary, num_qubits, self.location.qubits())?)
    }

    /// Serializable form.
    pub fn to_record(&self) -> GateRecord {
        let unitary = self
            .unitary
            .row_iter()
            .map(|row| row.iter().map(|z| [z.re, z.im]).collect())
            .collect();
        GateRecord {
            location: self.location.clone(),
            unitary,
        }
    }

    /// Rebuild and validate a gate from its serialized form.
    pub fn from_record(record: GateRecord) -> DecomposeResult<Gate> {
        let dim = record.unitary.len();
        let mut unitary = CMatrix::zeros(dim, dim);
        for (r, row) in record.unitary.iter().enumerate() {
            if row.len() != dim {
                return Err(DecomposeError::LocationMismatch {
                    dim,
                    location: record.location.0.clone(),
                });
            }
            for (c, [re, im]) in row.iter().enumerate() {
                unitary[(r, c)] = Complex64::new(*re, *im);
            }
        }
        Gate::new(unitary, record.location)
    }
}

/// JSON-friendly gate: location plus matrix rows of `[re, im]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    /// Qubits the gate acts on.
    pub location: Location,
    /// Row-major matrix entries.
    pub unitary: Vec<Vec<[f64; 2]>>,
}

/// Operator of an ordered gate list on a `num_qubits` register.
pub fn circuit_unitary(gates: &[Gate], num_qubits: usize) -> DecomposeResult<CMatrix> {
    let mut total = identity(1 << num_qubits);
    for gate in gates {
        total = gate.embedded(num_qubits)? * total;
    }
    Ok(total)
}
