//! A circuit model with a caller-supplied structure.
//!
//! [`FixedModel`] skips the location search entirely: it places one
//! [`FixedGate`] at each location of the structure, in application order,
//! and fits all Pauli coefficients with a single fine optimization. Use it
//! when the gate layout is already known and only the gates themselves need
//! to be instantiated.
//!
//! ```ignore
//! let structure = vec![Location::new(vec![0, 1]), Location::new(vec![1, 2])];
//! let mut model = FixedModel::builder(target, 2, structure).with_seed(3).build()?;
//! let gates = model.solve()?;
//! ```

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use qfast_linalg::{CMatrix, identity, qubit_count, trace_of_product, unitarity_deviation};

use crate::cancel::CancelToken;
use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::{GATE_UNITARY_TOLERANCE, Gate, Location};
use crate::model::circuit::chain_objective;
use crate::model::gates::{FixedGate, ParameterizedGate};
use crate::model::{DecompositionModel, ModelOptions, ModelStrategy, PartialSolutionCallback};
use crate::optimizer::{LbfgsOptimizer, Optimizer};

/// Registry name of [`FixedModel`].
pub const FIXED_MODEL_NAME: &str = "FixedModel";

/// Builder for [`FixedModel`].
pub struct FixedModelBuilder {
    target: CMatrix,
    gate_size: usize,
    structure: Vec<Location>,
    strategy: ModelStrategy,
    options: ModelOptions,
    optimizer: Arc<dyn Optimizer>,
    seed: u64,
    callback: Option<PartialSolutionCallback>,
    cancel: CancelToken,
}

impl FixedModelBuilder {
    /// Embedding used for every gate.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ModelStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Success threshold; the other fields are unused.
    #[must_use]
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Called with the gate list when the fit succeeds.
    #[must_use]
    pub fn with_callback(mut self, callback: PartialSolutionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> DecomposeResult<FixedModel> {
        let num_qubits = qubit_count(&self.target)?;
        let deviation = unitarity_deviation(&self.target);
        if deviation > GATE_UNITARY_TOLERANCE {
            return Err(DecomposeError::NotUnitary {
                deviation,
                tolerance: GATE_UNITARY_TOLERANCE,
            });
        }
        if self.structure.is_empty() {
            return Err(DecomposeError::NoLocations {
                gate_size: self.gate_size,
            });
        }
        self.options.validate()?;

        let gates = self
            .structure
            .into_iter()
            .map(|location| FixedGate::new(num_qubits, self.gate_size, location, self.strategy))
            .collect::<DecomposeResult<Vec<_>>>()?;
        let mut param_ranges = Vec::with_capacity(gates.len() + 1);
        param_ranges.push(0);
        for gate in &gates {
            param_ranges.push(param_ranges[param_ranges.len() - 1] + gate.num_params());
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let x = gates.iter().flat_map(|g| g.initial_params(&mut rng)).collect();
        Ok(FixedModel {
            target_adjoint: self.target.adjoint(),
            num_qubits,
            gates,
            param_ranges,
            x,
            options: self.options,
            optimizer: self.optimizer,
            callback: self.callback,
            cancel: self.cancel,
        })
    }
}

/// A gate chain at fixed locations, instantiated by one fine optimization.
pub struct FixedModel {
    target_adjoint: CMatrix,
    num_qubits: usize,
    gates: Vec<FixedGate>,
    param_ranges: Vec<usize>,
    x: Vec<f64>,
    options: ModelOptions,
    optimizer: Arc<dyn Optimizer>,
    callback: Option<PartialSolutionCallback>,
    cancel: CancelToken,
}

impl fmt::Debug for FixedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedModel")
            .field("num_qubits", &self.num_qubits)
            .field("depth", &self.gates.len())
            .field("optimizer", &self.optimizer.name())
            .finish_non_exhaustive()
    }
}

impl FixedModel {
    /// Model of `target` with one `gate_size`-qubit gate per entry of
    /// `structure`, applied in order.
    pub fn builder(target: CMatrix, gate_size: usize, structure: Vec<Location>) -> FixedModelBuilder {
        FixedModelBuilder {
            target,
            gate_size,
            structure,
            strategy: ModelStrategy::Permutation,
            options: ModelOptions::default(),
            optimizer: Arc::new(LbfgsOptimizer::new()),
            seed: 0,
            callback: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Number of gates.
    pub fn depth(&self) -> usize {
        self.gates.len()
    }

    /// Gate locations in application order.
    pub fn structure(&self) -> impl Iterator<Item = &Location> + '_ {
        self.gates.iter().map(FixedGate::fixed_location)
    }

    pub fn num_params(&self) -> usize {
        self.param_ranges[self.gates.len()]
    }

    /// Current parameter vector.
    pub fn params(&self) -> &[f64] {
        &self.x
    }

    /// Operator of the chain at `x`.
    pub fn matrix(&self, x: &[f64]) -> DecomposeResult<CMatrix> {
        self.check_params(x)?;
        let mut total = identity(self.target_adjoint.nrows());
        for (i, gate) in self.gates.iter().enumerate() {
            total = gate.matrix(self.slice(x, i))? * total;
        }
        Ok(total)
    }

    /// `(-Re Tr(U† M(x)), gradient)`.
    pub fn objective(&self, x: &[f64]) -> DecomposeResult<(f64, Vec<f64>)> {
        self.check_params(x)?;
        let evaluated = self
            .gates
            .iter()
            .enumerate()
            .map(|(i, gate)| gate.matrix_and_jacobian(self.slice(x, i)))
            .collect::<DecomposeResult<Vec<_>>>()?;
        Ok(chain_objective(&evaluated, &self.target_adjoint, &self.param_ranges))
    }

    /// `1 - |Tr(U† M)| / N` at the current parameters.
    pub fn distance(&self) -> DecomposeResult<f64> {
        let m = self.matrix(&self.x)?;
        let overlap = trace_of_product(&self.target_adjoint, &m).norm();
        Ok(1.0 - overlap / m.nrows() as f64)
    }

    /// Whether the distance is below the success threshold.
    pub fn success(&self) -> DecomposeResult<bool> {
        Ok(self.distance()? < self.options.success_threshold)
    }

    /// The chain as [`Gate`] values at the current parameters.
    pub fn gate_list(&self) -> DecomposeResult<Vec<Gate>> {
        self.gates
            .iter()
            .enumerate()
            .map(|(i, gate)| gate.to_gate(self.slice(&self.x, i)))
            .collect()
    }

    /// Fit every gate with one fine optimization.
    ///
    /// The gates are returned even when the fit misses the success
    /// threshold; the partial-solution callback only sees successful fits.
    pub fn solve(&mut self) -> DecomposeResult<Vec<Gate>> {
        if self.cancel.is_cancelled() {
            return Err(DecomposeError::Cancelled);
        }
        let optimizer = Arc::clone(&self.optimizer);
        let cancel = self.cancel.clone();
        let minimum = {
            let mut objective = |x: &[f64]| self.objective(x);
            optimizer.minimize_fine(&mut objective, &self.x, &cancel)?
        };
        if minimum.x.len() != self.x.len() {
            return Err(DecomposeError::NumericalDegeneracy(format!(
                "optimizer '{}' returned {} parameters, expected {}",
                optimizer.name(),
                minimum.x.len(),
                self.x.len()
            )));
        }
        self.x = minimum.x;

        let distance = self.distance()?;
        let gates = self.gate_list()?;
        if distance < self.options.success_threshold {
            info!(depth = gates.len(), distance, "fixed model instantiated");
            if let Some(callback) = &self.callback {
                callback(&gates);
            }
        } else {
            warn!(
                depth = gates.len(),
                distance,
                threshold = self.options.success_threshold,
                "fixed structure did not reach the success threshold"
            );
        }
        Ok(gates)
    }

    fn slice<'a>(&self, x: &'a [f64], index: usize) -> &'a [f64] {
        &x[self.param_ranges[index]..self.param_ranges[index + 1]]
    }

    fn check_params(&self, x: &[f64]) -> DecomposeResult<()> {
        if x.len() != self.num_params() {
            return Err(DecomposeError::InvalidConfig(format!(
                "expected {} parameters, got {}",
                self.num_params(),
                x.len()
            )));
        }
        Ok(())
    }
}

impl DecompositionModel for FixedModel {
    fn solve(&mut self) -> DecomposeResult<Vec<Gate>> {
        FixedModel::solve(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qfast_linalg::{Complex64, kron};
    use std::sync::Mutex;

    fn loc(q: &[usize]) -> Location {
        Location::from(q)
    }

    fn cnot() -> CMatrix {
        let mut m = CMatrix::zeros(4, 4);
        for (r, c) in [(0, 0), (1, 1), (2, 3), (3, 2)] {
            m[(r, c)] = Complex64::new(1.0, 0.0);
        }
        m
    }

    #[test]
    fn test_single_gate_structure_is_solved() {
        let target = kron(&cnot(), &identity(2));
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let mut model = FixedModel::builder(target.clone(), 2, vec![loc(&[0, 1])])
            .with_seed(5)
            .with_callback(Arc::new(move |gates: &[Gate]| {
                *counter.lock().unwrap() = gates.len();
            }))
            .build()
            .unwrap();
        let gates = model.solve().unwrap();

        assert_eq!(gates.len(), 1);
        assert_eq!(gates[0].location(), &loc(&[0, 1]));
        assert!(model.success().unwrap());
        assert_eq!(*seen.lock().unwrap(), 1);

        let product = crate::gate::circuit_unitary(&gates, 3).unwrap();
        let overlap = trace_of_product(&target.adjoint(), &product).norm() / 8.0;
        assert!(1.0 - overlap < 1e-3);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        for strategy in [ModelStrategy::SoftPauli, ModelStrategy::Permutation] {
            let target = kron(&identity(2), &cnot());
            let model = FixedModel::builder(target, 2, vec![loc(&[0, 1]), loc(&[2, 1])])
                .with_strategy(strategy)
                .with_seed(2)
                .build()
                .unwrap();
            assert_eq!(model.num_params(), 32);
            let x: Vec<f64> = model.params().iter().map(|v| v * 30.0).collect();

            let (_, grad) = model.objective(&x).unwrap();
            let h = 1e-6;
            for i in 0..x.len() {
                let mut plus = x.clone();
                let mut minus = x.clone();
                plus[i] += h;
                minus[i] -= h;
                let fd = (model.objective(&plus).unwrap().0 - model.objective(&minus).unwrap().0)
                    / (2.0 * h);
                assert!((fd - grad[i]).abs() < 1e-5, "{strategy:?} param {i}: {fd} vs {}", grad[i]);
            }
        }
    }

    #[test]
    fn test_structure_is_kept_in_order() {
        let structure = vec![loc(&[1, 2]), loc(&[0, 1]), loc(&[1, 2])];
        let model = FixedModel::builder(identity(8), 2, structure.clone()).build().unwrap();
        assert_eq!(model.depth(), 3);
        assert_eq!(model.structure().cloned().collect::<Vec<_>>(), structure);
        assert_eq!(model.gate_list().unwrap().len(), 3);
    }

    #[test]
    fn test_builder_validation() {
        let err = FixedModel::builder(identity(8), 2, Vec::new()).build().unwrap_err();
        assert!(matches!(err, DecomposeError::NoLocations { gate_size: 2 }));

        let err = FixedModel::builder(identity(8), 2, vec![loc(&[0, 1, 2])]).build().unwrap_err();
        assert!(matches!(err, DecomposeError::LocationMismatch { .. }));

        let bad = identity(8) * Complex64::new(0.5, 0.0);
        let err = FixedModel::builder(bad, 2, vec![loc(&[0, 1])]).build().unwrap_err();
        assert!(matches!(err, DecomposeError::NotUnitary { .. }));
    }

    #[test]
    fn test_cancelled_solve() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut model = FixedModel::builder(identity(8), 2, vec![loc(&[0, 1])])
            .with_cancel_token(cancel)
            .build()
            .unwrap();
        assert!(matches!(model.solve(), Err(DecomposeError::Cancelled)));
    }
}
