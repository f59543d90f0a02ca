//! The circuit model and its structure search.
//!
//! A [`CircuitModel`] represents the target as `head · F_{m-1} ⋯ F_0`,
//! where every `F_i` is a [`FixedGate`] and `head` is the single
//! [`GenericGate`] still free to choose its location. The objective is
//!
//! ```text
//! f(x) = -Re Tr(U† M(x))
//! ```
//!
//! whose gradient follows from the chain rule with prefix and suffix
//! products of the gate matrices. The structure search alternates coarse
//! optimization with three moves:
//!
//! - **expand**: freeze the head at its chosen location and add a new head
//! - **restrict**: drop the chosen location from the head's candidates
//! - **exhausted expand**: once nothing can be restricted, expand at the
//!   rejected location that reached the smallest distance
//!
//! # Example
//!
//! ```ignore
//! let mut model = CircuitModel::builder(target, 2, locations)
//!     .with_strategy(ModelStrategy::Permutation)
//!     .with_seed(7)
//!     .build()?;
//! let gates = model.solve()?;
//! ```

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, trace};

use qfast_linalg::{CMatrix, identity, qubit_count, trace_of_product, unitarity_deviation};

use crate::cancel::CancelToken;
use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::{GATE_UNITARY_TOLERANCE, Gate, Location};
use crate::model::gates::{FixedGate, GenericGate, ParameterizedGate};
use crate::model::{ModelOptions, ModelStrategy};
use crate::optimizer::{LbfgsOptimizer, Optimizer};

/// Receives the committed gate list whenever a model reaches success.
pub type PartialSolutionCallback = Arc<dyn Fn(&[Gate]) + Send + Sync>;

/// Anything that can turn its target into an ordered gate list.
pub trait DecompositionModel: Send {
    /// Run the search to completion.
    fn solve(&mut self) -> DecomposeResult<Vec<Gate>>;
}

/// Where the structure search stands after the last [`CircuitModel::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchState {
    /// Nothing has been tried yet.
    Searching,
    /// Distance dropped enough; the head was frozen and a new one added.
    Progressed,
    /// The chosen location was removed from the head's candidates.
    Restricted,
    /// No candidate was left to remove; expanded at the best rejected location.
    Exhausted,
    /// The head is being frozen and polished.
    Finalizing,
    /// The model matches the target; gates are available.
    Done,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`CircuitModel`].
pub struct CircuitModelBuilder {
    target: CMatrix,
    gate_size: usize,
    locations: Vec<Location>,
    strategy: ModelStrategy,
    options: ModelOptions,
    optimizer: Arc<dyn Optimizer>,
    seed: u64,
    callback: Option<PartialSolutionCallback>,
    cancel: CancelToken,
}

impl CircuitModelBuilder {
    /// Embedding strategy (default [`ModelStrategy::Permutation`]).
    #[must_use]
    pub fn with_strategy(mut self, strategy: ModelStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Search thresholds and temperature.
    #[must_use]
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Optimizer used for every coarse and fine run.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Seed of the parameter initializer.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Callback fired on success with the committed gate list.
    #[must_use]
    pub fn with_callback(mut self, callback: PartialSolutionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Token checked before every step and inside the optimizer.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate the inputs and build the model.
    pub fn build(self) -> DecomposeResult<CircuitModel> {
        let num_qubits = qubit_count(&self.target)?;
        let deviation = unitarity_deviation(&self.target);
        if deviation > GATE_UNITARY_TOLERANCE {
            return Err(DecomposeError::NotUnitary {
                deviation,
                tolerance: GATE_UNITARY_TOLERANCE,
            });
        }
        if self.gate_size == 0 || self.gate_size >= num_qubits {
            return Err(DecomposeError::InvalidGateSize {
                gate_size: self.gate_size,
                num_qubits,
            });
        }
        self.options.validate()?;

        let temperature = self.options.temperature_for(self.strategy);
        let head = GenericGate::new(
            num_qubits,
            self.gate_size,
            self.locations,
            self.strategy,
            temperature,
        )?;

        let target_adjoint = self.target.adjoint();
        let mut model = CircuitModel {
            target: self.target,
            target_adjoint,
            num_qubits,
            gate_size: self.gate_size,
            strategy: self.strategy,
            options: self.options,
            fixed: Vec::new(),
            head: Some(head),
            param_ranges: Vec::new(),
            x: Vec::new(),
            last_distance: 1.0,
            rejected: Vec::new(),
            state: SearchState::Searching,
            optimizer: self.optimizer,
            rng: StdRng::seed_from_u64(self.seed),
            callback: self.callback,
            cancel: self.cancel,
            solution: None,
        };
        model.reset_params();
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// CircuitModel
// ---------------------------------------------------------------------------

/// A chain of fixed gates topped by one location-searching head gate.
pub struct CircuitModel {
    target: CMatrix,
    target_adjoint: CMatrix,
    num_qubits: usize,
    gate_size: usize,
    strategy: ModelStrategy,
    options: ModelOptions,
    fixed: Vec<FixedGate>,
    head: Option<GenericGate>,
    /// `param_ranges[i]..param_ranges[i + 1]` is the slice of gate `i`.
    param_ranges: Vec<usize>,
    x: Vec<f64>,
    last_distance: f64,
    rejected: Vec<(Location, f64)>,
    state: SearchState,
    optimizer: Arc<dyn Optimizer>,
    rng: StdRng,
    callback: Option<PartialSolutionCallback>,
    cancel: CancelToken,
    solution: Option<Vec<Gate>>,
}

impl fmt::Debug for CircuitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitModel")
            .field("num_qubits", &self.num_qubits)
            .field("gate_size", &self.gate_size)
            .field("strategy", &self.strategy)
            .field("depth", &self.depth())
            .field("state", &self.state)
            .field("last_distance", &self.last_distance)
            .field("optimizer", &self.optimizer.name())
            .finish_non_exhaustive()
    }
}

impl CircuitModel {
    /// Start building a model of `target` with `gate_size`-qubit gates
    /// placed at any of `locations`.
    pub fn builder(target: CMatrix, gate_size: usize, locations: Vec<Location>) -> CircuitModelBuilder {
        CircuitModelBuilder {
            target,
            gate_size,
            locations,
            strategy: ModelStrategy::Permutation,
            options: ModelOptions::default(),
            optimizer: Arc::new(LbfgsOptimizer::new()),
            seed: 0,
            callback: None,
            cancel: CancelToken::new(),
        }
    }

    /// Width of the target.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Size of every gate in the chain.
    pub fn gate_size(&self) -> usize {
        self.gate_size
    }

    /// Embedding strategy.
    pub fn strategy(&self) -> ModelStrategy {
        self.strategy
    }

    /// Number of gates in the chain, head included.
    pub fn depth(&self) -> usize {
        self.fixed.len() + usize::from(self.head.is_some())
    }

    /// Total parameter count.
    pub fn num_params(&self) -> usize {
        self.param_ranges.last().copied().unwrap_or(0)
    }

    /// Current parameter vector.
    pub fn params(&self) -> &[f64] {
        &self.x
    }

    /// State reached by the last step.
    pub fn state(&self) -> SearchState {
        self.state
    }

    /// The head gate, absent once the model is finalized.
    pub fn head(&self) -> Option<&GenericGate> {
        self.head.as_ref()
    }

    /// Distance recorded at the last accepted expansion.
    pub fn last_distance(&self) -> f64 {
        self.last_distance
    }

    /// Rejected `(location, distance)` pairs since the last expansion.
    pub fn rejected(&self) -> &[(Location, f64)] {
        &self.rejected
    }

    /// Recompute the parameter layout and draw fresh parameters.
    pub fn reset_params(&mut self) {
        let mut ranges = Vec::with_capacity(self.depth() + 1);
        ranges.push(0);
        let mut x = Vec::new();
        for gate in Self::chain(&self.fixed, self.head.as_ref()) {
            x.extend(gate.initial_params(&mut self.rng));
            ranges.push(x.len());
        }
        self.param_ranges = ranges;
        self.x = x;
    }

    /// Operator of the chain at `x`.
    pub fn matrix(&self, x: &[f64]) -> DecomposeResult<CMatrix> {
        self.check_params(x)?;
        let mut total = identity(self.target.nrows());
        for (i, gate) in self.gates().enumerate() {
            total = gate.matrix(self.slice(x, i))? * total;
        }
        Ok(total)
    }

    /// Operator of the chain at `x` and its derivative per parameter.
    pub fn matrix_and_jacobian(&self, x: &[f64]) -> DecomposeResult<(CMatrix, Vec<CMatrix>)> {
        self.check_params(x)?;
        let evaluated = self.evaluate_gates(x)?;
        let prefixes = prefix_products(&evaluated, self.target.nrows());

        let mut jacobian = Vec::with_capacity(x.len());
        let mut suffix = identity(self.target.nrows());
        let mut blocks = Vec::with_capacity(evaluated.len());
        for (p, (m, dm)) in evaluated.iter().enumerate().rev() {
            blocks.push(dm.iter().map(|d| &suffix * d * &prefixes[p]).collect::<Vec<_>>());
            suffix = &suffix * m;
        }
        for block in blocks.into_iter().rev() {
            jacobian.extend(block);
        }
        let total = prefixes.last().cloned().unwrap_or_else(|| identity(self.target.nrows()));
        Ok((total, jacobian))
    }

    /// `(-Re Tr(U† M(x)), gradient)`.
    pub fn objective(&self, x: &[f64]) -> DecomposeResult<(f64, Vec<f64>)> {
        self.check_params(x)?;
        let evaluated = self.evaluate_gates(x)?;
        Ok(chain_objective(&evaluated, &self.target_adjoint, &self.param_ranges))
    }

    /// Minimize the objective from the current parameters.
    ///
    /// A run that stops without converging still updates the parameters;
    /// the search decides what to do with the resulting distance.
    pub fn optimize(&mut self, fine: bool) -> DecomposeResult<()> {
        let optimizer = Arc::clone(&self.optimizer);
        let cancel = self.cancel.clone();
        let x0 = std::mem::take(&mut self.x);
        let result = {
            let mut objective = |x: &[f64]| self.objective(x);
            if fine {
                optimizer.minimize_fine(&mut objective, &x0, &cancel)
            } else {
                optimizer.minimize_coarse(&mut objective, &x0, &cancel)
            }
        };
        let minimum = match result {
            Ok(minimum) => minimum,
            Err(err) => {
                self.x = x0;
                return Err(err);
            }
        };
        if !minimum.converged() {
            debug!(
                iterations = minimum.iterations,
                termination = ?minimum.termination,
                fine,
                "optimizer did not converge"
            );
        }
        if minimum.x.len() != x0.len() {
            self.x = x0;
            return Err(DecomposeError::NumericalDegeneracy(format!(
                "optimizer '{}' returned {} parameters, expected {}",
                optimizer.name(),
                minimum.x.len(),
                self.num_params()
            )));
        }
        self.x = minimum.x;
        Ok(())
    }

    /// `1 - |Tr(U† M)| / N` at the current parameters.
    pub fn distance(&self) -> DecomposeResult<f64> {
        let m = self.matrix(&self.x)?;
        let overlap = trace_of_product(&self.target_adjoint, &m).norm();
        Ok(1.0 - overlap / m.nrows() as f64)
    }

    /// Whether the distance is below the success threshold.
    ///
    /// On success the partial-solution callback receives the gate list.
    pub fn success(&self) -> DecomposeResult<bool> {
        let solved = self.distance()? < self.options.success_threshold;
        if solved {
            if let Some(callback) = &self.callback {
                callback(&self.gate_list()?);
            }
        }
        Ok(solved)
    }

    /// Whether the distance improved on `last_distance` by more than the
    /// progress threshold.
    pub fn progress(&self, last_distance: f64) -> DecomposeResult<bool> {
        Ok(last_distance - self.distance()? > self.options.progress_threshold)
    }

    /// Freeze the head at `location`, add a fresh head and reset parameters.
    pub fn expand(&mut self, location: &Location) -> DecomposeResult<()> {
        let head = self.head_mut()?;
        let frozen = head.freeze(location)?;
        head.lift_restrictions();
        self.fixed.push(frozen);
        self.reset_params();
        debug!(location = %location, depth = self.depth(), "expanded model");
        Ok(())
    }

    /// Remove `location` from the head's live candidates.
    pub fn restrict(&mut self, location: &Location) -> DecomposeResult<()> {
        self.head_mut()?.restrict(location);
        self.reset_params();
        trace!(location = %location, "restricted head");
        Ok(())
    }

    /// True when the head has a single live candidate left.
    pub fn cannot_restrict(&self) -> bool {
        self.head.as_ref().is_none_or(GenericGate::cannot_restrict)
    }

    /// Freeze the head at its chosen location seeded with its current
    /// coefficients, polish with one fine optimization and emit the gates.
    pub fn finalize(&mut self) -> DecomposeResult<Vec<Gate>> {
        self.state = SearchState::Finalizing;
        let Some(head) = self.head.take() else {
            return self.gate_list();
        };
        let start = self.param_ranges[self.fixed.len()];
        let location = head.chosen_location(&self.x[start..]);
        let alpha = head.alpha(&self.x[start..]).to_vec();

        self.fixed.push(head.freeze(&location)?);
        self.x.truncate(start);
        self.x.extend(alpha);
        if let Some(end) = self.param_ranges.last_mut() {
            *end = self.x.len();
        }

        self.optimize(true)?;
        let gates = self.gate_list()?;
        info!(
            depth = gates.len(),
            distance = self.distance()?,
            "model finalized"
        );
        self.solution = Some(gates.clone());
        self.state = SearchState::Done;
        Ok(gates)
    }

    /// The chain as [`Gate`] values at the current parameters.
    ///
    /// A live head contributes its chosen location and coefficients.
    pub fn gate_list(&self) -> DecomposeResult<Vec<Gate>> {
        let mut gates = Vec::with_capacity(self.depth());
        for (i, gate) in self.fixed.iter().enumerate() {
            gates.push(gate.to_gate(self.slice(&self.x, i))?);
        }
        if let Some(head) = &self.head {
            let params = self.slice(&self.x, self.fixed.len());
            let frozen = head.freeze(&head.chosen_location(params))?;
            gates.push(frozen.to_gate(head.alpha(params))?);
        }
        Ok(gates)
    }

    /// Run one iteration of the structure search.
    pub fn step(&mut self) -> DecomposeResult<SearchState> {
        if self.state == SearchState::Done {
            return Ok(self.state);
        }
        if self.cancel.is_cancelled() {
            return Err(DecomposeError::Cancelled);
        }

        self.reset_params();
        self.optimize(false)?;
        let distance = self.distance()?;
        trace!(depth = self.depth(), distance, "coarse optimization finished");

        if self.success()? {
            self.finalize()?;
            return Ok(self.state);
        }

        let location = {
            let head = self.head_ref()?;
            let params = self.slice(&self.x, self.fixed.len());
            head.chosen_location(params)
        };

        self.state = if self.progress(self.last_distance)? {
            self.last_distance = distance;
            self.expand(&location)?;
            SearchState::Progressed
        } else if self.cannot_restrict() {
            self.rejected.push((location, distance));
            let Some((best, best_distance)) = self
                .rejected
                .drain(..)
                .min_by(|a, b| a.1.total_cmp(&b.1))
            else {
                return Err(DecomposeError::NumericalDegeneracy(
                    "no rejected location to expand at".into(),
                ));
            };
            self.last_distance = best_distance;
            self.expand(&best)?;
            SearchState::Exhausted
        } else {
            self.rejected.push((location.clone(), distance));
            self.restrict(&location)?;
            SearchState::Restricted
        };
        Ok(self.state)
    }

    /// Run [`step`](Self::step) until the model matches the target.
    pub fn solve(&mut self) -> DecomposeResult<Vec<Gate>> {
        info!(
            num_qubits = self.num_qubits,
            gate_size = self.gate_size,
            model = self.strategy.model_name(),
            "solving circuit model"
        );
        loop {
            if self.step()? == SearchState::Done {
                return self.solution.clone().map_or_else(|| self.gate_list(), Ok);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn chain<'a>(
        fixed: &'a [FixedGate],
        head: Option<&'a GenericGate>,
    ) -> impl Iterator<Item = &'a dyn ParameterizedGate> + 'a {
        fixed
            .iter()
            .map(|g| g as &dyn ParameterizedGate)
            .chain(head.map(|g| g as &dyn ParameterizedGate))
    }

    fn gates(&self) -> impl Iterator<Item = &dyn ParameterizedGate> + '_ {
        Self::chain(&self.fixed, self.head.as_ref())
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

    fn evaluate_gates(&self, x: &[f64]) -> DecomposeResult<Vec<(CMatrix, Vec<CMatrix>)>> {
        self.gates()
            .enumerate()
            .map(|(i, gate)| gate.matrix_and_jacobian(self.slice(x, i)))
            .collect()
    }

    fn head_ref(&self) -> DecomposeResult<&GenericGate> {
        self.head.as_ref().ok_or_else(finalized_error)
    }

    fn head_mut(&mut self) -> DecomposeResult<&mut GenericGate> {
        self.head.as_mut().ok_or_else(finalized_error)
    }
}

impl DecompositionModel for CircuitModel {
    fn solve(&mut self) -> DecomposeResult<Vec<Gate>> {
        CircuitModel::solve(self)
    }
}

fn finalized_error() -> DecomposeError {
    DecomposeError::InvalidConfig("model is already finalized".into())
}

/// `(-Re Tr(U† M), gradient)` of a gate chain from its evaluated factors,
/// where gate `p` owns parameters `param_ranges[p]..param_ranges[p + 1]`.
pub(crate) fn chain_objective(
    evaluated: &[(CMatrix, Vec<CMatrix>)],
    target_adjoint: &CMatrix,
    param_ranges: &[usize],
) -> (f64, Vec<f64>) {
    let dim = target_adjoint.nrows();
    let prefixes = prefix_products(evaluated, dim);

    let mut gradient = vec![0.0; param_ranges.last().copied().unwrap_or(0)];
    let mut suffix = identity(dim);
    for (p, (m, dm)) in evaluated.iter().enumerate().rev() {
        // Tr(U† L dG R) = Tr(R U† L dG)
        let k = &prefixes[p] * target_adjoint * &suffix;
        let start = param_ranges[p];
        for (i, d) in dm.iter().enumerate() {
            gradient[start + i] = -trace_of_product(&k, d).re;
        }
        suffix = &suffix * m;
    }

    let value = -trace_of_product(target_adjoint, &prefixes[evaluated.len()]).re;
    (value, gradient)
}

/// `prefixes[p]` is the product of gates `0..p`, so the last entry is the
/// whole chain.
fn prefix_products(evaluated: &[(CMatrix, Vec<CMatrix>)], dim: usize) -> Vec<CMatrix> {
    let mut prefixes = Vec::with_capacity(evaluated.len() + 1);
    prefixes.push(identity(dim));
    for (m, _) in evaluated {
        let next = m * &prefixes[prefixes.len() - 1];
        prefixes.push(next);
    }
    prefixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use qfast_linalg::{PauliOp, kron, pauli_string};
    use std::sync::Mutex;

    fn all_pairs(n: usize) -> Vec<Location> {
        (0..n).combinations(2).map(Location::new).collect()
    }

    fn model(target: CMatrix, strategy: ModelStrategy, seed: u64) -> CircuitModel {
        CircuitModel::builder(target, 2, all_pairs(3))
            .with_strategy(strategy)
            .with_seed(seed)
            .build()
            .unwrap()
    }

    #[test]
    fn test_objective_gradient_matches_finite_difference() {
        for strategy in [ModelStrategy::SoftPauli, ModelStrategy::Permutation] {
            let target = pauli_string(&[PauliOp::X, PauliOp::Z, PauliOp::Y]);
            let mut m = model(target, strategy, 3);
            let loc = Location::new(vec![0, 2]);
            m.expand(&loc).unwrap();
            let x: Vec<f64> = m.params().iter().map(|v| v * 50.0).collect();

            let (_, grad) = m.objective(&x).unwrap();
            let h = 1e-6;
            for i in 0..x.len() {
                let mut plus = x.clone();
                let mut minus = x.clone();
                plus[i] += h;
                minus[i] -= h;
                let fd = (m.objective(&plus).unwrap().0 - m.objective(&minus).unwrap().0) / (2.0 * h);
                assert!((fd - grad[i]).abs() < 1e-5, "{strategy:?} param {i}: {fd} vs {}", grad[i]);
            }
        }
    }

    #[test]
    fn test_jacobian_consistent_with_gradient() {
        let target = pauli_string(&[PauliOp::Z, PauliOp::I, PauliOp::X]);
        let mut m = model(target.clone(), ModelStrategy::Permutation, 5);
        m.expand(&Location::new(vec![1, 2])).unwrap();
        let x = m.params().to_vec();
        let (total, jac) = m.matrix_and_jacobian(&x).unwrap();
        let (value, grad) = m.objective(&x).unwrap();
        let adjoint = target.adjoint();
        assert!((value + trace_of_product(&adjoint, &total).re).abs() < 1e-12);
        for (d, g) in jac.iter().zip(&grad) {
            assert!((-trace_of_product(&adjoint, d).re - g).abs() < 1e-10);
        }
    }

    #[test]
    fn test_identity_target_distance() {
        let mut m = model(identity(8), ModelStrategy::SoftPauli, 0);
        let zeros = vec![0.0; m.num_params()];
        m.x = zeros;
        assert!(m.distance().unwrap().abs() < 1e-12);
        assert!(m.success().unwrap());
    }

    #[test]
    fn test_expand_keeps_single_head() {
        let mut m = model(identity(8), ModelStrategy::Permutation, 1);
        assert_eq!(m.depth(), 1);
        m.restrict(&Location::new(vec![0, 1])).unwrap();
        assert_eq!(m.head().unwrap().live().len(), 2);
        m.expand(&Location::new(vec![1, 2])).unwrap();
        assert_eq!(m.depth(), 2);
        assert_eq!(m.head().unwrap().live().len(), 3);
        assert_eq!(m.num_params(), 2 * 16 + 3);
    }

    #[test]
    fn test_two_qubit_local_target_is_solved() {
        // CNOT on (0, 1) tensored with identity on qubit 2.
        let mut cnot = CMatrix::zeros(4, 4);
        for (r, c) in [(0, 0), (1, 1), (2, 3), (3, 2)] {
            cnot[(r, c)] = qfast_linalg::Complex64::new(1.0, 0.0);
        }
        let target = kron(&cnot, &identity(2));
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let mut m = CircuitModel::builder(target.clone(), 2, all_pairs(3))
            .with_seed(11)
            .with_callback(Arc::new(move |gates: &[Gate]| {
                *counter.lock().unwrap() = gates.len();
            }))
            .build()
            .unwrap();
        let gates = m.solve().unwrap();
        assert_eq!(m.state(), SearchState::Done);
        assert!(m.head().is_none());
        assert!(*seen.lock().unwrap() >= 1);

        let product = crate::gate::circuit_unitary(&gates, 3).unwrap();
        let overlap = trace_of_product(&target.adjoint(), &product).norm() / 8.0;
        assert!(1.0 - overlap < 1e-3);
    }

    #[test]
    fn test_builder_validation() {
        let err = CircuitModel::builder(identity(8), 3, all_pairs(3)).build().unwrap_err();
        assert!(matches!(err, DecomposeError::InvalidGateSize { gate_size: 3, .. }));

        let err = CircuitModel::builder(identity(8), 2, Vec::new()).build().unwrap_err();
        assert!(matches!(err, DecomposeError::NoLocations { .. }));

        let bad = identity(8) * qfast_linalg::Complex64::new(1.5, 0.0);
        let err = CircuitModel::builder(bad, 2, all_pairs(3)).build().unwrap_err();
        assert!(matches!(err, DecomposeError::NotUnitary { .. }));
    }

    #[test]
    fn test_cancelled_step() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut m = CircuitModel::builder(identity(8), 2, all_pairs(3))
            .with_cancel_token(cancel)
            .build()
            .unwrap();
        assert!(matches!(m.step(), Err(DecomposeError::Cancelled)));
    }
}
