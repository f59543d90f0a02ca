//! Structure-search tests driven by a stub optimizer.
//!
//! The stub zeroes every parameter, which makes every gate the identity.
//! Against a target orthogonal to the identity the distance then stays at
//! exactly 1, so no step ever counts as progress and the search has to
//! fall back on restriction and exhausted expansion.

use std::sync::Arc;

use approx::assert_abs_diff_eq;

use qfast_decompose::{
    CancelToken, CircuitModel, DecomposeError, DecomposeResult, Location, Minimum, ModelStrategy,
    ObjectiveFn, Optimizer, SearchState, Termination,
};
use qfast_linalg::{PauliOp, pauli_string};

struct ZeroOptimizer;

impl ZeroOptimizer {
    fn zeros(x0: &[f64]) -> Minimum {
        Minimum {
            x: vec![0.0; x0.len()],
            value: 0.0,
            iterations: 0,
            termination: Termination::MaxIterations,
        }
    }
}

impl Optimizer for ZeroOptimizer {
    fn name(&self) -> &str {
        "ZeroOptimizer"
    }

    fn minimize_coarse(
        &self,
        _objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        _cancel: &CancelToken,
    ) -> DecomposeResult<Minimum> {
        Ok(Self::zeros(x0))
    }

    fn minimize_fine(
        &self,
        _objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        _cancel: &CancelToken,
    ) -> DecomposeResult<Minimum> {
        Ok(Self::zeros(x0))
    }
}

/// All pairs of 4 qubits except (1, 2).
fn candidates() -> Vec<Location> {
    [[0, 1], [0, 2], [0, 3], [1, 3], [2, 3]]
        .into_iter()
        .map(|pair| Location::new(pair.to_vec()))
        .collect()
}

fn xxxx_model(strategy: ModelStrategy, cancel: CancelToken) -> CircuitModel {
    let target = pauli_string(&[PauliOp::X; 4]);
    CircuitModel::builder(target, 2, candidates())
        .with_strategy(strategy)
        .with_optimizer(Arc::new(ZeroOptimizer))
        .with_cancel_token(cancel)
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Backtracking
// ---------------------------------------------------------------------------

#[test]
fn restricts_every_candidate_then_expands() {
    for strategy in [ModelStrategy::Permutation, ModelStrategy::SoftPauli] {
        let mut model = xxxx_model(strategy, CancelToken::new());
        assert_eq!(model.depth(), 1);

        for expected_live in (1..=4).rev() {
            assert_eq!(model.step().unwrap(), SearchState::Restricted);
            assert_eq!(model.head().unwrap().live().len(), expected_live);
            assert_eq!(model.depth(), 1);
        }
        assert!(model.cannot_restrict());
        assert_eq!(model.rejected().len(), 4);

        assert_eq!(model.step().unwrap(), SearchState::Exhausted);
        assert_eq!(model.depth(), 2);
        assert!(model.rejected().is_empty());
        assert_eq!(model.head().unwrap().live().len(), 5);
        assert_abs_diff_eq!(model.last_distance(), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn restriction_follows_argmax_order() {
    let mut model = xxxx_model(ModelStrategy::Permutation, CancelToken::new());
    model.step().unwrap();
    // Zero logits tie, so the first live candidate is chosen and dropped.
    assert_eq!(model.rejected()[0].0, Location::new(vec![0, 1]));
    let live: Vec<_> = model.head().unwrap().live_locations().cloned().collect();
    assert!(!live.contains(&Location::new(vec![0, 1])));
}

#[test]
fn distance_of_identity_chain_is_one() {
    let mut model = xxxx_model(ModelStrategy::Permutation, CancelToken::new());
    model.optimize(false).unwrap();
    assert_abs_diff_eq!(model.distance().unwrap(), 1.0, epsilon = 1e-12);
    assert!(!model.success().unwrap());
    assert!(!model.progress(1.0).unwrap());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn solve_without_progress_stops_on_cancel() {
    let cancel = CancelToken::new();
    let mut model = xxxx_model(ModelStrategy::Permutation, cancel.clone());
    for _ in 0..7 {
        model.step().unwrap();
    }
    cancel.cancel();
    assert!(matches!(model.solve(), Err(DecomposeError::Cancelled)));
    assert!(model.depth() >= 2);
}
