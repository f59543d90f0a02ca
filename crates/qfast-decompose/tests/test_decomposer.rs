//! End-to-end tests for hierarchical decomposition.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use qfast_decompose::{
    DecomposeError, DecomposeResult, Decomposer, DecomposerConfig, DecompositionModel, ErrorKind,
    Gate, Hierarchy, Location, ModelRequest, circuit_unitary, models,
};
use qfast_linalg::{CMatrix, Complex64, hilbert_schmidt_distance, identity, is_unitary};

fn toffoli() -> CMatrix {
    let mut m = identity(8);
    m[(6, 6)] = Complex64::new(0.0, 0.0);
    m[(7, 7)] = Complex64::new(0.0, 0.0);
    m[(6, 7)] = Complex64::new(1.0, 0.0);
    m[(7, 6)] = Complex64::new(1.0, 0.0);
    m
}

fn assert_reproduces(target: &CMatrix, gates: &[Gate], num_qubits: usize, limit: usize) {
    assert!(!gates.is_empty());
    for gate in gates {
        assert!(gate.num_qubits() <= limit, "gate {} too wide", gate.location());
        assert!(is_unitary(gate.unitary(), 1e-10));
    }
    let product = circuit_unitary(gates, num_qubits).unwrap();
    let distance = hilbert_schmidt_distance(target, &product);
    assert!(distance < 1e-3, "distance {distance}");
}

// ---------------------------------------------------------------------------
// Toffoli
// ---------------------------------------------------------------------------

#[test]
fn toffoli_all_to_all() {
    let target = toffoli();
    let config = DecomposerConfig::default().with_target_gate_size(2).with_seed(1);
    let gates = Decomposer::new(target.clone(), config).unwrap().decompose().unwrap();
    assert_reproduces(&target, &gates, 3, 2);
}

#[test]
fn toffoli_linear_chain_respects_coupling() {
    let target = toffoli();
    let config = DecomposerConfig::default()
        .with_target_gate_size(2)
        .with_coupling_graph(vec![(0, 1), (1, 2)])
        .with_seed(2);
    let gates = Decomposer::new(target.clone(), config).unwrap().decompose().unwrap();
    assert_reproduces(&target, &gates, 3, 2);
    let forbidden = Location::new(vec![0, 2]);
    assert!(gates.iter().all(|g| g.location() != &forbidden));
}

#[test]
fn toffoli_soft_pauli_parallel() {
    let target = toffoli();
    let config = DecomposerConfig::default()
        .with_model("SoftPauliModel")
        .with_target_gate_size(2)
        .with_parallel(true)
        .with_seed(3);
    let gates = Decomposer::new(target.clone(), config).unwrap().decompose().unwrap();
    assert_reproduces(&target, &gates, 3, 2);
}

// ---------------------------------------------------------------------------
// Driver behavior
// ---------------------------------------------------------------------------

#[test]
fn target_already_small_is_returned_as_is() {
    let target = toffoli();
    let config = DecomposerConfig::default().with_target_gate_size(3);
    let gates = Decomposer::new(target.clone(), config).unwrap().decompose().unwrap();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].location(), &Location::identity(3));
    assert!(hilbert_schmidt_distance(&target, gates[0].unitary()) < 1e-14);
}

#[test]
fn intermediate_callback_sees_every_round() {
    let rounds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rounds);
    let config = DecomposerConfig::default().with_target_gate_size(2).with_seed(4);
    let gates = Decomposer::new(toffoli(), config)
        .unwrap()
        .with_intermediate_callback(Arc::new(move |gates: &[Gate]| {
            sink.lock().unwrap().push(gates.len());
        }))
        .decompose()
        .unwrap();
    let rounds = rounds.lock().unwrap();
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0], gates.len());
}

#[test]
fn zero_timeout_cancels() {
    let config = DecomposerConfig::default()
        .with_target_gate_size(2)
        .with_timeout(Duration::ZERO);
    let err = Decomposer::new(toffoli(), config).unwrap().decompose().unwrap_err();
    assert!(matches!(err, DecomposeError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn invalid_hierarchy_is_a_configuration_error() {
    let config = DecomposerConfig::default()
        .with_target_gate_size(2)
        .with_hierarchy(Hierarchy::Custom(Arc::new(|_| 0)));
    let err = Decomposer::new(toffoli(), config).unwrap().decompose().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn disconnected_graph_has_no_locations() {
    // A graph without edges admits no 2-qubit location.
    let config = DecomposerConfig::default()
        .with_target_gate_size(2)
        .with_coupling_graph(Vec::new());
    let err = Decomposer::new(toffoli(), config).unwrap().decompose().unwrap_err();
    assert!(matches!(err, DecomposeError::NoLocations { gate_size: 2 }));
}

#[test]
fn invalid_coupling_graph_is_rejected_up_front() {
    let config = DecomposerConfig::default().with_coupling_graph(vec![(0, 5)]);
    let err = Decomposer::new(toffoli(), config).unwrap_err();
    assert!(matches!(err, DecomposeError::InvalidCouplingGraph(_)));
}

// ---------------------------------------------------------------------------
// Location caching
// ---------------------------------------------------------------------------

/// Places a single identity gate at the first candidate location.
struct FirstLocationModel {
    gate_size: usize,
    location: Location,
}

impl DecompositionModel for FirstLocationModel {
    fn solve(&mut self) -> DecomposeResult<Vec<Gate>> {
        Ok(vec![Gate::new(identity(1 << self.gate_size), self.location.clone())?])
    }
}

#[test]
fn two_rounds_reuse_the_register_location_cache() {
    models().register(
        "FirstLocationModel",
        Arc::new(
            |request: ModelRequest| -> DecomposeResult<Box<dyn DecompositionModel>> {
                Ok(Box::new(FirstLocationModel {
                    gate_size: request.gate_size,
                    location: request.locations[0].clone(),
                }))
            },
        ),
    );
    let config = DecomposerConfig::default()
        .with_model("FirstLocationModel")
        .with_target_gate_size(2)
        .with_hierarchy(Hierarchy::Decrement)
        .with_coupling_graph(vec![(0, 1), (1, 2), (2, 3)]);
    let decomposer = Decomposer::new(identity(16), config).unwrap();
    let gates = decomposer.decompose().unwrap();

    // Round 0 splits the register into [0, 1, 2]; round 1 splits that gate.
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].location(), &Location::new(vec![0, 1]));
    assert_eq!(decomposer.topology().cached_sizes(), vec![3]);
    assert_eq!(
        decomposer.topology().cached_subtopologies(),
        vec![Location::new(vec![0, 1, 2])]
    );
}
