//! `qfast-decompose`: hierarchical, topology-aware unitary decomposition.
//!
//! Splits an `n`-qubit unitary into an ordered list of small gates whose
//! product reproduces it, respecting a qubit coupling graph. Each level of
//! the hierarchy fits a chain of parameterized gates to the unitary by
//! gradient descent while searching over gate placements.
//!
//! # Architecture
//!
//! ```text
//! target U (n qubits)
//!       │
//!       ▼
//! ┌────────────┐   Topology ── connected locations per gate size
//! │ Decomposer │◄─ Hierarchy ── size of the next level
//! └────────────┘   Registry  ── model / optimizer by name
//!       │
//!       ├── CircuitModel (SoftPauliModel | PermModel)
//!       │     ├── FixedGate* ── GenericGate (head)
//!       │     └── Optimizer (LBFGSOptimizer)
//!       ▼
//! Vec<Gate>, every gate ≤ target size
//! ```
//!
//! # Example
//!
//! ```no_run
//! use qfast_decompose::{Decomposer, DecomposerConfig, circuit_unitary};
//! use qfast_linalg::hilbert_schmidt_distance;
//!
//! # fn run(toffoli: qfast_linalg::CMatrix) -> qfast_decompose::DecomposeResult<()> {
//! let config = DecomposerConfig::default()
//!     .with_target_gate_size(2)
//!     .with_coupling_graph(vec![(0, 1), (1, 2)])
//!     .with_seed(42);
//! let gates = Decomposer::new(toffoli.clone(), config)?.decompose()?;
//! let product = circuit_unitary(&gates, 3)?;
//! assert!(hilbert_schmidt_distance(&toffoli, &product) < 1e-3);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod decomposer;
pub mod error;
pub mod gate;
pub mod io;
pub mod model;
pub mod optimizer;
pub mod registry;
pub mod topology;

pub use cancel::{CANCEL_CHECK_INTERVAL, CancelToken};
pub use decomposer::{Decomposer, DecomposerConfig, Hierarchy, INPUT_UNITARY_TOLERANCE};
pub use error::{DecomposeError, DecomposeResult, ErrorKind};
pub use gate::{GATE_UNITARY_TOLERANCE, Gate, GateRecord, Location, circuit_unitary};
pub use io::{format_unitary, gates_from_json, gates_to_json, load_unitary, parse_unitary};
pub use model::{
    CircuitModel, CircuitModelBuilder, DecompositionModel, FIXED_MODEL_NAME, FixedGate, FixedModel,
    FixedModelBuilder, GenericGate, ModelOptions, ModelStrategy, ParameterizedGate,
    PartialSolutionCallback, SearchState,
};
pub use optimizer::{LbfgsConfig, LbfgsOptimizer, Minimum, ObjectiveFn, Optimizer, Termination};
pub use registry::{ModelFactory, ModelRequest, OptimizerFactory, Registry, models, optimizers};
pub use topology::Topology;
