//! Hierarchical decomposition driver.
//!
//! The [`Decomposer`] starts from a single gate holding the whole target and
//! repeatedly splits every gate wider than the target size. Each split runs
//! a fresh circuit model on the gate's own unitary, restricted to the part
//! of the coupling graph under the gate, and splices the resulting
//! sub-gates back in place. The hierarchy function chooses the size of the
//! next level:
//!
//! ```text
//! 8 qubits ──default──▶ 2-qubit gates
//! 9 qubits ──default──▶ 3-qubit gates ──▶ 2-qubit gates
//! ```
//!
//! # Example
//!
//! ```no_run
//! use qfast_decompose::{Decomposer, DecomposerConfig};
//! # fn run(target: qfast_linalg::CMatrix) -> qfast_decompose::DecomposeResult<()> {
//! let config = DecomposerConfig::default().with_target_gate_size(2).with_seed(7);
//! let gates = Decomposer::new(target, config)?.decompose()?;
//! assert!(gates.iter().all(|g| g.num_qubits() <= 2));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use qfast_linalg::{CMatrix, closest_unitary, is_unitary, qubit_count};

use crate::cancel::CancelToken;
use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::{Gate, Location};
use crate::model::{ModelOptions, PartialSolutionCallback};
use crate::optimizer::Optimizer;
use crate::registry::{self, ModelFactory, ModelRequest};
use crate::topology::Topology;

/// Unitarity tolerance below which the input is used as given.
pub const INPUT_UNITARY_TOLERANCE: f64 = 1e-14;

/// Maps a gate size to the size of the gates it is split into.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hierarchy {
    /// `n / 3` above five qubits, otherwise 2, capped at `n - 1`.
    #[default]
    Default,
    /// `n - 1`.
    Decrement,
    /// `n / 2`.
    Halve,
    /// User-supplied function.
    #[serde(skip)]
    Custom(Arc<dyn Fn(usize) -> usize + Send + Sync>),
}

impl fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hierarchy::Default => f.write_str("Default"),
            Hierarchy::Decrement => f.write_str("Decrement"),
            Hierarchy::Halve => f.write_str("Halve"),
            Hierarchy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Hierarchy {
    /// Size of the gates a `size`-qubit gate is split into.
    ///
    /// Fails unless `0 < next < size`.
    pub fn next_size(&self, size: usize) -> DecomposeResult<usize> {
        let next = match self {
            Hierarchy::Default => {
                let next = if size > 5 { size / 3 } else { 2 };
                next.min(size.saturating_sub(1))
            }
            Hierarchy::Decrement => size.saturating_sub(1),
            Hierarchy::Halve => size / 2,
            Hierarchy::Custom(f) => f(size),
        };
        if next == 0 || next >= size {
            return Err(DecomposeError::InvalidHierarchy { size, next });
        }
        Ok(next)
    }
}

/// Decomposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    /// Largest gate size allowed in the output.
    pub target_gate_size: usize,
    /// Registered model name.
    pub model: String,
    /// Registered optimizer name.
    pub optimizer: String,
    /// Size of each level of the hierarchy.
    pub hierarchy: Hierarchy,
    /// Coupled qubit pairs; `None` means all-to-all.
    pub coupling_graph: Option<Vec<(usize, usize)>>,
    /// Thresholds passed to every model.
    pub model_options: ModelOptions,
    /// Base seed; each model derives its own from it.
    pub seed: u64,
    /// Solve the gates of one round concurrently.
    pub parallel: bool,
    /// Give up after this many seconds.
    pub timeout_secs: Option<f64>,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            target_gate_size: 2,
            model: "PermModel".into(),
            optimizer: "LBFGSOptimizer".into(),
            hierarchy: Hierarchy::Default,
            coupling_graph: None,
            model_options: ModelOptions::default(),
            seed: 0,
            parallel: false,
            timeout_secs: None,
        }
    }
}

impl DecomposerConfig {
    /// Set the largest output gate size.
    #[must_use]
    pub fn with_target_gate_size(mut self, size: usize) -> Self {
        self.target_gate_size = size;
        self
    }

    /// Select a model by registry name.
    #[must_use]
    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        self.model = name.into();
        self
    }

    /// Select an optimizer by registry name.
    #[must_use]
    pub fn with_optimizer(mut self, name: impl Into<String>) -> Self {
        self.optimizer = name.into();
        self
    }

    /// Set the hierarchy.
    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    /// Restrict gates to a coupling graph.
    #[must_use]
    pub fn with_coupling_graph(mut self, edges: Vec<(usize, usize)>) -> Self {
        self.coupling_graph = Some(edges);
        self
    }

    /// Set model thresholds.
    #[must_use]
    pub fn with_model_options(mut self, options: ModelOptions) -> Self {
        self.model_options = options;
        self
    }

    /// Set the base seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable concurrent rounds.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Cancel the decomposition after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    fn cancel_token(&self) -> DecomposeResult<CancelToken> {
        match self.timeout_secs {
            None => Ok(CancelToken::new()),
            Some(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(CancelToken::with_timeout(Duration::from_secs_f64(secs)))
            }
            Some(secs) => Err(DecomposeError::InvalidConfig(format!(
                "timeout must be a non-negative number of seconds, got {secs}"
            ))),
        }
    }
}

/// Splits a unitary into gates no wider than the configured size.
pub struct Decomposer {
    target: CMatrix,
    num_qubits: usize,
    config: DecomposerConfig,
    topology: Topology,
    model: ModelFactory,
    optimizer: Arc<dyn Optimizer>,
    intermediate: Option<PartialSolutionCallback>,
    cancel: CancelToken,
}

impl fmt::Debug for Decomposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decomposer")
            .field("num_qubits", &self.num_qubits)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Decomposer {
    /// Validate `target` and `config` and resolve the named plugins.
    ///
    /// A target that is square with a power-of-two dimension but not unitary
    /// to [`INPUT_UNITARY_TOLERANCE`] is replaced by its closest unitary.
    pub fn new(target: CMatrix, config: DecomposerConfig) -> DecomposeResult<Self> {
        let num_qubits = qubit_count(&target)?;
        let target = if is_unitary(&target, INPUT_UNITARY_TOLERANCE) {
            target
        } else {
            warn!("unitary is not doubly precise, proceeding with the closest unitary");
            closest_unitary(&target)?
        };

        if config.target_gate_size == 0 || config.target_gate_size > num_qubits {
            return Err(DecomposeError::InvalidGateSize {
                gate_size: config.target_gate_size,
                num_qubits,
            });
        }
        config.model_options.validate()?;
        let cancel = config.cancel_token()?;
        let topology = Topology::new(num_qubits, config.coupling_graph.clone())?;
        let model = registry::model_factory(&config.model)?;
        let optimizer = registry::optimizer(&config.optimizer)?;

        debug!(
            num_qubits,
            model = %config.model,
            optimizer = %config.optimizer,
            "created decomposer"
        );
        Ok(Self {
            target,
            num_qubits,
            config,
            topology,
            model,
            optimizer,
            intermediate: None,
            cancel,
        })
    }

    /// Receive the full gate list after every round.
    #[must_use]
    pub fn with_intermediate_callback(mut self, callback: PartialSolutionCallback) -> Self {
        self.intermediate = Some(callback);
        self
    }

    /// Cancel through an external token instead of the configured timeout.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The (possibly corrected) target.
    pub fn target(&self) -> &CMatrix {
        &self.target
    }

    /// Width of the target.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Active configuration.
    pub fn config(&self) -> &DecomposerConfig {
        &self.config
    }

    /// Coupling graph of the full register.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Split the target until every gate fits the target size.
    ///
    /// The output is in application order and uses indices of the full
    /// register.
    #[instrument(skip(self), fields(num_qubits = self.num_qubits))]
    pub fn decompose(&self) -> DecomposeResult<Vec<Gate>> {
        let limit = self.config.target_gate_size;
        let mut gates = vec![Gate::new(self.target.clone(), Location::identity(self.num_qubits))?];
        let mut round = 0u64;

        while gates.iter().any(|g| g.num_qubits() > limit) {
            if self.cancel.is_cancelled() {
                return Err(DecomposeError::Cancelled);
            }
            let split = |(index, gate): (usize, &Gate)| -> DecomposeResult<Vec<Gate>> {
                if gate.num_qubits() <= limit {
                    Ok(vec![gate.clone()])
                } else {
                    self.split(gate, round, index)
                }
            };
            let pieces: Vec<Vec<Gate>> = if self.config.parallel {
                gates.par_iter().enumerate().map(split).collect::<DecomposeResult<_>>()?
            } else {
                gates.iter().enumerate().map(split).collect::<DecomposeResult<_>>()?
            };
            gates = pieces.into_iter().flatten().collect();
            round += 1;

            info!(round, gates = gates.len(), "decomposition round finished");
            if let Some(callback) = &self.intermediate {
                callback(&gates);
            }
        }
        Ok(gates)
    }

    /// Solve one oversized gate and translate its sub-gates to the full
    /// register.
    fn split(&self, gate: &Gate, round: u64, index: usize) -> DecomposeResult<Vec<Gate>> {
        let size = gate.num_qubits();
        let next = self.config.hierarchy.next_size(size)?;
        let locations = self
            .topology
            .get_locations_within(gate.location(), next)?
            .to_vec();
        if locations.is_empty() {
            return Err(DecomposeError::NoLocations { gate_size: next });
        }
        debug!(
            location = %gate.location(),
            next,
            candidates = locations.len(),
            "splitting gate"
        );

        let request = ModelRequest {
            target: gate.unitary().clone(),
            gate_size: next,
            locations,
            optimizer: Arc::clone(&self.optimizer),
            options: self.config.model_options.clone(),
            seed: derive_seed(self.config.seed, round, index),
            callback: None,
            cancel: self.cancel.clone(),
        };
        let mut model = (self.model)(request)?;
        model
            .solve()?
            .iter()
            .map(|sub| sub.relocated(gate.location()))
            .collect()
    }
}

/// Mix the base seed with a gate's round and position (SplitMix64 finalizer).
fn derive_seed(seed: u64, round: u64, index: usize) -> u64 {
    let mut z = seed
        ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_add(1).wrapping_mul(0xD1B5_4A32_D192_ED03);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qfast_linalg::{Complex64, identity};

    #[test]
    fn test_default_hierarchy() {
        let h = Hierarchy::Default;
        assert_eq!(h.next_size(2).unwrap(), 1);
        assert_eq!(h.next_size(3).unwrap(), 2);
        assert_eq!(h.next_size(5).unwrap(), 2);
        assert_eq!(h.next_size(6).unwrap(), 2);
        assert_eq!(h.next_size(9).unwrap(), 3);
        assert!(h.next_size(1).is_err());
    }

    #[test]
    fn test_other_hierarchies() {
        assert_eq!(Hierarchy::Decrement.next_size(4).unwrap(), 3);
        assert_eq!(Hierarchy::Halve.next_size(5).unwrap(), 2);
        let bad = Hierarchy::Custom(Arc::new(|n| n));
        assert!(matches!(
            bad.next_size(4),
            Err(DecomposeError::InvalidHierarchy { size: 4, next: 4 })
        ));
    }

    #[test]
    fn test_hierarchy_serde() {
        let json = serde_json::to_string(&Hierarchy::Halve).unwrap();
        assert_eq!(json, "\"halve\"");
        let back: Hierarchy = serde_json::from_str("\"decrement\"").unwrap();
        assert!(matches!(back, Hierarchy::Decrement));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: DecomposerConfig =
            serde_json::from_str(r#"{"target_gate_size": 3, "coupling_graph": [[0, 1], [1, 2]]}"#).unwrap();
        assert_eq!(config.target_gate_size, 3);
        assert_eq!(config.model, "PermModel");
        assert_eq!(config.coupling_graph, Some(vec![(0, 1), (1, 2)]));
    }

    #[test]
    fn test_seed_derivation_is_distinct() {
        let a = derive_seed(1, 0, 0);
        assert_ne!(a, derive_seed(1, 0, 1));
        assert_ne!(a, derive_seed(1, 1, 0));
        assert_eq!(a, derive_seed(1, 0, 0));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let rect = CMatrix::zeros(4, 2);
        assert!(matches!(
            Decomposer::new(rect, DecomposerConfig::default()),
            Err(DecomposeError::Linalg(_))
        ));
        let err = Decomposer::new(identity(4), DecomposerConfig::default().with_target_gate_size(3)).unwrap_err();
        assert!(matches!(err, DecomposeError::InvalidGateSize { .. }));
        let err = Decomposer::new(identity(4), DecomposerConfig::default().with_model("Nope")).unwrap_err();
        assert!(matches!(err, DecomposeError::UnknownModel { .. }));
    }

    #[test]
    fn test_near_unitary_input_is_corrected() {
        let mut m = identity(4);
        m[(0, 1)] = Complex64::new(1e-9, 0.0);
        let decomposer = Decomposer::new(m, DecomposerConfig::default()).unwrap();
        assert!(is_unitary(decomposer.target(), 1e-13));
    }

    #[test]
    fn test_small_target_is_returned_unchanged() {
        let gates = Decomposer::new(identity(4), DecomposerConfig::default())
            .unwrap()
            .decompose()
            .unwrap();
        assert_eq!(gates.len(), 1);
        assert_eq!(gates[0].location(), &Location::identity(2));
    }
}
