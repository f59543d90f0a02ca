//! Circuit models: parameterized gate chains searched by gradient descent.
//!
//! A model owns an ordered chain of [`FixedGate`]s topped by one
//! [`GenericGate`] (the *head*) whose qubit placement is a softmax-weighted
//! mixture over candidate locations. [`CircuitModel::solve`] grows the chain
//! until the product matches the target.
//!
//! Two interchangeable embedding strategies lift a `k`-qubit gate onto the
//! `n`-qubit register:
//!
//! | Strategy | Registry name | Embedding | Softmax temperature |
//! |----------|---------------|-----------|---------------------|
//! | [`ModelStrategy::SoftPauli`] | `SoftPauliModel` | Pauli projection onto the location | 10 |
//! | [`ModelStrategy::Permutation`] | `PermModel` | `P (U ⊗ I) Pᵗ` | 20 |
//!
//! [`FixedModel`] (`FixedModel`) skips the search and instantiates a given
//! list of locations with one fine optimization.

pub mod circuit;
pub mod fixed;
pub mod gates;

use serde::{Deserialize, Serialize};

use crate::error::{DecomposeError, DecomposeResult};

pub use circuit::{CircuitModel, CircuitModelBuilder, DecompositionModel, PartialSolutionCallback, SearchState};
pub use fixed::{FIXED_MODEL_NAME, FixedModel, FixedModelBuilder};
pub use gates::{FixedGate, GenericGate, ParameterizedGate};

/// Default distance below which a model counts as solved.
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 1e-3;

/// Default distance reduction that counts as progress.
pub const DEFAULT_PROGRESS_THRESHOLD: f64 = 5e-3;

/// How a gate is lifted onto the full register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStrategy {
    /// Generators are Pauli strings projected onto the location.
    SoftPauli,
    /// The gate is conjugated into place with a qubit permutation.
    Permutation,
}

impl ModelStrategy {
    /// Softmax temperature used when none is configured.
    pub fn default_temperature(self) -> f64 {
        match self {
            ModelStrategy::SoftPauli => 10.0,
            ModelStrategy::Permutation => 20.0,
        }
    }

    /// Registry name of the model built on this strategy.
    pub fn model_name(self) -> &'static str {
        match self {
            ModelStrategy::SoftPauli => "SoftPauliModel",
            ModelStrategy::Permutation => "PermModel",
        }
    }
}

/// Search thresholds shared by every model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Distance below which the model is solved.
    pub success_threshold: f64,
    /// Minimum distance reduction that counts as progress.
    pub progress_threshold: f64,
    /// Softmax temperature; `None` picks the strategy default.
    pub temperature: Option<f64>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            progress_threshold: DEFAULT_PROGRESS_THRESHOLD,
            temperature: None,
        }
    }
}

impl ModelOptions {
    /// Set the success threshold.
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the progress threshold.
    #[must_use]
    pub fn with_progress_threshold(mut self, threshold: f64) -> Self {
        self.progress_threshold = threshold;
        self
    }

    /// Set the softmax temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Temperature for `strategy`.
    pub fn temperature_for(&self, strategy: ModelStrategy) -> f64 {
        self.temperature
            .unwrap_or_else(|| strategy.default_temperature())
    }

    /// Reject non-positive or non-finite thresholds.
    pub fn validate(&self) -> DecomposeResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.success_threshold) || !positive(self.progress_threshold) {
            return Err(DecomposeError::InvalidConfig(format!(
                "thresholds must be positive, got success={} progress={}",
                self.success_threshold, self.progress_threshold
            )));
        }
        if self.temperature.is_some_and(|t| !positive(t)) {
            return Err(DecomposeError::InvalidConfig(format!(
                "temperature must be positive, got {:?}",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_defaults() {
        assert_eq!(ModelStrategy::SoftPauli.default_temperature(), 10.0);
        assert_eq!(ModelStrategy::Permutation.default_temperature(), 20.0);
        assert_eq!(ModelStrategy::Permutation.model_name(), "PermModel");
    }

    #[test]
    fn test_options_validation() {
        assert!(ModelOptions::default().validate().is_ok());
        assert!(ModelOptions::default().with_success_threshold(0.0).validate().is_err());
        assert!(ModelOptions::default().with_temperature(-1.0).validate().is_err());
    }

    #[test]
    fn test_temperature_override() {
        let options = ModelOptions::default().with_temperature(500.0);
        assert_eq!(options.temperature_for(ModelStrategy::SoftPauli), 500.0);
    }
}
