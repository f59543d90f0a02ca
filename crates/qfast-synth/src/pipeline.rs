//! End-to-end synthesis: decompose, instantiate, combine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use qfast_decompose::{Decomposer, DecomposerConfig};
use qfast_linalg::CMatrix;

use crate::combine::{Combiner, NaiveCombiner};
use crate::error::SynthResult;
use crate::instantiate::{DEFAULT_BASIS_GATES, Instantiater, NativeTool};
use crate::registry;

/// Settings of the full pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Decomposition settings; the target size is capped at the tool's limit.
    pub decomposer: DecomposerConfig,
    /// Registered native tool name.
    pub tool: String,
    /// Registered combiner name.
    pub combiner: String,
    /// Native basis handed to the tool.
    pub basis_gates: Vec<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            decomposer: DecomposerConfig::default(),
            tool: "KAKTool".into(),
            combiner: NaiveCombiner::NAME.into(),
            basis_gates: DEFAULT_BASIS_GATES.iter().map(|g| (*g).to_string()).collect(),
        }
    }
}

impl SynthesisConfig {
    /// Set the decomposition settings.
    #[must_use]
    pub fn with_decomposer(mut self, decomposer: DecomposerConfig) -> Self {
        self.decomposer = decomposer;
        self
    }

    /// Select a native tool by name.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tool = name.into();
        self
    }

    /// Select a combiner by name.
    #[must_use]
    pub fn with_combiner(mut self, name: impl Into<String>) -> Self {
        self.combiner = name.into();
        self
    }

    /// Set the native basis.
    #[must_use]
    pub fn with_basis_gates(mut self, basis_gates: Vec<String>) -> Self {
        self.basis_gates = basis_gates;
        self
    }
}

/// Synthesize `target` with the tool and combiner named in `config`.
pub fn synthesize(target: CMatrix, config: &SynthesisConfig) -> SynthResult<String> {
    let tool = registry::tool(&config.tool)?;
    let combiner = registry::combiner(&config.combiner)?;
    synthesize_with(target, config, tool, combiner.as_ref())
}

/// Synthesize `target` with explicit collaborators; the names in `config`
/// are ignored.
pub fn synthesize_with(
    target: CMatrix,
    config: &SynthesisConfig,
    tool: Arc<dyn NativeTool>,
    combiner: &dyn Combiner,
) -> SynthResult<String> {
    let mut decomposer_config = config.decomposer.clone();
    let maximum = tool.maximum_gate_size();
    if decomposer_config.target_gate_size > maximum {
        info!(
            requested = decomposer_config.target_gate_size,
            maximum,
            tool = tool.name(),
            "capping target gate size at the native tool limit"
        );
        decomposer_config.target_gate_size = maximum;
    }

    let decomposer = Decomposer::new(target, decomposer_config)?;
    let gates = decomposer.decompose()?;
    info!(gates = gates.len(), "decomposition finished");

    let fragments = Instantiater::new(tool)
        .with_basis_gates(config.basis_gates.clone())
        .instantiate(&gates, decomposer.topology())?;
    combiner.combine(&fragments)
}
