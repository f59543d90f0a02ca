//! Named factories for models and optimizers.
//!
//! The decomposer looks plugins up by name so that configuration files can
//! select them. The built-in entries are
//!
//! | Kind | Name | Implementation |
//! |------|------|----------------|
//! | model | `SoftPauliModel` | [`CircuitModel`] with [`ModelStrategy::SoftPauli`] |
//! | model | `PermModel` | [`CircuitModel`] with [`ModelStrategy::Permutation`] |
//! | model | `FixedModel` | [`FixedModel`], one gate per candidate location |
//! | optimizer | `LBFGSOptimizer` | [`LbfgsOptimizer`] |
//!
//! Additional entries can be registered on the global tables returned by
//! [`models`] and [`optimizers`].

use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;

use qfast_linalg::CMatrix;

use crate::cancel::CancelToken;
use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::Location;
use crate::model::{
    CircuitModel, DecompositionModel, FIXED_MODEL_NAME, FixedModel, ModelOptions, ModelStrategy,
    PartialSolutionCallback,
};
use crate::optimizer::{LbfgsOptimizer, Optimizer};

/// Everything a model factory needs to build one sub-problem.
pub struct ModelRequest {
    /// Unitary to decompose.
    pub target: CMatrix,
    /// Size of the gates to place.
    pub gate_size: usize,
    /// Admissible gate locations.
    pub locations: Vec<Location>,
    /// Minimizer for coarse and fine runs.
    pub optimizer: Arc<dyn Optimizer>,
    /// Search thresholds.
    pub options: ModelOptions,
    /// Seed of the parameter initializer.
    pub seed: u64,
    /// Success callback.
    pub callback: Option<PartialSolutionCallback>,
    /// Cancellation token.
    pub cancel: CancelToken,
}

/// Builds a model from a request.
pub type ModelFactory =
    Arc<dyn Fn(ModelRequest) -> DecomposeResult<Box<dyn DecompositionModel>> + Send + Sync>;

/// Builds an optimizer.
pub type OptimizerFactory = Arc<dyn Fn() -> Arc<dyn Optimizer> + Send + Sync>;

/// Name to factory table.
pub struct Registry<F> {
    entries: RwLock<FxHashMap<String, F>>,
}

impl<F: Clone> Registry<F> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, factory: F) {
        self.write().insert(name.into(), factory);
    }

    /// Look up a factory.
    pub fn get(&self, name: &str) -> Option<F> {
        self.read().get(name).cloned()
    }

    /// Check if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<String, F>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<String, F>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<F: Clone> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry holding the built-in models.
pub fn default_model_registry() -> Registry<ModelFactory> {
    let registry = Registry::new();
    for strategy in [ModelStrategy::SoftPauli, ModelStrategy::Permutation] {
        registry.register(strategy.model_name(), circuit_model_factory(strategy));
    }
    registry.register(FIXED_MODEL_NAME, fixed_model_factory());
    registry
}

/// Registry holding the built-in optimizers.
pub fn default_optimizer_registry() -> Registry<OptimizerFactory> {
    let registry: Registry<OptimizerFactory> = Registry::new();
    registry.register(
        LbfgsOptimizer::NAME,
        Arc::new(|| Arc::new(LbfgsOptimizer::new()) as Arc<dyn Optimizer>),
    );
    registry
}

/// Process-wide model registry.
pub fn models() -> &'static Registry<ModelFactory> {
    static MODELS: OnceLock<Registry<ModelFactory>> = OnceLock::new();
    MODELS.get_or_init(default_model_registry)
}

/// Process-wide optimizer registry.
pub fn optimizers() -> &'static Registry<OptimizerFactory> {
    static OPTIMIZERS: OnceLock<Registry<OptimizerFactory>> = OnceLock::new();
    OPTIMIZERS.get_or_init(default_optimizer_registry)
}

/// Resolve a model factory from the global registry.
pub fn model_factory(name: &str) -> DecomposeResult<ModelFactory> {
    models().get(name).ok_or_else(|| DecomposeError::UnknownModel {
        name: name.to_string(),
        available: models().names().join(", "),
    })
}

/// Build an optimizer from the global registry.
pub fn optimizer(name: &str) -> DecomposeResult<Arc<dyn Optimizer>> {
    let factory = optimizers()
        .get(name)
        .ok_or_else(|| DecomposeError::UnknownOptimizer {
            name: name.to_string(),
            available: optimizers().names().join(", "),
        })?;
    Ok(factory())
}

fn circuit_model_factory(strategy: ModelStrategy) -> ModelFactory {
    Arc::new(move |request: ModelRequest| {
        let mut builder = CircuitModel::builder(request.target, request.gate_size, request.locations)
            .with_strategy(strategy)
            .with_options(request.options)
            .with_optimizer(request.optimizer)
            .with_seed(request.seed)
            .with_cancel_token(request.cancel);
        if let Some(callback) = request.callback {
            builder = builder.with_callback(callback);
        }
        Ok(Box::new(builder.build()?) as Box<dyn DecompositionModel>)
    })
}

/// The candidate locations, in order, become the fixed structure.
fn fixed_model_factory() -> ModelFactory {
    Arc::new(|request: ModelRequest| {
        let mut builder = FixedModel::builder(request.target, request.gate_size, request.locations)
            .with_options(request.options)
            .with_optimizer(request.optimizer)
            .with_seed(request.seed)
            .with_cancel_token(request.cancel);
        if let Some(callback) = request.callback {
            builder = builder.with_callback(callback);
        }
        Ok(Box::new(builder.build()?) as Box<dyn DecompositionModel>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        assert_eq!(models().names(), vec!["FixedModel", "PermModel", "SoftPauliModel"]);
        assert_eq!(optimizers().names(), vec!["LBFGSOptimizer"]);
    }

    #[test]
    fn test_unknown_names() {
        let err = model_factory("QuantumAnnealer").err().unwrap();
        assert!(matches!(err, DecomposeError::UnknownModel { .. }));
        assert!(err.to_string().contains("PermModel"));

        let err = optimizer("Adam").err().unwrap();
        assert!(matches!(err, DecomposeError::UnknownOptimizer { .. }));
    }

    #[test]
    fn test_register_replaces() {
        let registry: Registry<u32> = Registry::new();
        registry.register("a", 1);
        registry.register("a", 2);
        assert_eq!(registry.get("a"), Some(2));
        assert!(!registry.contains("b"));
    }

    #[test]
    fn test_factory_validates_request() {
        let factory = model_factory("SoftPauliModel").unwrap();
        let request = ModelRequest {
            target: qfast_linalg::identity(4),
            gate_size: 2,
            locations: vec![Location::new(vec![0, 1])],
            optimizer: optimizer("LBFGSOptimizer").unwrap(),
            options: ModelOptions::default(),
            seed: 0,
            callback: None,
            cancel: CancelToken::new(),
        };
        // Gate size must be smaller than the target.
        assert!(matches!(
            factory(request).err().unwrap(),
            DecomposeError::InvalidGateSize { .. }
        ));
    }

    #[test]
    fn test_fixed_factory_uses_locations_as_structure() {
        let factory = model_factory("FixedModel").unwrap();
        let request = ModelRequest {
            target: qfast_linalg::identity(8),
            gate_size: 2,
            locations: vec![Location::new(vec![0, 1]), Location::new(vec![1, 2])],
            optimizer: optimizer("LBFGSOptimizer").unwrap(),
            options: ModelOptions::default(),
            seed: 1,
            callback: None,
            cancel: CancelToken::new(),
        };
        let gates = factory(request).unwrap().solve().unwrap();
        let locations: Vec<_> = gates.iter().map(|g| g.location().clone()).collect();
        assert_eq!(locations, vec![Location::new(vec![0, 1]), Location::new(vec![1, 2])]);
    }
}
