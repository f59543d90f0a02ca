//! Named native tools and combiners.
//!
//! No native tool ships with the crate; embedders register one with
//! [`register_tool`] before calling [`synthesize`](crate::synthesize).

use std::sync::{Arc, OnceLock};

use qfast_decompose::Registry;

use crate::combine::{Combiner, NaiveCombiner};
use crate::error::{SynthError, SynthResult};
use crate::instantiate::NativeTool;

/// Process-wide native tool registry.
pub fn tools() -> &'static Registry<Arc<dyn NativeTool>> {
    static TOOLS: OnceLock<Registry<Arc<dyn NativeTool>>> = OnceLock::new();
    TOOLS.get_or_init(Registry::new)
}

/// Process-wide combiner registry, holding `NaiveCombiner` by default.
pub fn combiners() -> &'static Registry<Arc<dyn Combiner>> {
    static COMBINERS: OnceLock<Registry<Arc<dyn Combiner>>> = OnceLock::new();
    COMBINERS.get_or_init(|| {
        let registry: Registry<Arc<dyn Combiner>> = Registry::new();
        registry.register(NaiveCombiner::NAME, Arc::new(NaiveCombiner));
        registry
    })
}

/// Register `tool` under its own name.
pub fn register_tool(tool: Arc<dyn NativeTool>) {
    let name = tool.name().to_string();
    tools().register(name, tool);
}

/// Register `combiner` under its own name.
pub fn register_combiner(combiner: Arc<dyn Combiner>) {
    let name = combiner.name().to_string();
    combiners().register(name, combiner);
}

/// Look up a native tool.
pub fn tool(name: &str) -> SynthResult<Arc<dyn NativeTool>> {
    tools().get(name).ok_or_else(|| SynthError::UnknownTool {
        name: name.to_string(),
        available: tools().names().join(", "),
    })
}

/// Look up a combiner.
pub fn combiner(name: &str) -> SynthResult<Arc<dyn Combiner>> {
    combiners().get(name).ok_or_else(|| SynthError::UnknownCombiner {
        name: name.to_string(),
        available: combiners().names().join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_combiner() {
        assert_eq!(combiner("NaiveCombiner").unwrap().name(), "NaiveCombiner");
        assert!(matches!(
            combiner("SmartCombiner"),
            Err(SynthError::UnknownCombiner { .. })
        ));
    }

    #[test]
    fn test_unknown_tool() {
        assert!(matches!(tool("KAKTool"), Err(SynthError::UnknownTool { .. })));
    }
}
