//! `qfast-synth`: instantiation and recombination for QFAST.
//!
//! Completes the synthesis pipeline started by `qfast-decompose`:
//!
//! ```text
//! unitary ──Decomposer──▶ small gates ──NativeTool──▶ QASM fragments ──Combiner──▶ QASM
//! ```
//!
//! Native tools are external compilers for small unitaries and are
//! registered at runtime through [`register_tool`]. The built-in
//! [`NaiveCombiner`] relabels each fragment's qubits through its location and
//! concatenates the results.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use qfast_synth::{SynthesisConfig, register_tool, synthesize};
//! # fn run(target: qfast_linalg::CMatrix, tool: Arc<dyn qfast_synth::NativeTool>) -> qfast_synth::SynthResult<()> {
//! register_tool(tool);
//! let qasm = synthesize(target, &SynthesisConfig::default().with_tool("MyTool"))?;
//! println!("{qasm}");
//! # Ok(())
//! # }
//! ```

pub mod combine;
pub mod error;
pub mod instantiate;
pub mod pipeline;
pub mod qasm;
pub mod registry;

pub use combine::{Combiner, NaiveCombiner};
pub use error::{SynthError, SynthResult};
pub use instantiate::{DEFAULT_BASIS_GATES, Instantiater, NativeTool, ProgramFragment};
pub use pipeline::{SynthesisConfig, synthesize, synthesize_with};
pub use registry::{combiner, combiners, register_combiner, register_tool, tool, tools};
