//! Instantiation: turning small generic gates into native programs.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use qfast_decompose::{Gate, Location, Topology};
use qfast_linalg::CMatrix;

use crate::error::{SynthError, SynthResult};

/// Default native basis handed to tools.
pub const DEFAULT_BASIS_GATES: [&str; 2] = ["u3", "cx"];

/// External synthesizer for small unitaries.
///
/// Implementations wrap a numerical or analytic compiler that can express a
/// unitary of at most [`maximum_gate_size`](Self::maximum_gate_size) qubits
/// in a native gate set.
pub trait NativeTool: Send + Sync {
    /// Registry name of the tool.
    fn name(&self) -> &str;

    /// Widest unitary the tool accepts.
    fn maximum_gate_size(&self) -> usize;

    /// Compile `unitary` into an OpenQASM 2 program over one register.
    ///
    /// `coupling` lists the connected qubit pairs of the gate in local
    /// indices; `basis_gates` names the gates the program may use.
    fn synthesize(
        &self,
        unitary: &CMatrix,
        coupling: &[(usize, usize)],
        basis_gates: &[String],
    ) -> SynthResult<String>;
}

/// A native program together with the qubits it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramFragment {
    /// OpenQASM 2 text using local indices `0..location.len()`.
    pub program: String,
    /// Global qubits that local index `i` maps to.
    pub location: Location,
}

/// Runs a native tool on every gate of a decomposition.
#[derive(Clone)]
pub struct Instantiater {
    tool: Arc<dyn NativeTool>,
    basis_gates: Vec<String>,
}

impl fmt::Debug for Instantiater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instantiater")
            .field("tool", &self.tool.name())
            .field("basis_gates", &self.basis_gates)
            .finish()
    }
}

impl Instantiater {
    /// Create an instantiater with the default basis.
    pub fn new(tool: Arc<dyn NativeTool>) -> Self {
        Self {
            tool,
            basis_gates: DEFAULT_BASIS_GATES.iter().map(|g| (*g).to_string()).collect(),
        }
    }

    /// Set the native basis.
    #[must_use]
    pub fn with_basis_gates(mut self, basis_gates: Vec<String>) -> Self {
        self.basis_gates = basis_gates;
        self
    }

    /// The wrapped tool.
    pub fn tool(&self) -> &Arc<dyn NativeTool> {
        &self.tool
    }

    /// Compile each gate, passing the coupling graph induced on its location.
    pub fn instantiate(&self, gates: &[Gate], topology: &Topology) -> SynthResult<Vec<ProgramFragment>> {
        let maximum = self.tool.maximum_gate_size();
        gates
            .iter()
            .map(|gate| {
                if gate.num_qubits() > maximum {
                    return Err(SynthError::GateTooLarge {
                        tool: self.tool.name().to_string(),
                        maximum,
                        gate_size: gate.num_qubits(),
                    });
                }
                let coupling = topology.subtopology(gate.location())?;
                let program = self
                    .tool
                    .synthesize(gate.unitary(), coupling.edges(), &self.basis_gates)?;
                debug!(location = %gate.location(), bytes = program.len(), "instantiated gate");
                Ok(ProgramFragment {
                    program,
                    location: gate.location().clone(),
                })
            })
            .collect()
    }
}
