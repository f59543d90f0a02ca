//! Recombination: stitching native fragments into one program.

use tracing::debug;

use crate::error::{SynthError, SynthResult};
use crate::instantiate::ProgramFragment;
use crate::qasm::{Instruction, emit_program, parse_fragment};

/// Joins instantiated fragments into a single circuit.
pub trait Combiner: Send + Sync {
    /// Registry name of the combiner.
    fn name(&self) -> &str;

    /// Produce one OpenQASM 2 program from fragments in application order.
    fn combine(&self, fragments: &[ProgramFragment]) -> SynthResult<String>;
}

/// Concatenates fragments after translating their local qubit indices
/// through each fragment's location. No gates are merged or cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveCombiner;

impl NaiveCombiner {
    /// Registry name.
    pub const NAME: &'static str = "NaiveCombiner";
}

impl Combiner for NaiveCombiner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn combine(&self, fragments: &[ProgramFragment]) -> SynthResult<String> {
        let mut max_qubit = 0;
        let mut combined: Vec<Instruction> = Vec::new();

        for fragment in fragments {
            let location = fragment.location.qubits();
            if let Some(&highest) = location.iter().max() {
                max_qubit = max_qubit.max(highest);
            }
            let parsed = parse_fragment(&fragment.program)?;
            for mut inst in parsed.instructions {
                inst.qubits = inst
                    .qubits
                    .iter()
                    .map(|&q| {
                        location
                            .get(q)
                            .copied()
                            .ok_or_else(|| SynthError::QubitOutOfLocation {
                                qubit: q,
                                location: location.to_vec(),
                            })
                    })
                    .collect::<SynthResult<Vec<_>>>()?;
                combined.push(inst);
            }
        }

        debug!(
            fragments = fragments.len(),
            instructions = combined.len(),
            "combined fragments"
        );
        Ok(emit_program(max_qubit + 1, &combined))
    }
}
