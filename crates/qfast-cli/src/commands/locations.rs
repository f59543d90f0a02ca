//! Locations command implementation.

use anyhow::Result;
use console::style;

use super::common::{TopologyKind, resolve_topology};

/// Execute the locations command.
pub fn execute(
    num_qubits: usize,
    gate_size: usize,
    topology: TopologyKind,
    coupling: Option<&str>,
) -> Result<()> {
    let topology = resolve_topology(num_qubits, Some(topology), coupling)?;
    let locations = topology.get_locations(gate_size)?;

    println!(
        "{} {} connected {gate_size}-qubit locations on {num_qubits} qubits\n",
        style("QFAST").cyan().bold(),
        locations.len()
    );
    for location in locations.iter() {
        println!("  {location}");
    }

    Ok(())
}
