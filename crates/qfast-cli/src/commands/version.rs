//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - hierarchical unitary decomposition",
        style("QFAST").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qfast-linalg     Pauli bases, matrix exponential and derivative");
    println!("  qfast-decompose  Gradient search over gate placements");
    println!("  qfast-synth      Instantiation and recombination");
    println!("  qfast-cli        Command-line interface");
    println!();
    println!("License: {}", style("Apache-2.0").dim());
}
