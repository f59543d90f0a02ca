//! Decompose command implementation.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use qfast_decompose::{Decomposer, Gate, circuit_unitary, gates_to_json, load_unitary};
use qfast_linalg::{hilbert_schmidt_distance, qubit_count};

use super::common::{TopologyKind, load_config, resolve_topology};

/// Arguments of the decompose command.
pub struct DecomposeArgs {
    pub input: String,
    pub output: Option<String>,
    pub config: Option<String>,
    pub gate_size: Option<usize>,
    pub model: Option<String>,
    pub optimizer: Option<String>,
    pub topology: Option<TopologyKind>,
    pub coupling: Option<String>,
    pub seed: Option<u64>,
    pub parallel: bool,
    pub timeout: Option<f64>,
}

/// Execute the decompose command.
pub fn execute(args: &DecomposeArgs) -> Result<()> {
    eprintln!(
        "{} Decomposing {}",
        style("→").cyan().bold(),
        style(&args.input).green()
    );

    let target = load_unitary(&args.input)
        .with_context(|| format!("Failed to load unitary: {}", args.input))?;
    let num_qubits = qubit_count(&target)?;
    eprintln!("  Loaded: {num_qubits} qubits");

    // Flags override the config file.
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Default::default(),
    };
    if let Some(size) = args.gate_size {
        config.target_gate_size = size;
    }
    if let Some(model) = &args.model {
        config.model.clone_from(model);
    }
    if let Some(optimizer) = &args.optimizer {
        config.optimizer.clone_from(optimizer);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.parallel {
        config.parallel = true;
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.topology.is_some() || args.coupling.is_some() {
        let topology = resolve_topology(num_qubits, args.topology, args.coupling.as_deref())?;
        config.coupling_graph = Some(topology.edges().to_vec());
    }

    debug!(?config, "resolved decomposer config");
    eprintln!(
        "  Target gate size {}, model {}, optimizer {}",
        config.target_gate_size,
        style(&config.model).yellow(),
        style(&config.optimizer).yellow()
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Searching...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let progress = spinner.clone();
    let decomposer = Decomposer::new(target.clone(), config)?.with_intermediate_callback(Arc::new(
        move |gates: &[Gate]| {
            let widest = gates.iter().map(Gate::num_qubits).max().unwrap_or(0);
            progress.set_message(format!("{} gates, widest {widest} qubits", gates.len()));
        },
    ));

    let start = Instant::now();
    let result = decomposer.decompose();
    spinner.finish_and_clear();
    let gates = result?;
    let elapsed = start.elapsed();

    let product = circuit_unitary(&gates, num_qubits)?;
    let distance = hilbert_schmidt_distance(&target, &product);
    info!(
        gates = gates.len(),
        distance,
        elapsed_ms = elapsed.as_millis() as u64,
        "decomposition finished"
    );

    eprintln!(
        "{} Decomposition complete in {:.2}s",
        style("✓").green().bold(),
        elapsed.as_secs_f64()
    );
    eprintln!("  Result: {} gates, distance {distance:.3e}", gates.len());

    let json = gates_to_json(&gates)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write file: {path}"))?;
            eprintln!("  Output: {}", style(path).green());
        }
        None => println!("{json}"),
    }

    Ok(())
}
