//! QFAST Command-Line Interface
//!
//! The main entry point for the `qfast` tool.
//!
//! ```text
//!   unitary.txt ──▶ qfast decompose ──▶ gates.json
//!
//!   qfast locations -n 5 -k 3 --topology linear
//!   qfast plugins
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::TopologyKind;
use commands::{decompose, locations, plugins, version};

/// QFAST - hierarchical unitary decomposition for quantum synthesis
#[derive(Parser)]
#[command(name = "qfast")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a unitary into gates of bounded size
    Decompose {
        /// Input file with one matrix row per line
        #[arg(short, long)]
        input: String,

        /// Output file for the gate list (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Decomposer configuration (YAML or JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Largest gate size in the output
        #[arg(short = 'k', long)]
        gate_size: Option<usize>,

        /// Registered model name
        #[arg(short, long)]
        model: Option<String>,

        /// Registered optimizer name
        #[arg(long)]
        optimizer: Option<String>,

        /// Named coupling graph (full, linear, ring, star)
        #[arg(short, long)]
        topology: Option<TopologyKind>,

        /// Explicit coupling graph, e.g. "0-1,1-2"
        #[arg(long, conflicts_with = "topology")]
        coupling: Option<String>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Solve the gates of one round concurrently
        #[arg(long)]
        parallel: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// List the connected qubit groups of a coupling graph
    Locations {
        /// Number of qubits
        #[arg(short = 'n', long)]
        qubits: usize,

        /// Group size
        #[arg(short = 'k', long, default_value = "2")]
        gate_size: usize,

        /// Named coupling graph (full, linear, ring, star)
        #[arg(short, long, default_value = "full")]
        topology: TopologyKind,

        /// Explicit coupling graph, e.g. "0-1,1-2"
        #[arg(long)]
        coupling: Option<String>,
    },

    /// List registered models, optimizers, tools and combiners
    Plugins,

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Decompose {
            input,
            output,
            config,
            gate_size,
            model,
            optimizer,
            topology,
            coupling,
            seed,
            parallel,
            timeout,
        } => decompose::execute(&decompose::DecomposeArgs {
            input,
            output,
            config,
            gate_size,
            model,
            optimizer,
            topology,
            coupling,
            seed,
            parallel,
            timeout,
        }),

        Commands::Locations {
            qubits,
            gate_size,
            topology,
            coupling,
        } => locations::execute(qubits, gate_size, topology, coupling.as_deref()),

        Commands::Plugins => {
            plugins::execute();
            Ok(())
        }

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
