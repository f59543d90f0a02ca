//! CLI argument parsing and workflow tests.
//!
//! The CLI is a binary crate, so clap parsing is checked on a mirror of the
//! command structs and the decompose workflow is driven through the library
//! calls the command makes.

// ============================================================================
// Clap argument parsing
// ============================================================================

mod clap_parsing {
    use clap::{Parser, Subcommand, ValueEnum};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    enum TestTopology {
        Full,
        Linear,
        Ring,
        Star,
    }

    #[derive(Parser)]
    #[command(name = "qfast")]
    struct TestCli {
        #[arg(short, long, action = clap::ArgAction::Count, global = true)]
        verbose: u8,

        #[command(subcommand)]
        command: TestCommands,
    }

    #[derive(Subcommand)]
    enum TestCommands {
        Decompose {
            #[arg(short, long)]
            input: String,
            #[arg(short, long)]
            output: Option<String>,
            #[arg(short, long)]
            config: Option<String>,
            #[arg(short = 'k', long)]
            gate_size: Option<usize>,
            #[arg(short, long)]
            model: Option<String>,
            #[arg(long)]
            optimizer: Option<String>,
            #[arg(short, long)]
            topology: Option<TestTopology>,
            #[arg(long, conflicts_with = "topology")]
            coupling: Option<String>,
            #[arg(short, long)]
            seed: Option<u64>,
            #[arg(long)]
            parallel: bool,
            #[arg(long)]
            timeout: Option<f64>,
        },
        Locations {
            #[arg(short = 'n', long)]
            qubits: usize,
            #[arg(short = 'k', long, default_value = "2")]
            gate_size: usize,
            #[arg(short, long, default_value = "full")]
            topology: TestTopology,
            #[arg(long)]
            coupling: Option<String>,
        },
        Plugins,
        Version,
    }

    #[test]
    fn test_decompose_minimal() {
        let cli = TestCli::try_parse_from(["qfast", "decompose", "-i", "u.txt"]).unwrap();
        match cli.command {
            TestCommands::Decompose {
                input,
                gate_size,
                topology,
                parallel,
                ..
            } => {
                assert_eq!(input, "u.txt");
                assert_eq!(gate_size, None);
                assert_eq!(topology, None);
                assert!(!parallel);
            }
            _ => panic!("expected decompose"),
        }
    }

    #[test]
    fn test_decompose_all_flags() {
        let cli = TestCli::try_parse_from([
            "qfast", "-vv", "decompose", "-i", "u.txt", "-o", "g.json", "-k", "3", "-m",
            "SoftPauliModel", "-t", "linear", "-s", "7", "--parallel", "--timeout", "2.5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            TestCommands::Decompose {
                output,
                gate_size,
                model,
                topology,
                seed,
                parallel,
                timeout,
                ..
            } => {
                assert_eq!(output.as_deref(), Some("g.json"));
                assert_eq!(gate_size, Some(3));
                assert_eq!(model.as_deref(), Some("SoftPauliModel"));
                assert_eq!(topology, Some(TestTopology::Linear));
                assert_eq!(seed, Some(7));
                assert!(parallel);
                assert_eq!(timeout, Some(2.5));
            }
            _ => panic!("expected decompose"),
        }
    }

    #[test]
    fn test_topology_and_coupling_conflict() {
        let result = TestCli::try_parse_from([
            "qfast", "decompose", "-i", "u.txt", "-t", "ring", "--coupling", "0-1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_topology_rejected() {
        let result = TestCli::try_parse_from(["qfast", "locations", "-n", "4", "-t", "grid"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_locations_defaults() {
        let cli = TestCli::try_parse_from(["qfast", "locations", "-n", "5"]).unwrap();
        match cli.command {
            TestCommands::Locations {
                qubits,
                gate_size,
                topology,
                coupling,
            } => {
                assert_eq!(qubits, 5);
                assert_eq!(gate_size, 2);
                assert_eq!(topology, TestTopology::Full);
                assert!(coupling.is_none());
            }
            _ => panic!("expected locations"),
        }
    }

    #[test]
    fn test_unit_subcommands() {
        assert!(matches!(
            TestCli::try_parse_from(["qfast", "plugins"]).unwrap().command,
            TestCommands::Plugins
        ));
        assert!(matches!(
            TestCli::try_parse_from(["qfast", "version"]).unwrap().command,
            TestCommands::Version
        ));
    }

    #[test]
    fn test_missing_input_rejected() {
        assert!(TestCli::try_parse_from(["qfast", "decompose"]).is_err());
    }
}

// ============================================================================
// Decompose workflow
// ============================================================================

mod decompose_workflow {
    use std::fs;

    use qfast_decompose::{
        Decomposer, DecomposerConfig, ErrorKind, circuit_unitary, gates_from_json, gates_to_json,
        load_unitary,
    };

    const CNOT_I: &str = "\
1 0 0 0 0 0 0 0
0 1 0 0 0 0 0 0
0 0 1 0 0 0 0 0
0 0 0 1 0 0 0 0
0 0 0 0 0 0 1 0
0 0 0 0 0 0 0 1
0 0 0 0 1 0 0 0
0 0 0 0 0 1 0 0
";

    #[test]
    fn test_file_to_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cnot.txt");
        fs::write(&input, CNOT_I).unwrap();

        let config_path = dir.path().join("cfg.yaml");
        fs::write(&config_path, "target_gate_size: 2\nseed: 3\n").unwrap();
        let config: DecomposerConfig =
            serde_yaml_ng::from_str(&fs::read_to_string(&config_path).unwrap()).unwrap();

        let target = load_unitary(&input).unwrap();
        let gates = Decomposer::new(target.clone(), config).unwrap().decompose().unwrap();

        let json = gates_to_json(&gates).unwrap();
        let restored = gates_from_json(&json).unwrap();
        assert_eq!(restored.len(), gates.len());
        assert!(restored.iter().all(|g| g.num_qubits() <= 2));

        let product = circuit_unitary(&restored, 3).unwrap();
        assert!(qfast_linalg::hilbert_schmidt_distance(&target, &product) < 1e-3);
    }

    #[test]
    fn test_ragged_input_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.txt");
        fs::write(&input, "1 0\n0 1 0\n").unwrap();
        let err = load_unitary(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
