//! Helpers shared by several commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;

use qfast_decompose::{DecomposerConfig, Topology};

/// Named coupling graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TopologyKind {
    /// Every pair coupled.
    Full,
    /// Nearest-neighbour chain.
    Linear,
    /// Chain closed into a cycle.
    Ring,
    /// Qubit 0 coupled to every other qubit.
    Star,
}

impl TopologyKind {
    /// Build the graph on `num_qubits` qubits.
    pub fn build(self, num_qubits: usize) -> Topology {
        match self {
            TopologyKind::Full => Topology::all_to_all(num_qubits),
            TopologyKind::Linear => Topology::linear(num_qubits),
            TopologyKind::Ring => Topology::ring(num_qubits),
            TopologyKind::Star => Topology::star(num_qubits),
        }
    }
}

/// Parse an edge list such as `"0-1, 1-2"`.
pub fn parse_coupling(list: &str) -> Result<Vec<(usize, usize)>> {
    list.split(',')
        .map(str::trim)
        .filter(|edge| !edge.is_empty())
        .map(|edge| {
            let (a, b) = edge
                .split_once('-')
                .with_context(|| format!("Invalid edge '{edge}', expected 'a-b'"))?;
            let a = a
                .trim()
                .parse()
                .with_context(|| format!("Invalid qubit index in edge '{edge}'"))?;
            let b = b
                .trim()
                .parse()
                .with_context(|| format!("Invalid qubit index in edge '{edge}'"))?;
            Ok((a, b))
        })
        .collect()
}

/// Resolve the topology selected on the command line.
///
/// An explicit edge list wins over a named graph; `None` for both means
/// all-to-all.
pub fn resolve_topology(
    num_qubits: usize,
    kind: Option<TopologyKind>,
    coupling: Option<&str>,
) -> Result<Topology> {
    if let Some(list) = coupling {
        let edges = parse_coupling(list)?;
        return Topology::new(num_qubits, Some(edges)).context("Invalid coupling graph");
    }
    Ok(kind.unwrap_or(TopologyKind::Full).build(num_qubits))
}

/// Load a decomposer configuration; `.json` files are read as JSON,
/// everything else as YAML.
pub fn load_config(path: &str) -> Result<DecomposerConfig> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if ext == "json" {
        serde_json::from_str(&source).with_context(|| format!("Invalid JSON config: {path}"))
    } else {
        serde_yaml_ng::from_str(&source).with_context(|| format!("Invalid YAML config: {path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coupling() {
        assert_eq!(
            parse_coupling("0-1, 1-2,2 - 3").unwrap(),
            vec![(0, 1), (1, 2), (2, 3)]
        );
        assert!(parse_coupling("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_coupling_errors() {
        assert!(parse_coupling("0:1").is_err());
        assert!(parse_coupling("0-x").is_err());
    }

    #[test]
    fn test_resolve_topology() {
        let linear = resolve_topology(4, Some(TopologyKind::Linear), None).unwrap();
        assert_eq!(linear.edges().len(), 3);

        let explicit = resolve_topology(3, Some(TopologyKind::Star), Some("0-2")).unwrap();
        assert_eq!(explicit.edges(), &[(0, 2)]);

        let full = resolve_topology(4, None, None).unwrap();
        assert_eq!(full.edges().len(), 6);

        assert!(resolve_topology(3, None, Some("0-5")).is_err());
    }

    #[test]
    fn test_load_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("cfg.yaml");
        fs::write(&yaml, "target_gate_size: 3\nmodel: SoftPauliModel\n").unwrap();
        let config = load_config(yaml.to_str().unwrap()).unwrap();
        assert_eq!(config.target_gate_size, 3);
        assert_eq!(config.model, "SoftPauliModel");

        let json = dir.path().join("cfg.json");
        fs::write(&json, r#"{"seed": 9, "parallel": true}"#).unwrap();
        let config = load_config(json.to_str().unwrap()).unwrap();
        assert_eq!(config.seed, 9);
        assert!(config.parallel);
        assert_eq!(config.target_gate_size, 2);
    }
}
