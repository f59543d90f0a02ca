//! Qubit connectivity and the gate locations it allows.
//!
//! A [`Topology`] is an undirected coupling graph over `n` qubits. A
//! `k`-qubit location is admissible when the subgraph induced by its qubits
//! is connected, i.e. every pair of qubits in the location is linked directly
//! or through other members of the same location.
//!
//! # Example
//!
//! ```
//! use qfast_decompose::Topology;
//!
//! let chain = Topology::linear(4);
//! let pairs = chain.get_locations(2).unwrap();
//! assert_eq!(pairs.len(), 3);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{DecomposeError, DecomposeResult};
use crate::gate::Location;

/// Undirected coupling graph with a per-size location cache.
///
/// Induced subgraphs requested through [`Topology::get_locations_within`]
/// are cached per location, so every gate placed at the same qubits during
/// a decomposition shares one location cache.
#[derive(Debug)]
pub struct Topology {
    num_qubits: usize,
    /// Connected qubit pairs, each stored once.
    edges: Vec<(usize, usize)>,
    adjacency: FxHashMap<usize, Vec<usize>>,
    locations: RwLock<FxHashMap<usize, Arc<[Location]>>>,
    subtopologies: RwLock<FxHashMap<Location, Arc<Topology>>>,
}

impl Clone for Topology {
    fn clone(&self) -> Self {
        Self::from_valid_edges(self.num_qubits, self.edges.clone())
    }
}

impl Topology {
    /// Build a topology over `num_qubits` qubits.
    ///
    /// `None` means all-to-all. Edges referencing a missing qubit,
    /// self-loops and repeated pairs (in either orientation) are rejected.
    pub fn new(num_qubits: usize, coupling_graph: Option<Vec<(usize, usize)>>) -> DecomposeResult<Self> {
        let Some(edges) = coupling_graph else {
            return Ok(Self::all_to_all(num_qubits));
        };

        let mut seen = Vec::with_capacity(edges.len());
        for &(a, b) in &edges {
            if a >= num_qubits || b >= num_qubits {
                return Err(DecomposeError::InvalidCouplingGraph(format!(
                    "edge ({a}, {b}) references a qubit outside 0..{num_qubits}"
                )));
            }
            if a == b {
                return Err(DecomposeError::InvalidCouplingGraph(format!(
                    "self-loop on qubit {a}"
                )));
            }
            let key = (a.min(b), a.max(b));
            if seen.contains(&key) {
                return Err(DecomposeError::InvalidCouplingGraph(format!(
                    "duplicate edge ({a}, {b})"
                )));
            }
            seen.push(key);
        }
        Ok(Self::from_valid_edges(num_qubits, edges))
    }

    /// Every pair of qubits is coupled.
    pub fn all_to_all(n: usize) -> Self {
        Self::from_valid_edges(n, (0..n).tuple_combinations().collect())
    }

    /// Chain `0-1-2-…`.
    pub fn linear(n: usize) -> Self {
        Self::from_valid_edges(n, (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect())
    }

    /// Chain closed into a cycle.
    pub fn ring(n: usize) -> Self {
        let mut edges: Vec<_> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
        if n > 2 {
            edges.push((n - 1, 0));
        }
        Self::from_valid_edges(n, edges)
    }

    /// Qubit 0 coupled to every other qubit.
    pub fn star(n: usize) -> Self {
        Self::from_valid_edges(n, (1..n).map(|i| (0, i)).collect())
    }

    /// Number of qubits.
    #[inline]
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Coupled pairs.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Qubits coupled to `qubit`.
    pub fn neighbors(&self, qubit: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency
            .get(&qubit)
            .map(|v| v.iter().copied())
            .into_iter()
            .flatten()
    }

    /// Whether two qubits are directly coupled.
    #[inline]
    pub fn is_connected(&self, q1: usize, q2: usize) -> bool {
        self.adjacency
            .get(&q1)
            .is_some_and(|neighbors| neighbors.contains(&q2))
    }

    /// All `gate_size`-qubit locations whose induced subgraph is connected,
    /// in lexicographic order.
    ///
    /// Results are cached per size. The list may be empty when the graph has
    /// no connected group of that size.
    pub fn get_locations(&self, gate_size: usize) -> DecomposeResult<Arc<[Location]>> {
        if gate_size == 0 || gate_size > self.num_qubits {
            return Err(DecomposeError::InvalidGateSize {
                gate_size,
                num_qubits: self.num_qubits,
            });
        }
        if let Some(cached) = read_lock(&self.locations).get(&gate_size) {
            return Ok(Arc::clone(cached));
        }

        let locations: Arc<[Location]> = (0..self.num_qubits)
            .combinations(gate_size)
            .filter(|group| self.is_connected_group(group))
            .map(Location::new)
            .collect();
        debug!(
            gate_size,
            count = locations.len(),
            num_qubits = self.num_qubits,
            "enumerated locations"
        );

        let mut cache = write_lock(&self.locations);
        Ok(Arc::clone(cache.entry(gate_size).or_insert(locations)))
    }

    /// Connected `gate_size`-qubit locations inside `location`, numbered
    /// relative to it (`location[i]` is qubit `i`).
    ///
    /// The full register in canonical order is served from this topology's
    /// own cache; any other location goes through a cached
    /// [`subtopology`](Self::subtopology).
    pub fn get_locations_within(
        &self,
        location: &Location,
        gate_size: usize,
    ) -> DecomposeResult<Arc<[Location]>> {
        if *location == Location::identity(self.num_qubits) {
            return self.get_locations(gate_size);
        }
        self.cached_subtopology(location)?.get_locations(gate_size)
    }

    /// Shared induced subgraph on `location`, built on first use.
    pub fn cached_subtopology(&self, location: &Location) -> DecomposeResult<Arc<Topology>> {
        if let Some(sub) = read_lock(&self.subtopologies).get(location) {
            return Ok(Arc::clone(sub));
        }
        let sub = Arc::new(self.subtopology(location)?);
        let mut cache = write_lock(&self.subtopologies);
        Ok(Arc::clone(cache.entry(location.clone()).or_insert(sub)))
    }

    /// Gate sizes whose location lists are cached, ascending.
    pub fn cached_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = read_lock(&self.locations).keys().copied().collect();
        sizes.sort_unstable();
        sizes
    }

    /// Locations whose induced subgraph is cached, sorted.
    pub fn cached_subtopologies(&self) -> Vec<Location> {
        let mut locations: Vec<Location> = read_lock(&self.subtopologies).keys().cloned().collect();
        locations.sort();
        locations
    }

    /// Induced subgraph on `location`, relabelled so that `location[i]`
    /// becomes qubit `i`.
    pub fn subtopology(&self, location: &Location) -> DecomposeResult<Topology> {
        location.validate(self.num_qubits)?;
        let index: FxHashMap<usize, usize> = location
            .qubits()
            .iter()
            .enumerate()
            .map(|(i, &q)| (q, i))
            .collect();
        let edges = self
            .edges
            .iter()
            .filter_map(|(a, b)| Some((*index.get(a)?, *index.get(b)?)))
            .collect();
        Ok(Self::from_valid_edges(location.len(), edges))
    }

    /// Drop every cached location list and subgraph.
    pub fn clear_cache(&self) {
        write_lock(&self.locations).clear();
        write_lock(&self.subtopologies).clear();
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn from_valid_edges(num_qubits: usize, edges: Vec<(usize, usize)>) -> Self {
        let mut adjacency: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for &(a, b) in &edges {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
        Self {
            num_qubits,
            edges,
            adjacency,
            locations: RwLock::new(FxHashMap::default()),
            subtopologies: RwLock::new(FxHashMap::default()),
        }
    }

    /// BFS from the first member, visiting only members.
    fn is_connected_group(&self, group: &[usize]) -> bool {
        let Some(&start) = group.first() else {
            return false;
        };
        let mut seen = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for neighbor in self.neighbors(current) {
                if group.contains(&neighbor) && !seen.contains(&neighbor) {
                    seen.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
        seen.len() == group.len()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(q: &[usize]) -> Location {
        Location::from(q)
    }

    #[test]
    fn test_all_to_all_counts() {
        let topology = Topology::new(5, None).unwrap();
        assert_eq!(topology.edges().len(), 10);
        assert_eq!(topology.get_locations(2).unwrap().len(), 10);
        assert_eq!(topology.get_locations(3).unwrap().len(), 10);
        assert_eq!(topology.get_locations(5).unwrap().len(), 1);
    }

    #[test]
    fn test_linear_locations_are_windows() {
        let topology = Topology::linear(5);
        let triples = topology.get_locations(3).unwrap();
        assert_eq!(&*triples, &[loc(&[0, 1, 2]), loc(&[1, 2, 3]), loc(&[2, 3, 4])]);
    }

    #[test]
    fn test_ring_and_star() {
        let ring = Topology::ring(4);
        assert!(ring.is_connected(3, 0));
        assert_eq!(ring.get_locations(2).unwrap().len(), 4);

        let star = Topology::star(4);
        assert_eq!(star.neighbors(0).count(), 3);
        // Any pair of leaves is disconnected without the hub.
        assert_eq!(star.get_locations(2).unwrap().len(), 3);
        assert_eq!(star.get_locations(3).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_graphs() {
        assert!(matches!(
            Topology::new(3, Some(vec![(0, 3)])),
            Err(DecomposeError::InvalidCouplingGraph(_))
        ));
        assert!(Topology::new(3, Some(vec![(1, 1)])).is_err());
        assert!(Topology::new(3, Some(vec![(0, 1), (1, 0)])).is_err());
    }

    #[test]
    fn test_invalid_gate_size() {
        let topology = Topology::linear(3);
        assert!(topology.get_locations(0).is_err());
        assert!(topology.get_locations(4).is_err());
    }

    #[test]
    fn test_subtopology_relabels() {
        let topology = Topology::linear(5);
        let sub = topology.subtopology(&loc(&[3, 1, 2])).unwrap();
        assert_eq!(sub.num_qubits(), 3);
        // 1-2 becomes 1-2, 2-3 becomes 2-0.
        assert!(sub.is_connected(1, 2));
        assert!(sub.is_connected(2, 0));
        assert!(!sub.is_connected(0, 1));
    }

    #[test]
    fn test_cache_is_reused_and_cleared() {
        let topology = Topology::all_to_all(4);
        let first = topology.get_locations(2).unwrap();
        let second = topology.get_locations(2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        topology.clear_cache();
        let third = topology.get_locations(2).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first, third);
    }

    #[test]
    fn test_locations_within_full_register_use_own_cache() {
        let topology = Topology::linear(4);
        let within = topology.get_locations_within(&Location::identity(4), 2).unwrap();
        assert!(Arc::ptr_eq(&within, &topology.get_locations(2).unwrap()));
        assert!(topology.cached_subtopologies().is_empty());
    }

    #[test]
    fn test_locations_within_share_subtopology() {
        let topology = Topology::linear(5);
        let first = topology.get_locations_within(&loc(&[1, 2, 3]), 2).unwrap();
        let second = topology.get_locations_within(&loc(&[1, 2, 3]), 2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*first, &[loc(&[0, 1]), loc(&[1, 2])]);
        assert_eq!(topology.cached_subtopologies(), vec![loc(&[1, 2, 3])]);
        assert!(topology.cached_sizes().is_empty());

        topology.clear_cache();
        assert!(topology.cached_subtopologies().is_empty());
    }
}
