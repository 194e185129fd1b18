use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;

use thiserror::Error;

use crate::model::Instruction;

/// Basic block address; doubles as the node identity inside a graph.
pub type Address = u64;

/// Seed for the per-graph accumulator of `structural_hash`.
const GRAPH_HASH_SEED: u64 = 0x0BAD_DEED_600D_DEED;

/// Seed for each per-edge mix in `structural_hash`.
const EDGE_HASH_SEED: u64 = 0x600D_DEED_0BAD_DEED;

/// Error type for flowgraph construction and (de)serialization.
#[derive(Debug, Error)]
pub enum FlowgraphError {
    /// An operation referenced a block address that is not part of the graph.
    #[error("Unknown node {0:#x}")]
    UnknownNode(Address),

    /// The JSON exchange document could not be parsed or produced.
    #[error("Flowgraph JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a flowgraph file failed.
    #[error("Flowgraph IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for flowgraph operations.
pub type FlowgraphResult<T> = Result<T, FlowgraphError>;

/// How `add_edge` treats endpoints that were never added with `add_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Missing endpoints are created on the fly.
    ///
    /// Disassembler front-ends routinely emit edges before every block is known.
    #[default]
    AutoCreate,
    /// Edges must connect existing nodes; anything else is rejected.
    Strict,
}

/// Direction used when computing BFS distances inside a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Bidirectional,
}

/// In-memory control-flow graph of one function.
///
/// Nodes are block addresses, edges have set semantics (duplicates collapse),
/// and each node may carry an ordered instruction list. All maps are ordered
/// by address so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flowgraph {
    out_edges: BTreeMap<Address, BTreeSet<Address>>,
    in_edges: BTreeMap<Address, BTreeSet<Address>>,
    instructions: BTreeMap<Address, Vec<Instruction>>,
    policy: EdgePolicy,
}

impl Flowgraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with an explicit edge policy.
    pub fn with_policy(policy: EdgePolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    pub fn policy(&self) -> EdgePolicy {
        self.policy
    }

    /// Add a node. Returns `true` if the node was not present before.
    pub fn add_node(&mut self, address: Address) -> bool {
        let inserted = !self.out_edges.contains_key(&address);
        self.out_edges.entry(address).or_default();
        self.in_edges.entry(address).or_default();
        inserted
    }

    /// Add a directed edge. Returns `true` if the edge was not present before.
    ///
    /// Under `EdgePolicy::Strict` an unknown endpoint is an error and the graph
    /// is left untouched.
    pub fn add_edge(&mut self, source: Address, destination: Address) -> FlowgraphResult<bool> {
        if self.policy == EdgePolicy::Strict {
            for endpoint in [source, destination] {
                if !self.has_node(endpoint) {
                    return Err(FlowgraphError::UnknownNode(endpoint));
                }
            }
        }
        self.add_node(source);
        self.add_node(destination);
        let inserted = self.out_edges.entry(source).or_default().insert(destination);
        self.in_edges.entry(destination).or_default().insert(source);
        Ok(inserted)
    }

    /// Associate an instruction list with a node, replacing any previous list.
    ///
    /// Fails with `UnknownNode` (and changes nothing) if the node does not exist.
    pub fn add_instructions(
        &mut self,
        address: Address,
        instructions: Vec<Instruction>,
    ) -> FlowgraphResult<()> {
        if !self.has_node(address) {
            return Err(FlowgraphError::UnknownNode(address));
        }
        if instructions.is_empty() {
            self.instructions.remove(&address);
        } else {
            self.instructions.insert(address, instructions);
        }
        Ok(())
    }

    pub fn has_node(&self, address: Address) -> bool {
        self.out_edges.contains_key(&address)
    }

    /// All node addresses in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = Address> + '_ {
        self.out_edges.keys().copied()
    }

    /// All edges as `(source, destination)`, ascending.
    pub fn edges(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.out_edges
            .iter()
            .flat_map(|(source, targets)| targets.iter().map(move |target| (*source, *target)))
    }

    pub fn node_count(&self) -> usize {
        self.out_edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out_edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.out_edges.is_empty()
    }

    pub fn successors(&self, address: Address) -> impl Iterator<Item = Address> + '_ {
        self.out_edges.get(&address).into_iter().flat_map(|targets| targets.iter().copied())
    }

    pub fn predecessors(&self, address: Address) -> impl Iterator<Item = Address> + '_ {
        self.in_edges.get(&address).into_iter().flat_map(|sources| sources.iter().copied())
    }

    pub fn out_degree(&self, address: Address) -> usize {
        self.out_edges.get(&address).map_or(0, BTreeSet::len)
    }

    pub fn in_degree(&self, address: Address) -> usize {
        self.in_edges.get(&address).map_or(0, BTreeSet::len)
    }

    /// Instructions of a node; empty for unknown nodes or nodes without code.
    pub fn instructions(&self, address: Address) -> &[Instruction] {
        self.instructions.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Instruction lists keyed by block address, ascending.
    pub fn blocks(&self) -> impl Iterator<Item = (Address, &[Instruction])> + '_ {
        self.instructions.iter().map(|(address, insns)| (*address, insns.as_slice()))
    }

    /// Number of nodes with two or more successors.
    ///
    /// Callers use this as a minimum-complexity gate before hashing: tiny
    /// functions produce low-entropy hashes that crowd out real matches.
    pub fn number_of_branching_nodes(&self) -> usize {
        self.out_edges.values().filter(|targets| targets.len() >= 2).count()
    }

    /// Hop distance from `start` to every node, following edges in `direction`.
    ///
    /// Unreachable nodes map to `-1`.
    pub fn distances(&self, start: Address, direction: Direction) -> BTreeMap<Address, i64> {
        let mut order: BTreeMap<Address, i64> = BTreeMap::new();
        if self.has_node(start) {
            let mut worklist = VecDeque::from([start]);
            order.insert(start, 0);
            while let Some(current) = worklist.pop_front() {
                let next = order[&current] + 1;
                for target in self.neighbors(current, direction) {
                    if !order.contains_key(&target) {
                        order.insert(target, next);
                        worklist.push_back(target);
                    }
                }
            }
        }
        self.nodes().map(|node| (node, order.get(&node).copied().unwrap_or(-1))).collect()
    }

    fn neighbors(&self, address: Address, direction: Direction) -> Vec<Address> {
        match direction {
            Direction::Forward => self.successors(address).collect(),
            Direction::Backward => self.predecessors(address).collect(),
            Direction::Bidirectional => {
                let mut all: BTreeSet<Address> = self.successors(address).collect();
                all.extend(self.predecessors(address));
                all.into_iter().collect()
            }
        }
    }

    /// Extract the neighbourhood of `node` up to `distance` hops (ignoring
    /// edge direction), including all edges between the collected nodes.
    ///
    /// Returns `None` if `node` is unknown or the neighbourhood would exceed
    /// `max_size` nodes.
    pub fn subgraph(&self, node: Address, distance: u32, max_size: usize) -> Option<Flowgraph> {
        if !self.has_node(node) {
            return None;
        }
        let mut visited: BTreeMap<Address, u32> = BTreeMap::from([(node, 0)]);
        let mut worklist = VecDeque::from([node]);
        while let Some(current) = worklist.pop_front() {
            let hops = visited[&current];
            if hops >= distance {
                continue;
            }
            for target in self.neighbors(current, Direction::Bidirectional) {
                if visited.contains_key(&target) {
                    continue;
                }
                visited.insert(target, hops + 1);
                if visited.len() > max_size {
                    return None;
                }
                worklist.push_back(target);
            }
        }

        let mut subgraph = Flowgraph::new();
        for address in visited.keys() {
            subgraph.add_node(*address);
        }
        for address in visited.keys() {
            for target in self.successors(*address) {
                if visited.contains_key(&target) {
                    subgraph.out_edges.entry(*address).or_default().insert(target);
                    subgraph.in_edges.entry(target).or_default().insert(*address);
                }
            }
        }
        Some(subgraph)
    }

    /// Address-independent 64-bit hash of the graph's shape as seen from `start`.
    ///
    /// Every edge is described by ten numbers: the forward, backward and
    /// bidirectional BFS distance from `start` plus in/out degree, for both
    /// its source and target. Each number is multiplied by one of the keys and
    /// mixed in with a rotation; per-edge results are summed so edge order
    /// does not matter.
    pub fn structural_hash(&self, start: Address, k0: u64, k1: u64, k2: u64) -> u64 {
        let forward = self.distances(start, Direction::Forward);
        let backward = self.distances(start, Direction::Backward);
        let both = self.distances(start, Direction::Bidirectional);

        let mut result = GRAPH_HASH_SEED;
        for (source, target) in self.edges() {
            let terms = [
                (k0, forward[&source]),
                (k1, backward[&source]),
                (k2, both[&source]),
                (k0, self.in_degree(source) as i64),
                (k1, self.out_degree(source) as i64),
                (k2, forward[&target]),
                (k0, backward[&target]),
                (k1, both[&target]),
                (k2, self.in_degree(target) as i64),
                (k0, self.out_degree(target) as i64),
            ];
            let mut edge_hash = EDGE_HASH_SEED;
            for (key, value) in terms {
                edge_hash = edge_hash.wrapping_add(key.wrapping_mul(value as u64)).rotate_left(7);
            }
            result = result.wrapping_add(edge_hash);
        }
        result
    }

    /// Render the graph in Graphviz DOT syntax.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph G {\n");
        for (source, target) in self.edges() {
            let _ = writeln!(out, "\tblk_{source:x} -> blk_{target:x};");
        }
        out.push_str("}\n");
        out
    }
}
