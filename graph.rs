//! Edge list + per-node adjacency over hyperedges with coefficients (C2).
//!
//! Grounded on `original_source/cpp/graph/{graph.h,edge.h,node.h,properties.h}`. Node/edge
//! back-references resolve to integer indices into `Vec` arenas, never pointers, per Design
//! Note "Cyclic graph references".

use crate::error::{QioError, QioResult};
use std::collections::HashMap;

/// One polynomial term: `c · Π_{i in ids} x_i`, locality = `ids.len()`.
#[derive(Clone, Debug)]
pub struct Edge {
    pub cost: f64,
    pub node_ids: Vec<usize>,
}

impl Edge {
    pub fn locality(&self) -> usize {
        self.node_ids.len()
    }

    pub fn sort_node_ids(&mut self) {
        self.node_ids.sort_unstable();
    }
}

/// A node (renumbered variable) with back-references to every edge it participates in.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub edge_ids: Vec<usize>,
}

impl Node {
    pub fn sort_edge_ids(&mut self) {
        self.edge_ids.sort_unstable();
    }
}

/// A raw, pre-renumbering term as read off the wire (original variable ids, which may be
/// sparse and non-contiguous).
#[derive(Clone, Debug)]
pub struct RawTerm {
    pub cost: f64,
    pub ids: Vec<i64>,
}

/// Construction-time statistics (spec §3 "Graph statistics").
#[derive(Clone, Debug, Default)]
pub struct GraphStatistics {
    pub min_locality: usize,
    pub max_locality: usize,
    pub avg_locality: f64,
    pub total_locality: usize,
    pub accumulated_dependent_vars: u64,
    pub min_coupling_magnitude: f64,
    pub max_coupling_magnitude: f64,
    pub const_cost: f64,
}

impl GraphStatistics {
    /// Rescale factor per spec §3: `1/max|c_e|` if that exceeds 1, else 1 (no-op).
    pub fn rescale_factor(&self) -> f64 {
        if self.max_coupling_magnitude > 1.0 {
            1.0 / self.max_coupling_magnitude
        } else {
            1.0
        }
    }
}

/// Edge list + bidirectional adjacency over a dense `[0, N)` variable range.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: GraphStatistics,
    /// Dense internal id -> original user-facing id, preserved for output rendering.
    pub node_id_to_name: Vec<i64>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Build a graph from raw terms, renumbering variable ids to a dense `[0,N)` range and
    /// accumulating `GraphStatistics` as it goes. Constant (empty-`ids`) terms are folded
    /// into `stats.const_cost` and dropped. Mirrors `graph::normalize_edges` in the teacher
    /// C++ (`original_source/cpp/graph/graph.h`).
    ///
    /// `allow_dup_merge` controls whether a repeated variable id within one term is an
    /// error (`QioError::DuplicatedVariable`) or silently collapsed to a single occurrence.
    pub fn from_raw_terms(raw: &[RawTerm], allow_dup_merge: bool) -> QioResult<Self> {
        if raw.is_empty() {
            return Err(QioError::ParsingError("`terms`: size must be greater than 0".into()));
        }

        let mut name_to_id: HashMap<i64, usize> = HashMap::new();
        let mut node_id_to_name: Vec<i64> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut stats = GraphStatistics {
            min_locality: usize::MAX,
            max_coupling_magnitude: f64::MIN,
            min_coupling_magnitude: f64::MAX,
            ..Default::default()
        };

        for term in raw {
            let mut seen = std::collections::HashSet::new();
            let mut ids = Vec::with_capacity(term.ids.len());
            for &original_id in &term.ids {
                let internal_id = *name_to_id.entry(original_id).or_insert_with(|| {
                    let id = node_id_to_name.len();
                    node_id_to_name.push(original_id);
                    nodes.push(Node::default());
                    id
                });
                if seen.insert(internal_id) {
                    ids.push(internal_id);
                } else if !allow_dup_merge {
                    return Err(QioError::DuplicatedVariable(format!(
                        "variable {original_id} repeated in term"
                    )));
                }
            }
            ids.sort_unstable();

            let locality = ids.len();
            if locality > 0 {
                stats.max_locality = stats.max_locality.max(locality);
                stats.min_locality = stats.min_locality.min(locality);
                stats.accumulated_dependent_vars += (locality * locality.saturating_sub(1)) as u64;
                stats.total_locality += locality;
                let abs_cost = term.cost.abs();
                stats.max_coupling_magnitude = stats.max_coupling_magnitude.max(abs_cost);
                stats.min_coupling_magnitude = stats.min_coupling_magnitude.min(abs_cost);

                let edge_id = edges.len();
                for &nid in &ids {
                    nodes[nid].edge_ids.push(edge_id);
                }
                edges.push(Edge { cost: term.cost, node_ids: ids });
            } else {
                stats.const_cost += term.cost;
            }
        }

        if edges.is_empty() {
            stats.min_locality = 0;
            stats.avg_locality = 0.0;
            stats.min_coupling_magnitude = 0.0;
            stats.max_coupling_magnitude = 0.0;
        } else {
            stats.avg_locality = stats.total_locality as f64 / edges.len() as f64;
        }

        Ok(Graph { nodes, edges, stats, node_id_to_name })
    }

    /// Sort every node's edge-id list and every edge's node-id list. Does not change the
    /// stable `node_id`/`edge_id` numbering (spec §3 invariant (a)/(b)).
    pub fn sort(&mut self) {
        for node in &mut self.nodes {
            node.sort_edge_ids();
        }
        for edge in &mut self.edges {
            edge.sort_node_ids();
        }
    }

    /// Validate the bidirectional-adjacency invariants (spec §3):
    /// every node-listed edge id is valid and lists the node back exactly once.
    pub fn validate(&self) -> QioResult<()> {
        for (node_id, node) in self.nodes.iter().enumerate() {
            for &edge_id in &node.edge_ids {
                let edge = self.edges.get(edge_id).ok_or_else(|| {
                    QioError::Invariant(format!("node {node_id} references missing edge {edge_id}"))
                })?;
                let count = edge.node_ids.iter().filter(|&&n| n == node_id).count();
                if count != 1 {
                    return Err(QioError::Invariant(format!(
                        "edge {edge_id} lists node {node_id} {count} times, expected 1"
                    )));
                }
            }
        }
        Ok(())
    }
}
