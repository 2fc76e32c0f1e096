//! Ising model: spin variables in `{-1,+1}`, term value = `c_e · Π s_i` (spec §4.1).
//!
//! Grounded on `original_source/cpp/model/ising.h`. The cached form (`TermCached` in the
//! C++) stores one sign bit per edge — flipping any single participating spin always flips
//! the edge's parity, so `Δ = -2 · Σ_{e incident to v} c_e · sign_e`.

use crate::error::QioResult;
use crate::graph::{Graph, RawTerm};
use crate::model::{karmarkar_karp_min_diff, triangle_inequality_max_diff, CostModel};
use crate::rng::Rng64;
use std::collections::HashMap;

/// Spin assignment plus the per-edge sign cache (`Π_{i in e} s_i`, +1 or -1).
#[derive(Clone, Debug)]
pub struct IsingState {
    /// `true` means spin is -1 ("is -1" bit per spec §4.1's encoding note).
    pub is_minus: Vec<bool>,
    pub edge_sign: Vec<f64>,
}

impl IsingState {
    #[inline]
    pub fn spin(&self, i: usize) -> f64 {
        if self.is_minus[i] { -1.0 } else { 1.0 }
    }
}

#[derive(Clone, Debug)]
pub struct IsingModel {
    pub graph: Graph,
    pub initial_configuration: Option<Vec<bool>>,
    pub rescaled: bool,
    pub scale: f64,
}

impl IsingModel {
    pub fn from_raw_terms(raw: &[RawTerm], allow_dup_merge: bool) -> QioResult<Self> {
        let graph = Graph::from_raw_terms(raw, allow_dup_merge)?;
        Ok(IsingModel { graph, initial_configuration: None, rescaled: false, scale: 1.0 })
    }

    /// Apply the graph's rescale factor (spec §3 "Graph statistics") to every edge
    /// coefficient so the energy scale is normalized; reported costs must be divided back
    /// by `scale_factor()` to compare against the unscaled model (spec R2).
    pub fn rescale(&mut self) {
        if self.rescaled {
            return;
        }
        let factor = self.graph.stats.rescale_factor();
        if factor != 1.0 {
            for edge in &mut self.graph.edges {
                edge.cost *= factor;
            }
            self.scale = factor;
            self.rescaled = true;
        }
    }

    fn edge_sign(&self, bits: &[bool], edge_id: usize) -> f64 {
        let mut sign = 1.0;
        for &v in &self.graph.edges[edge_id].node_ids {
            if bits[v] {
                sign = -sign;
            }
        }
        sign
    }

    fn build_cache(&self, is_minus: Vec<bool>) -> IsingState {
        let edge_sign = (0..self.graph.num_edges())
            .map(|e| self.edge_sign(&is_minus, e))
            .collect();
        IsingState { is_minus, edge_sign }
    }
}

impl CostModel for IsingModel {
    type State = IsingState;
    type Transition = usize;

    fn calculate_cost(&self, state: &Self::State) -> f64 {
        let mut cost = self.graph.stats.const_cost;
        for (edge_id, edge) in self.graph.edges.iter().enumerate() {
            cost += edge.cost * state.edge_sign[edge_id];
        }
        cost
    }

    fn calculate_cost_difference(&self, state: &Self::State, transition: Self::Transition) -> f64 {
        let v = transition;
        let mut delta = 0.0;
        for &edge_id in &self.graph.nodes[v].edge_ids {
            let edge = &self.graph.edges[edge_id];
            delta += -2.0 * edge.cost * state.edge_sign[edge_id];
        }
        delta
    }

    fn apply_transition(&self, transition: Self::Transition, state: &mut Self::State) {
        let v = transition;
        state.is_minus[v] = !state.is_minus[v];
        for &edge_id in &self.graph.nodes[v].edge_ids {
            state.edge_sign[edge_id] = -state.edge_sign[edge_id];
        }
    }

    fn random_state(&self, rng: &mut Rng64) -> Self::State {
        let bits = match &self.initial_configuration {
            Some(cfg) => cfg.clone(),
            None => (0..self.graph.num_nodes()).map(|_| rng.bernoulli(0.5)).collect(),
        };
        self.build_cache(bits)
    }

    fn random_transition(&self, state: &Self::State, rng: &mut Rng64) -> Self::Transition {
        rng.uniform_index(state.is_minus.len())
    }

    fn sweep_size(&self) -> usize {
        self.graph.num_nodes()
    }

    fn state_memory_estimate(&self) -> usize {
        self.graph.num_nodes() + self.graph.num_edges() * std::mem::size_of::<f64>()
    }

    fn state_only_memory_estimate(&self) -> usize {
        self.graph.num_nodes()
    }

    fn estimate_max_cost_diff(&self) -> f64 {
        self.graph
            .nodes
            .iter()
            .map(|node| {
                triangle_inequality_max_diff(node.edge_ids.iter().map(|&e| self.graph.edges[e].cost))
                    * 2.0
            })
            .fold(0.0, f64::max)
    }

    fn estimate_min_cost_diff(&self) -> f64 {
        let magnitudes: Vec<f64> = self.graph.edges.iter().map(|e| e.cost.abs() * 2.0).collect();
        karmarkar_karp_min_diff(&magnitudes)
    }

    fn is_rescaled(&self) -> bool {
        self.rescaled
    }

    fn scale_factor(&self) -> f64 {
        self.scale
    }

    fn render_state(&self, state: &Self::State) -> HashMap<String, i64> {
        self.graph
            .node_id_to_name
            .iter()
            .enumerate()
            .map(|(internal, &name)| (name.to_string(), if state.is_minus[internal] { -1 } else { 1 }))
            .collect()
    }
}
