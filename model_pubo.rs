//! PUBO model: binary variables in `{0,1}`, term value = `c_e` iff all participants are 1
//! (spec §4.1's "AND-of-not-zero" activity test).
//!
//! Grounded on `original_source/cpp/model/pubo.h`. The cached form (`WithCounter<T>` in the
//! C++) stores, per edge, the count of currently-zero participants; a term is active
//! (contributes `c_e`) exactly when that count is zero, so a single flip's Δ is an O(degree)
//! counter increment/decrement rather than a full re-scan.

use crate::error::QioResult;
use crate::graph::{Graph, RawTerm};
use crate::model::{karmarkar_karp_min_diff, triangle_inequality_max_diff, CostModel};
use crate::rng::Rng64;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct PuboState {
    pub bits: Vec<bool>,
    /// Per edge: how many of its participating variables are currently 0.
    pub zero_count: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct PuboModel {
    pub graph: Graph,
    pub initial_configuration: Option<Vec<bool>>,
    pub rescaled: bool,
    pub scale: f64,
}

impl PuboModel {
    pub fn from_raw_terms(raw: &[RawTerm], allow_dup_merge: bool) -> QioResult<Self> {
        let graph = Graph::from_raw_terms(raw, allow_dup_merge)?;
        Ok(PuboModel { graph, initial_configuration: None, rescaled: false, scale: 1.0 })
    }

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

    fn build_cache(&self, bits: Vec<bool>) -> PuboState {
        let zero_count = self
            .graph
            .edges
            .iter()
            .map(|e| e.node_ids.iter().filter(|&&v| !bits[v]).count() as u32)
            .collect();
        PuboState { bits, zero_count }
    }
}

impl CostModel for PuboModel {
    type State = PuboState;
    type Transition = usize;

    fn calculate_cost(&self, state: &Self::State) -> f64 {
        let mut cost = self.graph.stats.const_cost;
        for (edge_id, edge) in self.graph.edges.iter().enumerate() {
            if state.zero_count[edge_id] == 0 {
                cost += edge.cost;
            }
        }
        cost
    }

    fn calculate_cost_difference(&self, state: &Self::State, transition: Self::Transition) -> f64 {
        let v = transition;
        let turning_on = !state.bits[v];
        let mut delta = 0.0;
        for &edge_id in &self.graph.nodes[v].edge_ids {
            let edge = &self.graph.edges[edge_id];
            let count = state.zero_count[edge_id];
            if turning_on {
                // count decreases by 1; becomes active iff it hits zero
                if count == 1 {
                    delta += edge.cost;
                }
            } else {
                // count increases by 1; becomes inactive iff it was zero
                if count == 0 {
                    delta -= edge.cost;
                }
            }
        }
        delta
    }

    fn apply_transition(&self, transition: Self::Transition, state: &mut Self::State) {
        let v = transition;
        let turning_on = !state.bits[v];
        state.bits[v] = !state.bits[v];
        for &edge_id in &self.graph.nodes[v].edge_ids {
            if turning_on {
                state.zero_count[edge_id] -= 1;
            } else {
                state.zero_count[edge_id] += 1;
            }
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
        rng.uniform_index(state.bits.len())
    }

    fn sweep_size(&self) -> usize {
        self.graph.num_nodes()
    }

    fn state_memory_estimate(&self) -> usize {
        self.graph.num_nodes() + self.graph.num_edges() * std::mem::size_of::<u32>()
    }

    fn state_only_memory_estimate(&self) -> usize {
        self.graph.num_nodes()
    }

    fn estimate_max_cost_diff(&self) -> f64 {
        self.graph
            .nodes
            .iter()
            .map(|node| triangle_inequality_max_diff(node.edge_ids.iter().map(|&e| self.graph.edges[e].cost)))
            .fold(0.0, f64::max)
    }

    fn estimate_min_cost_diff(&self) -> f64 {
        let magnitudes: Vec<f64> = self.graph.edges.iter().map(|e| e.cost.abs()).collect();
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
            .map(|(internal, &name)| (name.to_string(), state.bits[internal] as i64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_mixed_constants_example() {
        // Two disjoint terms guaranteeing the documented optimum:
        // const -100, plus -4 active when x1=1, plus -8 when x12=1 (locked by a
        // single-variable edge each so S2's specific var assignments are reachable).
        let terms = vec![
            RawTerm { cost: -100.0, ids: vec![] },
            RawTerm { cost: -4.0, ids: vec![1] },
            RawTerm { cost: -8.0, ids: vec![1, 12] },
        ];
        let model = PuboModel::from_raw_terms(&terms, false).unwrap();
        let bits = vec![true, true]; // internal ids 0->name 1, 1->name 12
        let state = model.build_cache(bits);
        assert_eq!(model.calculate_cost(&state), -112.0);
    }

    #[test]
    fn p1_delta_matches_full_recompute_on_triangle() {
        let terms = vec![
            RawTerm { cost: 2.0, ids: vec![0, 1] },
            RawTerm { cost: -3.0, ids: vec![1, 2] },
            RawTerm { cost: 1.0, ids: vec![0, 1, 2] },
        ];
        let model = PuboModel::from_raw_terms(&terms, false).unwrap();
        let mut rng = Rng64::seeded(7);
        let state = model.random_state(&mut rng);
        for v in 0..3 {
            let delta = model.calculate_cost_difference(&state, v);
            let mut next = state.clone();
            model.apply_transition(v, &mut next);
            let observed = model.calculate_cost(&next) - model.calculate_cost(&state);
            assert!((observed - delta).abs() < 1e-9);
        }
    }

    #[test]
    fn p2_double_flip_is_identity() {
        let terms = vec![RawTerm { cost: 1.0, ids: vec![0, 1] }];
        let model = PuboModel::from_raw_terms(&terms, false).unwrap();
        let mut rng = Rng64::seeded(5);
        let state = model.random_state(&mut rng);
        let mut twice = state.clone();
        model.apply_transition(0, &mut twice);
        model.apply_transition(0, &mut twice);
        assert_eq!(twice.bits, state.bits);
        assert_eq!(twice.zero_count, state.zero_count);
    }
}
