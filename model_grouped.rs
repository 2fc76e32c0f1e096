//! Grouped (SLC) model variants: ordinary graph terms plus SLC faces layered on top
//! (spec §3 "Face / grouped term (SLC)", §4.1).
//!
//! Grounded on `original_source/cpp/model/ising_grouped.h` / `pubo_grouped.h`. Both variants
//! reuse [`crate::face::Face`] for the quadratic-of-linear-sum faces; they differ only in
//! spin encoding, exactly like the ungrouped [`crate::model_ising::IsingModel`] /
//! [`crate::model_pubo::PuboModel`] pair.

use crate::error::QioResult;
use crate::face::Face;
use crate::graph::{Graph, RawTerm};
use crate::model::CostModel;
use crate::rng::Rng64;
use std::collections::HashMap;

fn faces_by_var(num_vars: usize, faces: &[Face]) -> Vec<Vec<usize>> {
    let mut by_var = vec![Vec::new(); num_vars];
    for (face_id, face) in faces.iter().enumerate() {
        for l in &face.linear {
            if let Some(v) = l.var {
                by_var[v].push(face_id);
            }
        }
    }
    by_var
}

// ─── Ising-grouped ────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct IsingGroupedState {
    pub is_minus: Vec<bool>,
    pub edge_sign: Vec<f64>,
    pub face_sum: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct IsingGroupedModel {
    pub graph: Graph,
    pub faces: Vec<Face>,
    var_faces: Vec<Vec<usize>>,
}

impl IsingGroupedModel {
    pub fn new(raw: &[RawTerm], raw_faces: &[(f64, Vec<RawTerm>)], allow_dup_merge: bool) -> QioResult<Self> {
        let graph = Graph::from_raw_terms(raw, allow_dup_merge)?;
        let mut name_to_id: HashMap<i64, usize> = graph
            .node_id_to_name
            .iter()
            .enumerate()
            .map(|(internal, &name)| (name, internal))
            .collect();
        let mut next_id = graph.num_nodes();
        let mut faces = Vec::with_capacity(raw_faces.len());
        for (cost, sub) in raw_faces {
            let mut map = |name: i64| -> usize {
                *name_to_id.entry(name).or_insert_with(|| {
                    let id = next_id;
                    next_id += 1;
                    id
                })
            };
            faces.push(Face::from_raw(*cost, sub, &mut map)?);
        }
        // Faces may reference variables the plain graph never touched; extend node arena
        // so state vectors are sized correctly (spin ±1, default +1 i.e. `is_minus=false`).
        let mut graph = graph;
        while graph.nodes.len() < next_id {
            graph.nodes.push(Default::default());
            graph.node_id_to_name.push(-1); // no original name; face-only variable
        }
        let var_faces = faces_by_var(graph.num_nodes(), &faces);
        Ok(IsingGroupedModel { graph, faces, var_faces })
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

    fn build_cache(&self, is_minus: Vec<bool>) -> IsingGroupedState {
        let edge_sign = (0..self.graph.num_edges()).map(|e| self.edge_sign(&is_minus, e)).collect();
        let x: Vec<f64> = is_minus.iter().map(|&m| if m { -1.0 } else { 1.0 }).collect();
        let face_sum = self.faces.iter().map(|f| f.inner_sum(&x)).collect();
        IsingGroupedState { is_minus, edge_sign, face_sum }
    }
}

impl CostModel for IsingGroupedModel {
    type State = IsingGroupedState;
    type Transition = usize;

    fn calculate_cost(&self, state: &Self::State) -> f64 {
        let mut cost = self.graph.stats.const_cost;
        for (edge_id, edge) in self.graph.edges.iter().enumerate() {
            cost += edge.cost * state.edge_sign[edge_id];
        }
        for (face, &sum) in self.faces.iter().zip(&state.face_sum) {
            cost += face.cost * sum * sum;
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
        let old_spin = if state.is_minus[v] { -1.0 } else { 1.0 };
        let new_spin = -old_spin;
        for &face_id in &self.var_faces[v] {
            let face = &self.faces[face_id];
            let (face_delta, _) = face.delta_and_new_sum(v, old_spin, new_spin, state.face_sum[face_id]);
            delta += face_delta;
        }
        delta
    }

    fn apply_transition(&self, transition: Self::Transition, state: &mut Self::State) {
        let v = transition;
        let old_spin = if state.is_minus[v] { -1.0 } else { 1.0 };
        state.is_minus[v] = !state.is_minus[v];
        let new_spin = -old_spin;
        for &edge_id in &self.graph.nodes[v].edge_ids {
            state.edge_sign[edge_id] = -state.edge_sign[edge_id];
        }
        for &face_id in &self.var_faces[v] {
            let face = &self.faces[face_id];
            let (_, new_sum) = face.delta_and_new_sum(v, old_spin, new_spin, state.face_sum[face_id]);
            state.face_sum[face_id] = new_sum;
        }
    }

    fn random_state(&self, rng: &mut Rng64) -> Self::State {
        let bits = (0..self.graph.num_nodes()).map(|_| rng.bernoulli(0.5)).collect();
        self.build_cache(bits)
    }

    fn random_transition(&self, state: &Self::State, rng: &mut Rng64) -> Self::Transition {
        rng.uniform_index(state.is_minus.len())
    }

    fn sweep_size(&self) -> usize {
        self.graph.num_nodes()
    }

    fn state_memory_estimate(&self) -> usize {
        self.graph.num_nodes()
            + self.graph.num_edges() * std::mem::size_of::<f64>()
            + self.faces.len() * std::mem::size_of::<f64>()
    }

    fn state_only_memory_estimate(&self) -> usize {
        self.graph.num_nodes()
    }

    fn estimate_max_cost_diff(&self) -> f64 {
        // Expand each face to its implied quadratic form (spec §4.1) for a tighter bound:
        // |2*cost*w_i*w_j| contributes to the pairwise coupling magnitude of (i,j), and the
        // per-variable linear contribution is bounded by 2*cost*w_i*(sum of other |w_j| + |w0|).
        let mut max_face_contrib = 0.0f64;
        for face in &self.faces {
            let total_abs: f64 = face.linear.iter().map(|l| l.weight.abs()).sum::<f64>() + face.w0.abs();
            for l in &face.linear {
                let bound = 2.0 * face.cost.abs() * l.weight.abs() * total_abs;
                max_face_contrib = max_face_contrib.max(bound);
            }
        }
        let graph_bound = self
            .graph
            .nodes
            .iter()
            .map(|node| node.edge_ids.iter().map(|&e| self.graph.edges[e].cost.abs()).sum::<f64>() * 2.0)
            .fold(0.0, f64::max);
        graph_bound.max(max_face_contrib)
    }

    fn estimate_min_cost_diff(&self) -> f64 {
        let mut magnitudes: Vec<f64> = self.graph.edges.iter().map(|e| e.cost.abs() * 2.0).collect();
        for face in &self.faces {
            for l in &face.linear {
                magnitudes.push((2.0 * face.cost * l.weight).abs());
            }
        }
        crate::model::karmarkar_karp_min_diff(&magnitudes)
    }

    fn render_state(&self, state: &Self::State) -> HashMap<String, i64> {
        self.graph
            .node_id_to_name
            .iter()
            .enumerate()
            .filter(|(_, &name)| name >= 0)
            .map(|(internal, &name)| (name.to_string(), if state.is_minus[internal] { -1 } else { 1 }))
            .collect()
    }
}

// ─── Pubo-grouped ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct PuboGroupedState {
    pub bits: Vec<bool>,
    pub zero_count: Vec<u32>,
    pub face_sum: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct PuboGroupedModel {
    pub graph: Graph,
    pub faces: Vec<Face>,
    var_faces: Vec<Vec<usize>>,
}

impl PuboGroupedModel {
    pub fn new(raw: &[RawTerm], raw_faces: &[(f64, Vec<RawTerm>)], allow_dup_merge: bool) -> QioResult<Self> {
        let graph = Graph::from_raw_terms(raw, allow_dup_merge)?;
        let mut name_to_id: HashMap<i64, usize> = graph
            .node_id_to_name
            .iter()
            .enumerate()
            .map(|(internal, &name)| (name, internal))
            .collect();
        let mut next_id = graph.num_nodes();
        let mut faces = Vec::with_capacity(raw_faces.len());
        for (cost, sub) in raw_faces {
            let mut map = |name: i64| -> usize {
                *name_to_id.entry(name).or_insert_with(|| {
                    let id = next_id;
                    next_id += 1;
                    id
                })
            };
            faces.push(Face::from_raw(*cost, sub, &mut map)?);
        }
        let mut graph = graph;
        while graph.nodes.len() < next_id {
            graph.nodes.push(Default::default());
            graph.node_id_to_name.push(-1);
        }
        let var_faces = faces_by_var(graph.num_nodes(), &faces);
        Ok(PuboGroupedModel { graph, faces, var_faces })
    }

    fn build_cache(&self, bits: Vec<bool>) -> PuboGroupedState {
        let zero_count = self
            .graph
            .edges
            .iter()
            .map(|e| e.node_ids.iter().filter(|&&v| !bits[v]).count() as u32)
            .collect();
        let x: Vec<f64> = bits.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        let face_sum = self.faces.iter().map(|f| f.inner_sum(&x)).collect();
        PuboGroupedState { bits, zero_count, face_sum }
    }
}

impl CostModel for PuboGroupedModel {
    type State = PuboGroupedState;
    type Transition = usize;

    fn calculate_cost(&self, state: &Self::State) -> f64 {
        let mut cost = self.graph.stats.const_cost;
        for (edge_id, edge) in self.graph.edges.iter().enumerate() {
            if state.zero_count[edge_id] == 0 {
                cost += edge.cost;
            }
        }
        for (face, &sum) in self.faces.iter().zip(&state.face_sum) {
            cost += face.cost * sum * sum;
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
                if count == 1 {
                    delta += edge.cost;
                }
            } else if count == 0 {
                delta -= edge.cost;
            }
        }
        let old = if state.bits[v] { 1.0 } else { 0.0 };
        let new = if turning_on { 1.0 } else { 0.0 };
        for &face_id in &self.var_faces[v] {
            let face = &self.faces[face_id];
            let (face_delta, _) = face.delta_and_new_sum(v, old, new, state.face_sum[face_id]);
            delta += face_delta;
        }
        delta
    }

    fn apply_transition(&self, transition: Self::Transition, state: &mut Self::State) {
        let v = transition;
        let turning_on = !state.bits[v];
        let old = if state.bits[v] { 1.0 } else { 0.0 };
        state.bits[v] = turning_on;
        let new = if turning_on { 1.0 } else { 0.0 };
        for &edge_id in &self.graph.nodes[v].edge_ids {
            if turning_on {
                state.zero_count[edge_id] -= 1;
            } else {
                state.zero_count[edge_id] += 1;
            }
        }
        for &face_id in &self.var_faces[v] {
            let face = &self.faces[face_id];
            let (_, new_sum) = face.delta_and_new_sum(v, old, new, state.face_sum[face_id]);
            state.face_sum[face_id] = new_sum;
        }
    }

    fn random_state(&self, rng: &mut Rng64) -> Self::State {
        let bits = (0..self.graph.num_nodes()).map(|_| rng.bernoulli(0.5)).collect();
        self.build_cache(bits)
    }

    fn random_transition(&self, state: &Self::State, rng: &mut Rng64) -> Self::Transition {
        rng.uniform_index(state.bits.len())
    }

    fn sweep_size(&self) -> usize {
        self.graph.num_nodes()
    }

    fn state_memory_estimate(&self) -> usize {
        self.graph.num_nodes()
            + self.graph.num_edges() * std::mem::size_of::<u32>()
            + self.faces.len() * std::mem::size_of::<f64>()
    }

    fn state_only_memory_estimate(&self) -> usize {
        self.graph.num_nodes()
    }

    fn estimate_max_cost_diff(&self) -> f64 {
        let mut max_face_contrib = 0.0f64;
        for face in &self.faces {
            let total_abs: f64 = face.linear.iter().map(|l| l.weight.abs()).sum::<f64>() + face.w0.abs();
            for l in &face.linear {
                let bound = face.cost.abs() * l.weight.abs() * total_abs;
                max_face_contrib = max_face_contrib.max(bound);
            }
        }
        let graph_bound = self
            .graph
            .nodes
            .iter()
            .map(|node| node.edge_ids.iter().map(|&e| self.graph.edges[e].cost.abs()).sum::<f64>())
            .fold(0.0, f64::max);
        graph_bound.max(max_face_contrib)
    }

    fn estimate_min_cost_diff(&self) -> f64 {
        let mut magnitudes: Vec<f64> = self.graph.edges.iter().map(|e| e.cost.abs()).collect();
        for face in &self.faces {
            for l in &face.linear {
                magnitudes.push((face.cost * l.weight).abs());
            }
        }
        crate::model::karmarkar_karp_min_diff(&magnitudes)
    }

    fn render_state(&self, state: &Self::State) -> HashMap<String, i64> {
        self.graph
            .node_id_to_name
            .iter()
            .enumerate()
            .filter(|(_, &name)| name >= 0)
            .map(|(internal, &name)| (name.to_string(), state.bits[internal] as i64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubo_grouped_delta_matches_full_recompute() {
        let raw = vec![RawTerm { cost: 2.0, ids: vec![0, 1] }];
        let face = (1.5, vec![RawTerm { cost: 1.0, ids: vec![0] }, RawTerm { cost: -2.0, ids: vec![2] }]);
        let model = PuboGroupedModel::new(&raw, &[face], false).unwrap();
        let mut rng = Rng64::seeded(42);
        let state = model.random_state(&mut rng);
        for v in 0..model.graph.num_nodes() {
            let delta = model.calculate_cost_difference(&state, v);
            let mut next = state.clone();
            model.apply_transition(v, &mut next);
            let observed = model.calculate_cost(&next) - model.calculate_cost(&state);
            assert!((observed - delta).abs() < 1e-9);
        }
    }

    fn metropolis_slc_model() -> IsingGroupedModel {
        let raw = vec![
            RawTerm { cost: 1.0, ids: vec![0, 1] },
            RawTerm { cost: 1.0, ids: vec![1, 2] },
            RawTerm { cost: 1.0, ids: vec![3] },
        ];
        let face1 = (
            2.0,
            vec![
                RawTerm { cost: 1.0, ids: vec![1] },
                RawTerm { cost: 1.0, ids: vec![2] },
                RawTerm { cost: 1.0, ids: vec![3] },
                RawTerm { cost: 1.0, ids: vec![4] },
                RawTerm { cost: 1.0, ids: vec![5] },
                RawTerm { cost: 1.0, ids: vec![6] },
                RawTerm { cost: 1.0, ids: vec![7] },
                RawTerm { cost: -1.0, ids: vec![9] },
                RawTerm { cost: -1.0, ids: vec![] },
            ],
        );
        let face2 = (
            3.0,
            vec![
                RawTerm { cost: 1.0, ids: vec![0] },
                RawTerm { cost: 2.0, ids: vec![2] },
                RawTerm { cost: 4.0, ids: vec![4] },
                RawTerm { cost: -1.0, ids: vec![6] },
                RawTerm { cost: 1.0, ids: vec![8] },
            ],
        );
        IsingGroupedModel::new(&raw, &[face1, face2], false).unwrap()
    }

    #[test]
    fn s5_ground_state_is_two_by_brute_force() {
        let model = metropolis_slc_model();
        let n = model.graph.num_nodes();
        assert_eq!(n, 10);
        let mut best = f64::INFINITY;
        for mask in 0u32..(1 << n) {
            let is_minus: Vec<bool> = (0..n).map(|i| (mask >> i) & 1 == 1).collect();
            let state = model.build_cache(is_minus);
            best = best.min(model.calculate_cost(&state));
        }
        assert_eq!(best, 2.0);
    }

    #[test]
    fn metropolis_descends_towards_ground_state() {
        let model = metropolis_slc_model();
        let mut rng = Rng64::seeded(188);
        let mut state = model.random_state(&mut rng);
        let mut cost = model.calculate_cost(&state);
        let mut min = cost;
        let t = 0.5;
        for _ in 0..1000 {
            let transition = model.random_transition(&state, &mut rng);
            let diff = model.calculate_cost_difference(&state, transition);
            if diff < 0.0 || rng.uniform() < (-diff / t).exp() {
                model.apply_transition(transition, &mut state);
                cost += diff;
            }
            min = min.min(cost);
        }
        assert!(min <= 50.0, "metropolis should have found a low-cost state, got {min}");
    }

    #[test]
    fn p1_delta_matches_full_recompute() {
        let model = metropolis_slc_model();
        let mut rng = Rng64::seeded(3);
        let state = model.random_state(&mut rng);
        for v in 0..model.graph.num_nodes() {
            let delta = model.calculate_cost_difference(&state, v);
            let mut next = state.clone();
            model.apply_transition(v, &mut next);
            let observed = model.calculate_cost(&next) - model.calculate_cost(&state);
            assert!((observed - delta).abs() < 1e-9, "mismatch at var {v}: {observed} vs {delta}");
        }
    }
}
