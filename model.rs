//! Cost-function model contract (C3) — the trait every solver engine consumes.
//!
//! Grounded on `original_source/cpp/markov/model.h` and `cpp/model/base_model.h`; the three
//! C++ inheritance tiers (BaseModel -> GraphModel -> Ising/Pubo) collapse here into one
//! trait plus a `Graph` embedded by composition in each concrete model (Design Note
//! "Inheritance").

use crate::rng::Rng64;
use std::collections::HashMap;

/// Everything a solver engine needs from a cost function.
///
/// `State` is per-model because cached forms carry model-specific incremental-update
/// caches (spec §3 "State"); `Transition` is almost always a variable index but kept
/// associated so packed/adaptive encodings can attach extra bookkeeping.
pub trait CostModel {
    type State: Clone;
    type Transition: Copy;

    /// Full cost evaluation; O(number of terms).
    fn calculate_cost(&self, state: &Self::State) -> f64;

    /// Δcost of applying `transition` to `state`, without mutating it. Must satisfy
    /// `cost(apply(s,t)) - cost(s) == Δ(s,t)` within floating-point tolerance (spec P1).
    fn calculate_cost_difference(&self, state: &Self::State, transition: Self::Transition) -> f64;

    /// Mutate `state` in place to apply `transition`, updating any incremental caches.
    fn apply_transition(&self, transition: Self::Transition, state: &mut Self::State);

    /// A uniformly random assignment, unless the model has a configured initial
    /// configuration, in which case that is returned instead (spec §4.1).
    fn random_state(&self, rng: &mut Rng64) -> Self::State;

    /// A uniformly random single-variable-flip transition.
    fn random_transition(&self, state: &Self::State, rng: &mut Rng64) -> Self::Transition;

    /// Number of variables; the typical count of attempted transitions per sweep.
    fn sweep_size(&self) -> usize;

    /// Bytes needed for one in-flight state (used + its incremental caches).
    fn state_memory_estimate(&self) -> usize;

    /// Bytes needed to store just the assignment (no caches) — what a stored best-state
    /// costs; population solvers allocate many of these.
    fn state_only_memory_estimate(&self) -> usize;

    /// Upper bound on `|Δ|` over all single-variable flips (used by temperature
    /// estimation, spec §4.7).
    fn estimate_max_cost_diff(&self) -> f64;

    /// Lower bound on `|Δ|` over all single-variable flips.
    fn estimate_min_cost_diff(&self) -> f64;

    fn is_rescaled(&self) -> bool {
        false
    }

    fn scale_factor(&self) -> f64 {
        1.0
    }

    /// Render a state back into original-variable-name -> value form.
    fn render_state(&self, state: &Self::State) -> HashMap<String, i64>;
}

/// Karmarkar-Karp least-difference estimate of the smallest achievable |Δ| over a set of
/// positive magnitudes — used by `estimate_min_cost_diff` (spec §4.1).
///
/// Repeatedly pulls the two largest remaining values and replaces them with their
/// difference, until one value remains; that value is the minimum achievable spread.
pub fn karmarkar_karp_min_diff(magnitudes: &[f64]) -> f64 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let mut heap: std::collections::BinaryHeap<ordered_float::OrderedF64> =
        magnitudes.iter().map(|&m| ordered_float::OrderedF64(m)).collect();
    while heap.len() > 1 {
        let a = heap.pop().unwrap().0;
        let b = heap.pop().unwrap().0;
        heap.push(ordered_float::OrderedF64((a - b).abs()));
    }
    heap.pop().map(|v| v.0).unwrap_or(0.0)
}

/// Triangle-inequality upper bound: sum of incident coupling magnitudes, used by
/// `estimate_max_cost_diff` for graph models (spec §4.1).
pub fn triangle_inequality_max_diff(incident_magnitudes: impl Iterator<Item = f64>) -> f64 {
    incident_magnitudes.map(f64::abs).sum()
}

/// Minimal local `OrderedFloat` so we don't need an extra crate dependency just for a
/// max-heap of `f64`.
mod ordered_float {
    #[derive(Clone, Copy, PartialEq)]
    pub struct OrderedF64(pub f64);
    impl Eq for OrderedF64 {}
    impl PartialOrd for OrderedF64 {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for OrderedF64 {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn karmarkar_karp_on_balanced_set_is_zero() {
        let v = karmarkar_karp_min_diff(&[4.0, 3.0, 1.0]);
        assert_eq!(v, 0.0); // 4 - 3 - 1 = 0
    }

    #[test]
    fn karmarkar_karp_empty_is_zero() {
        assert_eq!(karmarkar_karp_min_diff(&[]), 0.0);
    }

    #[test]
    fn triangle_inequality_sums_magnitudes() {
        let v = triangle_inequality_max_diff([1.0, -2.0, 3.0].into_iter());
        assert_eq!(v, 6.0);
    }
}
