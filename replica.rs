//! Per-thread MCMC worker (C5, spec §3 "Replica").
//!
//! Grounded on `original_source/cpp/markov/model.h`'s per-chain state ownership and the
//! teacher's per-simulation-thread pattern (`sim::run_parallel` forking one RNG per unit of
//! parallel work up front, in index order, before any thread starts). Owns exactly the
//! fields spec §3 lists: state, cost, rng, best-seen, and a schedule slot — nothing more.

use crate::acceptor::Acceptor;
use crate::model::CostModel;
use crate::rng::Rng64;

/// One Markov chain: current state/cost, its own RNG, and the best state/cost it has ever
/// seen. `slot` carries whatever per-replica scalar a solver needs (a fixed temperature for
/// PT, a population weight for PA/SSMC) — solvers interpret it, `Replica` just stores it.
pub struct Replica<M: CostModel> {
    pub state: M::State,
    pub cost: f64,
    pub rng: Rng64,
    pub best_state: M::State,
    pub best_cost: f64,
    pub slot: f64,
    /// `(step, cost)` pairs recorded every time `best_cost` strictly decreases (spec §4.8).
    pub milestones: Vec<(u64, f64)>,
}

impl<M: CostModel> Replica<M> {
    pub fn new(model: &M, mut rng: Rng64, slot: f64) -> Self {
        let state = model.random_state(&mut rng);
        let cost = model.calculate_cost(&state);
        Replica {
            best_state: state.clone(),
            best_cost: cost,
            state,
            cost,
            rng,
            slot,
            milestones: Vec::new(),
        }
    }

    /// Record a best-cost milestone if `cost` strictly improves on `best_cost`, and update
    /// the stored best state. Returns `true` if it did.
    pub fn note_if_best(&mut self, step: u64) -> bool {
        if self.cost < self.best_cost {
            self.best_cost = self.cost;
            self.best_state = self.state.clone();
            self.milestones.push((step, self.cost));
            true
        } else {
            false
        }
    }

    /// One Metropolis sweep at inverse temperature `inverse_temperature`: `model.sweep_size()`
    /// attempted single-variable flips, each accepted via `acceptor`.
    pub fn metropolis_sweep(&mut self, model: &M, acceptor: &Acceptor, inverse_temperature: f64) {
        for _ in 0..model.sweep_size() {
            let transition = model.random_transition(&self.state, &mut self.rng);
            let delta = model.calculate_cost_difference(&self.state, transition);
            let accept = if delta <= 0.0 {
                true
            } else {
                acceptor.accept(delta, inverse_temperature, self.rng.uniform())
            };
            if accept {
                model.apply_transition(transition, &mut self.state);
                self.cost += delta;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RawTerm;
    use crate::model_ising::IsingModel;

    fn ring(n: usize) -> IsingModel {
        let terms: Vec<RawTerm> = (0..n as i64).map(|i| RawTerm { cost: 1.0, ids: vec![i, (i + 1) % n as i64] }).collect();
        IsingModel::from_raw_terms(&terms, false).unwrap()
    }

    #[test]
    fn new_replica_cost_matches_full_evaluation() {
        let model = ring(10);
        let rng = Rng64::seeded(1);
        let replica = Replica::new(&model, rng, 1.0);
        assert_eq!(replica.cost, model.calculate_cost(&replica.state));
        assert_eq!(replica.best_cost, replica.cost);
    }

    #[test]
    fn note_if_best_only_fires_on_strict_improvement() {
        let model = ring(6);
        let rng = Rng64::seeded(2);
        let mut replica = Replica::new(&model, rng, 1.0);
        let initial_best = replica.best_cost;
        assert!(!replica.note_if_best(0)); // cost unchanged since construction

        replica.cost = initial_best - 1.0;
        assert!(replica.note_if_best(1));
        assert_eq!(replica.best_cost, initial_best - 1.0);
        assert_eq!(replica.milestones, vec![(1, initial_best - 1.0)]);

        assert!(!replica.note_if_best(2)); // same cost again, not strictly better
    }

    #[test]
    fn sweep_tracks_incremental_cost_consistently() {
        let model = ring(10);
        let rng = Rng64::seeded(7);
        let mut replica = Replica::new(&model, rng, 100.0); // near-zero beta: nearly always accept
        let acceptor = Acceptor;
        for _ in 0..20 {
            replica.metropolis_sweep(&model, &acceptor, 1.0 / replica.slot);
            let recomputed = model.calculate_cost(&replica.state);
            assert!((replica.cost - recomputed).abs() < 1e-6);
        }
    }
}
