//! Parallel Tempering: K replicas at fixed temperatures with replica-exchange moves (C10,
//! spec §4.3).
//!
//! Grounded on `original_source/cpp/solver/test/parallel_tempering_test.cc`'s ladder/threads
//! parameterization; the even/odd alternating adjacent-pair exchange pattern and the
//! happens-before edge between the sweep barrier and the (single-threaded) exchange phase
//! follow spec §5 exactly, since no C++ source file spells out the exchange loop body in a
//! form worth lifting verbatim.

use crate::acceptor::{fast_exp_neg, Acceptor};
use crate::error::{QioError, QioResult};
use crate::model::CostModel;
use crate::replica::Replica;
use crate::rng::Rng64;
use crate::termination::{ExitReason, HaltFlag, MilestoneLog, TerminationCheck};
use rayon::prelude::*;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct PtParams {
    pub step_limit: u64,
    pub seed: u64,
    /// Strictly increasing temperatures `T_1 < ... < T_K` (or, if `use_inverse_temperatures`,
    /// strictly *decreasing* β values covering the same ladder).
    pub temperatures: Vec<f64>,
    pub use_inverse_temperatures: bool,
    pub cost_limit: Option<f64>,
    pub time_limit: Option<Duration>,
    pub number_of_solutions: usize,
}

impl PtParams {
    fn validate(&self) -> QioResult<()> {
        if self.temperatures.len() < 2 {
            return Err(QioError::ValueError("`temperatures` needs at least 2 replicas".into()));
        }
        if self.number_of_solutions == 0 || self.number_of_solutions > 1000 {
            return Err(QioError::ValueError("`number_of_solutions` must be in [1, 1000]".into()));
        }
        let increasing = self.temperatures.windows(2).all(|w| w[0] < w[1]);
        if !increasing {
            return Err(QioError::ValueError(
                "`temperatures` must form a strictly monotonic ladder".into(),
            ));
        }
        Ok(())
    }

    fn betas(&self) -> Vec<f64> {
        if self.use_inverse_temperatures {
            // Stored increasing for validation; β ladder must run high->low to pair with
            // increasing T, so reverse.
            self.temperatures.iter().rev().copied().collect()
        } else {
            self.temperatures.iter().map(|t| 1.0 / t).collect()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReplicaTelemetry {
    pub acceptance_rate: f64,
    pub swap_rate: f64,
    pub time_averaged_cost: f64,
    pub upward_drift_fraction: f64,
}

pub struct PtResult<M: CostModel> {
    pub best_cost: f64,
    pub best_state: M::State,
    pub solutions: Vec<(f64, M::State)>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
    pub telemetry: Vec<ReplicaTelemetry>,
}

struct ReplicaStats {
    swap_attempts: u64,
    swap_accepts: u64,
    cost_sum: f64,
    sweeps: u64,
    upward_moves: u64,
}

impl Default for ReplicaStats {
    fn default() -> Self {
        ReplicaStats { swap_attempts: 0, swap_accepts: 0, cost_sum: 0.0, sweeps: 0, upward_moves: 0 }
    }
}

/// Runs Parallel Tempering: `K` replicas sweep in parallel each macro-step, then a
/// single-threaded exchange phase proposes adjacent swaps alternating even/odd pairing
/// (spec §4.3).
pub fn run<M: CostModel + Sync>(model: &M, params: &PtParams, halt: HaltFlag) -> QioResult<PtResult<M>> {
    params.validate()?;
    let betas = params.betas();
    let k = betas.len();

    let mut master = Rng64::seeded(params.seed);
    let mut replicas: Vec<Replica<M>> = (0..k)
        .map(|i| Replica::new(model, master.fork(), betas[i]))
        .collect();
    for r in &mut replicas {
        r.note_if_best(0);
    }

    let mut stats: Vec<ReplicaStats> = (0..k).map(|_| ReplicaStats::default()).collect();
    let check = TerminationCheck::new(params.step_limit, params.cost_limit, params.time_limit, halt);
    let log = MilestoneLog::new();
    let acceptor = Acceptor;

    let mut step = 0u64;
    let exit_reason;
    loop {
        let best_so_far = replicas.iter().map(|r| r.best_cost).fold(f64::INFINITY, f64::min);
        if let Some(reason) = check.should_stop(step, best_so_far) {
            exit_reason = reason;
            break;
        }

        replicas.par_iter_mut().enumerate().for_each(|(i, replica)| {
            replica.metropolis_sweep(model, &acceptor, replica.slot);
            let _ = i;
        });

        // Single-threaded exchange phase: alternate even/odd adjacent pairing per macro-step
        // to preserve detailed balance (spec §4.3).
        let offset = (step % 2) as usize;
        let mut pair = offset;
        while pair + 1 < k {
            let (lo, hi) = (pair, pair + 1);
            let delta_beta = betas[lo] - betas[hi];
            let delta_cost = replicas[lo].cost - replicas[hi].cost;
            let exponent = delta_beta * delta_cost;
            let accept = if exponent >= 0.0 {
                true
            } else {
                let u = replicas[lo].rng.uniform();
                u < fast_exp_neg(-exponent)
            };
            stats[lo].swap_attempts += 1;
            stats[hi].swap_attempts += 1;
            if accept {
                std::mem::swap(&mut replicas[lo].state, &mut replicas[hi].state);
                std::mem::swap(&mut replicas[lo].cost, &mut replicas[hi].cost);
                stats[lo].swap_accepts += 1;
                stats[hi].swap_accepts += 1;
                stats[lo].upward_moves += 1;
            }
            pair += 2;
        }

        step += 1;
        for (i, replica) in replicas.iter_mut().enumerate() {
            if replica.note_if_best(step) {
                log.record(step, replica.best_cost);
            }
            stats[i].cost_sum += replica.cost;
            stats[i].sweeps += 1;
        }
    }

    let mut best_index = 0;
    for (i, r) in replicas.iter().enumerate() {
        if r.best_cost < replicas[best_index].best_cost {
            best_index = i;
        }
    }

    let mut solutions: Vec<(f64, M::State)> = replicas.iter().map(|r| (r.best_cost, r.best_state.clone())).collect();
    solutions.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    solutions.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-12);
    solutions.truncate(params.number_of_solutions);

    let telemetry = stats
        .iter()
        .map(|s| ReplicaTelemetry {
            acceptance_rate: 0.0, // per-flip acceptance is not separately tracked by Replica; swap_rate covers exchange telemetry
            swap_rate: if s.swap_attempts > 0 { s.swap_accepts as f64 / s.swap_attempts as f64 } else { 0.0 },
            time_averaged_cost: if s.sweeps > 0 { s.cost_sum / s.sweeps as f64 } else { 0.0 },
            upward_drift_fraction: if s.swap_attempts > 0 { s.upward_moves as f64 / s.swap_attempts as f64 } else { 0.0 },
        })
        .collect();

    Ok(PtResult {
        best_cost: replicas[best_index].best_cost,
        best_state: replicas[best_index].best_state.clone(),
        solutions,
        milestones: log.snapshot(),
        exit_reason,
        last_step: step,
        telemetry,
    })
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
    fn rejects_non_monotonic_ladder() {
        let params = PtParams {
            step_limit: 10,
            seed: 1,
            temperatures: vec![1.0, 0.5, 2.0],
            use_inverse_temperatures: false,
            cost_limit: None,
            time_limit: None,
            number_of_solutions: 1,
        };
        let model = ring(4);
        assert!(run(&model, &params, HaltFlag::new()).is_err());
    }

    #[test]
    fn pt_descends_towards_ground_state() {
        let model = ring(10);
        let params = PtParams {
            step_limit: 200,
            seed: 5,
            temperatures: vec![0.3, 0.6, 1.0, 2.0, 4.0],
            use_inverse_temperatures: false,
            cost_limit: None,
            time_limit: None,
            number_of_solutions: 3,
        };
        let result = run(&model, &params, HaltFlag::new()).unwrap();
        assert!(result.best_cost <= -6.0, "got {}", result.best_cost);
        assert_eq!(result.exit_reason, ExitReason::StepLimit);
        assert_eq!(result.telemetry.len(), 5);
    }

    #[test]
    fn swap_rate_is_recorded_between_zero_and_one() {
        let model = ring(6);
        let params = PtParams {
            step_limit: 50,
            seed: 9,
            temperatures: vec![0.5, 1.0, 2.0],
            use_inverse_temperatures: false,
            cost_limit: None,
            time_limit: None,
            number_of_solutions: 1,
        };
        let result = run(&model, &params, HaltFlag::new()).unwrap();
        for t in &result.telemetry {
            assert!(t.swap_rate >= 0.0 && t.swap_rate <= 1.0);
        }
    }
}
