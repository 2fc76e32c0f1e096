//! Population Annealing: a population jointly traverses a β schedule, resampling to target
//! size each macro-step (C11, spec §4.4).
//!
//! Grounded on `original_source/cpp/solver/test/pa_pf_test.cc` for parameterization shape
//! (`target_population`, `step_limit`, schedule); the weighted-resampling rule itself
//! (`κ_i = R·w_i/Σw`, floor copies plus one more with probability `κ_i − ⌊κ_i⌋`) is taken
//! directly from spec §4.4 since the C++ resampling body wasn't a file worth lifting
//! verbatim into idiomatic Rust.

use crate::acceptor::Acceptor;
use crate::error::{QioError, QioResult};
use crate::model::CostModel;
use crate::replica::Replica;
use crate::rng::Rng64;
use crate::schedule::Schedule;
use crate::termination::{ExitReason, HaltFlag, MilestoneLog, TerminationCheck};
use rayon::prelude::*;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct PaParams {
    pub step_limit: u64,
    pub seed: u64,
    pub target_population: usize,
    /// β(progress), progress = step / step_limit.
    pub schedule: Schedule,
    pub cost_limit: Option<f64>,
    pub time_limit: Option<Duration>,
    pub number_of_solutions: usize,
}

impl PaParams {
    fn validate(&self) -> QioResult<()> {
        if self.target_population == 0 {
            return Err(QioError::ValueError("`target_population` must be positive".into()));
        }
        if self.number_of_solutions == 0 || self.number_of_solutions > 1000 {
            return Err(QioError::ValueError("`number_of_solutions` must be in [1, 1000]".into()));
        }
        Ok(())
    }
}

pub struct PaResult<M: CostModel> {
    pub best_cost: f64,
    pub best_state: M::State,
    pub solutions: Vec<(f64, M::State)>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
}

/// Resample `replicas` to exactly `target` copies using expected-copy weights `w_i`
/// normalized by their sum (spec §4.4 step 3): `⌊κ_i⌋` guaranteed copies plus one more with
/// probability `κ_i − ⌊κ_i⌋`, then duplicate/truncate uniformly to hit the target exactly.
fn resample<M: CostModel>(replicas: &[Replica<M>], weights: &[f64], target: usize, rng: &mut Rng64) -> Vec<usize> {
    let total: f64 = weights.iter().sum();
    let mut indices = Vec::with_capacity(target);
    if total <= 0.0 || !total.is_finite() {
        // Degenerate weights (all replicas equally bad/invalid): fall back to uniform keep.
        for i in 0..replicas.len() {
            indices.push(i);
        }
    } else {
        for (i, &w) in weights.iter().enumerate() {
            let kappa = target as f64 * w / total;
            let floor = kappa.floor();
            let extra = if rng.uniform() < kappa - floor { 1 } else { 0 };
            for _ in 0..(floor as usize + extra) {
                indices.push(i);
            }
        }
    }

    if indices.is_empty() {
        // Every weight rounded to zero copies: keep the single best replica alive.
        let best = (0..replicas.len())
            .min_by(|&a, &b| replicas[a].cost.partial_cmp(&replicas[b].cost).unwrap())
            .unwrap_or(0);
        indices.push(best);
    }

    while indices.len() < target {
        let pick = rng.uniform_index(indices.len());
        indices.push(indices[pick]);
    }
    indices.truncate(target);
    indices
}

pub fn run<M: CostModel + Sync>(model: &M, params: &PaParams, halt: HaltFlag) -> QioResult<PaResult<M>> {
    params.validate()?;

    let mut master = Rng64::seeded(params.seed);
    let mut replicas: Vec<Replica<M>> =
        (0..params.target_population).map(|_| Replica::new(model, master.fork(), 0.0)).collect();
    for r in &mut replicas {
        r.note_if_best(0);
    }

    let check = TerminationCheck::new(params.step_limit, params.cost_limit, params.time_limit, halt);
    let log = MilestoneLog::new();
    let acceptor = Acceptor;
    let mut prev_beta = params.schedule.value(0.0);

    let mut step = 0u64;
    let exit_reason;
    loop {
        let best_so_far = replicas.iter().map(|r| r.best_cost).fold(f64::INFINITY, f64::min);
        if let Some(reason) = check.should_stop(step, best_so_far) {
            exit_reason = reason;
            break;
        }

        let progress = step as f64 / params.step_limit.max(1) as f64;
        let beta = params.schedule.value(progress);

        replicas.par_iter_mut().for_each(|replica| {
            replica.metropolis_sweep(model, &acceptor, beta);
        });

        let delta_beta = beta - prev_beta;
        let weights: Vec<f64> = replicas.iter().map(|r| (-delta_beta * r.cost).exp()).collect();
        let keep = resample(&replicas, &weights, params.target_population, &mut master);
        let resampled: Vec<Replica<M>> = keep
            .into_iter()
            .map(|i| Replica {
                state: replicas[i].state.clone(),
                cost: replicas[i].cost,
                rng: replicas[i].rng.fork(),
                best_state: replicas[i].best_state.clone(),
                best_cost: replicas[i].best_cost,
                slot: replicas[i].slot,
                milestones: replicas[i].milestones.clone(),
            })
            .collect();
        replicas = resampled;
        prev_beta = beta;

        step += 1;
        for replica in &mut replicas {
            if replica.note_if_best(step) {
                log.record(step, replica.best_cost);
            }
        }
    }

    let best_index = (0..replicas.len())
        .min_by(|&a, &b| replicas[a].best_cost.partial_cmp(&replicas[b].best_cost).unwrap())
        .unwrap_or(0);

    let mut solutions: Vec<(f64, M::State)> = replicas.iter().map(|r| (r.best_cost, r.best_state.clone())).collect();
    solutions.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    solutions.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-12);
    solutions.truncate(params.number_of_solutions);

    Ok(PaResult {
        best_cost: replicas[best_index].best_cost,
        best_state: replicas[best_index].best_state.clone(),
        solutions,
        milestones: log.snapshot(),
        exit_reason,
        last_step: step,
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
    fn population_stays_at_target_size_through_resampling() {
        let model = ring(10);
        let params = PaParams {
            step_limit: 50,
            seed: 3,
            target_population: 20,
            schedule: Schedule::geometric(0.1, 3.0).unwrap(),
            cost_limit: None,
            time_limit: None,
            number_of_solutions: 5,
        };
        let result = run(&model, &params, HaltFlag::new()).unwrap();
        assert_eq!(result.exit_reason, ExitReason::StepLimit);
        assert!(result.best_cost <= -6.0, "got {}", result.best_cost);
    }

    #[test]
    fn invalid_target_population_is_value_error() {
        let model = ring(4);
        let params = PaParams {
            step_limit: 10,
            seed: 1,
            target_population: 0,
            schedule: Schedule::Constant(1.0),
            cost_limit: None,
            time_limit: None,
            number_of_solutions: 1,
        };
        assert!(run(&model, &params, HaltFlag::new()).is_err());
    }

    #[test]
    fn resample_respects_target_count() {
        let model = ring(4);
        let mut master = Rng64::seeded(1);
        let replicas: Vec<Replica<IsingModel>> = (0..5).map(|_| Replica::new(&model, master.fork(), 0.0)).collect();
        let weights = vec![1.0, 2.0, 0.0, 5.0, 1.0];
        let mut rng = Rng64::seeded(2);
        let keep = resample(&replicas, &weights, 10, &mut rng);
        assert_eq!(keep.len(), 10);
        assert!(keep.iter().all(|&i| i < 5));
    }
}
