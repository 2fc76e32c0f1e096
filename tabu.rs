//! Tabu Search: best-improvement local search with tenure-based move prohibition (C13, spec
//! §4.6).
//!
//! Grounded on `original_source/cpp/solver/test/tabu_test.cc` for the
//! tenure/stall-window parameterization; the aspiration criterion (accept a tabu move anyway
//! if it beats the best-seen cost) is spec §4.6 step 2's explicit carve-out. Every concrete
//! model in this crate represents a transition as a variable index (`Transition = usize`,
//! `0..sweep_size()`), which full enumeration here relies on directly rather than through a
//! separate "list all transitions" trait method.

use crate::error::{QioError, QioResult};
use crate::model::CostModel;
use crate::replica::Replica;
use crate::rng::Rng64;
use crate::termination::{ExitReason, HaltFlag, MilestoneLog, TerminationCheck};
use rayon::prelude::*;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct TabuParams {
    pub step_limit: u64,
    pub seed: u64,
    pub restarts: usize,
    /// Steps a just-flipped variable stays forbidden from flipping again.
    pub tabu_tenure: u64,
    /// Steps without a best-cost improvement before the chain randomizes its state.
    pub stall_limit: u64,
    pub number_of_solutions: usize,
    pub cost_limit: Option<f64>,
    pub time_limit: Option<Duration>,
}

impl TabuParams {
    fn validate(&self) -> QioResult<()> {
        if self.restarts == 0 {
            return Err(QioError::ValueError("`restarts` must be at least 1".into()));
        }
        if self.number_of_solutions == 0 || self.number_of_solutions > 1000 {
            return Err(QioError::ValueError("`number_of_solutions` must be in [1, 1000]".into()));
        }
        if self.stall_limit == 0 {
            return Err(QioError::ValueError("`stall_limit` must be at least 1".into()));
        }
        Ok(())
    }
}

pub struct TabuResult<M: CostModel> {
    pub best_cost: f64,
    pub best_state: M::State,
    pub solutions: Vec<(f64, M::State)>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
}

/// Runs one restart chain to completion (or until halted).
fn run_chain<M: CostModel<Transition = usize> + Sync>(
    model: &M,
    params: &TabuParams,
    rng: Rng64,
    check: &TerminationCheck,
    log: &MilestoneLog,
) -> (Replica<M>, ExitReason, u64) {
    let mut replica = Replica::new(model, rng, 0.0);
    let n = model.sweep_size();
    let mut tabu_until = vec![0u64; n];
    let mut stall = 0u64;
    let mut step = 0u64;

    loop {
        if let Some(reason) = check.should_stop(step, replica.best_cost) {
            return (replica, reason, step);
        }
        if n == 0 {
            return (replica, ExitReason::Immediate, step);
        }

        let mut best_variable = 0usize;
        let mut best_delta = f64::INFINITY;
        let mut best_non_tabu_variable: Option<usize> = None;
        let mut best_non_tabu_delta = f64::INFINITY;

        for var in 0..n {
            let delta = model.calculate_cost_difference(&replica.state, var);
            if delta < best_delta {
                best_delta = delta;
                best_variable = var;
            }
            let is_tabu = tabu_until[var] > step;
            if !is_tabu && delta < best_non_tabu_delta {
                best_non_tabu_delta = delta;
                best_non_tabu_variable = Some(var);
            }
        }

        // Aspiration: a tabu move is taken anyway if it would beat the best-seen cost
        // outright (spec §4.6 step 2).
        let aspires = replica.cost + best_delta < replica.best_cost;
        let chosen = if aspires {
            best_variable
        } else if let Some(v) = best_non_tabu_variable {
            v
        } else {
            best_variable
        };
        let delta = model.calculate_cost_difference(&replica.state, chosen);
        model.apply_transition(chosen, &mut replica.state);
        replica.cost += delta;
        tabu_until[chosen] = step + 1 + params.tabu_tenure;

        step += 1;
        if replica.note_if_best(step) {
            log.record(step, replica.best_cost);
            stall = 0;
        } else {
            stall += 1;
        }

        if stall >= params.stall_limit {
            replica.state = model.random_state(&mut replica.rng);
            replica.cost = model.calculate_cost(&replica.state);
            tabu_until.iter_mut().for_each(|t| *t = 0);
            stall = 0;
        }
    }
}

/// Runs Tabu Search: `params.restarts` independent chains in parallel, reporting the best
/// chain's result (spec §4.6).
pub fn run<M: CostModel<Transition = usize> + Sync>(
    model: &M,
    params: &TabuParams,
    halt: HaltFlag,
) -> QioResult<TabuResult<M>> {
    params.validate()?;

    if model.sweep_size() == 0 {
        let state = model.random_state(&mut Rng64::seeded(params.seed));
        let cost = model.calculate_cost(&state);
        return Ok(TabuResult {
            best_cost: cost,
            best_state: state.clone(),
            solutions: vec![(cost, state)],
            milestones: Vec::new(),
            exit_reason: ExitReason::Immediate,
            last_step: 0,
        });
    }

    let mut master = Rng64::seeded(params.seed);
    let chain_rngs: Vec<Rng64> = (0..params.restarts).map(|_| master.fork()).collect();
    let check = TerminationCheck::new(params.step_limit, params.cost_limit, params.time_limit, halt);
    let log = MilestoneLog::new();

    let results: Vec<(Replica<M>, ExitReason, u64)> = chain_rngs
        .into_par_iter()
        .map(|rng| run_chain(model, params, rng, &check, &log))
        .collect();

    let mut best_index = 0;
    for (i, (replica, _, _)) in results.iter().enumerate() {
        if replica.best_cost < results[best_index].0.best_cost {
            best_index = i;
        }
    }
    let (best_replica, exit_reason, last_step) = &results[best_index];

    let mut solutions: Vec<(f64, M::State)> =
        results.iter().map(|(r, _, _)| (r.best_cost, r.best_state.clone())).collect();
    solutions.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    solutions.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-12);
    solutions.truncate(params.number_of_solutions);

    Ok(TabuResult {
        best_cost: best_replica.best_cost,
        best_state: best_replica.best_state.clone(),
        solutions,
        milestones: log.snapshot(),
        exit_reason: *exit_reason,
        last_step: *last_step,
    })
}
