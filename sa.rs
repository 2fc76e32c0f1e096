//! Simulated Annealing: sequential single-replica Metropolis chain with restarts (C9, spec
//! §4.2).
//!
//! Grounded on `original_source/cpp/solver/test/simulated_annealing_test.cc`'s
//! `SimulatesToyModel`/`SimulatesDefaultParameters` cases (linear/geometric schedule,
//! `restarts`, `beta_start`/`beta_stop` shortcut); idiom cross-checked against
//! `other_examples/argmin-rs-argmin__.../simulatedannealing-mod.rs` and
//! `other_examples/guwidoe-PeopleDistributor__.../simulated_annealing.rs` for the
//! restart-as-parallel-for-each shape.

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
pub struct SaParams {
    pub step_limit: u64,
    pub seed: u64,
    pub restarts: usize,
    pub number_of_solutions: usize,
    pub cost_limit: Option<f64>,
    pub time_limit: Option<Duration>,
    /// If `true`, `schedule` is read as inverse temperature (β); otherwise as temperature
    /// (T), with `acceptor` consuming `1/T` either way.
    pub use_inverse_temperature: bool,
    pub schedule: Schedule,
}

impl SaParams {
    /// Builds the geometric inverse-temperature schedule implied by `beta_start`/`beta_stop`
    /// (spec §4.2 "also accepted").
    pub fn from_beta_range(beta_start: f64, beta_stop: f64, step_limit: u64, seed: u64) -> QioResult<Self> {
        Ok(SaParams {
            step_limit,
            seed,
            restarts: 1,
            number_of_solutions: 1,
            cost_limit: None,
            time_limit: None,
            use_inverse_temperature: true,
            schedule: Schedule::geometric(beta_start, beta_stop)?,
        })
    }

    fn validate(&self) -> QioResult<()> {
        if self.restarts == 0 {
            return Err(QioError::ValueError("`restarts` must be at least 1".into()));
        }
        if self.number_of_solutions == 0 || self.number_of_solutions > 1000 {
            return Err(QioError::ValueError(
                "`number_of_solutions` must be in [1, 1000]".into(),
            ));
        }
        Ok(())
    }
}

pub struct SaResult<M: CostModel> {
    pub best_cost: f64,
    pub best_state: M::State,
    /// Up to `number_of_solutions` distinct-cost states, best-first.
    pub solutions: Vec<(f64, M::State)>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
}

/// Runs one restart chain to completion (or until halted), returning its replica.
fn run_chain<M: CostModel + Sync>(
    model: &M,
    params: &SaParams,
    rng: Rng64,
    check: &TerminationCheck,
    log: &MilestoneLog,
) -> (Replica<M>, ExitReason, u64) {
    let acceptor = Acceptor;
    let mut replica = Replica::new(model, rng, 1.0);
    let mut step = 0u64;
    loop {
        if let Some(reason) = check.should_stop(step, replica.best_cost) {
            return (replica, reason, step);
        }
        let progress = step as f64 / params.step_limit.max(1) as f64;
        let scheduled = params.schedule.value(progress);
        let inverse_temperature = if params.use_inverse_temperature { scheduled } else { 1.0 / scheduled };
        replica.metropolis_sweep(model, &acceptor, inverse_temperature);
        step += 1;
        if replica.note_if_best(step) {
            log.record(step, replica.best_cost);
        }
    }
}

/// Runs Simulated Annealing: `params.restarts` independent chains in parallel over a thread
/// pool (spec §4.2/§5), reporting the best chain's result.
pub fn run<M: CostModel + Sync>(model: &M, params: &SaParams, halt: HaltFlag) -> QioResult<SaResult<M>> {
    params.validate()?;

    if model.sweep_size() == 0 {
        let state = model.random_state(&mut Rng64::seeded(params.seed));
        let cost = model.calculate_cost(&state);
        return Ok(SaResult {
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

    Ok(SaResult {
        best_cost: best_replica.best_cost,
        best_state: best_replica.best_state.clone(),
        solutions,
        milestones: log.snapshot(),
        exit_reason: *exit_reason,
        last_step: *last_step,
    })
}
