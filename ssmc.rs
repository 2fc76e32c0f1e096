//! Substochastic Monte Carlo: a walker population evolves via interleaved walk/death-birth
//! steps parameterized by α/β schedules (C12, spec §4.5).
//!
//! Grounded on `original_source/cpp/solver/test/substochastic_monte_carlo_test.cc` for the
//! α/β-schedule parameterization; the walk/kill/spawn decision rule itself is taken directly
//! from spec §4.5, which spells out the per-walker probabilities precisely enough that no
//! C++ body needed lifting.

use crate::error::{QioError, QioResult};
use crate::model::CostModel;
use crate::replica::Replica;
use crate::rng::Rng64;
use crate::schedule::Schedule;
use crate::termination::{ExitReason, HaltFlag, MilestoneLog, TerminationCheck};
use std::time::Duration;

/// Clones a walker as an independent peer with its own forked RNG stream, so a spawned
/// copy doesn't replay its parent's future draws (spec §5 "Shared state").
fn fork_peer<M: CostModel>(walker: &mut Replica<M>) -> Replica<M> {
    Replica {
        state: walker.state.clone(),
        cost: walker.cost,
        rng: walker.rng.fork(),
        best_state: walker.best_state.clone(),
        best_cost: walker.best_cost,
        slot: walker.slot,
        milestones: walker.milestones.clone(),
    }
}

#[derive(Clone, Debug)]
pub struct SsmcParams {
    pub step_limit: u64,
    pub seed: u64,
    pub target_population: usize,
    /// Walk strength α(progress) and death-birth strength β(progress); α(p)+β(p) must stay
    /// in [0,1] at every sampled progress (the remainder is a no-op move, spec §4.5).
    pub alpha: Schedule,
    pub beta: Schedule,
    pub cost_limit: Option<f64>,
    pub time_limit: Option<Duration>,
    pub number_of_solutions: usize,
}

impl SsmcParams {
    fn validate(&self) -> QioResult<()> {
        if self.target_population == 0 {
            return Err(QioError::ValueError("`target_population` must be positive".into()));
        }
        if self.number_of_solutions == 0 || self.number_of_solutions > 1000 {
            return Err(QioError::ValueError("`number_of_solutions` must be in [1, 1000]".into()));
        }
        for i in 0..=10 {
            let p = i as f64 / 10.0;
            if self.alpha.value(p) + self.beta.value(p) > 1.0 + 1e-9 {
                return Err(QioError::ValueError("alpha(p) + beta(p) must not exceed 1".into()));
            }
        }
        Ok(())
    }
}

pub struct SsmcResult<M: CostModel> {
    pub best_cost: f64,
    pub best_state: M::State,
    pub solutions: Vec<(f64, M::State)>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
}

pub fn run<M: CostModel + Sync>(model: &M, params: &SsmcParams, halt: HaltFlag) -> QioResult<SsmcResult<M>> {
    params.validate()?;

    let mut master = Rng64::seeded(params.seed);
    let mut walkers: Vec<Replica<M>> =
        (0..params.target_population).map(|_| Replica::new(model, master.fork(), 1.0)).collect();
    for w in &mut walkers {
        w.note_if_best(0);
    }

    let check = TerminationCheck::new(params.step_limit, params.cost_limit, params.time_limit, halt);
    let log = MilestoneLog::new();

    let mut step = 0u64;
    let exit_reason;
    loop {
        let best_so_far = walkers.iter().map(|w| w.best_cost).fold(f64::INFINITY, f64::min);
        if let Some(reason) = check.should_stop(step, best_so_far) {
            exit_reason = reason;
            break;
        }

        let progress = step as f64 / params.step_limit.max(1) as f64;
        let alpha = params.alpha.value(progress);
        let beta = params.beta.value(progress);
        let e_min = best_so_far;

        let mut next_generation: Vec<Replica<M>> = Vec::with_capacity(walkers.len());
        for mut walker in walkers {
            let roll = walker.rng.uniform();
            if roll < alpha {
                // Walk: apply a random transition unconditionally (spec §4.5).
                let transition = model.random_transition(&walker.state, &mut walker.rng);
                let delta = model.calculate_cost_difference(&walker.state, transition);
                model.apply_transition(transition, &mut walker.state);
                walker.cost += delta;
                next_generation.push(walker);
            } else if roll < alpha + beta {
                // Death-birth: the walker dies with probability `min(1, β·(E - E_min))` for
                // a positive energy gap above the running best, rescaled by the model's
                // energy scale; survivors may spawn a complementary copy.
                let gap = (walker.cost - e_min).max(0.0) * model.scale_factor().max(1e-12).recip();
                let death_prob = (beta * gap).min(1.0);
                let death_roll = walker.rng.uniform();
                if death_roll >= death_prob {
                    next_generation.push(fork_peer(&mut walker));
                }
                let spawn_roll = walker.rng.uniform();
                if spawn_roll < 1.0 - death_prob {
                    next_generation.push(walker);
                }
            } else {
                // Leftover probability: no-op.
                next_generation.push(walker);
            }
        }

        // Re-normalize to target population: truncate overflow, duplicate uniformly on
        // shortfall (spec §4.5's final sentence).
        if next_generation.is_empty() {
            // Every walker died: repopulate from fresh random states rather than stalling.
            next_generation.push(Replica::new(model, master.fork(), 1.0));
        }
        while next_generation.len() < params.target_population {
            let pick = master.uniform_index(next_generation.len());
            let clone = fork_peer(&mut next_generation[pick]);
            next_generation.push(clone);
        }
        next_generation.truncate(params.target_population);
        walkers = next_generation;

        step += 1;
        for walker in &mut walkers {
            if walker.note_if_best(step) {
                log.record(step, walker.best_cost);
            }
        }
    }

    let best_index = (0..walkers.len())
        .min_by(|&a, &b| walkers[a].best_cost.partial_cmp(&walkers[b].best_cost).unwrap())
        .unwrap_or(0);

    let mut solutions: Vec<(f64, M::State)> = walkers.iter().map(|w| (w.best_cost, w.best_state.clone())).collect();
    solutions.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    solutions.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-12);
    solutions.truncate(params.number_of_solutions);

    Ok(SsmcResult {
        best_cost: walkers[best_index].best_cost,
        best_state: walkers[best_index].best_state.clone(),
        solutions,
        milestones: log.snapshot(),
        exit_reason,
        last_step: step,
    })
}
