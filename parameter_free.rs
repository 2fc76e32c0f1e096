//! Parameter-free wrappers: probe → learned schedule → production run, for any of SA/PT/PA/
//! SSMC/Tabu (C14, spec §4.7).
//!
//! Grounded on `original_source/cpp/solver/test/{pa_pf,ssmc_pf,tabu_pf}_test.cc`'s
//! probe/production split; the sweeps-per-second timing measurement that turns a wall-clock
//! budget into a `step_limit` has no direct C++ source to lift (the C++ harness runs under a
//! test framework's own clock), so it's written the way the teacher times its own simulation
//! batches in `sim::run_parallel` — a short timed sample, then a linear extrapolation.

use crate::acceptor::Acceptor;
use crate::error::{QioError, QioResult};
use crate::estimator::{Estimator, EstimatorResult};
use crate::model::CostModel;
use crate::pa::{self, PaParams};
use crate::pt::{self, PtParams};
use crate::replica::Replica;
use crate::rng::Rng64;
use crate::sa::{self, SaParams};
use crate::schedule::Schedule;
use crate::ssmc::{self, SsmcParams};
use crate::tabu::{self, TabuParams};
use crate::termination::{ExitReason, HaltFlag};
use std::time::{Duration, Instant};

const PROBE_SWEEP_COUNT: usize = 32;
/// Floor on the production step count so a pathologically slow sweep (or an almost-exhausted
/// budget) still gets at least a few macro-steps rather than `step_limit = 0`.
const MIN_STEP_LIMIT: u64 = 8;

#[derive(Clone, Debug)]
pub enum WrappedTarget {
    Sa,
    Pt { replicas: usize },
    Pa { target_population: usize },
    Ssmc { target_population: usize },
    Tabu { tabu_tenure: u64, stall_limit: u64 },
}

#[derive(Clone, Debug)]
pub struct ParameterFreeParams {
    pub seed: u64,
    pub time_budget: Duration,
    pub restarts: usize,
    pub number_of_solutions: usize,
    pub cost_limit: Option<f64>,
    pub target: WrappedTarget,
}

impl ParameterFreeParams {
    fn validate(&self) -> QioResult<()> {
        if self.restarts == 0 {
            return Err(QioError::ValueError("`restarts` must be at least 1".into()));
        }
        if self.number_of_solutions == 0 || self.number_of_solutions > 1000 {
            return Err(QioError::ValueError("`number_of_solutions` must be in [1, 1000]".into()));
        }
        Ok(())
    }
}

pub struct ParameterFreeResult<M: CostModel> {
    pub best_cost: f64,
    pub best_state: M::State,
    pub solutions: Vec<(f64, M::State)>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
    /// The probe's learned |Δ| distribution, kept on the result for diagnostics/logging.
    pub probe: EstimatorResult,
}

/// Times a short batch of Metropolis sweeps to extrapolate a macro-step budget from wall-clock
/// time (spec §4.7 step 1's "derive the count of sweeps... from a target time budget").
fn measure_sweeps_per_second<M: CostModel + Sync>(model: &M, rng: &mut Rng64) -> f64 {
    if model.sweep_size() == 0 {
        return f64::INFINITY;
    }
    let acceptor = Acceptor;
    let mut replica = Replica::new(model, rng.fork(), 1.0);
    let start = Instant::now();
    for _ in 0..PROBE_SWEEP_COUNT {
        replica.metropolis_sweep(model, &acceptor, 1.0);
    }
    let elapsed = start.elapsed().as_secs_f64().max(1e-9);
    PROBE_SWEEP_COUNT as f64 / elapsed
}

/// Runs the probe phase: estimator statistics plus a sweeps-per-second timing sample. Returns
/// `(probe, step_limit, remaining_budget)`.
fn probe<M: CostModel + Sync>(
    model: &M,
    master: &mut Rng64,
    time_budget: Duration,
) -> (EstimatorResult, u64, Duration) {
    let probe_start = Instant::now();
    let result = Estimator::analyze(model, master);
    let sweeps_per_second = measure_sweeps_per_second(model, master);

    let elapsed = probe_start.elapsed();
    let remaining = time_budget.saturating_sub(elapsed);
    let step_limit = if sweeps_per_second.is_finite() {
        ((remaining.as_secs_f64() * sweeps_per_second).floor() as u64).max(MIN_STEP_LIMIT)
    } else {
        MIN_STEP_LIMIT
    };
    (result, step_limit, remaining)
}

/// Geometric `(initial, final)` schedule bounds from the probe, falling back to a flat
/// schedule when the probe found no usable |Δ| sample (constant-only problem, spec B1).
fn schedule_bounds(probe: &EstimatorResult) -> QioResult<Schedule> {
    if probe.count == 0 {
        return Ok(Schedule::Constant(1.0));
    }
    let v0 = probe.initial.max(probe.final_ * (1.0 + 1e-6));
    let v1 = probe.final_.max(f64::EPSILON);
    Schedule::geometric(v0, v1)
}

pub fn run<M: CostModel<Transition = usize> + Sync>(
    model: &M,
    params: &ParameterFreeParams,
    halt: HaltFlag,
) -> QioResult<ParameterFreeResult<M>> {
    params.validate()?;

    let mut master = Rng64::seeded(params.seed);
    let (probe_result, step_limit, remaining) = probe(model, &mut master, params.time_budget);
    let schedule = schedule_bounds(&probe_result)?;

    match &params.target {
        WrappedTarget::Sa => {
            let sa_params = SaParams {
                step_limit,
                seed: master.next_u64(),
                restarts: params.restarts,
                number_of_solutions: params.number_of_solutions,
                cost_limit: params.cost_limit,
                time_limit: Some(remaining),
                use_inverse_temperature: false,
                schedule,
            };
            let r = sa::run(model, &sa_params, halt)?;
            Ok(ParameterFreeResult {
                best_cost: r.best_cost,
                best_state: r.best_state,
                solutions: r.solutions,
                milestones: r.milestones,
                exit_reason: r.exit_reason,
                last_step: r.last_step,
                probe: probe_result,
            })
        }
        WrappedTarget::Pt { replicas } => {
            let replicas = (*replicas).max(2);
            let t_hi = schedule.value(0.0);
            // A degenerate probe (constant-only problem, spec B1) collapses initial==final;
            // widen slightly so the ladder stays strictly increasing as `PtParams` requires.
            let t_lo = (schedule.value(1.0)).min(t_hi * 0.999);
            let ladder = Schedule::geometric(t_lo, t_hi)?;
            let temperatures: Vec<f64> =
                (0..replicas).map(|i| ladder.value(i as f64 / (replicas - 1) as f64)).collect();
            let pt_params = PtParams {
                step_limit,
                seed: master.next_u64(),
                temperatures,
                use_inverse_temperatures: false,
                cost_limit: params.cost_limit,
                time_limit: Some(remaining),
                number_of_solutions: params.number_of_solutions,
            };
            let r = pt::run(model, &pt_params, halt)?;
            Ok(ParameterFreeResult {
                best_cost: r.best_cost,
                best_state: r.best_state,
                solutions: r.solutions,
                milestones: r.milestones,
                exit_reason: r.exit_reason,
                last_step: r.last_step,
                probe: probe_result,
            })
        }
        WrappedTarget::Pa { target_population } => {
            let beta_schedule = Schedule::geometric(1.0 / schedule.value(0.0), 1.0 / schedule.value(1.0))?;
            let pa_params = PaParams {
                step_limit,
                seed: master.next_u64(),
                target_population: *target_population,
                schedule: beta_schedule,
                cost_limit: params.cost_limit,
                time_limit: Some(remaining),
                number_of_solutions: params.number_of_solutions,
            };
            let r = pa::run(model, &pa_params, halt)?;
            Ok(ParameterFreeResult {
                best_cost: r.best_cost,
                best_state: r.best_state,
                solutions: r.solutions,
                milestones: r.milestones,
                exit_reason: r.exit_reason,
                last_step: r.last_step,
                probe: probe_result,
            })
        }
        WrappedTarget::Ssmc { target_population } => {
            // No direct analogue of temperature for SSMC's walk/death-birth rates; ramp a
            // death-birth strength from gentle to aggressive, keeping a constant, conservative
            // walk probability so `alpha + beta <= 1` always holds (spec §4.5).
            let ssmc_params = SsmcParams {
                step_limit,
                seed: master.next_u64(),
                target_population: *target_population,
                alpha: Schedule::Constant(0.3),
                beta: Schedule::Linear { v0: 0.05, v1: 0.6 },
                cost_limit: params.cost_limit,
                time_limit: Some(remaining),
                number_of_solutions: params.number_of_solutions,
            };
            let r = ssmc::run(model, &ssmc_params, halt)?;
            Ok(ParameterFreeResult {
                best_cost: r.best_cost,
                best_state: r.best_state,
                solutions: r.solutions,
                milestones: r.milestones,
                exit_reason: r.exit_reason,
                last_step: r.last_step,
                probe: probe_result,
            })
        }
        WrappedTarget::Tabu { tabu_tenure, stall_limit } => {
            let tabu_params = TabuParams {
                step_limit,
                seed: master.next_u64(),
                restarts: params.restarts,
                tabu_tenure: *tabu_tenure,
                stall_limit: *stall_limit,
                number_of_solutions: params.number_of_solutions,
                cost_limit: params.cost_limit,
                time_limit: Some(remaining),
            };
            let r = run_tabu_linear_search(model, &tabu_params, halt)?;
            Ok(ParameterFreeResult {
                best_cost: r.best_cost,
                best_state: r.best_state,
                solutions: r.solutions,
                milestones: r.milestones,
                exit_reason: r.exit_reason,
                last_step: r.last_step,
                probe: probe_result,
            })
        }
    }
}

/// The "linear-search" wrapper variant (spec §4.7 final paragraph): micro-benchmarks a few
/// tabu-tenure candidates on a short budget each, then runs the winner for the remaining time.
fn run_tabu_linear_search<M: CostModel<Transition = usize> + Sync>(
    model: &M,
    base: &TabuParams,
    halt: HaltFlag,
) -> QioResult<crate::tabu::TabuResult<M>> {
    let candidates: Vec<u64> = [1u64, base.tabu_tenure, base.tabu_tenure * 4]
        .into_iter()
        .filter(|&t| t > 0)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    if candidates.len() <= 1 {
        return tabu::run(model, base, halt);
    }

    let micro_budget = (base.time_limit.unwrap_or(Duration::from_secs(1)) / (candidates.len() as u32 * 4))
        .max(Duration::from_millis(1));
    let micro_steps = (base.step_limit / (candidates.len() as u64 * 4)).max(MIN_STEP_LIMIT);

    let mut best_tenure = base.tabu_tenure;
    let mut best_cost = f64::INFINITY;
    for &tenure in &candidates {
        let probe_params = TabuParams {
            step_limit: micro_steps,
            time_limit: Some(micro_budget),
            tabu_tenure: tenure,
            restarts: 1,
            ..base.clone()
        };
        if let Ok(r) = tabu::run(model, &probe_params, halt.clone()) {
            if r.best_cost < best_cost {
                best_cost = r.best_cost;
                best_tenure = tenure;
            }
        }
    }

    let production = TabuParams { tabu_tenure: best_tenure, ..base.clone() };
    tabu::run(model, &production, halt)
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
    fn parameter_free_sa_descends_within_its_own_budget() {
        let model = ring(10);
        let params = ParameterFreeParams {
            seed: 1,
            time_budget: Duration::from_millis(200),
            restarts: 2,
            number_of_solutions: 1,
            cost_limit: None,
            target: WrappedTarget::Sa,
        };
        let result = run(&model, &params, HaltFlag::new()).unwrap();
        assert!(result.best_cost <= -4.0, "got {}", result.best_cost);
    }

    #[test]
    fn parameter_free_tabu_linear_search_runs_to_completion() {
        let model = ring(8);
        let params = ParameterFreeParams {
            seed: 2,
            time_budget: Duration::from_millis(200),
            restarts: 1,
            number_of_solutions: 1,
            cost_limit: None,
            target: WrappedTarget::Tabu { tabu_tenure: 3, stall_limit: 10 },
        };
        let result = run(&model, &params, HaltFlag::new()).unwrap();
        assert!(result.best_cost <= -4.0, "got {}", result.best_cost);
    }

    #[test]
    fn invalid_restarts_is_value_error() {
        let model = ring(4);
        let params = ParameterFreeParams {
            seed: 1,
            time_budget: Duration::from_millis(50),
            restarts: 0,
            number_of_solutions: 1,
            cost_limit: None,
            target: WrappedTarget::Sa,
        };
        assert!(run(&model, &params, HaltFlag::new()).is_err());
    }
}
