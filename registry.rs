//! Solver registry: `target` string -> `SolverKind`, `ModelConfig` -> concrete model, and the
//! generic engine dispatch that turns either into an [`EngineOutcome`] (C18, spec §6/§9
//! "Polymorphism over models").
//!
//! Grounded on `original_source/cpp/solver/solver_registry.h`'s name->factory map; the closed
//! `SolverKind` enum plays the same role the C++ registry's string keys play, but resolved
//! once at parse time into a `match`-able sum type rather than a runtime lookup table, per
//! Design Note "Polymorphism over models". `AnyModel` plays the analogous role for the five
//! concrete cost-function variants (spec §4.1).

use crate::config::{CostFunctionType, ModelConfig, SolverParams};
use crate::error::{QioError, QioResult};
use crate::estimator::Estimator;
use crate::model::CostModel;
use crate::model_grouped::{IsingGroupedModel, PuboGroupedModel};
use crate::model_ising::IsingModel;
use crate::model_pubo::PuboModel;
use crate::model_pubo_adaptive::PuboAdaptiveModel;
use crate::pa::{self, PaParams};
use crate::parameter_free::{self, ParameterFreeParams, WrappedTarget};
use crate::pt::{self, PtParams};
use crate::rng::Rng64;
use crate::sa::{self, SaParams};
use crate::schedule::Schedule;
use crate::ssmc::{self, SsmcParams};
use crate::tabu::{self, TabuParams};
use crate::termination::{ExitReason, HaltFlag};
use std::collections::HashMap;
use std::time::Duration;

/// Closed enum over every solver identifier this crate recognizes (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverKind {
    SimulatedAnnealing,
    SimulatedAnnealingParameterFree,
    ParallelTempering,
    ParallelTemperingParameterFree,
    PopulationAnnealing,
    PopulationAnnealingParameterFree,
    SubstochasticMonteCarlo,
    SubstochasticMonteCarloParameterFree,
    Tabu,
    TabuParameterFree,
    /// Registered per resolved Open Question (ii); `run_with_model` always returns
    /// `QioError::NotImplemented` for this kind.
    QuantumMonteCarlo,
}

impl SolverKind {
    pub fn parse(target: &str) -> QioResult<Self> {
        use SolverKind::*;
        let (base, parameter_free) = match target.strip_suffix("-parameterfree") {
            Some(b) => (b, true),
            None => (target, false),
        };
        Ok(match (base, parameter_free) {
            ("simulatedannealing.qiotoolkit", false) => SimulatedAnnealing,
            ("simulatedannealing.qiotoolkit", true) => SimulatedAnnealingParameterFree,
            ("paralleltempering.qiotoolkit", false) => ParallelTempering,
            ("paralleltempering.qiotoolkit", true) => ParallelTemperingParameterFree,
            ("populationannealing.cpu", false) => PopulationAnnealing,
            ("populationannealing.cpu", true) => PopulationAnnealingParameterFree,
            ("substochasticmontecarlo.cpu", false) => SubstochasticMonteCarlo,
            ("substochasticmontecarlo.cpu", true) => SubstochasticMonteCarloParameterFree,
            ("tabu.qiotoolkit", false) => Tabu,
            ("tabu.qiotoolkit", true) => TabuParameterFree,
            ("quantummontecarlo.qiotoolkit", false) => QuantumMonteCarlo,
            _ => return Err(QioError::ValueError(format!("unrecognized solver target '{target}'"))),
        })
    }
}

/// Closed sum over the concrete cost-function variants this crate implements (spec §4.1),
/// standing in for the registry's "model by `cost_function_type`" axis.
pub enum AnyModel {
    Ising(IsingModel),
    Pubo(PuboModel),
    IsingGrouped(IsingGroupedModel),
    PuboGrouped(PuboGroupedModel),
    PuboAdaptive(PuboAdaptiveModel),
}

fn raw_faces(cfg: &ModelConfig) -> Vec<(f64, Vec<crate::graph::RawTerm>)> {
    cfg.terms_slc.iter().map(|f| (f.cost, f.terms.clone())).collect()
}

impl AnyModel {
    /// Builds the model named by `cfg.cost_function_type`. When `memory_budget` is set and the
    /// PUBO encoding's per-state estimate exceeds it, raises `QioError::MemoryLimited` instead
    /// of constructing it — the one recoverable failure class (spec §4.9/§7), caught by
    /// `runner::solve` and retried against [`AnyModel::retry_compact`].
    pub fn build(cfg: &ModelConfig, allow_dup_merge: bool, memory_budget: Option<u64>) -> QioResult<Self> {
        match cfg.cost_function_type {
            CostFunctionType::Ising => Ok(AnyModel::Ising(IsingModel::from_raw_terms(&cfg.terms, allow_dup_merge)?)),
            CostFunctionType::Pubo => {
                let model = PuboModel::from_raw_terms(&cfg.terms, allow_dup_merge)?;
                if let Some(budget) = memory_budget {
                    if (model.state_memory_estimate() as u64) > budget {
                        return Err(QioError::MemoryLimited);
                    }
                }
                Ok(AnyModel::Pubo(model))
            }
            CostFunctionType::IsingGrouped => {
                Ok(AnyModel::IsingGrouped(IsingGroupedModel::new(&cfg.terms, &raw_faces(cfg), allow_dup_merge)?))
            }
            CostFunctionType::PuboGrouped => {
                Ok(AnyModel::PuboGrouped(PuboGroupedModel::new(&cfg.terms, &raw_faces(cfg), allow_dup_merge)?))
            }
            CostFunctionType::Maxsat => Err(QioError::NotImplemented(
                "direct 'maxsat' cost_function_type outside the DIMACS adapter is not supported; \
                 provide a .cnf/.wcnf input_data_uri instead"
                    .into(),
            )),
            CostFunctionType::Clock | CostFunctionType::Tsp | CostFunctionType::Poly => Err(QioError::NotImplemented(
                format!("cost function type {:?} is out of scope for this crate", cfg.cost_function_type),
            )),
        }
    }

    /// Retries after a `MemoryLimited` failure with the byte-budgeted adaptive PUBO encoding
    /// (spec §4.9's single recoverable retry). Only PUBO has a compact counterpart in this
    /// crate; any other kind re-raises the original error.
    pub fn retry_compact(cfg: &ModelConfig, allow_dup_merge: bool, max_state_bytes: usize) -> QioResult<Self> {
        match cfg.cost_function_type {
            CostFunctionType::Pubo => {
                Ok(AnyModel::PuboAdaptive(PuboAdaptiveModel::from_raw_terms(&cfg.terms, allow_dup_merge, max_state_bytes)?))
            }
            _ => Err(QioError::MemoryLimited),
        }
    }
}

/// Model-agnostic engine result, built from whichever concrete `M: CostModel` a solver ran
/// against via `model.render_state()` (spec §3.1/§6 "solutions" block).
pub struct EngineOutcome {
    pub best_cost: f64,
    pub best_configuration: HashMap<String, i64>,
    pub solutions: Vec<crate::result::SolutionEntry>,
    pub milestones: Vec<(u64, f64)>,
    pub exit_reason: ExitReason,
    pub last_step: u64,
}

impl EngineOutcome {
    fn build<M: CostModel>(
        model: &M,
        best_cost: f64,
        best_state: &M::State,
        solutions: &[(f64, M::State)],
        milestones: Vec<(u64, f64)>,
        exit_reason: ExitReason,
        last_step: u64,
    ) -> Self {
        EngineOutcome {
            best_cost,
            best_configuration: model.render_state(best_state),
            solutions: solutions
                .iter()
                .map(|(cost, state)| crate::result::SolutionEntry { cost: *cost, configuration: model.render_state(state) })
                .collect(),
            milestones,
            exit_reason,
            last_step,
        }
    }
}

const DEFAULT_STEP_LIMIT: u64 = 1000;
const DEFAULT_REPLICAS: usize = 5;
const DEFAULT_TARGET_POPULATION: usize = 32;
const DEFAULT_TIME_BUDGET_SECS: f64 = 10.0;

/// Builds the geometric `(high, low)` schedule bounds a probe would learn (spec §4.7 step 1),
/// used whenever an explicit (non-parameter-free) target omits its schedule entirely — the
/// parameter document's `schedule`/`temperatures`/`alpha`/`beta` keys are all optional.
fn probed_schedule<M: CostModel + Sync>(model: &M, rng: &mut Rng64) -> QioResult<Schedule> {
    let probe = Estimator::analyze(model, rng);
    if probe.count == 0 {
        return Ok(Schedule::Constant(1.0));
    }
    let v0 = probe.initial.max(probe.final_ * (1.0 + 1e-6));
    let v1 = probe.final_.max(f64::EPSILON);
    Schedule::geometric(v0, v1)
}

fn resolve_schedule<M: CostModel + Sync>(model: &M, spec: Option<crate::config::ScheduleSpec>, rng: &mut Rng64) -> QioResult<Schedule> {
    match spec {
        Some(spec) => spec.into_schedule(),
        None => probed_schedule(model, rng),
    }
}

/// Runs `kind` against `model`, converting its engine-specific result into a model-agnostic
/// [`EngineOutcome`] for the result-document assembler (`result.rs`).
pub fn run_with_model<M: CostModel<Transition = usize> + Sync>(
    model: &M,
    kind: SolverKind,
    params: &SolverParams,
    halt: HaltFlag,
) -> QioResult<EngineOutcome> {
    let seed = params.seed.unwrap_or(0);
    let step_limit = params.step_limit.unwrap_or(DEFAULT_STEP_LIMIT);
    let number_of_solutions = params.number_of_solutions.unwrap_or(1);
    let restarts = params.restarts.unwrap_or(1);
    let cost_limit = params.cost_limit;
    let mut rng = Rng64::seeded(seed);

    match kind {
        SolverKind::SimulatedAnnealing => {
            let schedule = resolve_schedule(model, params.schedule.clone(), &mut rng)?;
            let sa_params = SaParams {
                step_limit,
                seed,
                restarts,
                number_of_solutions,
                cost_limit,
                time_limit: None,
                use_inverse_temperature: params.beta_start.is_some(),
                schedule,
            };
            let r = sa::run(model, &sa_params, halt)?;
            Ok(EngineOutcome::build(model, r.best_cost, &r.best_state, &r.solutions, r.milestones, r.exit_reason, r.last_step))
        }
        SolverKind::ParallelTempering => {
            let temperatures = match &params.temperatures {
                Some(t) => t.clone(),
                None => {
                    let bounds = probed_schedule(model, &mut rng)?;
                    let hi = bounds.value(0.0);
                    let lo = bounds.value(1.0).min(hi * 0.999);
                    let ladder = Schedule::geometric(lo, hi)?;
                    (0..DEFAULT_REPLICAS).map(|i| ladder.value(i as f64 / (DEFAULT_REPLICAS - 1) as f64)).collect()
                }
            };
            let pt_params = PtParams {
                step_limit,
                seed,
                temperatures,
                use_inverse_temperatures: false,
                cost_limit,
                time_limit: None,
                number_of_solutions,
            };
            let r = pt::run(model, &pt_params, halt)?;
            Ok(EngineOutcome::build(model, r.best_cost, &r.best_state, &r.solutions, r.milestones, r.exit_reason, r.last_step))
        }
        SolverKind::PopulationAnnealing => {
            let schedule = match &params.schedule {
                Some(spec) => spec.clone().into_schedule()?,
                None => {
                    let bounds = probed_schedule(model, &mut rng)?;
                    Schedule::geometric(1.0 / bounds.value(0.0), 1.0 / bounds.value(1.0))?
                }
            };
            let pa_params = PaParams {
                step_limit,
                seed,
                target_population: params.target_population.unwrap_or(DEFAULT_TARGET_POPULATION),
                schedule,
                cost_limit,
                time_limit: None,
                number_of_solutions,
            };
            let r = pa::run(model, &pa_params, halt)?;
            Ok(EngineOutcome::build(model, r.best_cost, &r.best_state, &r.solutions, r.milestones, r.exit_reason, r.last_step))
        }
        SolverKind::SubstochasticMonteCarlo => {
            let alpha = match &params.alpha {
                Some(spec) => spec.clone().into_schedule()?,
                None => Schedule::Constant(0.3),
            };
            let beta = match &params.beta {
                Some(spec) => spec.clone().into_schedule()?,
                None => Schedule::Linear { v0: 0.05, v1: 0.6 },
            };
            let ssmc_params = SsmcParams {
                step_limit,
                seed,
                target_population: params.target_population.unwrap_or(DEFAULT_TARGET_POPULATION),
                alpha,
                beta,
                cost_limit,
                time_limit: None,
                number_of_solutions,
            };
            let r = ssmc::run(model, &ssmc_params, halt)?;
            Ok(EngineOutcome::build(model, r.best_cost, &r.best_state, &r.solutions, r.milestones, r.exit_reason, r.last_step))
        }
        SolverKind::Tabu => {
            let tabu_params = TabuParams {
                step_limit,
                seed,
                restarts,
                tabu_tenure: params.tabu_tenure.unwrap_or(20),
                stall_limit: (step_limit / 10).max(10),
                number_of_solutions,
                cost_limit,
                time_limit: None,
            };
            let r = tabu::run(model, &tabu_params, halt)?;
            Ok(EngineOutcome::build(model, r.best_cost, &r.best_state, &r.solutions, r.milestones, r.exit_reason, r.last_step))
        }
        SolverKind::SimulatedAnnealingParameterFree
        | SolverKind::ParallelTemperingParameterFree
        | SolverKind::PopulationAnnealingParameterFree
        | SolverKind::SubstochasticMonteCarloParameterFree
        | SolverKind::TabuParameterFree => {
            let target = match kind {
                SolverKind::SimulatedAnnealingParameterFree => WrappedTarget::Sa,
                SolverKind::ParallelTemperingParameterFree => {
                    WrappedTarget::Pt { replicas: params.temperatures.as_ref().map(|t| t.len()).unwrap_or(DEFAULT_REPLICAS) }
                }
                SolverKind::PopulationAnnealingParameterFree => {
                    WrappedTarget::Pa { target_population: params.target_population.unwrap_or(DEFAULT_TARGET_POPULATION) }
                }
                SolverKind::SubstochasticMonteCarloParameterFree => {
                    WrappedTarget::Ssmc { target_population: params.target_population.unwrap_or(DEFAULT_TARGET_POPULATION) }
                }
                SolverKind::TabuParameterFree => {
                    WrappedTarget::Tabu { tabu_tenure: params.tabu_tenure.unwrap_or(20), stall_limit: (step_limit / 10).max(10) }
                }
                _ => unreachable!(),
            };
            let pf_params = ParameterFreeParams {
                seed,
                time_budget: Duration::from_secs_f64(params.time_budget_secs.unwrap_or(DEFAULT_TIME_BUDGET_SECS)),
                restarts,
                number_of_solutions,
                cost_limit,
                target,
            };
            let r = parameter_free::run(model, &pf_params, halt)?;
            Ok(EngineOutcome::build(model, r.best_cost, &r.best_state, &r.solutions, r.milestones, r.exit_reason, r.last_step))
        }
        SolverKind::QuantumMonteCarlo => Err(QioError::NotImplemented(
            "quantummontecarlo.qiotoolkit is registered but not part of this crate's MCMC core".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostFunctionType;
    use crate::graph::RawTerm;

    fn ring_config(n: usize) -> ModelConfig {
        let terms: Vec<RawTerm> = (0..n as i64).map(|i| RawTerm { cost: 1.0, ids: vec![i, (i + 1) % n as i64] }).collect();
        ModelConfig { cost_function_type: CostFunctionType::Ising, version: "1.0".into(), terms, terms_slc: Vec::new(), initial_configuration: None }
    }

    #[test]
    fn parses_every_documented_target_string() {
        assert_eq!(SolverKind::parse("simulatedannealing.qiotoolkit").unwrap(), SolverKind::SimulatedAnnealing);
        assert_eq!(
            SolverKind::parse("simulatedannealing.qiotoolkit-parameterfree").unwrap(),
            SolverKind::SimulatedAnnealingParameterFree
        );
        assert_eq!(SolverKind::parse("paralleltempering.qiotoolkit").unwrap(), SolverKind::ParallelTempering);
        assert_eq!(SolverKind::parse("populationannealing.cpu").unwrap(), SolverKind::PopulationAnnealing);
        assert_eq!(SolverKind::parse("substochasticmontecarlo.cpu").unwrap(), SolverKind::SubstochasticMonteCarlo);
        assert_eq!(SolverKind::parse("tabu.qiotoolkit").unwrap(), SolverKind::Tabu);
        assert_eq!(SolverKind::parse("quantummontecarlo.qiotoolkit").unwrap(), SolverKind::QuantumMonteCarlo);
    }

    #[test]
    fn unrecognized_target_is_value_error() {
        assert!(SolverKind::parse("murex.poly").is_err());
    }

    #[test]
    fn quantum_montecarlo_is_not_implemented() {
        let cfg = ring_config(6);
        let model = AnyModel::build(&cfg, false, None).unwrap();
        let AnyModel::Ising(model) = model else { panic!("expected Ising") };
        let err = run_with_model(&model, SolverKind::QuantumMonteCarlo, &SolverParams::default(), HaltFlag::new()).unwrap_err();
        assert_eq!(err.code(), 201);
    }

    #[test]
    fn direct_maxsat_cost_function_type_is_not_implemented() {
        let mut cfg = ring_config(4);
        cfg.cost_function_type = CostFunctionType::Maxsat;
        let err = AnyModel::build(&cfg, false, None).unwrap_err();
        assert_eq!(err.code(), 201);
    }

    #[test]
    fn memory_budget_below_estimate_raises_memory_limited_and_retry_recovers() {
        let terms: Vec<RawTerm> = (0..50i64).map(|i| RawTerm { cost: 1.0, ids: vec![i, (i + 1) % 50] }).collect();
        let cfg = ModelConfig { cost_function_type: CostFunctionType::Pubo, version: "1.0".into(), terms, terms_slc: Vec::new(), initial_configuration: None };
        let err = AnyModel::build(&cfg, false, Some(1)).unwrap_err();
        assert!(err.is_recoverable_memory_limited());
        let retried = AnyModel::retry_compact(&cfg, false, 64).unwrap();
        assert!(matches!(retried, AnyModel::PuboAdaptive(_)));
    }

    #[test]
    fn sa_with_no_schedule_falls_back_to_a_probed_schedule() {
        let cfg = ring_config(10);
        let model = AnyModel::build(&cfg, false, None).unwrap();
        let AnyModel::Ising(model) = model else { panic!("expected Ising") };
        let mut params = SolverParams::default();
        params.seed = Some(7);
        params.step_limit = Some(200);
        params.restarts = Some(2);
        let outcome = run_with_model(&model, SolverKind::SimulatedAnnealing, &params, HaltFlag::new()).unwrap();
        assert!(outcome.best_cost <= -6.0, "got {}", outcome.best_cost);
    }

    #[test]
    fn parameter_free_sa_runs_end_to_end() {
        let cfg = ring_config(8);
        let model = AnyModel::build(&cfg, false, None).unwrap();
        let AnyModel::Ising(model) = model else { panic!("expected Ising") };
        let mut params = SolverParams::default();
        params.seed = Some(1);
        params.time_budget_secs = Some(0.2);
        let outcome =
            run_with_model(&model, SolverKind::SimulatedAnnealingParameterFree, &params, HaltFlag::new()).unwrap();
        assert!(outcome.best_cost <= -4.0, "got {}", outcome.best_cost);
    }
}
