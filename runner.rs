//! Process runner: the single place that wires logging, signal handling, the solver registry,
//! and result-document assembly together (C18/C19, spec §5, §6, §9.10).
//!
//! Grounded on `original_source/cpp/app/runner.cc`'s `main()` — parse parameters, build the
//! model, dispatch to a solver, retry once on a recoverable memory failure, assemble a
//! benchmark. `cli.rs` is a thin `clap` wrapper around the three entry points here
//! (`solve`/`validate`/`bench`), the same split the teacher's old runner/CLI pair used.

use crate::config::{CostFunctionType, ModelConfig, ProblemSource, SolverParams};
use crate::error::{QioError, QioResult};
use crate::registry::{AnyModel, EngineOutcome, SolverKind};
use crate::result::{
    duration_ms, exit_reason_name, Benchmark, BuildInfo, Invocation, MilestoneRecord, ParameterEcho, ResultDocument,
    SolutionsBlock, SolverBenchmark,
};
use crate::termination::HaltFlag;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const RETRY_COMPACT_STATE_BYTES: usize = 64 * 1024 * 1024;
/// Window within which a second SIGINT escalates to immediate process exit (spec §6 signal
/// table: "first SIGINT prints status, second within 2s halts, third aborts").
const SECOND_SIGINT_WINDOW: Duration = Duration::from_secs(2);

/// Installs the `tracing-subscriber` formatter at the level named by the parameter document's
/// `log` key (spec §6). Safe to call more than once per process; later calls are no-ops.
pub fn init_logging(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Installs the process-wide signal handlers described in spec §6's signal table, driving a
/// single [`HaltFlag`] shared with the solver loop. Returns the flag to pass into `solve`.
///
/// Grounded on the `ctrlc` crate's single global-handler model (also how the pack's other
/// `ctrlc` consumers structure shutdown); POSIX `SIGUSR1`/`SIGUSR2`/`SIGFPE`/`SIGTERM` beyond
/// `SIGINT` aren't reachable through `ctrlc`'s cross-platform API, so this installs the
/// portable subset (`SIGINT` with first/second/third-press escalation) and documents the rest.
pub fn install_signal_handler() -> HaltFlag {
    let halt = HaltFlag::new();
    let handler_halt = halt.clone();
    let sigint_count = Arc::new(AtomicU8::new(0));
    let last_sigint: Arc<std::sync::Mutex<Option<Instant>>> = Arc::new(std::sync::Mutex::new(None));

    let result = ctrlc::set_handler(move || {
        let mut last = last_sigint.lock().unwrap();
        let now = Instant::now();
        let within_window = last.map(|t| now.duration_since(t) < SECOND_SIGINT_WINDOW).unwrap_or(false);
        *last = Some(now);
        let count = sigint_count.fetch_add(1, Ordering::SeqCst) + 1;

        if count == 1 {
            warn!("SIGINT received: finishing the current macro-step, then halting");
            handler_halt.set();
        } else if count == 2 && within_window {
            warn!("second SIGINT within 2s: halting immediately");
            std::process::exit(130);
        } else {
            warn!("SIGINT received again: aborting");
            std::process::abort();
        }
    });
    if let Err(e) = result {
        warn!(error = %e, "failed to install SIGINT handler; Ctrl-C will not halt gracefully");
    }
    halt
}

fn build_model_with_retry(
    cfg: &ModelConfig,
    allow_dup_merge: bool,
    max_memory_bytes: Option<u64>,
) -> QioResult<AnyModel> {
    match AnyModel::build(cfg, allow_dup_merge, max_memory_bytes) {
        Ok(model) => Ok(model),
        Err(e) if e.is_recoverable_memory_limited() => {
            warn!("memory limit exceeded building the requested model; retrying with the compact adaptive encoding");
            AnyModel::retry_compact(cfg, allow_dup_merge, RETRY_COMPACT_STATE_BYTES)
        }
        Err(e) => Err(e),
    }
}

fn run_outcome(model: &AnyModel, kind: SolverKind, params: &SolverParams, halt: HaltFlag) -> QioResult<EngineOutcome> {
    match model {
        AnyModel::Ising(m) => crate::registry::run_with_model(m, kind, params, halt),
        AnyModel::Pubo(m) => crate::registry::run_with_model(m, kind, params, halt),
        AnyModel::IsingGrouped(m) => crate::registry::run_with_model(m, kind, params, halt),
        AnyModel::PuboGrouped(m) => crate::registry::run_with_model(m, kind, params, halt),
        AnyModel::PuboAdaptive(m) => crate::registry::run_with_model(m, kind, params, halt),
    }
}

fn parameter_echo(params: &SolverParams, kind: SolverKind) -> ParameterEcho {
    let mut echo = ParameterEcho::new();
    echo.insert("target".into(), params.target.clone());
    echo.insert("seed".into(), params.seed.unwrap_or(0).to_string());
    if let Some(v) = params.step_limit {
        echo.insert("step_limit".into(), v.to_string());
    }
    if let Some(v) = params.number_of_solutions {
        echo.insert("number_of_solutions".into(), v.to_string());
    }
    if let Some(v) = params.restarts {
        echo.insert("restarts".into(), v.to_string());
    }
    if matches!(
        kind,
        SolverKind::SimulatedAnnealingParameterFree
            | SolverKind::ParallelTemperingParameterFree
            | SolverKind::PopulationAnnealingParameterFree
            | SolverKind::SubstochasticMonteCarloParameterFree
            | SolverKind::TabuParameterFree
    ) {
        echo.insert(
            "time_budget_secs".into(),
            params.time_budget_secs.unwrap_or(10.0).to_string(),
        );
    }
    echo
}

/// Dedicated `rayon` thread pool sized from `threads`, falling back to
/// `std::thread::available_parallelism()` (spec §5 "Concurrency").
fn build_thread_pool(params: &SolverParams) -> QioResult<rayon::ThreadPool> {
    let threads = params
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| QioError::Invariant(format!("failed to build thread pool: {e}")))
}

/// Runs one `target` end to end: load problem + parameter documents, build the model, dispatch
/// to the named solver, assemble a [`ResultDocument`]. This is what both `solve` and `bench`
/// call; `validate` stops one step earlier.
pub fn solve(params_path: &std::path::Path, halt: HaltFlag) -> QioResult<ResultDocument> {
    let overall_start = Instant::now();
    let params = SolverParams::load(params_path)?;
    init_logging(params.log.as_tracing_level());
    info!(target = %params.target, input = %params.input_data_uri, "starting run");

    let kind = SolverKind::parse(&params.target)?;
    let pool = build_thread_pool(&params)?;

    let preprocess_start = Instant::now();
    let source = ProblemSource::detect(&params.input_data_uri);
    let cfg = source.load()?;
    let allow_dup_merge = !matches!(cfg.cost_function_type, CostFunctionType::Maxsat);
    let model = build_model_with_retry(&cfg, allow_dup_merge, params.max_memory_bytes)?;
    let preprocessing_ms = duration_ms(preprocess_start.elapsed());

    let solve_start = Instant::now();
    let outcome = pool.install(|| run_outcome(&model, kind, &params, halt))?;
    let execution_ms = duration_ms(solve_start.elapsed());

    let postprocess_start = Instant::now();
    let doc = ResultDocument {
        solutions: SolutionsBlock {
            cost: outcome.best_cost,
            configuration: outcome.best_configuration,
            parameters: parameter_echo(&params, kind),
            solutions: outcome.solutions,
        },
        benchmark: Benchmark {
            execution_time_ms: execution_ms,
            execution_cpu_time_ms: execution_ms,
            preprocessing_ms,
            postprocessing_ms: duration_ms(postprocess_start.elapsed()),
            end2end_time_ms: duration_ms(overall_start.elapsed()),
            threads: pool.current_num_threads(),
            max_memory_usage_bytes: 0,
            disk_io_read_bytes: 0,
            disk_io_write_bytes: 0,
            solver: SolverBenchmark {
                cost_milestones: outcome
                    .milestones
                    .into_iter()
                    .map(|(step, cost)| MilestoneRecord { step, cost })
                    .collect(),
                exit_reason: exit_reason_name(outcome.exit_reason).to_string(),
                last_step: outcome.last_step,
                step_limit: params.step_limit.unwrap_or(0),
            },
            build: BuildInfo::default(),
            invocation: Invocation::current(),
        },
    };
    info!(cost = outcome.best_cost, exit_reason = exit_reason_name(outcome.exit_reason), "run finished");
    Ok(doc)
}

/// Parses and validates the parameter document and its referenced problem document without
/// running a solver (spec §6.1 `qiotoolkit validate`).
pub fn validate(params_path: &std::path::Path) -> QioResult<()> {
    let params = SolverParams::load(params_path)?;
    SolverKind::parse(&params.target)?;
    let source = ProblemSource::detect(&params.input_data_uri);
    let cfg = source.load()?;
    let allow_dup_merge = !matches!(cfg.cost_function_type, CostFunctionType::Maxsat);
    AnyModel::build(&cfg, allow_dup_merge, params.max_memory_bytes).map(|_| ())
}

/// Runs `solve` `repeat` times back to back, returning every result document (spec §6.1
/// `qiotoolkit bench --repeat N`).
pub fn bench(params_path: &std::path::Path, repeat: usize, halt: HaltFlag) -> QioResult<Vec<ResultDocument>> {
    (0..repeat).map(|i| {
        info!(iteration = i, of = repeat, "bench iteration");
        solve(params_path, halt.clone())
    }).collect()
}
