//! Parameter-document and problem-document records, and the batch JSON reader that builds
//! them (C17, spec §3.1, §4.11, §6).
//!
//! Grounded on `original_source/cpp/utils/{stream_handler.h,stream_handler_json.h,
//! parameter_builder.h}`. Per Design Note "Streamed configuration" the bespoke SAX-style
//! object-member composition collapses into one batch path: deserialize into a `#[derive]`
//! wire struct with `serde_json`, then fallibly convert into the final record, accumulating
//! dotted-path errors with [`FieldErrors`] instead of failing on the first bad field.

use crate::error::{QioError, QioResult};
use crate::graph::RawTerm;
use crate::schedule::Schedule;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Accumulates `(dotted.path, message)` pairs across one fallible conversion instead of
/// bailing on the first bad field, so a single `solve` invocation reports every problem at
/// once (mirrors the C++ stream handler's multi-field error collection).
#[derive(Debug, Default)]
pub struct FieldErrors(Vec<(String, String)>);

impl FieldErrors {
    pub fn push(&mut self, path: impl Into<String>, msg: impl Into<String>) {
        self.0.push((path.into(), msg.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> QioResult<T> {
        if self.0.is_empty() {
            return Ok(value);
        }
        let joined = self
            .0
            .iter()
            .map(|(path, msg)| format!("{path}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(QioError::ParsingError(joined))
    }
}

// ─── Problem document (`ModelConfig`) ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostFunctionType {
    Ising,
    Pubo,
    IsingGrouped,
    PuboGrouped,
    Maxsat,
    /// Out of scope (spec §1's non-goals); recognized only so the shared validator can
    /// reject its parameters with the right `ValueError` (spec B4) without pretending to
    /// solve it.
    Clock,
    Tsp,
    Poly,
}

impl CostFunctionType {
    fn parse(s: &str) -> Option<Self> {
        use CostFunctionType::*;
        Some(match s {
            "ising" => Ising,
            "pubo" => Pubo,
            "ising_grouped" => IsingGrouped,
            "pubo_grouped" => PuboGrouped,
            "maxsat" => Maxsat,
            "clock" => Clock,
            "tsp" => Tsp,
            "poly" => Poly,
            _ => return None,
        })
    }
}

/// One SLC face as read off the wire, pre-renumbering (spec §3 "Face / grouped term").
#[derive(Clone, Debug)]
pub struct RawFace {
    pub cost: f64,
    pub terms: Vec<RawTerm>,
}

/// In-memory record produced by the problem-document adapter (spec §3.1).
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub cost_function_type: CostFunctionType,
    pub version: String,
    pub terms: Vec<RawTerm>,
    pub terms_slc: Vec<RawFace>,
    pub initial_configuration: Option<HashMap<String, i64>>,
}

#[derive(Deserialize)]
struct WireTerm {
    c: f64,
    #[serde(default)]
    ids: Vec<i64>,
}

#[derive(Deserialize)]
struct WireFace {
    c: f64,
    terms: Vec<WireTerm>,
}

#[derive(Deserialize)]
struct WireCostFunction {
    #[serde(rename = "type")]
    type_: String,
    version: String,
    #[serde(default)]
    terms: Vec<WireTerm>,
    #[serde(default)]
    terms_slc: Vec<WireFace>,
    #[serde(default)]
    initial_configuration: Option<HashMap<String, i64>>,
}

#[derive(Deserialize)]
struct WireProblemDocument {
    cost_function: WireCostFunction,
}

impl TryFrom<WireProblemDocument> for ModelConfig {
    type Error = QioError;

    fn try_from(wire: WireProblemDocument) -> QioResult<Self> {
        let mut errors = FieldErrors::default();
        let cf = wire.cost_function;

        let cost_function_type = match CostFunctionType::parse(&cf.type_) {
            Some(t) => Some(t),
            None => {
                errors.push("cost_function.type", format!("unrecognized cost function type '{}'", cf.type_));
                None
            }
        };

        if cf.terms.is_empty() && cf.terms_slc.is_empty() {
            errors.push("cost_function", "`terms` and `terms_slc` must not both be empty");
        }

        let terms: Vec<RawTerm> = cf
            .terms
            .into_iter()
            .map(|t| RawTerm { cost: t.c, ids: t.ids })
            .collect();
        let terms_slc: Vec<RawFace> = cf
            .terms_slc
            .into_iter()
            .map(|f| RawFace {
                cost: f.c,
                terms: f.terms.into_iter().map(|t| RawTerm { cost: t.c, ids: t.ids }).collect(),
            })
            .collect();

        let cost_function_type = match cost_function_type {
            Some(t) => t,
            None => return errors.into_result(unreachable_model_config()),
        };

        errors.into_result(ModelConfig {
            cost_function_type,
            version: cf.version,
            terms,
            terms_slc,
            initial_configuration: cf.initial_configuration,
        })
    }
}

/// `FieldErrors::into_result` always short-circuits before this value is observed once any
/// error was pushed; it only exists to give the `Some(t) => ... None => ...` match above a
/// value to hand back on the error path without an `unwrap`.
fn unreachable_model_config() -> ModelConfig {
    ModelConfig {
        cost_function_type: CostFunctionType::Ising,
        version: String::new(),
        terms: Vec::new(),
        terms_slc: Vec::new(),
        initial_configuration: None,
    }
}

impl ModelConfig {
    pub fn from_json_str(text: &str) -> QioResult<Self> {
        let wire: WireProblemDocument =
            serde_json::from_str(text).map_err(|e| QioError::ParsingError(e.to_string()))?;
        ModelConfig::try_from(wire)
    }
}

/// Where a problem document comes from, resolved by suffix (spec §6/§6.2).
#[derive(Clone, Debug)]
pub enum ProblemSource {
    Json(PathBuf),
    Dimacs(PathBuf),
    /// Directory of length-delimited protobuf-compatible records. The seam exists; decoding
    /// does not (spec §1, §4.11, §9.11).
    ProtoDir(PathBuf),
}

impl ProblemSource {
    pub fn detect(uri: &str) -> Self {
        let path = PathBuf::from(uri);
        if path.is_dir() {
            return ProblemSource::ProtoDir(path);
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("cnf") | Some("wcnf") => ProblemSource::Dimacs(path),
            _ => ProblemSource::Json(path),
        }
    }

    pub fn load(&self) -> QioResult<ModelConfig> {
        match self {
            ProblemSource::Json(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| QioError::FileIo(e.to_string()))?;
                ModelConfig::from_json_str(&text)
            }
            ProblemSource::Dimacs(path) => crate::dimacs::load(path),
            ProblemSource::ProtoDir(path) => Err(QioError::NotImplemented(format!(
                "protobuf directory problem source not implemented: {}",
                path.display()
            ))),
        }
    }
}

// ─── Parameter document (`SolverParams`) ───────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        use LogLevel::*;
        Some(match s.to_ascii_uppercase().as_str() {
            "INFO" => Info,
            "WARN" | "WARNING" => Warn,
            "ERROR" => Error,
            "FATAL" => Fatal,
            _ => return None,
        })
    }

    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Fatal => tracing::Level::ERROR,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// A schedule as written in the parameter document; resolved into [`Schedule`] once the
/// wrapped target and the energy-difference estimator are known.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScheduleSpec {
    Constant { value: f64 },
    Linear { v0: f64, v1: f64 },
    Geometric { v0: f64, v1: f64 },
}

impl ScheduleSpec {
    pub fn into_schedule(self) -> QioResult<Schedule> {
        match self {
            ScheduleSpec::Constant { value } => Ok(Schedule::Constant(value)),
            ScheduleSpec::Linear { v0, v1 } => Ok(Schedule::Linear { v0, v1 }),
            ScheduleSpec::Geometric { v0, v1 } => Schedule::geometric(v0, v1),
        }
    }
}

/// In-memory record produced by the parameter-document adapter (spec §3.1, §6).
#[derive(Clone, Debug, Default)]
pub struct SolverParams {
    pub target: String,
    pub input_data_uri: String,
    pub seed: Option<u64>,
    pub step_limit: Option<u64>,
    pub cost_limit: Option<f64>,
    pub threads: Option<usize>,
    pub number_of_solutions: Option<usize>,
    pub restarts: Option<usize>,
    pub schedule: Option<ScheduleSpec>,
    pub temperatures: Option<Vec<f64>>,
    pub alpha: Option<ScheduleSpec>,
    pub beta: Option<ScheduleSpec>,
    pub target_population: Option<usize>,
    pub tabu_tenure: Option<u64>,
    pub beta_start: Option<f64>,
    pub beta_stop: Option<f64>,
    /// Clock-model parameter (spec B4); recognized by the shared validator even though the
    /// clock model itself is out of scope, so a bad value is still caught before dispatch.
    pub q: Option<u32>,
    /// Soft budget on one in-flight state's estimated bytes; absent means unconstrained.
    /// Exceeding it during `init()` raises `QioError::MemoryLimited`, which the runner
    /// retries once against the memory-saving adaptive PUBO encoding (spec §4.9).
    pub max_memory_bytes: Option<u64>,
    /// Wall-clock budget for a `-parameterfree` target's probe+production run (spec §4.7,
    /// exercised by S6's "time budget 10 s"); defaults to 10s when a parameter-free target
    /// doesn't specify one.
    pub time_budget_secs: Option<f64>,
    pub log: LogLevel,
}

#[derive(Deserialize)]
struct WireParamsInner {
    seed: Option<u64>,
    step_limit: Option<u64>,
    cost_limit: Option<f64>,
    threads: Option<usize>,
    number_of_solutions: Option<usize>,
    restarts: Option<usize>,
    schedule: Option<ScheduleSpec>,
    temperatures: Option<Vec<f64>>,
    alpha: Option<ScheduleSpec>,
    beta: Option<ScheduleSpec>,
    target_population: Option<usize>,
    tabu_tenure: Option<u64>,
    beta_start: Option<f64>,
    beta_stop: Option<f64>,
    q: Option<u32>,
    max_memory_bytes: Option<u64>,
    time_budget_secs: Option<f64>,
}

#[derive(Deserialize)]
struct WireSolverParams {
    target: String,
    input_data_uri: String,
    #[serde(default)]
    params: Option<WireParamsInner>,
    #[serde(default)]
    log: Option<String>,
}

impl TryFrom<WireSolverParams> for SolverParams {
    type Error = QioError;

    fn try_from(wire: WireSolverParams) -> QioResult<Self> {
        let mut errors = FieldErrors::default();

        if wire.target.trim().is_empty() {
            errors.push("target", "must not be empty");
        }
        if wire.input_data_uri.trim().is_empty() {
            errors.push("input_data_uri", "must not be empty");
        }

        let log = match wire.log {
            Some(s) => match LogLevel::parse(&s) {
                Some(l) => l,
                None => {
                    errors.push("log", format!("unrecognized log level '{s}'"));
                    LogLevel::Info
                }
            },
            None => LogLevel::Info,
        };

        let p = wire.params.unwrap_or(WireParamsInner {
            seed: None,
            step_limit: None,
            cost_limit: None,
            threads: None,
            number_of_solutions: None,
            restarts: None,
            schedule: None,
            temperatures: None,
            alpha: None,
            beta: None,
            target_population: None,
            tabu_tenure: None,
            beta_start: None,
            beta_stop: None,
            q: None,
            max_memory_bytes: None,
            time_budget_secs: None,
        });

        errors.into_result(SolverParams {
            target: wire.target,
            input_data_uri: wire.input_data_uri,
            seed: p.seed,
            step_limit: p.step_limit,
            cost_limit: p.cost_limit,
            threads: p.threads,
            number_of_solutions: p.number_of_solutions,
            restarts: p.restarts,
            schedule: p.schedule,
            temperatures: p.temperatures,
            alpha: p.alpha,
            beta: p.beta,
            target_population: p.target_population,
            tabu_tenure: p.tabu_tenure,
            beta_start: p.beta_start,
            beta_stop: p.beta_stop,
            q: p.q,
            max_memory_bytes: p.max_memory_bytes,
            time_budget_secs: p.time_budget_secs,
            log,
        })
    }
}

impl SolverParams {
    pub fn from_json_str(text: &str) -> QioResult<Self> {
        let wire: WireSolverParams =
            serde_json::from_str(text).map_err(|e| QioError::ParsingError(e.to_string()))?;
        let params = SolverParams::try_from(wire)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> QioResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| QioError::FileIo(e.to_string()))?;
        SolverParams::from_json_str(&text)
    }

    /// Validates the keys every target shares, regardless of which solver ultimately
    /// consumes them (spec B3, B4: `number_of_solutions`/clock's `q` are rejected here, not
    /// deep inside a solver that may not even be the clock model).
    pub fn validate(&self) -> QioResult<()> {
        if let Some(k) = self.number_of_solutions {
            if k == 0 || k > 1000 {
                return Err(QioError::ValueError("`number_of_solutions` must be in [1, 1000]".into()));
            }
        }
        if let Some(q) = self.q {
            if q <= 2 {
                return Err(QioError::ValueError("`q` must be greater than 2".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_problem_document_parses_mixed_constants() {
        let doc = r#"{
            "cost_function": {
                "type": "pubo",
                "version": "1.0",
                "terms": [
                    {"c": -100.0, "ids": []},
                    {"c": -4.0, "ids": [1]},
                    {"c": -8.0, "ids": [1, 12]}
                ]
            }
        }"#;
        let cfg = ModelConfig::from_json_str(doc).unwrap();
        assert_eq!(cfg.cost_function_type, CostFunctionType::Pubo);
        assert_eq!(cfg.terms.len(), 3);
    }

    #[test]
    fn b2_missing_terms_and_terms_slc_is_parsing_error() {
        let doc = r#"{"cost_function": {"type": "ising", "version": "1.0"}}"#;
        let err = ModelConfig::from_json_str(doc).unwrap_err();
        assert_eq!(err.code(), 105);
    }

    #[test]
    fn unrecognized_cost_function_type_is_parsing_error() {
        let doc = r#"{"cost_function": {"type": "bogus", "version": "1.0", "terms": [{"c": 1.0, "ids": [0]}]}}"#;
        let err = ModelConfig::from_json_str(doc).unwrap_err();
        assert_eq!(err.code(), 105);
    }

    #[test]
    fn b3_number_of_solutions_out_of_range_is_value_error() {
        let doc = r#"{
            "target": "simulatedannealing.qiotoolkit",
            "input_data_uri": "problem.json",
            "params": {"number_of_solutions": 1001}
        }"#;
        let err = SolverParams::from_json_str(doc).unwrap_err();
        assert_eq!(err.code(), 107);
    }

    #[test]
    fn b4_clock_q_too_small_is_value_error() {
        let doc = r#"{
            "target": "simulatedannealing.qiotoolkit",
            "input_data_uri": "problem.json",
            "params": {"q": 2}
        }"#;
        let err = SolverParams::from_json_str(doc).unwrap_err();
        assert_eq!(err.code(), 107);
    }

    #[test]
    fn missing_target_is_parsing_error() {
        let doc = r#"{"target": "", "input_data_uri": "problem.json"}"#;
        let err = SolverParams::from_json_str(doc).unwrap_err();
        assert_eq!(err.code(), 105);
    }

    #[test]
    fn problem_source_detects_dimacs_by_suffix() {
        assert!(matches!(ProblemSource::detect("instance.cnf"), ProblemSource::Dimacs(_)));
        assert!(matches!(ProblemSource::detect("instance.wcnf"), ProblemSource::Dimacs(_)));
        assert!(matches!(ProblemSource::detect("instance.json"), ProblemSource::Json(_)));
    }
}
