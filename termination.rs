//! Step/time/cost-limit termination and milestone telemetry (C15, spec §4.8, §5).
//!
//! Grounded on SPEC_FULL §4.8/§5's exit-reason enumeration and cooperative-cancellation
//! model; the `Arc<AtomicBool>` halt-flag pattern is cross-checked against the pack's other
//! `ctrlc` users (e.g. `nervosnetwork-ckb`'s shutdown-signal plumbing). A single halt flag
//! is set either by a POSIX signal handler or by a wall-clock watcher and is consulted only
//! at macro-step boundaries — never inside a sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a solver loop stopped (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    StepLimit,
    CostLimit,
    TimeLimit,
    Halted,
    /// The loop never needed to run — e.g. an all-constant problem (spec B1).
    Immediate,
}

/// Cooperative cancellation flag. Cloning shares the same underlying `AtomicBool`; the
/// signal handler and the wall-clock watcher both hold a clone, consulted by solver loops
/// only between macro-steps (spec §5 "Cancellation and timeouts").
#[derive(Clone, Debug, Default)]
pub struct HaltFlag(Arc<AtomicBool>);

impl HaltFlag {
    pub fn new() -> Self {
        HaltFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Checks, in priority order, whether a solver loop should stop at a macro-step boundary:
/// external halt first (it can fire for any reason, including a time limit that already
/// fired), then step limit, then cost limit.
pub struct TerminationCheck {
    pub step_limit: u64,
    pub cost_limit: Option<f64>,
    pub deadline: Option<Instant>,
    pub halt: HaltFlag,
}

impl TerminationCheck {
    pub fn new(step_limit: u64, cost_limit: Option<f64>, time_limit: Option<Duration>, halt: HaltFlag) -> Self {
        TerminationCheck {
            step_limit,
            cost_limit,
            deadline: time_limit.map(|d| Instant::now() + d),
            halt,
        }
    }

    /// `step` is the macro-step *about to start* (0-based); `best_cost` is the best cost
    /// seen so far across all replicas.
    pub fn should_stop(&self, step: u64, best_cost: f64) -> Option<ExitReason> {
        if self.halt.is_set() {
            return Some(ExitReason::Halted);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(ExitReason::TimeLimit);
            }
        }
        if step >= self.step_limit {
            return Some(ExitReason::StepLimit);
        }
        if let Some(limit) = self.cost_limit {
            if best_cost <= limit {
                return Some(ExitReason::CostLimit);
            }
        }
        None
    }
}

/// Append-only log of `(step, cost)` pairs, one per strict best-cost improvement, shared
/// across replicas via a single mutex — contention is negligible because improvements are
/// rare (spec §5 "Locking").
#[derive(Default)]
pub struct MilestoneLog(std::sync::Mutex<Vec<(u64, f64)>>);

impl MilestoneLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, step: u64, cost: f64) {
        self.0.lock().unwrap().push((step, cost));
    }

    pub fn snapshot(&self) -> Vec<(u64, f64)> {
        let mut v = self.0.lock().unwrap().clone();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }
}
