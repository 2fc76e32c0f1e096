//! Derives initial/final temperatures from energy-difference statistics (C7, spec §4.7).
//!
//! Grounded on `original_source/cpp/solver/test/estimator_test.cc`: the estimator samples
//! random states and random single-variable transitions, collects the |Δ| distribution, and
//! reports a high quantile (`initial`, chosen so a typical worsening move is accepted with
//! probability ≈ 0.5 at that temperature) and a low quantile (`final`, so only a genuinely
//! small move survives). Sampling continues adaptively until the running quantile estimate
//! stabilizes, which is why `count` varies slightly across seeds (`RngSensitivity` in the
//! grounding test tolerates up to ~15% relative deviation) and scales with problem size
//! (`AnalyzeExtended` expects ~2x count for a 2x-larger disconnected duplicate).

use crate::model::CostModel;
use crate::rng::Rng64;

const BATCH_SIZE: usize = 8;
const MAX_BATCHES: usize = 64;
const CONVERGENCE_TOLERANCE: f64 = 0.02;
const ACCEPT_HALF_LIFE_LN2: f64 = std::f64::consts::LN_2;

#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorResult {
    pub count: usize,
    pub initial: f64,
    pub final_: f64,
}

/// Samples |Δ| over random states/transitions until the high/low quantile estimates stop
/// moving, then derives initial/final temperatures from them.
pub struct Estimator;

impl Estimator {
    pub fn analyze<M: CostModel>(model: &M, rng: &mut Rng64) -> EstimatorResult {
        let mut magnitudes: Vec<f64> = Vec::new();
        let mut prev_initial = f64::INFINITY;
        let mut prev_final = f64::INFINITY;
        let samples_per_batch = BATCH_SIZE.max(model.sweep_size() / 8).max(1);

        for _ in 0..MAX_BATCHES {
            for _ in 0..samples_per_batch {
                let state = model.random_state(rng);
                let t = model.random_transition(&state, rng);
                let delta = model.calculate_cost_difference(&state, t).abs();
                if delta > 0.0 {
                    magnitudes.push(delta);
                }
            }
            if magnitudes.len() < 2 {
                continue;
            }
            let (hi, lo) = quantiles(&magnitudes);
            let converged = relative_change(hi, prev_initial) < CONVERGENCE_TOLERANCE
                && relative_change(lo, prev_final) < CONVERGENCE_TOLERANCE;
            prev_initial = hi;
            prev_final = lo;
            if converged {
                break;
            }
        }

        if magnitudes.is_empty() {
            // Constant-only / no-flip model (spec B1): no meaningful schedule, degrade to a
            // single-point schedule that cannot move anything.
            return EstimatorResult { count: 0, initial: 0.0, final_: 0.0 };
        }

        let (hi, lo) = quantiles(&magnitudes);
        EstimatorResult {
            count: magnitudes.len(),
            initial: hi / ACCEPT_HALF_LIFE_LN2,
            final_: (lo / ACCEPT_HALF_LIFE_LN2).max(f64::EPSILON),
        }
    }
}

fn relative_change(a: f64, b: f64) -> f64 {
    if !b.is_finite() {
        return f64::INFINITY;
    }
    (a - b).abs() / b.abs().max(f64::EPSILON)
}

/// `(high quantile, low quantile)` of the sample, at the 90th and 10th percentile.
fn quantiles(samples: &[f64]) -> (f64, f64) {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let hi_idx = ((sorted.len() as f64 - 1.0) * 0.90).round() as usize;
    let lo_idx = ((sorted.len() as f64 - 1.0) * 0.10).round() as usize;
    (sorted[hi_idx], sorted[lo_idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RawTerm;
    use crate::model_ising::IsingModel;

    fn base_ising() -> IsingModel {
        let terms = vec![
            RawTerm { cost: 0.128789, ids: vec![0, 1] },
            RawTerm { cost: 1.873590, ids: vec![0, 2] },
            RawTerm { cost: -1.909049, ids: vec![0, 3] },
            RawTerm { cost: -1.221736, ids: vec![0, 5] },
            RawTerm { cost: 0.364197, ids: vec![0, 9] },
            RawTerm { cost: -0.128786, ids: vec![1, 4] },
            RawTerm { cost: 0.144797, ids: vec![1, 6] },
            RawTerm { cost: -0.436185, ids: vec![1, 9] },
            RawTerm { cost: -0.420332, ids: vec![2, 3] },
            RawTerm { cost: -0.039110, ids: vec![2, 4] },
        ];
        IsingModel::from_raw_terms(&terms, false).unwrap()
    }

    #[test]
    fn analyze_produces_initial_above_final() {
        let model = base_ising();
        let mut rng = Rng64::seeded(42);
        let result = Estimator::analyze(&model, &mut rng);
        assert!(result.count > 0);
        assert!(result.initial >= result.final_);
        assert!(result.final_ > 0.0);
    }

    #[test]
    fn analyze_strong_scales_temperatures_with_edge_magnitude() {
        let base = base_ising();
        let mut strong_terms = Vec::new();
        for edge in &base.graph.edges {
            let names: Vec<i64> = edge.node_ids.iter().map(|&v| base.graph.node_id_to_name[v]).collect();
            strong_terms.push(RawTerm { cost: edge.cost * 10.0, ids: names });
        }
        let strong = IsingModel::from_raw_terms(&strong_terms, false).unwrap();

        let mut rng1 = Rng64::seeded(42);
        let base_result = Estimator::analyze(&base, &mut rng1);
        let mut rng2 = Rng64::seeded(42);
        let strong_result = Estimator::analyze(&strong, &mut rng2);

        assert!((strong_result.initial - base_result.initial * 10.0).abs() < base_result.initial * 0.5);
    }

    #[test]
    fn analyze_empty_flip_model_returns_zero() {
        // A single-variable model with no edges can't occur via from_raw_terms (empty terms
        // error), so instead check the zero-delta short-circuit: a model where every sampled
        // transition happens to have zero magnitude falls back cleanly rather than panicking.
        let terms = vec![RawTerm { cost: 0.0, ids: vec![0, 1] }];
        let model = IsingModel::from_raw_terms(&terms, false).unwrap();
        let mut rng = Rng64::seeded(1);
        let result = Estimator::analyze(&model, &mut rng);
        assert_eq!(result.count, 0);
        assert_eq!(result.initial, 0.0);
    }
}
