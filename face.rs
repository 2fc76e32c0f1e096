//! SLC (Squared Linear Combination) grouped terms: `C · (Σ_i w_i x_i + w_0)^2` (spec §3).
//!
//! Grounded on `original_source/cpp/graph/face.h` and `cpp/graph/faced_graph.h`. A face
//! groups a set of *linear* edges — enforced here at construction time: no nested faces, at
//! most one constant sub-term, like-terms pre-combined, no non-linear sub-edges.

use crate::error::{QioError, QioResult};
use crate::graph::RawTerm;

/// One linear sub-term of a face: weight `w` on variable `var`, or (if `var` is `None`) the
/// constant offset `w_0`.
#[derive(Clone, Debug)]
pub struct LinearTerm {
    pub weight: f64,
    pub var: Option<usize>,
}

/// A single SLC face: `cost · (Σ w_i x_i + w0)^2` over dense internal variable ids.
#[derive(Clone, Debug)]
pub struct Face {
    pub cost: f64,
    pub linear: Vec<LinearTerm>,
    pub w0: f64,
}

impl Face {
    /// Build a face from raw sub-terms (pre-normalization to dense ids is the caller's job,
    /// same as `Graph::from_raw_terms`). Like-terms referring to the same variable are
    /// combined; at most one constant sub-term is allowed; a sub-term with locality > 1 is
    /// rejected (faces only group linear edges).
    pub fn from_raw(cost: f64, sub_terms: &[RawTerm], name_to_id: &mut dyn FnMut(i64) -> usize) -> QioResult<Self> {
        let mut by_var: std::collections::HashMap<usize, f64> = std::collections::HashMap::new();
        let mut w0 = 0.0;
        let mut const_seen = false;

        for t in sub_terms {
            match t.ids.len() {
                0 => {
                    if const_seen {
                        return Err(QioError::InvalidTypes(
                            "SLC face: at most one constant sub-term allowed".into(),
                        ));
                    }
                    const_seen = true;
                    w0 += t.cost;
                }
                1 => {
                    let vid = name_to_id(t.ids[0]);
                    *by_var.entry(vid).or_insert(0.0) += t.cost;
                }
                _ => {
                    return Err(QioError::InvalidTypes(
                        "SLC face: sub-terms must be linear (locality <= 1)".into(),
                    ));
                }
            }
        }

        let mut linear: Vec<LinearTerm> = by_var
            .into_iter()
            .map(|(var, weight)| LinearTerm { weight, var: Some(var) })
            .collect();
        linear.sort_by_key(|l| l.var);

        Ok(Face { cost, linear, w0 })
    }

    /// Full evaluation: `cost · (Σ w_i x_i + w0)^2`. `x` maps dense variable id -> {0,1} (or
    /// {-1,1} for spin models — the linear sum is agnostic to the encoding as long as the
    /// caller passes the correct numeric value per variable).
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let sum = self.inner_sum(x);
        self.cost * sum * sum
    }

    /// The running inner sum `Σ w_i x_i + w0`, cached by callers as `2·sum` per spec §3.
    pub fn inner_sum(&self, x: &[f64]) -> f64 {
        let mut sum = self.w0;
        for l in &self.linear {
            if let Some(v) = l.var {
                sum += l.weight * x[v];
            }
        }
        sum
    }

    /// Weight of `var` within this face, if it participates (0.0 otherwise).
    pub fn weight_of(&self, var: usize) -> f64 {
        self.linear
            .iter()
            .find(|l| l.var == Some(var))
            .map(|l| l.weight)
            .unwrap_or(0.0)
    }

    /// Δcost of changing variable `var`'s value from `old` to `new`, given the current
    /// cached running sum (`Σ w_i x_i + w0`, *not* doubled). `new_sum` is returned alongside
    /// so the caller can update its cache in O(1).
    pub fn delta_and_new_sum(&self, var: usize, old: f64, new: f64, cached_sum: f64) -> (f64, f64) {
        let w = self.weight_of(var);
        let new_sum = cached_sum + w * (new - old);
        let delta = self.cost * (new_sum * new_sum - cached_sum * cached_sum);
        (delta, new_sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_matches_direct_computation() {
        let face = Face {
            cost: 2.0,
            linear: vec![
                LinearTerm { weight: 1.0, var: Some(0) },
                LinearTerm { weight: -1.0, var: Some(1) },
            ],
            w0: 0.5,
        };
        let x = vec![1.0, 0.0];
        // sum = 1*1 - 1*0 + 0.5 = 1.5; cost*sum^2 = 2*2.25 = 4.5
        assert!((face.evaluate(&x) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn delta_matches_full_recompute() {
        let face = Face {
            cost: 1.5,
            linear: vec![
                LinearTerm { weight: 2.0, var: Some(0) },
                LinearTerm { weight: 3.0, var: Some(1) },
            ],
            w0: -1.0,
        };
        let mut x = vec![1.0, 0.0];
        let before = face.evaluate(&x);
        let cached_sum = face.inner_sum(&x);
        let (delta, new_sum) = face.delta_and_new_sum(1, 0.0, 1.0, cached_sum);
        x[1] = 1.0;
        let after = face.evaluate(&x);
        assert!((after - before - delta).abs() < 1e-9);
        assert!((new_sum - face.inner_sum(&x)).abs() < 1e-9);
    }

    #[test]
    fn rejects_second_constant_subterm() {
        let terms = vec![
            RawTerm { cost: 1.0, ids: vec![] },
            RawTerm { cost: 2.0, ids: vec![] },
        ];
        let mut next = 0usize;
        let mut map = |_id: i64| { let v = next; next += 1; v };
        assert!(Face::from_raw(1.0, &terms, &mut map).is_err());
    }

    #[test]
    fn rejects_nonlinear_subterm() {
        let terms = vec![RawTerm { cost: 1.0, ids: vec![1, 2] }];
        let mut next = 0usize;
        let mut map = |_id: i64| { let v = next; next += 1; v };
        assert!(Face::from_raw(1.0, &terms, &mut map).is_err());
    }
}
