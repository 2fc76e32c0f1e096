//! MaxSat-to-PUBO compilation (spec §4.1, §6.2).
//!
//! Grounded on the MaxSat test vectors in
//! `original_source/cpp/model/test/max_sat_test.cc`. Not a fifth model variant: a MaxSat
//! instance is compiled once, at load time, into ordinary [`crate::model_pubo::PuboModel`]
//! raw terms and solved exactly like any other PUBO problem.

use crate::graph::RawTerm;

/// One weighted clause: `weight · Π_i (1 − lit_i)`, where `lit_i` is `x_i` if the literal is
/// positive or `1 − x_i` if negated — the clause contributes its weight exactly when
/// unsatisfied (spec §4.1).
#[derive(Clone, Debug)]
pub struct Clause {
    pub weight: f64,
    /// `(variable_id, is_negated)` pairs.
    pub literals: Vec<(i64, bool)>,
}

/// Compile a clause directly via its truth table: for every one of the `2^k` assignments to
/// its `k` variables, the clause is unsatisfied iff every literal evaluates false; a PUBO
/// term is emitted per assignment whose product-of-indicators matches it. This avoids
/// symbolic inclusion-exclusion sign bugs at the cost of `2^k` work per clause (k is always
/// small for realistic CNF/WCNF input).
pub fn compile_clause(clause: &Clause) -> Vec<RawTerm> {
    let k = clause.literals.len();
    let mut terms = Vec::new();
    for assignment in 0u32..(1 << k) {
        let mut satisfied = false;
        for (i, &(_, negated)) in clause.literals.iter().enumerate() {
            let val = (assignment >> i) & 1 == 1;
            let lit_true = if negated { !val } else { val };
            if lit_true {
                satisfied = true;
                break;
            }
        }
        if satisfied {
            continue;
        }
        // Indicator for this exact assignment: Π_i (x_i if assignment bit set else (1-x_i)).
        // Expand via inclusion-exclusion over the "(1-x_i)" factors only.
        for subset in 0u32..(1 << k) {
            let mut cost = clause.weight;
            let mut ids = Vec::new();
            for i in 0..k {
                let bit_set = (assignment >> i) & 1 == 1;
                if bit_set {
                    ids.push(clause.literals[i].0);
                } else if (subset >> i) & 1 == 1 {
                    cost *= -1.0;
                    ids.push(clause.literals[i].0);
                }
            }
            terms.push(RawTerm { cost, ids });
        }
    }
    terms
}

/// Compile a full clause list into one merged list of raw PUBO terms (like-terms are left
/// unmerged; [`crate::graph::Graph::from_raw_terms`] merges duplicate variable ids within a
/// term but distinct terms over the same variable set are simply summed by the graph's edge
/// list having two entries — harmless, since cost evaluation just sums edges).
pub fn compile_dimacs_clauses(clauses: &[Clause]) -> Vec<RawTerm> {
    clauses.iter().flat_map(compile_clause).collect()
}
