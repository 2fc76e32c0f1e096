//! DIMACS CNF/WCNF line-oriented reader, feeding the MaxSat-to-PUBO compilation in
//! `model_maxsat.rs` (spec §6.2, supplementing §4.1).
//!
//! Grounded on the DIMACS header/clause conventions described in SPEC_FULL §6.2; no C++
//! source file does this parsing (the teacher's original reader works from the protobuf/JSON
//! paths only), so the line format follows the de facto DIMACS standard the spec names.

use crate::config::{CostFunctionType, ModelConfig};
use crate::error::{QioError, QioResult};
use crate::model_maxsat::{compile_dimacs_clauses, Clause};
use std::path::Path;

struct Header {
    weighted: bool,
    top: Option<f64>,
}

fn parse_header(line: &str) -> QioResult<Header> {
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some("p") => {}
        _ => return Err(QioError::ParsingError("DIMACS header must start with 'p'".into())),
    }
    let kind = fields
        .next()
        .ok_or_else(|| QioError::ParsingError("DIMACS header missing format token".into()))?;
    let weighted = match kind {
        "cnf" => false,
        "wcnf" => true,
        other => return Err(QioError::ParsingError(format!("unrecognized DIMACS format '{other}'"))),
    };
    // <nvars> <nclauses> [<top>] — the counts themselves are advisory; we don't pre-size
    // since a malformed count must not silently truncate real clauses.
    let _nvars = fields.next();
    let _nclauses = fields.next();
    let top = if weighted { fields.next().and_then(|t| t.parse::<f64>().ok()) } else { None };
    Ok(Header { weighted, top })
}

fn parse_clause_line(line: &str, weighted: bool, top: Option<f64>) -> QioResult<Clause> {
    let mut tokens: Vec<f64> = Vec::new();
    for tok in line.split_whitespace() {
        let v: f64 = tok
            .parse()
            .map_err(|_| QioError::ParsingError(format!("malformed DIMACS token '{tok}'")))?;
        tokens.push(v);
    }
    if tokens.last() != Some(&0.0) {
        return Err(QioError::ParsingError("DIMACS clause line must be terminated by 0".into()));
    }
    tokens.pop();

    let weight = if weighted {
        if tokens.is_empty() {
            return Err(QioError::ParsingError("weighted clause line missing weight".into()));
        }
        let w = tokens.remove(0);
        // DIMACS WCNF uses `top` as a sentinel for "hard clause" (effectively infinite weight).
        match top {
            Some(t) if w >= t => f64::MAX.min(1e12),
            _ => w,
        }
    } else {
        1.0
    };

    let literals = tokens
        .into_iter()
        .map(|lit| {
            let id = lit.abs() as i64;
            (id, lit < 0.0)
        })
        .collect();
    Ok(Clause { weight, literals })
}

/// Parses a `.cnf`/`.wcnf` file into a [`ModelConfig`] with `cost_function_type = Pubo`
/// (spec §4.1's MaxSat-to-PUBO compilation, §6.2's suffix detection).
pub fn load(path: &Path) -> QioResult<ModelConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| QioError::FileIo(e.to_string()))?;
    let weighted = matches!(path.extension().and_then(|e| e.to_str()), Some("wcnf"));

    let mut header: Option<Header> = None;
    let mut clauses = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if line.starts_with('p') {
            header = Some(parse_header(line)?);
            continue;
        }
        let h = header
            .as_ref()
            .ok_or_else(|| QioError::ParsingError("clause line before 'p' header".into()))?;
        clauses.push(parse_clause_line(line, weighted, h.top)?);
    }
    if header.is_none() {
        return Err(QioError::ParsingError("DIMACS file missing 'p' header".into()));
    }
    if clauses.is_empty() {
        return Err(QioError::ParsingError("DIMACS file has no clauses".into()));
    }

    let terms = compile_dimacs_clauses(&clauses);
    Ok(ModelConfig {
        cost_function_type: CostFunctionType::Pubo,
        version: "1.0".to_string(),
        terms,
        terms_slc: Vec::new(),
        initial_configuration: None,
    })
}
