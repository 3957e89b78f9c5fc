//! Lowering of the assembled model into a numeric backend.
//!
//! The backend is treated as a black box: variables are created in handle
//! order, every non-empty constraint row becomes one solver row and the
//! solution is read back into a plain value vector. `minilp` is the only
//! backend; the selector exists so configuration stays explicit about it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use minilp::{ComparisonOp, OptimizationDirection, Problem};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ModelError;
use crate::model::{OptimizationModel, Sense, VarId};

/// Named solver selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    #[default]
    Minilp,
}

/// Solve-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub solver: SolverBackend,
    /// Materialise the assembled problem as a CPLEX-LP text file before
    /// solving.
    pub write_lp: bool,
    pub lp_path: PathBuf,
    /// Backend-specific options, passed through opaquely.
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver: SolverBackend::Minilp,
            write_lp: false,
            lp_path: PathBuf::from("model.lp"),
            options: BTreeMap::new(),
        }
    }
}

/// A solved variable assignment, indexed by [`VarId`].
#[derive(Debug, Clone)]
pub struct LpSolution {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl LpSolution {
    pub fn value(&self, id: VarId) -> f64 {
        self.values[id.index()]
    }
}

/// Solve the assembled model with the configured backend.
pub fn solve(model: &OptimizationModel, config: &SolverConfig) -> Result<LpSolution, ModelError> {
    if config.write_lp {
        write_lp_file(model, &config.lp_path)?;
        info!(path = %config.lp_path.display(), "wrote LP file");
    }
    match config.solver {
        SolverBackend::Minilp => solve_minilp(model),
    }
}

fn solve_minilp(model: &OptimizationModel) -> Result<LpSolution, ModelError> {
    let mut problem = Problem::new(OptimizationDirection::Minimize);
    let mut columns = Vec::with_capacity(model.vars.len());
    for (id, spec) in model.vars.iter_specs() {
        columns.push(problem.add_var(model.objective_coeff(id), (spec.lb, spec.ub)));
    }

    let mut n_rows = 0usize;
    for (_, family) in model.families() {
        for (_, row) in &family.rows {
            if row.terms.is_empty() {
                continue;
            }
            let terms: Vec<(minilp::Variable, f64)> = row
                .terms
                .iter()
                .map(|&(coeff, var)| (columns[var.index()], coeff))
                .collect();
            let op = match row.sense {
                Sense::Eq => ComparisonOp::Eq,
                Sense::Le => ComparisonOp::Le,
                Sense::Ge => ComparisonOp::Ge,
            };
            problem.add_constraint(terms.as_slice(), op, row.rhs);
            n_rows += 1;
        }
    }
    debug!(columns = columns.len(), rows = n_rows, "lowered model");

    let solution = problem.solve()?;
    let values = columns.iter().map(|&c| solution[c]).collect();
    Ok(LpSolution {
        values,
        objective: solution.objective(),
    })
}

/// Replace everything outside the LP-format identifier alphabet.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Write the model in CPLEX-LP text format.
pub fn write_lp_file(model: &OptimizationModel, path: &Path) -> Result<(), ModelError> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "Minimize")?;
    write!(out, " obj:")?;
    for (var, coeff) in model.objective_terms() {
        let name = sanitize(&model.vars.spec(var).name);
        write!(out, " {} {} {}", if coeff < 0.0 { "-" } else { "+" }, coeff.abs(), name)?;
    }
    writeln!(out)?;

    writeln!(out, "Subject To")?;
    for (family, rows) in model.families() {
        for (i, (key, row)) in rows.rows.iter().enumerate() {
            if row.terms.is_empty() {
                continue;
            }
            write!(out, " {}_{}_{i}:", sanitize(family), sanitize(&key.to_string()))?;
            for &(coeff, var) in &row.terms {
                let name = sanitize(&model.vars.spec(var).name);
                write!(out, " {} {} {}", if coeff < 0.0 { "-" } else { "+" }, coeff.abs(), name)?;
            }
            let sense = match row.sense {
                Sense::Eq => "=",
                Sense::Le => "<=",
                Sense::Ge => ">=",
            };
            writeln!(out, " {sense} {}", row.rhs)?;
        }
    }

    writeln!(out, "Bounds")?;
    for (_, spec) in model.vars.iter_specs() {
        let name = sanitize(&spec.name);
        if spec.lb == spec.ub {
            writeln!(out, " {name} = {}", spec.lb)?;
        } else if spec.ub.is_infinite() {
            writeln!(out, " {} <= {name}", spec.lb)?;
        } else {
            writeln!(out, " {} <= {name} <= {}", spec.lb, spec.ub)?;
        }
    }
    writeln!(out, "End")?;
    out.flush()?;
    Ok(())
}
