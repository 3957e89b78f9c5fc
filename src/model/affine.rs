//! Affine constraint representation.
//!
//! A constraint row is stored as its algebraic data: an ordered list of
//! `(coefficient, variable)` terms, a relational sense and a constant
//! right-hand side. Bulk constraint families are built by constructing these
//! rows directly (see [`crate::model::OptimizationModel::inject_family`]),
//! which avoids evaluating a symbolic per-index rule for every row of an
//! `edges x timesteps` index set. The symbolic path ([`LinExpr`]) remains
//! available and must produce identical rows.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::domain::Uid;
use crate::error::ModelError;
use crate::model::variables::VarId;

/// Relational sense of a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Eq,
    Le,
    Ge,
}

impl FromStr for Sense {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Sense::Eq),
            "<=" => Ok(Sense::Le),
            ">=" => Ok(Sense::Ge),
            other => Err(ModelError::UnsupportedSense(other.to_string())),
        }
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sense::Eq => "==",
            Sense::Le => "<=",
            Sense::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// Index of a constraint row within a family: an entity uid plus, for
/// time-indexed families, the timestep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    pub uid: Uid,
    pub timestep: Option<usize>,
}

impl RowKey {
    pub fn at(uid: impl Into<Uid>, timestep: usize) -> Self {
        Self {
            uid: uid.into(),
            timestep: Some(timestep),
        }
    }

    pub fn scalar(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            timestep: None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestep {
            Some(t) => write!(f, "{}_{t}", self.uid),
            None => write!(f, "{}", self.uid),
        }
    }
}

/// One linear constraint in algebraic form: `sum(coeff * var) sense rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineRow {
    pub terms: Vec<(f64, VarId)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl AffineRow {
    pub fn new(terms: Vec<(f64, VarId)>, sense: Sense, rhs: f64) -> Self {
        Self { terms, sense, rhs }
    }

    /// Build a row from raw data with the sense given as a string from the
    /// fixed vocabulary `"=="`, `"<="`, `">="`. Anything else is a
    /// construction-time error.
    pub fn parse(terms: Vec<(f64, VarId)>, sense: &str, rhs: f64) -> Result<Self, ModelError> {
        Ok(Self::new(terms, sense.parse()?, rhs))
    }

    /// Evaluate the left-hand side against a full variable assignment.
    pub fn lhs_value(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(coeff, var)| coeff * values[var.index()])
            .sum()
    }

    /// Whether the assignment satisfies this row within `tol`.
    pub fn holds(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.lhs_value(values);
        match self.sense {
            Sense::Eq => (lhs - self.rhs).abs() <= tol,
            Sense::Le => lhs <= self.rhs + tol,
            Sense::Ge => lhs >= self.rhs - tol,
        }
    }
}

/// A named, indexed collection of affine constraint rows.
#[derive(Debug, Clone, Default)]
pub struct ConstraintFamily {
    pub rows: Vec<(RowKey, AffineRow)>,
}

impl ConstraintFamily {
    pub fn push(&mut self, key: RowKey, row: AffineRow) {
        self.rows.push((key, row));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, key: &RowKey) -> Option<&AffineRow> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }
}

/// Symbolic linear expression used by the generic rule-based constraint path.
///
/// Terms are accumulated in insertion order; repeated variables merge into a
/// single coefficient. Turning the expression into a relation normalises it
/// by moving the accumulated constant to the right-hand side, so both
/// construction paths store the same row representation.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    terms: IndexMap<VarId, f64>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, coeff: f64, var: VarId) -> Self {
        self.push(coeff, var);
        self
    }

    pub fn push(&mut self, coeff: f64, var: VarId) {
        *self.terms.entry(var).or_insert(0.0) += coeff;
    }

    pub fn add_constant(&mut self, c: f64) {
        self.constant += c;
    }

    pub fn eq(self, rhs: f64) -> AffineRow {
        self.relate(Sense::Eq, rhs)
    }

    pub fn le(self, rhs: f64) -> AffineRow {
        self.relate(Sense::Le, rhs)
    }

    pub fn ge(self, rhs: f64) -> AffineRow {
        self.relate(Sense::Ge, rhs)
    }

    fn relate(self, sense: Sense, rhs: f64) -> AffineRow {
        AffineRow {
            terms: self.terms.into_iter().map(|(v, c)| (c, v)).collect(),
            sense,
            rhs: rhs - self.constant,
        }
    }
}
