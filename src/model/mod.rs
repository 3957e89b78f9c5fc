//! Model assembly and the optimisation driver.
//!
//! [`assemble`] turns an [`EnergySystem`] plus a time horizon into an
//! [`OptimizationModel`]: a variable table, named constraint families and a
//! linear objective. [`optimize`] runs the full sequence — assemble, solve,
//! write the solved flows back onto the entities — and returns the objective
//! value.

pub mod affine;
pub mod components;
pub mod generic;
pub mod objective;
pub mod variables;

pub use affine::{AffineRow, ConstraintFamily, LinExpr, RowKey, Sense};
pub use variables::{VarId, VarSpec, VariableSpace};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{EnergySystem, Uid};
use crate::error::ModelError;
use crate::graph;
use crate::solver::{self, LpSolution, SolverConfig};

/// Assembly switches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Capacity-expansion mode: capacity bounds become decision variables
    /// with investment cost instead of static limits.
    pub invest: bool,
    /// Attach shortage/excess slack to every balance constraint.
    pub slack: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            invest: false,
            slack: true,
        }
    }
}

/// The assembled linear program, prior to lowering into a solver backend.
#[derive(Debug)]
pub struct OptimizationModel {
    pub timesteps: Vec<usize>,
    pub options: ModelOptions,
    pub vars: VariableSpace,
    families: IndexMap<String, ConstraintFamily>,
    objective: IndexMap<VarId, f64>,
}

impl OptimizationModel {
    pub fn new(vars: VariableSpace, timesteps: Vec<usize>, options: ModelOptions) -> Self {
        Self {
            timesteps,
            options,
            vars,
            families: IndexMap::new(),
            objective: IndexMap::new(),
        }
    }

    /// Append pre-built rows to the named family. An empty batch creates no
    /// family entry.
    pub fn inject_family(&mut self, name: &str, rows: Vec<(RowKey, AffineRow)>) {
        if rows.is_empty() {
            return;
        }
        let family = self.families.entry(name.to_string()).or_default();
        for (key, row) in rows {
            family.push(key, row);
        }
    }

    /// Append raw rows with the sense given as text from the fixed
    /// vocabulary (`"=="`, `"<="`, `">="`).
    pub fn inject_family_raw<'a>(
        &mut self,
        name: &str,
        rows: impl IntoIterator<Item = (RowKey, Vec<(f64, VarId)>, &'a str, f64)>,
    ) -> Result<(), ModelError> {
        let rows = rows
            .into_iter()
            .map(|(key, terms, sense, rhs)| Ok((key, AffineRow::parse(terms, sense, rhs)?)))
            .collect::<Result<Vec<_>, ModelError>>()?;
        self.inject_family(name, rows);
        Ok(())
    }

    /// Build a family by evaluating a symbolic per-index rule. A rule
    /// returning `Ok(None)` skips the index. Rows end up stored exactly as
    /// the injection path stores them.
    pub fn add_family_with_rule(
        &mut self,
        name: &str,
        keys: Vec<RowKey>,
        rule: impl Fn(&VariableSpace, &RowKey) -> Result<Option<AffineRow>, ModelError>,
    ) -> Result<(), ModelError> {
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = rule(&self.vars, &key)? {
                rows.push((key, row));
            }
        }
        self.inject_family(name, rows);
        Ok(())
    }

    pub fn family(&self, name: &str) -> Option<&ConstraintFamily> {
        self.families.get(name)
    }

    pub fn families(&self) -> impl Iterator<Item = (&String, &ConstraintFamily)> {
        self.families.iter()
    }

    pub fn n_rows(&self) -> usize {
        self.families.values().map(ConstraintFamily::len).sum()
    }

    /// Add `coeff` to the objective coefficient of `var`.
    pub fn add_objective_term(&mut self, var: VarId, coeff: f64) {
        *self.objective.entry(var).or_insert(0.0) += coeff;
    }

    pub fn objective_coeff(&self, var: VarId) -> f64 {
        self.objective.get(&var).copied().unwrap_or(0.0)
    }

    pub fn objective_terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.objective.iter().map(|(v, c)| (*v, *c))
    }
}

/// Assemble the full model for the given system and horizon.
///
/// Builders run in registry order, then the bus model, then the objective.
pub fn assemble(
    system: &EnergySystem,
    timesteps: &[usize],
    options: ModelOptions,
) -> Result<OptimizationModel, ModelError> {
    let component_indices = system.component_indices();
    let edges = graph::edges(system, &component_indices);
    let vars = VariableSpace::with_flow_vars(&edges, timesteps);
    let mut model = OptimizationModel::new(vars, timesteps.to_vec(), options);

    let groups = components::kind_groups(system);
    for (kind, builder) in components::BUILDERS.iter() {
        if let Some(group) = groups.get(kind) {
            debug!(%kind, units = group.uids.len(), "building constraint families");
            builder(&mut model, system, group)?;
        }
    }
    components::build_bus_model(&mut model, system)?;
    objective::build_objective(&mut model, system, &groups)?;

    info!(
        variables = model.vars.len(),
        rows = model.n_rows(),
        invest = options.invest,
        "model assembled"
    );
    Ok(model)
}

/// Assemble, solve and write results back. Returns the objective value.
pub fn optimize(
    system: &mut EnergySystem,
    timesteps: &[usize],
    options: ModelOptions,
    solver_config: &SolverConfig,
) -> Result<f64, ModelError> {
    let model = assemble(system, timesteps, options)?;
    let solution = solver::solve(&model, solver_config)?;
    write_results(system, &model, &solution)?;
    info!(objective = solution.objective, "optimisation finished");
    Ok(solution.objective)
}

/// Write solved flow series and investment scalars onto the entities.
pub fn write_results(
    system: &mut EnergySystem,
    model: &OptimizationModel,
    solution: &LpSolution,
) -> Result<(), ModelError> {
    let all_uids: Vec<Uid> = system.entities.iter().map(|e| e.uid.clone()).collect();
    let (predecessors, successors) = graph::io_maps(system, &all_uids);

    let add_cap: IndexMap<Uid, f64> = model
        .vars
        .iter_add_cap()
        .map(|(uid, var)| (uid.clone(), solution.value(var)))
        .collect();
    let soc_add: IndexMap<Uid, f64> = model
        .vars
        .iter_soc_add()
        .map(|(uid, var)| (uid.clone(), solution.value(var)))
        .collect();

    let horizon = model.timesteps.len();
    for entity in &mut system.entities {
        let uid = entity.uid.clone();
        entity.results.flows_in.clear();
        entity.results.flows_out.clear();
        for pred in &predecessors[&uid] {
            let series = (0..horizon)
                .map(|pos| Ok(solution.value(model.vars.flow(pred, &uid, pos)?)))
                .collect::<Result<Vec<f64>, ModelError>>()?;
            entity.results.flows_in.insert(pred.clone(), series);
        }
        for succ in &successors[&uid] {
            let series = (0..horizon)
                .map(|pos| Ok(solution.value(model.vars.flow(&uid, succ, pos)?)))
                .collect::<Result<Vec<f64>, ModelError>>()?;
            entity.results.flows_out.insert(succ.clone(), series);
        }
        entity.results.add_cap_out = add_cap.get(&uid).copied();
        entity.results.add_cap_soc = soc_add.get(&uid).copied();
    }
    Ok(())
}
