//! Objective assembly: a linear coefficient per decision variable.

use indexmap::IndexMap;

use crate::domain::{ComponentKind, EnergySystem, EntityKind, Uid};
use crate::error::ModelError;
use crate::model::components::KindGroup;
use crate::model::variables::VarId;
use crate::model::OptimizationModel;

/// Penalty per unit of unmet balance (shortage slack). Excess is free
/// disposal and carries no cost.
pub const SLACK_PENALTY: f64 = 10e10;

/// Component kinds whose input flow is charged with operating and fuel cost.
const COST_KINDS: [ComponentKind; 4] = [
    ComponentKind::Transformer,
    ComponentKind::Chp,
    ComponentKind::Storage,
    ComponentKind::Transport,
];

/// Populate the model's objective coefficients.
///
/// Cost terms: variable operating cost plus input-bus fuel price on the
/// input flow of cost-bearing units, the shortage penalty, forgone revenue
/// on curtailed dispatch, and (investment runs) specific investment cost on
/// every added-capacity variable.
pub fn build_objective(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    groups: &IndexMap<ComponentKind, KindGroup>,
) -> Result<(), ModelError> {
    for kind in COST_KINDS {
        let Some(group) = groups.get(&kind) else {
            continue;
        };
        for uid in &group.uids {
            let entity = system
                .entity(uid)
                .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
            let opex = entity.kind.opex_var().unwrap_or(0.0);
            let input = entity.first_input()?.clone();
            let coeff = opex + system.bus_price(&input);
            if coeff == 0.0 {
                continue;
            }
            for pos in 0..model.timesteps.len() {
                let w = model.vars.flow(&input, uid, pos)?;
                model.add_objective_term(w, coeff);
            }
        }
    }

    if model.options.slack {
        let shortage: Vec<VarId> = model
            .vars
            .iter_shortage()
            .flat_map(|(_, vars)| vars.iter().copied())
            .collect();
        for var in shortage {
            model.add_objective_term(var, SLACK_PENALTY);
        }
    }

    let dispatch: Vec<(Uid, Vec<VarId>)> = model
        .vars
        .iter_dispatch()
        .map(|(uid, vars)| (uid.clone(), vars.clone()))
        .collect();
    for (uid, vars) in dispatch {
        let dispatch_ex = match system.entity(&uid).map(|e| &e.kind) {
            Some(EntityKind::DispatchSource(p)) => p.dispatch_ex,
            _ => return Err(ModelError::invalid_entity(&uid, "not a dispatch source")),
        };
        if dispatch_ex == 0.0 {
            continue;
        }
        for var in vars {
            model.add_objective_term(var, dispatch_ex);
        }
    }

    if model.options.invest {
        let add_cap: Vec<(Uid, VarId)> = model
            .vars
            .iter_add_cap()
            .map(|(uid, var)| (uid.clone(), var))
            .collect();
        for (uid, var) in add_cap {
            let capex = system
                .entity(&uid)
                .and_then(|e| e.kind.capex())
                .ok_or_else(|| ModelError::invalid_entity(&uid, "no investment cost"))?;
            model.add_objective_term(var, capex);
        }
        let soc_add: Vec<(Uid, VarId)> = model
            .vars
            .iter_soc_add()
            .map(|(uid, var)| (uid.clone(), var))
            .collect();
        for (uid, var) in soc_add {
            let capex = system
                .entity(&uid)
                .and_then(|e| e.kind.capex())
                .ok_or_else(|| ModelError::invalid_entity(&uid, "no investment cost"))?;
            model.add_objective_term(var, capex);
        }
    }

    Ok(())
}
