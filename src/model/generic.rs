//! Generic constraint and bound helpers shared across component kinds.
//!
//! Each helper takes the model, the uids it applies to and attaches its
//! constraints (or variable bounds) under a fixed family name. The
//! kind-specific builders in [`crate::model::components`] compose these.

use crate::domain::{EnergySystem, EntityKind, Uid};
use crate::error::ModelError;
use crate::graph;
use crate::model::affine::{AffineRow, RowKey, Sense};
use crate::model::OptimizationModel;

fn checked_profile<'a>(
    uid: &str,
    profile: &'a [f64],
    want: usize,
) -> Result<&'a [f64], ModelError> {
    if profile.len() != want {
        return Err(ModelError::ProfileLength {
            uid: uid.to_string(),
            got: profile.len(),
            want,
        });
    }
    Ok(profile)
}

/// Conversion balance tying each unit's first output to its first input:
/// `w[u, out, t] == eta * w[in, u, t]`. Family `io_relation`.
pub fn generic_io_constraints(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let mut rows = Vec::new();
    for uid in uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let (out, eta) = entity.conversion_output()?;
        let input = entity.first_input()?;
        for (pos, &t) in model.timesteps.iter().enumerate() {
            let w_out = model.vars.flow(uid, out, pos)?;
            let w_in = model.vars.flow(input, uid, pos)?;
            rows.push((
                RowKey::at(uid.clone(), t),
                AffineRow::new(vec![(1.0, w_out), (-eta, w_in)], Sense::Eq, 0.0),
            ));
        }
    }
    model.inject_family("io_relation", rows);
    Ok(())
}

/// Output-flow capacity for converter-like units.
///
/// Without investment this tightens the static upper bound of every capped
/// output flow variable to `out_max`. With investment the bound becomes the
/// explicit row `w - add_cap <= out_max` (family `flow_ub_invest`), with one
/// added-capacity variable per unit shared across its outputs.
pub fn generic_w_ub(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let invest = model.options.invest;
    let mut rows = Vec::new();
    for uid in uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let caps: Vec<(Uid, f64)> = entity
            .output_caps()
            .into_iter()
            .map(|(o, cap)| (o.clone(), cap))
            .collect();
        if invest {
            let add_cap = model.vars.add_capacity_var(uid);
            for (out, cap) in &caps {
                for (pos, &t) in model.timesteps.iter().enumerate() {
                    let w = model.vars.flow(uid, out, pos)?;
                    rows.push((
                        RowKey::at(uid.clone(), t),
                        AffineRow::new(vec![(1.0, w), (-1.0, add_cap)], Sense::Le, *cap),
                    ));
                }
            }
        } else {
            for (out, cap) in &caps {
                for pos in 0..model.timesteps.len() {
                    let w = model.vars.flow(uid, out, pos)?;
                    model.vars.set_upper(w, *cap);
                }
            }
        }
    }
    if !rows.is_empty() {
        model.inject_family("flow_ub_invest", rows);
    }
    Ok(())
}

/// Fix each unit's output flow to its scaled profile: `w == profile[t] *
/// out_max` via coincident bounds. No constraint rows are generated.
pub fn generic_fixed_source(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let horizon = model.timesteps.len();
    for uid in uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::FixedSource(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not a fixed source")),
        };
        let profile = checked_profile(uid, &params.profile, horizon)?;
        let out = entity.first_output()?.clone();
        for (pos, value) in profile.iter().enumerate() {
            let w = model.vars.flow(uid, &out, pos)?;
            model.vars.fix(w, value * params.out_max);
        }
    }
    Ok(())
}

/// Investment variant of the fixed source: the feed-in may exceed the
/// installed profile by the profile-scaled added capacity. Family
/// `fixed_source_invest`: `w - profile[t]*add_cap <= profile[t]*out_max`.
pub fn generic_fixed_source_invest(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let horizon = model.timesteps.len();
    let mut rows = Vec::new();
    for uid in uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::FixedSource(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not a fixed source")),
        };
        let profile = checked_profile(uid, &params.profile, horizon)?.to_vec();
        let out = entity.first_output()?.clone();
        let add_cap = model.vars.add_capacity_var(uid);
        for (pos, &t) in model.timesteps.iter().enumerate() {
            let w = model.vars.flow(uid, &out, pos)?;
            rows.push((
                RowKey::at(uid.clone(), t),
                AffineRow::new(
                    vec![(1.0, w), (-profile[pos], add_cap)],
                    Sense::Le,
                    profile[pos] * params.out_max,
                ),
            ));
        }
    }
    model.inject_family("fixed_source_invest", rows);
    Ok(())
}

/// Curtailable source: feed-in is bounded by the scaled profile and the
/// curtailed remainder is tracked explicitly. Family `dispatch_source`:
/// `dispatch + w == profile[t] * out_max`.
pub fn generic_dispatch_source(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let horizon = model.timesteps.len();
    let timesteps = model.timesteps.clone();
    let mut rows = Vec::new();
    for uid in uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::DispatchSource(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not a dispatch source")),
        };
        let profile = checked_profile(uid, &params.profile, horizon)?.to_vec();
        let out = entity.first_output()?.clone();
        model.vars.add_dispatch_vars(uid, &timesteps);
        for (pos, &t) in timesteps.iter().enumerate() {
            let w = model.vars.flow(uid, &out, pos)?;
            model.vars.set_upper(w, profile[pos] * params.out_max);
            let dispatch = model.vars.dispatch(uid, pos)?;
            rows.push((
                RowKey::at(uid.clone(), t),
                AffineRow::new(
                    vec![(1.0, dispatch), (1.0, w)],
                    Sense::Eq,
                    profile[pos] * params.out_max,
                ),
            ));
        }
    }
    model.inject_family("dispatch_source", rows);
    Ok(())
}

/// Fix each sink's input flow to its demand profile via coincident bounds.
pub fn generic_fixed_sink(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let horizon = model.timesteps.len();
    for uid in uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::Sink(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not a sink")),
        };
        let demand = checked_profile(uid, &params.demand, horizon)?;
        let input = entity.first_input()?.clone();
        for (pos, &value) in demand.iter().enumerate() {
            let w = model.vars.flow(&input, uid, pos)?;
            model.vars.fix(w, value);
        }
    }
    Ok(())
}

/// Horizon-wide supply limit of resource buses. Family `resource_limit`: one
/// scalar `<=` row per limited bus summing every outflow over every timestep.
/// Buses without a limit or without successors are skipped.
pub fn generic_limit(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    uids: &[Uid],
) -> Result<(), ModelError> {
    let (_, successors) = graph::io_maps(system, uids);
    let mut rows = Vec::new();
    for uid in uids {
        let limit = match system
            .entity(uid)
            .and_then(|e| e.bus_params())
            .and_then(|p| p.sum_out_limit)
        {
            Some(limit) => limit,
            None => continue,
        };
        let succs = &successors[uid];
        if succs.is_empty() {
            continue;
        }
        let mut terms = Vec::with_capacity(succs.len() * model.timesteps.len());
        for succ in succs {
            for pos in 0..model.timesteps.len() {
                terms.push((1.0, model.vars.flow(uid, succ, pos)?));
            }
        }
        rows.push((
            RowKey::scalar(uid.clone()),
            AffineRow::new(terms, Sense::Le, limit),
        ));
    }
    model.inject_family("resource_limit", rows);
    Ok(())
}
