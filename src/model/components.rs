//! Per-kind constraint builders and the builder registry.
//!
//! Every component kind maps to exactly one builder function through the
//! [`BUILDERS`] registry; model assembly walks the registry in variant order
//! and invokes each builder once with the uids of its kind. Buses are not
//! components and are handled separately by [`build_bus_model`].

use indexmap::IndexMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::domain::{BusKind, ComponentKind, EnergySystem, EntityKind, Uid};
use crate::error::ModelError;
use crate::graph;
use crate::model::affine::{AffineRow, RowKey, Sense};
use crate::model::generic;
use crate::model::{LinExpr, OptimizationModel};

/// All entities of one component kind, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct KindGroup {
    pub indices: Vec<usize>,
    pub uids: Vec<Uid>,
}

/// Group the system's components by kind. Kinds without entities are absent.
pub fn kind_groups(system: &EnergySystem) -> IndexMap<ComponentKind, KindGroup> {
    let mut groups: IndexMap<ComponentKind, KindGroup> = IndexMap::new();
    for kind in ComponentKind::iter() {
        let group: KindGroup = system
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind.component_kind() == Some(kind))
            .fold(KindGroup::default(), |mut g, (i, e)| {
                g.indices.push(i);
                g.uids.push(e.uid.clone());
                g
            });
        if !group.uids.is_empty() {
            groups.insert(kind, group);
        }
    }
    groups
}

pub type BuilderFn =
    fn(&mut OptimizationModel, &EnergySystem, &KindGroup) -> Result<(), ModelError>;

/// Kind-to-builder dispatch table, in the order builders run during assembly.
pub static BUILDERS: Lazy<IndexMap<ComponentKind, BuilderFn>> = Lazy::new(|| {
    let mut map: IndexMap<ComponentKind, BuilderFn> = IndexMap::new();
    map.insert(ComponentKind::Transformer, simple_transformer);
    map.insert(ComponentKind::Chp, simple_chp);
    map.insert(ComponentKind::ExtractionChp, extraction_chp);
    map.insert(ComponentKind::FixedSource, fixed_source);
    map.insert(ComponentKind::DispatchSource, dispatch_source);
    map.insert(ComponentKind::Sink, simple_sink);
    map.insert(ComponentKind::Storage, simple_storage);
    map.insert(ComponentKind::Transport, simple_transport);
    map
});

/// Linear single-input converter: conversion balance plus output capacity.
pub fn simple_transformer(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    generic::generic_io_constraints(model, system, &group.uids)?;
    generic::generic_w_ub(model, system, &group.uids)
}

/// Back-pressure CHP: transformer model on the heat output plus the fixed
/// heat-to-power ratio `w_heat/eta_th == w_power/eta_el`.
pub fn simple_chp(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    simple_transformer(model, system, group)?;

    let mut rows = Vec::new();
    for uid in &group.uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::Chp(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not a chp")),
        };
        for (pos, &t) in model.timesteps.iter().enumerate() {
            let w_heat = model.vars.flow(uid, &params.heat_bus, pos)?;
            let w_power = model.vars.flow(uid, &params.power_bus, pos)?;
            rows.push((
                RowKey::at(uid.clone(), t),
                AffineRow::new(
                    vec![
                        (1.0 / params.eta_thermal, w_heat),
                        (-1.0 / params.eta_electrical, w_power),
                    ],
                    Sense::Eq,
                    0.0,
                ),
            ));
        }
    }
    model.inject_family("chp_ratio", rows);
    Ok(())
}

/// Extraction-condensing CHP: the convex (power, heat) operating envelope
/// and the affine fuel-consumption relation. No transformer base model.
pub fn extraction_chp(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    let mut power_max = Vec::new();
    let mut heat_max = Vec::new();
    let mut power_min = Vec::new();
    let mut fuel = Vec::new();

    for uid in &group.uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::ExtractionChp(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not an extraction chp")),
        };
        let fuel_bus = entity.first_input()?.clone();
        for (pos, &t) in model.timesteps.iter().enumerate() {
            let key = RowKey::at(uid.clone(), t);
            let power = model.vars.flow(uid, &params.power_bus, pos)?;
            let heat = model.vars.flow(uid, &params.heat_bus, pos)?;
            let w_fuel = model.vars.flow(&fuel_bus, uid, pos)?;

            power_max.push((
                key.clone(),
                AffineRow::new(
                    vec![(1.0, power), (params.beta[0], heat)],
                    Sense::Le,
                    params.p[0],
                ),
            ));
            // heat <= (power - c0) / c1, written with the flows on the left
            heat_max.push((
                key.clone(),
                AffineRow::new(
                    vec![(1.0, heat), (-1.0 / params.c[1], power)],
                    Sense::Le,
                    -params.c[0] / params.c[1],
                ),
            ));
            // The minimum-load half-plane only exists for units with a
            // positive minimum stable output; the index is skipped otherwise.
            if params.out_min > 0.0 {
                power_min.push((
                    key.clone(),
                    AffineRow::new(
                        vec![(1.0, power), (params.beta[1], heat)],
                        Sense::Ge,
                        params.p[1],
                    ),
                ));
            }
            fuel.push((
                key,
                AffineRow::new(
                    vec![(1.0, w_fuel), (-params.k[1], power), (-params.k[2], heat)],
                    Sense::Eq,
                    params.k[0],
                ),
            ));
        }
    }

    model.inject_family("extraction_chp_power_max", power_max);
    model.inject_family("extraction_chp_heat_max", heat_max);
    model.inject_family("extraction_chp_power_min", power_min);
    model.inject_family("extraction_chp_fuel", fuel);
    Ok(())
}

/// Profile-bound source; the investment branch relaxes the fixed feed-in
/// into a capacity-expansion inequality.
pub fn fixed_source(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    if model.options.invest {
        generic::generic_fixed_source_invest(model, system, &group.uids)
    } else {
        generic::generic_fixed_source(model, system, &group.uids)
    }
}

/// Curtailable source. Investment runs create no dispatch variables or
/// constraints for these units.
pub fn dispatch_source(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    if model.options.invest {
        debug!(units = group.uids.len(), "skipping dispatch sources under investment");
        return Ok(());
    }
    generic::generic_dispatch_source(model, system, &group.uids)
}

pub fn simple_sink(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    generic::generic_fixed_sink(model, system, &group.uids)
}

/// Storage unit: state-of-charge recursion plus either static power/energy
/// caps or the investment capacity row. The two branches are mutually
/// exclusive and create none of each other's variables or rows.
pub fn simple_storage(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    let invest = model.options.invest;
    let timesteps = model.timesteps.clone();
    let mut balance = Vec::new();
    let mut soc_cap = Vec::new();

    for uid in &group.uids {
        let entity = system
            .entity(uid)
            .ok_or_else(|| ModelError::invalid_entity(uid, "unknown entity"))?;
        let params = match &entity.kind {
            EntityKind::Storage(p) => p,
            _ => return Err(ModelError::invalid_entity(uid, "not a storage")),
        };
        let charge_bus = entity.first_input()?.clone();
        let discharge_bus = entity.first_output()?.clone();

        let soc_ub = if invest { f64::INFINITY } else { params.soc_max };
        model.vars.add_soc_vars(uid, &timesteps, soc_ub);

        if invest {
            let soc_add = model.vars.add_soc_capacity_var(uid);
            for (pos, &t) in timesteps.iter().enumerate() {
                let soc = model.vars.soc(uid, pos)?;
                soc_cap.push((
                    RowKey::at(uid.clone(), t),
                    AffineRow::new(
                        vec![(1.0, soc), (-1.0, soc_add)],
                        Sense::Le,
                        params.soc_max,
                    ),
                ));
            }
        } else {
            for pos in 0..timesteps.len() {
                let w_in = model.vars.flow(&charge_bus, uid, pos)?;
                model.vars.set_upper(w_in, params.cap_in);
                let w_out = model.vars.flow(uid, &discharge_bus, pos)?;
                model.vars.set_upper(w_out, params.cap_out);
            }
        }

        // soc recursion; the horizon starts from an empty storage.
        for (pos, &t) in timesteps.iter().enumerate() {
            let soc = model.vars.soc(uid, pos)?;
            let row = if pos == 0 {
                AffineRow::new(vec![(1.0, soc)], Sense::Eq, 0.0)
            } else {
                let soc_prev = model.vars.soc(uid, pos - 1)?;
                let w_in = model.vars.flow(&charge_bus, uid, pos)?;
                let w_out = model.vars.flow(uid, &discharge_bus, pos)?;
                AffineRow::new(
                    vec![(1.0, soc), (-1.0, soc_prev), (-1.0, w_in), (1.0, w_out)],
                    Sense::Eq,
                    0.0,
                )
            };
            balance.push((RowKey::at(uid.clone(), t), row));
        }
    }

    model.inject_family("storage_balance", balance);
    if !soc_cap.is_empty() {
        model.inject_family("storage_soc_cap", soc_cap);
    }
    Ok(())
}

/// Transport links are lossy pass-through converters and reuse the
/// transformer builder unchanged.
pub fn simple_transport(
    model: &mut OptimizationModel,
    system: &EnergySystem,
    group: &KindGroup,
) -> Result<(), ModelError> {
    simple_transformer(model, system, group)
}

/// Balance constraints for electrical/thermal buses and the horizon-wide
/// supply limit for resource buses.
///
/// The balance family is built through the generic rule path; its rows must
/// match what direct injection of the same data would produce.
pub fn build_bus_model(
    model: &mut OptimizationModel,
    system: &EnergySystem,
) -> Result<(), ModelError> {
    let mut balance_uids = Vec::new();
    let mut resource_uids = Vec::new();
    for entity in &system.entities {
        if let Some(params) = entity.bus_params() {
            match params.kind {
                BusKind::Electrical | BusKind::Thermal => balance_uids.push(entity.uid.clone()),
                BusKind::Resource => resource_uids.push(entity.uid.clone()),
            }
        }
    }

    let slack = model.options.slack;
    let timesteps = model.timesteps.clone();
    if slack {
        model.vars.add_slack_vars(&balance_uids, &timesteps);
    }

    let (predecessors, successors) = graph::io_maps(system, &balance_uids);
    let keys: Vec<RowKey> = balance_uids
        .iter()
        .cartesian_product(timesteps.iter())
        .map(|(uid, &t)| RowKey::at(uid.clone(), t))
        .collect();

    model.add_family_with_rule("bus_balance", keys, |vars, key| {
        let pos = timesteps
            .iter()
            .position(|&t| Some(t) == key.timestep)
            .unwrap_or_default();
        let mut expr = LinExpr::new();
        for pred in &predecessors[&key.uid] {
            expr.push(1.0, vars.flow(pred, &key.uid, pos)?);
        }
        for succ in &successors[&key.uid] {
            expr.push(-1.0, vars.flow(&key.uid, succ, pos)?);
        }
        if slack {
            expr.push(1.0, vars.shortage(&key.uid, pos)?);
            expr.push(-1.0, vars.excess(&key.uid, pos)?);
        }
        Ok(Some(expr.eq(0.0)))
    })?;

    generic::generic_limit(model, system, &resource_uids)
}
