//! End-to-end scenarios: assemble, solve with the default backend and check
//! flows, constraint families and objective values against hand-computed
//! optima.

use open_energy_model::domain::{
    BusKind, BusParams, ChpParams, DispatchSourceParams, Entity, EntityKind,
    ExtractionChpParams, FixedSourceParams, SinkParams, StorageParams, TransformerParams,
};
use open_energy_model::model::{self, ModelOptions, OptimizationModel};
use open_energy_model::solver::{self, LpSolution, SolverConfig};
use open_energy_model::EnergySystem;

const TOL: f64 = 1e-6;

fn bus(uid: &str, kind: BusKind) -> Entity {
    Entity::new(
        uid,
        EntityKind::Bus(BusParams {
            kind,
            price: 0.0,
            sum_out_limit: None,
        }),
    )
}

fn priced_bus(uid: &str, kind: BusKind, price: f64) -> Entity {
    Entity::new(
        uid,
        EntityKind::Bus(BusParams {
            kind,
            price,
            sum_out_limit: None,
        }),
    )
}

fn sink(uid: &str, input: &str, demand: Vec<f64>) -> Entity {
    Entity::new(uid, EntityKind::Sink(SinkParams { demand })).with_inputs(&[input])
}

fn dispatch_options() -> ModelOptions {
    ModelOptions {
        invest: false,
        slack: false,
    }
}

fn solve(model: &OptimizationModel) -> LpSolution {
    solver::solve(model, &SolverConfig::default()).unwrap()
}

fn assert_families_hold(model: &OptimizationModel, solution: &LpSolution) {
    for (name, family) in model.families() {
        for (key, row) in &family.rows {
            assert!(
                row.holds(&solution.values, TOL),
                "{name}[{key}] violated: lhs = {}, rhs = {} {}",
                row.lhs_value(&solution.values),
                row.sense,
                row.rhs
            );
        }
    }
}

fn flow_series(model: &OptimizationModel, solution: &LpSolution, from: &str, to: &str) -> Vec<f64> {
    (0..model.timesteps.len())
        .map(|pos| solution.value(model.vars.flow(from, to, pos).unwrap()))
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < TOL, "expected {expected:?}, got {actual:?}");
    }
}

#[test]
fn transformer_covers_demand_at_fuel_plus_opex_cost() {
    let system = EnergySystem::new(vec![
        priced_bus("b_gas", BusKind::Resource, 20.0),
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pp",
            EntityKind::Transformer(TransformerParams {
                eta: 0.5,
                out_max: 100.0,
                opex_var: 2.0,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_gas"])
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0, 7.0]),
    ]);

    let model = model::assemble(&system, &[0, 1], dispatch_options()).unwrap();
    let solution = solve(&model);
    assert_families_hold(&model, &solution);

    assert_close(&flow_series(&model, &solution, "pp", "b_el"), &[5.0, 7.0]);
    assert_close(&flow_series(&model, &solution, "b_gas", "pp"), &[10.0, 14.0]);
    // 24 units of gas at (2 opex + 20 fuel price)
    assert!((solution.objective - 528.0).abs() < TOL);
}

#[test]
fn results_written_back_onto_entities() {
    let mut system = EnergySystem::new(vec![
        bus("b_gas", BusKind::Resource),
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pp",
            EntityKind::Transformer(TransformerParams {
                eta: 0.5,
                out_max: 100.0,
                opex_var: 0.0,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_gas"])
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0, 7.0]),
    ]);

    model::optimize(&mut system, &[0, 1], dispatch_options(), &SolverConfig::default()).unwrap();

    let pp = system.entity("pp").unwrap();
    assert_close(&pp.results.flows_out["b_el"], &[5.0, 7.0]);
    assert_close(&pp.results.flows_in["b_gas"], &[10.0, 14.0]);
    assert_eq!(pp.results.add_cap_out, None);
    let b_el = system.entity("b_el").unwrap();
    assert_close(&b_el.results.flows_in["pp"], &[5.0, 7.0]);
    assert_close(&b_el.results.flows_out["demand"], &[5.0, 7.0]);
}

#[test]
fn chp_couples_heat_and_power_through_the_ratio() {
    let system = EnergySystem::new(vec![
        priced_bus("b_gas", BusKind::Resource, 10.0),
        bus("b_el", BusKind::Electrical),
        bus("b_th", BusKind::Thermal),
        Entity::new(
            "chp",
            EntityKind::Chp(ChpParams {
                heat_bus: "b_th".into(),
                power_bus: "b_el".into(),
                eta_thermal: 0.5,
                eta_electrical: 0.3,
                out_max_thermal: 50.0,
                out_max_electrical: 30.0,
                opex_var: 0.0,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_gas"])
        .with_outputs(&["b_th", "b_el"]),
        sink("heat_demand", "b_th", vec![25.0]),
        sink("power_demand", "b_el", vec![15.0]),
    ]);

    let model = model::assemble(&system, &[0], dispatch_options()).unwrap();
    let solution = solve(&model);
    assert_families_hold(&model, &solution);

    let heat = flow_series(&model, &solution, "chp", "b_th");
    let power = flow_series(&model, &solution, "chp", "b_el");
    assert_close(&heat, &[25.0]);
    assert_close(&power, &[15.0]);
    assert!((heat[0] / 0.5 - power[0] / 0.3).abs() < TOL);
    assert_close(&flow_series(&model, &solution, "b_gas", "chp"), &[50.0]);
    assert!((solution.objective - 500.0).abs() < TOL);
}

#[test]
fn extraction_chp_respects_envelope_and_fuel_relation() {
    let system = EnergySystem::new(vec![
        bus("b_gas", BusKind::Resource),
        bus("b_el", BusKind::Electrical),
        bus("b_th", BusKind::Thermal),
        Entity::new(
            "ext",
            EntityKind::ExtractionChp(ExtractionChpParams {
                power_bus: "b_el".into(),
                heat_bus: "b_th".into(),
                k: [5.0, 2.0, 0.5],
                c: [0.0, 2.0],
                beta: [0.0, 0.5],
                p: [100.0, 40.0],
                out_min: 0.0,
                opex_var: 0.0,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_gas"])
        .with_outputs(&["b_el", "b_th"]),
        sink("power_demand", "b_el", vec![20.0]),
        sink("heat_demand", "b_th", vec![10.0]),
    ]);

    let model = model::assemble(&system, &[0], dispatch_options()).unwrap();

    // out_min == 0: the minimum-load half-plane is skipped entirely
    assert!(model.family("extraction_chp_power_min").is_none());
    assert_eq!(model.family("extraction_chp_power_max").unwrap().len(), 1);
    assert_eq!(model.family("extraction_chp_heat_max").unwrap().len(), 1);

    let solution = solve(&model);
    assert_families_hold(&model, &solution);
    // fuel = k0 + k1*power + k2*heat = 5 + 2*20 + 0.5*10
    assert_close(&flow_series(&model, &solution, "b_gas", "ext"), &[50.0]);
}

#[test]
fn extraction_chp_minimum_load_row_exists_when_out_min_positive() {
    let system = EnergySystem::new(vec![
        bus("b_gas", BusKind::Resource),
        bus("b_el", BusKind::Electrical),
        bus("b_th", BusKind::Thermal),
        Entity::new(
            "ext",
            EntityKind::ExtractionChp(ExtractionChpParams {
                power_bus: "b_el".into(),
                heat_bus: "b_th".into(),
                k: [5.0, 2.0, 0.5],
                c: [0.0, 2.0],
                beta: [0.0, 0.5],
                p: [100.0, 40.0],
                out_min: 40.0,
                opex_var: 0.0,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_gas"])
        .with_outputs(&["b_el", "b_th"]),
        sink("power_demand", "b_el", vec![50.0]),
        sink("heat_demand", "b_th", vec![10.0]),
    ]);

    let model = model::assemble(&system, &[0], dispatch_options()).unwrap();
    assert_eq!(model.family("extraction_chp_power_min").unwrap().len(), 1);

    let solution = solve(&model);
    assert_families_hold(&model, &solution);
}

#[test]
fn transport_link_moves_energy_with_losses() {
    let system = EnergySystem::new(vec![
        bus("b_el_north", BusKind::Electrical),
        bus("b_el_south", BusKind::Electrical),
        Entity::new(
            "pv",
            EntityKind::FixedSource(FixedSourceParams {
                profile: vec![1.0],
                out_max: 10.0,
                capex: 0.0,
            }),
        )
        .with_outputs(&["b_el_north"]),
        Entity::new(
            "line",
            EntityKind::Transport(TransformerParams {
                eta: 0.9,
                out_max: 50.0,
                opex_var: 0.5,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_el_north"])
        .with_outputs(&["b_el_south"]),
        sink("demand", "b_el_south", vec![9.0]),
    ]);

    let model = model::assemble(&system, &[0], dispatch_options()).unwrap();
    let solution = solve(&model);
    assert_families_hold(&model, &solution);

    assert_close(&flow_series(&model, &solution, "b_el_north", "line"), &[10.0]);
    assert_close(&flow_series(&model, &solution, "line", "b_el_south"), &[9.0]);
    assert!((solution.objective - 5.0).abs() < TOL);
}

#[test]
fn dispatch_source_tracks_curtailment() {
    let system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "wind",
            EntityKind::DispatchSource(DispatchSourceParams {
                profile: vec![1.0, 1.0],
                out_max: 10.0,
                dispatch_ex: 2.0,
            }),
        )
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![4.0, 6.0]),
    ]);

    let model = model::assemble(&system, &[0, 1], dispatch_options()).unwrap();
    assert_eq!(model.family("dispatch_source").unwrap().len(), 2);

    let solution = solve(&model);
    assert_families_hold(&model, &solution);
    assert_close(&flow_series(&model, &solution, "wind", "b_el"), &[4.0, 6.0]);
    let curtailed: Vec<f64> = (0..2)
        .map(|pos| solution.value(model.vars.dispatch("wind", pos).unwrap()))
        .collect();
    assert_close(&curtailed, &[6.0, 4.0]);
    assert!((solution.objective - 20.0).abs() < TOL);
}

#[test]
fn dispatch_source_creates_nothing_under_investment() {
    let system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "wind",
            EntityKind::DispatchSource(DispatchSourceParams {
                profile: vec![1.0],
                out_max: 10.0,
                dispatch_ex: 2.0,
            }),
        )
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![4.0]),
    ]);

    let options = ModelOptions {
        invest: true,
        slack: false,
    };
    let model = model::assemble(&system, &[0], options).unwrap();
    assert!(model.family("dispatch_source").is_none());
    assert!(!model.vars.has_dispatch_vars());
}

#[test]
fn storage_shifts_generation_across_the_horizon() {
    let system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pv",
            EntityKind::FixedSource(FixedSourceParams {
                profile: vec![1.0, 1.0, 0.0],
                out_max: 10.0,
                capex: 0.0,
            }),
        )
        .with_outputs(&["b_el"]),
        Entity::new(
            "battery",
            EntityKind::Storage(StorageParams {
                soc_max: 20.0,
                cap_in: 10.0,
                cap_out: 10.0,
                // small charging cost so the optimum has no idle circulation
                opex_var: 0.1,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_el"])
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0, 5.0, 5.0]),
    ]);

    let model = model::assemble(&system, &[0, 1, 2], dispatch_options()).unwrap();
    assert_eq!(model.family("storage_balance").unwrap().len(), 3);
    assert!(model.family("storage_soc_cap").is_none());

    let solution = solve(&model);
    assert_families_hold(&model, &solution);

    // the horizon starts from an empty storage
    let soc0 = solution.value(model.vars.soc("battery", 0).unwrap());
    assert!(soc0.abs() < TOL);
    // the last timestep has no generation, so the demand comes from storage
    assert_close(&flow_series(&model, &solution, "battery", "b_el"), &[0.0, 0.0, 5.0]);
    // recursion: soc[2] = soc[1] + charge[2] - discharge[2]
    let soc1 = solution.value(model.vars.soc("battery", 1).unwrap());
    let soc2 = solution.value(model.vars.soc("battery", 2).unwrap());
    let charge2 = solution.value(model.vars.flow("b_el", "battery", 2).unwrap());
    assert!((soc2 - (soc1 + charge2 - 5.0)).abs() < TOL);
}

#[test]
fn fixed_source_investment_sizes_to_peak_demand() {
    let system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pv",
            EntityKind::FixedSource(FixedSourceParams {
                profile: vec![1.0, 0.5],
                out_max: 0.0,
                capex: 3.0,
            }),
        )
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0, 2.5]),
    ]);

    let mut system = system;
    let options = ModelOptions {
        invest: true,
        slack: false,
    };
    let objective =
        model::optimize(&mut system, &[0, 1], options, &SolverConfig::default()).unwrap();

    let pv = system.entity("pv").unwrap();
    let add_cap = pv.results.add_cap_out.unwrap();
    assert!((add_cap - 5.0).abs() < TOL);
    assert!((objective - 15.0).abs() < TOL);
    assert_close(&pv.results.flows_out["b_el"], &[5.0, 2.5]);
}

#[test]
fn storage_investment_sizes_the_state_of_charge() {
    let mut system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pv",
            EntityKind::FixedSource(FixedSourceParams {
                profile: vec![1.0, 1.0, 0.0],
                out_max: 10.0,
                capex: 1000.0,
            }),
        )
        .with_outputs(&["b_el"]),
        Entity::new(
            "battery",
            EntityKind::Storage(StorageParams {
                soc_max: 0.0,
                cap_in: 0.0,
                cap_out: 0.0,
                opex_var: 0.0,
                capex: 1.0,
            }),
        )
        .with_inputs(&["b_el"])
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![0.0, 0.0, 5.0]),
    ]);

    let options = ModelOptions {
        invest: true,
        slack: false,
    };
    let objective =
        model::optimize(&mut system, &[0, 1, 2], options, &SolverConfig::default()).unwrap();

    let battery = system.entity("battery").unwrap();
    let soc_add = battery.results.add_cap_soc.unwrap();
    assert!((soc_add - 5.0).abs() < TOL);
    assert!((objective - 5.0).abs() < TOL);
}

#[test]
fn investment_branches_are_mutually_exclusive() {
    let storage_system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "battery",
            EntityKind::Storage(StorageParams {
                soc_max: 20.0,
                cap_in: 10.0,
                cap_out: 10.0,
                opex_var: 0.0,
                capex: 1.0,
            }),
        )
        .with_inputs(&["b_el"])
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![0.0]),
    ]);

    let dispatch = model::assemble(&storage_system, &[0], dispatch_options()).unwrap();
    assert!(dispatch.family("storage_soc_cap").is_none());
    assert!(dispatch.vars.soc_add("battery").is_err());
    let soc = dispatch.vars.soc("battery", 0).unwrap();
    assert_eq!(dispatch.vars.spec(soc).ub, 20.0);
    let charge = dispatch.vars.flow("b_el", "battery", 0).unwrap();
    assert_eq!(dispatch.vars.spec(charge).ub, 10.0);

    let options = ModelOptions {
        invest: true,
        slack: false,
    };
    let invest = model::assemble(&storage_system, &[0], options).unwrap();
    assert_eq!(invest.family("storage_soc_cap").unwrap().len(), 1);
    assert!(invest.vars.soc_add("battery").is_ok());
    let soc = invest.vars.soc("battery", 0).unwrap();
    assert!(invest.vars.spec(soc).ub.is_infinite());
    let charge = invest.vars.flow("b_el", "battery", 0).unwrap();
    assert!(invest.vars.spec(charge).ub.is_infinite());
}

#[test]
fn shortage_slack_absorbs_unserved_demand() {
    let system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pv",
            EntityKind::FixedSource(FixedSourceParams {
                profile: vec![1.0],
                out_max: 3.0,
                capex: 0.0,
            }),
        )
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0]),
    ]);

    let model = model::assemble(&system, &[0], ModelOptions::default()).unwrap();
    let solution = solve(&model);
    assert_families_hold(&model, &solution);

    let shortage = solution.value(model.vars.shortage("b_el", 0).unwrap());
    assert!((shortage - 2.0).abs() < TOL);
    let excess = solution.value(model.vars.excess("b_el", 0).unwrap());
    assert!(excess.abs() < TOL);
}

#[test]
fn resource_limit_caps_total_fuel_draw() {
    let system = EnergySystem::new(vec![
        Entity::new(
            "b_gas",
            EntityKind::Bus(BusParams {
                kind: BusKind::Resource,
                price: 0.0,
                sum_out_limit: Some(12.0),
            }),
        ),
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pp",
            EntityKind::Transformer(TransformerParams {
                eta: 0.5,
                out_max: 100.0,
                opex_var: 0.0,
                capex: 0.0,
            }),
        )
        .with_inputs(&["b_gas"])
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0, 7.0]),
    ]);

    // demand needs 24 units of gas but only 12 are available
    let model = model::assemble(&system, &[0, 1], ModelOptions::default()).unwrap();
    assert_eq!(model.family("resource_limit").unwrap().len(), 1);

    let solution = solve(&model);
    assert_families_hold(&model, &solution);
    let gas: f64 = flow_series(&model, &solution, "b_gas", "pp").iter().sum();
    assert!(gas <= 12.0 + TOL);
    let shortage: f64 = (0..2)
        .map(|pos| solution.value(model.vars.shortage("b_el", pos).unwrap()))
        .sum();
    assert!((shortage - 6.0).abs() < TOL);
}

#[test]
fn profile_shorter_than_horizon_is_rejected() {
    let system = EnergySystem::new(vec![
        bus("b_el", BusKind::Electrical),
        Entity::new(
            "pv",
            EntityKind::FixedSource(FixedSourceParams {
                profile: vec![1.0],
                out_max: 10.0,
                capex: 0.0,
            }),
        )
        .with_outputs(&["b_el"]),
        sink("demand", "b_el", vec![5.0, 5.0]),
    ]);

    let err = model::assemble(&system, &[0, 1], dispatch_options()).unwrap_err();
    assert!(matches!(
        err,
        open_energy_model::ModelError::ProfileLength { got: 1, want: 2, .. }
    ));
}
