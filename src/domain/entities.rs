//! Typed entities of the energy-system graph.
//!
//! An [`EnergySystem`] is a flat list of entities: buses (balancing points)
//! and components (everything that produces, consumes, converts, stores or
//! moves energy). Components declare their bus adjacency through ordered
//! `inputs`/`outputs` uid lists; the directed edge set of the system is
//! derived from those declarations and never stored redundantly.
//!
//! Entities are constructed fully populated before model assembly begins and
//! are only mutated again when the solved flow values are written back into
//! their `results`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::ModelError;

/// Unique identifier of an entity (node) in the system graph.
pub type Uid = String;

/// Balancing behaviour of a bus.
///
/// Electrical and thermal buses get a per-timestep balance constraint;
/// resource buses (fuel commodities such as gas or coal) instead get an
/// overall supply limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[serde(rename = "el")]
    Electrical,
    #[serde(rename = "th")]
    Thermal,
    Resource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusParams {
    pub kind: BusKind,
    /// Price charged per unit of energy drawn from this bus (fuel price).
    #[serde(default)]
    pub price: f64,
    /// Cap on the total outflow of a resource bus over the whole horizon.
    #[serde(default)]
    pub sum_out_limit: Option<f64>,
}

/// Linear converter with a single input and a single output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerParams {
    /// Conversion efficiency: output = eta * input.
    pub eta: f64,
    /// Installed output capacity (upper bound on the output flow).
    pub out_max: f64,
    #[serde(default)]
    pub opex_var: f64,
    #[serde(default)]
    pub capex: f64,
}

/// Back-pressure CHP with a fixed power-to-heat ratio.
///
/// Output roles are named explicitly; `heat_bus` must be the first and
/// `power_bus` the second entry of the entity's declared outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChpParams {
    pub heat_bus: Uid,
    pub power_bus: Uid,
    pub eta_thermal: f64,
    pub eta_electrical: f64,
    pub out_max_thermal: f64,
    pub out_max_electrical: f64,
    #[serde(default)]
    pub opex_var: f64,
    #[serde(default)]
    pub capex: f64,
}

/// Extraction-condensing CHP with a convex (power, heat) operating envelope.
///
/// Output roles are named explicitly; `power_bus` is the first and
/// `heat_bus` the second declared output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionChpParams {
    pub power_bus: Uid,
    pub heat_bus: Uid,
    /// Fuel-consumption coefficients: fuel = k0 + k1*power + k2*heat.
    pub k: [f64; 3],
    /// Extraction-line coefficients: power >= c0 + c1*heat.
    pub c: [f64; 2],
    /// Power-loss slopes of the envelope half-planes.
    pub beta: [f64; 2],
    /// Maximum and minimum power intercepts of the envelope.
    pub p: [f64; 2],
    /// Minimum stable output; the lower envelope half-plane is only
    /// generated when this is positive.
    #[serde(default)]
    pub out_min: f64,
    #[serde(default)]
    pub opex_var: f64,
    #[serde(default)]
    pub capex: f64,
}

/// Source with a fixed normalised generation profile (e.g. wind, PV).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedSourceParams {
    /// Normalised feed-in profile, one value per timestep.
    pub profile: Vec<f64>,
    /// Installed capacity the profile is scaled by.
    pub out_max: f64,
    #[serde(default)]
    pub capex: f64,
}

/// Curtailable source: may feed in anything up to the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSourceParams {
    pub profile: Vec<f64>,
    pub out_max: f64,
    /// Cost per unit of curtailed (forgone) generation.
    #[serde(default)]
    pub dispatch_ex: f64,
}

/// Sink with a fixed demand profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkParams {
    /// Absolute demand, one value per timestep.
    pub demand: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageParams {
    /// Installed state-of-charge capacity.
    pub soc_max: f64,
    /// Charging power limit (upper bound on the inflow edge).
    pub cap_in: f64,
    /// Discharging power limit (upper bound on the outflow edge).
    pub cap_out: f64,
    #[serde(default)]
    pub opex_var: f64,
    #[serde(default)]
    pub capex: f64,
}

/// Closed enumeration of component kinds.
///
/// The constraint-builder registry is keyed by this tag; the order of the
/// variants is the order in which builders run during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ComponentKind {
    Transformer,
    Chp,
    ExtractionChp,
    FixedSource,
    DispatchSource,
    Sink,
    Storage,
    Transport,
}

/// Kind-specific payload of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Bus(BusParams),
    Transformer(TransformerParams),
    Chp(ChpParams),
    ExtractionChp(ExtractionChpParams),
    FixedSource(FixedSourceParams),
    DispatchSource(DispatchSourceParams),
    Sink(SinkParams),
    Storage(StorageParams),
    /// A transport link is a lossy or lossless pass-through conversion and
    /// reuses the transformer parameters unchanged.
    Transport(TransformerParams),
}

impl EntityKind {
    pub fn component_kind(&self) -> Option<ComponentKind> {
        match self {
            EntityKind::Bus(_) => None,
            EntityKind::Transformer(_) => Some(ComponentKind::Transformer),
            EntityKind::Chp(_) => Some(ComponentKind::Chp),
            EntityKind::ExtractionChp(_) => Some(ComponentKind::ExtractionChp),
            EntityKind::FixedSource(_) => Some(ComponentKind::FixedSource),
            EntityKind::DispatchSource(_) => Some(ComponentKind::DispatchSource),
            EntityKind::Sink(_) => Some(ComponentKind::Sink),
            EntityKind::Storage(_) => Some(ComponentKind::Storage),
            EntityKind::Transport(_) => Some(ComponentKind::Transport),
        }
    }

    /// Variable operating cost per unit of input flow, for the kinds that
    /// carry one.
    pub fn opex_var(&self) -> Option<f64> {
        match self {
            EntityKind::Transformer(p) | EntityKind::Transport(p) => Some(p.opex_var),
            EntityKind::Chp(p) => Some(p.opex_var),
            EntityKind::ExtractionChp(p) => Some(p.opex_var),
            EntityKind::Storage(p) => Some(p.opex_var),
            _ => None,
        }
    }

    /// Specific investment cost per unit of added capacity.
    pub fn capex(&self) -> Option<f64> {
        match self {
            EntityKind::Transformer(p) | EntityKind::Transport(p) => Some(p.capex),
            EntityKind::Chp(p) => Some(p.capex),
            EntityKind::ExtractionChp(p) => Some(p.capex),
            EntityKind::FixedSource(p) => Some(p.capex),
            EntityKind::Storage(p) => Some(p.capex),
            _ => None,
        }
    }
}

/// Per-entity optimisation results, the only persistent output of a solve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityResults {
    /// Flow received from each predecessor, ordered over timesteps.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub flows_in: IndexMap<Uid, Vec<f64>>,
    /// Flow delivered to each successor, ordered over timesteps.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub flows_out: IndexMap<Uid, Vec<f64>>,
    /// Added output capacity (investment runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_cap_out: Option<f64>,
    /// Added state-of-charge capacity (investment runs, storages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_cap_soc: Option<f64>,
}

/// A node of the system graph together with its declared adjacency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub uid: Uid,
    /// Predecessor uids, in declaration order.
    #[serde(default)]
    pub inputs: Vec<Uid>,
    /// Successor uids, in declaration order. Order is meaningful: several
    /// constraint families rely on it (e.g. CHP output roles).
    #[serde(default)]
    pub outputs: Vec<Uid>,
    #[serde(flatten)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "results_empty")]
    pub results: EntityResults,
}

fn results_empty(r: &EntityResults) -> bool {
    r.flows_in.is_empty()
        && r.flows_out.is_empty()
        && r.add_cap_out.is_none()
        && r.add_cap_soc.is_none()
}

impl Entity {
    pub fn new(uid: impl Into<Uid>, kind: EntityKind) -> Self {
        Self {
            uid: uid.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            kind,
            results: EntityResults::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn is_bus(&self) -> bool {
        matches!(self.kind, EntityKind::Bus(_))
    }

    pub fn bus_params(&self) -> Option<&BusParams> {
        match &self.kind {
            EntityKind::Bus(p) => Some(p),
            _ => None,
        }
    }

    pub fn first_input(&self) -> Result<&Uid, ModelError> {
        self.inputs
            .first()
            .ok_or_else(|| ModelError::invalid_entity(&self.uid, "no declared input"))
    }

    pub fn first_output(&self) -> Result<&Uid, ModelError> {
        self.outputs
            .first()
            .ok_or_else(|| ModelError::invalid_entity(&self.uid, "no declared output"))
    }

    /// The output tied to the input by the conversion balance, with its
    /// efficiency. For a CHP this is the heat output; the power output is
    /// tied through the ratio constraint instead.
    pub fn conversion_output(&self) -> Result<(&Uid, f64), ModelError> {
        match &self.kind {
            EntityKind::Transformer(p) | EntityKind::Transport(p) => {
                Ok((self.first_output()?, p.eta))
            }
            EntityKind::Chp(p) => Ok((&p.heat_bus, p.eta_thermal)),
            _ => Err(ModelError::invalid_entity(
                &self.uid,
                "entity has no conversion balance",
            )),
        }
    }

    /// Output flow capacities, one entry per capped output edge.
    pub fn output_caps(&self) -> Vec<(&Uid, f64)> {
        match &self.kind {
            EntityKind::Transformer(p) | EntityKind::Transport(p) => self
                .outputs
                .first()
                .map(|o| vec![(o, p.out_max)])
                .unwrap_or_default(),
            EntityKind::Chp(p) => vec![
                (&p.heat_bus, p.out_max_thermal),
                (&p.power_bus, p.out_max_electrical),
            ],
            _ => Vec::new(),
        }
    }
}

/// The full entity graph handed to model assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergySystem {
    pub entities: Vec<Entity>,
}

impl EnergySystem {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn entity(&self, uid: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.uid == uid)
    }

    /// Fuel price of the given bus; zero for entities that are not buses.
    pub fn bus_price(&self, uid: &str) -> f64 {
        self.entity(uid)
            .and_then(|e| e.bus_params())
            .map(|p| p.price)
            .unwrap_or(0.0)
    }

    /// Indices of all component (non-bus) entities, in declaration order.
    pub fn component_indices(&self) -> Vec<usize> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_bus())
            .map(|(i, _)| i)
            .collect()
    }
}

/// A scenario file as consumed by the command-line binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Number of timesteps in the horizon; the model runs over `0..timesteps`.
    pub timesteps: usize,
    pub entities: Vec<Entity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_kind_serde_names() {
        let el: BusKind = serde_yaml::from_str("el").unwrap();
        assert_eq!(el, BusKind::Electrical);
        let th: BusKind = serde_yaml::from_str("th").unwrap();
        assert_eq!(th, BusKind::Thermal);
        let res: BusKind = serde_yaml::from_str("resource").unwrap();
        assert_eq!(res, BusKind::Resource);
    }

    #[test]
    fn entity_yaml_round_trip() {
        let yaml = r#"
uid: pp_gas
inputs: [b_gas]
outputs: [b_el]
type: transformer
eta: 0.55
out_max: 100.0
opex_var: 2.0
"#;
        let entity: Entity = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entity.uid, "pp_gas");
        assert_eq!(entity.kind.component_kind(), Some(ComponentKind::Transformer));
        let (out, eta) = entity.conversion_output().unwrap();
        assert_eq!(out, "b_el");
        assert!((eta - 0.55).abs() < 1e-12);
    }

    #[test]
    fn conversion_output_uses_named_chp_role() {
        let chp = Entity::new(
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
        .with_outputs(&["b_th", "b_el"]);

        let (out, eta) = chp.conversion_output().unwrap();
        assert_eq!(out, "b_th");
        assert!((eta - 0.5).abs() < 1e-12);
        let caps = chp.output_caps();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[0], (&"b_th".to_string(), 50.0));
    }

    #[test]
    fn bus_price_defaults_to_zero() {
        let system = EnergySystem::new(vec![Entity::new(
            "b_el",
            EntityKind::Bus(BusParams {
                kind: BusKind::Electrical,
                price: 0.0,
                sum_out_limit: None,
            }),
        )]);
        assert_eq!(system.bus_price("b_el"), 0.0);
        assert_eq!(system.bus_price("nonexistent"), 0.0);
    }
}
