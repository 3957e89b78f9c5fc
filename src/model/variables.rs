//! Decision-variable storage for the optimization model.
//!
//! The [`VariableSpace`] owns every variable's bound specification and hands
//! out opaque [`VarId`] handles keyed by uid, edge and timestep. Constraint
//! builders only ever index into this space; they never create the
//! underlying storage themselves. Variables are lowered into solver columns
//! in handle order, so a `VarId` doubles as the column index.

use indexmap::IndexMap;

use crate::domain::Uid;
use crate::error::ModelError;
use crate::graph::Edge;

/// Opaque handle of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Bounds of a single variable.
#[derive(Debug, Clone)]
pub struct VarSpec {
    pub name: String,
    pub lb: f64,
    pub ub: f64,
}

/// All decision variables of one model instance.
#[derive(Debug, Default)]
pub struct VariableSpace {
    specs: Vec<VarSpec>,
    /// Flow variables `w[edge, t]`, keyed by edge, indexed by timestep
    /// position.
    flow: IndexMap<Edge, Vec<VarId>>,
    shortage: IndexMap<Uid, Vec<VarId>>,
    excess: IndexMap<Uid, Vec<VarId>>,
    soc: IndexMap<Uid, Vec<VarId>>,
    soc_add: IndexMap<Uid, VarId>,
    add_cap: IndexMap<Uid, VarId>,
    dispatch: IndexMap<Uid, Vec<VarId>>,
    n_timesteps: usize,
}

impl VariableSpace {
    /// Create the space and populate the flow-variable family: one
    /// continuous variable per (edge, timestep), bounded `[0, inf)`.
    ///
    /// A repeated edge maps onto the variables created for its first
    /// occurrence, so every flow index refers to exactly one variable.
    pub fn with_flow_vars(edges: &[Edge], timesteps: &[usize]) -> Self {
        let mut space = Self {
            n_timesteps: timesteps.len(),
            ..Self::default()
        };
        for edge in edges {
            if space.flow.contains_key(edge) {
                continue;
            }
            let vars = timesteps
                .iter()
                .map(|t| {
                    space.push_spec(
                        format!("w_{}_{}_{t}", edge.0, edge.1),
                        0.0,
                        f64::INFINITY,
                    )
                })
                .collect();
            space.flow.insert(edge.clone(), vars);
        }
        space
    }

    fn push_spec(&mut self, name: String, lb: f64, ub: f64) -> VarId {
        let id = VarId(self.specs.len());
        self.specs.push(VarSpec { name, lb, ub });
        id
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn n_timesteps(&self) -> usize {
        self.n_timesteps
    }

    pub fn spec(&self, id: VarId) -> &VarSpec {
        &self.specs[id.0]
    }

    pub fn iter_specs(&self) -> impl Iterator<Item = (VarId, &VarSpec)> {
        self.specs.iter().enumerate().map(|(i, s)| (VarId(i), s))
    }

    /// Flow variable for edge `(from, to)` at timestep position `t`.
    pub fn flow(&self, from: &str, to: &str, t: usize) -> Result<VarId, ModelError> {
        self.flow
            .get(&(from.to_string(), to.to_string()))
            .and_then(|vars| vars.get(t))
            .copied()
            .ok_or_else(|| ModelError::MissingFlowVariable {
                from: from.to_string(),
                to: to.to_string(),
                t,
            })
    }

    pub fn iter_flows(&self) -> impl Iterator<Item = (&Edge, &Vec<VarId>)> {
        self.flow.iter()
    }

    /// Tighten the bounds of an existing variable.
    pub fn set_bounds(&mut self, id: VarId, lb: f64, ub: f64) {
        self.specs[id.0].lb = lb;
        self.specs[id.0].ub = ub;
    }

    pub fn set_upper(&mut self, id: VarId, ub: f64) {
        self.specs[id.0].ub = ub;
    }

    /// Fix a variable to a value (lower bound == upper bound).
    pub fn fix(&mut self, id: VarId, value: f64) {
        self.set_bounds(id, value, value);
    }

    /// Create non-negative shortage and excess slack variables for every
    /// given bus and timestep.
    pub fn add_slack_vars(&mut self, bus_uids: &[Uid], timesteps: &[usize]) {
        for uid in bus_uids {
            let shortage = timesteps
                .iter()
                .map(|t| self.push_spec(format!("shortage_{uid}_{t}"), 0.0, f64::INFINITY))
                .collect();
            self.shortage.insert(uid.clone(), shortage);
            let excess = timesteps
                .iter()
                .map(|t| self.push_spec(format!("excess_{uid}_{t}"), 0.0, f64::INFINITY))
                .collect();
            self.excess.insert(uid.clone(), excess);
        }
    }

    pub fn shortage(&self, uid: &str, t: usize) -> Result<VarId, ModelError> {
        lookup_series(&self.shortage, uid, t, "shortage slack")
    }

    pub fn excess(&self, uid: &str, t: usize) -> Result<VarId, ModelError> {
        lookup_series(&self.excess, uid, t, "excess slack")
    }

    pub fn iter_shortage(&self) -> impl Iterator<Item = (&Uid, &Vec<VarId>)> {
        self.shortage.iter()
    }

    /// Create state-of-charge variables for a storage unit, bounded by
    /// `[0, soc_ub]` per timestep.
    pub fn add_soc_vars(&mut self, uid: &Uid, timesteps: &[usize], soc_ub: f64) {
        let vars = timesteps
            .iter()
            .map(|t| self.push_spec(format!("soc_{uid}_{t}"), 0.0, soc_ub))
            .collect();
        self.soc.insert(uid.clone(), vars);
    }

    pub fn soc(&self, uid: &str, t: usize) -> Result<VarId, ModelError> {
        lookup_series(&self.soc, uid, t, "state of charge")
    }

    pub fn iter_soc(&self) -> impl Iterator<Item = (&Uid, &Vec<VarId>)> {
        self.soc.iter()
    }

    /// Create the per-unit added-soc-capacity investment variable.
    pub fn add_soc_capacity_var(&mut self, uid: &Uid) -> VarId {
        let id = self.push_spec(format!("soc_add_{uid}"), 0.0, f64::INFINITY);
        self.soc_add.insert(uid.clone(), id);
        id
    }

    pub fn soc_add(&self, uid: &str) -> Result<VarId, ModelError> {
        self.soc_add
            .get(uid)
            .copied()
            .ok_or_else(|| ModelError::MissingVariable {
                kind: "added soc capacity",
                uid: uid.to_string(),
            })
    }

    pub fn iter_soc_add(&self) -> impl Iterator<Item = (&Uid, VarId)> {
        self.soc_add.iter().map(|(uid, id)| (uid, *id))
    }

    /// Create the per-unit added-output-capacity investment variable, or
    /// return the existing one.
    pub fn add_capacity_var(&mut self, uid: &Uid) -> VarId {
        if let Some(id) = self.add_cap.get(uid) {
            return *id;
        }
        let id = self.push_spec(format!("add_cap_{uid}"), 0.0, f64::INFINITY);
        self.add_cap.insert(uid.clone(), id);
        id
    }

    pub fn add_cap(&self, uid: &str) -> Result<VarId, ModelError> {
        self.add_cap
            .get(uid)
            .copied()
            .ok_or_else(|| ModelError::MissingVariable {
                kind: "added capacity",
                uid: uid.to_string(),
            })
    }

    pub fn add_cap_opt(&self, uid: &str) -> Option<VarId> {
        self.add_cap.get(uid).copied()
    }

    pub fn iter_add_cap(&self) -> impl Iterator<Item = (&Uid, VarId)> {
        self.add_cap.iter().map(|(uid, id)| (uid, *id))
    }

    /// Create curtailment variables for a dispatchable source.
    pub fn add_dispatch_vars(&mut self, uid: &Uid, timesteps: &[usize]) {
        let vars = timesteps
            .iter()
            .map(|t| self.push_spec(format!("dispatch_{uid}_{t}"), 0.0, f64::INFINITY))
            .collect();
        self.dispatch.insert(uid.clone(), vars);
    }

    pub fn dispatch(&self, uid: &str, t: usize) -> Result<VarId, ModelError> {
        lookup_series(&self.dispatch, uid, t, "dispatch")
    }

    pub fn iter_dispatch(&self) -> impl Iterator<Item = (&Uid, &Vec<VarId>)> {
        self.dispatch.iter()
    }

    pub fn has_dispatch_vars(&self) -> bool {
        !self.dispatch.is_empty()
    }
}

fn lookup_series(
    map: &IndexMap<Uid, Vec<VarId>>,
    uid: &str,
    t: usize,
    kind: &'static str,
) -> Result<VarId, ModelError> {
    map.get(uid)
        .and_then(|vars| vars.get(t))
        .copied()
        .ok_or_else(|| ModelError::MissingVariable {
            kind,
            uid: format!("{uid} (timestep {t})"),
        })
}
