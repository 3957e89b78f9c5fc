//! Edge derivation and adjacency extraction for the entity graph.
//!
//! Edges are derived from component declarations each time a model is
//! assembled and never stored on the entities themselves. Declaration order
//! is preserved throughout: constraint families and result write-back rely
//! on it.

use indexmap::IndexMap;

use crate::domain::{EnergySystem, Uid};

/// A directed flow edge `(from, to)`.
pub type Edge = (Uid, Uid);

/// Derive the ordered edge list for the given component entities.
///
/// For every component, its input edges are emitted before its output edges,
/// each list in declaration order. No deduplication is performed; the input
/// graph is assumed consistent.
pub fn edges(system: &EnergySystem, components: &[usize]) -> Vec<Edge> {
    let mut edges = Vec::new();
    for &idx in components {
        let c = &system.entities[idx];
        for i in &c.inputs {
            edges.push((i.clone(), c.uid.clone()));
        }
        for o in &c.outputs {
            edges.push((c.uid.clone(), o.clone()));
        }
    }
    edges
}

/// Predecessor and successor uid lists for a targeted subset of nodes.
///
/// Adjacency is read off the component declarations, so a node only has a
/// neighbour here if some component declared the corresponding relation.
/// Both maps contain an (possibly empty) entry for every target.
pub fn io_maps(
    system: &EnergySystem,
    targets: &[Uid],
) -> (IndexMap<Uid, Vec<Uid>>, IndexMap<Uid, Vec<Uid>>) {
    let mut predecessors: IndexMap<Uid, Vec<Uid>> = IndexMap::new();
    let mut successors: IndexMap<Uid, Vec<Uid>> = IndexMap::new();
    for uid in targets {
        predecessors.insert(uid.clone(), Vec::new());
        successors.insert(uid.clone(), Vec::new());
    }

    for c in system.entities.iter().filter(|e| !e.is_bus()) {
        for i in &c.inputs {
            if let Some(succ) = successors.get_mut(i) {
                succ.push(c.uid.clone());
            }
            if let Some(pred) = predecessors.get_mut(&c.uid) {
                pred.push(i.clone());
            }
        }
        for o in &c.outputs {
            if let Some(pred) = predecessors.get_mut(o) {
                pred.push(c.uid.clone());
            }
            if let Some(succ) = successors.get_mut(&c.uid) {
                succ.push(o.clone());
            }
        }
    }

    (predecessors, successors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BusKind, BusParams, Entity, EntityKind, SinkParams, TransformerParams};

    fn test_system() -> EnergySystem {
        let bus = |uid: &str, kind: BusKind| {
            Entity::new(
                uid,
                EntityKind::Bus(BusParams {
                    kind,
                    price: 0.0,
                    sum_out_limit: None,
                }),
            )
        };
        EnergySystem::new(vec![
            bus("b_gas", BusKind::Resource),
            bus("b_el", BusKind::Electrical),
            Entity::new(
                "pp_gas",
                EntityKind::Transformer(TransformerParams {
                    eta: 0.5,
                    out_max: 100.0,
                    opex_var: 0.0,
                    capex: 0.0,
                }),
            )
            .with_inputs(&["b_gas"])
            .with_outputs(&["b_el"]),
            Entity::new(
                "demand",
                EntityKind::Sink(SinkParams {
                    demand: vec![5.0, 7.0],
                }),
            )
            .with_inputs(&["b_el"]),
        ])
    }

    #[test]
    fn edges_preserve_declaration_order() {
        let system = test_system();
        let components = system.component_indices();
        let edges = edges(&system, &components);
        assert_eq!(
            edges,
            vec![
                ("b_gas".to_string(), "pp_gas".to_string()),
                ("pp_gas".to_string(), "b_el".to_string()),
                ("b_el".to_string(), "demand".to_string()),
            ]
        );
    }

    #[test]
    fn io_maps_for_buses() {
        let system = test_system();
        let (preds, succs) = io_maps(&system, &["b_el".to_string()]);
        assert_eq!(preds["b_el"], vec!["pp_gas".to_string()]);
        assert_eq!(succs["b_el"], vec!["demand".to_string()]);
    }

    #[test]
    fn io_maps_for_components() {
        let system = test_system();
        let (preds, succs) = io_maps(&system, &["pp_gas".to_string()]);
        assert_eq!(preds["pp_gas"], vec!["b_gas".to_string()]);
        assert_eq!(succs["pp_gas"], vec!["b_el".to_string()]);
    }

    #[test]
    fn io_maps_cover_targets_without_neighbours() {
        let system = test_system();
        let (preds, succs) = io_maps(&system, &["b_gas".to_string()]);
        assert_eq!(preds["b_gas"], Vec::<Uid>::new());
        assert_eq!(succs["b_gas"], vec!["pp_gas".to_string()]);
    }
}
