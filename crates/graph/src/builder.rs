use crate::error::Result;
use crate::graph::SolutionGraph;
use crate::normalizer::NormalizedSnapshot;

/// Assembles normalized entities and references into a [`SolutionGraph`].
///
/// Pure indexing: no metrics are computed here. Entity ids must already be
/// unique; a duplicate is reported instead of silently replacing a node.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, snapshot: &NormalizedSnapshot) -> Result<SolutionGraph> {
        let mut graph = SolutionGraph::new(snapshot.container_id.clone());

        for entity in &snapshot.entities {
            graph.add_entity(entity.clone())?;
        }

        for reference in &snapshot.references {
            graph.add_reference(reference.clone())?;
        }

        log::info!(
            "Built solution graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GraphError, Stage};
    use crate::types::{Entity, EntityId, Reference, RelationshipKind};
    use solmap_protocol::{EntityKind, Metadata};
    use std::collections::BTreeSet;

    fn entity(id: &str, kind: EntityKind) -> Entity {
        Entity {
            id: EntityId::new(id),
            kind,
            display_name: format!("Entity {id}"),
            raw_ids: BTreeSet::from([id.to_string()]),
            aliases: BTreeSet::new(),
            metadata: Metadata::new(),
        }
    }

    fn reference(source: &str, target: &str, kind: &str) -> Reference {
        Reference {
            source: EntityId::new(source),
            target: EntityId::new(target),
            kind: RelationshipKind::new(kind),
            multiplicity: 1,
            metadata: Metadata::new(),
        }
    }

    fn snapshot(entities: Vec<Entity>, references: Vec<Reference>) -> NormalizedSnapshot {
        NormalizedSnapshot {
            entities,
            references,
            ..NormalizedSnapshot::default()
        }
    }

    #[test]
    fn test_build_simple_graph() {
        let graph = GraphBuilder::new()
            .build(&snapshot(
                vec![
                    entity("F1", EntityKind::Form),
                    entity("F2", EntityKind::Form),
                    entity("W1", EntityKind::Workflow),
                ],
                vec![
                    reference("F1", "F2", "LOOKUP"),
                    reference("F1", "F2", "REFERENCE"),
                    reference("F2", "W1", "WORKFLOW"),
                ],
            ))
            .unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.edges_between("F1", "F2").len(), 2);
        assert_eq!(graph.outgoing("F1", Some(&"LOOKUP".into())).len(), 1);
        assert_eq!(graph.incoming("W1", None)[0].source.as_str(), "F2");
        assert!(graph.edge("F2", "W1", &"WORKFLOW".into()).is_some());
        assert!(graph.edge("F2", "W1", &"LOOKUP".into()).is_none());
    }

    #[test]
    fn duplicate_entity_ids_fail_fast() {
        let err = GraphBuilder::new()
            .build(&snapshot(
                vec![entity("F1", EntityKind::Form), entity("F1", EntityKind::Form)],
                Vec::new(),
            ))
            .unwrap_err();

        match err {
            GraphError::DataIntegrity { stage, raw_id, .. } => {
                assert_eq!(stage, Stage::Build);
                assert_eq!(raw_id, "F1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn repeated_reference_key_aggregates_multiplicity() {
        let mut again = reference("F1", "F2", "LOOKUP");
        again.multiplicity = 3;
        let graph = GraphBuilder::new()
            .build(&snapshot(
                vec![entity("F1", EntityKind::Form), entity("F2", EntityKind::Form)],
                vec![reference("F1", "F2", "LOOKUP"), again],
            ))
            .unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.edge("F1", "F2", &"LOOKUP".into()).unwrap().multiplicity,
            4
        );
    }

    #[test]
    fn unknown_endpoint_is_an_integrity_error() {
        let result = GraphBuilder::new().build(&snapshot(
            vec![entity("F1", EntityKind::Form)],
            vec![reference("F1", "ghost", "LOOKUP")],
        ));
        assert!(matches!(result, Err(GraphError::DataIntegrity { .. })));
    }

    #[test]
    fn neighborhood_lists_both_directions() {
        let mut lookup = reference("F1", "F2", "LOOKUP");
        lookup
            .metadata
            .insert("field_name".to_string(), "Location".into());
        let graph = GraphBuilder::new()
            .build(&snapshot(
                vec![
                    entity("F1", EntityKind::Form),
                    entity("F2", EntityKind::Form),
                    entity("W1", EntityKind::Workflow),
                ],
                vec![lookup, reference("F2", "W1", "WORKFLOW")],
            ))
            .unwrap();

        let hood = graph.neighborhood("F2").unwrap();
        assert_eq!(hood.referenced_by.len(), 1);
        assert_eq!(hood.referenced_by[0].field_name.as_deref(), Some("Location"));
        assert_eq!(hood.references[0].id.as_str(), "W1");
        assert!(matches!(
            graph.neighborhood("nope"),
            Err(GraphError::NodeNotFound(_))
        ));
    }
}
