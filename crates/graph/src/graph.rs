use crate::error::{GraphError, Result, Stage};
use crate::types::{Entity, EntityId, Reference, ReferenceKey, RelationshipKind};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use solmap_protocol::EntityKind;
use std::collections::HashMap;

/// Directed multigraph of one container: entities as nodes, references as
/// edges, at most one edge per `(source, target, kind)`.
#[derive(Debug, Clone, Default)]
pub struct SolutionGraph {
    pub(crate) graph: DiGraph<Entity, Reference>,

    id_index: HashMap<EntityId, NodeIndex>,

    edge_index: HashMap<ReferenceKey, EdgeIndex>,

    container_id: Option<String>,
}

/// One side of an entity's neighborhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborLink {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub relationship: RelationshipKind,
    pub multiplicity: u32,
    pub field_name: Option<String>,
}

/// Who references an entity and what it references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub referenced_by: Vec<NeighborLink>,
    pub references: Vec<NeighborLink>,
}

impl SolutionGraph {
    pub fn new(container_id: Option<String>) -> Self {
        Self {
            container_id,
            ..Self::default()
        }
    }

    pub(crate) fn add_entity(&mut self, entity: Entity) -> Result<NodeIndex> {
        if self.id_index.contains_key(&entity.id) {
            return Err(GraphError::integrity(
                Stage::Build,
                entity.id.as_str(),
                "duplicate entity id after normalization",
            ));
        }
        let id = entity.id.clone();
        let idx = self.graph.add_node(entity);
        self.id_index.insert(id, idx);
        Ok(idx)
    }

    /// Insert a reference, folding repeated keys into the existing edge
    pub(crate) fn add_reference(&mut self, reference: Reference) -> Result<EdgeIndex> {
        let key = reference.key();
        if let Some(&edge) = self.edge_index.get(&key) {
            if let Some(existing) = self.graph.edge_weight_mut(edge) {
                existing.multiplicity += reference.multiplicity;
            }
            return Ok(edge);
        }

        let from = self.require_node(&reference.source)?;
        let to = self.require_node(&reference.target)?;
        let edge = self.graph.add_edge(from, to, reference);
        self.edge_index.insert(key, edge);
        Ok(edge)
    }

    fn require_node(&self, id: &EntityId) -> Result<NodeIndex> {
        self.find_node(id.as_str()).ok_or_else(|| {
            GraphError::integrity(
                Stage::Build,
                id.as_str(),
                "reference endpoint is not a known entity",
            )
        })
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Find node by entity id
    pub fn find_node(&self, id: &str) -> Option<NodeIndex> {
        self.id_index.get(id).copied()
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.find_node(id)
            .and_then(|idx| self.graph.node_weight(idx))
    }

    /// All entities in insertion order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.graph.node_weights()
    }

    /// All references in insertion order
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.graph.edge_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing references of `id`, optionally restricted to one kind
    pub fn outgoing(&self, id: &str, kind: Option<&RelationshipKind>) -> Vec<&Reference> {
        self.directed(id, Direction::Outgoing, kind)
    }

    /// Incoming references of `id`, optionally restricted to one kind
    pub fn incoming(&self, id: &str, kind: Option<&RelationshipKind>) -> Vec<&Reference> {
        self.directed(id, Direction::Incoming, kind)
    }

    fn directed(
        &self,
        id: &str,
        direction: Direction,
        kind: Option<&RelationshipKind>,
    ) -> Vec<&Reference> {
        let Some(node) = self.find_node(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&Reference> = self
            .graph
            .edges_directed(node, direction)
            .map(|e| e.weight())
            .filter(|r| kind.map_or(true, |k| &r.kind == k))
            .collect();
        edges.sort_by(|a, b| {
            (&a.source, &a.target, &a.kind).cmp(&(&b.source, &b.target, &b.kind))
        });
        edges
    }

    /// Every reference from `source` to `target`, one per kind
    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&Reference> {
        let mut edges: Vec<&Reference> = self
            .outgoing(source, None)
            .into_iter()
            .filter(|r| r.target.as_str() == target)
            .collect();
        edges.sort_by(|a, b| a.kind.cmp(&b.kind));
        edges
    }

    pub fn edge(&self, source: &str, target: &str, kind: &RelationshipKind) -> Option<&Reference> {
        let key = (EntityId::new(source), EntityId::new(target), kind.clone());
        self.edge_index
            .get(&key)
            .and_then(|&edge| self.graph.edge_weight(edge))
    }

    pub fn neighborhood(&self, id: &str) -> Result<Neighborhood> {
        let entity = self
            .entity(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        let link = |other: &EntityId, reference: &Reference| -> Option<NeighborLink> {
            let neighbor = self.entity(other.as_str())?;
            Some(NeighborLink {
                id: neighbor.id.clone(),
                name: neighbor.display_name.clone(),
                kind: neighbor.kind,
                relationship: reference.kind.clone(),
                multiplicity: reference.multiplicity,
                field_name: reference
                    .metadata
                    .get("field_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            })
        };

        Ok(Neighborhood {
            id: entity.id.clone(),
            name: entity.display_name.clone(),
            kind: entity.kind,
            referenced_by: self
                .incoming(id, None)
                .into_iter()
                .filter_map(|r| link(&r.source, r))
                .collect(),
            references: self
                .outgoing(id, None)
                .into_iter()
                .filter_map(|r| link(&r.target, r))
                .collect(),
        })
    }
}
