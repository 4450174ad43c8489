use crate::analyzer::{EntityMetrics, GraphMetrics, RankedEntity};
use crate::error::{GraphError, Result};
use crate::graph::{NeighborLink, Neighborhood, SolutionGraph};
use crate::types::{AnalysisWarning, Entity, EntityId, Reference, RelationshipKind};
use serde::{Deserialize, Serialize};
use solmap_protocol::EntityKind;
use std::collections::BTreeMap;

pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Entity together with its computed metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    #[serde(flatten)]
    pub entity: Entity,
    pub metrics: EntityMetrics,
}

impl EntityReport {
    /// Entity was fetched from outside the mapped container
    pub fn is_external(&self) -> bool {
        self.entity
            .metadata
            .get("external")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Run-level counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub entity_count: usize,
    pub reference_count: usize,
    pub entities_by_kind: BTreeMap<EntityKind, usize>,
    pub references_by_kind: BTreeMap<RelationshipKind, usize>,
    pub weighted_references_by_kind: BTreeMap<RelationshipKind, u64>,
    pub action_references: usize,
    pub field_references: usize,
    pub self_references: usize,
    pub component_count: usize,

    /// component size -> number of components of that size
    pub component_sizes: BTreeMap<usize, usize>,
    pub largest_component: usize,
    pub isolated_entities: usize,
    pub dangling_references: usize,
    pub generated_at_ms: u64,
    pub most_referenced: Vec<RankedEntity>,
    pub most_referencing: Vec<RankedEntity>,
}

/// Immutable outcome of one analysis run, shared read-only by every renderer.
///
/// Fields are private; construct through [`SummaryAssembler`] or by
/// deserializing a previously exported result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    schema_version: u32,
    container_id: Option<String>,
    entities: BTreeMap<EntityId, EntityReport>,
    references: Vec<Reference>,
    components: BTreeMap<usize, Vec<EntityId>>,
    aggregates: Aggregates,
    #[serde(default)]
    warnings: Vec<AnalysisWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: EntityId,
    pub label: String,
    pub kind: EntityKind,
    pub is_key: bool,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub source: EntityId,
    pub target: EntityId,
    pub label: RelationshipKind,
    pub multiplicity: u32,
}

/// Nodes plus labeled directed edges, for diagram-style renderers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

/// One row of the importance table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedRow {
    pub rank: usize,
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
    pub component: usize,
    pub is_key: bool,
    pub external: bool,
}

impl AnalysisResult {
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, EntityReport> {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&EntityReport> {
        self.entities.get(id)
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn components(&self) -> &BTreeMap<usize, Vec<EntityId>> {
        &self.components
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn warnings(&self) -> &[AnalysisWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities of one kind, sorted by display name then id
    pub fn entities_of_kind(&self, kind: EntityKind) -> Vec<&EntityReport> {
        let mut out: Vec<&EntityReport> = self
            .entities
            .values()
            .filter(|r| r.entity.kind == kind)
            .collect();
        out.sort_by(|a, b| {
            a.entity
                .display_name
                .cmp(&b.entity.display_name)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        out
    }

    pub fn display_name<'a>(&'a self, id: &'a EntityId) -> &'a str {
        self.entities
            .get(id)
            .map(|r| r.entity.display_name.as_str())
            .unwrap_or(id.as_str())
    }

    pub fn diagram(&self) -> Diagram {
        Diagram {
            nodes: self
                .entities
                .values()
                .map(|r| DiagramNode {
                    id: r.entity.id.clone(),
                    label: r.entity.display_name.clone(),
                    kind: r.entity.kind,
                    is_key: r.metrics.is_key,
                    external: r.is_external(),
                })
                .collect(),
            edges: self
                .references
                .iter()
                .map(|r| DiagramEdge {
                    source: r.source.clone(),
                    target: r.target.clone(),
                    label: r.kind.clone(),
                    multiplicity: r.multiplicity,
                })
                .collect(),
        }
    }

    /// Entities in rank order; `None` returns every entity
    pub fn ranked_table(&self, limit: Option<usize>) -> Vec<RankedRow> {
        let mut rows: Vec<RankedRow> = self
            .entities
            .values()
            .map(|r| RankedRow {
                rank: r.metrics.rank,
                id: r.entity.id.clone(),
                name: r.entity.display_name.clone(),
                kind: r.entity.kind,
                in_degree: r.metrics.in_degree,
                out_degree: r.metrics.out_degree,
                total_degree: r.metrics.total_degree,
                component: r.metrics.component,
                is_key: r.metrics.is_key,
                external: r.is_external(),
            })
            .collect();
        rows.sort_by_key(|row| row.rank);
        rows.truncate(limit.unwrap_or(rows.len()));
        rows
    }

    /// Neighborhood of one entity, answered from the reference list
    pub fn neighborhood(&self, id: &str) -> Result<Neighborhood> {
        let report = self
            .entity(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        let link = |other: &EntityId, reference: &Reference| -> Option<NeighborLink> {
            let neighbor = &self.entities.get(other)?.entity;
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
            id: report.entity.id.clone(),
            name: report.entity.display_name.clone(),
            kind: report.entity.kind,
            referenced_by: self
                .references
                .iter()
                .filter(|r| r.target.as_str() == id)
                .filter_map(|r| link(&r.source, r))
                .collect(),
            references: self
                .references
                .iter()
                .filter(|r| r.source.as_str() == id)
                .filter_map(|r| link(&r.target, r))
                .collect(),
        })
    }
}

/// Run-level inputs that are not derived from the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyContext {
    pub generated_at_ms: u64,
}

/// Packages graph, metrics and warnings into an [`AnalysisResult`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryAssembler;

impl SummaryAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        graph: &SolutionGraph,
        metrics: &GraphMetrics,
        warnings: Vec<AnalysisWarning>,
        context: AssemblyContext,
    ) -> AnalysisResult {
        let entities: BTreeMap<EntityId, EntityReport> = graph
            .entities()
            .map(|entity| {
                let metrics = metrics
                    .per_entity
                    .get(&entity.id)
                    .cloned()
                    .unwrap_or_default();
                (
                    entity.id.clone(),
                    EntityReport {
                        entity: entity.clone(),
                        metrics,
                    },
                )
            })
            .collect();

        let mut references: Vec<Reference> = graph.references().cloned().collect();
        references.sort_by(|a, b| {
            (&a.source, &a.target, &a.kind).cmp(&(&b.source, &b.target, &b.kind))
        });

        let components: BTreeMap<usize, Vec<EntityId>> =
            metrics.components.iter().cloned().enumerate().collect();

        let aggregates = Self::aggregate(
            &entities,
            &references,
            &components,
            &warnings,
            metrics,
            context,
        );

        AnalysisResult {
            schema_version: RESULT_SCHEMA_VERSION,
            container_id: graph.container_id().map(str::to_string),
            entities,
            references,
            components,
            aggregates,
            warnings,
        }
    }

    fn aggregate(
        entities: &BTreeMap<EntityId, EntityReport>,
        references: &[Reference],
        components: &BTreeMap<usize, Vec<EntityId>>,
        warnings: &[AnalysisWarning],
        metrics: &GraphMetrics,
        context: AssemblyContext,
    ) -> Aggregates {
        let mut aggregates = Aggregates {
            entity_count: entities.len(),
            reference_count: references.len(),
            component_count: components.len(),
            generated_at_ms: context.generated_at_ms,
            most_referenced: metrics.most_referenced.clone(),
            most_referencing: metrics.most_referencing.clone(),
            ..Aggregates::default()
        };

        for kind in EntityKind::ALL {
            aggregates.entities_by_kind.insert(kind, 0);
        }
        for report in entities.values() {
            *aggregates
                .entities_by_kind
                .entry(report.entity.kind)
                .or_default() += 1;
            if report.metrics.total_degree == 0 {
                aggregates.isolated_entities += 1;
            }
        }

        for reference in references {
            *aggregates
                .references_by_kind
                .entry(reference.kind.clone())
                .or_default() += 1;
            *aggregates
                .weighted_references_by_kind
                .entry(reference.kind.clone())
                .or_default() += u64::from(reference.multiplicity);
            if reference.is_action() {
                aggregates.action_references += 1;
            } else {
                aggregates.field_references += 1;
            }
            if reference.is_self_reference() {
                aggregates.self_references += 1;
            }
        }

        for members in components.values() {
            *aggregates.component_sizes.entry(members.len()).or_default() += 1;
            aggregates.largest_component = aggregates.largest_component.max(members.len());
        }

        aggregates.dangling_references = warnings.iter().filter(|w| w.is_dangling()).count();
        aggregates
    }
}
