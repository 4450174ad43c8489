use crate::graph::SolutionGraph;
use crate::types::EntityId;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// How many top-ranked entities are flagged as key
    pub key_entity_limit: usize,

    /// Length of the most-referenced / most-referencing lists
    pub top_limit: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            key_entity_limit: 5,
            top_limit: 5,
        }
    }
}

/// Structural metrics of one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetrics {
    /// Distinct incoming edges
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,

    /// Incoming edges weighted by multiplicity
    pub in_weight: u64,
    pub out_weight: u64,
    pub total_weight: u64,

    pub component: usize,

    /// 1-based position in the importance ranking
    pub rank: usize,

    pub is_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub id: EntityId,
    pub name: String,
    pub count: usize,
}

/// Everything the analyzer derives from a graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphMetrics {
    pub per_entity: BTreeMap<EntityId, EntityMetrics>,

    /// Indexed by component id; members sorted by entity id
    pub components: Vec<Vec<EntityId>>,

    /// Entity ids in rank order
    pub ranking: Vec<EntityId>,

    pub most_referenced: Vec<RankedEntity>,
    pub most_referencing: Vec<RankedEntity>,
}

/// Computes degrees, weakly-connected components and importance ranking.
///
/// Every metric is a single linear pass over the graph, so analysis always
/// terminates. All orderings use the entity id as the final sort key.
#[derive(Debug, Default, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

#[derive(Default, Clone, Copy)]
struct Degrees {
    in_degree: usize,
    out_degree: usize,
    in_weight: u64,
    out_weight: u64,
}

impl Degrees {
    fn total(&self) -> usize {
        self.in_degree + self.out_degree
    }
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, graph: &SolutionGraph) -> GraphMetrics {
        let g = &graph.graph;
        let id_of = move |idx: NodeIndex| &g[idx].id;

        let mut order: Vec<NodeIndex> = g.node_indices().collect();
        order.sort_by(|a, b| id_of(*a).cmp(id_of(*b)));

        let degrees = self.degrees(graph);
        let (component_of, components) = self.components(graph, &order);

        let mut ranking = order.clone();
        ranking.sort_by(|a, b| {
            degrees[b.index()]
                .total()
                .cmp(&degrees[a.index()].total())
                .then_with(|| id_of(*a).cmp(id_of(*b)))
        });

        let mut per_entity = BTreeMap::new();
        let mut keys_left = self.config.key_entity_limit;
        for (pos, &idx) in ranking.iter().enumerate() {
            let d = degrees[idx.index()];
            let is_key = keys_left > 0 && d.total() > 0;
            if is_key {
                keys_left -= 1;
            }
            per_entity.insert(
                id_of(idx).clone(),
                EntityMetrics {
                    in_degree: d.in_degree,
                    out_degree: d.out_degree,
                    total_degree: d.total(),
                    in_weight: d.in_weight,
                    out_weight: d.out_weight,
                    total_weight: d.in_weight + d.out_weight,
                    component: component_of[idx.index()],
                    rank: pos + 1,
                    is_key,
                },
            );
        }

        let metrics = GraphMetrics {
            most_referenced: self.top_by(graph, &order, |idx| degrees[idx.index()].in_degree),
            most_referencing: self.top_by(graph, &order, |idx| degrees[idx.index()].out_degree),
            per_entity,
            components,
            ranking: ranking.into_iter().map(|idx| id_of(idx).clone()).collect(),
        };

        log::debug!(
            "Analyzed {} entities: {} components, {} key entities",
            metrics.per_entity.len(),
            metrics.components.len(),
            metrics.per_entity.values().filter(|m| m.is_key).count()
        );

        metrics
    }

    fn degrees(&self, graph: &SolutionGraph) -> Vec<Degrees> {
        let g = &graph.graph;
        let mut degrees = vec![Degrees::default(); g.node_count()];
        for edge in g.edge_references() {
            let weight = u64::from(edge.weight().multiplicity);
            let source = &mut degrees[edge.source().index()];
            source.out_degree += 1;
            source.out_weight += weight;
            let target = &mut degrees[edge.target().index()];
            target.in_degree += 1;
            target.in_weight += weight;
        }
        degrees
    }

    /// BFS over the undirected view, seeded in id order so numbering is stable
    fn components(
        &self,
        graph: &SolutionGraph,
        order: &[NodeIndex],
    ) -> (Vec<usize>, Vec<Vec<EntityId>>) {
        let g = &graph.graph;
        let mut component_of: Vec<Option<usize>> = vec![None; g.node_count()];
        let mut components = Vec::new();
        let mut queue = VecDeque::new();

        for &start in order {
            if component_of[start.index()].is_some() {
                continue;
            }
            let component = components.len();
            component_of[start.index()] = Some(component);
            queue.push_back(start);

            let mut members = Vec::new();
            while let Some(current) = queue.pop_front() {
                members.push(g[current].id.clone());
                for next in g.neighbors_undirected(current) {
                    if component_of[next.index()].is_none() {
                        component_of[next.index()] = Some(component);
                        queue.push_back(next);
                    }
                }
            }
            members.sort();
            components.push(members);
        }

        let component_of = component_of
            .into_iter()
            .map(|c| c.unwrap_or_default())
            .collect();
        (component_of, components)
    }

    fn top_by(
        &self,
        graph: &SolutionGraph,
        order: &[NodeIndex],
        count: impl Fn(NodeIndex) -> usize,
    ) -> Vec<RankedEntity> {
        let mut candidates: Vec<(usize, NodeIndex)> = order
            .iter()
            .map(|&idx| (count(idx), idx))
            .filter(|(c, _)| *c > 0)
            .collect();
        // `order` is already sorted by id, and the sort is stable
        candidates.sort_by_key(|(c, _)| Reverse(*c));
        candidates
            .into_iter()
            .take(self.config.top_limit)
            .map(|(count, idx)| {
                let entity = &graph.graph[idx];
                RankedEntity {
                    id: entity.id.clone(),
                    name: entity.display_name.clone(),
                    count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::normalizer::Normalizer;
    use pretty_assertions::assert_eq;
    use solmap_protocol::{EntityKind, RawEntityRecord, RawReferenceRecord, SolutionSnapshot};

    fn graph_of(ids: &[&str], edges: &[(&str, &str, &str)]) -> SolutionGraph {
        let mut snapshot = SolutionSnapshot::new(None);
        for id in ids {
            snapshot
                .entities
                .push(RawEntityRecord::new(EntityKind::Form, format!("Form {id}")).raw_id(*id));
        }
        for (s, t, k) in edges {
            snapshot
                .references
                .push(RawReferenceRecord::new(*s, *t, *k));
        }
        let normalized = Normalizer::new().normalize(&snapshot).unwrap();
        GraphBuilder::new().build(&normalized).unwrap()
    }

    #[test]
    fn degrees_are_consistent() {
        let graph = graph_of(
            &["a", "b", "c"],
            &[
                ("a", "b", "LOOKUP"),
                ("a", "b", "REFERENCE"),
                ("b", "c", "LOOKUP"),
                ("c", "c", "MANUAL_ACTION"),
            ],
        );
        let metrics = Analyzer::default().analyze(&graph);

        let out_sum: usize = metrics.per_entity.values().map(|m| m.out_degree).sum();
        assert_eq!(out_sum, graph.edge_count());
        for m in metrics.per_entity.values() {
            assert_eq!(m.in_degree + m.out_degree, m.total_degree);
        }
        let c = &metrics.per_entity["c"];
        assert_eq!((c.in_degree, c.out_degree), (2, 1));
    }

    #[test]
    fn weighted_degrees_follow_multiplicity() {
        let graph = graph_of(
            &["a", "b"],
            &[("a", "b", "LOOKUP"), ("a", "b", "LOOKUP"), ("a", "b", "LOOKUP")],
        );
        let metrics = Analyzer::default().analyze(&graph);
        let b = &metrics.per_entity["b"];
        assert_eq!(b.in_degree, 1);
        assert_eq!(b.in_weight, 3);
        assert_eq!(b.total_weight, 3);
    }

    #[test]
    fn components_are_numbered_by_smallest_member() {
        let graph = graph_of(
            &["z", "m", "a", "q", "b"],
            &[("z", "a", "LOOKUP"), ("q", "m", "LOOKUP")],
        );
        let metrics = Analyzer::default().analyze(&graph);

        assert_eq!(
            metrics.components,
            vec![
                vec![EntityId::new("a"), EntityId::new("z")],
                vec![EntityId::new("b")],
                vec![EntityId::new("m"), EntityId::new("q")],
            ]
        );
        assert_eq!(metrics.per_entity["z"].component, 0);
        assert_eq!(metrics.per_entity["q"].component, 2);
    }

    #[test]
    fn ranking_breaks_ties_by_id_and_puts_isolated_last() {
        let graph = graph_of(
            &["hub", "x", "y", "alone"],
            &[("x", "hub", "LOOKUP"), ("y", "hub", "LOOKUP")],
        );
        let metrics = Analyzer::new(AnalyzerConfig {
            key_entity_limit: 2,
            top_limit: 5,
        })
        .analyze(&graph);

        let ranking: Vec<&str> = metrics.ranking.iter().map(EntityId::as_str).collect();
        assert_eq!(ranking, vec!["hub", "x", "y", "alone"]);
        assert_eq!(metrics.per_entity["hub"].rank, 1);
        assert!(metrics.per_entity["x"].is_key);
        assert!(!metrics.per_entity["y"].is_key);
        assert!(!metrics.per_entity["alone"].is_key);
        assert_eq!(metrics.per_entity["alone"].total_degree, 0);

        assert_eq!(metrics.most_referenced.len(), 1);
        assert_eq!(metrics.most_referenced[0].count, 2);
        let referencing: Vec<&str> = metrics
            .most_referencing
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(referencing, vec!["x", "y"]);
    }

    #[test]
    fn empty_graph_has_no_components() {
        let metrics = Analyzer::default().analyze(&SolutionGraph::default());
        assert!(metrics.components.is_empty());
        assert!(metrics.ranking.is_empty());
    }
}
