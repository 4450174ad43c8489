use crate::error::{GraphError, Result, Stage};
use crate::types::{
    AnalysisWarning, Entity, EntityId, MissingEndpoint, Reference, ReferenceKey, RelationshipKind,
};
use petgraph::unionfind::UnionFind;
use solmap_protocol::{RawEntityRecord, RawReferenceRecord, SolutionSnapshot};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Entities and references after alias resolution, ready for graph assembly
#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    pub container_id: Option<String>,

    /// Sorted by id
    pub entities: Vec<Entity>,

    /// Sorted by `(source, target, kind)`
    pub references: Vec<Reference>,

    pub warnings: Vec<AnalysisWarning>,
}

impl NormalizedSnapshot {
    pub fn dangling_count(&self) -> usize {
        self.warnings.iter().filter(|w| w.is_dangling()).count()
    }
}

/// Interned raw identifiers, indexed in order of first appearance
#[derive(Default)]
struct RawIdTable {
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl RawIdTable {
    fn intern(&mut self, raw: &str) -> usize {
        if let Some(&idx) = self.index.get(raw) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(raw.to_string());
        self.index.insert(raw.to_string(), idx);
        idx
    }

    fn get(&self, raw: &str) -> Option<usize> {
        self.index.get(raw).copied()
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Resolves raw platform identifiers into normalized entity ids.
///
/// Identifiers that appear together on one entity record are unioned; each
/// resulting class becomes a single entity whose id is the lexicographically
/// smallest raw id in the class.
#[derive(Debug, Default, Clone, Copy)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, snapshot: &SolutionSnapshot) -> Result<NormalizedSnapshot> {
        let mut table = RawIdTable::default();
        let mut record_ids = Vec::with_capacity(snapshot.entities.len());

        for (pos, record) in snapshot.entities.iter().enumerate() {
            let ids = record_raw_ids(record);
            if ids.is_empty() {
                return Err(GraphError::integrity(
                    Stage::Normalize,
                    format!("entities[{pos}]"),
                    format!(
                        "entity record {:?} has no raw identifier",
                        record.display_name
                    ),
                ));
            }
            record_ids.push(ids.iter().map(|id| table.intern(id)).collect::<Vec<_>>());
        }

        let resolved = resolve_classes(&table, &record_ids);
        let entities = merge_entities(&snapshot.entities, &record_ids, &resolved, &table)?;

        let mut warnings = Vec::new();
        if entities.is_empty() {
            log::warn!("Snapshot contains no entities");
            warnings.push(AnalysisWarning::EmptyInput);
        }

        let references =
            merge_references(&snapshot.references, &table, &resolved, &mut warnings)?;

        let normalized = NormalizedSnapshot {
            container_id: snapshot.container_id.clone(),
            entities: entities.into_values().collect(),
            references: references.into_values().collect(),
            warnings,
        };

        log::info!(
            "Normalized {} entity records into {} entities, {} reference records into {} references ({} dangling)",
            snapshot.entities.len(),
            normalized.entities.len(),
            snapshot.references.len(),
            normalized.references.len(),
            normalized.dangling_count()
        );

        Ok(normalized)
    }
}

fn record_raw_ids(record: &RawEntityRecord) -> Vec<&str> {
    record
        .raw_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Union ids sharing a record, then map every interned id to its class id
fn resolve_classes(table: &RawIdTable, record_ids: &[Vec<usize>]) -> Vec<EntityId> {
    let mut classes = UnionFind::<usize>::new(table.len());
    for ids in record_ids {
        if let Some((&first, rest)) = ids.split_first() {
            for &other in rest {
                classes.union(first, other);
            }
        }
    }

    let roots: Vec<usize> = (0..table.len()).map(|idx| classes.find_mut(idx)).collect();

    let mut smallest: HashMap<usize, &str> = HashMap::new();
    for (idx, &root) in roots.iter().enumerate() {
        let candidate = table.ids[idx].as_str();
        smallest
            .entry(root)
            .and_modify(|current| {
                if candidate < *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    roots
        .iter()
        .map(|root| EntityId::new(smallest[root]))
        .collect()
}

fn merge_entities(
    records: &[RawEntityRecord],
    record_ids: &[Vec<usize>],
    resolved: &[EntityId],
    table: &RawIdTable,
) -> Result<BTreeMap<EntityId, Entity>> {
    let mut entities: BTreeMap<EntityId, Entity> = BTreeMap::new();

    for (record, ids) in records.iter().zip(record_ids) {
        let id = resolved[ids[0]].clone();
        let name = record.display_name.trim();

        match entities.entry(id) {
            Entry::Vacant(slot) => {
                let id = slot.key().clone();
                slot.insert(Entity {
                    id,
                    kind: record.kind,
                    display_name: name.to_string(),
                    raw_ids: ids.iter().map(|&idx| table.ids[idx].clone()).collect(),
                    aliases: non_blank(name),
                    metadata: record.metadata.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let entity = slot.get_mut();
                if entity.kind != record.kind {
                    return Err(GraphError::integrity(
                        Stage::Normalize,
                        table.ids[ids[0]].clone(),
                        format!(
                            "records sharing entity {} disagree on kind ({} vs {})",
                            entity.id, entity.kind, record.kind
                        ),
                    ));
                }
                entity
                    .raw_ids
                    .extend(ids.iter().map(|&idx| table.ids[idx].clone()));
                entity.aliases.extend(non_blank(name));
                if entity.display_name.is_empty() {
                    entity.display_name = name.to_string();
                }
                for (key, value) in &record.metadata {
                    entity
                        .metadata
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
    }

    for entity in entities.values_mut() {
        if entity.display_name.is_empty() {
            entity.display_name = entity.id.to_string();
        }
    }

    Ok(entities)
}

fn non_blank(name: &str) -> BTreeSet<String> {
    if name.is_empty() {
        BTreeSet::new()
    } else {
        BTreeSet::from([name.to_string()])
    }
}

fn merge_references(
    records: &[RawReferenceRecord],
    table: &RawIdTable,
    resolved: &[EntityId],
    warnings: &mut Vec<AnalysisWarning>,
) -> Result<BTreeMap<ReferenceKey, Reference>> {
    let mut references: BTreeMap<ReferenceKey, Reference> = BTreeMap::new();

    for (pos, record) in records.iter().enumerate() {
        let source_raw = record.source_raw_id.trim();
        let target_raw = record.target_raw_id.trim();
        if source_raw.is_empty() || target_raw.is_empty() || record.kind.trim().is_empty() {
            return Err(GraphError::integrity(
                Stage::Normalize,
                format!("references[{pos}]"),
                "reference record is missing an endpoint or kind",
            ));
        }

        let source = table.get(source_raw).map(|idx| &resolved[idx]);
        let target = table.get(target_raw).map(|idx| &resolved[idx]);

        let (source, target) = match (source, target) {
            (Some(source), Some(target)) => (source.clone(), target.clone()),
            (source, target) => {
                let missing = match (source, target) {
                    (None, None) => MissingEndpoint::Both,
                    (None, Some(_)) => MissingEndpoint::Source,
                    _ => MissingEndpoint::Target,
                };
                log::warn!(
                    "Dropping dangling {} reference {source_raw} -> {target_raw} (missing {missing:?})",
                    record.kind
                );
                warnings.push(AnalysisWarning::DanglingReference {
                    source_raw_id: source_raw.to_string(),
                    target_raw_id: target_raw.to_string(),
                    kind: record.kind.clone(),
                    missing,
                });
                continue;
            }
        };

        let kind = RelationshipKind::new(record.kind.clone());
        match references.entry((source.clone(), target.clone(), kind.clone())) {
            Entry::Vacant(slot) => {
                slot.insert(Reference {
                    source,
                    target,
                    kind,
                    multiplicity: 1,
                    metadata: record.metadata.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let reference = slot.get_mut();
                reference.multiplicity += 1;
                for (key, value) in &record.metadata {
                    reference
                        .metadata
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
    }

    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use solmap_protocol::EntityKind;

    fn form(id: &str, name: &str) -> RawEntityRecord {
        RawEntityRecord::new(EntityKind::Form, name).raw_id(id)
    }

    fn snapshot(
        entities: Vec<RawEntityRecord>,
        references: Vec<RawReferenceRecord>,
    ) -> SolutionSnapshot {
        SolutionSnapshot {
            entities,
            references,
            ..SolutionSnapshot::new(Some("room-1".to_string()))
        }
    }

    #[test]
    fn shared_raw_id_collapses_records() {
        let input = snapshot(
            vec![form("265", "Ticket"), form("265", "Ticket (v2)")],
            Vec::new(),
        );
        let out = Normalizer::new().normalize(&input).unwrap();

        assert_eq!(out.entities.len(), 1);
        let entity = &out.entities[0];
        assert_eq!(entity.id.as_str(), "265");
        assert_eq!(entity.display_name, "Ticket");
        assert!(entity.raw_ids.contains("265"));
        assert_eq!(
            entity.aliases.iter().cloned().collect::<Vec<_>>(),
            vec!["Ticket".to_string(), "Ticket (v2)".to_string()]
        );
    }

    #[test]
    fn aliases_chain_transitively() {
        let input = snapshot(
            vec![
                RawEntityRecord::new(EntityKind::Form, "A").raw_id("f-9").raw_id("12"),
                RawEntityRecord::new(EntityKind::Form, "A").raw_id("12").raw_id("x"),
                form("7", "Other"),
            ],
            vec![RawReferenceRecord::new("x", "7", "LOOKUP")],
        );
        let out = Normalizer::new().normalize(&input).unwrap();

        assert_eq!(out.entities.len(), 2);
        let merged = out.entities.iter().find(|e| e.raw_ids.len() == 3).unwrap();
        assert_eq!(merged.id.as_str(), "12");
        assert_eq!(out.references[0].source.as_str(), "12");
    }

    #[test]
    fn dangling_target_is_dropped_and_counted() {
        let input = snapshot(
            vec![form("1", "Incident")],
            vec![RawReferenceRecord::new("1", "999", "REFERENCE")],
        );
        let out = Normalizer::new().normalize(&input).unwrap();

        assert!(out.references.is_empty());
        assert_eq!(out.dangling_count(), 1);
        assert_eq!(
            out.warnings[0],
            AnalysisWarning::DanglingReference {
                source_raw_id: "1".to_string(),
                target_raw_id: "999".to_string(),
                kind: "REFERENCE".to_string(),
                missing: MissingEndpoint::Target,
            }
        );
    }

    #[test]
    fn reference_with_both_endpoints_missing_counts_once() {
        let input = snapshot(
            vec![form("1", "Incident")],
            vec![RawReferenceRecord::new("404", "405", "LOOKUP")],
        );
        let out = Normalizer::new().normalize(&input).unwrap();
        assert_eq!(out.dangling_count(), 1);
    }

    #[test]
    fn parallel_references_merge_with_multiplicity() {
        let input = snapshot(
            vec![form("1", "A"), form("2", "B")],
            vec![
                RawReferenceRecord::new("1", "2", "LOOKUP").meta("field_name", "Site"),
                RawReferenceRecord::new("1", "2", "LOOKUP").meta("field_name", "Backup site"),
                RawReferenceRecord::new("1", "2", "REFERENCE"),
            ],
        );
        let out = Normalizer::new().normalize(&input).unwrap();

        assert_eq!(out.references.len(), 2);
        let lookup = out
            .references
            .iter()
            .find(|r| r.kind.as_str() == "LOOKUP")
            .unwrap();
        assert_eq!(lookup.multiplicity, 2);
        assert_eq!(lookup.metadata["field_name"], "Site");
    }

    #[test]
    fn self_reference_and_unknown_kind_survive() {
        let input = snapshot(
            vec![form("1", "Loop")],
            vec![RawReferenceRecord::new("1", "1", "on_custom Trigger")],
        );
        let out = Normalizer::new().normalize(&input).unwrap();

        assert_eq!(out.references.len(), 1);
        assert!(out.references[0].is_self_reference());
        assert_eq!(out.references[0].kind.as_str(), "on_custom Trigger");
        assert!(!out.references[0].kind.is_known());
    }

    #[test]
    fn record_without_ids_is_rejected() {
        let input = snapshot(
            vec![RawEntityRecord::new(EntityKind::Form, "Nameless").raw_id("  ")],
            Vec::new(),
        );
        let err = Normalizer::new().normalize(&input).unwrap_err();
        assert!(matches!(
            err,
            GraphError::DataIntegrity {
                stage: Stage::Normalize,
                ..
            }
        ));
    }

    #[test]
    fn conflicting_kinds_are_rejected() {
        let input = snapshot(
            vec![
                form("5", "Form five"),
                RawEntityRecord::new(EntityKind::Workflow, "Flow five").raw_id("5"),
            ],
            Vec::new(),
        );
        match Normalizer::new().normalize(&input) {
            Err(GraphError::DataIntegrity { raw_id, .. }) => assert_eq!(raw_id, "5"),
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn blank_reference_kind_is_rejected() {
        let input = snapshot(
            vec![form("1", "A")],
            vec![RawReferenceRecord::new("1", "1", " ")],
        );
        assert!(Normalizer::new().normalize(&input).is_err());
    }

    #[test]
    fn blank_names_fall_back_to_id() {
        let input = snapshot(vec![form(" 42 ", "  ")], Vec::new());
        let out = Normalizer::new().normalize(&input).unwrap();
        assert_eq!(out.entities[0].id.as_str(), "42");
        assert_eq!(out.entities[0].display_name, "42");
        assert!(out.entities[0].aliases.is_empty());
    }

    #[test]
    fn empty_snapshot_warns_without_failing() {
        let out = Normalizer::new()
            .normalize(&SolutionSnapshot::default())
            .unwrap();
        assert!(out.entities.is_empty());
        assert_eq!(out.warnings, vec![AnalysisWarning::EmptyInput]);
    }
}
