//! Turns fetched platform payloads into raw records for the graph core.
//!
//! Form definitions carry their outgoing relationships in two places:
//!
//! - `fields`: keyed by field id. `REFERENCE`, `FORM_ENTRY` and `LOOKUP`
//!   fields point at `sourceFormId`; `WORKFLOW` fields point at
//!   `properties.processId`.
//! - `customActions`: each action becomes its own entity (raw id
//!   `action:{id}`) with an edge from the owning form and an edge to the
//!   form or process it targets.
//!
//! Form and workflow ids come from separate platform sequences, so workflow
//! raw ids carry a `workflow:` prefix to keep them apart from form ids.

use crate::fetcher::FetchedSolution;
use serde_json::Value;
use solmap_graph::kinds;
use solmap_protocol::{EntityKind, RawEntityRecord, RawReferenceRecord, SolutionSnapshot};
use std::collections::BTreeSet;

const FORM_TARGET: &str = "form";
const WORKFLOW_TARGET: &str = "workflow";

/// Identifier as the platform spells it: strings are trimmed, numbers printed
pub fn value_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ids_under(value: &Value, keys: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for key in keys {
        if let Some(id) = value.get(*key).and_then(value_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// `id` first, then `formId`
pub fn form_ids(form: &Value) -> Vec<String> {
    ids_under(form, &["id", "formId"])
}

/// `id` first, then `processId`
pub fn workflow_ids(workflow: &Value) -> Vec<String> {
    ids_under(workflow, &["id", "processId"])
}

pub fn action_raw_id(action_id: &str) -> String {
    format!("action:{action_id}")
}

pub fn workflow_raw_id(workflow_id: &str) -> String {
    format!("workflow:{workflow_id}")
}

fn name_of(value: &Value) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn is_external(value: &Value) -> bool {
    value.get("external").and_then(Value::as_bool).unwrap_or(false)
}

fn fields_of(definition: &Value) -> Vec<(String, &Value)> {
    match definition.get("fields") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let id = field
                    .get("id")
                    .and_then(value_id)
                    .unwrap_or_else(|| i.to_string());
                (id, field)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// References declared by the fields of one form definition
pub fn extract_field_references(definition: &Value) -> Vec<RawReferenceRecord> {
    let Some(source) = form_ids(definition).into_iter().next() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (field_id, field) in fields_of(definition) {
        let field_type = field
            .get("fieldType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let field_name = field
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Field {field_id}"));

        let (target, target_name, target_type) = match field_type {
            kinds::REFERENCE | kinds::FORM_ENTRY | kinds::LOOKUP => {
                let Some(target) = field.get("sourceFormId").and_then(value_id) else {
                    continue;
                };
                let name = field
                    .get("sourceForm")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (target, name, FORM_TARGET)
            }
            kinds::WORKFLOW => {
                let properties = field.get("properties");
                let Some(target) = properties
                    .and_then(|p| p.get("processId"))
                    .and_then(value_id)
                else {
                    continue;
                };
                let name = properties
                    .and_then(|p| p.get("processName"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (workflow_raw_id(&target), name, WORKFLOW_TARGET)
            }
            _ => continue,
        };

        let mut record = RawReferenceRecord::new(source.clone(), target, field_type)
            .meta("field_name", field_name)
            .meta("field_id", field_id)
            .meta("target_type", target_type)
            .meta("edge_category", "field");
        if let Some(name) = target_name {
            record = record.meta("target_name", name);
        }
        out.push(record);
    }
    out
}

/// Action kind for the form -> action edge
fn trigger_kind(action: &Value, automatic: bool) -> String {
    match action.get("triggerType").and_then(Value::as_str).map(str::trim) {
        Some(trigger) if !trigger.is_empty() => trigger.to_ascii_uppercase(),
        _ if automatic => kinds::CHILD_OBJECT_CREATED.to_string(),
        _ => kinds::MANUAL_ACTION.to_string(),
    }
}

/// Custom actions of one form definition: action entities plus their edges
pub fn extract_custom_actions(
    definition: &Value,
) -> (Vec<RawEntityRecord>, Vec<RawReferenceRecord>) {
    let mut entities = Vec::new();
    let mut references = Vec::new();

    let Some(form_id) = form_ids(definition).into_iter().next() else {
        return (entities, references);
    };
    let Some(actions) = definition.get("customActions").and_then(Value::as_array) else {
        return (entities, references);
    };

    for action in actions {
        let Some(action_id) = action.get("id").and_then(value_id) else {
            log::warn!("Skipping custom action without id on form {form_id}");
            continue;
        };
        let raw_id = action_raw_id(&action_id);
        let automatic = action
            .get("automatic")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let kind = trigger_kind(action, automatic);

        entities.push(
            RawEntityRecord::new(EntityKind::CustomAction, name_of(action))
                .raw_id(raw_id.clone())
                .meta("form_id", form_id.clone())
                .meta("trigger_type", kind.clone())
                .meta("automatic", automatic),
        );

        references.push(
            RawReferenceRecord::new(form_id.clone(), raw_id.clone(), kind.clone())
                .meta("action_id", action_id.clone())
                .meta("automatic", automatic)
                .meta("edge_category", "action"),
        );

        let form_target = action
            .get("targetFormId")
            .and_then(value_id)
            .or_else(|| action.get("targetForm").and_then(|f| f.get("id")).and_then(value_id));
        if let Some(target) = form_target {
            references.push(
                RawReferenceRecord::new(raw_id.clone(), target, kinds::ACTION_TARGET)
                    .meta("action_id", action_id.clone())
                    .meta("target_type", FORM_TARGET)
                    .meta("edge_category", "action"),
            );
        }
        if let Some(process) = action.get("targetProcessId").and_then(value_id) {
            references.push(
                RawReferenceRecord::new(
                    raw_id,
                    workflow_raw_id(&process),
                    kinds::WORKFLOW_INVOKE,
                )
                    .meta("action_id", action_id)
                    .meta("target_type", WORKFLOW_TARGET)
                    .meta("edge_category", "action"),
            );
        }
    }

    (entities, references)
}

/// Form ids targeted by any definition, in sorted order
pub fn referenced_form_ids(definitions: &[Value]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for definition in definitions {
        let field_refs = extract_field_references(definition);
        let (_, action_refs) = extract_custom_actions(definition);
        for reference in field_refs.iter().chain(action_refs.iter()) {
            let targets_form = reference
                .metadata
                .get("target_type")
                .and_then(Value::as_str)
                == Some(FORM_TARGET);
            if targets_form {
                ids.insert(reference.target_raw_id.clone());
            }
        }
    }
    ids
}

fn form_record(form: &Value, container_id: &str) -> Option<RawEntityRecord> {
    let ids = form_ids(form);
    if ids.is_empty() {
        log::warn!("Skipping form without id: {}", name_of(form));
        return None;
    }

    let container = form
        .get("containerId")
        .and_then(value_id)
        .unwrap_or_else(|| container_id.to_string());
    let mut record = RawEntityRecord::new(EntityKind::Form, name_of(form))
        .meta("container_id", container)
        .meta("external", is_external(form));
    record.raw_ids = ids;
    Some(record)
}

fn workflow_record(workflow: &Value, container_id: &str) -> Option<RawEntityRecord> {
    let ids = workflow_ids(workflow);
    if ids.is_empty() {
        log::warn!("Skipping workflow without id: {}", name_of(workflow));
        return None;
    }

    let container = workflow
        .get("containerId")
        .and_then(value_id)
        .unwrap_or_else(|| container_id.to_string());
    let mut record =
        RawEntityRecord::new(EntityKind::Workflow, name_of(workflow)).meta("container_id", container);
    record.raw_ids = ids.iter().map(|id| workflow_raw_id(id)).collect();
    Some(record)
}

/// Assemble the snapshot the graph core consumes.
///
/// Every list item and definition contributes an entity record; records of
/// the same form share raw ids and are merged downstream.
pub fn build_snapshot(fetched: &FetchedSolution) -> SolutionSnapshot {
    let container = fetched.container_id.as_str();
    let mut snapshot = SolutionSnapshot::new(Some(container.to_string()));

    snapshot.entities.extend(
        fetched
            .forms
            .iter()
            .chain(&fetched.form_definitions)
            .chain(&fetched.external_forms)
            .filter_map(|form| form_record(form, container)),
    );
    snapshot.entities.extend(
        fetched
            .workflows
            .iter()
            .filter_map(|workflow| workflow_record(workflow, container)),
    );

    for definition in &fetched.form_definitions {
        snapshot
            .references
            .extend(extract_field_references(definition));
        let (actions, action_refs) = extract_custom_actions(definition);
        snapshot.entities.extend(actions);
        snapshot.references.extend(action_refs);
    }

    log::info!(
        "Extracted snapshot: {} entity records, {} reference records",
        snapshot.entities.len(),
        snapshot.references.len()
    );
    snapshot
}
