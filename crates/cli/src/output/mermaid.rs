use solmap_graph::{AnalysisResult, DiagramNode, EntityId, EntityKind};
use std::collections::{BTreeMap, BTreeSet};

/// Top-down flowchart: one node per entity, one labeled arrow per reference
pub fn render_mermaid(result: &AnalysisResult) -> String {
    let diagram = result.diagram();
    let ids = node_ids(&diagram.nodes);
    let mut lines = vec!["graph TD".to_string()];

    for node in &diagram.nodes {
        let (open, close) = match node.kind {
            EntityKind::Workflow => ("[[", "]]"),
            EntityKind::CustomAction => ("{{", "}}"),
            EntityKind::Form => ("[", "]"),
        };
        lines.push(format!(
            "    {}{open}\"{}\"{close}",
            ids[&node.id],
            mermaid_label(&node.label)
        ));
    }

    for edge in &diagram.edges {
        let (Some(source), Some(target)) = (ids.get(&edge.source), ids.get(&edge.target)) else {
            continue;
        };
        let mut label = mermaid_label(edge.label.as_str()).replace('|', "/");
        if edge.multiplicity > 1 {
            label.push_str(&format!(" x{}", edge.multiplicity));
        }
        lines.push(format!("    {source} -->|{label}| {target}"));
    }

    let external: Vec<&str> = diagram
        .nodes
        .iter()
        .filter(|n| n.external)
        .map(|n| ids[&n.id].as_str())
        .collect();
    let key: Vec<&str> = diagram
        .nodes
        .iter()
        .filter(|n| n.is_key)
        .map(|n| ids[&n.id].as_str())
        .collect();
    if !external.is_empty() {
        lines.push("    classDef external stroke-dasharray: 5 5,fill:#fff3e0".to_string());
        lines.push(format!("    class {} external", external.join(",")));
    }
    if !key.is_empty() {
        lines.push("    classDef key stroke-width:3px".to_string());
        lines.push(format!("    class {} key", key.join(",")));
    }

    lines.join("\n") + "\n"
}

/// Mermaid-safe node id per entity; sanitized collisions get a numeric suffix
fn node_ids(nodes: &[DiagramNode]) -> BTreeMap<EntityId, String> {
    let mut taken = BTreeSet::new();
    let mut out = BTreeMap::new();
    for node in nodes {
        let base = mermaid_safe(node.id.as_str());
        let mut candidate = base.clone();
        let mut n = 1;
        while !taken.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{base}_{n}");
        }
        out.insert(node.id.clone(), candidate);
    }
    out
}

fn mermaid_safe(id: &str) -> String {
    let body: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("n_{body}")
}

fn mermaid_label(s: &str) -> String {
    s.replace('"', "'").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use solmap_graph::{analyze, AnalysisOptions, SolutionSnapshot};
    use solmap_protocol::{RawEntityRecord, RawReferenceRecord};

    fn result() -> AnalysisResult {
        let mut snapshot = SolutionSnapshot::new(None);
        snapshot.entities = vec![
            RawEntityRecord::new(EntityKind::Form, "The \"Main\" Form").raw_id("f-1"),
            RawEntityRecord::new(EntityKind::Form, "Other").raw_id("f_1"),
            RawEntityRecord::new(EntityKind::Workflow, "Flow").raw_id("wf:1"),
            RawEntityRecord::new(EntityKind::Form, "Shared")
                .raw_id("77")
                .meta("external", true),
        ];
        snapshot.references = vec![
            RawReferenceRecord::new("f-1", "wf:1", "WORKFLOW"),
            RawReferenceRecord::new("f-1", "77", "LOOKUP"),
            RawReferenceRecord::new("f-1", "77", "LOOKUP"),
        ];
        analyze(&snapshot, &AnalysisOptions::default()).unwrap()
    }

    #[test]
    fn escapes_quotes_and_sanitizes_ids() {
        let text = render_mermaid(&result());

        assert!(text.starts_with("graph TD\n"));
        assert!(text.contains(r#"n_f_1["The 'Main' Form"]"#));
        assert!(text.contains(r#"n_f_1_2["Other"]"#));
        assert!(text.contains(r#"n_wf_1[["Flow"]]"#));
        assert!(!text.contains("\\\""));
        assert!(text.contains("n_f_1 -->|WORKFLOW| n_wf_1"));
        assert!(text.contains("n_f_1 -->|LOOKUP x2| n_77"));
        assert!(text.contains("class n_77 external"));
    }

    #[test]
    fn empty_result_is_just_the_header() {
        let empty = analyze(&SolutionSnapshot::default(), &AnalysisOptions::default()).unwrap();
        assert_eq!(render_mermaid(&empty), "graph TD\n");
    }
}
