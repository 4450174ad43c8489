use solmap_graph::{AnalysisResult, EntityKind, EntityReport};

const PROMPT_ENTITY_LIMIT: usize = 30;
const PROMPT_ACTION_LIMIT: usize = 20;
const PROMPT_NEIGHBOR_LIMIT: usize = 3;

fn cell(s: &str) -> String {
    s.replace('|', "\\|")
}

fn entity_line(report: &EntityReport) -> String {
    let mut line = format!("- {}", report.entity.display_name);
    if report.is_external() {
        line.push_str(" (external)");
    }
    line
}

/// Deterministic summary used when no AI summary is available
pub fn basic_markdown(result: &AnalysisResult) -> String {
    let stats = result.aggregates();
    let kind_count = |kind: EntityKind| stats.entities_by_kind.get(&kind).copied().unwrap_or(0);

    let mut lines = vec![
        "# Solution Map".to_string(),
        String::new(),
        format!(
            "**Container ID:** {}",
            result.container_id().unwrap_or("(unknown)")
        ),
        String::new(),
        "## Statistics".to_string(),
        String::new(),
        format!("- **Forms:** {}", kind_count(EntityKind::Form)),
        format!("- **Workflows:** {}", kind_count(EntityKind::Workflow)),
        format!("- **Custom Actions:** {}", kind_count(EntityKind::CustomAction)),
        format!("- **Relationships:** {}", stats.reference_count),
        format!("- **Field Relationships:** {}", stats.field_references),
        format!("- **Action Relationships:** {}", stats.action_references),
        format!("- **Connected Components:** {}", stats.component_count),
        format!("- **Isolated Entities:** {}", stats.isolated_entities),
    ];
    if stats.dangling_references > 0 {
        lines.push(format!(
            "- **Unresolved References:** {}",
            stats.dangling_references
        ));
    }

    let key_rows: Vec<_> = result
        .ranked_table(None)
        .into_iter()
        .filter(|row| row.is_key)
        .collect();
    if !key_rows.is_empty() {
        lines.extend([
            String::new(),
            "## Key Entities".to_string(),
            String::new(),
            "| Rank | Name | Kind | In | Out |".to_string(),
            "|---:|---|---|---:|---:|".to_string(),
        ]);
        for row in key_rows {
            lines.push(format!(
                "| {} | {} | {} | {} | {} |",
                row.rank,
                cell(&row.name),
                row.kind,
                row.in_degree,
                row.out_degree
            ));
        }
    }

    for (kind, title) in [
        (EntityKind::Form, "Forms"),
        (EntityKind::Workflow, "Workflows"),
        (EntityKind::CustomAction, "Custom Actions"),
    ] {
        let members = result.entities_of_kind(kind);
        if members.is_empty() {
            continue;
        }
        lines.extend([String::new(), format!("## {title}"), String::new()]);
        lines.extend(members.into_iter().map(entity_line));
    }

    if !stats.most_referenced.is_empty() {
        lines.extend([
            String::new(),
            "## Most Referenced".to_string(),
            String::new(),
        ]);
        for item in &stats.most_referenced {
            lines.push(format!("- {} ({} references)", item.name, item.count));
        }
    }

    lines.join("\n") + "\n"
}

/// Prompt asking a language model for a readable explanation of the solution
pub fn summary_prompt(result: &AnalysisResult) -> String {
    let stats = result.aggregates();
    let kind_count = |kind: EntityKind| stats.entities_by_kind.get(&kind).copied().unwrap_or(0);

    let names = |ids: Vec<&str>| -> String {
        ids.into_iter()
            .take(PROMPT_NEIGHBOR_LIMIT)
            .map(|id| {
                result
                    .entity(id)
                    .map(|r| r.entity.display_name.as_str())
                    .unwrap_or(id)
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    let forms = result.entities_of_kind(EntityKind::Form);
    let mut form_lines = Vec::new();
    for report in forms.iter().take(PROMPT_ENTITY_LIMIT) {
        let id = report.entity.id.as_str();
        let outgoing: Vec<&str> = result
            .references()
            .iter()
            .filter(|r| r.source.as_str() == id)
            .map(|r| r.target.as_str())
            .collect();
        let incoming: Vec<&str> = result
            .references()
            .iter()
            .filter(|r| r.target.as_str() == id)
            .map(|r| r.source.as_str())
            .collect();

        let mut line = entity_line(report);
        if !outgoing.is_empty() {
            line.push_str(&format!(" → references: {}", names(outgoing)));
        }
        if !incoming.is_empty() {
            line.push_str(&format!(" ← referenced by: {}", names(incoming)));
        }
        form_lines.push(line);
    }
    if forms.len() > PROMPT_ENTITY_LIMIT {
        form_lines.push("... and more".to_string());
    }

    let workflow_lines: Vec<String> = result
        .entities_of_kind(EntityKind::Workflow)
        .into_iter()
        .map(entity_line)
        .collect();

    let action_refs: Vec<_> = result.references().iter().filter(|r| r.is_action()).collect();
    let mut action_lines: Vec<String> = action_refs
        .iter()
        .take(PROMPT_ACTION_LIMIT)
        .map(|r| {
            format!(
                "- {} → {} (type: {})",
                result.display_name(&r.source),
                result.display_name(&r.target),
                r.kind
            )
        })
        .collect();
    if action_lines.is_empty() {
        action_lines.push("No custom actions found".to_string());
    } else if action_refs.len() > PROMPT_ACTION_LIMIT {
        action_lines.push("... and more".to_string());
    }

    let central: Vec<String> = stats
        .most_referenced
        .iter()
        .map(|item| format!("- {} ({} references)", item.name, item.count))
        .collect();

    format!(
        "Analyze this Veoci solution and write a clear, professional markdown summary.
The primary goal is to help the user understand how this solution works and how its components interact.

## Solution Data

**Container ID:** {container}

**Statistics:**
- Forms: {forms}
- Workflows: {workflows}
- Custom actions: {actions}
- Total relationships: {total}
- Action-based relationships: {action_refs}
- Field-based relationships: {field_refs}
- Connected components: {components}

**Forms and their relationships:**
{form_lines}

**Workflows:**
{workflow_lines}

**Custom Actions (automations that connect forms):**
{action_lines}

**Most referenced entities (central to the solution):**
{central}

## Instructions

Write a markdown document with these sections, in order:

1. **Overview** - What is this solution for? Infer the business purpose from form and workflow names.
2. **Core Components** - The central forms and the role each plays.
3. **How It Works** - How forms connect, what creates or updates entries, how workflows orchestrate the process.
4. **Automations & Actions** - What the important custom actions do and when they trigger.
5. **Supporting Components** - Utility, reporting, or secondary forms.
6. **Notes** (optional, brief) - Notable patterns or possible improvements.

Use plain language and prefer bullet points.",
        container = result.container_id().unwrap_or("(unknown)"),
        forms = kind_count(EntityKind::Form),
        workflows = kind_count(EntityKind::Workflow),
        actions = kind_count(EntityKind::CustomAction),
        total = stats.reference_count,
        action_refs = stats.action_references,
        field_refs = stats.field_references,
        components = stats.component_count,
        form_lines = form_lines.join("\n"),
        workflow_lines = workflow_lines.join("\n"),
        action_lines = action_lines.join("\n"),
        central = central.join("\n"),
    )
}
