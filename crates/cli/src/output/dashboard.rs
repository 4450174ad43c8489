use anyhow::Result;
use pulldown_cmark::{html, Event, Options, Parser};
use serde_json::{json, Value};
use solmap_graph::{AnalysisResult, EntityKind};

const LABEL_WIDTH: usize = 25;
const LABEL_LINES: usize = 3;

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Word-wrapped node label, at most three lines
pub fn wrap_label(name: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in name.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= LABEL_WIDTH {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    if lines.len() > LABEL_LINES {
        lines.truncate(LABEL_LINES);
        let last: String = lines[LABEL_LINES - 1]
            .chars()
            .take(LABEL_WIDTH - 3)
            .collect();
        lines[LABEL_LINES - 1] = format!("{last}...");
    }
    lines.join("\n")
}

/// Markdown to HTML; raw HTML in the source is shown as text, never injected
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// JSON safe to inline inside a `<script>` element
fn script_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn node_style(kind: EntityKind, external: bool) -> (&'static str, &'static str, u32) {
    match (kind, external) {
        (EntityKind::Form, true) => ("#ff9800", "dot", 30),
        (EntityKind::Form, false) => ("#4fc3f7", "dot", 30),
        (EntityKind::Workflow, _) => ("#ba68c8", "square", 25),
        (EntityKind::CustomAction, _) => ("#26a69a", "diamond", 22),
    }
}

fn graph_data(result: &AnalysisResult) -> (Value, Value) {
    let nodes: Vec<Value> = result
        .entities()
        .values()
        .map(|report| {
            let entity = &report.entity;
            let external = report.is_external();
            let (color, shape, size) = node_style(entity.kind, external);
            let size = if report.metrics.is_key { size + 10 } else { size };
            let mut title = format!("{} ({})", entity.display_name, entity.kind);
            if external {
                title.push_str(" - External");
            }
            json!({
                "id": entity.id,
                "label": wrap_label(&entity.display_name),
                "title": title,
                "color": color,
                "shape": shape,
                "size": size,
                "font": { "vadjust": 20 },
                "kind": entity.kind,
            })
        })
        .collect();

    let edges: Vec<Value> = result
        .references()
        .iter()
        .map(|reference| {
            let field = reference
                .metadata
                .get("field_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let kind = reference.kind.as_str();
            let (label, color, dashes) = if reference.is_action() {
                ("ACT".to_string(), "#ff9800", true)
            } else {
                (kind.chars().take(3).collect::<String>(), "#2196f3", false)
            };
            let mut title = if field.is_empty() {
                kind.to_string()
            } else {
                format!("{kind}: {field}")
            };
            if reference.multiplicity > 1 {
                title.push_str(&format!(" (x{})", reference.multiplicity));
            }
            json!({
                "from": reference.source,
                "to": reference.target,
                "label": label,
                "title": title,
                "arrows": "to",
                "dashes": dashes,
                "color": { "color": color },
                "width": 1 + reference.multiplicity.min(4),
            })
        })
        .collect();

    (Value::Array(nodes), Value::Array(edges))
}

fn table_rows(result: &AnalysisResult) -> String {
    let mut rows = String::new();
    for row in result.ranked_table(None) {
        let external = if row.external {
            "<span class='badge external'>External</span>"
        } else {
            ""
        };
        let key = if row.is_key { " class='key'" } else { "" };
        rows.push_str(&format!(
            "<tr{key}><td>{}</td><td>{}</td><td><span class='badge {kind}'>{kind}</span>{external}</td>\
             <td>{}</td><td>{}</td><td>{}</td><td class='id'>{}</td></tr>\n",
            row.rank,
            html_escape(&row.name),
            row.out_degree,
            row.in_degree,
            row.component,
            html_escape(row.id.as_str()),
            kind = row.kind,
        ));
    }
    rows
}

fn stat_cards(result: &AnalysisResult) -> String {
    let stats = result.aggregates();
    let count = |kind: EntityKind| stats.entities_by_kind.get(&kind).copied().unwrap_or(0);
    [
        ("Forms", count(EntityKind::Form)),
        ("Workflows", count(EntityKind::Workflow)),
        ("Actions", count(EntityKind::CustomAction)),
        ("Relationships", stats.reference_count),
        ("Components", stats.component_count),
        ("Isolated", stats.isolated_entities),
    ]
    .iter()
    .map(|(label, value)| {
        format!("<div class='card'><div class='value'>{value}</div><div class='label'>{label}</div></div>")
    })
    .collect::<Vec<_>>()
    .join("")
}

/// Self-contained page: vis.js graph, entity table and the Markdown summary
pub fn render_dashboard(result: &AnalysisResult, summary_markdown: &str) -> Result<String> {
    let (nodes, edges) = graph_data(result);
    let container = html_escape(result.container_id().unwrap_or("(unknown)"));

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Solution Map - Room {container}</title>
<script src="https://unpkg.com/vis-network/standalone/umd/vis-network.min.js"></script>
<style>
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f5f5f5; color: #333; }}
.header {{ background: linear-gradient(135deg, #1a237e 0%, #283593 100%); color: white; padding: 12px 20px; display: flex; justify-content: space-between; align-items: center; }}
.header h1 {{ font-size: 18px; font-weight: 500; }}
.header .subtitle {{ opacity: 0.8; font-size: 14px; }}
.tabs {{ display: flex; background: white; border-bottom: 1px solid #ddd; }}
.tab {{ padding: 10px 20px; cursor: pointer; border-bottom: 2px solid transparent; }}
.tab.active {{ border-bottom-color: #283593; color: #283593; font-weight: 500; }}
.panel {{ display: none; padding: 16px; }}
.panel.active {{ display: block; }}
.cards {{ display: flex; gap: 12px; margin-bottom: 12px; flex-wrap: wrap; }}
.card {{ background: white; border-radius: 6px; padding: 10px 16px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }}
.card .value {{ font-size: 22px; font-weight: 600; }}
.card .label {{ font-size: 12px; color: #777; }}
#graph {{ height: calc(100vh - 200px); background: white; border-radius: 6px; }}
table {{ width: 100%; border-collapse: collapse; background: white; }}
th, td {{ padding: 8px 10px; border-bottom: 1px solid #eee; text-align: left; font-size: 14px; }}
tr.key td {{ font-weight: 600; }}
td.id {{ color: #999; font-size: 12px; }}
.badge {{ padding: 2px 6px; border-radius: 4px; font-size: 11px; margin-right: 4px; background: #e3f2fd; }}
.badge.workflow {{ background: #f3e5f5; }}
.badge.custom_action {{ background: #e0f2f1; }}
.badge.external {{ background: #fff3e0; }}
.summary {{ background: white; padding: 24px; border-radius: 6px; max-width: 960px; line-height: 1.6; }}
.summary h1, .summary h2, .summary h3 {{ margin: 16px 0 8px; }}
.summary ul, .summary ol {{ margin-left: 24px; }}
</style>
</head>
<body>
<div class="header">
  <h1>Solution Map</h1>
  <div class="subtitle">Room {container}</div>
</div>
<div class="tabs">
  <div class="tab active" data-panel="graph-panel">Graph</div>
  <div class="tab" data-panel="table-panel">Entities</div>
  <div class="tab" data-panel="summary-panel">Summary</div>
</div>
<div id="graph-panel" class="panel active">
  <div class="cards">{cards}</div>
  <div id="graph"></div>
</div>
<div id="table-panel" class="panel">
  <table>
    <thead><tr><th>Rank</th><th>Name</th><th>Type</th><th>Refs Out</th><th>Refs In</th><th>Component</th><th>ID</th></tr></thead>
    <tbody>
{rows}    </tbody>
  </table>
</div>
<div id="summary-panel" class="panel">
  <div class="summary">
{summary}  </div>
</div>
<script>
const nodes = new vis.DataSet({nodes});
const edges = new vis.DataSet({edges});
const network = new vis.Network(document.getElementById("graph"), {{ nodes, edges }}, {{
  physics: {{ solver: "forceAtlas2Based", stabilization: {{ iterations: 200 }} }},
  edges: {{ smooth: {{ type: "dynamic" }}, font: {{ size: 10, align: "middle" }} }},
  interaction: {{ hover: true, tooltipDelay: 100 }}
}});
document.querySelectorAll(".tab").forEach((tab) => {{
  tab.addEventListener("click", () => {{
    document.querySelectorAll(".tab, .panel").forEach((el) => el.classList.remove("active"));
    tab.classList.add("active");
    document.getElementById(tab.dataset.panel).classList.add("active");
    if (tab.dataset.panel === "graph-panel") network.fit();
  }});
}});
</script>
</body>
</html>
"#,
        cards = stat_cards(result),
        rows = table_rows(result),
        summary = markdown_to_html(summary_markdown),
        nodes = script_json(&nodes)?,
        edges = script_json(&edges)?,
    ))
}
