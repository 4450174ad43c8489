use anyhow::Result;
use solmap_graph::AnalysisResult;
use solmap_protocol::serialize_json_pretty;

/// Full analysis result; `neighbors --input` reads it back
pub fn render_json(result: &AnalysisResult) -> Result<String> {
    let mut out = serialize_json_pretty(result)?;
    out.push('\n');
    Ok(out)
}
