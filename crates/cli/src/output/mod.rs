//! Renderers over a shared, read-only [`AnalysisResult`].

pub mod dashboard;
pub mod json;
pub mod markdown;
pub mod mermaid;
pub mod summary_ai;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use clap::ValueEnum;
use solmap_graph::AnalysisResult;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

use summary_ai::{GeminiConfig, GeminiSummarizer};

pub const JSON_FILE: &str = "solution_map.json";
pub const MARKDOWN_FILE: &str = "solution_map.md";
pub const MERMAID_FILE: &str = "solution_map.mmd";
pub const DASHBOARD_FILE: &str = "solution_dashboard.html";
pub const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    All,
    Json,
    Markdown,
    Mermaid,
    Html,
}

impl OutputFormat {
    fn includes(self, other: OutputFormat) -> bool {
        self == OutputFormat::All || self == other
    }
}

#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub output_dir: PathBuf,
    pub format: OutputFormat,

    /// `None` renders the basic Markdown summary
    pub ai: Option<GeminiConfig>,
}

/// Summary Markdown: AI when configured, basic otherwise or on any AI failure
pub async fn summary_markdown(result: &AnalysisResult, ai: Option<&GeminiConfig>) -> String {
    let Some(config) = ai else {
        return markdown::basic_markdown(result);
    };

    let attempt = async {
        let summarizer = GeminiSummarizer::new(config.clone())?;
        summarizer
            .summarize(&markdown::summary_prompt(result))
            .await
    };
    match attempt.await {
        Ok(text) => text,
        Err(err) => {
            log::warn!("AI summary failed, using basic summary: {err:#}");
            markdown::basic_markdown(result)
        }
    }
}

fn write_file(path: &Path, body: &str) -> Result<PathBuf> {
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Render every requested format concurrently and return the written paths
pub async fn write_outputs(result: Arc<AnalysisResult>, plan: &RenderPlan) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&plan.output_dir)
        .with_context(|| format!("Failed to create {}", plan.output_dir.display()))?;

    let format = plan.format;
    let summary = if format.includes(OutputFormat::Markdown) || format.includes(OutputFormat::Html)
    {
        Arc::new(summary_markdown(&result, plan.ai.as_ref()).await)
    } else {
        Arc::new(String::new())
    };

    let mut set: JoinSet<Result<PathBuf>> = JoinSet::new();
    let dir = plan.output_dir.clone();

    if format.includes(OutputFormat::Json) {
        let (result, path) = (result.clone(), dir.join(JSON_FILE));
        set.spawn_blocking(move || write_file(&path, &json::render_json(&result)?));
    }
    if format.includes(OutputFormat::Markdown) {
        let (summary, path) = (summary.clone(), dir.join(MARKDOWN_FILE));
        set.spawn_blocking(move || write_file(&path, &summary));
    }
    if format.includes(OutputFormat::Mermaid) {
        let (result, path) = (result.clone(), dir.join(MERMAID_FILE));
        set.spawn_blocking(move || write_file(&path, &mermaid::render_mermaid(&result)));
    }
    if format.includes(OutputFormat::Html) {
        let (result, summary, path) = (result.clone(), summary.clone(), dir.join(DASHBOARD_FILE));
        set.spawn_blocking(move || {
            write_file(&path, &dashboard::render_dashboard(&result, &summary)?)
        });
    }

    let mut written = Vec::new();
    while let Some(joined) = set.join_next().await {
        let path = joined.map_err(|err| anyhow!("Renderer task failed: {err}"))??;
        log::info!("Wrote {}", path.display());
        written.push(path);
    }
    written.sort();
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solmap_graph::{analyze, AnalysisOptions, SolutionSnapshot};
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_only_requested_formats() {
        let dir = tempdir().unwrap();
        let result = Arc::new(
            analyze(&SolutionSnapshot::default(), &AnalysisOptions::default()).unwrap(),
        );
        let plan = RenderPlan {
            output_dir: dir.path().join("out"),
            format: OutputFormat::Mermaid,
            ai: None,
        };

        let written = write_outputs(result, &plan).await.unwrap();
        assert_eq!(written, vec![plan.output_dir.join(MERMAID_FILE)]);
        assert!(!plan.output_dir.join(JSON_FILE).exists());
    }

    #[tokio::test]
    async fn unreachable_ai_falls_back_to_basic() {
        let result = analyze(&SolutionSnapshot::default(), &AnalysisOptions::default()).unwrap();
        let mut config = GeminiConfig::new("key", "model");
        config.base_url = "http://127.0.0.1:9".to_string();

        let text = summary_markdown(&result, Some(&config)).await;
        assert_eq!(text, markdown::basic_markdown(&result));
    }

    #[tokio::test]
    async fn all_writes_four_files() {
        let dir = tempdir().unwrap();
        let result = Arc::new(
            analyze(&SolutionSnapshot::default(), &AnalysisOptions::default()).unwrap(),
        );
        let plan = RenderPlan {
            output_dir: dir.path().to_path_buf(),
            format: OutputFormat::All,
            ai: None,
        };
        let written = write_outputs(result, &plan).await.unwrap();
        assert_eq!(written.len(), 4);
    }
}
