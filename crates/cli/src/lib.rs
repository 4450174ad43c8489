use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use solmap_client::{fetch_snapshot, VeociClient, DEFAULT_BASE_URL, DEFAULT_MAX_CONCURRENT};
use solmap_graph::{analyze, unix_ms_now, AnalysisOptions, AnalysisResult, SolutionSnapshot};
use solmap_protocol::{serialize_json_pretty, snapshot_schema};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod output;

use config::{mask_pat, resolve_token, CredentialStore, TokenSource};
use output::summary_ai::{GeminiConfig, DEFAULT_GEMINI_MODEL};
use output::{write_outputs, OutputFormat, RenderPlan, SNAPSHOT_FILE};

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "solmap")]
#[command(about = "Map the forms, workflows and actions of a Veoci solution", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a room's solution, analyze it and write every output
    Map(MapArgs),

    /// Analyze a saved snapshot without touching the network
    Analyze(AnalyzeArgs),

    /// Print one entity's neighborhood from a saved analysis
    Neighbors(NeighborsArgs),

    /// Print the JSON schema of the snapshot format
    Schema,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Which outputs to write
    #[arg(long, value_enum, default_value_t = OutputFormat::All)]
    format: OutputFormat,

    /// Skip the AI summary even when a Gemini key is available
    #[arg(long)]
    no_ai: bool,

    /// Gemini API key for the AI summary
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Gemini model used for the AI summary
    #[arg(long, env = "SOLMAP_GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,
}

impl RenderArgs {
    fn plan(&self) -> RenderPlan {
        let ai = match (&self.gemini_api_key, self.no_ai) {
            (_, true) => None,
            (Some(key), false) if !key.trim().is_empty() => {
                Some(GeminiConfig::new(key.trim(), self.gemini_model.clone()))
            }
            _ => {
                log::info!("Skipping AI summary, GEMINI_API_KEY not set");
                None
            }
        };
        RenderPlan {
            output_dir: self.output.clone(),
            format: self.format,
            ai,
        }
    }
}

#[derive(Args, Debug)]
struct MapArgs {
    /// Room (container) id to map
    #[arg(short, long)]
    room_id: String,

    /// Personal access token; falls back to the saved token
    #[arg(short, long, env = "VEOCI_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Platform base URL
    #[arg(long, env = "VEOCI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Save the token for later runs
    #[arg(long)]
    save_token: bool,

    /// Parallel form-definition requests
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Snapshot file written by `map` (or produced by hand)
    #[arg(short, long)]
    input: PathBuf,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct NeighborsArgs {
    /// Analysis file (`solution_map.json`)
    #[arg(short, long)]
    input: PathBuf,

    /// Entity id
    #[arg(long)]
    id: String,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Map(args) => run_map(args).await?,
        Commands::Analyze(args) => run_analyze(args).await?,
        Commands::Neighbors(args) => run_neighbors(args)?,
        Commands::Schema => print_stdout(&snapshot_schema()?)?,
    }

    Ok(())
}

async fn run_map(args: MapArgs) -> Result<()> {
    let store = CredentialStore::default_location()?;
    let (token, source) = resolve_token(args.token.as_deref(), &store)?;
    if source == TokenSource::Saved {
        log::info!("Using saved token {}", mask_pat(&token));
    }
    if args.save_token {
        store.save(&token)?;
    }

    let client = VeociClient::new(&token, &args.base_url).context("Failed to create API client")?;
    log::info!("Mapping room {} via {}", args.room_id, client.api_base());

    let (_, snapshot) = fetch_snapshot(client, &args.room_id, args.max_concurrent)
        .await
        .with_context(|| format!("Failed to fetch room {}", args.room_id))?;

    let plan = args.render.plan();
    fs::create_dir_all(&plan.output_dir)
        .with_context(|| format!("Failed to create {}", plan.output_dir.display()))?;
    let snapshot_path = plan.output_dir.join(SNAPSHOT_FILE);
    fs::write(&snapshot_path, serialize_json_pretty(&snapshot)?)
        .with_context(|| format!("Failed to write {}", snapshot_path.display()))?;
    log::info!("Wrote {}", snapshot_path.display());

    let mut written = vec![snapshot_path];
    written.extend(render(&snapshot, &plan).await?);
    print_paths(&written)
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let snapshot: SolutionSnapshot = read_json(&args.input)?;
    let written = render(&snapshot, &args.render.plan()).await?;
    print_paths(&written)
}

fn run_neighbors(args: NeighborsArgs) -> Result<()> {
    let result: AnalysisResult = read_json(&args.input)?;
    let hood = result
        .neighborhood(&args.id)
        .with_context(|| format!("Unknown entity in {}", args.input.display()))?;
    print_stdout(&serialize_json_pretty(&hood)?)
}

async fn render(snapshot: &SolutionSnapshot, plan: &RenderPlan) -> Result<Vec<PathBuf>> {
    let result = analyze(snapshot, &AnalysisOptions::at(unix_ms_now()))
        .context("Analysis failed")?;
    write_outputs(Arc::new(result), plan).await
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_paths(paths: &[PathBuf]) -> Result<()> {
    let text = paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    print_stdout(&text)
}
