//! # Solution Graph
//!
//! Structural analysis of a workspace solution: forms, workflows and custom
//! actions, and the references between them.
//!
//! ## Architecture
//!
//! ```text
//! SolutionSnapshot (raw records)
//!     │
//!     ├──> Normalizer
//!     │      ├─ Union raw ids seen on the same record
//!     │      ├─ One entity per alias class (smallest raw id)
//!     │      └─ Merge parallel references, drop dangling ones
//!     │
//!     ├──> Graph Builder (petgraph)
//!     │      ├─ Nodes: entities
//!     │      └─ Edges: references keyed by (source, target, kind)
//!     │
//!     ├──> Analyzer
//!     │      ├─ In/out/total degree (distinct and weighted)
//!     │      ├─ Weakly-connected components
//!     │      └─ Importance ranking, key entities
//!     │
//!     └──> Summary Assembler
//!            └─ Immutable AnalysisResult for every renderer
//! ```

mod analyzer;
mod builder;
mod error;
mod graph;
mod normalizer;
mod summary;
mod types;

pub use analyzer::{Analyzer, AnalyzerConfig, EntityMetrics, GraphMetrics, RankedEntity};
pub use builder::GraphBuilder;
pub use error::{GraphError, Result, Stage};
pub use graph::{NeighborLink, Neighborhood, SolutionGraph};
pub use normalizer::{NormalizedSnapshot, Normalizer};
pub use summary::{
    Aggregates, AnalysisResult, AssemblyContext, Diagram, DiagramEdge, DiagramNode, EntityReport,
    RankedRow, SummaryAssembler, RESULT_SCHEMA_VERSION,
};
pub use types::{
    kinds, AnalysisWarning, Entity, EntityId, MissingEndpoint, Reference, ReferenceKey,
    RelationshipKind,
};

pub use solmap_protocol::{EntityKind, Metadata, SolutionSnapshot};

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Knobs for one pipeline run
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOptions {
    pub analyzer: AnalyzerConfig,

    /// Stamped into the result; callers pass it in so runs stay reproducible
    pub generated_at_ms: u64,
}

impl AnalysisOptions {
    pub fn at(generated_at_ms: u64) -> Self {
        Self {
            generated_at_ms,
            ..Self::default()
        }
    }
}

/// Normalize, build, analyze and assemble in one synchronous pass
pub fn analyze(snapshot: &SolutionSnapshot, options: &AnalysisOptions) -> Result<AnalysisResult> {
    let started = Instant::now();

    let normalized = Normalizer::new().normalize(snapshot)?;
    log::debug!("normalize took {:?}", started.elapsed());

    let graph = GraphBuilder::new().build(&normalized)?;
    log::debug!("build took {:?}", started.elapsed());

    let metrics = Analyzer::new(options.analyzer).analyze(&graph);
    log::debug!("analyze took {:?}", started.elapsed());

    let result = SummaryAssembler::new().assemble(
        &graph,
        &metrics,
        normalized.warnings,
        AssemblyContext {
            generated_at_ms: options.generated_at_ms,
        },
    );

    log::info!(
        "Analysis complete: {} entities, {} references, {} components in {:?}",
        result.aggregates().entity_count,
        result.aggregates().reference_count,
        result.aggregates().component_count,
        started.elapsed()
    );

    Ok(result)
}

pub fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
