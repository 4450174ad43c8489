//! Retrieval of a container's solution from the platform's v2 API and
//! extraction of raw records for `solmap-graph`.

mod client;
mod error;
pub mod extract;
mod fetcher;

pub use client::{VeociClient, DEFAULT_BASE_URL};
pub use error::{ClientError, Result};
pub use extract::build_snapshot;
pub use fetcher::{clamp_concurrency, FetchedSolution, Fetcher, DEFAULT_MAX_CONCURRENT};

use solmap_protocol::SolutionSnapshot;

/// Fetch one container and turn it into a snapshot
pub async fn fetch_snapshot(
    client: VeociClient,
    container_id: &str,
    max_concurrent: usize,
) -> Result<(FetchedSolution, SolutionSnapshot)> {
    let fetched = Fetcher::new(client, max_concurrent)
        .fetch_solution(container_id)
        .await?;
    let snapshot = build_snapshot(&fetched);
    Ok((fetched, snapshot))
}
