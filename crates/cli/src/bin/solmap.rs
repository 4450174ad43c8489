use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    solmap_cli::main_entry().await
}
