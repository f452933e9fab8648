use anyhow::Result;
use studychat::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
