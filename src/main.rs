use anyhow::Result;
use clap::Parser;

use hunter2::cli::Config;
use hunter2::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let runtime = runtime::initialize(&config).await?;

    runtime::run_sync_loop(runtime).await
}
