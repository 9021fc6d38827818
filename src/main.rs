use clap::Parser;

use tdfetch::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    cli::run(Cli::parse()).await
}
