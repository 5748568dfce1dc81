// fee-seeder binary
// Logging setup and argument parsing; everything else lives in the library

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fee_seeder::commands::{self, Cli};

fn init_logging() {
    // RUST_LOG wins; tiberius is noisy at info
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tiberius=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    commands::run(cli).await
}
