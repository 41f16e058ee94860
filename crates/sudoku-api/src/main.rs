//! Binary entrypoint for the Sudoku API server.
use sudoku_api::{config::ServerConfig, run};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Everything is overridable through SUDOKU_* variables
    let config = ServerConfig::from_env()?;
    run(config).await
}
