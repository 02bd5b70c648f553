// Entry point: load configuration, wire up the scheduler coordinator, run
// until shutdown. Everything that matters lives in `lib.rs` and the
// per-concern crates under rust/; main stays thin on purpose.

use chronowheel::Coordinator;
use clap::Parser;

/// Hierarchical timing-wheel scheduler for delayed HTTP callbacks.
#[derive(Debug, Parser)]
#[command(name = "chronowheel", version, about)]
struct Cli {
    /// Path to the TOML config file. Overrides CHRONOWHEEL_CONFIG_PATH.
    #[arg(long, env = "CHRONOWHEEL_CONFIG_PATH")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        std::env::set_var("CHRONOWHEEL_CONFIG_PATH", path);
    }

    let config = chronowheel_config::load_config()?;
    tracing::info!(
        bind_addr = %config.http.bind_addr,
        worker_count = config.dispatch.worker_count,
        tick_duration_ms = config.wheel.tick_duration_ms,
        "starting chronowheel"
    );

    let coordinator = Coordinator::start(config).await?;
    coordinator.run_until_shutdown().await
}
