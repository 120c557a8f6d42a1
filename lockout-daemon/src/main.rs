use anyhow::Result;
use clap::Parser;

use lockout_core::LockoutConfig;
use lockout_daemon::cli::DaemonCli;
use lockout_daemon::logging;
use lockout_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // File, then LOCKOUT_* environment, then command line.
    let mut config = LockoutConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(config = %cli.config.display(), "lockout-daemon starting");

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("lockout-daemon shut down");
    Ok(())
}
