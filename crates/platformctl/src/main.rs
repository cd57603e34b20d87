//! platformctl: bootstrap and tear down the self-hosted platform.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use platformctl::commands::deploy::DeployCommand;
use platformctl::commands::destroy::DestroyCommand;
use platformctl::commands::manifests::ManifestsCommand;

/// Self-hosted platform bootstrap and teardown.
#[derive(Parser)]
#[command(
    name = "platformctl",
    version,
    about = "Bootstrap and tear down the self-hosted platform",
    long_about = "Configure Vault, Keycloak, Harbor, GitLab/GitHub, KASM and ArgoCD on a\n\
                  freshly provisioned cluster, or destroy the cluster and clean up its\n\
                  Harvester leftovers.\n\n\
                  Every phase is idempotent. After a failure, fix the cause and re-run\n\
                  with --from N to resume at the failed phase."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file in KEY=value format.
    #[arg(long, global = true, value_name = "FILE", env = "PLATFORM_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the platform services.
    Deploy(DeployCommand),

    /// Destroy the cluster and remove orphaned Harvester resources.
    Destroy(DestroyCommand),

    /// Generate ArgoCD manifests for the service inventory.
    Manifests(ManifestsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info,platformctl=debug,platform_apis=debug,harvester=debug")
    } else {
        EnvFilter::new("warn,platformctl=info,platform_apis=info,harvester=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Deploy(cmd) => cmd.run(&cli.env_file).await,
        Commands::Destroy(cmd) => cmd.run(&cli.env_file).await,
        Commands::Manifests(cmd) => cmd.run(&cli.env_file),
    }
}
