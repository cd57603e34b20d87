use std::io::IsTerminal;
use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::load_config;
use crate::deploy::{DeployOptions, DeployPhase, Deployer};
use crate::phases::{print_phase_list, PhaseRunner};
use crate::services::SyncPolicy;
use crate::ui;

/// Bootstrap the platform services
#[derive(Args, Debug)]
pub struct DeployCommand {
    /// Print the numbered phases and exit
    #[arg(long)]
    list_phases: bool,

    /// Start at phase N (earlier phases are skipped)
    #[arg(long, value_name = "N", default_value_t = 1)]
    from: u8,

    /// Show what would change without changing anything
    #[arg(long)]
    dry_run: bool,

    /// ArgoCD sync policy for every service
    #[arg(long, value_enum, ignore_case = true)]
    sync: Option<SyncPolicy>,

    /// Skip Vault unseal and Vault OIDC
    #[arg(long)]
    skip_vault: bool,

    /// Skip Keycloak realm and client setup
    #[arg(long)]
    skip_keycloak: bool,

    /// Skip KASM configuration
    #[arg(long)]
    skip_kasm: bool,

    /// Never prompt
    #[arg(long)]
    auto: bool,
}

impl DeployCommand {
    pub async fn run(&self, env_file: &Path) -> Result<()> {
        if self.list_phases {
            print_phase_list::<DeployPhase>();
            return Ok(());
        }

        let runner = PhaseRunner::new(self.from, self.dry_run);
        runner.validate::<DeployPhase>()?;

        let config = load_config(env_file)?;
        let options = DeployOptions {
            skip_vault: self.skip_vault,
            skip_keycloak: self.skip_keycloak,
            skip_kasm: self.skip_kasm,
            sync: self.sync,
            dry_run: self.dry_run,
            interactive: !self.auto && std::io::stdin().is_terminal(),
        };

        ui::print_section(&format!("Deploying platform on {}", config.domain));
        let mut deployer = Deployer::new(config, options)?;
        let report = runner.run(&mut deployer).await?;

        println!();
        ui::print_success(&format!(
            "Deploy finished: {} phase(s) run, {} skipped",
            report.executed.len(),
            report.skipped.len()
        ));
        Ok(())
    }
}
