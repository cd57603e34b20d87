use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::load_config;
use crate::destroy::{DestroyOptions, DestroyPhase, Destroyer};
use crate::phases::{print_phase_list, PhaseRunner};
use crate::ui;

/// Tear down the cluster and clean up Harvester
#[derive(Args, Debug)]
pub struct DestroyCommand {
    /// Print the numbered phases and exit
    #[arg(long)]
    list_phases: bool,

    /// Start at phase N (earlier phases are skipped)
    #[arg(long, value_name = "N", default_value_t = 1)]
    from: u8,

    /// Show what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation
    #[arg(long)]
    auto: bool,

    /// Skip terraform destroy (only clean up leftovers)
    #[arg(long)]
    skip_tf: bool,
}

impl DestroyCommand {
    pub async fn run(&self, env_file: &Path) -> Result<()> {
        if self.list_phases {
            print_phase_list::<DestroyPhase>();
            return Ok(());
        }

        let runner = PhaseRunner::new(self.from, self.dry_run);
        runner.validate::<DestroyPhase>()?;

        let config = load_config(env_file)?;
        ui::print_section(&format!("Destroying cluster {}", config.cluster_name));

        let options = DestroyOptions {
            auto: self.auto,
            skip_tf: self.skip_tf,
            dry_run: self.dry_run,
        };
        let mut destroyer = Destroyer::new(config, options);
        runner.run(&mut destroyer).await?;

        println!();
        match destroyer.report() {
            Some(report) if !report.is_clean() => {
                ui::print_warning("Destroy finished with leftovers; see the list above");
            }
            _ => ui::print_success("Destroy finished"),
        }
        Ok(())
    }
}
