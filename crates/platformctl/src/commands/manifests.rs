use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use super::load_config;
use crate::manifests::{self, ManifestOptions};
use crate::services::{self, SyncPolicy};
use crate::ui;

/// Generate ArgoCD applications and kustomizations for every service
#[derive(Args, Debug)]
pub struct ManifestsCommand {
    /// Output directory for Application manifests (relative to the repo root)
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Repository root holding the service source directories
    #[arg(long, value_name = "DIR")]
    repo_root: Option<PathBuf>,

    /// ArgoCD sync policy for every service
    #[arg(long, value_enum, ignore_case = true)]
    sync: Option<SyncPolicy>,

    /// Print the files that would be written
    #[arg(long)]
    dry_run: bool,
}

impl ManifestsCommand {
    pub fn run(&self, env_file: &Path) -> Result<()> {
        let config = load_config(env_file)?;
        let repo_root = self.repo_root.clone().unwrap_or_else(|| config.repo_root.clone());
        let out_dir = self.out_dir.clone().unwrap_or_else(|| config.manifests_dir.clone());

        let mut options = ManifestOptions::new(&config.apps_repo_url, &config.apps_repo_revision);
        options.argocd_namespace.clone_from(&config.argocd_namespace);
        options.sync_override = self.sync;

        let enabled = services::enabled_services(&config.features);
        ui::print_section("Generating service manifests");

        let plan = if self.dry_run {
            manifests::plan(&repo_root, &out_dir, &enabled, &options)?
        } else {
            manifests::generate(&repo_root, &out_dir, &enabled, &options)?
        };

        for file in &plan.files {
            ui::print_action(&file.path.display().to_string(), self.dry_run);
        }
        for name in &plan.skipped {
            ui::print_warning(&format!("Skipped '{name}': source directory missing"));
        }
        ui::print_success(&format!("{} file(s) for {} service(s)", plan.files.len(), enabled.len() - plan.skipped.len()));
        Ok(())
    }
}
