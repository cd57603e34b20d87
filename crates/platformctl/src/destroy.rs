//! Cluster teardown flow.

use std::fmt;
use std::io::IsTerminal;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Confirm};
use harvester::{DryRunApi, KubeResourceApi, ReconcileReport, Reconciler, ReconcilerConfig, ResourceApi};
use tracing::{info, warn};

use crate::config::PlatformConfig;
use crate::phases::{Phase, PhaseExecutor, PhaseOutcome};
use crate::process::{self, CommandRunner};
use crate::secrets;
use crate::ui;

/// Destroy phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyPhase {
    Confirm,
    Terraform,
    Reconcile,
    LocalCleanup,
}

impl Phase for DestroyPhase {
    const ALL: &'static [Self] = &[Self::Confirm, Self::Terraform, Self::Reconcile, Self::LocalCleanup];
    const FLOW: &'static str = "destroy";

    fn number(self) -> u8 {
        match self {
            Self::Confirm => 1,
            Self::Terraform => 2,
            Self::Reconcile => 3,
            Self::LocalCleanup => 4,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Confirm => "Confirm and preflight checks",
            Self::Terraform => "Terraform destroy",
            Self::Reconcile => "Clean up orphaned Harvester resources",
            Self::LocalCleanup => "Remove local state",
        }
    }
}

impl fmt::Display for DestroyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Flags of the destroy command.
#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    /// Do not ask for confirmation.
    pub auto: bool,
    pub skip_tf: bool,
    pub dry_run: bool,
}

/// Executes destroy phases.
pub struct Destroyer {
    config: PlatformConfig,
    options: DestroyOptions,
    runner: CommandRunner,
    harvester: Option<Box<dyn ResourceApi>>,
    reconciler_config: ReconcilerConfig,
    report: Option<ReconcileReport>,
}

impl Destroyer {
    #[must_use]
    pub fn new(config: PlatformConfig, options: DestroyOptions) -> Self {
        let runner = CommandRunner::new(options.dry_run)
            .with_kube(config.kubeconfig.clone(), None);
        let reconciler_config = ReconcilerConfig::new(&config.harvester_namespace, &config.cluster_name);
        Self {
            config,
            options,
            runner,
            harvester: None,
            reconciler_config,
            report: None,
        }
    }

    /// Use `api` instead of connecting to Harvester.
    #[must_use]
    pub fn with_resource_api(mut self, api: Box<dyn ResourceApi>) -> Self {
        self.harvester = Some(api);
        self
    }

    /// Override wait and polling timings.
    #[must_use]
    pub fn with_reconciler_config(mut self, config: ReconcilerConfig) -> Self {
        self.reconciler_config = config;
        self
    }

    /// Report of the reconcile phase, once it has run.
    #[must_use]
    pub fn report(&self) -> Option<&ReconcileReport> {
        self.report.as_ref()
    }

    fn confirm(&self) -> Result<PhaseOutcome> {
        ui::print_kv("Cluster", &self.config.cluster_name);
        ui::print_kv("Harvester namespace", &self.config.harvester_namespace);
        if !self.options.skip_tf {
            ui::print_kv("Terraform directory", &self.config.terraform_dir.display().to_string());
        }

        let mut tools = Vec::new();
        if !self.options.skip_tf {
            tools.push("terraform");
        }
        match process::require_tools(&tools) {
            Ok(_) => {}
            Err(e) if self.options.dry_run => ui::print_warning(&format!("{e} (ignored in dry-run)")),
            Err(e) => return Err(e),
        }
        if let Some(path) = &self.config.harvester_kubeconfig {
            if !path.is_file() {
                bail!("Harvester kubeconfig {} does not exist", path.display());
            }
        }

        if self.options.auto || self.options.dry_run {
            return Ok(PhaseOutcome::Completed);
        }
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to destroy without confirmation; pass --auto to skip the prompt");
        }

        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Destroy cluster '{}' and all of its data?", self.config.cluster_name))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            bail!("Destroy cancelled");
        }
        Ok(PhaseOutcome::Completed)
    }

    fn terraform(&self) -> Result<PhaseOutcome> {
        if self.options.skip_tf {
            return Ok(PhaseOutcome::skipped("--skip-tf"));
        }
        let outcome = self.runner.terraform_destroy(&self.config.terraform_dir)?;
        ui::print_action("terraform destroy", outcome.was_planned());
        Ok(PhaseOutcome::Completed)
    }

    async fn reconcile(&mut self) -> Result<PhaseOutcome> {
        if self.harvester.is_none() {
            let api = KubeResourceApi::connect(self.config.harvester_kubeconfig.as_deref())
                .await
                .context("Failed to connect to Harvester")?;
            self.harvester = Some(Box::new(api));
        }
        let Some(api) = self.harvester.as_deref() else {
            bail!("Harvester API unavailable");
        };

        ui::print_step(&format!(
            "Waiting up to {}s for '{}' VMs to disappear",
            self.reconciler_config.wait_timeout.as_secs(),
            self.reconciler_config.prefix
        ));
        let config = self.reconciler_config.clone();
        let report = if self.options.dry_run {
            Reconciler::new(DryRunApi::new(api), config).run().await
        } else {
            Reconciler::new(api, config).run().await
        };

        print_report(&report);
        self.report = Some(report);
        Ok(PhaseOutcome::Completed)
    }

    fn local_cleanup(&self) -> PhaseOutcome {
        let files = [
            self.config.client_secrets_file(),
            self.config.robot_credentials_file(),
        ];
        for file in &files {
            if self.options.dry_run {
                if file.exists() {
                    ui::print_action(&format!("Would remove {}", file.display()), true);
                }
                continue;
            }
            match secrets::remove_if_exists(file) {
                Ok(true) => ui::print_success(&format!("Removed {}", file.display())),
                Ok(false) => {}
                Err(e) => ui::print_warning(&format!("{e:#}")),
            }
        }

        let context = self
            .config
            .kube_context
            .clone()
            .unwrap_or_else(|| self.config.cluster_name.clone());
        match self.runner.kubectl_delete_context(&context) {
            Ok(outcome) => ui::print_action(&format!("Deleted kube context '{context}'"), outcome.was_planned()),
            Err(e) => {
                warn!(context, error = %e, "Could not delete kube context");
                ui::print_warning(&format!("Kube context '{context}' not deleted: {e:#}"));
            }
        }
        PhaseOutcome::Completed
    }
}

/// Print what the reconciler found and what is left.
pub fn print_report(report: &ReconcileReport) {
    match &report.wait {
        harvester::WaitOutcome::Drained { polls } => {
            ui::print_success(&format!("No VMs left after {polls} poll(s)"));
        }
        harvester::WaitOutcome::TimedOut { polls, remaining } => {
            let remaining = remaining.map_or_else(|| "unknown".to_string(), |n| n.to_string());
            ui::print_warning(&format!("Timed out after {polls} poll(s) with {remaining} VM(s) left; forcing cleanup"));
        }
    }

    for cleanup in &report.cleanups {
        let Some(found) = cleanup.found else {
            ui::print_warning(&format!("Could not list {}", cleanup.kind));
            continue;
        };
        if found == 0 {
            continue;
        }
        ui::print_info(&format!(
            "{}: {found} found, {} finalizers removed ({} failed), {} deletes requested ({} failed)",
            cleanup.kind,
            cleanup.finalizers_stripped,
            cleanup.strip_failures,
            cleanup.deletes_requested,
            cleanup.delete_failures,
        ));
    }

    let count = |list: &Option<Vec<harvester::OrphanResource>>| {
        list.as_ref().map_or_else(|| "unknown".to_string(), |l| l.len().to_string())
    };
    ui::print_kv("Remaining VMs", &count(&report.remaining_vms));
    ui::print_kv("Remaining PVCs", &count(&report.remaining_pvcs));

    if report.is_clean() {
        ui::print_success("Harvester namespace is clean");
    } else {
        ui::print_warning("Some resources need manual cleanup:");
        for leftover in report.leftovers() {
            ui::print_list_item(&leftover.to_string());
        }
    }
    info!(clean = report.is_clean(), "Reconcile finished");
}

#[async_trait]
impl PhaseExecutor<DestroyPhase> for Destroyer {
    async fn execute(&mut self, phase: DestroyPhase) -> Result<PhaseOutcome> {
        match phase {
            DestroyPhase::Confirm => self.confirm(),
            DestroyPhase::Terraform => self.terraform(),
            DestroyPhase::Reconcile => self.reconcile().await,
            DestroyPhase::LocalCleanup => Ok(self.local_cleanup()),
        }
    }
}
