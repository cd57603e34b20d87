//! External CLI invocations (`kubectl`, `terraform`, `gh`).
//!
//! Read-only commands always run. Mutating commands go through
//! [`CommandRunner::run`] and friends, which only log in dry-run mode.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

/// What a gated command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran successfully.
    Ran { stdout: String },
    /// Dry-run: the command was only logged.
    Planned,
}

impl CommandOutcome {
    #[must_use]
    pub fn was_planned(&self) -> bool {
        matches!(self, Self::Planned)
    }
}

/// Locate every tool on `PATH`.
///
/// # Errors
///
/// Returns an error naming all missing tools.
pub fn require_tools(tools: &[&str]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::with_capacity(tools.len());
    let mut missing = Vec::new();
    for tool in tools {
        match which::which(tool) {
            Ok(path) => {
                debug!(tool, path = %path.display(), "Found tool");
                found.push(path);
            }
            Err(_) => missing.push(*tool),
        }
    }
    if !missing.is_empty() {
        bail!("Required tools not found on PATH: {}", missing.join(", "));
    }
    Ok(found)
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_output(program: &str, args: &[String], output: &std::process::Output) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} failed: {}", command_line(program, args), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs external commands with optional kubeconfig/context and dry-run gating.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    dry_run: bool,
    kubeconfig: Option<PathBuf>,
    kube_context: Option<String>,
}

impl CommandRunner {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Target `kubectl` at an explicit kubeconfig and context.
    #[must_use]
    pub fn with_kube(mut self, kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        self.kubeconfig = kubeconfig;
        self.kube_context = context;
        self
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn kubectl_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::new();
        if let Some(path) = &self.kubeconfig {
            full.push("--kubeconfig".to_string());
            full.push(path.display().to_string());
        }
        if let Some(context) = &self.kube_context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        full.extend(args.iter().map(ToString::to_string));
        full
    }

    /// Run a read-only command regardless of dry-run and return stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    pub fn read(&self, program: &str, args: &[String]) -> Result<String> {
        debug!(command = %command_line(program, args), "Running");
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run '{program}'. Is it installed?"))?;
        check_output(program, args, &output)
    }

    /// Run a read-only command and report only whether it succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    pub fn probe(&self, program: &str, args: &[String]) -> Result<bool> {
        debug!(command = %command_line(program, args), "Probing");
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run '{program}'. Is it installed?"))?;
        Ok(output.status.success())
    }

    /// Run a mutating command, capturing its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    pub fn run(&self, program: &str, args: &[String]) -> Result<CommandOutcome> {
        let command = command_line(program, args);
        if self.dry_run {
            info!(%command, "[dry-run] Would run");
            return Ok(CommandOutcome::Planned);
        }
        let stdout = self.read(program, args)?;
        Ok(CommandOutcome::Ran { stdout })
    }

    /// Run a mutating command with its output streamed to the terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    pub fn run_streaming(&self, program: &str, args: &[String]) -> Result<CommandOutcome> {
        let command = command_line(program, args);
        if self.dry_run {
            info!(%command, "[dry-run] Would run");
            return Ok(CommandOutcome::Planned);
        }

        info!(%command, "Running");
        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to run '{program}'. Is it installed?"))?;
        if !status.success() {
            bail!("{command} exited with {status}");
        }
        Ok(CommandOutcome::Ran { stdout: String::new() })
    }

    /// `kubectl apply -f -` with `yaml` on stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl fails.
    pub fn kubectl_apply(&self, yaml: &str) -> Result<CommandOutcome> {
        let args = self.kubectl_args(&["apply", "-f", "-"]);
        if self.dry_run {
            info!(
                command = %command_line("kubectl", &args),
                documents = yaml.matches("\nkind:").count(),
                "[dry-run] Would apply"
            );
            return Ok(CommandOutcome::Planned);
        }

        let mut child = Command::new("kubectl")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn kubectl")?;

        if let Some(ref mut stdin) = child.stdin {
            stdin
                .write_all(yaml.as_bytes())
                .context("Failed to write manifests to kubectl stdin")?;
        }

        let output = child.wait_with_output().context("Failed to wait for kubectl")?;
        let stdout = check_output("kubectl", &args, &output)?;
        Ok(CommandOutcome::Ran { stdout })
    }

    /// Delete a kubeconfig context.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl fails (for example the context is absent).
    pub fn kubectl_delete_context(&self, context: &str) -> Result<CommandOutcome> {
        let args = self.kubectl_args(&["config", "delete-context", context]);
        self.run("kubectl", &args)
    }

    /// `terraform -chdir=DIR destroy -auto-approve`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or terraform fails.
    pub fn terraform_destroy(&self, dir: &Path) -> Result<CommandOutcome> {
        if !dir.is_dir() {
            bail!("Terraform directory {} does not exist", dir.display());
        }
        let args = vec![
            format!("-chdir={}", dir.display()),
            "destroy".to_string(),
            "-auto-approve".to_string(),
        ];
        self.run_streaming("terraform", &args)
    }

    /// Whether `owner/name` exists on GitHub.
    ///
    /// # Errors
    ///
    /// Returns an error if `gh` cannot be run.
    pub fn gh_repo_exists(&self, repo: &str) -> Result<bool> {
        let args = ["repo", "view", repo, "--json", "name"].map(String::from).to_vec();
        self.probe("gh", &args)
    }

    /// Create a private GitHub repository.
    ///
    /// # Errors
    ///
    /// Returns an error if `gh` fails.
    pub fn gh_repo_create(&self, repo: &str, description: &str) -> Result<CommandOutcome> {
        let args = ["repo", "create", repo, "--private", "--description", description]
            .map(String::from)
            .to_vec();
        self.run("gh", &args)
    }
}
