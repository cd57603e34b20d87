//! Ordered, resumable phases.
//!
//! A flow is an enum implementing [`Phase`] plus a [`PhaseExecutor`] that
//! knows how to run each variant. Nothing is persisted between runs: the
//! operator resumes a failed flow by passing `--from N`.

use std::fmt;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{error, info};

use crate::ui;

/// A numbered step of a flow.
pub trait Phase: Copy + fmt::Debug + Send + Sync + 'static {
    /// Every phase in execution order.
    const ALL: &'static [Self];

    /// Flow name used in headers ("deploy", "destroy").
    const FLOW: &'static str;

    /// 1-based ordinal.
    fn number(self) -> u8;

    fn description(self) -> &'static str;

    /// Number of phases in the flow.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    fn total() -> u8 {
        Self::ALL.len() as u8
    }
}

/// What a phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    /// The phase was disabled by a flag or had nothing to do.
    Skipped(String),
}

impl PhaseOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

/// Runs individual phases of a flow.
#[async_trait]
pub trait PhaseExecutor<P: Phase>: Send {
    /// Execute `phase`. An error stops the flow.
    async fn execute(&mut self, phase: P) -> Result<PhaseOutcome>;
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport<P> {
    /// Phases that ran to completion.
    pub executed: Vec<P>,
    /// Phases not run, either before `--from` or skipped by the executor.
    pub skipped: Vec<(P, String)>,
}

impl<P> Default for RunReport<P> {
    fn default() -> Self {
        Self {
            executed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Runs a flow's phases in order starting at `from`.
#[derive(Debug, Clone, Copy)]
pub struct PhaseRunner {
    from: u8,
    dry_run: bool,
}

impl PhaseRunner {
    #[must_use]
    pub fn new(from: u8, dry_run: bool) -> Self {
        Self { from, dry_run }
    }

    #[must_use]
    pub fn from_phase(&self) -> u8 {
        self.from
    }

    /// Check that `--from` names an existing phase of `P`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` is outside `1..=P::total()`.
    pub fn validate<P: Phase>(&self) -> Result<()> {
        let total = P::total();
        if self.from == 0 || self.from > total {
            bail!(
                "--from {} is out of range: the {} flow has phases 1-{total} (see --list-phases)",
                self.from,
                P::FLOW
            );
        }
        Ok(())
    }

    /// Run every phase `>= from` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failing phase's error, after printing how to resume.
    pub async fn run<P, E>(&self, executor: &mut E) -> Result<RunReport<P>>
    where
        P: Phase,
        E: PhaseExecutor<P> + ?Sized,
    {
        self.validate::<P>()?;

        let total = P::total();
        let mut report = RunReport::default();

        if self.dry_run {
            ui::print_info("Dry run: no changes will be made");
        }
        if self.from > 1 {
            ui::print_info(&format!("Resuming {} at phase {}", P::FLOW, self.from));
        }

        for &phase in P::ALL {
            let number = phase.number();
            if number < self.from {
                info!(phase = number, "Skipping phase before --from");
                report.skipped.push((phase, format!("before --from {}", self.from)));
                continue;
            }

            ui::print_progress_step(number, total, phase.description());
            match executor.execute(phase).await {
                Ok(PhaseOutcome::Completed) => {
                    info!(phase = number, description = phase.description(), "Phase complete");
                    report.executed.push(phase);
                }
                Ok(PhaseOutcome::Skipped(reason)) => {
                    ui::print_info(&format!("Skipped: {reason}"));
                    report.skipped.push((phase, reason));
                }
                Err(e) => {
                    error!(phase = number, error = %e, "Phase failed");
                    ui::print_error(&format!("Phase {number} ({}) failed: {e:#}", phase.description()));
                    ui::print_info(&format!("Fix the problem and re-run with --from {number} to resume."));
                    return Err(e.context(format!("{} phase {number} failed", P::FLOW)));
                }
            }
        }

        Ok(report)
    }
}

/// Print the numbered phase list of a flow.
pub fn print_phase_list<P: Phase>() {
    ui::print_section(&format!("{} phases", P::FLOW));
    for &phase in P::ALL {
        println!("  {:>2}. {}", phase.number(), phase.description());
    }
    println!();
}
