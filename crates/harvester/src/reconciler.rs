//! Best-effort cleanup of Harvester resources after a cluster destroy.
//!
//! Deleting a guest cluster asks its infrastructure provider to remove the
//! node VMs, which happens asynchronously and sometimes never completes
//! because a controller finalizer is left dangling. The reconciler runs four
//! steps:
//!
//! 1. Wait (bounded) for the cluster's VMs to disappear on their own.
//! 2. Strip finalizers from every VM still present and delete it.
//! 3. Do the same for VM instances, then data volumes, then PVCs.
//! 4. After a settle delay, recount VMs and PVCs and report what is left.
//!
//! No step can fail the run. There is no signal telling "still deleting"
//! apart from "stuck", so the timeout is the only arbiter.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::api::ResourceApi;
use crate::resources::{OrphanKind, OrphanResource};

/// Reconciler settings.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Harvester namespace holding the cluster's VMs.
    pub namespace: String,
    /// Only resources whose name starts with this prefix are touched.
    pub prefix: String,
    /// How long to wait for VMs to go away on their own.
    pub wait_timeout: Duration,
    /// Interval between VM counts while waiting.
    pub poll_interval: Duration,
    /// Pause before the verification count.
    pub settle_delay: Duration,
}

impl ReconcilerConfig {
    #[must_use]
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            wait_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(10),
        }
    }
}

/// How the bounded wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// No matching VM was left after `polls` counts.
    Drained { polls: u32 },
    /// The timeout passed. `remaining` is the last successful count.
    TimedOut { polls: u32, remaining: Option<usize> },
}

/// Per-kind tally of the forced cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindCleanup {
    pub kind: OrphanKind,
    /// Matching resources found. `None` when the listing failed.
    pub found: Option<usize>,
    pub finalizers_stripped: usize,
    pub strip_failures: usize,
    pub deletes_requested: usize,
    pub delete_failures: usize,
}

impl KindCleanup {
    fn new(kind: OrphanKind) -> Self {
        Self {
            kind,
            found: None,
            finalizers_stripped: 0,
            strip_failures: 0,
            deletes_requested: 0,
            delete_failures: 0,
        }
    }
}

/// Outcome of a full reconcile run.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub wait: WaitOutcome,
    /// VMs first, then the cascade kinds in cleanup order.
    pub cleanups: Vec<KindCleanup>,
    /// VMs still present at verification. `None` when the count failed.
    pub remaining_vms: Option<Vec<OrphanResource>>,
    /// PVCs still present at verification. `None` when the count failed.
    pub remaining_pvcs: Option<Vec<OrphanResource>>,
}

impl ReconcileReport {
    /// Verification counted zero VMs and zero PVCs.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(&self.remaining_vms, Some(v) if v.is_empty())
            && matches!(&self.remaining_pvcs, Some(p) if p.is_empty())
    }

    /// Resources needing manual follow-up.
    #[must_use]
    pub fn leftovers(&self) -> Vec<&OrphanResource> {
        self.remaining_vms
            .iter()
            .chain(self.remaining_pvcs.iter())
            .flatten()
            .collect()
    }

    /// Cleanup tally for one kind.
    #[must_use]
    pub fn cleanup(&self, kind: OrphanKind) -> Option<&KindCleanup> {
        self.cleanups.iter().find(|c| c.kind == kind)
    }
}

/// Drives the cleanup against a [`ResourceApi`].
pub struct Reconciler<A> {
    api: A,
    config: ReconcilerConfig,
}

impl<A: ResourceApi> Reconciler<A> {
    pub fn new(api: A, config: ReconcilerConfig) -> Self {
        Self { api, config }
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run all four steps. Never fails; problems end up in the report and
    /// the log.
    pub async fn run(&self) -> ReconcileReport {
        info!(
            namespace = %self.config.namespace,
            prefix = %self.config.prefix,
            timeout_secs = self.config.wait_timeout.as_secs(),
            "Reconciling orphaned Harvester resources"
        );

        let wait = self.wait_for_vms().await;

        // Runs even after a clean drain: VMIs, volumes and claims can outlive their VM.
        let mut cleanups = Vec::with_capacity(1 + OrphanKind::CASCADE.len());
        cleanups.push(self.force_cleanup(OrphanKind::VirtualMachine).await);
        for kind in OrphanKind::CASCADE {
            cleanups.push(self.force_cleanup(kind).await);
        }

        sleep(self.config.settle_delay).await;
        let remaining_vms = self.count(OrphanKind::VirtualMachine).await;
        let remaining_pvcs = self.count(OrphanKind::PersistentVolumeClaim).await;

        let report = ReconcileReport {
            wait,
            cleanups,
            remaining_vms,
            remaining_pvcs,
        };

        if report.is_clean() {
            info!(namespace = %self.config.namespace, "No VMs or PVCs left");
        } else {
            for leftover in report.leftovers() {
                warn!(resource = %leftover, "Still present, remove manually");
            }
        }

        report
    }

    async fn matching(&self, kind: OrphanKind) -> Result<Vec<OrphanResource>, crate::ReconcileError> {
        let all = self.api.list(kind, &self.config.namespace).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.name.starts_with(&self.config.prefix))
            .collect())
    }

    async fn count(&self, kind: OrphanKind) -> Option<Vec<OrphanResource>> {
        match self.matching(kind).await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(%kind, error = %e, "Verification listing failed");
                None
            }
        }
    }

    async fn wait_for_vms(&self) -> WaitOutcome {
        let deadline = Instant::now() + self.config.wait_timeout;
        let mut polls = 0;
        let mut remaining = None;

        loop {
            polls += 1;
            match self.matching(OrphanKind::VirtualMachine).await {
                Ok(vms) if vms.is_empty() => {
                    info!(polls, "All cluster VMs are gone");
                    return WaitOutcome::Drained { polls };
                }
                Ok(vms) => {
                    debug!(remaining = vms.len(), polls, "Waiting for VMs to terminate");
                    remaining = Some(vms.len());
                }
                Err(e) => warn!(error = %e, "Failed to list VMs, will retry"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    timeout_secs = self.config.wait_timeout.as_secs(),
                    remaining, "Timed out waiting for VMs, forcing cleanup"
                );
                return WaitOutcome::TimedOut { polls, remaining };
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn force_cleanup(&self, kind: OrphanKind) -> KindCleanup {
        let mut tally = KindCleanup::new(kind);

        let resources = match self.matching(kind).await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(%kind, error = %e, "Failed to list, skipping");
                return tally;
            }
        };
        tally.found = Some(resources.len());
        if resources.is_empty() {
            debug!(%kind, "Nothing to clean up");
            return tally;
        }

        info!(%kind, count = resources.len(), "Force-removing leftovers");
        for resource in &resources {
            let ns = &resource.namespace;
            let name = &resource.name;

            // May already be gone between list and patch.
            match self.api.strip_finalizers(kind, ns, name).await {
                Ok(()) => tally.finalizers_stripped += 1,
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Failed to remove finalizers");
                    tally.strip_failures += 1;
                }
            }

            match self.api.delete(kind, ns, name).await {
                Ok(()) => tally.deletes_requested += 1,
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Failed to request deletion");
                    tally.delete_failures += 1;
                }
            }
        }

        tally
    }
}
