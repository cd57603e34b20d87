use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use harvester::{OrphanKind, OrphanResource, ReconcileError, ResourceApi, WaitOutcome};
use platformctl::config::EnvMap;
use platformctl::destroy::{DestroyOptions, DestroyPhase, Destroyer};
use platformctl::{PhaseRunner, PlatformConfig};

#[derive(Default)]
struct State {
    objects: BTreeMap<OrphanKind, Vec<String>>,
    mutations: Vec<(OrphanKind, String)>,
}

/// Harvester namespace shared between the test and the destroyer.
#[derive(Clone, Default)]
struct FakeHarvester(Arc<Mutex<State>>);

impl FakeHarvester {
    fn with(self, kind: OrphanKind, names: &[&str]) -> Self {
        self.0
            .lock()
            .unwrap()
            .objects
            .insert(kind, names.iter().map(ToString::to_string).collect());
        self
    }

    fn mutations(&self) -> Vec<(OrphanKind, String)> {
        self.0.lock().unwrap().mutations.clone()
    }
}

#[async_trait]
impl ResourceApi for FakeHarvester {
    async fn list(&self, kind: OrphanKind, namespace: &str) -> Result<Vec<OrphanResource>, ReconcileError> {
        let state = self.0.lock().unwrap();
        Ok(state
            .objects
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|name| OrphanResource::new(kind, name.clone(), namespace))
            .collect())
    }

    async fn strip_finalizers(&self, kind: OrphanKind, _namespace: &str, name: &str) -> Result<(), ReconcileError> {
        self.0.lock().unwrap().mutations.push((kind, format!("strip {name}")));
        Ok(())
    }

    async fn delete(&self, kind: OrphanKind, _namespace: &str, name: &str) -> Result<(), ReconcileError> {
        let mut state = self.0.lock().unwrap();
        state.mutations.push((kind, format!("delete {name}")));
        if let Some(names) = state.objects.get_mut(&kind) {
            names.retain(|n| n != name);
        }
        Ok(())
    }
}

fn config(dir: &Path) -> PlatformConfig {
    let state = dir.join("state").display().to_string();
    // kubectl must never touch the developer's real kubeconfig.
    let kubeconfig = dir.join("kubeconfig").display().to_string();
    let env: EnvMap = [
        ("DOMAIN", "example.com"),
        ("CLUSTER_NAME", "rke2-prod"),
        ("HARVESTER_NAMESPACE", "guest-clusters"),
        ("PLATFORM_STATE_DIR", state.as_str()),
        ("KUBECONFIG", kubeconfig.as_str()),
    ]
    .into_iter()
    .collect();
    PlatformConfig::from_env(&env).unwrap()
}

fn stuck_cluster() -> FakeHarvester {
    FakeHarvester::default()
        .with(OrphanKind::VirtualMachine, &["rke2-prod-cp-0", "rke2-prod-worker-0"])
        .with(
            OrphanKind::PersistentVolumeClaim,
            &["rke2-prod-cp-0-disk-0", "rke2-prod-worker-0-disk-0", "rke2-prod-worker-0-disk-1"],
        )
}

#[tokio::test(start_paused = true)]
async fn auto_skip_tf_cleans_stuck_vms_and_pvcs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(&cfg.state_dir).unwrap();
    std::fs::write(cfg.client_secrets_file(), "{}").unwrap();
    let secrets_file = cfg.client_secrets_file();

    let fake = stuck_cluster();
    let options = DestroyOptions {
        auto: true,
        skip_tf: true,
        dry_run: false,
    };
    let mut destroyer = Destroyer::new(cfg, options).with_resource_api(Box::new(fake.clone()));

    let report = PhaseRunner::new(1, false).run(&mut destroyer).await.unwrap();
    assert_eq!(report.executed.len(), 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, DestroyPhase::Terraform);

    let reconcile = destroyer.report().unwrap();
    assert!(matches!(reconcile.wait, WaitOutcome::TimedOut { remaining: Some(2), .. }));
    assert_eq!(reconcile.remaining_vms.as_ref().map(Vec::len), Some(0));
    assert_eq!(reconcile.remaining_pvcs.as_ref().map(Vec::len), Some(0));
    assert!(reconcile.is_clean());

    let strips = fake
        .mutations()
        .into_iter()
        .filter(|(kind, m)| *kind == OrphanKind::VirtualMachine && m.starts_with("strip"))
        .count();
    assert_eq!(strips, 2);
    assert!(!secrets_file.exists());
}

#[tokio::test(start_paused = true)]
async fn dry_run_destroy_only_reads() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(&cfg.state_dir).unwrap();
    std::fs::write(cfg.robot_credentials_file(), "{}").unwrap();
    let robots_file = cfg.robot_credentials_file();

    let fake = stuck_cluster();
    let options = DestroyOptions {
        auto: false,
        skip_tf: true,
        dry_run: true,
    };
    let mut destroyer = Destroyer::new(cfg, options).with_resource_api(Box::new(fake.clone()));

    PhaseRunner::new(1, true).run(&mut destroyer).await.unwrap();

    assert!(fake.mutations().is_empty());
    assert!(robots_file.exists());
    assert_eq!(destroyer.report().unwrap().leftovers().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn from_three_skips_confirmation_and_terraform() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeHarvester::default();
    let options = DestroyOptions {
        auto: false,
        skip_tf: false,
        dry_run: false,
    };
    let mut destroyer = Destroyer::new(config(dir.path()), options).with_resource_api(Box::new(fake));

    let report = PhaseRunner::new(3, false).run(&mut destroyer).await.unwrap();
    assert_eq!(report.executed, [DestroyPhase::Reconcile, DestroyPhase::LocalCleanup]);
    assert_eq!(destroyer.report().unwrap().wait, WaitOutcome::Drained { polls: 1 });
}
