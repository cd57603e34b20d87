//! ArgoCD manifest generation.
//!
//! Renders one `Application` per enabled service, an `AppProject` scoping
//! them, and a `kustomization.yaml` in each service's source directory.
//! Rendering is pure; [`ManifestPlan::write`] is the only step that touches
//! the filesystem.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::services::{ServiceDescriptor, SyncPolicy};

const APPLICATION_TEMPLATE: &str = r"---
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: {{APP_NAME}}
  namespace: {{ARGOCD_NAMESPACE}}
  labels:
    app.kubernetes.io/part-of: platform
    app.kubernetes.io/managed-by: platformctl
  finalizers:
    - resources-finalizer.argocd.argoproj.io
spec:
  project: {{PROJECT}}
  source:
    repoURL: {{REPO_URL}}
    targetRevision: {{REVISION}}
    path: {{SOURCE_PATH}}
  destination:
    server: https://kubernetes.default.svc
    namespace: {{NAMESPACE}}
  syncPolicy:
{{AUTOMATED}}    syncOptions:
      - CreateNamespace=true
    retry:
      limit: 5
      backoff:
        duration: 5s
        factor: 2
        maxDuration: 3m
";

const AUTOMATED_BLOCK: &str = "    automated:\n      prune: true\n      selfHeal: true\n";

const APP_PROJECT_TEMPLATE: &str = r"---
apiVersion: argoproj.io/v1alpha1
kind: AppProject
metadata:
  name: {{PROJECT}}
  namespace: {{ARGOCD_NAMESPACE}}
spec:
  description: Self-hosted platform services
  sourceRepos:
    - {{REPO_URL}}
  destinations:
{{DESTINATIONS}}  clusterResourceWhitelist:
    - group: '*'
      kind: '*'
";

const KUSTOMIZATION_FILE: &str = "kustomization.yaml";
const APP_PROJECT_FILE: &str = "app-project.yaml";

/// Inputs shared by every rendered manifest.
#[derive(Debug, Clone)]
pub struct ManifestOptions {
    pub repo_url: String,
    pub revision: String,
    pub argocd_namespace: String,
    pub project: String,
    /// Replaces every service's own sync policy when set.
    pub sync_override: Option<SyncPolicy>,
}

impl ManifestOptions {
    #[must_use]
    pub fn new(repo_url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            revision: revision.into(),
            argocd_namespace: "argocd".to_string(),
            project: "platform".to_string(),
            sync_override: None,
        }
    }

    #[must_use]
    pub fn sync_policy_for(&self, service: &ServiceDescriptor) -> SyncPolicy {
        self.sync_override.unwrap_or(service.sync_policy)
    }
}

/// Render the ArgoCD `Application` for `service`.
#[must_use]
pub fn render_application(service: &ServiceDescriptor, options: &ManifestOptions) -> String {
    let automated = match options.sync_policy_for(service) {
        SyncPolicy::Auto => AUTOMATED_BLOCK,
        SyncPolicy::Manual => "",
    };

    APPLICATION_TEMPLATE
        .replace("{{APP_NAME}}", service.name)
        .replace("{{ARGOCD_NAMESPACE}}", &options.argocd_namespace)
        .replace("{{PROJECT}}", &options.project)
        .replace("{{REPO_URL}}", &options.repo_url)
        .replace("{{REVISION}}", &options.revision)
        .replace("{{SOURCE_PATH}}", service.source_path)
        .replace("{{NAMESPACE}}", service.namespace)
        .replace("{{AUTOMATED}}", automated)
}

/// Render the `AppProject` allowing deployments into every service namespace.
#[must_use]
pub fn render_app_project(services: &[&ServiceDescriptor], options: &ManifestOptions) -> String {
    let mut destinations = String::new();
    for service in services {
        let _ = writeln!(destinations, "    - server: https://kubernetes.default.svc");
        let _ = writeln!(destinations, "      namespace: {}", service.namespace);
    }

    APP_PROJECT_TEMPLATE
        .replace("{{PROJECT}}", &options.project)
        .replace("{{ARGOCD_NAMESPACE}}", &options.argocd_namespace)
        .replace("{{REPO_URL}}", &options.repo_url)
        .replace("{{DESTINATIONS}}", &destinations)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Kustomization<'a> {
    api_version: &'a str,
    kind: &'a str,
    namespace: &'a str,
    resources: &'a [String],
}

/// Render a `kustomization.yaml` listing `resources`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_kustomization(service: &ServiceDescriptor, resources: &[String]) -> Result<String> {
    let doc = Kustomization {
        api_version: "kustomize.config.k8s.io/v1beta1",
        kind: "Kustomization",
        namespace: service.namespace,
        resources,
    };
    serde_yaml::to_string(&doc).context("Failed to render kustomization")
}

/// A file the generator would write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Everything one generator run produces.
#[derive(Debug, Clone, Default)]
pub struct ManifestPlan {
    pub files: Vec<PlannedFile>,
    /// Services whose source directory does not exist.
    pub skipped: Vec<&'static str>,
}

impl ManifestPlan {
    /// The `AppProject` and `Application` documents, concatenated for
    /// `kubectl apply -f -`. The project comes first.
    #[must_use]
    pub fn argocd_documents(&self, out_dir: &Path) -> String {
        let mut docs: Vec<&PlannedFile> = self.files.iter().filter(|f| f.path.parent() == Some(out_dir)).collect();
        docs.sort_by_key(|f| !f.path.ends_with(APP_PROJECT_FILE));
        docs.iter().map(|f| f.contents.as_str()).collect()
    }

    /// Write every planned file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error on the first file that cannot be written.
    pub fn write(&self) -> Result<()> {
        for file in &self.files {
            if let Some(parent) = file.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&file.path, &file.contents)
                .with_context(|| format!("Failed to write {}", file.path.display()))?;
            debug!(path = %file.path.display(), "Wrote manifest");
        }
        Ok(())
    }
}

/// Plan manifests for `services` without touching the filesystem.
///
/// `out_dir` is resolved against `repo_root` when relative. Services whose
/// source directory is missing are warned about and left out.
///
/// # Errors
///
/// Returns an error if a source directory cannot be read.
pub fn plan(
    repo_root: &Path,
    out_dir: &Path,
    services: &[&'static ServiceDescriptor],
    options: &ManifestOptions,
) -> Result<ManifestPlan> {
    let out_dir = repo_root.join(out_dir);
    let mut plan = ManifestPlan::default();
    let mut included = Vec::new();

    for &service in services {
        let source_dir = repo_root.join(service.source_path);
        if !source_dir.is_dir() {
            warn!(
                service = service.name,
                path = %source_dir.display(),
                "Source directory missing, skipping service"
            );
            plan.skipped.push(service.name);
            continue;
        }

        let resources = source_resources(&source_dir)?;
        plan.files.push(PlannedFile {
            path: source_dir.join(KUSTOMIZATION_FILE),
            contents: render_kustomization(service, &resources)?,
        });
        plan.files.push(PlannedFile {
            path: out_dir.join(format!("{}.yaml", service.name)),
            contents: render_application(service, options),
        });
        included.push(service);
    }

    if !included.is_empty() {
        plan.files.push(PlannedFile {
            path: out_dir.join(APP_PROJECT_FILE),
            contents: render_app_project(&included, options),
        });
    }

    info!(
        services = included.len(),
        skipped = plan.skipped.len(),
        "Planned manifests"
    );
    Ok(plan)
}

/// Plan and write manifests.
///
/// # Errors
///
/// Returns an error if planning or writing fails.
pub fn generate(
    repo_root: &Path,
    out_dir: &Path,
    services: &[&'static ServiceDescriptor],
    options: &ManifestOptions,
) -> Result<ManifestPlan> {
    let plan = plan(repo_root, out_dir, services, options)?;
    plan.write()?;
    Ok(plan)
}

/// YAML files in `dir`, sorted, excluding any existing kustomization.
fn source_resources(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut resources = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_yaml = Path::new(&name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if entry.path().is_file() && is_yaml && name != KUSTOMIZATION_FILE {
            resources.push(name);
        }
    }
    resources.sort();
    Ok(resources)
}
