//! Git repositories for the platform on GitLab or GitHub.

use anyhow::{Context, Result};
use platform_apis::gitlab::GitLabClient;
use platform_apis::Ensured;
use tracing::{info, warn};

use crate::process::CommandRunner;
use crate::services::ServiceDescriptor;

/// Repository holding the ArgoCD applications and service manifests.
pub const APPS_REPOSITORY: &str = "platform";

const DEPLOY_KEY_TITLE: &str = "platformctl-argocd";

/// Repository names to ensure: the apps repository plus one per service.
#[must_use]
pub fn repositories(services: &[&ServiceDescriptor]) -> Vec<String> {
    std::iter::once(APPS_REPOSITORY.to_string())
        .chain(services.iter().map(|s| s.name.to_string()))
        .collect()
}

/// What a forge sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForgeReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    /// Repositories that dry-run would have created.
    pub planned: Vec<String>,
    /// Repositories where deploy-key registration failed.
    pub deploy_key_failures: Vec<String>,
}

impl ForgeReport {
    fn record<T>(&mut self, name: &str, outcome: &Ensured<T>) {
        let list = match outcome {
            Ensured::Existing(_) => &mut self.existing,
            Ensured::Created(_) => &mut self.created,
            Ensured::DryRun => &mut self.planned,
        };
        list.push(name.to_string());
    }
}

/// Ensure the GitLab group and one project per repository, registering
/// `deploy_key` read-only on each.
///
/// # Errors
///
/// Returns an error if the group or a project cannot be looked up or created.
/// Deploy-key failures are reported, not returned.
pub async fn sync_gitlab(
    client: &GitLabClient,
    group_path: &str,
    repositories: &[String],
    deploy_key: Option<&str>,
) -> Result<ForgeReport> {
    let mut report = ForgeReport::default();

    let group = client
        .ensure_group(group_path, group_path)
        .await
        .with_context(|| format!("Failed to ensure GitLab group '{group_path}'"))?;
    info!(group = group_path, outcome = group.label(), "GitLab group");

    let Some(group) = group.into_value() else {
        // The group does not exist yet, so neither do its projects.
        report.planned.extend(repositories.iter().cloned());
        return Ok(report);
    };

    for repo in repositories {
        let project = client
            .ensure_project(group.id, &group.full_path, repo)
            .await
            .with_context(|| format!("Failed to ensure GitLab project '{}/{repo}'", group.full_path))?;
        report.record(repo, &project);

        let (Some(key), Some(project)) = (deploy_key, project.value()) else {
            continue;
        };
        if !client.add_deploy_key(project.id, DEPLOY_KEY_TITLE, key, false).await? {
            report.deploy_key_failures.push(repo.clone());
        }
    }

    if !report.deploy_key_failures.is_empty() {
        warn!(
            projects = ?report.deploy_key_failures,
            "Deploy key could not be registered on some projects; add it manually"
        );
    }
    Ok(report)
}

/// Ensure one private GitHub repository per name under `org` using `gh`.
///
/// # Errors
///
/// Returns an error if `gh` fails.
pub fn sync_github(runner: &CommandRunner, org: &str, repositories: &[String]) -> Result<ForgeReport> {
    let mut report = ForgeReport::default();
    for repo in repositories {
        let full = format!("{org}/{repo}");
        if runner.gh_repo_exists(&full)? {
            report.existing.push(repo.clone());
            continue;
        }
        let outcome = runner
            .gh_repo_create(&full, "Managed by platformctl")
            .with_context(|| format!("Failed to create GitHub repository {full}"))?;
        if outcome.was_planned() {
            report.planned.push(repo.clone());
        } else {
            info!(repo = %full, "GitHub repository created");
            report.created.push(repo.clone());
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services;

    #[test]
    fn test_repositories_start_with_apps_repo() {
        let svc = [services::find("keycloak").unwrap(), services::find("harbor").unwrap()];
        assert_eq!(repositories(&svc), ["platform", "keycloak", "harbor"]);
    }

    #[test]
    fn test_report_record() {
        let mut report = ForgeReport::default();
        report.record("a", &Ensured::Existing(()));
        report.record("b", &Ensured::Created(()));
        report.record("c", &Ensured::<()>::DryRun);
        assert_eq!(report.existing, ["a"]);
        assert_eq!(report.created, ["b"]);
        assert_eq!(report.planned, ["c"]);
    }
}
