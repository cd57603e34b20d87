//! GitLab API v4 client.
//!
//! API Documentation: <https://docs.gitlab.com/ee/api/rest/>

use reqwest::Method;
use tracing::{debug, info, warn};

use super::models::{
    CreateGroupRequest, CreateProjectRequest, DeployKeyRequest, Group, Project, Visibility,
};
use crate::error::ApiError;
use crate::http::{encode_segment, Auth, ClientOptions, RestClient};
use crate::upsert::Ensured;

const SERVICE: &str = "gitlab";

/// Marker GitLab puts in the body when a deploy key is registered twice.
const ALREADY_TAKEN: &str = "has already been taken";

/// GitLab client authenticated with a personal access token.
#[derive(Debug)]
pub struct GitLabClient {
    rest: RestClient,
}

impl GitLabClient {
    /// Create a new client. `base_url` is the instance root, e.g.
    /// `https://gitlab.example.com`.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client cannot be created.
    pub fn new(base_url: &str, token: impl Into<String>, options: ClientOptions) -> Result<Self, ApiError> {
        let api_url = format!("{}/api/v4", base_url.trim_end_matches('/'));
        let auth = Auth::Header {
            name: "PRIVATE-TOKEN",
            value: token.into(),
        };
        Ok(Self {
            rest: RestClient::new(SERVICE, api_url, auth, options)?,
        })
    }

    /// Look up a group by full path.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn find_group(&self, full_path: &str) -> Result<Option<Group>, ApiError> {
        self.rest
            .get_optional(&format!("/groups/{}", encode_segment(full_path)))
            .await
    }

    /// Create a top-level group if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_group(&self, path: &str, name: &str) -> Result<Ensured<Group>, ApiError> {
        if let Some(group) = self.find_group(path).await? {
            debug!(group = %group.full_path, id = group.id, "Group exists");
            return Ok(Ensured::Existing(group));
        }

        let body = CreateGroupRequest {
            name,
            path,
            visibility: Visibility::Private,
        };
        let Some(response) = self.rest.mutate(Method::POST, "/groups", Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let group: Group = response.json()?;
        info!(group = %group.full_path, id = group.id, "Group created");
        Ok(Ensured::Created(group))
    }

    /// Look up a project by `namespace/path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn find_project(&self, path_with_namespace: &str) -> Result<Option<Project>, ApiError> {
        self.rest
            .get_optional(&format!("/projects/{}", encode_segment(path_with_namespace)))
            .await
    }

    /// Create a project under a group if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_project(
        &self,
        namespace_id: u64,
        namespace_path: &str,
        path: &str,
    ) -> Result<Ensured<Project>, ApiError> {
        let full_path = format!("{namespace_path}/{path}");
        if let Some(project) = self.find_project(&full_path).await? {
            debug!(project = %project.path_with_namespace, "Project exists");
            return Ok(Ensured::Existing(project));
        }

        let body = CreateProjectRequest {
            name: path,
            path,
            namespace_id,
            visibility: Visibility::Private,
            initialize_with_readme: true,
        };
        let Some(response) = self.rest.mutate(Method::POST, "/projects", Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let project: Project = response.json()?;
        info!(project = %project.path_with_namespace, id = project.id, "Project created");
        Ok(Ensured::Created(project))
    }

    /// Register a deploy key on a project.
    ///
    /// Best-effort: a key that is already registered counts as success, any
    /// other failure is logged and reported as `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Never fails for API errors; only serialization problems surface.
    pub async fn add_deploy_key(
        &self,
        project_id: u64,
        title: &str,
        key: &str,
        can_push: bool,
    ) -> Result<bool, ApiError> {
        let path = format!("/projects/{project_id}/deploy_keys");
        let body = DeployKeyRequest { title, key, can_push };

        match self.rest.mutate(Method::POST, &path, Some(&body)).await {
            Ok(Some(_)) => {
                info!(project_id, title, "Deploy key added");
                Ok(true)
            }
            Ok(None) => Ok(true),
            Err(ApiError::Api { status, message, .. })
                if matches!(status, 400 | 409) && message.contains(ALREADY_TAKEN) =>
            {
                debug!(project_id, title, "Deploy key already registered");
                Ok(true)
            }
            Err(ApiError::Serialization(e)) => Err(ApiError::Serialization(e)),
            Err(e) => {
                warn!(project_id, title, error = %e, "Failed to add deploy key");
                Ok(false)
            }
        }
    }
}
