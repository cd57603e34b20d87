//! Harbor API v2.0 client.
//!
//! API Documentation: <https://goharbor.io/docs/main/build-customize-contribute/configure-swagger/>

use reqwest::Method;
use tracing::{debug, info};

use super::models::{
    CreateProjectRequest, CreateRobotRequest, HarborOidcSettings, OidcConfiguration,
    ProjectMetadata, Robot, RobotCredential,
};
use crate::error::ApiError;
use crate::http::{encode_query, encode_segment, Auth, ClientOptions, RestClient};
use crate::upsert::Ensured;

const SERVICE: &str = "harbor";

/// Harbor client using the admin account over basic auth.
#[derive(Debug)]
pub struct HarborClient {
    rest: RestClient,
}

impl HarborClient {
    /// Create a new client for the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let api_url = format!("{}/api/v2.0", base_url.trim_end_matches('/'));
        let auth = Auth::Basic {
            username: username.into(),
            password: password.into(),
        };
        Ok(Self {
            rest: RestClient::new(SERVICE, api_url, auth, options)?,
        })
    }

    /// Create a project if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check or creation fails.
    pub async fn ensure_project(&self, name: &str, public: bool) -> Result<Ensured<String>, ApiError> {
        let probe = format!("/projects?project_name={}", encode_query(name));
        if self.rest.exists(&probe).await? {
            debug!(project = name, "Project exists");
            return Ok(Ensured::Existing(name.to_string()));
        }

        let body = CreateProjectRequest {
            project_name: name,
            metadata: ProjectMetadata {
                public: public.to_string(),
            },
        };
        if self.rest.mutate(Method::POST, "/projects", Some(&body)).await?.is_none() {
            return Ok(Ensured::DryRun);
        }

        info!(project = name, public, "Project created");
        Ok(Ensured::Created(name.to_string()))
    }

    /// Find a robot in `project` by its short name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn find_robot(&self, project: &str, robot_name: &str) -> Result<Option<Robot>, ApiError> {
        let path = format!("/projects/{}/robots", encode_segment(project));
        let robots: Vec<Robot> = self.rest.get_json(&path).await?;
        let full_name = robot_full_name(project, robot_name);
        Ok(robots.into_iter().find(|r| r.name == full_name))
    }

    /// Create a push/pull robot account if missing.
    ///
    /// Only a freshly created robot carries a secret; for an existing robot
    /// the caller has to rely on the credentials it persisted earlier.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_robot(
        &self,
        project: &str,
        robot_name: &str,
    ) -> Result<Ensured<Option<RobotCredential>>, ApiError> {
        if let Some(robot) = self.find_robot(project, robot_name).await? {
            debug!(robot = %robot.name, "Robot account exists");
            return Ok(Ensured::Existing(None));
        }

        let body = CreateRobotRequest::push_pull(project, robot_name);
        let Some(response) = self.rest.mutate(Method::POST, "/robots", Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let credential: RobotCredential = response.json()?;
        info!(robot = %credential.name, "Robot account created");
        Ok(Ensured::Created(Some(credential)))
    }

    /// Switch Harbor to OIDC authentication.
    ///
    /// Harbor refuses to change the auth mode once local users exist, so
    /// callers usually treat an error here as a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration update is rejected.
    pub async fn configure_oidc(&self, settings: &HarborOidcSettings) -> Result<Ensured<()>, ApiError> {
        let body = OidcConfiguration::from(settings);
        if self.rest.mutate(Method::PUT, "/configurations", Some(&body)).await?.is_none() {
            return Ok(Ensured::DryRun);
        }
        info!(endpoint = %settings.endpoint, "OIDC authentication configured");
        Ok(Ensured::Created(()))
    }
}

/// Harbor prefixes project robots with `robot$<project>+`.
#[must_use]
pub fn robot_full_name(project: &str, robot_name: &str) -> String {
    format!("robot${project}+{robot_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robot_full_name() {
        assert_eq!(robot_full_name("platform", "ci"), "robot$platform+ci");
    }
}
