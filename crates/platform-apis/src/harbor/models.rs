//! Harbor API v2.0 models.

use serde::{Deserialize, Serialize};

/// Robot account as listed under a project.
#[derive(Debug, Clone, Deserialize)]
pub struct Robot {
    /// Numeric id.
    pub id: u64,
    /// Full robot name (`robot$<project>+<name>`).
    pub name: String,
}

/// Credentials of a robot account. Harbor only reveals the secret once, in
/// the creation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotCredential {
    /// Full robot name, used as the registry username.
    pub name: String,
    /// Registry password.
    pub secret: String,
}

/// OIDC settings applied to Harbor's system configuration.
#[derive(Debug, Clone)]
pub struct HarborOidcSettings {
    /// Provider display name on the login page.
    pub provider_name: String,
    /// Issuer URL (`https://keycloak.example.com/realms/platform`).
    pub endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// Group that maps to Harbor administrators.
    pub admin_group: String,
    /// Verify the issuer's TLS certificate.
    pub verify_cert: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateProjectRequest<'a> {
    pub project_name: &'a str,
    pub metadata: ProjectMetadata,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProjectMetadata {
    /// Harbor stores booleans as strings here.
    pub public: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRobotRequest<'a> {
    pub name: &'a str,
    pub description: String,
    pub level: &'static str,
    pub duration: i64,
    pub permissions: Vec<RobotPermission<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RobotPermission<'a> {
    pub kind: &'static str,
    pub namespace: &'a str,
    pub access: Vec<RobotAccess>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RobotAccess {
    pub resource: &'static str,
    pub action: &'static str,
}

impl<'a> CreateRobotRequest<'a> {
    /// Project-scoped robot with pull/push on repositories, never expiring.
    pub(crate) fn push_pull(project: &'a str, name: &'a str) -> Self {
        let access = ["pull", "push"]
            .into_iter()
            .map(|action| RobotAccess {
                resource: "repository",
                action,
            })
            .collect();

        Self {
            name,
            description: format!("CI push/pull for {project}"),
            level: "project",
            duration: -1,
            permissions: vec![RobotPermission {
                kind: "project",
                namespace: project,
                access,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OidcConfiguration<'a> {
    pub auth_mode: &'static str,
    pub oidc_name: &'a str,
    pub oidc_endpoint: &'a str,
    pub oidc_client_id: &'a str,
    pub oidc_client_secret: &'a str,
    pub oidc_scope: &'static str,
    pub oidc_groups_claim: &'static str,
    pub oidc_admin_group: &'a str,
    pub oidc_user_claim: &'static str,
    pub oidc_verify_cert: bool,
    pub oidc_auto_onboard: bool,
}

impl<'a> From<&'a HarborOidcSettings> for OidcConfiguration<'a> {
    fn from(s: &'a HarborOidcSettings) -> Self {
        Self {
            auth_mode: "oidc_auth",
            oidc_name: &s.provider_name,
            oidc_endpoint: &s.endpoint,
            oidc_client_id: &s.client_id,
            oidc_client_secret: &s.client_secret,
            oidc_scope: "openid,profile,email,groups,offline_access",
            oidc_groups_claim: "groups",
            oidc_admin_group: &s.admin_group,
            oidc_user_claim: "preferred_username",
            oidc_verify_cert: s.verify_cert,
            oidc_auto_onboard: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robot_request_grants_push_and_pull() {
        let json = serde_json::to_value(CreateRobotRequest::push_pull("platform", "ci")).unwrap();
        assert_eq!(json["level"], "project");
        assert_eq!(json["duration"], -1);
        assert_eq!(json["permissions"][0]["namespace"], "platform");
        assert_eq!(json["permissions"][0]["access"][0]["action"], "pull");
        assert_eq!(json["permissions"][0]["access"][1]["action"], "push");
    }
}
