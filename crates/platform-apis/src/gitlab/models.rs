//! GitLab API v4 models.

use serde::{Deserialize, Serialize};

/// Group (namespace) as returned by `GET /groups/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    /// Numeric id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// URL path.
    pub path: String,
    /// Full path including parents.
    pub full_path: String,
}

/// Project as returned by `GET /projects/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    /// Numeric id.
    pub id: u64,
    /// URL path.
    pub path: String,
    /// Full path including namespace.
    pub path_with_namespace: String,
    /// SSH clone URL.
    #[serde(default)]
    pub ssh_url_to_repo: Option<String>,
    /// HTTP clone URL.
    #[serde(default)]
    pub http_url_to_repo: Option<String>,
}

/// Project visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateGroupRequest<'a> {
    pub name: &'a str,
    pub path: &'a str,
    pub visibility: Visibility,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateProjectRequest<'a> {
    pub name: &'a str,
    pub path: &'a str,
    pub namespace_id: u64,
    pub visibility: Visibility,
    pub initialize_with_readme: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeployKeyRequest<'a> {
    pub title: &'a str,
    pub key: &'a str,
    pub can_push: bool,
}
