//! GitLab groups, projects and deploy keys.

mod client;
mod models;

pub use client::GitLabClient;
pub use models::{Group, Project, Visibility};
