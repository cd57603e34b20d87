//! KASM Workspaces admin API client.

use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info};

use super::models::{
    CreateGroup, CreateOidcConfig, Empty, Envelope, GroupResponse, GroupsResponse, KasmGroup,
    KasmOidcConfig, KasmOidcSettings, OidcConfigsResponse, TargetGroup, TargetOidcConfig,
};
use crate::error::ApiError;
use crate::http::{Auth, ClientOptions, RestClient};
use crate::upsert::Ensured;

const SERVICE: &str = "kasm";

/// KASM client. Credentials travel in each request body, not in headers.
#[derive(Debug)]
pub struct KasmClient {
    rest: RestClient,
    api_key: String,
    api_key_secret: String,
}

impl KasmClient {
    /// Create a new client for the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        api_key_secret: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let api_url = format!("{}/api/public", base_url.trim_end_matches('/'));
        Ok(Self {
            rest: RestClient::new(SERVICE, api_url, Auth::None, options)?,
            api_key: api_key.into(),
            api_key_secret: api_key_secret.into(),
        })
    }

    fn envelope<T: Serialize>(&self, payload: T) -> Envelope<'_, T> {
        Envelope {
            api_key: &self.api_key,
            api_key_secret: &self.api_key_secret,
            payload,
        }
    }

    /// List all user groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_groups(&self) -> Result<Vec<KasmGroup>, ApiError> {
        let response: GroupsResponse = self.rest.query("/get_groups", &self.envelope(Empty {})).await?;
        Ok(response.groups)
    }

    /// Create a group if no group with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_group(&self, name: &str, priority: u32) -> Result<Ensured<String>, ApiError> {
        if let Some(group) = self.list_groups().await?.into_iter().find(|g| g.name == name) {
            debug!(group = name, id = %group.group_id, "Group exists");
            return Ok(Ensured::Existing(group.group_id));
        }

        let body = self.envelope(CreateGroup {
            target_group: TargetGroup {
                name,
                priority,
                description: format!("{name} (managed by platformctl)"),
            },
        });
        let Some(response) = self.rest.mutate(Method::POST, "/create_group", Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let created: GroupResponse = response.json()?;
        info!(group = name, id = %created.group.group_id, "Group created");
        Ok(Ensured::Created(created.group.group_id))
    }

    /// List configured OIDC providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_oidc_configs(&self) -> Result<Vec<KasmOidcConfig>, ApiError> {
        let response: OidcConfigsResponse = self
            .rest
            .query("/get_oidc_configs", &self.envelope(Empty {}))
            .await?;
        Ok(response.oidc_configs)
    }

    /// Register the OIDC provider if none with the same display name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_oidc_config(&self, settings: &KasmOidcSettings) -> Result<Ensured<()>, ApiError> {
        let existing = self.list_oidc_configs().await?;
        if existing.iter().any(|c| c.display_name == settings.display_name) {
            debug!(provider = %settings.display_name, "OIDC config exists");
            return Ok(Ensured::Existing(()));
        }

        let body = self.envelope(CreateOidcConfig {
            target_oidc_config: TargetOidcConfig::from(settings),
        });
        if self
            .rest
            .mutate(Method::POST, "/create_oidc_config", Some(&body))
            .await?
            .is_none()
        {
            return Ok(Ensured::DryRun);
        }

        info!(provider = %settings.display_name, "OIDC config created");
        Ok(Ensured::Created(()))
    }
}
