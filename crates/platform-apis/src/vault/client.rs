//! Vault HTTP API client.
//!
//! API Documentation: <https://developer.hashicorp.com/vault/api-docs>

use std::collections::BTreeMap;

use reqwest::Method;
use tracing::{debug, info};

use super::models::{
    listing_contains, EnableMount, OidcConfigRequest, OidcRoleRequest, SealStatus, SecretData,
    UnsealRequest, VaultOidcSettings,
};
use crate::error::ApiError;
use crate::http::{Auth, ClientOptions, RestClient};
use crate::upsert::Ensured;

const SERVICE: &str = "vault";

/// Name of the role created for OIDC logins.
const OIDC_DEFAULT_ROLE: &str = "default";

/// Vault client authenticated with a token.
#[derive(Debug)]
pub struct VaultClient {
    rest: RestClient,
}

impl VaultClient {
    /// Create a new client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client cannot be created.
    pub fn new(base_url: &str, token: impl Into<String>, options: ClientOptions) -> Result<Self, ApiError> {
        let api_url = format!("{}/v1", base_url.trim_end_matches('/'));
        let auth = Auth::Header {
            name: "X-Vault-Token",
            value: token.into(),
        };
        Ok(Self {
            rest: RestClient::new(SERVICE, api_url, auth, options)?,
        })
    }

    /// Current seal state.
    ///
    /// # Errors
    ///
    /// Returns an error if Vault is unreachable.
    pub async fn seal_status(&self) -> Result<SealStatus, ApiError> {
        self.rest.get_json("/sys/seal-status").await
    }

    /// Submit unseal key shares until Vault reports unsealed.
    ///
    /// Returns the final seal status. In dry-run mode no key is submitted and
    /// the current status is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is rejected or Vault is still sealed after
    /// every key was applied.
    pub async fn unseal(&self, keys: &[String]) -> Result<SealStatus, ApiError> {
        let mut status = self.seal_status().await?;
        if !status.initialized {
            return Err(ApiError::Config("vault is not initialized".into()));
        }
        if !status.sealed {
            debug!("Vault already unsealed");
            return Ok(status);
        }

        for (i, key) in keys.iter().enumerate() {
            debug!(share = i + 1, total = keys.len(), "Applying unseal key");
            let Some(response) = self
                .rest
                .mutate(Method::PUT, "/sys/unseal", Some(&UnsealRequest { key }))
                .await?
            else {
                return Ok(status);
            };
            status = response.json()?;
            if !status.sealed {
                info!(shares = i + 1, "Vault unsealed");
                return Ok(status);
            }
        }

        Err(ApiError::unexpected(
            SERVICE,
            format!(
                "still sealed after {} keys (progress {}/{})",
                keys.len(),
                status.progress,
                status.threshold
            ),
        ))
    }

    /// Enable a KV v2 secrets engine at `mount` if it is not mounted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing or mount call fails.
    pub async fn ensure_kv_mount(&self, mount: &str) -> Result<Ensured<()>, ApiError> {
        let mounts: serde_json::Value = self.rest.get_json("/sys/mounts").await?;
        if listing_contains(&mounts, mount) {
            debug!(mount, "Secrets engine already mounted");
            return Ok(Ensured::Existing(()));
        }

        let body = EnableMount {
            kind: "kv",
            options: BTreeMap::from([("version", "2")]),
        };
        let path = format!("/sys/mounts/{}", mount.trim_matches('/'));
        if self.rest.mutate(Method::POST, &path, Some(&body)).await?.is_none() {
            return Ok(Ensured::DryRun);
        }

        info!(mount, "KV v2 secrets engine enabled");
        Ok(Ensured::Created(()))
    }

    /// Write a KV v2 secret. Overwrites the current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_secret(
        &self,
        mount: &str,
        path: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        let url = format!("/{}/data/{}", mount.trim_matches('/'), path.trim_matches('/'));
        if self
            .rest
            .mutate(Method::POST, &url, Some(&SecretData { data }))
            .await?
            .is_some()
        {
            debug!(mount, path, keys = data.len(), "Secret written");
        }
        Ok(())
    }

    /// Enable the `oidc` auth method if absent, then write its config and the
    /// default role. Config and role writes are upserts on the Vault side.
    ///
    /// # Errors
    ///
    /// Returns an error if any call fails.
    pub async fn ensure_oidc_auth(&self, settings: &VaultOidcSettings) -> Result<Ensured<()>, ApiError> {
        let methods: serde_json::Value = self.rest.get_json("/sys/auth").await?;
        let existed = listing_contains(&methods, "oidc");

        if !existed {
            let body = EnableMount {
                kind: "oidc",
                options: BTreeMap::new(),
            };
            if self.rest.mutate(Method::POST, "/sys/auth/oidc", Some(&body)).await?.is_none() {
                return Ok(Ensured::DryRun);
            }
            info!("OIDC auth method enabled");
        }

        let config = OidcConfigRequest {
            oidc_discovery_url: &settings.discovery_url,
            oidc_client_id: &settings.client_id,
            oidc_client_secret: &settings.client_secret,
            default_role: OIDC_DEFAULT_ROLE,
        };
        if self
            .rest
            .mutate(Method::POST, "/auth/oidc/config", Some(&config))
            .await?
            .is_none()
        {
            return Ok(if existed { Ensured::Existing(()) } else { Ensured::DryRun });
        }

        let role = OidcRoleRequest {
            role_type: "oidc",
            user_claim: "preferred_username",
            groups_claim: "groups",
            allowed_redirect_uris: &settings.redirect_uris,
            oidc_scopes: "openid,profile,email",
            token_policies: &settings.policies,
        };
        let role_path = format!("/auth/oidc/role/{OIDC_DEFAULT_ROLE}");
        self.rest.mutate(Method::POST, &role_path, Some(&role)).await?;
        debug!(role = OIDC_DEFAULT_ROLE, "OIDC role written");

        Ok(if existed { Ensured::Existing(()) } else { Ensured::Created(()) })
    }
}
