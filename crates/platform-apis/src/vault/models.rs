//! Vault HTTP API models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Output of `vault operator init -format=json`, as saved on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultInit {
    /// Base64-encoded unseal key shares.
    pub unseal_keys_b64: Vec<String>,
    /// Number of shares needed to unseal.
    #[serde(default = "default_threshold")]
    pub unseal_threshold: usize,
    /// Initial root token.
    pub root_token: String,
}

fn default_threshold() -> usize {
    3
}

impl VaultInit {
    /// Parse the init document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or holds fewer keys than
    /// the threshold.
    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        let init: Self = serde_json::from_str(raw)?;
        if init.root_token.is_empty() {
            return Err(ApiError::Config("vault init file has an empty root_token".into()));
        }
        if init.unseal_keys_b64.len() < init.unseal_threshold {
            return Err(ApiError::Config(format!(
                "vault init file holds {} unseal keys, threshold is {}",
                init.unseal_keys_b64.len(),
                init.unseal_threshold
            )));
        }
        Ok(init)
    }

    /// The key shares needed to reach the threshold.
    #[must_use]
    pub fn threshold_keys(&self) -> &[String] {
        &self.unseal_keys_b64[..self.unseal_threshold.min(self.unseal_keys_b64.len())]
    }
}

/// `GET /sys/seal-status`.
#[derive(Debug, Clone, Deserialize)]
pub struct SealStatus {
    pub initialized: bool,
    pub sealed: bool,
    /// Threshold.
    #[serde(rename = "t", default)]
    pub threshold: u32,
    /// Shares supplied so far.
    #[serde(default)]
    pub progress: u32,
}

/// OIDC auth method settings.
#[derive(Debug, Clone)]
pub struct VaultOidcSettings {
    /// Realm issuer URL used for discovery.
    pub discovery_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URIs allowed for the default role (UI and CLI callbacks).
    pub redirect_uris: Vec<String>,
    /// Policies granted to users logging in through the default role.
    pub policies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnsealRequest<'a> {
    pub key: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnableMount {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SecretData<'a> {
    pub data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OidcConfigRequest<'a> {
    pub oidc_discovery_url: &'a str,
    pub oidc_client_id: &'a str,
    pub oidc_client_secret: &'a str,
    pub default_role: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct OidcRoleRequest<'a> {
    pub role_type: &'static str,
    pub user_claim: &'static str,
    pub groups_claim: &'static str,
    pub allowed_redirect_uris: &'a [String],
    pub oidc_scopes: &'static str,
    pub token_policies: &'a [String],
}

/// Whether `name/` appears in a `sys/mounts` or `sys/auth` listing. Newer
/// servers nest the table under `data`.
pub(crate) fn listing_contains(listing: &serde_json::Value, name: &str) -> bool {
    let key = format!("{}/", name.trim_end_matches('/'));
    let table = listing.get("data").unwrap_or(listing);
    table.get(&key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_init_parsing() {
        let raw = r#"{
            "unseal_keys_b64": ["a", "b", "c", "d", "e"],
            "unseal_keys_hex": ["1", "2", "3", "4", "5"],
            "unseal_threshold": 3,
            "root_token": "hvs.root"
        }"#;
        let init = VaultInit::from_json(raw).unwrap();
        assert_eq!(init.root_token, "hvs.root");
        assert_eq!(init.threshold_keys(), ["a", "b", "c"]);
    }

    #[test]
    fn test_vault_init_rejects_short_key_list() {
        let raw = r#"{"unseal_keys_b64": ["a"], "unseal_threshold": 3, "root_token": "t"}"#;
        assert!(matches!(VaultInit::from_json(raw), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_listing_contains() {
        let nested = serde_json::json!({"data": {"secret/": {"type": "kv"}}});
        assert!(listing_contains(&nested, "secret"));
        let flat = serde_json::json!({"oidc/": {"type": "oidc"}});
        assert!(listing_contains(&flat, "oidc"));
        assert!(!listing_contains(&flat, "secret"));
    }
}
