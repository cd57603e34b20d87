//! ArgoCD single sign-on through Keycloak.
//!
//! SSO is configured by merge-patching three objects in the ArgoCD
//! namespace: `argocd-cm` (issuer and client), `argocd-secret` (client
//! secret) and `argocd-rbac-cm` (group to role bindings).

use std::path::Path;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

/// Key in `argocd-secret` referenced from `oidc.config` as `$<key>`.
pub const CLIENT_SECRET_KEY: &str = "oidc.keycloak.clientSecret";

/// Build a kube client from an explicit kubeconfig/context, or from the
/// default inference chain.
///
/// # Errors
///
/// Returns an error if the kubeconfig cannot be read or the client cannot be
/// created.
pub async fn kube_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client> {
    let options = KubeConfigOptions {
        context: context.map(ToString::to_string),
        ..KubeConfigOptions::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig from {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .context("Failed to create Kubernetes config from kubeconfig")?
        }
        None if context.is_some() => Config::from_kubeconfig(&options)
            .await
            .context("Failed to load kubeconfig context")?,
        None => Config::infer().await.context("Failed to infer Kubernetes config")?,
    };

    Client::try_from(config).context("Failed to create Kubernetes client")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OidcConfig<'a> {
    name: &'a str,
    issuer: &'a str,
    #[serde(rename = "clientID")]
    client_id: &'a str,
    client_secret: String,
    requested_scopes: [&'static str; 4],
}

/// Settings for ArgoCD SSO.
#[derive(Debug, Clone)]
pub struct ArgoCdSso {
    pub argocd_url: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub admin_group: String,
    pub developer_group: String,
}

impl ArgoCdSso {
    /// Merge patch for `argocd-cm`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OIDC block cannot be serialized.
    pub fn config_map_patch(&self) -> Result<Value> {
        let oidc = OidcConfig {
            name: "Keycloak",
            issuer: &self.issuer,
            client_id: &self.client_id,
            client_secret: format!("${CLIENT_SECRET_KEY}"),
            requested_scopes: ["openid", "profile", "email", "groups"],
        };
        let oidc = serde_yaml::to_string(&oidc).context("Failed to render oidc.config")?;
        Ok(json!({
            "data": {
                "url": self.argocd_url.trim_end_matches('/'),
                "oidc.config": oidc,
            }
        }))
    }

    /// Merge patch for `argocd-secret`.
    #[must_use]
    pub fn secret_patch(&self) -> Value {
        json!({
            "stringData": {
                CLIENT_SECRET_KEY: self.client_secret,
            }
        })
    }

    /// Merge patch for `argocd-rbac-cm`.
    #[must_use]
    pub fn rbac_patch(&self) -> Value {
        let policy = format!(
            "g, {}, role:admin\ng, {}, role:readonly\n",
            self.admin_group, self.developer_group
        );
        json!({
            "data": {
                "policy.default": "",
                "policy.csv": policy,
                "scopes": "[groups]",
            }
        })
    }

    /// Apply all three patches.
    ///
    /// # Errors
    ///
    /// Returns an error if an object is missing or a patch is rejected.
    pub async fn apply(&self, client: Client, namespace: &str) -> Result<()> {
        let params = PatchParams::default();
        let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
        let secrets: Api<Secret> = Api::namespaced(client, namespace);

        config_maps
            .patch("argocd-cm", &params, &Patch::Merge(&self.config_map_patch()?))
            .await
            .context("Failed to patch argocd-cm")?;
        info!(namespace, "Patched argocd-cm");

        secrets
            .patch("argocd-secret", &params, &Patch::Merge(&self.secret_patch()))
            .await
            .context("Failed to patch argocd-secret")?;
        info!(namespace, "Patched argocd-secret");

        config_maps
            .patch("argocd-rbac-cm", &params, &Patch::Merge(&self.rbac_patch()))
            .await
            .context("Failed to patch argocd-rbac-cm")?;
        info!(namespace, "Patched argocd-rbac-cm");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sso() -> ArgoCdSso {
        ArgoCdSso {
            argocd_url: "https://argocd.example.com/".to_string(),
            issuer: "https://keycloak.example.com/realms/platform".to_string(),
            client_id: "argocd".to_string(),
            client_secret: "s3cret".to_string(),
            admin_group: "platform-admins".to_string(),
            developer_group: "platform-developers".to_string(),
        }
    }

    #[test]
    fn test_config_map_patch() {
        let patch = sso().config_map_patch().unwrap();
        assert_eq!(patch["data"]["url"], "https://argocd.example.com");

        let oidc: serde_yaml::Value = serde_yaml::from_str(patch["data"]["oidc.config"].as_str().unwrap()).unwrap();
        assert_eq!(oidc["issuer"], "https://keycloak.example.com/realms/platform");
        assert_eq!(oidc["clientID"], "argocd");
        assert_eq!(oidc["clientSecret"], "$oidc.keycloak.clientSecret");
        assert_eq!(oidc["requestedScopes"].as_sequence().unwrap().len(), 4);
    }

    #[test]
    fn test_secret_patch_holds_secret() {
        let patch = sso().secret_patch();
        assert_eq!(patch["stringData"][CLIENT_SECRET_KEY], "s3cret");
    }

    #[test]
    fn test_rbac_patch_binds_groups() {
        let patch = sso().rbac_patch();
        let csv = patch["data"]["policy.csv"].as_str().unwrap();
        assert!(csv.contains("g, platform-admins, role:admin"));
        assert!(csv.contains("g, platform-developers, role:readonly"));
        assert_eq!(patch["data"]["scopes"], "[groups]");
    }
}
