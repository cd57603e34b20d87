//! KASM admin API models.
//!
//! The API is RPC-style: every call is a POST whose JSON body carries the
//! API key pair next to the payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct Envelope<'a, T: Serialize> {
    pub api_key: &'a str,
    pub api_key_secret: &'a str,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Serialize)]
pub(crate) struct Empty {}

/// User group.
#[derive(Debug, Clone, Deserialize)]
pub struct KasmGroup {
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub priority: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupsResponse {
    #[serde(default)]
    pub groups: Vec<KasmGroup>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupResponse {
    pub group: KasmGroup,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateGroup<'a> {
    pub target_group: TargetGroup<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TargetGroup<'a> {
    pub name: &'a str,
    pub priority: u32,
    pub description: String,
}

/// OIDC configuration as listed by KASM.
#[derive(Debug, Clone, Deserialize)]
pub struct KasmOidcConfig {
    pub oidc_id: String,
    pub display_name: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OidcConfigsResponse {
    #[serde(default)]
    pub oidc_configs: Vec<KasmOidcConfig>,
}

/// Desired OIDC login configuration.
#[derive(Debug, Clone)]
pub struct KasmOidcSettings {
    /// Button label on the login page; also the lookup key.
    pub display_name: String,
    pub client_id: String,
    pub client_secret: String,
    /// Realm issuer URL.
    pub issuer: String,
    /// Public URL of the KASM instance.
    pub kasm_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateOidcConfig<'a> {
    pub target_oidc_config: TargetOidcConfig<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TargetOidcConfig<'a> {
    pub display_name: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub auth_url: String,
    pub token_url: String,
    pub user_info_url: String,
    pub redirect_url: String,
    pub scope: &'static str,
    pub username_attribute: &'static str,
    pub groups_attribute: &'static str,
    pub enabled: bool,
    pub auto_login: bool,
}

impl<'a> From<&'a KasmOidcSettings> for TargetOidcConfig<'a> {
    fn from(s: &'a KasmOidcSettings) -> Self {
        let issuer = s.issuer.trim_end_matches('/');
        Self {
            display_name: &s.display_name,
            client_id: &s.client_id,
            client_secret: &s.client_secret,
            auth_url: format!("{issuer}/protocol/openid-connect/auth"),
            token_url: format!("{issuer}/protocol/openid-connect/token"),
            user_info_url: format!("{issuer}/protocol/openid-connect/userinfo"),
            redirect_url: format!("{}/api/oidc_callback", s.kasm_url.trim_end_matches('/')),
            scope: "openid email profile",
            username_attribute: "preferred_username",
            groups_attribute: "groups",
            enabled: true,
            auto_login: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_flattens_payload() {
        let body = Envelope {
            api_key: "k",
            api_key_secret: "s",
            payload: CreateGroup {
                target_group: TargetGroup {
                    name: "developers",
                    priority: 50,
                    description: String::new(),
                },
            },
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["api_key"], "k");
        assert_eq!(json["api_key_secret"], "s");
        assert_eq!(json["target_group"]["name"], "developers");
    }

    #[test]
    fn test_oidc_endpoints_derived_from_issuer() {
        let settings = KasmOidcSettings {
            display_name: "Keycloak".into(),
            client_id: "kasm".into(),
            client_secret: "secret".into(),
            issuer: "https://kc.example.com/realms/platform/".into(),
            kasm_url: "https://kasm.example.com".into(),
        };
        let config = TargetOidcConfig::from(&settings);
        assert_eq!(
            config.token_url,
            "https://kc.example.com/realms/platform/protocol/openid-connect/token"
        );
        assert_eq!(config.redirect_url, "https://kasm.example.com/api/oidc_callback");
    }
}
