//! Keycloak Admin API request and response models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Authentication
// ============================================================================

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for the admin API.
    pub access_token: String,
    /// Lifetime of the token in seconds.
    pub expires_in: u64,
}

// ============================================================================
// Realms, groups, users
// ============================================================================

/// Realm representation (subset).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    /// Realm name.
    pub realm: String,
    /// Whether the realm is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Display name shown on the login page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Group representation (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRepresentation {
    /// Group id.
    pub id: String,
    /// Group name.
    pub name: String,
}

/// User representation (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct UserRepresentation {
    /// User id.
    pub id: String,
    /// Username.
    pub username: String,
}

/// Desired state of a realm user.
#[derive(Debug, Clone)]
pub struct UserSpec {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Initial password.
    pub password: Option<String>,
    /// Force a password change on first login.
    pub temporary_password: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateUserRequest<'a> {
    pub username: &'a str,
    pub enabled: bool,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialRepresentation<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CredentialRepresentation<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: &'a str,
    pub temporary: bool,
}

impl<'a> From<&'a UserSpec> for CreateUserRequest<'a> {
    fn from(spec: &'a UserSpec) -> Self {
        let credentials = spec
            .password
            .as_deref()
            .map(|value| {
                vec![CredentialRepresentation {
                    kind: "password",
                    value,
                    temporary: spec.temporary_password,
                }]
            })
            .unwrap_or_default();

        Self {
            username: &spec.username,
            enabled: true,
            email_verified: true,
            email: spec.email.as_deref(),
            first_name: spec.first_name.as_deref(),
            last_name: spec.last_name.as_deref(),
            credentials,
        }
    }
}

// ============================================================================
// OIDC clients
// ============================================================================

/// Client as returned by `GET /clients?clientId=`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    /// Internal id (UUID).
    pub id: String,
    /// Public client id.
    pub client_id: String,
}

/// Client secret response.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// Secret value.
    pub value: String,
}

/// Desired OIDC client definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcClientSpec {
    /// Public client id (e.g. "argocd").
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Application root URL.
    pub root_url: Option<String>,
    /// Allowed redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Allowed web origins.
    pub web_origins: Vec<String>,
    /// Public clients have no secret (e.g. CLIs using PKCE).
    pub public_client: bool,
}

impl OidcClientSpec {
    /// Confidential client with a single redirect URI under `root_url`.
    #[must_use]
    pub fn confidential(client_id: &str, name: &str, root_url: &str, redirect_path: &str) -> Self {
        let root = root_url.trim_end_matches('/');
        Self {
            client_id: client_id.to_string(),
            name: name.to_string(),
            root_url: Some(root.to_string()),
            redirect_uris: vec![format!("{root}{redirect_path}")],
            web_origins: vec![root.to_string()],
            public_client: false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateClientRequest<'a> {
    pub client_id: &'a str,
    pub name: &'a str,
    pub enabled: bool,
    pub protocol: &'static str,
    pub public_client: bool,
    pub standard_flow_enabled: bool,
    pub direct_access_grants_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_url: Option<&'a str>,
    pub redirect_uris: &'a [String],
    pub web_origins: &'a [String],
    pub attributes: BTreeMap<&'static str, &'static str>,
}

impl<'a> From<&'a OidcClientSpec> for CreateClientRequest<'a> {
    fn from(spec: &'a OidcClientSpec) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("post.logout.redirect.uris", "+");
        if spec.public_client {
            attributes.insert("pkce.code.challenge.method", "S256");
        }

        Self {
            client_id: &spec.client_id,
            name: &spec.name,
            enabled: true,
            protocol: "openid-connect",
            public_client: spec.public_client,
            standard_flow_enabled: true,
            direct_access_grants_enabled: false,
            root_url: spec.root_url.as_deref(),
            redirect_uris: &spec.redirect_uris,
            web_origins: &spec.web_origins,
            attributes,
        }
    }
}

/// Protocol mapper representation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProtocolMapperRequest {
    pub name: &'static str,
    pub protocol: &'static str,
    pub protocol_mapper: &'static str,
    pub config: BTreeMap<&'static str, &'static str>,
}

impl ProtocolMapperRequest {
    /// Group membership mapper emitting a flat `groups` claim.
    pub(crate) fn groups() -> Self {
        let config = BTreeMap::from([
            ("full.path", "false"),
            ("id.token.claim", "true"),
            ("access.token.claim", "true"),
            ("userinfo.token.claim", "true"),
            ("claim.name", "groups"),
        ]);
        Self {
            name: "groups",
            protocol: "openid-connect",
            protocol_mapper: "oidc-group-membership-mapper",
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidential_client_spec() {
        let spec = OidcClientSpec::confidential(
            "argocd",
            "ArgoCD",
            "https://argocd.example.com/",
            "/auth/callback",
        );
        assert_eq!(spec.root_url.as_deref(), Some("https://argocd.example.com"));
        assert_eq!(
            spec.redirect_uris,
            vec!["https://argocd.example.com/auth/callback".to_string()]
        );
        assert!(!spec.public_client);
    }

    #[test]
    fn test_create_client_request_serialization() {
        let spec = OidcClientSpec::confidential("grafana", "Grafana", "https://g.example.com", "/login/generic_oauth");
        let json = serde_json::to_value(CreateClientRequest::from(&spec)).unwrap();
        assert_eq!(json["clientId"], "grafana");
        assert_eq!(json["protocol"], "openid-connect");
        assert_eq!(json["publicClient"], false);
        assert_eq!(json["redirectUris"][0], "https://g.example.com/login/generic_oauth");
        assert!(json["attributes"].get("pkce.code.challenge.method").is_none());
    }

    #[test]
    fn test_create_user_request_without_password() {
        let spec = UserSpec {
            username: "ops".into(),
            email: None,
            first_name: None,
            last_name: None,
            password: None,
            temporary_password: false,
        };
        let json = serde_json::to_value(CreateUserRequest::from(&spec)).unwrap();
        assert_eq!(json["username"], "ops");
        assert!(json.get("credentials").is_none());
        assert!(json.get("email").is_none());
    }
}
