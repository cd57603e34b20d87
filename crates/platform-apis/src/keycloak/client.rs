//! Keycloak Admin REST API client.
//!
//! API Documentation: <https://www.keycloak.org/docs-api/latest/rest-api/>

use std::time::{Duration, Instant};

use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::models::{
    ClientRepresentation, ClientSecret, CreateClientRequest, CreateUserRequest,
    GroupRepresentation, OidcClientSpec, ProtocolMapperRequest, RealmRepresentation,
    TokenResponse, UserRepresentation, UserSpec,
};
use crate::error::ApiError;
use crate::http::{encode_query, encode_segment, Auth, ClientOptions, RestClient};
use crate::upsert::Ensured;

const SERVICE: &str = "keycloak";

/// Token endpoint for the admin CLI client in the master realm.
const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";

/// Refresh the admin token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(15);

/// Keycloak admin client.
#[derive(Debug)]
pub struct KeycloakClient {
    rest: RestClient,
    username: String,
    password: String,
    expires_at: Mutex<Instant>,
}

impl KeycloakClient {
    /// Log in as a master-realm admin.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or authentication fails.
    pub async fn login(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let rest = RestClient::new(SERVICE, base_url, Auth::None, options)?;
        let client = Self {
            rest,
            username: username.into(),
            password: password.into(),
            expires_at: Mutex::new(Instant::now()),
        };
        client.refresh_token().await?;
        Ok(client)
    }

    async fn refresh_token(&self) -> Result<(), ApiError> {
        let form = [
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        // Token requests must not carry a stale bearer header.
        self.rest.set_auth(Auth::None);
        let token: TokenResponse = self.rest.post_form(TOKEN_PATH, &form).await.map_err(|e| {
            match e.status() {
                Some(401 | 400) => ApiError::Auth {
                    service: SERVICE,
                    message: format!("invalid admin credentials for user '{}'", self.username),
                },
                _ => e,
            }
        })?;

        self.rest.set_auth(Auth::Bearer(token.access_token));
        *self.expires_at.lock().await = Instant::now() + Duration::from_secs(token.expires_in);
        debug!(expires_in = token.expires_in, "Obtained Keycloak admin token");
        Ok(())
    }

    async fn ensure_session(&self) -> Result<(), ApiError> {
        let expires_at = *self.expires_at.lock().await;
        if Instant::now() + TOKEN_REFRESH_MARGIN >= expires_at {
            self.refresh_token().await?;
        }
        Ok(())
    }

    // --- Realms ---

    /// Look up a realm by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn find_realm(&self, realm: &str) -> Result<Option<RealmRepresentation>, ApiError> {
        self.ensure_session().await?;
        let path = format!("/admin/realms/{}", encode_segment(realm));
        self.rest.get_optional(&path).await
    }

    /// Create the realm if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_realm(
        &self,
        realm: &str,
        display_name: Option<&str>,
    ) -> Result<Ensured<String>, ApiError> {
        if let Some(existing) = self.find_realm(realm).await? {
            debug!(realm = %existing.realm, "Realm exists");
            return Ok(Ensured::Existing(existing.realm));
        }

        let body = RealmRepresentation {
            realm: realm.to_string(),
            enabled: true,
            display_name: display_name.map(ToString::to_string),
        };
        if self.rest.mutate(Method::POST, "/admin/realms", Some(&body)).await?.is_none() {
            return Ok(Ensured::DryRun);
        }

        info!(realm, "Realm created");
        Ok(Ensured::Created(realm.to_string()))
    }

    // --- Groups ---

    /// Find a top-level group by exact name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn find_group(&self, realm: &str, name: &str) -> Result<Option<GroupRepresentation>, ApiError> {
        self.ensure_session().await?;
        let path = format!(
            "/admin/realms/{}/groups?search={}",
            encode_segment(realm),
            encode_query(name)
        );
        let groups: Vec<GroupRepresentation> = self.rest.get_json(&path).await?;
        Ok(groups.into_iter().find(|g| g.name == name))
    }

    /// Create a top-level group if missing. Returns the group id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_group(&self, realm: &str, name: &str) -> Result<Ensured<String>, ApiError> {
        if let Some(group) = self.find_group(realm, name).await? {
            return Ok(Ensured::Existing(group.id));
        }

        let path = format!("/admin/realms/{}/groups", encode_segment(realm));
        let body = serde_json::json!({ "name": name });
        let Some(response) = self.rest.mutate(Method::POST, &path, Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let id = match response.location_id() {
            Some(id) => id.to_string(),
            None => self
                .find_group(realm, name)
                .await?
                .map(|g| g.id)
                .ok_or_else(|| ApiError::unexpected(SERVICE, format!("group '{name}' missing after create")))?,
        };

        info!(realm, group = name, "Group created");
        Ok(Ensured::Created(id))
    }

    // --- Clients ---

    /// Find a client by its public client id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn find_client(&self, realm: &str, client_id: &str) -> Result<Option<ClientRepresentation>, ApiError> {
        self.ensure_session().await?;
        let path = format!(
            "/admin/realms/{}/clients?clientId={}",
            encode_segment(realm),
            encode_query(client_id)
        );
        let clients: Vec<ClientRepresentation> = self.rest.get_json(&path).await?;
        Ok(clients.into_iter().find(|c| c.client_id == client_id))
    }

    /// Create an OIDC client if missing. Returns the internal client id.
    ///
    /// Existing clients are left untouched, even if redirect URIs changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_client(&self, realm: &str, spec: &OidcClientSpec) -> Result<Ensured<String>, ApiError> {
        if let Some(existing) = self.find_client(realm, &spec.client_id).await? {
            debug!(client_id = %spec.client_id, "Client exists");
            return Ok(Ensured::Existing(existing.id));
        }

        let path = format!("/admin/realms/{}/clients", encode_segment(realm));
        let body = CreateClientRequest::from(spec);
        let Some(response) = self.rest.mutate(Method::POST, &path, Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let id = match response.location_id() {
            Some(id) => id.to_string(),
            None => self
                .find_client(realm, &spec.client_id)
                .await?
                .map(|c| c.id)
                .ok_or_else(|| {
                    ApiError::unexpected(SERVICE, format!("client '{}' missing after create", spec.client_id))
                })?,
        };

        info!(realm, client_id = %spec.client_id, "Client created");
        Ok(Ensured::Created(id))
    }

    /// Read the secret of a confidential client.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn client_secret(&self, realm: &str, internal_id: &str) -> Result<String, ApiError> {
        self.ensure_session().await?;
        let path = format!(
            "/admin/realms/{}/clients/{}/client-secret",
            encode_segment(realm),
            encode_segment(internal_id)
        );
        let secret: ClientSecret = self.rest.get_json(&path).await?;
        Ok(secret.value)
    }

    /// Add a `groups` claim mapper to a client. A 409 (mapper already
    /// present) counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than a conflict.
    pub async fn ensure_groups_mapper(&self, realm: &str, internal_id: &str) -> Result<Ensured<()>, ApiError> {
        self.ensure_session().await?;
        let path = format!(
            "/admin/realms/{}/clients/{}/protocol-mappers/models",
            encode_segment(realm),
            encode_segment(internal_id)
        );

        match self
            .rest
            .mutate(Method::POST, &path, Some(&ProtocolMapperRequest::groups()))
            .await
        {
            Ok(Some(_)) => Ok(Ensured::Created(())),
            Ok(None) => Ok(Ensured::DryRun),
            Err(e) if e.is_conflict() => {
                debug!(realm, client = internal_id, "Groups mapper already present");
                Ok(Ensured::Existing(()))
            }
            Err(e) => Err(e),
        }
    }

    // --- Users ---

    /// Find a user by exact username.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn find_user(&self, realm: &str, username: &str) -> Result<Option<UserRepresentation>, ApiError> {
        self.ensure_session().await?;
        let path = format!(
            "/admin/realms/{}/users?username={}&exact=true",
            encode_segment(realm),
            encode_query(username)
        );
        let users: Vec<UserRepresentation> = self.rest.get_json(&path).await?;
        Ok(users.into_iter().find(|u| u.username == username))
    }

    /// Create a user if missing. Returns the user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or creation fails.
    pub async fn ensure_user(&self, realm: &str, spec: &UserSpec) -> Result<Ensured<String>, ApiError> {
        if let Some(user) = self.find_user(realm, &spec.username).await? {
            return Ok(Ensured::Existing(user.id));
        }

        let path = format!("/admin/realms/{}/users", encode_segment(realm));
        let body = CreateUserRequest::from(spec);
        let Some(response) = self.rest.mutate(Method::POST, &path, Some(&body)).await? else {
            return Ok(Ensured::DryRun);
        };

        let id = match response.location_id() {
            Some(id) => id.to_string(),
            None => self
                .find_user(realm, &spec.username)
                .await?
                .map(|u| u.id)
                .ok_or_else(|| {
                    ApiError::unexpected(SERVICE, format!("user '{}' missing after create", spec.username))
                })?,
        };

        info!(realm, username = %spec.username, "User created");
        Ok(Ensured::Created(id))
    }

    /// Add a user to a group. The call is idempotent on the Keycloak side.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_user_to_group(&self, realm: &str, user_id: &str, group_id: &str) -> Result<(), ApiError> {
        self.ensure_session().await?;
        let path = format!(
            "/admin/realms/{}/users/{}/groups/{}",
            encode_segment(realm),
            encode_segment(user_id),
            encode_segment(group_id)
        );
        if self.rest.mutate::<()>(Method::PUT, &path, None).await?.is_none() {
            warn!(realm, user_id, group_id, "[dry-run] Group membership not applied");
        }
        Ok(())
    }
}
