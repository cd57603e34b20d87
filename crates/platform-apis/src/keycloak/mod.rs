//! Keycloak identity provider.
//!
//! Realms, groups, users and OIDC clients are created once and never
//! reconciled afterwards.

mod client;
mod models;

pub use client::KeycloakClient;
pub use models::*;
