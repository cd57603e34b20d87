//! Admin API clients for the self-hosted platform services.
//!
//! Each client wraps the service's REST API and exposes idempotent
//! `ensure_*` helpers: look the resource up by its unique name, return it if
//! present, create it otherwise. Mutating calls are suppressed when the
//! client runs in dry-run mode.
//!
//! # Example
//!
//! ```rust,ignore
//! use platform_apis::{ClientOptions, keycloak::KeycloakClient};
//!
//! let kc = KeycloakClient::login("https://keycloak.example.com", "admin", pw, ClientOptions::default()).await?;
//! let realm = kc.ensure_realm("platform", Some("Platform")).await?;
//! println!("realm {}", realm.label());
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod error;
pub mod gitlab;
pub mod harbor;
pub mod http;
pub mod kasm;
pub mod keycloak;
pub mod retry;
pub mod upsert;
pub mod vault;

pub use error::ApiError;
pub use http::{Auth, ClientOptions, RestClient};
pub use retry::RetryPolicy;
pub use upsert::Ensured;
