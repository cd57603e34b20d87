//! Vault unseal, KV storage and OIDC auth.

mod client;
mod models;

pub use client::VaultClient;
pub use models::{SealStatus, VaultInit, VaultOidcSettings};
