//! KASM Workspaces groups and OIDC login.

mod client;
mod models;

pub use client::KasmClient;
pub use models::{KasmGroup, KasmOidcConfig, KasmOidcSettings};
