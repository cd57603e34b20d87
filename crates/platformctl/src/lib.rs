//! Bootstrap and teardown of the self-hosted platform.
//!
//! The `deploy` flow configures Vault, Keycloak, Harbor, the Git forge, KASM
//! and ArgoCD through their admin APIs. The `destroy` flow removes the
//! cluster with Terraform and cleans up what it leaves behind on Harvester.
//! Both are split into numbered phases that can be resumed with `--from`.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]

pub mod argocd;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod destroy;
pub mod forge;
pub mod manifests;
pub mod phases;
pub mod process;
pub mod secrets;
pub mod services;
pub mod ui;

pub use config::{ConfigError, PlatformConfig};
pub use phases::{Phase, PhaseExecutor, PhaseOutcome, PhaseRunner, RunReport};
