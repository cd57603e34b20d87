//! CLI subcommands.

pub mod deploy;
pub mod destroy;
pub mod manifests;

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::PlatformConfig;

fn load_config(env_file: &Path) -> Result<PlatformConfig> {
    PlatformConfig::load(env_file).with_context(|| format!("Failed to load configuration from {}", env_file.display()))
}
