//! Harbor registry projects, robot accounts and OIDC settings.

mod client;
mod models;

pub use client::{robot_full_name, HarborClient};
pub use models::{HarborOidcSettings, Robot, RobotCredential};
