//! Harvester orphan-resource reconciler.
//!
//! Removes VMs, VM instances, data volumes and PVCs that a destroyed guest
//! cluster left behind on the Harvester host cluster.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
mod error;
pub mod reconciler;
pub mod resources;

pub use api::{DryRunApi, KubeResourceApi, ResourceApi};
pub use error::ReconcileError;
pub use reconciler::{KindCleanup, ReconcileReport, Reconciler, ReconcilerConfig, WaitOutcome};
pub use resources::{OrphanKind, OrphanResource};
