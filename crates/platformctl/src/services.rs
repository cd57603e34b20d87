//! The platform service inventory.

use std::fmt;

use crate::config::Features;

/// ArgoCD sync behaviour for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SyncPolicy {
    /// Automated sync with prune and self-heal.
    #[default]
    #[value(alias = "automated")]
    Auto,
    /// No automation; the operator syncs from the ArgoCD UI.
    Manual,
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A service deployed through ArgoCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    /// Directory holding the service's manifests, relative to the repo root.
    pub source_path: &'static str,
    pub namespace: &'static str,
    pub sync_policy: SyncPolicy,
    /// `DEPLOY_*` flag that must be truthy for the service to be included.
    pub feature_flag: Option<&'static str>,
}

impl ServiceDescriptor {
    const fn core(name: &'static str, source_path: &'static str, namespace: &'static str) -> Self {
        Self {
            name,
            source_path,
            namespace,
            sync_policy: SyncPolicy::Auto,
            feature_flag: None,
        }
    }

    const fn manual(self) -> Self {
        Self {
            sync_policy: SyncPolicy::Manual,
            ..self
        }
    }

    const fn gated(self, flag: &'static str) -> Self {
        Self {
            feature_flag: Some(flag),
            ..self
        }
    }

    /// Whether the service is part of this deployment.
    #[must_use]
    pub fn is_enabled(&self, features: &Features) -> bool {
        self.feature_flag.is_none_or(|flag| features.enabled(flag))
    }
}

/// Every service the platform knows about, in deployment order.
pub const SERVICES: &[ServiceDescriptor] = &[
    ServiceDescriptor::core("cert-manager", "services/cert-manager", "cert-manager"),
    ServiceDescriptor::core("keycloak", "services/keycloak", "keycloak"),
    // Stateful; sealed after every restart, so never auto-synced.
    ServiceDescriptor::core("vault", "services/vault", "vault").manual(),
    ServiceDescriptor::core("harbor", "services/harbor", "harbor"),
    ServiceDescriptor::core("gitlab", "services/gitlab", "gitlab").manual(),
    ServiceDescriptor::core("argo-rollouts", "services/argo-rollouts", "argo-rollouts"),
    ServiceDescriptor::core("monitoring", "services/monitoring", "monitoring"),
    ServiceDescriptor::core("kasm", "services/kasm", "kasm").gated("DEPLOY_KASM"),
    ServiceDescriptor::core("uptime-kuma", "services/uptime-kuma", "uptime-kuma").gated("DEPLOY_UPTIME_KUMA"),
];

/// Services enabled by `features`.
#[must_use]
pub fn enabled_services(features: &Features) -> Vec<&'static ServiceDescriptor> {
    SERVICES.iter().filter(|s| s.is_enabled(features)).collect()
}

/// Look up a service by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static ServiceDescriptor> {
    SERVICES.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_policy_parse() {
        use clap::ValueEnum;

        assert_eq!(SyncPolicy::from_str("auto", true).unwrap(), SyncPolicy::Auto);
        assert_eq!(SyncPolicy::from_str("automated", true).unwrap(), SyncPolicy::Auto);
        assert_eq!(SyncPolicy::from_str("MANUAL", true).unwrap(), SyncPolicy::Manual);
        assert!(SyncPolicy::from_str("sometimes", true).is_err());
        assert_eq!(SyncPolicy::Manual.to_string(), "manual");
    }

    #[test]
    fn test_names_unique() {
        let mut names: Vec<_> = SERVICES.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SERVICES.len());
    }

    #[test]
    fn test_feature_gating() {
        let off = enabled_services(&Features::default());
        assert!(off.iter().all(|s| s.name != "uptime-kuma"));
        assert!(off.iter().any(|s| s.name == "keycloak"));

        let on = enabled_services(&Features::default().with("DEPLOY_UPTIME_KUMA", true));
        assert!(on.iter().any(|s| s.name == "uptime-kuma"));
        assert_eq!(on.len(), off.len() + 1);
    }

    #[test]
    fn test_find() {
        assert_eq!(find("vault").unwrap().sync_policy, SyncPolicy::Manual);
        assert!(find("nope").is_none());
    }
}
