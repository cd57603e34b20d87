//! Platform configuration.
//!
//! Settings come from a `.env`-style file overlaid by the process
//! environment and are resolved once into a [`PlatformConfig`] that is passed
//! explicitly to every phase. Nothing here mutates the process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Values accepted as "true" for boolean settings.
const TRUTHY: &[&str] = &["true", "1", "yes", "on"];

/// Prefix of feature-flag keys.
const FEATURE_PREFIX: &str = "DEPLOY_";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required key is absent or empty.
    #[error("{0} is not set (add it to the env file or export it)")]
    Missing(&'static str),

    /// A key holds a value that cannot be used.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// The env file exists but cannot be parsed.
    #[error("failed to read {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Raw key/value settings before interpretation.
#[derive(Debug, Clone, Default)]
pub struct EnvMap(BTreeMap<String, String>);

impl EnvMap {
    /// Parse `env_file` (if it exists) and overlay the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed.
    pub fn load(env_file: &Path) -> Result<Self, ConfigError> {
        let mut map = Self::from_file(env_file)?;
        map.overlay(std::env::vars());
        Ok(map)
    }

    /// Parse only the env file. A missing file yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed.
    pub fn from_file(env_file: &Path) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        if !env_file.exists() {
            debug!(path = %env_file.display(), "No env file, using process environment only");
            return Ok(Self(map));
        }

        let to_err = |source| ConfigError::EnvFile {
            path: env_file.to_path_buf(),
            source,
        };
        for item in dotenvy::from_path_iter(env_file).map_err(to_err)? {
            let (key, value) = item.map_err(to_err)?;
            map.insert(key, value);
        }
        debug!(path = %env_file.display(), keys = map.len(), "Loaded env file");
        Ok(Self(map))
    }

    /// Later values win.
    pub fn overlay(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        self.0.extend(vars);
    }

    /// Non-empty value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: impl FnOnce() -> String) -> String {
        self.get(key).map_or_else(default, ToString::to_string)
    }

    fn path_or(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.get(key).unwrap_or(default))
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    fn list_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
            None => default.iter().map(ToString::to_string).collect(),
        }
    }

    fn features(&self) -> Features {
        Features(
            self.0
                .iter()
                .filter(|(k, _)| k.starts_with(FEATURE_PREFIX))
                .map(|(k, v)| (k.clone(), is_truthy(v)))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn is_truthy(value: &str) -> bool {
    TRUTHY.contains(&value.trim().to_lowercase().as_str())
}

/// `DEPLOY_*` feature flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features(BTreeMap<String, bool>);

impl Features {
    /// Whether `flag` is set to a truthy value. Unknown flags are off.
    #[must_use]
    pub fn enabled(&self, flag: &str) -> bool {
        self.0.get(flag).copied().unwrap_or(false)
    }

    /// Builder used by tests and the manifests command.
    #[must_use]
    pub fn with(mut self, flag: &str, enabled: bool) -> Self {
        self.0.insert(flag.to_string(), enabled);
        self
    }
}

/// Where the platform's Git repositories live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForgeKind {
    #[default]
    GitLab,
    GitHub,
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitLab => write!(f, "gitlab"),
            Self::GitHub => write!(f, "github"),
        }
    }
}

impl std::str::FromStr for ForgeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitlab" => Ok(Self::GitLab),
            "github" => Ok(Self::GitHub),
            _ => Err(anyhow::anyhow!("Unknown forge: {s}. Supported: gitlab, github")),
        }
    }
}

/// Initial platform administrator created in the realm.
#[derive(Debug, Clone)]
pub struct PlatformAdmin {
    pub username: String,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    // Identity
    /// Base domain; service URLs default to `https://<service>.<domain>`.
    pub domain: String,
    pub realm: String,
    pub admin_group: String,
    pub developer_group: String,
    pub platform_admin: Option<PlatformAdmin>,

    // Keycloak
    pub keycloak_url: String,
    pub keycloak_admin_user: String,
    pub keycloak_admin_password: Option<String>,

    // Vault
    pub vault_url: String,
    pub vault_init_file: PathBuf,
    /// Overrides the root token from the init file.
    pub vault_token: Option<String>,

    // Harbor
    pub harbor_url: String,
    pub harbor_admin_user: String,
    pub harbor_admin_password: Option<String>,
    pub harbor_projects: Vec<String>,

    // Git forge
    pub forge: ForgeKind,
    pub gitlab_url: String,
    pub gitlab_group: String,
    pub gitlab_token: Option<String>,
    pub github_org: Option<String>,
    /// Public key registered as a read-only deploy key on every project.
    pub deploy_key_file: Option<PathBuf>,

    // KASM
    pub kasm_url: String,
    pub kasm_api_key: Option<String>,
    pub kasm_api_secret: Option<String>,

    // ArgoCD and manifests
    pub argocd_url: String,
    pub argocd_namespace: String,
    pub grafana_url: String,
    pub repo_root: PathBuf,
    pub manifests_dir: PathBuf,
    pub apps_repo_url: String,
    pub apps_repo_revision: String,

    // Kubernetes and teardown
    pub kubeconfig: Option<PathBuf>,
    pub kube_context: Option<String>,
    pub harvester_kubeconfig: Option<PathBuf>,
    pub harvester_namespace: String,
    pub cluster_name: String,
    pub terraform_dir: PathBuf,

    // Local state
    pub state_dir: PathBuf,
    pub insecure_tls: bool,
    pub features: Features,
}

impl PlatformConfig {
    /// Load from an env file plus the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or required keys are missing.
    pub fn load(env_file: &Path) -> Result<Self, ConfigError> {
        Self::from_env(&EnvMap::load(env_file)?)
    }

    /// Resolve a configuration from raw settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `DOMAIN` is missing or a value is invalid.
    pub fn from_env(env: &EnvMap) -> Result<Self, ConfigError> {
        let domain = env
            .get("DOMAIN")
            .ok_or(ConfigError::Missing("DOMAIN"))?
            .trim()
            .trim_end_matches('.')
            .to_lowercase();
        if domain.contains('/') || domain.contains(' ') {
            return Err(ConfigError::Invalid {
                key: "DOMAIN",
                reason: format!("'{domain}' is not a bare domain name"),
            });
        }

        let service_url = |key: &str, host: &str| env.string_or(key, || format!("https://{host}.{domain}"));

        let forge = match env.get("GIT_FORGE") {
            Some(raw) => raw.parse().map_err(|e: anyhow::Error| ConfigError::Invalid {
                key: "GIT_FORGE",
                reason: e.to_string(),
            })?,
            None => ForgeKind::default(),
        };

        let gitlab_url = service_url("GITLAB_URL", "gitlab");
        let gitlab_group = env.string_or("GITLAB_GROUP", || "platform".to_string());
        let github_org = env.get("GITHUB_ORG").map(ToString::to_string);
        if forge == ForgeKind::GitHub && github_org.is_none() {
            return Err(ConfigError::Missing("GITHUB_ORG"));
        }

        let apps_repo_url = env.string_or("APPS_REPO_URL", || match (forge, &github_org) {
            (ForgeKind::GitHub, Some(org)) => format!("https://github.com/{org}/platform.git"),
            _ => format!("{gitlab_url}/{gitlab_group}/platform.git"),
        });

        let platform_admin = env.get("PLATFORM_ADMIN_USER").map(|username| PlatformAdmin {
            username: username.to_string(),
            email: env.get("PLATFORM_ADMIN_EMAIL").map(ToString::to_string),
            password: env.get("PLATFORM_ADMIN_PASSWORD").map(ToString::to_string),
        });

        Ok(Self {
            realm: env.string_or("KEYCLOAK_REALM", || "platform".to_string()),
            admin_group: env.string_or("ADMIN_GROUP", || "platform-admins".to_string()),
            developer_group: env.string_or("DEVELOPER_GROUP", || "platform-developers".to_string()),
            platform_admin,

            keycloak_url: service_url("KEYCLOAK_URL", "keycloak"),
            keycloak_admin_user: env.string_or("KEYCLOAK_ADMIN", || "admin".to_string()),
            keycloak_admin_password: env.get("KEYCLOAK_ADMIN_PASSWORD").map(ToString::to_string),

            vault_url: service_url("VAULT_URL", "vault"),
            vault_init_file: env.path_or("VAULT_INIT_FILE", "vault-init.json"),
            vault_token: env.get("VAULT_TOKEN").map(ToString::to_string),

            harbor_url: service_url("HARBOR_URL", "harbor"),
            harbor_admin_user: env.string_or("HARBOR_ADMIN_USER", || "admin".to_string()),
            harbor_admin_password: env.get("HARBOR_ADMIN_PASSWORD").map(ToString::to_string),
            harbor_projects: env.list_or("HARBOR_PROJECTS", &["platform"]),

            forge,
            gitlab_url,
            gitlab_group,
            gitlab_token: env.get("GITLAB_TOKEN").map(ToString::to_string),
            github_org,
            deploy_key_file: env.get("DEPLOY_KEY_FILE").map(PathBuf::from),

            kasm_url: service_url("KASM_URL", "kasm"),
            kasm_api_key: env.get("KASM_API_KEY").map(ToString::to_string),
            kasm_api_secret: env.get("KASM_API_SECRET").map(ToString::to_string),

            argocd_url: service_url("ARGOCD_URL", "argocd"),
            argocd_namespace: env.string_or("ARGOCD_NAMESPACE", || "argocd".to_string()),
            grafana_url: service_url("GRAFANA_URL", "grafana"),
            repo_root: env.path_or("REPO_ROOT", "."),
            manifests_dir: env.path_or("MANIFESTS_DIR", "argocd/applications"),
            apps_repo_url,
            apps_repo_revision: env.string_or("APPS_REPO_REVISION", || "main".to_string()),

            kubeconfig: env.get("KUBECONFIG").map(PathBuf::from),
            kube_context: env.get("KUBE_CONTEXT").map(ToString::to_string),
            harvester_kubeconfig: env.get("HARVESTER_KUBECONFIG").map(PathBuf::from),
            harvester_namespace: env.string_or("HARVESTER_NAMESPACE", || "default".to_string()),
            cluster_name: env.string_or("CLUSTER_NAME", || "rke2".to_string()),
            terraform_dir: env.path_or("TERRAFORM_DIR", "terraform"),

            state_dir: env.path_or("PLATFORM_STATE_DIR", ".platform"),
            insecure_tls: env.flag("TLS_INSECURE"),
            features: env.features(),
            domain,
        })
    }

    /// Realm issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!("{}/realms/{}", self.keycloak_url.trim_end_matches('/'), self.realm)
    }

    /// `{client_id: secret}` JSON file.
    #[must_use]
    pub fn client_secrets_file(&self) -> PathBuf {
        self.state_dir.join("oidc-client-secrets.json")
    }

    /// Harbor robot credentials JSON file.
    #[must_use]
    pub fn robot_credentials_file(&self) -> PathBuf {
        self.state_dir.join("harbor-robots.json")
    }

    /// Append-only credentials log.
    #[must_use]
    pub fn credentials_log_file(&self) -> PathBuf {
        self.state_dir.join("credentials.log")
    }

    /// Saved GitLab token.
    #[must_use]
    pub fn gitlab_token_file(&self) -> PathBuf {
        self.state_dir.join("gitlab-token")
    }
}
