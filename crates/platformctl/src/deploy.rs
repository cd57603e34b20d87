//! Platform bootstrap flow.
//!
//! Brings a freshly provisioned cluster to a usable platform: unseals Vault,
//! sets up the Keycloak realm and OIDC clients, wires SSO into Vault, Harbor,
//! KASM and ArgoCD, creates Git repositories and registers every service
//! with ArgoCD. Each phase is idempotent, so a failed run is resumed with
//! `--from N`.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use platform_apis::gitlab::GitLabClient;
use platform_apis::harbor::{robot_full_name, HarborClient, HarborOidcSettings};
use platform_apis::kasm::{KasmClient, KasmOidcSettings};
use platform_apis::keycloak::{KeycloakClient, OidcClientSpec, UserSpec};
use platform_apis::vault::{VaultClient, VaultInit, VaultOidcSettings};
use platform_apis::{ClientOptions, Ensured};
use tracing::{debug, info, warn};

use crate::argocd::{self, ArgoCdSso};
use crate::config::{ForgeKind, PlatformConfig};
use crate::forge;
use crate::manifests::{self, ManifestOptions};
use crate::phases::{Phase, PhaseExecutor, PhaseOutcome};
use crate::process::{self, CommandRunner};
use crate::secrets::{resolve_gitlab_token, ClientSecretStore, CredentialsLog, RobotCredentialStore};
use crate::services::{self, SyncPolicy};
use crate::ui;

/// KV v2 mount holding platform secrets.
const KV_MOUNT: &str = "secret";
/// Robot account created in every Harbor project.
const HARBOR_ROBOT: &str = "ci";
/// Vault CLI login callback.
const VAULT_CLI_CALLBACK: &str = "http://localhost:8250/oidc/callback";
/// Used for client secrets that only exist after a real run.
const DRY_RUN_SECRET: &str = "<created-on-real-run>";

/// Deploy phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Preflight,
    VaultUnseal,
    KeycloakRealm,
    KeycloakClients,
    VaultOidc,
    Harbor,
    GitForge,
    Kasm,
    ArgoCd,
    Services,
    Summary,
}

impl Phase for DeployPhase {
    const ALL: &'static [Self] = &[
        Self::Preflight,
        Self::VaultUnseal,
        Self::KeycloakRealm,
        Self::KeycloakClients,
        Self::VaultOidc,
        Self::Harbor,
        Self::GitForge,
        Self::Kasm,
        Self::ArgoCd,
        Self::Services,
        Self::Summary,
    ];
    const FLOW: &'static str = "deploy";

    fn number(self) -> u8 {
        match self {
            Self::Preflight => 1,
            Self::VaultUnseal => 2,
            Self::KeycloakRealm => 3,
            Self::KeycloakClients => 4,
            Self::VaultOidc => 5,
            Self::Harbor => 6,
            Self::GitForge => 7,
            Self::Kasm => 8,
            Self::ArgoCd => 9,
            Self::Services => 10,
            Self::Summary => 11,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Preflight => "Preflight checks",
            Self::VaultUnseal => "Unseal Vault and enable KV storage",
            Self::KeycloakRealm => "Keycloak realm, groups and admin user",
            Self::KeycloakClients => "Keycloak OIDC clients and group mappers",
            Self::VaultOidc => "Vault OIDC login and client secrets",
            Self::Harbor => "Harbor projects, robot accounts and OIDC",
            Self::GitForge => "Git repositories and deploy keys",
            Self::Kasm => "KASM groups and OIDC",
            Self::ArgoCd => "ArgoCD single sign-on",
            Self::Services => "Generate and apply service manifests",
            Self::Summary => "Summary",
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Flags of the deploy command.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub skip_vault: bool,
    pub skip_keycloak: bool,
    pub skip_kasm: bool,
    /// Overrides each service's sync policy.
    pub sync: Option<SyncPolicy>,
    pub dry_run: bool,
    /// Allow interactive prompts (GitLab token).
    pub interactive: bool,
}

/// A Keycloak OIDC client and the platform service using it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformClient {
    pub service: &'static str,
    pub spec: OidcClientSpec,
}

/// OIDC clients registered in the realm for this configuration.
#[must_use]
pub fn oidc_clients(config: &PlatformConfig, options: &DeployOptions) -> Vec<PlatformClient> {
    let mut clients = vec![
        PlatformClient {
            service: "argocd",
            spec: OidcClientSpec::confidential("argocd", "ArgoCD", &config.argocd_url, "/auth/callback"),
        },
        PlatformClient {
            service: "grafana",
            spec: OidcClientSpec::confidential("grafana", "Grafana", &config.grafana_url, "/login/generic_oauth"),
        },
        PlatformClient {
            service: "harbor",
            spec: OidcClientSpec::confidential("harbor", "Harbor", &config.harbor_url, "/c/oidc/callback"),
        },
    ];

    if !options.skip_vault {
        let mut vault = OidcClientSpec::confidential(
            "vault",
            "Vault",
            &config.vault_url,
            "/ui/vault/auth/oidc/oidc/callback",
        );
        vault.redirect_uris.push(VAULT_CLI_CALLBACK.to_string());
        clients.push(PlatformClient { service: "vault", spec: vault });
    }
    if kasm_enabled(config, options) {
        clients.push(PlatformClient {
            service: "kasm",
            spec: OidcClientSpec::confidential("kasm", "KASM Workspaces", &config.kasm_url, "/api/oidc_callback"),
        });
    }
    if config.forge == ForgeKind::GitLab {
        clients.push(PlatformClient {
            service: "gitlab",
            spec: OidcClientSpec::confidential(
                "gitlab",
                "GitLab",
                &config.gitlab_url,
                "/users/auth/openid_connect/callback",
            ),
        });
    }
    clients
}

fn kasm_enabled(config: &PlatformConfig, options: &DeployOptions) -> bool {
    !options.skip_kasm && services::find("kasm").is_some_and(|s| s.is_enabled(&config.features))
}

/// Executes deploy phases against the configured platform.
pub struct Deployer {
    config: PlatformConfig,
    options: DeployOptions,
    http: ClientOptions,
    runner: CommandRunner,
    keycloak: Option<KeycloakClient>,
    secrets: ClientSecretStore,
    robots: RobotCredentialStore,
    log: CredentialsLog,
}

impl Deployer {
    /// Load local state and prepare clients.
    ///
    /// # Errors
    ///
    /// Returns an error if a local credential file is unreadable.
    pub fn new(config: PlatformConfig, options: DeployOptions) -> Result<Self> {
        let http = ClientOptions {
            insecure_tls: config.insecure_tls,
            dry_run: options.dry_run,
            ..ClientOptions::default()
        };
        let runner = CommandRunner::new(options.dry_run)
            .with_kube(config.kubeconfig.clone(), config.kube_context.clone());
        let secrets = ClientSecretStore::load(config.client_secrets_file())?;
        let robots = RobotCredentialStore::load(config.robot_credentials_file())?;
        let log = CredentialsLog::new(config.credentials_log_file());

        Ok(Self {
            config,
            options,
            http,
            runner,
            keycloak: None,
            secrets,
            robots,
            log,
        })
    }

    #[must_use]
    pub fn secrets(&self) -> &ClientSecretStore {
        &self.secrets
    }

    async fn keycloak(&mut self) -> Result<&KeycloakClient> {
        if self.keycloak.is_none() {
            let password = self
                .config
                .keycloak_admin_password
                .as_deref()
                .ok_or_else(|| anyhow!("KEYCLOAK_ADMIN_PASSWORD is not set"))?;
            let client = KeycloakClient::login(
                &self.config.keycloak_url,
                &self.config.keycloak_admin_user,
                password,
                self.http.clone(),
            )
            .await
            .context("Failed to log in to Keycloak")?;
            self.keycloak = Some(client);
        }
        self.keycloak
            .as_ref()
            .ok_or_else(|| anyhow!("Keycloak client unavailable"))
    }

    fn vault_init(&self) -> Result<VaultInit> {
        let path = &self.config.vault_init_file;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read Vault init file {}", path.display()))?;
        VaultInit::from_json(&raw).with_context(|| format!("Invalid Vault init file {}", path.display()))
    }

    fn vault(&self) -> Result<VaultClient> {
        let token = match &self.config.vault_token {
            Some(token) => token.clone(),
            None => self.vault_init()?.root_token,
        };
        Ok(VaultClient::new(&self.config.vault_url, token, self.http.clone())?)
    }

    /// Secret of a confidential client, as saved by phase 4.
    fn client_secret(&self, client_id: &str) -> Result<String> {
        match self.secrets.get(client_id) {
            Some(secret) => Ok(secret.to_string()),
            None if self.options.dry_run => Ok(DRY_RUN_SECRET.to_string()),
            None => bail!(
                "No client secret for '{client_id}' in {}; run phase 4 first",
                self.secrets.path().display()
            ),
        }
    }

    fn record_credential(&self, service: &str, account: &str, secret: &str) {
        if self.options.dry_run {
            return;
        }
        if let Err(e) = self.log.append(service, account, secret) {
            warn!(error = %e, "Failed to append to credentials log");
        }
    }

    fn report<T>(what: &str, outcome: &Ensured<T>) {
        let message = format!("{what} ({})", outcome.label());
        match outcome {
            Ensured::Existing(_) => ui::print_unchanged(&message, None),
            Ensured::Created(_) => ui::print_success(&message),
            Ensured::DryRun => ui::print_action(&message, true),
        }
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn preflight(&self) -> Result<PhaseOutcome> {
        let mut tools = vec!["kubectl"];
        if self.config.forge == ForgeKind::GitHub {
            tools.push("gh");
        }
        match process::require_tools(&tools) {
            Ok(_) => ui::print_success(&format!("Required tools: {}", tools.join(", "))),
            Err(e) if self.options.dry_run => ui::print_warning(&format!("{e} (ignored in dry-run)")),
            Err(e) => return Err(e),
        }

        if !self.options.skip_vault && self.config.vault_token.is_none() {
            self.vault_init()?;
            ui::print_success(&format!("Vault init file: {}", self.config.vault_init_file.display()));
        }
        if !self.options.skip_keycloak && self.config.keycloak_admin_password.is_none() {
            bail!("KEYCLOAK_ADMIN_PASSWORD is not set (use --skip-keycloak to bypass Keycloak phases)");
        }

        ui::print_kv("Domain", &self.config.domain);
        ui::print_kv("Realm", &self.config.realm);
        ui::print_kv("Git forge", &self.config.forge.to_string());
        ui::print_kv("State directory", &self.config.state_dir.display().to_string());
        Ok(PhaseOutcome::Completed)
    }

    async fn vault_unseal(&self) -> Result<PhaseOutcome> {
        if self.options.skip_vault {
            return Ok(PhaseOutcome::skipped("--skip-vault"));
        }

        let init = self.vault_init()?;
        let vault = self.vault()?;
        let status = vault.unseal(init.threshold_keys()).await.context("Failed to unseal Vault")?;
        if status.sealed {
            // Only reachable in dry-run; a sealed Vault answers 503 to everything else.
            ui::print_action("Vault is sealed; unseal keys would be submitted", true);
            ui::print_action(&format!("KV v2 mount '{KV_MOUNT}' would be checked after unseal"), true);
            return Ok(PhaseOutcome::Completed);
        }
        ui::print_success("Vault is unsealed");

        let mount = vault.ensure_kv_mount(KV_MOUNT).await?;
        Self::report(&format!("KV v2 mount '{KV_MOUNT}'"), &mount);
        Ok(PhaseOutcome::Completed)
    }

    async fn keycloak_realm(&mut self) -> Result<PhaseOutcome> {
        if self.options.skip_keycloak {
            return Ok(PhaseOutcome::skipped("--skip-keycloak"));
        }

        let realm = self.config.realm.clone();
        let admin_group = self.config.admin_group.clone();
        let developer_group = self.config.developer_group.clone();
        let admin = self.config.platform_admin.clone();
        let kc = self.keycloak().await?;

        let outcome = kc.ensure_realm(&realm, Some("Platform")).await?;
        Self::report(&format!("Realm '{realm}'"), &outcome);

        if matches!(outcome, Ensured::DryRun) {
            // The realm does not exist yet, so neither does anything in it.
            for group in [&admin_group, &developer_group] {
                Self::report(&format!("Group '{group}'"), &Ensured::<()>::DryRun);
            }
            if let Some(admin) = &admin {
                Self::report(&format!("User '{}'", admin.username), &Ensured::<()>::DryRun);
            }
            return Ok(PhaseOutcome::Completed);
        }

        let admin_group_id = kc.ensure_group(&realm, &admin_group).await?;
        Self::report(&format!("Group '{admin_group}'"), &admin_group_id);
        let developers = kc.ensure_group(&realm, &developer_group).await?;
        Self::report(&format!("Group '{developer_group}'"), &developers);

        let Some(admin) = admin else {
            debug!("No PLATFORM_ADMIN_USER configured");
            return Ok(PhaseOutcome::Completed);
        };

        let spec = UserSpec {
            username: admin.username.clone(),
            email: admin.email.clone(),
            first_name: None,
            last_name: None,
            password: admin.password.clone(),
            temporary_password: true,
        };
        let user = kc.ensure_user(&realm, &spec).await?;
        Self::report(&format!("User '{}'", admin.username), &user);

        if let (Some(user_id), Some(group_id)) = (user.value(), admin_group_id.value()) {
            if user.was_created() {
                kc.add_user_to_group(&realm, user_id, group_id).await?;
                ui::print_success(&format!("Added '{}' to '{admin_group}'", admin.username));
            }
        }
        if user.was_created() {
            if let Some(password) = &admin.password {
                self.record_credential("keycloak", &admin.username, password);
            }
        }
        Ok(PhaseOutcome::Completed)
    }

    async fn keycloak_clients(&mut self) -> Result<PhaseOutcome> {
        if self.options.skip_keycloak {
            return Ok(PhaseOutcome::skipped("--skip-keycloak"));
        }

        let realm = self.config.realm.clone();
        let clients = oidc_clients(&self.config, &self.options);
        let dry_run = self.options.dry_run;
        let mut fetched = Vec::new();
        {
            let kc = self.keycloak().await?;
            if dry_run && kc.find_realm(&realm).await?.is_none() {
                for client in &clients {
                    Self::report(&format!("OIDC client '{}'", client.spec.client_id), &Ensured::<()>::DryRun);
                }
                return Ok(PhaseOutcome::Completed);
            }
            for client in &clients {
                let client_id = &client.spec.client_id;
                let outcome = kc.ensure_client(&realm, &client.spec).await?;
                Self::report(&format!("OIDC client '{client_id}'"), &outcome);

                let Some(internal_id) = outcome.value() else {
                    continue;
                };

                if let Err(e) = kc.ensure_groups_mapper(&realm, internal_id).await {
                    warn!(client = %client_id, error = %e, "Failed to add groups mapper");
                    ui::print_warning(&format!("Groups mapper for '{client_id}' not added: {e}"));
                }

                if !client.spec.public_client {
                    let secret = kc.client_secret(&realm, internal_id).await?;
                    fetched.push((client_id.clone(), secret));
                }
            }
        }

        let mut changed = false;
        for (client_id, secret) in fetched {
            if self.secrets.insert(client_id.clone(), secret.clone()) {
                changed = true;
                self.record_credential("keycloak", &client_id, &secret);
            }
        }
        if changed && !self.options.dry_run {
            self.secrets.save()?;
            ui::print_success(&format!("Client secrets saved to {}", self.secrets.path().display()));
        }
        Ok(PhaseOutcome::Completed)
    }

    async fn vault_oidc(&self) -> Result<PhaseOutcome> {
        if self.options.skip_vault {
            return Ok(PhaseOutcome::skipped("--skip-vault"));
        }

        let vault = self.vault()?;
        if self.options.dry_run && vault.seal_status().await?.sealed {
            ui::print_action("Vault OIDC auth method would be configured after unseal", true);
            return Ok(PhaseOutcome::Completed);
        }
        let settings = VaultOidcSettings {
            discovery_url: self.config.issuer_url(),
            client_id: "vault".to_string(),
            client_secret: self.client_secret("vault")?,
            redirect_uris: vec![
                format!("{}/ui/vault/auth/oidc/oidc/callback", self.config.vault_url.trim_end_matches('/')),
                VAULT_CLI_CALLBACK.to_string(),
            ],
            policies: vec!["default".to_string()],
        };
        let outcome = vault.ensure_oidc_auth(&settings).await?;
        Self::report("Vault OIDC auth method", &outcome);

        let data: BTreeMap<String, String> = self
            .secrets
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if data.is_empty() {
            ui::print_info("No client secrets to store yet");
        } else {
            vault.put_secret(KV_MOUNT, "platform/oidc-clients", &data).await?;
            ui::print_action(
                &format!("Stored {} client secrets at {KV_MOUNT}/platform/oidc-clients", data.len()),
                self.options.dry_run,
            );
        }
        Ok(PhaseOutcome::Completed)
    }

    async fn harbor(&mut self) -> Result<PhaseOutcome> {
        let password = self
            .config
            .harbor_admin_password
            .as_deref()
            .ok_or_else(|| anyhow!("HARBOR_ADMIN_PASSWORD is not set"))?;
        let harbor = HarborClient::new(
            &self.config.harbor_url,
            &self.config.harbor_admin_user,
            password,
            self.http.clone(),
        )?;

        let mut created = Vec::new();
        for project in &self.config.harbor_projects {
            let outcome = harbor.ensure_project(project, false).await?;
            Self::report(&format!("Harbor project '{project}'"), &outcome);

            let full_name = robot_full_name(project, HARBOR_ROBOT);
            if matches!(outcome, Ensured::DryRun) {
                Self::report(&format!("Robot '{full_name}'"), &Ensured::<()>::DryRun);
                continue;
            }
            let robot = harbor.ensure_robot(project, HARBOR_ROBOT).await?;
            Self::report(&format!("Robot '{full_name}'"), &robot);
            match robot {
                Ensured::Created(Some(credential)) => created.push(credential),
                Ensured::Existing(_) if self.robots.get(&full_name).is_none() => {
                    ui::print_warning(&format!(
                        "Secret for '{full_name}' is unknown; delete the robot in Harbor to regenerate it"
                    ));
                }
                _ => {}
            }
        }

        if !created.is_empty() {
            for credential in &created {
                self.record_credential("harbor", &credential.name, &credential.secret);
                self.robots.insert(credential.clone());
            }
            self.robots.save()?;
            if !self.options.skip_vault {
                let data = created
                    .iter()
                    .map(|c| (c.name.clone(), c.secret.clone()))
                    .collect::<BTreeMap<_, _>>();
                self.vault()?.put_secret(KV_MOUNT, "platform/harbor-robots", &data).await?;
            }
        }

        if self.options.skip_keycloak && self.secrets.get("harbor").is_none() {
            ui::print_info("Harbor OIDC not configured: no client secret available");
            return Ok(PhaseOutcome::Completed);
        }
        let settings = HarborOidcSettings {
            provider_name: "Keycloak".to_string(),
            endpoint: self.config.issuer_url(),
            client_id: "harbor".to_string(),
            client_secret: self.client_secret("harbor")?,
            admin_group: self.config.admin_group.clone(),
            verify_cert: !self.config.insecure_tls,
        };
        match harbor.configure_oidc(&settings).await {
            Ok(outcome) => Self::report("Harbor OIDC authentication", &outcome),
            Err(e) => {
                warn!(error = %e, "Harbor rejected OIDC configuration");
                ui::print_warning(&format!(
                    "Harbor OIDC not configured ({e}); Harbor refuses once local users exist"
                ));
            }
        }
        Ok(PhaseOutcome::Completed)
    }

    async fn git_forge(&self) -> Result<PhaseOutcome> {
        let enabled = services::enabled_services(&self.config.features);
        let repositories = forge::repositories(&enabled);

        let report = match self.config.forge {
            ForgeKind::GitLab => {
                let (token, source) = resolve_gitlab_token(
                    self.config.gitlab_token.as_deref(),
                    &self.config.gitlab_token_file(),
                    self.options.interactive,
                )?;
                debug!(?source, "Resolved GitLab token");
                let gitlab = GitLabClient::new(&self.config.gitlab_url, token, self.http.clone())?;

                let deploy_key = match &self.config.deploy_key_file {
                    Some(path) => Some(
                        std::fs::read_to_string(path)
                            .with_context(|| format!("Failed to read deploy key {}", path.display()))?
                            .trim()
                            .to_string(),
                    ),
                    None => None,
                };
                forge::sync_gitlab(&gitlab, &self.config.gitlab_group, &repositories, deploy_key.as_deref()).await?
            }
            ForgeKind::GitHub => {
                let org = self
                    .config
                    .github_org
                    .as_deref()
                    .ok_or_else(|| anyhow!("GITHUB_ORG is not set"))?;
                forge::sync_github(&self.runner, org, &repositories)?
            }
        };

        for repo in &report.existing {
            ui::print_unchanged(&format!("Repository '{repo}'"), Some("exists"));
        }
        for repo in &report.created {
            ui::print_success(&format!("Repository '{repo}' (created)"));
        }
        for repo in &report.planned {
            ui::print_action(&format!("Repository '{repo}' would be created"), true);
        }
        for repo in &report.deploy_key_failures {
            ui::print_warning(&format!("Deploy key not registered on '{repo}'"));
        }
        Ok(PhaseOutcome::Completed)
    }

    async fn kasm(&self) -> Result<PhaseOutcome> {
        if self.options.skip_kasm {
            return Ok(PhaseOutcome::skipped("--skip-kasm"));
        }
        if !kasm_enabled(&self.config, &self.options) {
            return Ok(PhaseOutcome::skipped("DEPLOY_KASM is not enabled"));
        }

        let (Some(key), Some(secret)) = (&self.config.kasm_api_key, &self.config.kasm_api_secret) else {
            bail!("KASM_API_KEY and KASM_API_SECRET must be set when DEPLOY_KASM is enabled");
        };
        let kasm = KasmClient::new(&self.config.kasm_url, key, secret, self.http.clone())?;

        for (group, priority) in [(&self.config.admin_group, 10), (&self.config.developer_group, 50)] {
            let outcome = kasm.ensure_group(group, priority).await?;
            Self::report(&format!("KASM group '{group}'"), &outcome);
        }

        let settings = KasmOidcSettings {
            display_name: "Keycloak".to_string(),
            client_id: "kasm".to_string(),
            client_secret: self.client_secret("kasm")?,
            issuer: self.config.issuer_url(),
            kasm_url: self.config.kasm_url.clone(),
        };
        let outcome = kasm.ensure_oidc_config(&settings).await?;
        Self::report("KASM OIDC login", &outcome);
        Ok(PhaseOutcome::Completed)
    }

    async fn argocd(&self) -> Result<PhaseOutcome> {
        let sso = ArgoCdSso {
            argocd_url: self.config.argocd_url.clone(),
            issuer: self.config.issuer_url(),
            client_id: "argocd".to_string(),
            client_secret: self.client_secret("argocd")?,
            admin_group: self.config.admin_group.clone(),
            developer_group: self.config.developer_group.clone(),
        };
        let namespace = &self.config.argocd_namespace;

        if self.options.dry_run {
            for object in ["argocd-cm", "argocd-secret", "argocd-rbac-cm"] {
                ui::print_action(&format!("Would patch {namespace}/{object}"), true);
            }
            return Ok(PhaseOutcome::Completed);
        }

        let client = argocd::kube_client(self.config.kubeconfig.as_deref(), self.config.kube_context.as_deref()).await?;
        sso.apply(client, namespace).await?;
        ui::print_success("ArgoCD SSO configured");
        Ok(PhaseOutcome::Completed)
    }

    fn services(&self) -> Result<PhaseOutcome> {
        let enabled = services::enabled_services(&self.config.features);
        let mut options = ManifestOptions::new(&self.config.apps_repo_url, &self.config.apps_repo_revision);
        options.argocd_namespace.clone_from(&self.config.argocd_namespace);
        options.sync_override = self.options.sync;

        let out_dir = self.config.repo_root.join(&self.config.manifests_dir);
        let plan = manifests::plan(&self.config.repo_root, &self.config.manifests_dir, &enabled, &options)?;
        for name in &plan.skipped {
            ui::print_warning(&format!("Skipped '{name}': source directory missing"));
        }
        if plan.files.is_empty() {
            return Ok(PhaseOutcome::skipped("no service source directories found"));
        }

        if self.options.dry_run {
            for file in &plan.files {
                ui::print_action(&format!("Would write {}", file.path.display()), true);
            }
        } else {
            plan.write()?;
            ui::print_success(&format!("Wrote {} manifests", plan.files.len()));
        }

        let outcome = self.runner.kubectl_apply(&plan.argocd_documents(&out_dir))?;
        ui::print_action("kubectl apply ArgoCD applications", outcome.was_planned());
        Ok(PhaseOutcome::Completed)
    }

    fn summary(&self) -> PhaseOutcome {
        ui::print_section("Platform endpoints");
        ui::print_kv("Keycloak", &self.config.issuer_url());
        ui::print_kv("ArgoCD", &self.config.argocd_url);
        ui::print_kv("Harbor", &self.config.harbor_url);
        ui::print_kv("Vault", &self.config.vault_url);
        ui::print_kv("Grafana", &self.config.grafana_url);
        match self.config.forge {
            ForgeKind::GitLab => ui::print_kv("GitLab", &self.config.gitlab_url),
            ForgeKind::GitHub => ui::print_kv("GitHub org", self.config.github_org.as_deref().unwrap_or_default()),
        }
        if kasm_enabled(&self.config, &self.options) {
            ui::print_kv("KASM", &self.config.kasm_url);
        }

        println!();
        ui::print_kv("OIDC clients", &self.secrets.iter().map(|(k, _)| k).collect::<Vec<_>>().join(", "));
        ui::print_kv("Robot accounts", &self.robots.len().to_string());
        if self.log.path().exists() {
            ui::print_info(&format!("Credentials are logged in {}", self.log.path().display()));
        }
        info!(realm = %self.config.realm, "Deploy complete");
        PhaseOutcome::Completed
    }
}

#[async_trait]
impl PhaseExecutor<DeployPhase> for Deployer {
    async fn execute(&mut self, phase: DeployPhase) -> Result<PhaseOutcome> {
        match phase {
            DeployPhase::Preflight => self.preflight(),
            DeployPhase::VaultUnseal => self.vault_unseal().await,
            DeployPhase::KeycloakRealm => self.keycloak_realm().await,
            DeployPhase::KeycloakClients => self.keycloak_clients().await,
            DeployPhase::VaultOidc => self.vault_oidc().await,
            DeployPhase::Harbor => self.harbor().await,
            DeployPhase::GitForge => self.git_forge().await,
            DeployPhase::Kasm => self.kasm().await,
            DeployPhase::ArgoCd => self.argocd().await,
            DeployPhase::Services => self.services(),
            DeployPhase::Summary => Ok(self.summary()),
        }
    }
}
