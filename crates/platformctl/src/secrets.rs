//! Local credential files.
//!
//! The only state that survives between runs: generated OIDC client
//! secrets, Harbor robot credentials, a plaintext credentials log for the
//! operator, and an optionally saved GitLab token. Every file is written
//! owner-readable only.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Password};
use platform_apis::harbor::RobotCredential;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    restrict_permissions(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize credentials")?;
    write_private(path, &format!("{json}\n"))
}

/// Remove `path` if present. Returns whether a file was deleted.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// `{client_id: secret}` for every confidential OIDC client.
#[derive(Debug, Clone)]
pub struct ClientSecretStore {
    path: PathBuf,
    secrets: BTreeMap<String, String>,
}

impl ClientSecretStore {
    /// Load the store. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not valid JSON.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let secrets: BTreeMap<String, String> = read_json(&path)?;
        debug!(path = %path.display(), clients = secrets.len(), "Loaded client secrets");
        Ok(Self { path, secrets })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&str> {
        self.secrets.get(client_id).map(String::as_str)
    }

    /// Returns `true` if the stored value changed.
    pub fn insert(&mut self, client_id: impl Into<String>, secret: impl Into<String>) -> bool {
        let secret = secret.into();
        let previous = self.secrets.insert(client_id.into(), secret.clone());
        previous.as_deref() != Some(secret.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.secrets.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Write the store as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.secrets)?;
        info!(path = %self.path.display(), clients = self.secrets.len(), "Saved client secrets");
        Ok(())
    }
}

/// Harbor robot credentials keyed by robot account name.
#[derive(Debug, Clone)]
pub struct RobotCredentialStore {
    path: PathBuf,
    robots: BTreeMap<String, RobotCredential>,
}

impl RobotCredentialStore {
    /// Load the store. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not valid JSON.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let robots = read_json(&path)?;
        Ok(Self { path, robots })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RobotCredential> {
        self.robots.get(name)
    }

    pub fn insert(&mut self, credential: RobotCredential) {
        self.robots.insert(credential.name.clone(), credential);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.robots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.robots)?;
        info!(path = %self.path.display(), robots = self.robots.len(), "Saved robot credentials");
        Ok(())
    }
}

/// Append-only plaintext log of credentials handed out during a deploy.
#[derive(Debug, Clone)]
pub struct CredentialsLog {
    path: PathBuf,
}

impl CredentialsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or written.
    pub fn append(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        let existed = self.path.exists();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        if !existed {
            restrict_permissions(&self.path)?;
        }

        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        writeln!(file, "{timestamp}  {service:<10} {account:<32} {secret}")
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Where a GitLab token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    File,
    Prompt,
}

/// Resolve the GitLab API token: configured value, then the token file,
/// then an interactive prompt whose answer is saved to the token file.
///
/// # Errors
///
/// Returns an error if no token is available and prompting is not possible.
pub fn resolve_gitlab_token(
    configured: Option<&str>,
    token_file: &Path,
    interactive: bool,
) -> Result<(String, TokenSource)> {
    if let Some(token) = configured.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok((token.to_string(), TokenSource::Environment));
    }

    if token_file.exists() {
        let token = std::fs::read_to_string(token_file)
            .with_context(|| format!("Failed to read {}", token_file.display()))?;
        let token = token.trim();
        if !token.is_empty() {
            debug!(path = %token_file.display(), "Using saved GitLab token");
            return Ok((token.to_string(), TokenSource::File));
        }
    }

    if !interactive || !std::io::stdin().is_terminal() {
        bail!(
            "No GitLab token: set GITLAB_TOKEN or write one to {}",
            token_file.display()
        );
    }

    let token: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("GitLab personal access token (api scope)")
        .interact()
        .context("Failed to read GitLab token")?;
    let token = token.trim().to_string();
    if token.is_empty() {
        bail!("Empty GitLab token");
    }

    write_private(token_file, &format!("{token}\n"))?;
    info!(path = %token_file.display(), "Saved GitLab token");
    Ok((token, TokenSource::Prompt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ClientSecretStore::load(dir.path().join("secrets.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_client_secrets_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/secrets.json");

        let mut store = ClientSecretStore::load(&path).unwrap();
        assert!(store.insert("argocd", "s3cret"));
        assert!(!store.insert("argocd", "s3cret"));
        store.save().unwrap();

        let reloaded = ClientSecretStore::load(&path).unwrap();
        assert_eq!(reloaded.get("argocd"), Some("s3cret"));
        assert_eq!(reloaded.iter().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        let mut store = ClientSecretStore::load(&path).unwrap();
        store.insert("grafana", "x");
        store.save().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ClientSecretStore::load(&path).is_err());
    }

    #[test]
    fn test_robot_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robots.json");
        let mut store = RobotCredentialStore::load(&path).unwrap();
        store.insert(RobotCredential {
            name: "robot$platform+ci".to_string(),
            secret: "abc".to_string(),
        });
        store.save().unwrap();

        let reloaded = RobotCredentialStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("robot$platform+ci").unwrap().secret, "abc");
    }

    #[test]
    fn test_credentials_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = CredentialsLog::new(dir.path().join("credentials.log"));
        log.append("keycloak", "argocd", "one").unwrap();
        log.append("harbor", "robot$platform+ci", "two").unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("argocd") && lines[0].ends_with("one"));
        let timestamp = lines[1].split_whitespace().next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_token_from_config_wins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gitlab-token");
        std::fs::write(&file, "from-file").unwrap();

        let (token, source) = resolve_gitlab_token(Some("from-env"), &file, false).unwrap();
        assert_eq!(token, "from-env");
        assert_eq!(source, TokenSource::Environment);
    }

    #[test]
    fn test_token_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gitlab-token");
        std::fs::write(&file, "glpat-abc\n").unwrap();

        let (token, source) = resolve_gitlab_token(None, &file, false).unwrap();
        assert_eq!(token, "glpat-abc");
        assert_eq!(source, TokenSource::File);
    }

    #[test]
    fn test_token_missing_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_gitlab_token(Some("  "), &dir.path().join("gitlab-token"), false).unwrap_err();
        assert!(err.to_string().contains("GITLAB_TOKEN"));
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        assert!(!remove_if_exists(&path).unwrap());
        std::fs::write(&path, "{}").unwrap();
        assert!(remove_if_exists(&path).unwrap());
    }
}
