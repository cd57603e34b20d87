use std::path::Path;

use platformctl::config::EnvMap;
use platformctl::deploy::{DeployOptions, DeployPhase, Deployer};
use platformctl::secrets::ClientSecretStore;
use platformctl::{PhaseExecutor, PhaseOutcome, PlatformConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENTS: [&str; 3] = ["argocd", "grafana", "harbor"];

/// GitHub forge and no KASM keeps the client list to argocd, grafana, harbor.
fn config(server: &MockServer, state_dir: &Path) -> PlatformConfig {
    config_with(server, state_dir, &[])
}

fn config_with(server: &MockServer, state_dir: &Path, extra: &[(&str, &str)]) -> PlatformConfig {
    let uri = server.uri();
    let state = state_dir.display().to_string();
    let env: EnvMap = [
        ("DOMAIN", "example.com"),
        ("KEYCLOAK_URL", uri.as_str()),
        ("HARBOR_URL", uri.as_str()),
        ("KEYCLOAK_ADMIN_PASSWORD", "admin-pw"),
        ("HARBOR_ADMIN_PASSWORD", "harbor-pw"),
        ("PLATFORM_STATE_DIR", state.as_str()),
        ("PLATFORM_ADMIN_USER", "alice"),
        ("PLATFORM_ADMIN_PASSWORD", "changeme"),
        ("GIT_FORGE", "github"),
        ("GITHUB_ORG", "acme"),
    ]
    .into_iter()
    .chain(extra.iter().copied())
    .collect();
    PlatformConfig::from_env(&env).unwrap()
}

fn options(dry_run: bool) -> DeployOptions {
    DeployOptions {
        skip_vault: true,
        dry_run,
        ..DeployOptions::default()
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "admin-token",
            "expires_in": 300,
        })))
        .mount(server)
        .await;
}

/// Keycloak without the realm: the realm and everything below it is a 404.
async fn mount_missing_realm(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/admin/realms/platform(/.*)?$"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Realm not found."})))
        .mount(server)
        .await;
}

async fn forbid_mutations(server: &MockServer) {
    for verb in ["POST", "PUT", "DELETE", "PATCH"] {
        Mock::given(method(verb))
            .and(path_regex(r"^/(admin|api|v1)/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn keycloak_phases_create_clients_and_persist_secrets() {
    let server = MockServer::start().await;
    let state = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/admin/realms/platform"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"realm": "platform", "enabled": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/platform/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "g-admins", "name": "platform-admins"},
            {"id": "g-devs", "name": "platform-developers"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/platform/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/platform/users"))
        .and(body_partial_json(json!({"username": "alice"})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", format!("{}/admin/realms/platform/users/u-alice", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/admin/realms/platform/users/u-alice/groups/g-admins"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/platform/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    for client in CLIENTS {
        let id = format!("id-{client}");
        Mock::given(method("POST"))
            .and(path("/admin/realms/platform/clients"))
            .and(body_partial_json(json!({"clientId": client})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/admin/realms/platform/clients/{id}", server.uri())),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/admin/realms/platform/clients/{id}/protocol-mappers/models")))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/admin/realms/platform/clients/{id}/client-secret")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": format!("secret-{client}")})))
            .mount(&server)
            .await;
    }

    let cfg = config(&server, state.path());
    let secrets_file = cfg.client_secrets_file();
    let log_file = cfg.credentials_log_file();
    let mut deployer = Deployer::new(cfg, options(false)).unwrap();

    let realm = deployer.execute(DeployPhase::KeycloakRealm).await.unwrap();
    assert_eq!(realm, PhaseOutcome::Completed);
    let clients = deployer.execute(DeployPhase::KeycloakClients).await.unwrap();
    assert_eq!(clients, PhaseOutcome::Completed);

    let store = ClientSecretStore::load(&secrets_file).unwrap();
    for client in CLIENTS {
        assert_eq!(store.get(client), Some(format!("secret-{client}").as_str()));
    }

    // alice's password plus one line per client secret.
    let log = std::fs::read_to_string(log_file).unwrap();
    assert_eq!(log.lines().count(), 4);
}

#[tokio::test]
async fn mapper_failure_is_only_a_warning() {
    let server = MockServer::start().await;
    let state = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/admin/realms/platform/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "id-argocd", "clientId": "argocd"},
            {"id": "id-grafana", "clientId": "grafana"},
            {"id": "id-harbor", "clientId": "harbor"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/admin/realms/platform/clients/[^/]+/protocol-mappers/models$"))
        .respond_with(ResponseTemplate::new(400).set_body_string("mapper rejected"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/admin/realms/platform/clients/[^/]+/client-secret$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "shared"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/platform/clients"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(&server, state.path());
    let secrets_file = cfg.client_secrets_file();
    let mut deployer = Deployer::new(cfg, options(false)).unwrap();

    let outcome = deployer.execute(DeployPhase::KeycloakClients).await.unwrap();
    assert_eq!(outcome, PhaseOutcome::Completed);
    assert_eq!(ClientSecretStore::load(&secrets_file).unwrap().get("harbor"), Some("shared"));
}

#[tokio::test]
async fn dry_run_never_mutates() {
    let server = MockServer::start().await;
    let state = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_missing_realm(&server).await;

    Mock::given(method("HEAD"))
        .and(path("/api/v2.0/projects"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2.0/projects/platform/robots"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;
    forbid_mutations(&server).await;

    let cfg = config(&server, state.path());
    let secrets_file = cfg.client_secrets_file();
    let robots_file = cfg.robot_credentials_file();
    let mut deployer = Deployer::new(cfg, options(true)).unwrap();

    for phase in [DeployPhase::KeycloakRealm, DeployPhase::KeycloakClients, DeployPhase::Harbor] {
        let outcome = deployer.execute(phase).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Completed, "{phase}");
    }

    assert!(!secrets_file.exists());
    assert!(!robots_file.exists());
    assert!(deployer.secrets().is_empty());
}

#[tokio::test]
async fn dry_run_against_sealed_vault_plans_instead_of_failing() {
    let server = MockServer::start().await;
    let state = tempfile::tempdir().unwrap();
    let init_file = state.path().join("vault-init.json");
    std::fs::write(
        &init_file,
        json!({"unseal_keys_b64": ["k1", "k2", "k3"], "unseal_threshold": 3, "root_token": "root"}).to_string(),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/sys/seal-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "initialized": true,
            "sealed": true,
            "t": 3,
            "progress": 0,
        })))
        .mount(&server)
        .await;
    for listing in ["/v1/sys/mounts", "/v1/sys/auth"] {
        Mock::given(method("GET"))
            .and(path(listing))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"errors": ["Vault is sealed"]})))
            .expect(0)
            .mount(&server)
            .await;
    }
    forbid_mutations(&server).await;

    let uri = server.uri();
    let init = init_file.display().to_string();
    let cfg = config_with(
        &server,
        state.path(),
        &[("VAULT_URL", uri.as_str()), ("VAULT_INIT_FILE", init.as_str())],
    );
    let options = DeployOptions {
        dry_run: true,
        ..DeployOptions::default()
    };
    let mut deployer = Deployer::new(cfg, options).unwrap();

    for phase in [DeployPhase::VaultUnseal, DeployPhase::VaultOidc] {
        let outcome = deployer.execute(phase).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Completed, "{phase}");
    }
}

#[tokio::test]
async fn skipped_phases_touch_nothing() {
    let server = MockServer::start().await;
    let state = tempfile::tempdir().unwrap();
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut deployer = Deployer::new(
        config(&server, state.path()),
        DeployOptions {
            skip_vault: true,
            skip_keycloak: true,
            skip_kasm: true,
            ..DeployOptions::default()
        },
    )
    .unwrap();

    for phase in [
        DeployPhase::VaultUnseal,
        DeployPhase::KeycloakRealm,
        DeployPhase::KeycloakClients,
        DeployPhase::VaultOidc,
        DeployPhase::Kasm,
    ] {
        assert!(matches!(deployer.execute(phase).await.unwrap(), PhaseOutcome::Skipped(_)));
    }
}
