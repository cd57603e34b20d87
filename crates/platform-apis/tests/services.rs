use std::collections::BTreeMap;
use std::time::Duration;

use platform_apis::gitlab::GitLabClient;
use platform_apis::harbor::{HarborClient, HarborOidcSettings};
use platform_apis::kasm::{KasmClient, KasmOidcSettings};
use platform_apis::vault::{VaultClient, VaultOidcSettings};
use platform_apis::{ClientOptions, Ensured, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(dry_run: bool) -> ClientOptions {
    ClientOptions {
        timeout: Duration::from_secs(5),
        insecure_tls: false,
        dry_run,
        retry: RetryPolicy::none(),
    }
}

// ============================================================================
// GitLab
// ============================================================================

#[tokio::test]
async fn gitlab_existing_group_and_project_are_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/groups/platform"))
        .and(header("PRIVATE-TOKEN", "glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 10, "name": "Platform", "path": "platform", "full_path": "platform"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/platform%2Fargocd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 77, "path": "argocd", "path_with_namespace": "platform/argocd"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let gl = GitLabClient::new(&server.uri(), "glpat-test", options(false)).unwrap();
    let group = gl.ensure_group("platform", "Platform").await.unwrap();
    assert!(matches!(group, Ensured::Existing(ref g) if g.id == 10));

    let project = gl.ensure_project(10, "platform", "argocd").await.unwrap();
    assert!(matches!(project, Ensured::Existing(ref p) if p.id == 77));
}

#[tokio::test]
async fn gitlab_missing_project_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/platform%2Fgrafana"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Project Not Found"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects"))
        .and(body_partial_json(json!({"path": "grafana", "namespace_id": 10, "visibility": "private"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 78, "path": "grafana", "path_with_namespace": "platform/grafana"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gl = GitLabClient::new(&server.uri(), "glpat-test", options(false)).unwrap();
    let project = gl.ensure_project(10, "platform", "grafana").await.unwrap();
    assert!(project.was_created());
    assert_eq!(project.value().map(|p| p.id), Some(78));
}

#[tokio::test]
async fn gitlab_duplicate_deploy_key_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/77/deploy_keys"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": {"deploy_key.fingerprint": ["has already been taken"]}
        })))
        .mount(&server)
        .await;

    let gl = GitLabClient::new(&server.uri(), "glpat-test", options(false)).unwrap();
    assert!(gl.add_deploy_key(77, "argocd", "ssh-ed25519 AAAA", false).await.unwrap());
}

#[tokio::test]
async fn gitlab_deploy_key_failure_is_best_effort() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/77/deploy_keys"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "403 Forbidden"})))
        .mount(&server)
        .await;

    let gl = GitLabClient::new(&server.uri(), "glpat-test", options(false)).unwrap();
    assert!(!gl.add_deploy_key(77, "argocd", "ssh-ed25519 AAAA", true).await.unwrap());
}

// ============================================================================
// Harbor
// ============================================================================

#[tokio::test]
async fn harbor_project_probe_and_create() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/api/v2.0/projects"))
        .and(query_param("project_name", "platform"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2.0/projects"))
        .and(body_partial_json(json!({"project_name": "platform", "metadata": {"public": "false"}})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let harbor = HarborClient::new(&server.uri(), "admin", "Harbor12345", options(false)).unwrap();
    let outcome = harbor.ensure_project("platform", false).await.unwrap();
    assert_eq!(outcome, Ensured::Created("platform".to_string()));
}

#[tokio::test]
async fn harbor_robot_secret_only_on_creation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2.0/projects/platform/robots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "name": "robot$platform+ci"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2.0/projects/apps/robots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2.0/robots"))
        .and(body_partial_json(json!({"name": "ci", "level": "project"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 4, "name": "robot$apps+ci", "secret": "robot-secret"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harbor = HarborClient::new(&server.uri(), "admin", "Harbor12345", options(false)).unwrap();

    let existing = harbor.ensure_robot("platform", "ci").await.unwrap();
    assert_eq!(existing, Ensured::Existing(None));

    let created = harbor.ensure_robot("apps", "ci").await.unwrap();
    let credential = created.into_value().flatten().unwrap();
    assert_eq!(credential.name, "robot$apps+ci");
    assert_eq!(credential.secret, "robot-secret");
}

#[tokio::test]
async fn harbor_oidc_rejection_surfaces_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v2.0/configurations"))
        .and(body_partial_json(json!({"auth_mode": "oidc_auth", "oidc_client_id": "harbor"})))
        .respond_with(ResponseTemplate::new(400).set_body_string("auth mode cannot be changed"))
        .mount(&server)
        .await;

    let harbor = HarborClient::new(&server.uri(), "admin", "Harbor12345", options(false)).unwrap();
    let settings = HarborOidcSettings {
        provider_name: "Keycloak".into(),
        endpoint: "https://kc.example.com/realms/platform".into(),
        client_id: "harbor".into(),
        client_secret: "s".into(),
        admin_group: "platform-admins".into(),
        verify_cert: true,
    };
    let err = harbor.configure_oidc(&settings).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

// ============================================================================
// KASM
// ============================================================================

#[tokio::test]
async fn kasm_credentials_travel_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/public/get_groups"))
        .and(body_partial_json(json!({"api_key": "key", "api_key_secret": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [{"group_id": "abc", "name": "All Users", "priority": 1000}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/public/create_group"))
        .and(body_partial_json(json!({
            "api_key": "key",
            "target_group": {"name": "developers", "priority": 50}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "group": {"group_id": "def", "name": "developers"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let kasm = KasmClient::new(&server.uri(), "key", "secret", options(false)).unwrap();
    assert_eq!(
        kasm.ensure_group("All Users", 1000).await.unwrap(),
        Ensured::Existing("abc".to_string())
    );
    assert_eq!(
        kasm.ensure_group("developers", 50).await.unwrap(),
        Ensured::Created("def".to_string())
    );
}

#[tokio::test]
async fn kasm_dry_run_reads_but_does_not_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/public/get_oidc_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oidc_configs": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/public/create_oidc_config"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let kasm = KasmClient::new(&server.uri(), "key", "secret", options(true)).unwrap();
    let settings = KasmOidcSettings {
        display_name: "Keycloak".into(),
        client_id: "kasm".into(),
        client_secret: "s".into(),
        issuer: "https://kc.example.com/realms/platform".into(),
        kasm_url: "https://kasm.example.com".into(),
    };
    assert_eq!(kasm.ensure_oidc_config(&settings).await.unwrap(), Ensured::DryRun);
}

// ============================================================================
// Vault
// ============================================================================

#[tokio::test]
async fn vault_unseal_stops_at_threshold() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/seal-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "initialized": true, "sealed": true, "t": 2, "n": 3, "progress": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/sys/unseal"))
        .and(body_partial_json(json!({"key": "k1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "initialized": true, "sealed": true, "t": 2, "progress": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/sys/unseal"))
        .and(body_partial_json(json!({"key": "k2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "initialized": true, "sealed": false, "t": 2, "progress": 0
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/sys/unseal"))
        .and(body_partial_json(json!({"key": "k3"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let vault = VaultClient::new(&server.uri(), "root", options(false)).unwrap();
    let keys = vec!["k1".to_string(), "k2".to_string(), "k3".to_string()];
    let status = vault.unseal(&keys).await.unwrap();
    assert!(!status.sealed);
}

#[tokio::test]
async fn vault_kv_mount_and_secret_write() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .and(header("X-Vault-Token", "root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"sys/": {"type": "system"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/secret"))
        .and(body_partial_json(json!({"type": "kv", "options": {"version": "2"}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/oidc/argocd"))
        .and(body_partial_json(json!({"data": {"client_secret": "abc"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"version": 1}})))
        .expect(1)
        .mount(&server)
        .await;

    let vault = VaultClient::new(&server.uri(), "root", options(false)).unwrap();
    assert_eq!(vault.ensure_kv_mount("secret").await.unwrap(), Ensured::Created(()));

    let data = BTreeMap::from([("client_secret".to_string(), "abc".to_string())]);
    vault.put_secret("secret", "oidc/argocd", &data).await.unwrap();
}

#[tokio::test]
async fn vault_existing_oidc_method_keeps_config_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token/": {"type": "token"}, "oidc/": {"type": "oidc"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/auth/oidc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/oidc/config"))
        .and(body_partial_json(json!({"oidc_client_id": "vault", "default_role": "default"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/oidc/role/default"))
        .and(body_partial_json(json!({"groups_claim": "groups"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let vault = VaultClient::new(&server.uri(), "root", options(false)).unwrap();
    let settings = VaultOidcSettings {
        discovery_url: "https://kc.example.com/realms/platform".into(),
        client_id: "vault".into(),
        client_secret: "s".into(),
        redirect_uris: vec!["https://vault.example.com/ui/vault/auth/oidc/oidc/callback".into()],
        policies: vec!["default".into()],
    };
    assert_eq!(vault.ensure_oidc_auth(&settings).await.unwrap(), Ensured::Existing(()));
}
