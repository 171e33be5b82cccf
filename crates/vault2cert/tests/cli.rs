//! End-to-end tests for the vault2cert binary against a mock Vault server.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use vault2cert_jks::KeyStore;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Issued {
    certificate: String,
    private_key: String,
}

fn issued() -> Issued {
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["app.example.com".to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();
    Issued {
        certificate: cert.pem().trim_end().to_string(),
        private_key: key.serialize_pem().trim_end().to_string(),
    }
}

async fn vault(issued: &Issued) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pki/issue/web"))
        .and(header("X-Vault-Token", "s.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "7c1e",
            "lease_id": "",
            "lease_duration": 0,
            "renewable": false,
            "data": {
                "certificate": issued.certificate,
                "private_key": issued.private_key,
                "private_key_type": "ec",
                "issuing_ca": issued.certificate,
                "ca_chain": [issued.certificate],
                "serial_number": "1f:2e",
                "expiration": 1_900_000_000
            },
            "warnings": null,
            "wrap_info": null,
            "auth": null
        })))
        .mount(&server)
        .await;
    server
}

fn vault2cert(server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("vault2cert").unwrap();
    cmd.env("VAULT_ADDR", server.uri())
        .env("VAULT_TOKEN", "s.test")
        .env_remove("VAULT_PKI_MOUNT")
        .env_remove("VAULT_PKI_ROLE")
        .env_remove("CLOUDFLARE_TOKEN")
        .env_remove("VAULT_CACERT")
        .env_remove("VAULT_CAPATH")
        .env_remove("RUST_LOG");
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_prints_certificate_to_stdout() {
    let issued = issued();
    let server = vault(&issued).await;
    let dir = TempDir::new().unwrap();

    vault2cert(&server)
        .current_dir(dir.path())
        .args(["--common-name", "app.example.com", "--role", "web"])
        .assert()
        .success()
        .stdout(format!("{}\n", issued.certificate));

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_logs_go_to_stderr_in_selected_format() {
    let issued = issued();
    let server = vault(&issued).await;

    for format in [["--log-format", "pretty"], ["--log-format", "json"]] {
        vault2cert(&server)
            .args(["--common-name", "app.example.com", "--role", "web", "-l", "info"])
            .args(format)
            .assert()
            .success()
            .stdout(format!("{}\n", issued.certificate))
            .stderr(predicate::str::contains("Certificate issued"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_role_from_environment() {
    let issued = issued();
    let server = vault(&issued).await;

    vault2cert(&server)
        .env("VAULT_PKI_ROLE", "web")
        .args(["--common-name", "app.example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BEGIN CERTIFICATE"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_to_directory() {
    let issued = issued();
    let server = vault(&issued).await;
    let dir = TempDir::new().unwrap();

    vault2cert(&server)
        .args(["--common-name", "app.example.com", "--role", "web", "--write-to"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(
        fs::read_to_string(dir.path().join("app.example.com.crt")).unwrap(),
        format!("{}\n", issued.certificate)
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("app.example.com.key")).unwrap(),
        format!("{}\n", issued.private_key)
    );
    assert!(dir.path().join("app.example.com.ca").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_jks_with_generated_password() {
    let issued = issued();
    let server = vault(&issued).await;
    let dir = TempDir::new().unwrap();
    let jks = dir.path().join("app.jks");

    let output = vault2cert(&server)
        .args(["--common-name", "app.example.com", "--role", "web", "--jks"])
        .arg(&jks)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let password = stdout
        .lines()
        .find_map(|line| line.strip_prefix("JKS password: "))
        .unwrap();
    assert_eq!(password.len(), 12);
    assert!(stdout.contains(&issued.certificate));

    let keystore = KeyStore::load(fs::File::open(&jks).unwrap(), password.as_bytes()).unwrap();
    assert_eq!(keystore.aliases().collect::<Vec<_>>(), vec!["alias"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_jks_with_supplied_password() {
    let issued = issued();
    let server = vault(&issued).await;
    let dir = TempDir::new().unwrap();
    let jks = dir.path().join("app.jks");

    vault2cert(&server)
        .args([
            "--common-name",
            "app.example.com",
            "--role",
            "web",
            "--jkspassword",
            "changeit",
            "--include-ca",
            "--write-to",
        ])
        .arg(dir.path())
        .arg("--jks")
        .arg(&jks)
        .assert()
        .success()
        .stdout(predicate::str::contains("JKS password").not());

    let keystore = KeyStore::load(fs::File::open(&jks).unwrap(), b"changeit").unwrap();
    let entry = keystore.private_key_entry("alias").unwrap();
    assert_eq!(entry.certificate_chain.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_role_never_contacts_vault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    vault2cert(&server)
        .args(["--common-name", "app.example.com"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("role is mandatory"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_role_with_path_segments_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    vault2cert(&server)
        .args(["--common-name", "app.example.com", "--role", "../../sys/foo"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Invalid issue request"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_common_name() {
    let server = MockServer::start().await;

    vault2cert(&server)
        .args(["--role", "web"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("common name is mandatory"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_service_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": ["unknown role: web"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    vault2cert(&server)
        .args(["--common-name", "app.example.com", "--role", "web", "--write-to"])
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("unknown role: web"));

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
