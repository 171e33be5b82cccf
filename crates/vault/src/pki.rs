//! Certificate issuance through the Vault PKI secrets engine.
//!
//! One call, one certificate: `POST {addr}/v1/{mount}/issue/{role}`. There are
//! no retries; every failure is handed back to the caller as a [`PkiError`].

use async_trait::async_trait;
use miette::Diagnostic;
use reqwest::header::{HeaderMap, HeaderValue};
use rustify::errors::ClientError as RestError;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use vaultrs::api::pki::requests::{
    GenerateCertificateRequest, GenerateCertificateRequestBuilder,
};
use vaultrs::api::pki::responses::GenerateCertificateResponse;
use vaultrs::client::{VaultClient, VaultClientSettings, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

/// Upper bound for the whole request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying an edge-proxy access token in front of Vault.
pub const ACCESS_TOKEN_HEADER: &str = "cf-access-token";

/// Errors returned by the issuance client
#[derive(Error, Debug, Diagnostic)]
pub enum PkiError {
    /// The request is missing a mandatory field or would not map to a single
    /// Vault path
    #[error("Invalid issue request: {message}")]
    #[diagnostic(code(vault2cert_vault::invalid_request))]
    InvalidRequest {
        /// What is wrong with the request
        message: String,
    },

    /// The HTTP client could not be constructed
    #[error("Failed to build Vault HTTP client: {message}")]
    #[diagnostic(code(vault2cert_vault::client))]
    Client {
        /// Underlying error message
        message: String,
    },

    /// The exchange did not complete in time
    #[error("Vault request timed out after {}s", .timeout.as_secs())]
    #[diagnostic(
        code(vault2cert_vault::timeout),
        help("Check that VAULT_ADDR is reachable from this host")
    )]
    RequestTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// Connection, TLS or protocol failure
    #[error("Vault request failed: {message}")]
    #[diagnostic(
        code(vault2cert_vault::transport),
        help("Check VAULT_ADDR and network connectivity")
    )]
    Transport {
        /// Innermost cause
        message: String,
        /// Error reported by the Vault client
        #[source]
        source: ClientError,
    },

    /// Vault answered with an error status
    #[error("Vault returned HTTP {status}{}", error_details(.errors))]
    #[diagnostic(
        code(vault2cert_vault::service),
        help("Check the token, the role name and the PKI mount path")
    )]
    Service {
        /// HTTP status code
        status: u16,
        /// Error messages from the response body
        errors: Vec<String>,
    },

    /// Vault answered with success but the body is not an issued certificate
    #[error("Unexpected Vault response: {message}")]
    #[diagnostic(code(vault2cert_vault::invalid_response))]
    InvalidResponse {
        /// What could not be decoded
        message: String,
    },
}

fn error_details(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(": {}", errors.join("; "))
    }
}

impl PkiError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }
}

impl From<ClientError> for PkiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::APIError { code, errors } => Self::Service {
                status: code,
                errors,
            },
            // Error bodies that are not Vault's JSON envelope, e.g. from a proxy
            ClientError::RestClientError {
                source: RestError::ServerResponseError { code, content },
            } => Self::Service {
                status: code,
                errors: content
                    .map(|body| body.trim().to_string())
                    .filter(|body| !body.is_empty())
                    .into_iter()
                    .collect(),
            },
            ClientError::RestClientError {
                source:
                    source @ (RestError::ResponseParseError { .. }
                    | RestError::ResponseConversionError { .. }),
            } => Self::invalid_response(root_cause(&source)),
            err @ (ClientError::ResponseEmptyError | ClientError::ResponseDataEmptyError) => {
                Self::invalid_response(err.to_string())
            }
            source => Self::Transport {
                message: root_cause(&source),
                source,
            },
        }
    }
}

fn root_cause(err: &dyn std::error::Error) -> String {
    let mut cause = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause.to_string()
}

/// Connection settings for a Vault server
#[derive(Clone)]
pub struct VaultSettings {
    /// Base address, e.g. `https://vault.example.com:8200`
    pub address: String,
    /// Token sent as `X-Vault-Token`
    pub token: SecretString,
    /// Sent as [`ACCESS_TOKEN_HEADER`] when present
    pub access_token: Option<SecretString>,
    /// Bound for the whole exchange
    pub request_timeout: Duration,
}

impl VaultSettings {
    /// Settings with no proxy token and the default timeout
    #[must_use]
    pub fn new(address: impl Into<String>, token: SecretString) -> Self {
        Self {
            address: address.into(),
            token,
            access_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Attach an edge-proxy access token
    #[must_use]
    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Override the request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSettings")
            .field("address", &self.address)
            .field("token", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Parameters for one issuance call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    /// PKI mount path, e.g. `pki` or `pki/intermediate`
    pub mount: String,
    /// Role that governs what may be issued
    pub role: String,
    /// Certificate common name
    pub common_name: String,
    /// Additional DNS subject alternative names
    pub alt_names: Vec<String>,
    /// IP subject alternative names
    pub ip_sans: Vec<String>,
    /// Requested lifetime, e.g. `72h`; the role default applies when `None`
    pub ttl: Option<String>,
}

impl IssueRequest {
    /// Create a request with no SANs and the role's default TTL
    #[must_use]
    pub fn new(
        mount: impl Into<String>,
        role: impl Into<String>,
        common_name: impl Into<String>,
    ) -> Self {
        Self {
            mount: mount.into(),
            role: role.into(),
            common_name: common_name.into(),
            alt_names: Vec::new(),
            ip_sans: Vec::new(),
            ttl: None,
        }
    }

    /// Check the request before anything is sent.
    ///
    /// The role must be exactly one path segment and every segment of the
    /// mount must be a plain name, so the request always lands on
    /// `{mount}/issue/{role}` and nowhere else.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidRequest`] when the common name is empty, or
    /// when the role or a mount segment is empty, `.`, `..` or contains a
    /// character with meaning in a URL.
    pub fn validate(&self) -> Result<(), PkiError> {
        if self.common_name.is_empty() {
            return Err(PkiError::invalid_request("common name is empty"));
        }
        check_segment("role", &self.role)?;
        let mount = self.mount_path();
        if mount.is_empty() {
            return Err(PkiError::invalid_request("mount path is empty"));
        }
        for segment in mount.split('/') {
            check_segment("mount path", segment)?;
        }
        Ok(())
    }

    /// Mount path without leading or trailing slashes
    #[must_use]
    pub fn mount_path(&self) -> &str {
        self.mount.trim_matches('/')
    }

    /// API path relative to the server address
    #[must_use]
    pub fn api_path(&self) -> String {
        format!("v1/{}/issue/{}", self.mount_path(), self.role)
    }

    fn options(&self) -> GenerateCertificateRequestBuilder {
        let mut options = GenerateCertificateRequest::builder();
        options.common_name(self.common_name.as_str()).format("pem");
        if !self.alt_names.is_empty() {
            options.alt_names(self.alt_names.join(","));
        }
        if !self.ip_sans.is_empty() {
            options.ip_sans(self.ip_sans.join(","));
        }
        if let Some(ttl) = &self.ttl {
            options.ttl(ttl.as_str());
        }
        options
    }
}

fn check_segment(what: &str, segment: &str) -> Result<(), PkiError> {
    if segment.is_empty() {
        return Err(PkiError::invalid_request(format!("{what} is empty")));
    }
    if segment == "." || segment == ".." {
        return Err(PkiError::invalid_request(format!(
            "{what} must not contain `{segment}`"
        )));
    }
    if let Some(c) = segment.chars().find(|c| {
        matches!(c, '/' | '?' | '#' | '%' | '\\') || c.is_whitespace() || c.is_control()
    }) {
        return Err(PkiError::invalid_request(format!(
            "{what} `{segment}` contains `{}`",
            c.escape_default()
        )));
    }
    Ok(())
}

/// A certificate issued by Vault, in PEM form
#[derive(Clone)]
pub struct IssuedCertificate {
    /// Leaf certificate
    pub certificate: String,
    /// Private key matching the certificate
    pub private_key: SecretString,
    /// Certificate of the CA that signed the leaf
    pub issuing_ca: String,
    /// Full chain up to the root, when Vault reports it
    pub ca_chain: Vec<String>,
    /// Colon separated hex serial
    pub serial_number: String,
    /// `rsa`, `ec` or `ed25519`
    pub private_key_type: String,
    /// Expiry as seconds since the epoch
    pub expiration: Option<u64>,
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("serial_number", &self.serial_number)
            .field("private_key_type", &self.private_key_type)
            .field("private_key", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl TryFrom<GenerateCertificateResponse> for IssuedCertificate {
    type Error = PkiError;

    fn try_from(response: GenerateCertificateResponse) -> Result<Self, Self::Error> {
        for (field, value) in [
            ("certificate", &response.certificate),
            ("private_key", &response.private_key),
            ("issuing_ca", &response.issuing_ca),
        ] {
            if value.trim().is_empty() {
                return Err(PkiError::invalid_response(format!("`{field}` is empty")));
            }
        }
        Ok(Self {
            certificate: response.certificate,
            private_key: SecretString::from(response.private_key),
            issuing_ca: response.issuing_ca,
            ca_chain: response.ca_chain.unwrap_or_default(),
            serial_number: response.serial_number,
            private_key_type: response.private_key_type,
            expiration: response.expiration,
        })
    }
}

/// Anything that can turn an [`IssueRequest`] into a certificate
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Perform one issuance exchange.
    async fn issue(&self, request: &IssueRequest) -> Result<IssuedCertificate, PkiError>;
}

/// Vault client for the PKI secrets engine
pub struct PkiClient {
    client: VaultClient,
    settings: VaultSettings,
}

impl std::fmt::Debug for PkiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkiClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PkiClient {
    /// Create a client for the given server.
    ///
    /// TLS verification and extra CA certificates follow the usual Vault
    /// environment (`VAULT_SKIP_VERIFY`, `VAULT_CACERT`, `VAULT_CAPATH`).
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::Client`] if the address is not an `http` or
    /// `https` URL, a CA certificate cannot be loaded, or the TLS backend
    /// cannot be initialized.
    pub fn new(settings: VaultSettings) -> Result<Self, PkiError> {
        // The settings builder panics on an unparsable address
        let address = reqwest::Url::parse(&settings.address).map_err(|e| {
            PkiError::client(format!("invalid Vault address `{}`: {e}", settings.address))
        })?;
        let client_settings = VaultClientSettingsBuilder::default()
            .address(address.as_str())
            .token(settings.token.expose_secret())
            .build()
            .map_err(|e| PkiError::client(e.to_string()))?;
        let mut client =
            VaultClient::new(client_settings).map_err(|e| PkiError::client(root_cause(&e)))?;

        if let Some(access_token) = &settings.access_token {
            client.http.http = edge_http_client(&client.settings, access_token)?;
        }
        Ok(Self { client, settings })
    }

    /// Settings this client was built with
    #[must_use]
    pub const fn settings(&self) -> &VaultSettings {
        &self.settings
    }
}

/// HTTP client equivalent to the one vaultrs builds, plus the edge-proxy header
/// on every request.
fn edge_http_client(
    settings: &VaultClientSettings,
    access_token: &SecretString,
) -> Result<reqwest::Client, PkiError> {
    let mut value = HeaderValue::from_str(access_token.expose_secret())
        .map_err(|_| PkiError::client("access token is not a valid HTTP header value"))?;
    value.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_TOKEN_HEADER, value);

    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .default_headers(headers)
        .danger_accept_invalid_certs(!settings.verify);
    for path in &settings.ca_certs {
        let pem = std::fs::read(path)
            .map_err(|e| PkiError::client(format!("cannot read CA certificate {path}: {e}")))?;
        let certificate = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| PkiError::client(format!("invalid CA certificate {path}: {e}")))?;
        builder = builder.add_root_certificate(certificate);
    }
    if let Some(identity) = &settings.identity {
        builder = builder.identity(identity.clone());
    }
    builder.build().map_err(|e| PkiError::client(e.to_string()))
}

#[async_trait]
impl CertificateIssuer for PkiClient {
    async fn issue(&self, request: &IssueRequest) -> Result<IssuedCertificate, PkiError> {
        request.validate()?;
        debug!(
            path = %request.api_path(),
            role = %request.role,
            common_name = %request.common_name,
            "Requesting certificate from Vault"
        );

        let mut options = request.options();
        let timeout = self.settings.request_timeout;
        let response = tokio::time::timeout(
            timeout,
            vaultrs::pki::cert::generate(
                &self.client,
                request.mount_path(),
                &request.role,
                Some(&mut options),
            ),
        )
        .await
        .map_err(|_| PkiError::RequestTimeout { timeout })??;

        let issued = IssuedCertificate::try_from(response)?;
        info!(
            serial_number = %issued.serial_number,
            common_name = %request.common_name,
            "Certificate issued"
        );
        Ok(issued)
    }
}
