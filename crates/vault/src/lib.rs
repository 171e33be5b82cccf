//! `HashiCorp` Vault integration for vault2cert
//!
//! This crate talks to the Vault PKI secrets engine.
//! Currently supports:
//! - Issuing a certificate for a role via the [`pki`] module

pub mod pki;

// Re-export main types for convenience
pub use pki::{
    ACCESS_TOKEN_HEADER, CertificateIssuer, DEFAULT_REQUEST_TIMEOUT, IssueRequest,
    IssuedCertificate, PkiClient, PkiError, VaultSettings,
};
