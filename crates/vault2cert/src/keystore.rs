//! Packaging an issued certificate into a JKS keystore file.

use crate::errors::{Error, Result};
use chrono::Utc;
use rustls_pemfile::Item;
use secrecy::ExposeSecret;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use vault2cert_jks::{Certificate, KeyEncoding, KeyStore, PrivateKeyEntry, to_pkcs8};
use vault2cert_vault::IssuedCertificate;
use zeroize::{Zeroize, Zeroizing};

/// Alias under which the key entry is stored
pub const KEYSTORE_ALIAS: &str = "alias";

/// PEM material to package
pub struct KeystoreInput<'a> {
    /// Leaf certificate
    pub certificate_pem: &'a str,
    /// Private key, PKCS#1, SEC1 or PKCS#8
    pub private_key_pem: &'a str,
    /// Issuing CA certificate
    pub issuing_ca_pem: &'a str,
    /// Append the issuing CA after the leaf
    pub include_ca: bool,
}

impl<'a> KeystoreInput<'a> {
    /// Borrow the PEM fields of an issuance result
    #[must_use]
    pub fn from_issued(issued: &'a IssuedCertificate, include_ca: bool) -> Self {
        Self {
            certificate_pem: &issued.certificate,
            private_key_pem: issued.private_key.expose_secret(),
            issuing_ca_pem: &issued.issuing_ca,
            include_ca,
        }
    }
}

impl std::fmt::Debug for KeystoreInput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreInput")
            .field("private_key_pem", &"[REDACTED]")
            .field("include_ca", &self.include_ca)
            .finish_non_exhaustive()
    }
}

/// Write a single-entry JKS keystore to `path`.
///
/// The key is stored under [`KEYSTORE_ALIAS`] and both the store and the key
/// are protected with `password`. The file is written to a temporary file
/// next to `path` and renamed into place, so a failure never leaves a
/// partial keystore behind.
///
/// `password` is overwritten with zeros before this function returns,
/// whether or not it succeeded.
///
/// # Errors
///
/// Returns [`Error::Pem`] for undecodable input, [`Error::Serialization`]
/// if the keystore cannot be encoded and [`Error::Io`] if the file cannot
/// be written.
pub fn write_to_jks(input: &KeystoreInput<'_>, path: &Path, password: &mut [u8]) -> Result<()> {
    let result = write_keystore(input, path, password);
    password.zeroize();
    result
}

fn write_keystore(input: &KeystoreInput<'_>, path: &Path, password: &[u8]) -> Result<()> {
    let keystore = build_keystore(input)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| Error::io("create", path, e))?;
    keystore.store(file.as_file_mut(), password)?;
    file.as_file()
        .sync_all()
        .map_err(|e| Error::io("sync", file.path().to_path_buf(), e))?;
    file.persist(path)
        .map_err(|e| Error::io("rename into", path, e.error))?;

    info!(path = %path.display(), alias = KEYSTORE_ALIAS, "Keystore written");
    Ok(())
}

fn build_keystore(input: &KeystoreInput<'_>) -> Result<KeyStore> {
    let mut certificate_chain = vec![Certificate::x509(decode_certificate(
        input.certificate_pem,
        "certificate",
    )?)];
    if input.include_ca {
        certificate_chain.push(Certificate::x509(decode_certificate(
            input.issuing_ca_pem,
            "issuing CA",
        )?));
    }
    let private_key = decode_private_key(input.private_key_pem)?;
    debug!(chain = certificate_chain.len(), "Building keystore entry");

    let mut keystore = KeyStore::new();
    keystore.set_private_key_entry(
        KEYSTORE_ALIAS,
        PrivateKeyEntry {
            creation_time: Utc::now(),
            private_key,
            certificate_chain,
        },
    )?;
    Ok(keystore)
}

fn pem_items(pem: &str, what: &'static str) -> Result<Vec<Item>> {
    rustls_pemfile::read_all(&mut pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::pem(what, e.to_string()))
}

fn decode_certificate(pem: &str, what: &'static str) -> Result<Vec<u8>> {
    pem_items(pem, what)?
        .into_iter()
        .find_map(|item| match item {
            Item::X509Certificate(der) => Some(der.to_vec()),
            _ => None,
        })
        .ok_or_else(|| Error::pem(what, "no CERTIFICATE block found"))
}

fn decode_private_key(pem: &str) -> Result<Zeroizing<Vec<u8>>> {
    const WHAT: &str = "private key";
    for item in pem_items(pem, WHAT)? {
        let (der, encoding) = match &item {
            Item::Pkcs8Key(key) => (key.secret_pkcs8_der(), KeyEncoding::Pkcs8),
            Item::Pkcs1Key(key) => (key.secret_pkcs1_der(), KeyEncoding::Pkcs1),
            Item::Sec1Key(key) => (key.secret_sec1_der(), KeyEncoding::Sec1),
            _ => continue,
        };
        return Ok(to_pkcs8(der, encoding)?);
    }
    Err(Error::pem(WHAT, "no PRIVATE KEY block found"))
}
