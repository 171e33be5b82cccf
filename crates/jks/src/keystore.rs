//! The JKS container.
//!
//! Layout (all integers big endian):
//!
//! ```text
//! u32 magic 0xFEEDFEED
//! u32 version (2)
//! u32 entry count
//! entries:
//!   u32 tag (1 = private key, 2 = trusted certificate)
//!   utf alias
//!   u64 creation time, milliseconds since the epoch
//!   tag 1: u32 len + protected key, u32 chain len, chain of certificates
//!   tag 2: one certificate
//!   certificate: utf type (version 2 only), u32 len + DER
//! 20 byte SHA-1 over password || "Mighty Aphrodite" || everything above
//! ```
//!
//! `utf` is a `u16` byte length followed by the string bytes.

use crate::error::{KeystoreError, Result};
use crate::protector;
use chrono::{DateTime, TimeZone, Utc};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use zeroize::Zeroizing;

const MAGIC: u32 = 0xFEED_FEED;
const VERSION_1: u32 = 1;
const VERSION_2: u32 = 2;
const TAG_PRIVATE_KEY: u32 = 1;
const TAG_TRUSTED_CERTIFICATE: u32 = 2;
const WHITENER: &[u8] = b"Mighty Aphrodite";
const DIGEST_LEN: usize = 20;

/// Certificate type written for X.509 certificates.
pub const X509: &str = "X509";

/// A certificate as stored in the keystore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate type name, e.g. [`X509`]
    pub cert_type: String,
    /// DER encoded certificate
    pub content: Vec<u8>,
}

impl Certificate {
    /// Create an X.509 certificate from DER bytes.
    #[must_use]
    pub fn x509(der: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_type: X509.to_string(),
            content: der.into(),
        }
    }
}

/// A private key together with its certificate chain.
///
/// The key is held unencrypted (PKCS#8 DER) and is zeroed when the entry
/// is dropped. It is encrypted only when the store is written.
#[derive(Clone)]
pub struct PrivateKeyEntry {
    /// When the entry was created
    pub creation_time: DateTime<Utc>,
    /// PKCS#8 DER private key
    pub private_key: Zeroizing<Vec<u8>>,
    /// Leaf certificate first
    pub certificate_chain: Vec<Certificate>,
}

impl std::fmt::Debug for PrivateKeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyEntry")
            .field("creation_time", &self.creation_time)
            .field("private_key", &"[REDACTED]")
            .field("certificate_chain", &self.certificate_chain.len())
            .finish()
    }
}

/// A certificate trusted without an accompanying key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificateEntry {
    /// When the entry was created
    pub creation_time: DateTime<Utc>,
    /// The certificate
    pub certificate: Certificate,
}

/// A keystore entry.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Tag 1
    PrivateKey(PrivateKeyEntry),
    /// Tag 2
    TrustedCertificate(TrustedCertificateEntry),
}

/// In-memory JKS keystore.
///
/// Aliases are lower-cased on insertion, matching how JKS readers look them up.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    entries: BTreeMap<String, Entry>,
}

impl KeyStore {
    /// Create an empty keystore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the keystore has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aliases in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Look up any entry by alias.
    #[must_use]
    pub fn entry(&self, alias: &str) -> Option<&Entry> {
        self.entries.get(&alias.to_lowercase())
    }

    /// Insert or replace a private key entry.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::EmptyChain`] if the entry has no certificates.
    pub fn set_private_key_entry(&mut self, alias: &str, entry: PrivateKeyEntry) -> Result<()> {
        if entry.certificate_chain.is_empty() {
            return Err(KeystoreError::EmptyChain {
                alias: alias.to_string(),
            });
        }
        self.entries.insert(alias.to_lowercase(), Entry::PrivateKey(entry));
        Ok(())
    }

    /// Insert or replace a trusted certificate entry.
    pub fn set_trusted_certificate_entry(&mut self, alias: &str, entry: TrustedCertificateEntry) {
        self.entries
            .insert(alias.to_lowercase(), Entry::TrustedCertificate(entry));
    }

    /// Private key entry for `alias`, if there is one.
    #[must_use]
    pub fn private_key_entry(&self, alias: &str) -> Option<&PrivateKeyEntry> {
        match self.entry(alias) {
            Some(Entry::PrivateKey(entry)) => Some(entry),
            _ => None,
        }
    }

    /// Trusted certificate entry for `alias`, if there is one.
    #[must_use]
    pub fn trusted_certificate_entry(&self, alias: &str) -> Option<&TrustedCertificateEntry> {
        match self.entry(alias) {
            Some(Entry::TrustedCertificate(entry)) => Some(entry),
            _ => None,
        }
    }

    /// Serialize the keystore to `writer`.
    ///
    /// `password` is the UTF-8 store password. It protects both the integrity
    /// hash and every private key.
    ///
    /// # Errors
    ///
    /// Fails on an invalid password encoding, an alias or type name that is
    /// too long, or a write error.
    pub fn store<W: Write>(&self, mut writer: W, password: &[u8]) -> Result<()> {
        let password = protector::password_bytes(password)?;

        let mut body = Vec::new();
        put_u32(&mut body, MAGIC);
        put_u32(&mut body, VERSION_2);
        put_u32(&mut body, u32_len(self.entries.len(), "entry count")?);

        for (alias, entry) in &self.entries {
            match entry {
                Entry::PrivateKey(entry) => {
                    put_u32(&mut body, TAG_PRIVATE_KEY);
                    put_utf(&mut body, alias, "alias")?;
                    put_time(&mut body, entry.creation_time);
                    let protected = protector::protect(&entry.private_key, &password)?;
                    put_bytes(&mut body, &protected, "protected key")?;
                    put_u32(
                        &mut body,
                        u32_len(entry.certificate_chain.len(), "certificate chain")?,
                    );
                    for certificate in &entry.certificate_chain {
                        put_certificate(&mut body, certificate)?;
                    }
                }
                Entry::TrustedCertificate(entry) => {
                    put_u32(&mut body, TAG_TRUSTED_CERTIFICATE);
                    put_utf(&mut body, alias, "alias")?;
                    put_time(&mut body, entry.creation_time);
                    put_certificate(&mut body, &entry.certificate)?;
                }
            }
        }

        let digest = integrity_digest(&password, &body);
        writer.write_all(&body)?;
        writer.write_all(&digest)?;
        writer.flush()?;
        tracing::debug!(
            entries = self.entries.len(),
            bytes = body.len() + DIGEST_LEN,
            "Keystore serialized"
        );
        Ok(())
    }

    /// Read a keystore from `reader`, verifying its integrity and recovering
    /// every private key with `password`.
    ///
    /// # Errors
    ///
    /// Fails on malformed data, an integrity mismatch, or a wrong password.
    pub fn load<R: Read>(mut reader: R, password: &[u8]) -> Result<Self> {
        let password = protector::password_bytes(password)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        if data.len() < DIGEST_LEN {
            return Err(KeystoreError::malformed("keystore is truncated"));
        }
        let (body, digest) = data.split_at(data.len() - DIGEST_LEN);

        let mut cursor = Cursor::new(body);
        let magic = cursor.u32()?;
        if magic != MAGIC {
            return Err(KeystoreError::BadMagic { found: magic });
        }
        let version = cursor.u32()?;
        if version != VERSION_1 && version != VERSION_2 {
            return Err(KeystoreError::UnsupportedVersion { version });
        }

        if integrity_digest(&password, body).as_slice() != digest {
            return Err(KeystoreError::IntegrityCheckFailed);
        }

        let count = cursor.u32()?;
        let mut store = Self::new();
        for _ in 0..count {
            let tag = cursor.u32()?;
            let alias = cursor.utf("alias")?;
            let creation_time = cursor.time()?;
            match tag {
                TAG_PRIVATE_KEY => {
                    let protected = cursor.bytes()?;
                    let private_key = protector::recover(protected, &password, &alias)?;
                    let chain_len = cursor.u32()?;
                    let certificate_chain = (0..chain_len)
                        .map(|_| cursor.certificate(version))
                        .collect::<Result<Vec<_>>>()?;
                    store.entries.insert(
                        alias.to_lowercase(),
                        Entry::PrivateKey(PrivateKeyEntry {
                            creation_time,
                            private_key,
                            certificate_chain,
                        }),
                    );
                }
                TAG_TRUSTED_CERTIFICATE => {
                    let certificate = cursor.certificate(version)?;
                    store.entries.insert(
                        alias.to_lowercase(),
                        Entry::TrustedCertificate(TrustedCertificateEntry {
                            creation_time,
                            certificate,
                        }),
                    );
                }
                other => return Err(KeystoreError::UnknownTag { tag: other }),
            }
        }

        if !cursor.is_empty() {
            return Err(KeystoreError::malformed("trailing data after last entry"));
        }
        Ok(store)
    }
}

fn integrity_digest(password: &[u8], body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(WHITENER);
    hasher.update(body);
    hasher.finalize().into()
}

fn u32_len(len: usize, field: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| KeystoreError::StringTooLong { field, len })
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_time(out: &mut Vec<u8>, time: DateTime<Utc>) {
    out.extend_from_slice(&time.timestamp_millis().to_be_bytes());
}

fn put_utf(out: &mut Vec<u8>, value: &str, field: &'static str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| KeystoreError::StringTooLong {
        field,
        len: value.len(),
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_bytes(out: &mut Vec<u8>, value: &[u8], field: &'static str) -> Result<()> {
    put_u32(out, u32_len(value.len(), field)?);
    out.extend_from_slice(value);
    Ok(())
}

fn put_certificate(out: &mut Vec<u8>, certificate: &Certificate) -> Result<()> {
    put_utf(out, &certificate.cert_type, "certificate type")?;
    put_bytes(out, &certificate.content, "certificate")
}

struct Cursor<'a> {
    input: &'a [u8],
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    const fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.input.len() < len {
            return Err(KeystoreError::malformed("keystore is truncated"));
        }
        let (head, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn time(&mut self) -> Result<DateTime<Utc>> {
        let millis = i64::from_be_bytes(self.array()?);
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| KeystoreError::malformed(format!("invalid creation time {millis}")))
    }

    fn utf(&mut self, field: &'static str) -> Result<String> {
        let len = u16::from_be_bytes(self.array()?);
        let raw = self.take(usize::from(len))?;
        String::from_utf8(raw.to_vec()).map_err(|_| KeystoreError::InvalidUtf8 { field })
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()?;
        let len = usize::try_from(len).map_err(|_| KeystoreError::malformed("length overflow"))?;
        self.take(len)
    }

    fn certificate(&mut self, version: u32) -> Result<Certificate> {
        let cert_type = if version == VERSION_1 {
            X509.to_string()
        } else {
            self.utf("certificate type")?
        };
        let content = self.bytes()?.to_vec();
        Ok(Certificate { cert_type, content })
    }
}
