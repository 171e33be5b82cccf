//! Error types for keystore encoding and decoding.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the keystore error type.
pub type Result<T> = std::result::Result<T, KeystoreError>;

/// Errors that can occur while building, writing or reading a JKS container.
#[derive(Error, Debug, Diagnostic)]
pub enum KeystoreError {
    /// The stream does not start with the JKS magic number.
    #[error("Not a JKS keystore (magic {found:#010x})")]
    #[diagnostic(
        code(vault2cert_jks::bad_magic),
        help("Only the JKS format is supported; JCEKS and PKCS#12 stores are not")
    )]
    BadMagic {
        /// Magic number that was read
        found: u32,
    },

    /// Unsupported container version.
    #[error("Unsupported JKS version {version}")]
    #[diagnostic(code(vault2cert_jks::unsupported_version))]
    UnsupportedVersion {
        /// Version number that was read
        version: u32,
    },

    /// Unknown entry tag inside the container.
    #[error("Unknown keystore entry tag {tag}")]
    #[diagnostic(code(vault2cert_jks::unknown_tag))]
    UnknownTag {
        /// Tag that was read
        tag: u32,
    },

    /// The trailing integrity hash did not match.
    #[error("Keystore integrity check failed")]
    #[diagnostic(
        code(vault2cert_jks::integrity),
        help("The keystore was tampered with, or the password is incorrect")
    )]
    IntegrityCheckFailed,

    /// The private key check digest did not match after decryption.
    #[error("Cannot recover private key for alias '{alias}'")]
    #[diagnostic(
        code(vault2cert_jks::key_recovery),
        help("The key password is incorrect")
    )]
    KeyRecoveryFailed {
        /// Alias of the entry
        alias: String,
    },

    /// The container layout is broken.
    #[error("Malformed keystore: {message}")]
    #[diagnostic(code(vault2cert_jks::malformed))]
    Malformed {
        /// What went wrong
        message: String,
    },

    /// An ASN.1 structure inside the container or key could not be decoded
    /// or encoded.
    #[error("Malformed DER: {0}")]
    #[diagnostic(code(vault2cert_jks::der))]
    Der(#[from] der::Error),

    /// Private key in a format that cannot be stored.
    #[error("Unsupported private key: {message}")]
    #[diagnostic(
        code(vault2cert_jks::unsupported_key),
        help("Supported key encodings are PKCS#8, PKCS#1 (RSA) and SEC1 (EC with named curve)")
    )]
    UnsupportedKey {
        /// What went wrong
        message: String,
    },

    /// A string field exceeds the 65535 byte limit of the container format.
    #[error("{field} is too long to encode ({len} bytes)")]
    #[diagnostic(code(vault2cert_jks::string_too_long))]
    StringTooLong {
        /// Field being encoded
        field: &'static str,
        /// Encoded length
        len: usize,
    },

    /// A private key entry without a certificate chain.
    #[error("Private key entry '{alias}' has an empty certificate chain")]
    #[diagnostic(code(vault2cert_jks::empty_chain))]
    EmptyChain {
        /// Alias of the entry
        alias: String,
    },

    /// String data that is not valid UTF-8.
    #[error("Invalid UTF-8 in {field}")]
    #[diagnostic(code(vault2cert_jks::utf8))]
    InvalidUtf8 {
        /// Field being decoded
        field: &'static str,
    },

    /// Underlying read or write failed.
    #[error("Keystore I/O error: {0}")]
    #[diagnostic(code(vault2cert_jks::io))]
    Io(#[from] std::io::Error),
}

impl KeystoreError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported_key(message: impl Into<String>) -> Self {
        Self::UnsupportedKey {
            message: message.into(),
        }
    }
}
