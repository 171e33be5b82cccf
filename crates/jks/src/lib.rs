//! Java KeyStore (JKS) support for vault2cert
//!
//! Reads and writes the JKS binary container:
//! - [`KeyStore`] holds private key and trusted certificate entries
//! - [`KeyStore::store`] / [`KeyStore::load`] serialize with the store password
//! - [`to_pkcs8`] normalises PKCS#1 and SEC1 keys before they are stored
//!
//! ```ignore
//! let mut ks = KeyStore::new();
//! ks.set_private_key_entry("alias", PrivateKeyEntry {
//!     creation_time: chrono::Utc::now(),
//!     private_key: to_pkcs8(&key_der, KeyEncoding::Pkcs1)?,
//!     certificate_chain: vec![Certificate::x509(cert_der)],
//! })?;
//! ks.store(&mut file, b"changeit")?;
//! ```

mod error;
mod keystore;
mod private_key;
mod protector;

pub use error::{KeystoreError, Result};
pub use keystore::{Certificate, Entry, KeyStore, PrivateKeyEntry, TrustedCertificateEntry, X509};
pub use private_key::{KeyEncoding, to_pkcs8};
