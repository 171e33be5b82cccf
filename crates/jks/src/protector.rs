//! The JKS private key protection scheme.
//!
//! A SHA-1 keystream seeded from a random salt and the password is XORed over
//! the PKCS#8 key. The output is `salt || ciphertext || SHA1(password || key)`,
//! wrapped in an `EncryptedPrivateKeyInfo` tagged with the key-protector OID.

use crate::error::{KeystoreError, Result};
use der::asn1::{AnyRef, OctetStringRef};
use der::{Decode, Encode, Sequence};
use pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

const SALT_LEN: usize = 20;
const DIGEST_LEN: usize = 20;

const KEY_PROTECTOR_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.42.2.17.1.1");

/// PKCS#8 `EncryptedPrivateKeyInfo` with an opaque algorithm, so the
/// proprietary key protector can be carried.
#[derive(Sequence)]
struct EncryptedPrivateKeyInfo<'a> {
    encryption_algorithm: AlgorithmIdentifierRef<'a>,
    encrypted_data: OctetStringRef<'a>,
}

/// Encode a password the way the JKS format hashes it: UTF-16 big endian.
pub fn password_bytes(password: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let text = std::str::from_utf8(password).map_err(|_| KeystoreError::InvalidUtf8 {
        field: "password",
    })?;
    let mut out = Zeroizing::new(Vec::with_capacity(text.len() * 2));
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    Ok(out)
}

fn keystream(password: &[u8], salt: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut stream = Zeroizing::new(Vec::with_capacity(len + DIGEST_LEN));
    let mut digest = salt.to_vec();
    while stream.len() < len {
        let mut hasher = Sha1::new();
        hasher.update(password);
        hasher.update(&digest);
        digest = hasher.finalize().to_vec();
        stream.extend_from_slice(&digest);
    }
    stream.truncate(len);
    stream
}

fn check_digest(password: &[u8], plain: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(plain);
    hasher.finalize().into()
}

/// Protect a PKCS#8 private key, returning DER `EncryptedPrivateKeyInfo`.
///
/// `password` is the UTF-16BE form produced by [`password_bytes`].
pub fn protect(plain_key: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let salt: [u8; SALT_LEN] = rand::random();
    protect_with_salt(plain_key, password, &salt)
}

fn protect_with_salt(plain_key: &[u8], password: &[u8], salt: &[u8; SALT_LEN]) -> Result<Vec<u8>> {
    let stream = keystream(password, salt, plain_key.len());

    let mut encrypted = Vec::with_capacity(SALT_LEN + plain_key.len() + DIGEST_LEN);
    encrypted.extend_from_slice(salt);
    encrypted.extend(plain_key.iter().zip(stream.iter()).map(|(p, k)| p ^ k));
    encrypted.extend_from_slice(&check_digest(password, plain_key));

    let info = EncryptedPrivateKeyInfo {
        encryption_algorithm: AlgorithmIdentifierRef {
            oid: KEY_PROTECTOR_OID,
            parameters: Some(AnyRef::NULL),
        },
        encrypted_data: OctetStringRef::new(&encrypted)?,
    };
    Ok(info.to_der()?)
}

/// Recover the PKCS#8 key from DER `EncryptedPrivateKeyInfo`.
pub fn recover(protected: &[u8], password: &[u8], alias: &str) -> Result<Zeroizing<Vec<u8>>> {
    let info = EncryptedPrivateKeyInfo::from_der(protected)?;
    if info.encryption_algorithm.oid != KEY_PROTECTOR_OID {
        return Err(KeystoreError::unsupported_key(format!(
            "private key is protected with {}, not the JKS key protector",
            info.encryption_algorithm.oid
        )));
    }
    let encrypted = info.encrypted_data.as_bytes();
    if encrypted.len() < SALT_LEN + DIGEST_LEN {
        return Err(KeystoreError::malformed("protected key is too short"));
    }

    let (salt, rest) = encrypted.split_at(SALT_LEN);
    let (cipher, expected) = rest.split_at(rest.len() - DIGEST_LEN);
    let stream = keystream(password, salt, cipher.len());
    let plain: Zeroizing<Vec<u8>> = Zeroizing::new(
        cipher
            .iter()
            .zip(stream.iter())
            .map(|(c, k)| c ^ k)
            .collect(),
    );

    if check_digest(password, &plain) != expected {
        return Err(KeystoreError::KeyRecoveryFailed {
            alias: alias.to_string(),
        });
    }
    Ok(plain)
}
