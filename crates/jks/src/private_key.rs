//! Normalisation of private keys to PKCS#8 `PrivateKeyInfo`.
//!
//! JKS stores keys as PKCS#8. Vault hands out RSA keys as PKCS#1 and EC keys
//! as SEC1 unless asked otherwise, so both are wrapped here.

use crate::error::{KeystoreError, Result};
use der::asn1::AnyRef;
use der::{Decode, Encode};
use pkcs1::RsaPrivateKey;
use pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo};
use sec1::EcPrivateKey;
use zeroize::Zeroizing;

/// rsaEncryption
const RSA_ENCRYPTION_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Encodings a private key may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// PKCS#8 `PrivateKeyInfo` (`BEGIN PRIVATE KEY`)
    Pkcs8,
    /// PKCS#1 `RSAPrivateKey` (`BEGIN RSA PRIVATE KEY`)
    Pkcs1,
    /// SEC1 `ECPrivateKey` (`BEGIN EC PRIVATE KEY`)
    Sec1,
}

/// Convert a DER private key to PKCS#8.
///
/// # Errors
///
/// Returns an error if the key is not well-formed DER for its encoding, or if
/// a SEC1 key does not name its curve.
pub fn to_pkcs8(key: &[u8], encoding: KeyEncoding) -> Result<Zeroizing<Vec<u8>>> {
    match encoding {
        KeyEncoding::Pkcs8 => {
            PrivateKeyInfo::from_der(key)?;
            Ok(Zeroizing::new(key.to_vec()))
        }
        KeyEncoding::Pkcs1 => {
            RsaPrivateKey::from_der(key)?;
            let algorithm = AlgorithmIdentifierRef {
                oid: RSA_ENCRYPTION_OID,
                parameters: Some(AnyRef::NULL),
            };
            wrap(algorithm, key)
        }
        KeyEncoding::Sec1 => {
            let curve = EcPrivateKey::from_der(key)?
                .parameters
                .and_then(|parameters| parameters.named_curve())
                .ok_or_else(|| KeystoreError::unsupported_key("EC key does not name its curve"))?;
            let algorithm = AlgorithmIdentifierRef {
                oid: EC_PUBLIC_KEY_OID,
                parameters: Some(AnyRef::from(&curve)),
            };
            wrap(algorithm, key)
        }
    }
}

fn wrap(algorithm: AlgorithmIdentifierRef<'_>, key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    Ok(Zeroizing::new(PrivateKeyInfo::new(algorithm, key).to_der()?))
}
