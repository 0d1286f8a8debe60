//! PKCS#12 archive reading.
//!
//! The integrity MAC is checked with whichever digest the archive names
//! (SHA-1, SHA-256, SHA-384, SHA-512). Certificate bags encrypted with
//! PBES2, as written by OpenSSL 3 and current keytool, are decrypted here.
//! Archives whose bags use the older PKCS#12 PBE ciphers (RC2, 3DES) are
//! handed to the `p12` crate once the MAC has passed.

use cms::content_info::ContentInfo;
use cms::encrypted_data::EncryptedData;
use der::asn1::{ContextSpecific, ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use hmac::digest::core_api::BlockSizeUser;
use hmac::digest::{Digest, FixedOutputReset};
use hmac::{Mac, SimpleHmac};
use pkcs12::cert_type::CertBag;
use pkcs12::kdf::{derive_key_utf8, Pkcs12KeyType};
use pkcs12::mac_data::MacData;
use pkcs12::pfx::Pfx;
use pkcs12::safe_bag::SafeContents;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use tracing::{debug, warn};

use crate::error::TrustStoreError;

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_ENCRYPTED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");

const ID_SHA_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const ID_SHA_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_SHA_384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const ID_SHA_512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// Read every X.509 certificate bag of a password-protected archive.
pub(crate) fn read_certificates(
    data: &[u8],
    password: &str,
) -> Result<Vec<Vec<u8>>, TrustStoreError> {
    let pfx = match Pfx::from_der(data) {
        Ok(pfx) => pfx,
        Err(e) => {
            // BER-encoded archives only come from old tooling
            debug!(error = %e, "Archive is not DER, using legacy reader");
            return read_legacy(data, password, false);
        }
    };

    if pfx.auth_safe.content_type != ID_DATA {
        return Err(TrustStoreError::Unsupported(format!(
            "authenticated safe of type {}",
            pfx.auth_safe.content_type
        )));
    }
    let auth_safe = OctetString::from_der(&pfx.auth_safe.content.to_der().map_err(malformed)?)
        .map_err(malformed)?;

    match &pfx.mac_data {
        Some(mac_data) => verify_mac(mac_data, password, auth_safe.as_bytes())?,
        None => warn!("PKCS#12 trust store has no MAC, integrity is not checked"),
    }

    let safes = Vec::<ContentInfo>::from_der(auth_safe.as_bytes()).map_err(malformed)?;
    let mut certs = Vec::new();

    for safe in safes {
        let body = safe.content.to_der().map_err(malformed)?;
        match safe.content_type {
            ID_DATA => {
                let contents = OctetString::from_der(&body).map_err(malformed)?;
                collect_cert_bags(contents.as_bytes(), &mut certs)?;
            }
            ID_ENCRYPTED_DATA => {
                let encrypted = EncryptedData::from_der(&body).map_err(malformed)?;
                let info = encrypted.enc_content_info;
                let alg = info.content_enc_alg;

                if is_legacy_pbe(&alg.oid) {
                    debug!(algorithm = %alg.oid, "Certificate bags use a PKCS#12 PBE cipher");
                    return read_legacy(data, password, true);
                }

                let alg_der = alg.to_der().map_err(malformed)?;
                let scheme = pkcs5::EncryptionScheme::try_from(alg_der.as_slice()).map_err(|e| {
                    TrustStoreError::Unsupported(format!("bag encryption {}: {}", alg.oid, e))
                })?;

                let mut buffer = info
                    .encrypted_content
                    .as_ref()
                    .map(|c| c.as_bytes().to_vec())
                    .unwrap_or_default();
                let plain = scheme.decrypt_in_place(password, &mut buffer).map_err(|e| {
                    TrustStoreError::Pkcs12(format!("certificate bags could not be decrypted: {}", e))
                })?;
                collect_cert_bags(plain, &mut certs)?;
            }
            other => debug!(content_type = %other, "Skipping unsupported safe"),
        }
    }

    Ok(certs)
}

fn verify_mac(mac_data: &MacData, password: &str, content: &[u8]) -> Result<(), TrustStoreError> {
    let salt = mac_data.mac_salt.as_bytes();
    let rounds = mac_data.iterations;
    let expected = mac_data.mac.digest.as_bytes();

    let matches = match mac_data.mac.algorithm.oid {
        ID_SHA_1 => mac_matches::<Sha1>(password, salt, rounds, content, expected)?,
        ID_SHA_256 => mac_matches::<Sha256>(password, salt, rounds, content, expected)?,
        ID_SHA_384 => mac_matches::<Sha384>(password, salt, rounds, content, expected)?,
        ID_SHA_512 => mac_matches::<Sha512>(password, salt, rounds, content, expected)?,
        other => {
            return Err(TrustStoreError::Unsupported(format!("MAC digest {}", other)));
        }
    };

    if matches {
        Ok(())
    } else {
        Err(TrustStoreError::BadPassword)
    }
}

fn mac_matches<D>(
    password: &str,
    salt: &[u8],
    rounds: i32,
    content: &[u8],
    expected: &[u8],
) -> Result<bool, TrustStoreError>
where
    D: Digest + FixedOutputReset + BlockSizeUser,
{
    let key = derive_key_utf8::<D>(
        password,
        salt,
        Pkcs12KeyType::Mac,
        rounds,
        <D as Digest>::output_size(),
    )
    .map_err(malformed)?;

    let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(&key)
        .map_err(|e| TrustStoreError::Pkcs12(e.to_string()))?;
    mac.update(content);
    Ok(mac.verify_slice(expected).is_ok())
}

fn collect_cert_bags(contents: &[u8], certs: &mut Vec<Vec<u8>>) -> Result<(), TrustStoreError> {
    for bag in SafeContents::from_der(contents).map_err(malformed)? {
        if bag.bag_id != pkcs12::PKCS_12_CERT_BAG_OID {
            debug!(bag = %bag.bag_id, "Skipping non-certificate bag");
            continue;
        }

        let cert_bag: ContextSpecific<CertBag> =
            ContextSpecific::from_der(&bag.bag_value).map_err(malformed)?;
        if cert_bag.value.cert_id == pkcs12::PKCS_12_X509_CERT_OID {
            certs.push(cert_bag.value.cert_value.as_bytes().to_vec());
        } else {
            debug!(cert_type = %cert_bag.value.cert_id, "Skipping non-X.509 certificate bag");
        }
    }
    Ok(())
}

fn is_legacy_pbe(oid: &ObjectIdentifier) -> bool {
    *oid == pkcs12::PKCS_12_PBE_WITH_SHAAND3_KEY_TRIPLE_DES_CBC
        || *oid == pkcs12::PKCS_12_PBEWITH_SHAAND40_BIT_RC2_CBC
}

/// `p12` only verifies SHA-1 MACs; anything else must already be checked.
fn read_legacy(
    data: &[u8],
    password: &str,
    mac_checked: bool,
) -> Result<Vec<Vec<u8>>, TrustStoreError> {
    let pfx = p12::PFX::parse(data).map_err(|e| TrustStoreError::Pkcs12(format!("{:?}", e)))?;

    if !mac_checked {
        match &pfx.mac_data {
            Some(mac_data) if mac_data.mac.digest_algorithm != p12::AlgorithmIdentifier::Sha1 => {
                return Err(TrustStoreError::Unsupported(
                    "non-DER archive with a non SHA-1 MAC".to_string(),
                ));
            }
            Some(_) if !pfx.verify_mac(password) => return Err(TrustStoreError::BadPassword),
            _ => {}
        }
    }

    pfx.cert_x509_bags(password)
        .map_err(|e| TrustStoreError::Pkcs12(format!("{:?}", e)))
}

fn malformed(e: der::Error) -> TrustStoreError {
    TrustStoreError::Pkcs12(e.to_string())
}
