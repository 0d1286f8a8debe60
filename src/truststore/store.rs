//! Trust store loading.
//!
//! Supports two on-disk formats:
//! - PKCS#12 (`.p12`/`.pfx`), password protected; every certificate bag is
//!   taken as an anchor and key bags are ignored. Both current archives
//!   (SHA-2 MAC, PBES2/AES) and legacy ones (SHA-1 MAC, RC2/3DES) load.
//! - PEM bundle of `CERTIFICATE` blocks (password not used)

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use super::archive;
use crate::error::TrustStoreError;

/// A trusted certificate, kept as DER and re-parsed on use.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    der: Vec<u8>,
    subject: String,
}

impl TrustAnchor {
    /// DER encoding of the anchor certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject DN, for logging.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Immutable set of trust anchors, indexed by raw subject DN.
pub struct TrustAnchorSet {
    by_subject: HashMap<Vec<u8>, Vec<TrustAnchor>>,
    count: usize,
}

impl std::fmt::Debug for TrustAnchorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustAnchorSet")
            .field("count", &self.count)
            .finish()
    }
}

impl TrustAnchorSet {
    /// Load a trust store file. PEM content is detected by its armor;
    /// anything else is read as PKCS#12.
    pub fn load(path: &Path, password: &str) -> Result<Self, TrustStoreError> {
        let data = std::fs::read(path).map_err(|source| TrustStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let set = if looks_like_pem(&data) {
            warn!(path = ?path, "Trust store is a PEM bundle, password is not used");
            Self::from_pem(&data)?
        } else {
            Self::from_pkcs12(&data, password)?
        };

        info!(path = ?path, anchors = set.len(), "Trust store loaded");
        Ok(set)
    }

    /// Read anchors from a PKCS#12 archive.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self, TrustStoreError> {
        Self::from_der_certs(archive::read_certificates(data, password)?)
    }

    /// Read anchors from a PEM bundle. Non-certificate blocks are skipped.
    pub fn from_pem(data: &[u8]) -> Result<Self, TrustStoreError> {
        let mut certs = Vec::new();
        for pem in Pem::iter_from_buffer(data) {
            let pem = pem.map_err(|e| TrustStoreError::Pem(e.to_string()))?;
            if pem.label == "CERTIFICATE" {
                certs.push(pem.contents);
            } else {
                debug!(label = %pem.label, "Skipping non-certificate PEM block");
            }
        }
        Self::from_der_certs(certs)
    }

    /// Build the set from DER certificates. Every entry must parse; an
    /// empty result is an error.
    pub fn from_der_certs<I>(certs: I) -> Result<Self, TrustStoreError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut by_subject: HashMap<Vec<u8>, Vec<TrustAnchor>> = HashMap::new();
        let mut count = 0;

        for (index, der) in certs.into_iter().enumerate() {
            let (subject_raw, subject) = {
                let (_, cert) = X509Certificate::from_der(&der).map_err(|e| {
                    TrustStoreError::InvalidCertificate {
                        index,
                        reason: e.to_string(),
                    }
                })?;
                (cert.subject().as_raw().to_vec(), cert.subject().to_string())
            };

            debug!(subject = %subject, "Adding trust anchor");
            by_subject
                .entry(subject_raw)
                .or_default()
                .push(TrustAnchor { der, subject });
            count += 1;
        }

        if count == 0 {
            return Err(TrustStoreError::Empty);
        }

        Ok(Self { by_subject, count })
    }

    /// Anchors whose subject equals the given raw issuer DN.
    pub fn anchors_for_issuer(&self, issuer_raw: &[u8]) -> &[TrustAnchor] {
        self.by_subject
            .get(issuer_raw)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether this exact certificate is itself an anchor.
    pub fn contains(&self, der: &[u8]) -> bool {
        self.by_subject
            .values()
            .flatten()
            .any(|anchor| anchor.der == der)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Subject DNs of all anchors.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.by_subject.values().flatten().map(TrustAnchor::subject)
    }
}

fn looks_like_pem(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(b"-----BEGIN")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestCa, PASSWORD};
    use tempfile::tempdir;

    #[test]
    fn test_load_pkcs12() {
        let root = TestCa::new("Partner Root CA");
        let issuing = TestCa::new("Partner Issuing CA");
        let dir = tempdir().unwrap();
        let path = dir.path().join("truststore.p12");
        std::fs::write(&path, root.pkcs12(Some(&issuing), PASSWORD)).unwrap();

        let set = TrustAnchorSet::load(&path, PASSWORD).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&root.der()));
        assert!(set.contains(&issuing.der()));
    }

    #[test]
    fn test_pkcs12_wrong_password() {
        let root = TestCa::new("Partner Root CA");
        let data = root.pkcs12(None, PASSWORD);

        let result = TrustAnchorSet::from_pkcs12(&data, "not-the-password");
        assert!(matches!(result, Err(TrustStoreError::BadPassword)));
    }

    #[test]
    fn test_load_current_tool_stores() {
        for name in ["openssl3.p12", "keytool.p12"] {
            let path = Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("testdata")
                .join(name);

            let set = TrustAnchorSet::load(&path, PASSWORD).unwrap();
            assert_eq!(set.len(), 1, "{}", name);
            assert!(set.subjects().all(|s| s.contains("Partner Root CA")));
        }
    }

    #[test]
    fn test_current_tool_store_wrong_password() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/openssl3.p12");
        let result = TrustAnchorSet::load(&path, "not-the-password");
        assert!(matches!(result, Err(TrustStoreError::BadPassword)));
    }

    #[test]
    fn test_pkcs12_garbage() {
        let result = TrustAnchorSet::from_pkcs12(b"definitely not asn.1", PASSWORD);
        assert!(matches!(result, Err(TrustStoreError::Pkcs12(_))));
    }

    #[test]
    fn test_load_pem_bundle() {
        let root = TestCa::new("Partner Root CA");
        let other = TestCa::new("Other Root CA");
        let bundle = format!("{}\n{}", root.pem(), other.pem());

        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.pem");
        std::fs::write(&path, bundle).unwrap();

        let set = TrustAnchorSet::load(&path, "ignored").unwrap();
        assert_eq!(set.len(), 2);

        let mut subjects: Vec<&str> = set.subjects().collect();
        subjects.sort();
        assert!(subjects[0].contains("Other Root CA"));
        assert!(subjects[1].contains("Partner Root CA"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = TrustAnchorSet::load(&dir.path().join("absent.p12"), PASSWORD);
        assert!(matches!(result, Err(TrustStoreError::Io { .. })));
    }

    #[test]
    fn test_empty_store_rejected() {
        let result = TrustAnchorSet::from_der_certs(Vec::new());
        assert!(matches!(result, Err(TrustStoreError::Empty)));

        let result = TrustAnchorSet::from_pem(b"");
        assert!(matches!(result, Err(TrustStoreError::Empty)));
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let root = TestCa::new("Partner Root CA");
        let result = TrustAnchorSet::from_der_certs(vec![root.der(), vec![0x30, 0x03, 0x02, 0x01]]);
        assert!(matches!(
            result,
            Err(TrustStoreError::InvalidCertificate { index: 1, .. })
        ));
    }

    #[test]
    fn test_issuer_lookup() {
        let root = TestCa::new("Partner Root CA");
        let set = TrustAnchorSet::from_der_certs(vec![root.der()]).unwrap();

        let leaf_der = root.issue("svc-billing");
        let (_, leaf) = X509Certificate::from_der(&leaf_der).unwrap();
        assert_eq!(set.anchors_for_issuer(leaf.issuer().as_raw()).len(), 1);
        assert!(set.anchors_for_issuer(leaf.subject().as_raw()).is_empty());
    }
}
