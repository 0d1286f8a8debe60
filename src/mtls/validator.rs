//! Certificate path validation against the trust store.
//!
//! Every certificate in the trust store is an anchor, intermediates
//! included, so a path is the forwarded leaf plus one anchor that issued
//! it. The leaf and the anchor must both be inside their validity window.
//! Signature verification follows the algorithm named in the leaf
//! (RSA, ECDSA, Ed25519); no key type is assumed.
//!
//! The leaf must also be usable as a TLS client certificate: no critical
//! extension this module does not understand, an extendedKeyUsage (when
//! present) naming clientAuth or anyExtendedKeyUsage, and a keyUsage (when
//! present) with digitalSignature.
//!
//! Revocation (CRL/OCSP) is not checked: a revoked certificate that is
//! otherwise valid is trusted here.

use chrono::{DateTime, Utc};
use tracing::debug;
use x509_parser::error::X509Error;
use x509_parser::prelude::*;

use super::decoder::ClientCertificate;
use crate::error::ValidationFault;
use crate::truststore::TrustAnchorSet;

/// Result of a completed chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustVerdict {
    Trusted,
    Untrusted(UntrustedReason),
}

impl TrustVerdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, TrustVerdict::Trusted)
    }
}

/// Why a certificate did not chain to an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrustedReason {
    NotYetValid,
    Expired,
    UnknownIssuer,
    BadSignature,
    UnsupportedAlgorithm,
    IssuerNotCa,
    IssuerNotValid,
    UnhandledCriticalExtension,
    NotForClientAuth,
    KeyUsageMismatch,
}

impl std::fmt::Display for UntrustedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UntrustedReason::NotYetValid => write!(f, "not_yet_valid"),
            UntrustedReason::Expired => write!(f, "expired"),
            UntrustedReason::UnknownIssuer => write!(f, "unknown_issuer"),
            UntrustedReason::BadSignature => write!(f, "bad_signature"),
            UntrustedReason::UnsupportedAlgorithm => write!(f, "unsupported_algorithm"),
            UntrustedReason::IssuerNotCa => write!(f, "issuer_not_ca"),
            UntrustedReason::IssuerNotValid => write!(f, "issuer_not_valid"),
            UntrustedReason::UnhandledCriticalExtension => {
                write!(f, "unhandled_critical_extension")
            }
            UntrustedReason::NotForClientAuth => write!(f, "not_for_client_auth"),
            UntrustedReason::KeyUsageMismatch => write!(f, "key_usage_mismatch"),
        }
    }
}

/// Decides whether a client certificate chains to a trusted anchor.
///
/// `Err` means validation could not be completed (broken trust
/// configuration), which callers must not confuse with `Untrusted`.
pub trait ChainVerifier: Send + Sync {
    fn verify_at(
        &self,
        cert: &ClientCertificate,
        at: DateTime<Utc>,
    ) -> Result<TrustVerdict, ValidationFault>;

    fn verify(&self, cert: &ClientCertificate) -> Result<TrustVerdict, ValidationFault> {
        self.verify_at(cert, Utc::now())
    }
}

impl ChainVerifier for TrustAnchorSet {
    fn verify_at(
        &self,
        cert: &ClientCertificate,
        at: DateTime<Utc>,
    ) -> Result<TrustVerdict, ValidationFault> {
        let now = at.timestamp();

        let (_, leaf) = X509Certificate::from_der(cert.der())
            .map_err(|e| ValidationFault::LeafUnreadable(e.to_string()))?;

        if let Some(reason) = check_validity(&leaf, now) {
            return Ok(TrustVerdict::Untrusted(reason));
        }

        if let Some(reason) = check_client_usage(&leaf) {
            return Ok(TrustVerdict::Untrusted(reason));
        }

        // The forwarded certificate may itself be pinned in the trust store
        if self.contains(cert.der()) {
            debug!(subject_dn = %cert.subject_dn, "Client certificate is a trust anchor");
            return Ok(TrustVerdict::Trusted);
        }

        let candidates = self.anchors_for_issuer(leaf.issuer().as_raw());
        if candidates.is_empty() {
            return Ok(TrustVerdict::Untrusted(UntrustedReason::UnknownIssuer));
        }

        let mut reason = UntrustedReason::BadSignature;
        for anchor in candidates {
            let (_, issuer) = X509Certificate::from_der(anchor.der()).map_err(|e| {
                ValidationFault::AnchorUnreadable(format!("{}: {}", anchor.subject(), e))
            })?;

            match leaf.verify_signature(Some(issuer.public_key())) {
                Ok(()) => {}
                Err(X509Error::SignatureUnsupportedAlgorithm) => {
                    reason = UntrustedReason::UnsupportedAlgorithm;
                    continue;
                }
                Err(e) => {
                    debug!(anchor = %anchor.subject(), error = %e, "Signature does not verify");
                    continue;
                }
            }

            if !may_sign_certificates(&issuer) {
                reason = UntrustedReason::IssuerNotCa;
                continue;
            }

            if check_validity(&issuer, now).is_some() {
                reason = UntrustedReason::IssuerNotValid;
                continue;
            }

            debug!(
                subject_dn = %cert.subject_dn,
                anchor = %anchor.subject(),
                "Certificate path verified"
            );
            return Ok(TrustVerdict::Trusted);
        }

        Ok(TrustVerdict::Untrusted(reason))
    }
}

fn check_validity(cert: &X509Certificate<'_>, now: i64) -> Option<UntrustedReason> {
    if now < cert.validity().not_before.timestamp() {
        return Some(UntrustedReason::NotYetValid);
    }
    if now > cert.validity().not_after.timestamp() {
        return Some(UntrustedReason::Expired);
    }
    None
}

/// End-entity checks for a TLS client certificate.
fn check_client_usage(cert: &X509Certificate<'_>) -> Option<UntrustedReason> {
    // RFC 5280 4.2: an unrecognized critical extension must be rejected
    if cert
        .extensions()
        .iter()
        .any(|ext| ext.critical && !is_known_extension(&ext.oid.to_id_string()))
    {
        return Some(UntrustedReason::UnhandledCriticalExtension);
    }

    match cert.extended_key_usage() {
        Ok(Some(eku)) if !(eku.value.client_auth || eku.value.any) => {
            return Some(UntrustedReason::NotForClientAuth);
        }
        Ok(_) => {}
        Err(_) => return Some(UntrustedReason::NotForClientAuth),
    }

    match cert.key_usage() {
        Ok(Some(ku)) if !ku.value.digital_signature() => Some(UntrustedReason::KeyUsageMismatch),
        Ok(_) => None,
        Err(_) => Some(UntrustedReason::KeyUsageMismatch),
    }
}

fn is_known_extension(oid: &str) -> bool {
    matches!(
        oid,
        "2.5.29.14" // subjectKeyIdentifier
        | "2.5.29.15" // keyUsage
        | "2.5.29.17" // subjectAltName
        | "2.5.29.18" // issuerAltName
        | "2.5.29.19" // basicConstraints
        | "2.5.29.30" // nameConstraints
        | "2.5.29.31" // cRLDistributionPoints
        | "2.5.29.32" // certificatePolicies
        | "2.5.29.33" // policyMappings
        | "2.5.29.35" // authorityKeyIdentifier
        | "2.5.29.36" // policyConstraints
        | "2.5.29.37" // extKeyUsage
        | "2.5.29.46" // freshestCRL
        | "2.5.29.54" // inhibitAnyPolicy
        | "1.3.6.1.5.5.7.1.1" // authorityInfoAccess
        | "1.3.6.1.5.5.7.1.11" // subjectInfoAccess
    )
}

/// Issuer must be a CA when it says anything about it; v1 roots carry no
/// extensions at all.
fn may_sign_certificates(cert: &X509Certificate<'_>) -> bool {
    let is_ca = match cert.basic_constraints() {
        Ok(Some(bc)) => bc.value.ca,
        Ok(None) => true,
        Err(_) => false,
    };

    let can_sign = match cert.key_usage() {
        Ok(Some(ku)) => ku.value.key_cert_sign(),
        Ok(None) => true,
        Err(_) => false,
    };

    is_ca && can_sign
}
