//! Authorization gate: decode, validate the path, check the identity.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::outcome::{AuditMetadata, GateResponse, HeaderOp, ValidationOutcome};
use crate::mtls::{decode_client_cert, ChainVerifier, TrustVerdict, XfccConfig};

/// Read access to the inbound request headers.
pub trait HeaderSource {
    /// Every value of the named header. Names are case-insensitive.
    fn header_values(&self, name: &str) -> Vec<&str>;

    /// First value of the named header.
    fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }
}

impl HeaderSource for HashMap<String, Vec<String>> {
    fn header_values(&self, name: &str) -> Vec<&str> {
        self.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.iter().map(String::as_str))
            .collect()
    }
}

impl HeaderSource for HashMap<String, String> {
    fn header_values(&self, name: &str) -> Vec<&str> {
        self.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Evaluates forwarded client certificates. Cheap to clone; holds only
/// shared read-only state.
#[derive(Clone)]
pub struct AuthorizationGate {
    config: Arc<XfccConfig>,
    verifier: Arc<dyn ChainVerifier>,
}

impl AuthorizationGate {
    /// Gate validating against the configured trust anchors.
    pub fn new(config: Arc<XfccConfig>) -> Self {
        let verifier: Arc<dyn ChainVerifier> = config.trust_anchors.clone();
        Self { config, verifier }
    }

    /// Gate with a substitute chain verifier.
    pub fn with_verifier(config: Arc<XfccConfig>, verifier: Arc<dyn ChainVerifier>) -> Self {
        Self { config, verifier }
    }

    pub fn config(&self) -> &XfccConfig {
        &self.config
    }

    /// Evaluate a request and build the host response.
    pub fn mediate<H: HeaderSource + ?Sized>(&self, headers: &H) -> GateResponse {
        let outcome = self.evaluate(headers);
        self.respond(&outcome)
    }

    /// Evaluate the configured certificate header of a request. A header
    /// sent more than once cannot name a single leaf and is malformed.
    pub fn evaluate<H: HeaderSource + ?Sized>(&self, headers: &H) -> ValidationOutcome {
        let values = headers.header_values(&self.config.client_cert_header);
        if values.len() > 1 {
            warn!(
                header = %self.config.client_cert_header,
                count = values.len(),
                "Client certificate header repeated"
            );
            return ValidationOutcome::MalformedCredential;
        }
        self.evaluate_value(values.first().copied())
    }

    /// Evaluate a raw header value at the current time.
    pub fn evaluate_value(&self, value: Option<&str>) -> ValidationOutcome {
        self.evaluate_value_at(value, Utc::now())
    }

    /// Evaluate a raw header value. Steps run in a fixed order and stop at
    /// the first failure: presence, decoding, chain, allow-list.
    pub fn evaluate_value_at(&self, value: Option<&str>, at: DateTime<Utc>) -> ValidationOutcome {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => {
                warn!(header = %self.config.client_cert_header, "Missing client certificate");
                return ValidationOutcome::MissingCredential;
            }
        };

        let cert = match decode_client_cert(value) {
            Ok(cert) => cert,
            Err(e) => {
                warn!(error = %e, "Client certificate is not a valid X509 certificate");
                return ValidationOutcome::MalformedCredential;
            }
        };

        if self.config.log_certs {
            debug!(
                subject_dn = %cert.subject_dn,
                issuer_dn = %cert.issuer_dn,
                serial = %cert.serial,
                not_before = cert.not_before,
                not_after = cert.not_after,
                "Parsed client certificate"
            );
        }

        match self.verifier.verify_at(&cert, at) {
            Ok(TrustVerdict::Trusted) => {}
            Ok(TrustVerdict::Untrusted(reason)) => {
                warn!(
                    reason = %reason,
                    issuer_dn = %cert.issuer_dn,
                    "Client certificate validation failed: invalid certificate path"
                );
                return ValidationOutcome::UntrustedChain;
            }
            Err(e) => {
                warn!(error = %e, "Client certificate validation could not be completed");
                return ValidationOutcome::InternalFailure;
            }
        }

        let common_name = cert.common_name();
        if !self.config.allowed_identities.contains(common_name) {
            warn!(
                common_name = %common_name,
                "Client certificate validation failed: common name is not allowed"
            );
            return ValidationOutcome::UnauthorizedIdentity;
        }

        info!(common_name = %common_name, "Client certificate validation successful");
        ValidationOutcome::Authenticated {
            common_name: common_name.to_string(),
        }
    }

    /// Map an outcome to the host response.
    pub fn respond(&self, outcome: &ValidationOutcome) -> GateResponse {
        match outcome {
            ValidationOutcome::Authenticated { common_name } => GateResponse::allow()
                .add_request_header(HeaderOp::Set {
                    name: self.config.user_id_header.clone(),
                    value: common_name.clone(),
                })
                .add_request_header(HeaderOp::Set {
                    name: self.config.auth_method_header.clone(),
                    value: "mtls".to_string(),
                })
                .with_audit(AuditMetadata {
                    tags: vec!["auth".to_string(), "mtls".to_string()],
                    ..Default::default()
                }),
            rejected => {
                let status = rejected.status().unwrap_or(500);
                GateResponse::block(status, rejected.message().map(String::from)).with_audit(
                    AuditMetadata {
                        tags: vec!["auth".to_string(), "mtls".to_string(), "blocked".to_string()],
                        reason_codes: vec![rejected.reason_code().to_string()],
                    },
                )
            }
        }
    }
}
