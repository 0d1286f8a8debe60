//! Per-request validation outcome and its response mapping.

use serde::Serialize;

/// Result of evaluating one request. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Trusted chain and allowed Common Name.
    Authenticated { common_name: String },
    MissingCredential,
    MalformedCredential,
    UntrustedChain,
    UnauthorizedIdentity,
    InternalFailure,
}

impl ValidationOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ValidationOutcome::Authenticated { .. })
    }

    /// HTTP status for a rejection; `None` lets the request through.
    pub fn status(&self) -> Option<u16> {
        match self {
            ValidationOutcome::Authenticated { .. } => None,
            ValidationOutcome::MissingCredential
            | ValidationOutcome::MalformedCredential
            | ValidationOutcome::UntrustedChain => Some(401),
            ValidationOutcome::UnauthorizedIdentity => Some(403),
            ValidationOutcome::InternalFailure => Some(500),
        }
    }

    /// Message returned to the caller. Fixed text, never error detail.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ValidationOutcome::Authenticated { .. } => None,
            ValidationOutcome::MissingCredential => Some("missing client certificate"),
            ValidationOutcome::MalformedCredential => {
                Some("client certificate is not a valid X509 certificate")
            }
            ValidationOutcome::UntrustedChain => {
                Some("client certificate validation failed: invalid certificate path")
            }
            ValidationOutcome::UnauthorizedIdentity => {
                Some("client certificate validation failed: invalid common name")
            }
            ValidationOutcome::InternalFailure => Some("client certificate validation failed"),
        }
    }

    /// Stable code for audit records.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationOutcome::Authenticated { .. } => "AUTHENTICATED",
            ValidationOutcome::MissingCredential => "AUTH_REQUIRED",
            ValidationOutcome::MalformedCredential => "CERT_MALFORMED",
            ValidationOutcome::UntrustedChain => "CERT_UNTRUSTED",
            ValidationOutcome::UnauthorizedIdentity => "IDENTITY_NOT_ALLOWED",
            ValidationOutcome::InternalFailure => "VALIDATION_ERROR",
        }
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationOutcome::Authenticated { .. } => write!(f, "authenticated"),
            ValidationOutcome::MissingCredential => write!(f, "missing_credential"),
            ValidationOutcome::MalformedCredential => write!(f, "malformed_credential"),
            ValidationOutcome::UntrustedChain => write!(f, "untrusted_chain"),
            ValidationOutcome::UnauthorizedIdentity => write!(f, "unauthorized_identity"),
            ValidationOutcome::InternalFailure => write!(f, "internal_failure"),
        }
    }
}

/// Header mutation for the upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HeaderOp {
    Set { name: String, value: String },
}

/// Audit information attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditMetadata {
    pub tags: Vec<String>,
    pub reason_codes: Vec<String>,
}

/// Continue/reject signal handed back to the mediation host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateResponse {
    /// Let the request through.
    pub proceed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers: Vec<HeaderOp>,
    pub audit: AuditMetadata,
}

impl GateResponse {
    pub fn allow() -> Self {
        Self {
            proceed: true,
            status: None,
            message: None,
            request_headers: Vec::new(),
            audit: AuditMetadata::default(),
        }
    }

    pub fn block(status: u16, message: Option<String>) -> Self {
        Self {
            proceed: false,
            status: Some(status),
            message,
            request_headers: Vec::new(),
            audit: AuditMetadata::default(),
        }
    }

    pub fn add_request_header(mut self, op: HeaderOp) -> Self {
        self.request_headers.push(op);
        self
    }

    pub fn with_audit(mut self, audit: AuditMetadata) -> Self {
        self.audit = audit;
        self
    }
}
