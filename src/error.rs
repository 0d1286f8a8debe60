//! Error types.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a header value into a client certificate.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("certificate header value is empty")]
    Empty,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid PEM: {0}")]
    Pem(String),
    #[error("not an X.509 certificate: {0}")]
    Der(String),
    #[error("{0} trailing bytes after certificate")]
    TrailingData(usize),
    #[error("expected exactly one certificate, found {0}")]
    CertificateCount(usize),
    #[error("subject has no common name")]
    MissingCommonName,
    #[error("subject common name is not a string")]
    InvalidCommonName,
}

/// Failure to load the trust store at startup.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("failed to read trust store {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("trust store is not valid PKCS#12: {0}")]
    Pkcs12(String),
    #[error("unsupported PKCS#12 trust store: {0}")]
    Unsupported(String),
    #[error("trust store password is incorrect or the file failed its integrity check")]
    BadPassword,
    #[error("invalid trust store PEM: {0}")]
    Pem(String),
    #[error("trust store entry {index} is not a valid certificate: {reason}")]
    InvalidCertificate { index: usize, reason: String },
    #[error("trust store contains no certificates")]
    Empty,
}

/// Chain validation could not be completed. Distinct from an untrusted verdict.
#[derive(Debug, Error)]
pub enum ValidationFault {
    #[error("trust anchor could not be parsed: {0}")]
    AnchorUnreadable(String),
    #[error("client certificate bytes could not be re-parsed: {0}")]
    LeafUnreadable(String),
    #[error("{0}")]
    Other(String),
}

/// Startup configuration error. Prevents the process from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TRUSTSTORE_PATH is not set")]
    MissingTrustStorePath,
    #[error("TRUSTSTORE_PASSWORD is not set")]
    MissingTrustStorePassword,
    #[error("ALLOWED_CNS is not set or contains no common names")]
    EmptyAllowList,
    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),
}
