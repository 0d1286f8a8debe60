//! Zentinel XFCC Agent
//!
//! Validates client certificates forwarded by the Zentinel proxy after TLS
//! termination: the certificate must chain to a configured trust anchor and
//! its Subject Common Name must be on the allow-list.

pub mod error;
pub mod gate;
pub mod mtls;
pub mod truststore;

#[cfg(test)]
mod test_support;

pub use error::{ConfigError, DecodeError, TrustStoreError, ValidationFault};
pub use gate::{AuthorizationGate, GateResponse, HeaderSource, ValidationOutcome};
pub use mtls::{XfccConfig, XfccSettings};
pub use truststore::TrustAnchorSet;
