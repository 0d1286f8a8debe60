//! Forwarded client certificate authentication.
//!
//! TLS terminates at the proxy, which passes the client certificate in a
//! request header. This module decodes it, validates its path against the
//! trust store and holds the allow-list it is authorized against.

pub mod config;
pub mod decoder;
pub mod validator;

pub use config::{
    parse_allow_list, AllowedIdentitySet, XfccConfig, XfccConfigJson, XfccSettings,
    DEFAULT_CLIENT_CERT_HEADER,
};
pub use decoder::{decode_client_cert, ClientCertificate};
pub use validator::{ChainVerifier, TrustVerdict, UntrustedReason};
