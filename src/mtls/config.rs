//! XFCC configuration.
//!
//! Settings are resolved once at startup. [`XfccConfig::load`] validates
//! them, reads the trust store and returns the immutable configuration
//! shared by every request evaluation.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::ConfigError;
use crate::truststore::TrustAnchorSet;

/// Default header carrying the forwarded certificate.
pub const DEFAULT_CLIENT_CERT_HEADER: &str = "X-Client-Cert";

/// Raw startup settings, before validation.
#[derive(Clone)]
pub struct XfccSettings {
    /// Path to the trust store (PKCS#12 or PEM bundle).
    pub truststore_path: Option<PathBuf>,

    /// Trust store password.
    pub truststore_password: Option<String>,

    /// Common Names allowed through.
    pub allowed_cns: Vec<String>,

    /// Header containing the client certificate (from proxy).
    /// Default: X-Client-Cert
    pub client_cert_header: Option<String>,

    /// Header to add with the authenticated Common Name.
    pub user_id_header: String,

    /// Header to add with the auth method.
    pub auth_method_header: String,

    /// Log certificate details for debugging.
    pub log_certs: bool,
}

fn default_user_id_header() -> String {
    "X-User-Id".to_string()
}

fn default_auth_method_header() -> String {
    "X-Auth-Method".to_string()
}

impl Default for XfccSettings {
    fn default() -> Self {
        Self {
            truststore_path: None,
            truststore_password: None,
            allowed_cns: vec![],
            client_cert_header: None,
            user_id_header: default_user_id_header(),
            auth_method_header: default_auth_method_header(),
            log_certs: false,
        }
    }
}

impl std::fmt::Debug for XfccSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XfccSettings")
            .field("truststore_path", &self.truststore_path)
            .field(
                "truststore_password",
                &self.truststore_password.as_ref().map(|_| "<redacted>"),
            )
            .field("allowed_cns", &self.allowed_cns)
            .field("client_cert_header", &self.client_cert_header)
            .field("user_id_header", &self.user_id_header)
            .field("auth_method_header", &self.auth_method_header)
            .field("log_certs", &self.log_certs)
            .finish()
    }
}

impl XfccSettings {
    /// Check required settings without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.truststore_path {
            Some(ref path) if !path.as_os_str().is_empty() => {}
            _ => return Err(ConfigError::MissingTrustStorePath),
        }

        match self.truststore_password {
            Some(ref password) if !password.is_empty() => {}
            _ => return Err(ConfigError::MissingTrustStorePassword),
        }

        AllowedIdentitySet::new(self.allowed_cns.iter().cloned())?;
        Ok(())
    }
}

/// Split a comma-separated allow-list.
pub fn parse_allow_list(value: &str) -> Vec<String> {
    value.split(',').map(|cn| cn.trim().to_string()).collect()
}

/// Common Names allowed through. Never empty.
#[derive(Debug, Clone)]
pub struct AllowedIdentitySet {
    names: HashSet<String>,
}

impl AllowedIdentitySet {
    /// Build from names; entries are trimmed and blanks dropped.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: HashSet<String> = names
            .into_iter()
            .map(|cn| cn.as_ref().trim().to_string())
            .filter(|cn| !cn.is_empty())
            .collect();

        if names.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }

        Ok(Self { names })
    }

    /// Parse the comma-separated form used by `ALLOWED_CNS`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        Self::new(parse_allow_list(value))
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, cn: &str) -> bool {
        self.names.contains(cn)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Validated configuration, immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct XfccConfig {
    pub trust_anchors: Arc<TrustAnchorSet>,
    pub allowed_identities: AllowedIdentitySet,
    pub client_cert_header: String,
    pub user_id_header: String,
    pub auth_method_header: String,
    pub log_certs: bool,
}

impl XfccConfig {
    pub fn new(trust_anchors: TrustAnchorSet, allowed_identities: AllowedIdentitySet) -> Self {
        Self {
            trust_anchors: Arc::new(trust_anchors),
            allowed_identities,
            client_cert_header: DEFAULT_CLIENT_CERT_HEADER.to_string(),
            user_id_header: default_user_id_header(),
            auth_method_header: default_auth_method_header(),
            log_certs: false,
        }
    }

    /// Validate settings and load the trust store. This is the only place
    /// the trust store file is read.
    pub fn load(settings: &XfccSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let path = settings
            .truststore_path
            .as_ref()
            .ok_or(ConfigError::MissingTrustStorePath)?;
        let password = settings
            .truststore_password
            .as_deref()
            .ok_or(ConfigError::MissingTrustStorePassword)?;

        let allowed_identities = AllowedIdentitySet::new(settings.allowed_cns.iter())?;
        let trust_anchors = TrustAnchorSet::load(path, password)?;

        let client_cert_header = match settings.client_cert_header.as_deref().map(str::trim) {
            Some(header) if !header.is_empty() => header.to_string(),
            _ => {
                info!(
                    header = DEFAULT_CLIENT_CERT_HEADER,
                    "Client certificate header not set, using default"
                );
                DEFAULT_CLIENT_CERT_HEADER.to_string()
            }
        };

        Ok(Self {
            trust_anchors: Arc::new(trust_anchors),
            allowed_identities,
            client_cert_header,
            user_id_header: settings.user_id_header.clone(),
            auth_method_header: settings.auth_method_header.clone(),
            log_certs: settings.log_certs,
        })
    }

    pub fn with_client_cert_header(mut self, header: impl Into<String>) -> Self {
        self.client_cert_header = header.into();
        self
    }
}

/// JSON configuration file, overlaid on environment settings.
/// No `Debug`: it may carry the trust store password.
#[derive(Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct XfccConfigJson {
    pub truststore_path: Option<String>,
    pub truststore_password: Option<String>,
    pub allowed_cns: Option<Vec<String>>,
    pub client_cert_header: Option<String>,
    pub user_id_header: Option<String>,
    pub auth_method_header: Option<String>,
    pub log_certs: Option<bool>,
}

impl XfccConfigJson {
    /// Apply JSON config to existing settings.
    pub fn apply_to(&self, settings: &mut XfccSettings) {
        if let Some(ref path) = self.truststore_path {
            settings.truststore_path = Some(PathBuf::from(path));
        }
        if let Some(ref password) = self.truststore_password {
            settings.truststore_password = Some(password.clone());
        }
        if let Some(ref cns) = self.allowed_cns {
            settings.allowed_cns = cns.clone();
        }
        if let Some(ref header) = self.client_cert_header {
            settings.client_cert_header = Some(header.clone());
        }
        if let Some(ref header) = self.user_id_header {
            settings.user_id_header = header.clone();
        }
        if let Some(ref header) = self.auth_method_header {
            settings.auth_method_header = header.clone();
        }
        if let Some(log) = self.log_certs {
            settings.log_certs = log;
        }
    }
}
