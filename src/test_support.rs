//! Certificate fixtures minted with rcgen.

use base64::{engine::general_purpose::STANDARD, Engine};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, Issuer,
    KeyPair,
};

pub const PASSWORD: &str = "changeit";

/// A certificate authority with its signing key.
pub struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        Self::from_params(ca_params(cn))
    }

    pub fn from_params(params: CertificateParams) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// Subordinate CA signed by this one.
    pub fn intermediate(&self, cn: &str) -> TestCa {
        let key = KeyPair::generate().unwrap();
        let cert = ca_params(cn)
            .signed_by(&key, &self.issuer())
            .unwrap();
        TestCa { cert, key }
    }

    fn issuer(&self) -> Issuer<'static, &KeyPair> {
        Issuer::from_ca_cert_der(self.cert.der(), &self.key).unwrap()
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue a leaf valid for the default rcgen window (1975..4096).
    pub fn issue(&self, cn: &str) -> Vec<u8> {
        self.issue_with(leaf_params(cn))
    }

    pub fn issue_with(&self, params: CertificateParams) -> Vec<u8> {
        let key = KeyPair::generate().unwrap();
        params
            .signed_by(&key, &self.issuer())
            .unwrap()
            .der()
            .to_vec()
    }

    /// PKCS#12 trust store holding this CA (and optionally a second one).
    pub fn pkcs12(&self, extra: Option<&TestCa>, password: &str) -> Vec<u8> {
        let extra_der = extra.map(|ca| ca.der());
        p12::PFX::new(
            &self.der(),
            &self.key.serialize_der(),
            extra_der.as_deref(),
            password,
            "trust-anchor",
        )
        .unwrap()
        .to_der()
    }
}

pub fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name = distinguished_name(cn);
    params
}

pub fn leaf_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = distinguished_name(cn);
    params
}

pub fn distinguished_name(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Integration Partners");
    dn.push(DnType::CommonName, cn);
    dn
}

/// Header value as forwarded by the upstream terminator.
pub fn encode(der: &[u8]) -> String {
    STANDARD.encode(der)
}
