//! Forwarded certificate decoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::error::DecodeError;

const PEM_CERT_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Client certificate decoded from a request header.
#[derive(Debug, Clone)]
pub struct ClientCertificate {
    der: Vec<u8>,
    /// Subject Common Name (the identity).
    pub subject_cn: String,
    /// Full Subject Distinguished Name.
    pub subject_dn: String,
    /// Issuer Distinguished Name.
    pub issuer_dn: String,
    /// Certificate serial number (hex).
    pub serial: String,
    /// Not valid before (Unix timestamp).
    pub not_before: i64,
    /// Not valid after (Unix timestamp).
    pub not_after: i64,
}

impl ClientCertificate {
    /// Parse a single DER certificate. Trailing bytes are rejected.
    pub fn from_der(der: Vec<u8>) -> Result<Self, DecodeError> {
        let fields = parse_certificate(&der)?;
        Ok(Self {
            der,
            subject_cn: fields.subject_cn,
            subject_dn: fields.subject_dn,
            issuer_dn: fields.issuer_dn,
            serial: fields.serial,
            not_before: fields.not_before,
            not_after: fields.not_after,
        })
    }

    /// Raw DER bytes, used for chain validation.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn common_name(&self) -> &str {
        &self.subject_cn
    }
}

/// Decode a forwarded header value into a client certificate.
pub fn decode_client_cert(value: &str) -> Result<ClientCertificate, DecodeError> {
    let der = decode_cert_data(value)?;
    ClientCertificate::from_der(der)
}

/// Header value to DER bytes.
fn decode_cert_data(data: &str) -> Result<Vec<u8>, DecodeError> {
    let data = data.trim();
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    // Proxies often URL-encode; '%' never appears in standard base64
    let decoded = if data.contains('%') {
        urlencoding::decode(data)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| data.to_string())
    } else {
        data.to_string()
    };

    if decoded.contains(PEM_CERT_MARKER) {
        return der_from_pem(decoded.as_bytes());
    }

    let bytes = STANDARD.decode(decoded.trim().as_bytes())?;

    // base64 of a PEM file rather than of DER
    if bytes.starts_with(b"-----BEGIN") {
        return der_from_pem(&bytes);
    }

    Ok(bytes)
}

/// Extract the single certificate from PEM text.
fn der_from_pem(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut certs = Vec::new();
    for pem in Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| DecodeError::Pem(e.to_string()))?;
        if pem.label == "CERTIFICATE" {
            certs.push(pem.contents);
        }
    }

    match certs.len() {
        1 => Ok(certs.remove(0)),
        n => Err(DecodeError::CertificateCount(n)),
    }
}

struct CertificateFields {
    subject_cn: String,
    subject_dn: String,
    issuer_dn: String,
    serial: String,
    not_before: i64,
    not_after: i64,
}

fn parse_certificate(der: &[u8]) -> Result<CertificateFields, DecodeError> {
    let (rem, cert) =
        X509Certificate::from_der(der).map_err(|e| DecodeError::Der(e.to_string()))?;

    // A second concatenated certificate shows up as trailing data
    if !rem.is_empty() {
        return Err(DecodeError::TrailingData(rem.len()));
    }

    // Last CN in DER order is the most specific one
    let subject_cn = cert
        .subject()
        .iter_common_name()
        .last()
        .ok_or(DecodeError::MissingCommonName)?
        .as_str()
        .map_err(|_| DecodeError::InvalidCommonName)?
        .to_string();

    if subject_cn.is_empty() {
        return Err(DecodeError::MissingCommonName);
    }

    Ok(CertificateFields {
        subject_cn,
        subject_dn: cert.subject().to_string(),
        issuer_dn: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{encode, TestCa};
    use rcgen::{CertificateParams, DistinguishedName, DnType};

    #[test]
    fn test_decode_base64_der() {
        let ca = TestCa::new("Partner Root CA");
        let der = ca.issue("svc-billing");

        let cert = decode_client_cert(&encode(&der)).unwrap();
        assert_eq!(cert.common_name(), "svc-billing");
        assert_eq!(cert.der(), der.as_slice());
        assert!(cert.subject_dn.contains("svc-billing"));
        assert!(cert.issuer_dn.contains("Partner Root CA"));
        assert!(cert.not_before < cert.not_after);
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let ca = TestCa::new("Partner Root CA");
        let value = format!("  {}\n", encode(&ca.issue("svc-billing")));

        assert!(decode_client_cert(&value).is_ok());
    }

    #[test]
    fn test_decode_pem_value() {
        let ca = TestCa::new("Partner Root CA");
        let cert = decode_client_cert(&ca.pem()).unwrap();
        assert_eq!(cert.common_name(), "Partner Root CA");
    }

    #[test]
    fn test_decode_url_encoded_pem() {
        let ca = TestCa::new("Partner Root CA");
        let encoded = urlencoding::encode(&ca.pem()).into_owned();

        let cert = decode_client_cert(&encoded).unwrap();
        assert_eq!(cert.common_name(), "Partner Root CA");
    }

    #[test]
    fn test_decode_base64_of_pem() {
        let ca = TestCa::new("Partner Root CA");
        let value = encode(ca.pem().as_bytes());

        let cert = decode_client_cert(&value).unwrap();
        assert_eq!(cert.der(), ca.der().as_slice());
    }

    #[test]
    fn test_empty_value() {
        assert!(matches!(decode_client_cert(""), Err(DecodeError::Empty)));
        assert!(matches!(decode_client_cert("   "), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            decode_client_cert("not base64 at all!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_not_a_certificate() {
        let value = encode(b"hello, this is not DER");
        assert!(matches!(decode_client_cert(&value), Err(DecodeError::Der(_))));
    }

    #[test]
    fn test_concatenated_der_rejected() {
        let ca = TestCa::new("Partner Root CA");
        let mut der = ca.issue("svc-billing");
        der.extend_from_slice(&ca.der());

        assert!(matches!(
            decode_client_cert(&encode(&der)),
            Err(DecodeError::TrailingData(_))
        ));
    }

    #[test]
    fn test_pem_chain_rejected() {
        let leaf_ca = TestCa::new("Partner Root CA");
        let other = TestCa::new("Other Root CA");
        let chain = format!("{}\n{}", leaf_ca.pem(), other.pem());

        assert!(matches!(
            decode_client_cert(&chain),
            Err(DecodeError::CertificateCount(2))
        ));
    }

    #[test]
    fn test_missing_common_name() {
        let ca = TestCa::new("Partner Root CA");
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "Integration Partners");
        params.distinguished_name = dn;

        let value = encode(&ca.issue_with(params));
        assert!(matches!(
            decode_client_cert(&value),
            Err(DecodeError::MissingCommonName)
        ));
    }
}
