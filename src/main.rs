//! Zentinel XFCC Agent
//!
//! Command-line host for the forwarded client certificate gate. Loads the
//! trust store and allow-list once, then evaluates either a single header
//! value or a stream of requests, one JSON header map per stdin line, and
//! writes one JSON response per request to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use zentinel_agent_xfcc::gate::{AuditMetadata, AuthorizationGate, GateResponse};
use zentinel_agent_xfcc::mtls::{parse_allow_list, XfccConfig, XfccConfigJson, XfccSettings};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "zentinel-xfcc-agent")]
#[command(about = "Forwarded client certificate validation for Zentinel reverse proxy")]
struct Args {
    /// Trust store file (PKCS#12 or PEM bundle)
    #[arg(long, env = "TRUSTSTORE_PATH")]
    truststore_path: Option<PathBuf>,

    /// Trust store password
    #[arg(long, env = "TRUSTSTORE_PASSWORD", hide_env_values = true)]
    truststore_password: Option<String>,

    /// Allowed Common Names (comma-separated)
    #[arg(long, env = "ALLOWED_CNS")]
    allowed_cns: Option<String>,

    /// Header carrying the forwarded certificate (default: X-Client-Cert)
    #[arg(long, env = "HEADER_NAME")]
    header_name: Option<String>,

    /// Header to add with the authenticated Common Name
    #[arg(long, default_value = "X-User-Id", env = "USER_ID_HEADER")]
    user_id_header: String,

    /// Header to add with auth method
    #[arg(long, default_value = "X-Auth-Method", env = "AUTH_METHOD_HEADER")]
    auth_method_header: String,

    /// JSON configuration file, applied over flags and environment
    #[arg(long, env = "XFCC_CONFIG")]
    config: Option<PathBuf>,

    /// Log certificate details at debug level
    #[arg(long, env = "XFCC_LOG_CERTS")]
    log_certs: bool,

    /// Evaluate this header value once instead of reading requests from stdin
    #[arg(long)]
    header_value: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, env = "XFCC_VERBOSE")]
    verbose: bool,
}

fn settings_from_args(args: &Args) -> Result<XfccSettings> {
    let mut settings = XfccSettings {
        truststore_path: args.truststore_path.clone(),
        truststore_password: args.truststore_password.clone(),
        allowed_cns: args
            .allowed_cns
            .as_deref()
            .map(parse_allow_list)
            .unwrap_or_default(),
        client_cert_header: args.header_name.clone(),
        user_id_header: args.user_id_header.clone(),
        auth_method_header: args.auth_method_header.clone(),
        log_certs: args.log_certs,
    };

    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let json: XfccConfigJson = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        json.apply_to(&mut settings);
    }

    Ok(settings)
}

/// Header values as sent by the host: a single string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

/// Parse one request line into a header map.
fn parse_request_line(line: &str) -> Result<HashMap<String, Vec<String>>> {
    let raw: HashMap<String, HeaderValues> =
        serde_json::from_str(line).context("Request line is not a JSON header map")?;

    Ok(raw
        .into_iter()
        .map(|(name, values)| match values {
            HeaderValues::One(value) => (name, vec![value]),
            HeaderValues::Many(values) => (name, values),
        })
        .collect())
}

fn bad_request_response() -> GateResponse {
    GateResponse::block(400, Some("Invalid request".to_string())).with_audit(AuditMetadata {
        tags: vec!["auth".to_string(), "host".to_string()],
        reason_codes: vec!["BAD_REQUEST_LINE".to_string()],
    })
}

fn write_response(out: &mut impl Write, response: &GateResponse) -> Result<()> {
    serde_json::to_writer(&mut *out, response).context("Failed to serialize response")?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Evaluate requests from `input` until EOF.
fn run_stream(gate: &AuthorizationGate, input: impl BufRead, out: &mut impl Write) -> Result<usize> {
    let mut handled = 0;
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_request_line(&line) {
            Ok(headers) => gate.mediate(&headers),
            Err(e) => {
                warn!(error = %e, "Rejecting unreadable request line");
                bad_request_response()
            }
        };

        write_response(out, &response)?;
        handled += 1;
    }
    Ok(handled)
}

fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing; stdout carries responses
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "zentinel_agent_xfcc={},{}={}",
            log_level,
            env!("CARGO_CRATE_NAME"),
            log_level
        ))
        .with_writer(std::io::stderr)
        .json()
        .init();

    info!("Starting Zentinel XFCC Agent");

    // Configuration errors stop the process before any request is served
    let settings = settings_from_args(&args)?;
    let config = XfccConfig::load(&settings).context("Invalid XFCC configuration")?;

    info!(
        trust_anchors = config.trust_anchors.len(),
        allowed_cns = config.allowed_identities.len(),
        header = %config.client_cert_header,
        log_certs = config.log_certs,
        "Configuration loaded"
    );

    let gate = AuthorizationGate::new(Arc::new(config));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Some(value) = args.header_value.as_deref() {
        let outcome = gate.evaluate_value(Some(value));
        write_response(&mut out, &gate.respond(&outcome))?;
        return Ok(if outcome.is_authenticated() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let stdin = std::io::stdin();
    let handled = run_stream(&gate, stdin.lock(), &mut out)?;
    info!(requests = handled, "Input closed, shutting down");

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};
    use zentinel_agent_xfcc::mtls::AllowedIdentitySet;
    use zentinel_agent_xfcc::TrustAnchorSet;

    fn test_gate() -> (AuthorizationGate, String) {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Partner Root CA");
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        leaf_params
            .distinguished_name
            .push(DnType::CommonName, "svc-billing");
        let leaf = leaf_params
            .signed_by(&leaf_key, &Issuer::from_ca_cert_der(ca.der(), &ca_key).unwrap())
            .unwrap();

        let anchors = TrustAnchorSet::from_der_certs(vec![ca.der().to_vec()]).unwrap();
        let allowed = AllowedIdentitySet::parse("svc-billing").unwrap();
        let gate = AuthorizationGate::new(Arc::new(XfccConfig::new(anchors, allowed)));
        (gate, STANDARD.encode(leaf.der()))
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["zentinel-xfcc-agent"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_parse_request_line() {
        let headers =
            parse_request_line(r#"{"X-Client-Cert": "abc", "Accept": ["a", "b"]}"#).unwrap();
        assert_eq!(headers["X-Client-Cert"], vec!["abc".to_string()]);
        assert_eq!(headers["Accept"].len(), 2);

        assert!(parse_request_line("not json").is_err());
        assert!(parse_request_line(r#"{"X-Client-Cert": 42}"#).is_err());
    }

    #[test]
    fn test_run_stream() {
        let (gate, cert) = test_gate();
        let input = format!(
            "{{\"x-client-cert\": \"{}\"}}\n\n{{}}\ngarbage\n",
            cert
        );

        let mut out = Vec::new();
        let handled = run_stream(&gate, input.as_bytes(), &mut out).unwrap();
        assert_eq!(handled, 3);

        let responses: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses[0]["proceed"], true);
        assert_eq!(responses[1]["status"], 401);
        assert_eq!(responses[1]["audit"]["reason_codes"][0], "AUTH_REQUIRED");
        assert_eq!(responses[2]["status"], 400);
    }

    #[test]
    fn test_settings_from_args() {
        let settings = settings_from_args(&args(&[
            "--truststore-path",
            "/etc/xfcc/truststore.p12",
            "--truststore-password",
            "changeit",
            "--allowed-cns",
            "svc-billing, svc-ledger",
        ]))
        .unwrap();

        assert_eq!(
            settings.truststore_path,
            Some(PathBuf::from("/etc/xfcc/truststore.p12"))
        );
        assert_eq!(settings.allowed_cns, vec!["svc-billing", "svc-ledger"]);
        assert_eq!(settings.user_id_header, "X-User-Id");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_config_file_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xfcc.json");
        std::fs::write(&path, r#"{"allowed-cns": ["svc-ledger"], "log-certs": true}"#).unwrap();

        let settings = settings_from_args(&args(&[
            "--allowed-cns",
            "svc-billing",
            "--config",
            path.to_str().unwrap(),
        ]))
        .unwrap();

        assert_eq!(settings.allowed_cns, vec!["svc-ledger"]);
        assert!(settings.log_certs);
    }

    #[test]
    fn test_settings_bad_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xfcc.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = settings_from_args(&args(&["--config", path.to_str().unwrap()]));
        assert!(result.is_err());
    }
}
