use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use hickory_resolver::TokioAsyncResolver;
use regex::Regex;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Combined WHOIS and TLS findings for one domain. The two lookups are
/// independent: either side can fail while the other still reports.
#[derive(Debug, Clone, Default)]
pub struct DomainIntel {
    pub created: Option<NaiveDate>,
    pub age_days: Option<i64>,
    pub registrar: Option<String>,
    pub tls_issuer: Option<String>,
    pub whois_error: Option<String>,
    pub tls_error: Option<String>,
}

impl DomainIntel {
    /// Report-ready age line, e.g. `2026-07-25 (10 days ago)`.
    pub fn age_summary(&self) -> String {
        match (self.created, self.age_days) {
            (Some(created), Some(age)) => format!("{created} ({age} days ago)"),
            _ => "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DomainIntelClient {
    whois_timeout: Duration,
    tls_timeout: Duration,
    use_mock: bool,
}

impl DomainIntelClient {
    pub fn new(whois_timeout_seconds: u64, tls_timeout_seconds: u64, use_mock: bool) -> Self {
        Self {
            whois_timeout: Duration::from_secs(whois_timeout_seconds),
            tls_timeout: Duration::from_secs(tls_timeout_seconds),
            use_mock,
        }
    }

    /// Look up WHOIS and TLS intelligence for a domain. Never fails; each
    /// side degrades to its own error string.
    pub async fn lookup(&self, domain: &str) -> DomainIntel {
        if domain.is_empty() || !domain.contains('.') || domain.contains(char::is_whitespace) {
            return DomainIntel {
                whois_error: Some("No valid domain provided.".to_string()),
                tls_error: Some("No valid domain provided.".to_string()),
                ..Default::default()
            };
        }

        if self.use_mock {
            return self.mock_intel(domain);
        }

        let (whois, tls) = tokio::join!(self.whois_lookup(domain), self.tls_probe(domain));

        let mut intel = DomainIntel::default();
        match whois {
            Ok((created, registrar)) => {
                intel.age_days =
                    created.map(|c| (Utc::now().date_naive() - c).num_days());
                intel.created = created;
                intel.registrar = registrar;
            }
            Err(e) => {
                log::debug!("WHOIS lookup failed for {domain}: {e}");
                intel.whois_error = Some(
                    "WHOIS lookup failed. Domain may not exist, be new, or be privacy-protected."
                        .to_string(),
                );
            }
        }
        match tls {
            Ok(issuer) => intel.tls_issuer = Some(issuer),
            Err(e) => {
                log::debug!("TLS probe failed for {domain}: {e}");
                intel.tls_error = Some(format!(
                    "TLS lookup failed. Site may not use HTTPS or is down. ({e})"
                ));
            }
        }
        intel
    }

    async fn whois_lookup(&self, domain: &str) -> Result<(Option<NaiveDate>, Option<String>)> {
        let server = whois_server_for(domain);
        log::debug!("Querying WHOIS server {server} for {domain}");

        let text = match self.query_whois_server(&server, domain).await {
            Ok(text) => text,
            Err(e) => {
                log::debug!("WHOIS query against {server} failed: {e}");
                self.try_fallback_whois_servers(domain).await?
            }
        };
        Ok(parse_whois_text(&text))
    }

    /// Plain-text WHOIS query over TCP port 43.
    async fn query_whois_server(&self, server: &str, domain: &str) -> Result<String> {
        let mut stream =
            timeout(self.whois_timeout, TcpStream::connect(format!("{server}:43"))).await??;

        let query = format!("{domain}\r\n");
        stream.write_all(query.as_bytes()).await?;

        let mut response = String::new();
        timeout(self.whois_timeout, stream.read_to_string(&mut response)).await??;

        if response.is_empty() {
            return Err(anyhow!("Empty WHOIS response"));
        }
        Ok(response)
    }

    async fn try_fallback_whois_servers(&self, domain: &str) -> Result<String> {
        for server in ["whois.iana.org", "whois.internic.net"] {
            log::debug!("Trying fallback WHOIS server: {server}");
            match self.query_whois_server(server, domain).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    log::debug!("Fallback server {server} failed: {e}");
                    continue;
                }
            }
        }
        Err(anyhow!("All WHOIS servers failed for {domain}"))
    }

    /// Probe the domain's mail host (or the domain itself) on port 443 and
    /// pull the certificate issuer organization. SNI carries the original
    /// domain; certificate validation is disabled because this is an
    /// observation, not a trust decision.
    async fn tls_probe(&self, domain: &str) -> Result<String> {
        let host = match self.resolve_mx_host(domain).await {
            Some(mx) => mx,
            None => domain.to_string(),
        };
        log::debug!("TLS probe for {domain} via host {host}");

        let tcp = timeout(self.tls_timeout, TcpStream::connect(format!("{host}:443"))).await??;

        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| anyhow!("invalid server name {domain}: {e}"))?;

        let stream = timeout(self.tls_timeout, connector.connect(server_name, tcp)).await??;
        let (_, session) = stream.get_ref();
        let certs = session
            .peer_certificates()
            .ok_or_else(|| anyhow!("No certificate presented by the server"))?;
        let first = certs
            .first()
            .ok_or_else(|| anyhow!("No certificate presented by the server"))?;

        let (_, cert) = x509_parser::parse_x509_certificate(first.as_ref())
            .map_err(|e| anyhow!("certificate parse failed: {e}"))?;
        let issuer = cert
            .issuer()
            .iter_organization()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .unwrap_or("Unknown Issuer")
            .to_string();
        Ok(issuer)
    }

    async fn resolve_mx_host(&self, domain: &str) -> Option<String> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().ok()?;
        let lookup = timeout(self.tls_timeout, resolver.mx_lookup(domain)).await.ok()?.ok()?;
        lookup
            .iter()
            .min_by_key(|mx| mx.preference())
            .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
    }

    /// Fixture data for tests and dry runs.
    fn mock_intel(&self, domain: &str) -> DomainIntel {
        let mock_ages: HashMap<&str, i64> = HashMap::from([
            ("newdomain.test", 10),
            ("malicious-landing.example", 12),
            ("suspicious.tk", 45),
            ("established.org", 3650),
            ("example.com", 8000),
        ]);
        let age = mock_ages.get(domain).copied().unwrap_or(400);
        let created = Utc::now().date_naive() - chrono::Duration::days(age);

        let (registrar, issuer) = if age < 90 {
            ("NameCheap, Inc.", "Let's Encrypt")
        } else {
            ("MarkMonitor Inc.", "DigiCert Inc")
        };

        DomainIntel {
            created: Some(created),
            age_days: Some(age),
            registrar: Some(registrar.to_string()),
            tls_issuer: Some(issuer.to_string()),
            whois_error: None,
            tls_error: None,
        }
    }
}

/// Certificate verifier that accepts everything. The probe records what a
/// server presents; it never grants trust based on it.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// WHOIS server by TLD, defaulting to the IANA server for anything else.
fn whois_server_for(domain: &str) -> String {
    let tld = domain.rsplit('.').next().unwrap_or(domain);
    let servers = HashMap::from([
        ("com", "whois.verisign-grs.com"),
        ("net", "whois.verisign-grs.com"),
        ("org", "whois.pir.org"),
        ("info", "whois.afilias.net"),
        ("io", "whois.nic.io"),
        ("dev", "whois.nic.google"),
        ("app", "whois.nic.google"),
        ("uk", "whois.nic.uk"),
        ("de", "whois.denic.de"),
        ("fr", "whois.afnic.fr"),
        ("nl", "whois.domain-registry.nl"),
        ("ru", "whois.tcinet.ru"),
        ("tk", "whois.dot.tk"),
        ("ml", "whois.dot.ml"),
    ]);
    servers
        .get(tld)
        .copied()
        .unwrap_or("whois.iana.org")
        .to_string()
}

/// Pull a creation date and registrar out of free-form WHOIS text.
/// Labeled fields are tried first across the common label variants; a bare
/// `YYYY-MM-DD` token anywhere in the text is the last resort.
fn parse_whois_text(text: &str) -> (Option<NaiveDate>, Option<String>) {
    let date_labels = [
        r"(?i)creation\s*date[:\s]+([^\r\n]+)",
        r"(?i)created\s*on[:\s]+([^\r\n]+)",
        r"(?i)registered\s*on[:\s]+([^\r\n]+)",
        r"(?i)registration\s*date[:\s]+([^\r\n]+)",
        r"(?i)domain\s*created[:\s]+([^\r\n]+)",
        r"(?i)created[:\s]+([^\r\n]+)",
        r"(?i)registered[:\s]+([^\r\n]+)",
    ];

    let mut created = None;
    for pattern in date_labels {
        let re = Regex::new(pattern).unwrap();
        if let Some(cap) = re.captures(text).and_then(|c| c.get(1)) {
            if let Some(date) = parse_whois_date(cap.as_str().trim()) {
                created = Some(date);
                break;
            }
        }
    }
    if created.is_none() {
        // Some registries skip labels entirely; take any bare ISO date.
        let bare = Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap();
        created = bare.find(text).and_then(|m| parse_whois_date(m.as_str()));
    }

    // A bare colon requirement keeps "Registrar WHOIS Server:" and
    // "Registrar URL:" lines from shadowing the actual registrar name.
    let registrar_re = Regex::new(r"(?i)(?:registrar|reseller)\s*:\s*([^\r\n]+)").unwrap();
    let registrar = registrar_re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    (created, registrar)
}

fn parse_whois_date(raw: &str) -> Option<NaiveDate> {
    // ISO date prefix covers both bare dates and full RFC 3339 timestamps.
    let iso = Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap();
    if let Some(cap) = iso.captures(raw) {
        return NaiveDate::parse_from_str(
            &format!("{}-{}-{}", &cap[1], &cap[2], &cap[3]),
            "%Y-%m-%d",
        )
        .ok();
    }
    for format in ["%d-%b-%Y", "%d.%m.%Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}
