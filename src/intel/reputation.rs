use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const API_BASE: &str = "https://www.virustotal.com/api/v3";

/// Vendor flags reduced to three buckets plus the two non-answer cases.
/// `Display` renders the categorical strings that go into reports verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReputationVerdict {
    Dangerous { malicious: u32 },
    Suspicious { suspicious: u32 },
    Clean { harmless: u32 },
    NotSeen,
    Unavailable(String),
}

impl fmt::Display for ReputationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReputationVerdict::Dangerous { malicious } => {
                write!(f, "DANGEROUS ({malicious} vendors flagged as malicious)")
            }
            ReputationVerdict::Suspicious { suspicious } => {
                write!(f, "SUSPICIOUS ({suspicious} vendors flagged as suspicious)")
            }
            ReputationVerdict::Clean { harmless } => write!(f, "Clean ({harmless} vendors)"),
            ReputationVerdict::NotSeen => {
                write!(f, "Not previously seen by reputation vendors")
            }
            ReputationVerdict::Unavailable(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VendorResponse {
    data: Option<VendorData>,
}

#[derive(Debug, Deserialize)]
struct VendorData {
    attributes: Option<VendorAttributes>,
}

#[derive(Debug, Deserialize)]
struct VendorAttributes {
    last_analysis_stats: Option<AnalysisStats>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisStats {
    #[serde(default)]
    malicious: u32,
    #[serde(default)]
    suspicious: u32,
    #[serde(default)]
    harmless: u32,
}

#[derive(Debug, Clone)]
pub struct ReputationClient {
    client: reqwest::Client,
    api_key: Option<String>,
    use_mock: bool,
}

impl ReputationClient {
    pub fn new(
        api_key: Option<String>,
        timeout_seconds: u64,
        use_mock: bool,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("phishhound/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key,
            use_mock,
        })
    }

    /// Vendor verdict for a domain.
    pub async fn domain_verdict(&self, domain: &str) -> ReputationVerdict {
        if self.use_mock {
            return mock_domain_verdict(domain);
        }
        self.fetch_verdict(&format!("{API_BASE}/domains/{domain}")).await
    }

    /// Vendor verdict for a full URL. The endpoint addresses URLs by
    /// unpadded url-safe base64 of the URL itself.
    pub async fn url_verdict(&self, url: &str) -> ReputationVerdict {
        if self.use_mock {
            return mock_url_verdict(url);
        }
        let url_id = URL_SAFE_NO_PAD.encode(url.as_bytes());
        self.fetch_verdict(&format!("{API_BASE}/urls/{url_id}")).await
    }

    async fn fetch_verdict(&self, endpoint: &str) -> ReputationVerdict {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                return ReputationVerdict::Unavailable(
                    "Reputation service not configured.".to_string(),
                )
            }
        };

        let response = match self
            .client
            .get(endpoint)
            .header("x-apikey", api_key.as_str())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::debug!("Reputation request failed: {e}");
                return ReputationVerdict::Unavailable(format!(
                    "Reputation API request failed: {e}"
                ));
            }
        };

        if response.status().as_u16() == 404 {
            return ReputationVerdict::NotSeen;
        }
        if !response.status().is_success() {
            return ReputationVerdict::Unavailable(format!(
                "Reputation API error: status {}",
                response.status()
            ));
        }

        let parsed: VendorResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                return ReputationVerdict::Unavailable(format!(
                    "Reputation API returned malformed JSON: {e}"
                ))
            }
        };

        let stats = parsed
            .data
            .and_then(|d| d.attributes)
            .and_then(|a| a.last_analysis_stats);
        match stats {
            Some(stats) if stats.malicious > 0 => ReputationVerdict::Dangerous {
                malicious: stats.malicious,
            },
            Some(stats) if stats.suspicious > 0 => ReputationVerdict::Suspicious {
                suspicious: stats.suspicious,
            },
            Some(stats) => ReputationVerdict::Clean {
                harmless: stats.harmless,
            },
            None => ReputationVerdict::Unavailable("No analysis results.".to_string()),
        }
    }
}

fn mock_domain_verdict(domain: &str) -> ReputationVerdict {
    if domain == "newdomain.test" || domain == "malicious-landing.example" {
        ReputationVerdict::Dangerous { malicious: 7 }
    } else if domain == "suspicious.tk" {
        ReputationVerdict::Suspicious { suspicious: 2 }
    } else {
        ReputationVerdict::Clean { harmless: 70 }
    }
}

fn mock_url_verdict(url: &str) -> ReputationVerdict {
    if url.contains("malicious") {
        ReputationVerdict::Dangerous { malicious: 9 }
    } else {
        ReputationVerdict::Clean { harmless: 65 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_strings() {
        assert_eq!(
            ReputationVerdict::Dangerous { malicious: 7 }.to_string(),
            "DANGEROUS (7 vendors flagged as malicious)"
        );
        assert_eq!(
            ReputationVerdict::Suspicious { suspicious: 2 }.to_string(),
            "SUSPICIOUS (2 vendors flagged as suspicious)"
        );
        assert_eq!(
            ReputationVerdict::Clean { harmless: 70 }.to_string(),
            "Clean (70 vendors)"
        );
        assert_eq!(
            ReputationVerdict::NotSeen.to_string(),
            "Not previously seen by reputation vendors"
        );
    }

    #[tokio::test]
    async fn test_mock_verdicts() {
        let client = ReputationClient::new(None, 10, true).unwrap();
        assert_eq!(
            client.domain_verdict("newdomain.test").await,
            ReputationVerdict::Dangerous { malicious: 7 }
        );
        assert_eq!(
            client.domain_verdict("suspicious.tk").await,
            ReputationVerdict::Suspicious { suspicious: 2 }
        );
        assert_eq!(
            client.domain_verdict("quietcorner.example").await,
            ReputationVerdict::Clean { harmless: 70 }
        );
    }

    #[tokio::test]
    async fn test_missing_key_reports_not_configured() {
        let client = ReputationClient::new(None, 10, false).unwrap();
        let verdict = client.domain_verdict("example.com").await;
        assert_eq!(
            verdict,
            ReputationVerdict::Unavailable("Reputation service not configured.".to_string())
        );
    }

    #[test]
    fn test_stats_parsing() {
        let json = r#"{"data":{"attributes":{"last_analysis_stats":{"malicious":3,"suspicious":1,"harmless":60}}}}"#;
        let parsed: VendorResponse = serde_json::from_str(json).unwrap();
        let stats = parsed
            .data
            .unwrap()
            .attributes
            .unwrap()
            .last_analysis_stats
            .unwrap();
        assert_eq!(stats.malicious, 3);
        assert_eq!(stats.harmless, 60);
    }
}
