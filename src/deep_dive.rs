use crate::intel::domain_intel::DomainIntelClient;
use crate::intel::reputation::{ReputationClient, ReputationVerdict};

/// Mail, search, and OS platforms everyone relays through. Investigating
/// these burns API quota and produces false positives, so the deep dive
/// short-circuits without touching the adapters.
const REPUTABLE_PLATFORMS: [&str; 6] = [
    "google.com",
    "googleapis.com",
    "tiktok.com",
    "apple.com",
    "microsoft.com",
    "gmail.com",
];

/// Risk summary for one investigated domain. Immutable once produced;
/// findings accumulate into the report and their scores sum.
#[derive(Debug, Clone)]
pub struct DomainFinding {
    pub domain: String,
    pub score: u32,
    pub report_lines: Vec<String>,
    pub is_suspicious: bool,
}

pub fn is_reputable_platform(domain: &str) -> bool {
    let domain = domain.to_lowercase();
    REPUTABLE_PLATFORMS
        .iter()
        .any(|p| domain == *p || domain.ends_with(&format!(".{p}")))
}

/// Compose the reputation verdict and the WHOIS+TLS lookup into a single
/// domain risk sub-score. The two adapters are independent and run
/// concurrently; either can fail without suppressing the other's findings.
pub async fn evaluate_domain(
    domain: &str,
    reputation: &ReputationClient,
    domain_intel: &DomainIntelClient,
) -> DomainFinding {
    if is_reputable_platform(domain) {
        log::debug!("Skipping deep dive for reputable platform domain: {domain}");
        return DomainFinding {
            domain: domain.to_string(),
            score: 0,
            report_lines: vec![format!(
                "- Skipped analysis for reputable platform domain: {domain}"
            )],
            is_suspicious: false,
        };
    }

    let (verdict, intel) = tokio::join!(
        reputation.domain_verdict(domain),
        domain_intel.lookup(domain)
    );

    let mut score = 0u32;
    let mut is_suspicious = false;
    let mut report_lines = Vec::new();

    match &verdict {
        ReputationVerdict::Dangerous { .. } => {
            score += 15;
            is_suspicious = true;
        }
        ReputationVerdict::Suspicious { .. } => {
            score += 8;
            is_suspicious = true;
        }
        _ => {}
    }
    report_lines.push(format!("- Reputation: {verdict}"));

    // Young domains score on a two-step ladder; established or unknown
    // ages are reported without scoring.
    if let Some(age) = intel.age_days {
        if age < 30 {
            score += 15;
            is_suspicious = true;
        } else if age < 90 {
            score += 7;
            is_suspicious = true;
        }
    }
    report_lines.push(format!("- Domain Age: {}", intel.age_summary()));
    report_lines.push(format!(
        "- Registrar: {}",
        intel.registrar.as_deref().unwrap_or("Unknown")
    ));
    if let Some(issuer) = &intel.tls_issuer {
        report_lines.push(format!("- TLS Issuer: {issuer}"));
    }
    if let Some(error) = &intel.whois_error {
        report_lines.push(format!("- WHOIS: {error}"));
    }
    if let Some(error) = &intel.tls_error {
        report_lines.push(format!("- TLS: {error}"));
    }

    log::info!("Deep dive for {domain}: score {score}, suspicious: {is_suspicious}");
    DomainFinding {
        domain: domain.to_string(),
        score,
        report_lines,
        is_suspicious,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_clients() -> (ReputationClient, DomainIntelClient) {
        (
            ReputationClient::new(None, 10, true).unwrap(),
            DomainIntelClient::new(10, 5, true),
        )
    }

    #[test]
    fn test_reputable_platform_matching() {
        assert!(is_reputable_platform("gmail.com"));
        assert!(is_reputable_platform("mail.google.com"));
        assert!(is_reputable_platform("GOOGLEAPIS.COM"));
        assert!(!is_reputable_platform("notgoogle.com"));
        assert!(!is_reputable_platform("gmail.com.evil.test"));
    }

    #[tokio::test]
    async fn test_allow_listed_domain_short_circuits() {
        let (reputation, domain_intel) = mock_clients();
        let finding = evaluate_domain("gmail.com", &reputation, &domain_intel).await;
        assert_eq!(finding.score, 0);
        assert!(!finding.is_suspicious);
        assert_eq!(finding.report_lines.len(), 1);
        assert!(finding.report_lines[0].contains("Skipped"));
    }

    #[tokio::test]
    async fn test_dangerous_and_young_sums_to_thirty() {
        let (reputation, domain_intel) = mock_clients();
        let finding = evaluate_domain("newdomain.test", &reputation, &domain_intel).await;
        // DANGEROUS verdict (+15) on a 10-day-old domain (+15).
        assert_eq!(finding.score, 30);
        assert!(finding.is_suspicious);
        assert!(finding
            .report_lines
            .iter()
            .any(|l| l.contains("DANGEROUS (7 vendors flagged as malicious)")));
        assert!(finding.report_lines.iter().any(|l| l.contains("days ago")));
    }

    #[tokio::test]
    async fn test_suspicious_and_middle_aged() {
        let (reputation, domain_intel) = mock_clients();
        let finding = evaluate_domain("suspicious.tk", &reputation, &domain_intel).await;
        // SUSPICIOUS verdict (+8) on a 45-day-old domain (+7).
        assert_eq!(finding.score, 15);
        assert!(finding.is_suspicious);
    }

    #[tokio::test]
    async fn test_clean_established_domain_scores_zero() {
        let (reputation, domain_intel) = mock_clients();
        let finding = evaluate_domain("established.org", &reputation, &domain_intel).await;
        assert_eq!(finding.score, 0);
        assert!(!finding.is_suspicious);
        assert!(finding
            .report_lines
            .iter()
            .any(|l| l.contains("Clean (70 vendors)")));
        assert!(finding
            .report_lines
            .iter()
            .any(|l| l.contains("MarkMonitor Inc.")));
    }

    #[tokio::test]
    async fn test_one_adapter_failing_still_yields_finding() {
        // Unconfigured reputation client answers without scoring; the
        // mocked WHOIS+TLS side still contributes its age sub-score.
        let reputation = ReputationClient::new(None, 10, false).unwrap();
        let domain_intel = DomainIntelClient::new(10, 5, true);
        let finding = evaluate_domain("suspicious.tk", &reputation, &domain_intel).await;
        assert_eq!(finding.score, 7);
        assert!(finding.is_suspicious);
        assert!(finding
            .report_lines
            .iter()
            .any(|l| l.contains("Reputation service not configured.")));
        assert!(finding.report_lines.iter().any(|l| l.contains("Domain Age:")));
    }
}
