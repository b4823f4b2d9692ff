use crate::config::Config;
use crate::deep_dive;
use crate::extractor;
use crate::intel::assistant::AssistantClient;
use crate::intel::domain_intel::DomainIntelClient;
use crate::intel::ip_intel::IpIntelClient;
use crate::intel::reputation::ReputationClient;
use crate::intel::url_sandbox::{self, UrlSandboxClient, UrlScanFinding};
use crate::report::{self, ReportSection};
use crate::scoring::{self, Verdict};

/// Raw email as delivered by the mailbox collaborator. Immutable input to
/// the pipeline; the engine never mutates it.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: Option<String>,
    pub auth_results: Option<String>,
}

/// Terminal artifact of one analysis run, consumed by the report
/// renderer and the outbound-mail collaborator.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub score: u32,
    pub report_text: String,
}

/// Fixed bonus when the call-to-action link hides behind a known
/// URL-shortening gateway. The indirection itself is the signal,
/// independent of where the link lands.
const SHORTENER_TACTIC_SCORE: u32 = 10;

/// The investigation coordinator. Decides which entities are worth
/// investigating, fans the independent lookups out concurrently, chains
/// the dependent pivot, and always produces a sendable result.
pub struct AnalysisEngine {
    config: Config,
    reputation: ReputationClient,
    domain_intel: DomainIntelClient,
    url_sandbox: UrlSandboxClient,
    ip_intel: IpIntelClient,
    assistant: AssistantClient,
}

impl AnalysisEngine {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let reputation = ReputationClient::new(
            config.vt_api_key.clone(),
            config.http_timeout_seconds,
            config.use_mock_data,
        )?;
        let domain_intel = DomainIntelClient::new(
            config.whois_timeout_seconds,
            config.tls_timeout_seconds,
            config.use_mock_data,
        );
        let url_sandbox = UrlSandboxClient::new(&config)?;
        let ip_intel = IpIntelClient::new(config.vt_api_key.clone(), config.use_mock_data)?;
        let assistant = AssistantClient::new(
            config.assistant_api_key.clone(),
            config.http_timeout_seconds,
            config.use_mock_data,
        )?;

        Ok(Self {
            config,
            reputation,
            domain_intel,
            url_sandbox,
            ip_intel,
            assistant,
        })
    }

    /// Run the full investigation for one email. Infallible by contract:
    /// anything escaping the orchestrator degrades to a mid-range
    /// SUSPICIOUS result with an explanatory report, so the caller always
    /// has something to send back.
    pub async fn analyze(&self, email: &EmailContent) -> AnalysisResult {
        match self.analyze_inner(email).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Analysis pipeline error for email {}: {e}", email.id);
                let sections = vec![ReportSection::new(
                    "Analysis Pipeline Error",
                    vec![
                        format!("- An error occurred during the analysis pipeline: {e}"),
                        "- Please review the email manually.".to_string(),
                    ],
                )];
                let score = 15;
                let verdict = Verdict::Suspicious;
                AnalysisResult {
                    verdict,
                    score,
                    report_text: report::assemble(verdict, score, &sections),
                }
            }
        }
    }

    async fn analyze_inner(&self, email: &EmailContent) -> anyhow::Result<AnalysisResult> {
        let parsed = extractor::parse_content(
            &email.sender,
            &email.plain_body,
            email.html_body.as_deref(),
            &self.config.submission_tag,
        );
        if parsed.is_forwarded {
            log::info!(
                "Analyzing forwarded email, original sender: {}",
                parsed.original_sender.as_deref().unwrap_or("Unknown")
            );
        } else {
            log::info!("Analyzing direct submission from {}", email.sender);
        }

        let sender_domain = parsed
            .original_sender
            .as_deref()
            .filter(|_| parsed.is_forwarded)
            .and_then(sender_domain);

        let candidate_url =
            extractor::extract_call_to_action_url(&parsed.body_text, parsed.body_html.as_deref());

        // The sender deep dive and the URL detonation are independent;
        // run them concurrently and accept either finishing first. The
        // pivot below cannot start until the sandbox has answered.
        let (sender_finding, url_outcome) = tokio::join!(
            async {
                match &sender_domain {
                    Some(domain) => Some(
                        deep_dive::evaluate_domain(domain, &self.reputation, &self.domain_intel)
                            .await,
                    ),
                    None => None,
                }
            },
            async {
                match &candidate_url {
                    Some(url) => Some(self.url_sandbox.scan(url).await),
                    None => None,
                }
            }
        );

        let mut sub_scores: Vec<u32> = Vec::new();
        let mut sections: Vec<ReportSection> = Vec::new();

        if let (Some(domain), Some(finding)) = (&sender_domain, &sender_finding) {
            sub_scores.push(finding.score);
            sections.push(ReportSection::new(
                format!("Sender Domain Analysis ({domain})"),
                finding.report_lines.clone(),
            ));
        }

        match (&candidate_url, &url_outcome) {
            (None, _) | (_, None) => {
                sections.push(ReportSection::new(
                    "Link Extraction",
                    vec!["- No primary link found in the email content.".to_string()],
                ));
            }
            (Some(url), Some(scan)) => {
                let (section, bonus) = self.build_url_section(url, scan).await;
                sub_scores.extend(bonus);
                sections.push(section);

                if let Some(final_domain) = &scan.final_domain {
                    // Investigations are independent per call site: the
                    // landing domain is examined even when it matches the
                    // sender domain checked above.
                    let finding = deep_dive::evaluate_domain(
                        final_domain,
                        &self.reputation,
                        &self.domain_intel,
                    )
                    .await;
                    sub_scores.push(finding.score);
                    sections.push(ReportSection::new(
                        format!("Deep Dive on Final Domain ({final_domain})"),
                        finding.report_lines,
                    ));
                }
            }
        }

        let (score, verdict) = scoring::score_and_verdict(&sub_scores);
        log::info!("Analysis complete: score {score}, verdict {verdict}");

        let section_texts: Vec<String> = sections
            .iter()
            .map(|s| format!("{}\n{}", s.title, s.lines.join("\n")))
            .collect();
        if let Some(synthesis) = self.assistant.synthesize(&section_texts).await {
            sections.insert(
                0,
                ReportSection::new("Analyst Summary", vec![format!("- {}", synthesis.summary)]),
            );
        }

        Ok(AnalysisResult {
            verdict,
            score,
            report_text: report::assemble(verdict, score, &sections),
        })
    }

    /// Render the sandbox outcome into a report section, returning the
    /// indirection-tactic bonus when one applies.
    async fn build_url_section(
        &self,
        url: &str,
        scan: &UrlScanFinding,
    ) -> (ReportSection, Option<u32>) {
        if let Some(error) = &scan.error {
            // Even a failed detonation leaves the vendor verdict on the
            // URL itself worth reporting.
            let verdict = self.reputation.url_verdict(url).await;
            return (
                ReportSection::new(
                    "URL Sandbox Analysis",
                    vec![
                        format!("- Sandbox error: {error}"),
                        format!("- URL Reputation: {verdict}"),
                    ],
                ),
                None,
            );
        }

        let initial_host = url_sandbox::url_host(url).unwrap_or_else(|| "unknown".to_string());
        let mut lines = vec![format!("- Initial URL Host: {initial_host}")];
        lines.push(format!(
            "- URL Reputation: {}",
            self.reputation.url_verdict(url).await
        ));
        let mut bonus = None;

        if let Some(final_domain) = &scan.final_domain {
            lines.push(format!("- Final Landing Domain: {final_domain}"));
            lines.push(format!(
                "- Final IP: {}",
                scan.final_ip.as_deref().unwrap_or("N/A")
            ));
            lines.push(format!(
                "- Page Title: {}",
                scan.page_title.as_deref().unwrap_or("N/A")
            ));
            if let Some(asn) = &scan.final_ip_asn {
                lines.push(format!("- Hosting ASN: {asn}"));
            }
            if let Some(country) = &scan.final_ip_country {
                lines.push(format!("- Hosting Country: {country}"));
            }
            if let Some(server) = &scan.server {
                lines.push(format!("- Server: {server}"));
            }
            if let Some(issuer) = &scan.tls_issuer {
                lines.push(format!("- TLS Issuer: {issuer}"));
            }
            if !scan.contacted_domains.is_empty() {
                lines.push(format!(
                    "- Contacted Domains: {}",
                    scan.contacted_domains.join(", ")
                ));
            }
            if !scan.contacted_ips.is_empty() {
                lines.push(format!("- Contacted IPs: {}", scan.contacted_ips.join(", ")));
            }

            if *final_domain != initial_host.trim_start_matches("www.") {
                lines.push("- PIVOT: URL redirected to a new domain.".to_string());
            }

            if let Some(ip) = &scan.final_ip {
                lines.push(format!("- IP Location: {}", self.ip_intel.geolocate(ip).await));
                lines.push(format!("- {}", self.ip_intel.reverse_ip_report(ip).await));
            }
        } else {
            lines.push("- Sandbox returned no landing page details.".to_string());
        }

        if url_sandbox::is_shortener(url) {
            lines.push(
                "- Indirection tactic: call-to-action link hides behind a URL-shortening gateway."
                    .to_string(),
            );
            bonus = Some(SHORTENER_TACTIC_SCORE);
        }

        (ReportSection::new("URL Sandbox Analysis", lines), bonus)
    }
}

/// Domain part of an address, when it plausibly has one.
fn sender_domain(sender: &str) -> Option<String> {
    let (local, domain) = sender.rsplit_once('@')?;
    let domain = domain.trim().trim_end_matches('>');
    if local.is_empty() || !domain.contains('.') {
        return None;
    }
    Some(domain.to_lowercase())
}
