use crate::config::Config;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const SUBMIT_ENDPOINT: &str = "https://urlscan.io/api/v1/scan/";

/// Outcome of one sandboxed detonation. Exactly one finding per
/// investigated URL per run; a failure fills `error` and nothing else.
#[derive(Debug, Clone, Default)]
pub struct UrlScanFinding {
    pub final_url: Option<String>,
    pub final_domain: Option<String>,
    pub final_ip: Option<String>,
    pub final_ip_country: Option<String>,
    pub final_ip_asn: Option<String>,
    pub page_title: Option<String>,
    pub server: Option<String>,
    pub tls_issuer: Option<String>,
    pub contacted_domains: Vec<String>,
    pub contacted_ips: Vec<String>,
    pub error: Option<String>,
}

impl UrlScanFinding {
    fn from_error(message: impl Into<String>) -> Self {
        UrlScanFinding {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    api: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScanResult {
    page: Option<PageData>,
    task: Option<TaskData>,
    lists: Option<ListsData>,
}

#[derive(Debug, Default, Deserialize)]
struct PageData {
    url: Option<String>,
    domain: Option<String>,
    ip: Option<String>,
    country: Option<String>,
    asnname: Option<String>,
    server: Option<String>,
    #[serde(rename = "tlsIssuer")]
    tls_issuer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskData {
    #[serde(rename = "pageTitle")]
    page_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListsData {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    ips: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UrlSandboxClient {
    client: reqwest::Client,
    api_key: Option<String>,
    poll_interval: Duration,
    poll_attempts: u32,
    max_url_length: usize,
    max_redirects: u8,
    use_mock: bool,
}

impl UrlSandboxClient {
    pub fn new(config: &Config) -> Result<Self> {
        // Redirects are followed by hand so the chain can be bounded and
        // the true final URL submitted instead of a pure redirector.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .user_agent(concat!("phishhound/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            api_key: config.urlscan_api_key.clone(),
            poll_interval: Duration::from_secs(config.sandbox_poll_interval_seconds),
            poll_attempts: config.sandbox_poll_attempts,
            max_url_length: config.max_url_length,
            max_redirects: config.max_redirects,
            use_mock: config.use_mock_data,
        })
    }

    /// Detonate a URL in the sandbox and wait for the verdict. Never fails;
    /// all failure modes land in `UrlScanFinding::error`.
    pub async fn scan(&self, url: &str) -> UrlScanFinding {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => {
                return UrlScanFinding::from_error(format!(
                    "Refusing to scan non-HTTP scheme: {}",
                    parsed.scheme()
                ))
            }
            Err(e) => return UrlScanFinding::from_error(format!("Unparseable URL: {e}")),
        }
        if url.len() > self.max_url_length {
            return UrlScanFinding::from_error("URL is too long for the sandbox API.");
        }

        if self.use_mock {
            return self.mock_scan(url);
        }

        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => return UrlScanFinding::from_error("URL sandbox service not configured."),
        };

        // Chase redirects cheaply first; a shortener link gets scanned at
        // its destination instead of burning the scan on the gateway.
        let resolved = match self.resolve_redirects(url).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::debug!("Redirect resolution failed for {url}: {e}");
                url.to_string()
            }
        };

        log::info!("Submitting URL for sandbox analysis: {resolved}");
        let submit = self
            .client
            .post(SUBMIT_ENDPOINT)
            .header("API-Key", api_key.as_str())
            .json(&serde_json::json!({ "url": resolved, "visibility": "private" }))
            .send()
            .await;

        let submit = match submit {
            Ok(response) => response,
            Err(e) => return UrlScanFinding::from_error(format!("Sandbox API error: {e}")),
        };
        if !submit.status().is_success() {
            let message = submit
                .json::<SubmitResponse>()
                .await
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            return UrlScanFinding::from_error(format!("Sandbox submission failed: {message}"));
        }

        let handle = match submit.json::<SubmitResponse>().await {
            Ok(SubmitResponse { api: Some(api), .. }) => api,
            Ok(SubmitResponse { message, .. }) => {
                return UrlScanFinding::from_error(format!(
                    "Sandbox submission failed: {}",
                    message.unwrap_or_else(|| "Could not get result URL".to_string())
                ))
            }
            Err(e) => {
                return UrlScanFinding::from_error(format!(
                    "Sandbox submission returned malformed JSON: {e}"
                ))
            }
        };

        self.poll_for_result(&handle, &api_key).await
    }

    /// Poll the result handle at a fixed interval up to the attempt
    /// ceiling. Repeated not-ready answers keep polling; anything else is
    /// terminal. The remote scan itself is never cancelled.
    async fn poll_for_result(&self, handle: &str, api_key: &str) -> UrlScanFinding {
        for attempt in 1..=self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            log::debug!("Checking sandbox results (attempt {attempt}/{})", self.poll_attempts);

            let response = match self
                .client
                .get(handle)
                .header("API-Key", api_key)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => return UrlScanFinding::from_error(format!("Sandbox API error: {e}")),
            };

            match response.status().as_u16() {
                200 => {
                    let scan: ScanResult = match response.json().await {
                        Ok(scan) => scan,
                        Err(e) => {
                            return UrlScanFinding::from_error(format!(
                                "Sandbox result was malformed JSON: {e}"
                            ))
                        }
                    };
                    log::info!("Sandbox results received");
                    let page = scan.page.unwrap_or_default();
                    let task = scan.task.unwrap_or_default();
                    let lists = scan.lists.unwrap_or_default();
                    return UrlScanFinding {
                        final_url: page.url,
                        final_domain: page.domain,
                        final_ip: page.ip,
                        final_ip_country: page.country,
                        final_ip_asn: page.asnname,
                        page_title: task.page_title,
                        server: page.server,
                        tls_issuer: page.tls_issuer,
                        contacted_domains: lists.domains,
                        contacted_ips: lists.ips,
                        error: None,
                    };
                }
                404 => continue,
                status => {
                    return UrlScanFinding::from_error(format!(
                        "Error fetching sandbox results. Status: {status}"
                    ))
                }
            }
        }

        UrlScanFinding::from_error(format!(
            "Sandbox scan timed out after {} polling attempts.",
            self.poll_attempts
        ))
    }

    /// Follow redirects with HEAD requests, bounded by the redirect cap.
    /// Content is never fetched or executed here.
    pub async fn resolve_redirects(&self, url: &str) -> Result<String> {
        let mut current_url = url.to_string();
        let mut redirect_count = 0u8;

        while redirect_count < self.max_redirects {
            let response = self.client.head(&current_url).send().await?;

            if response.status().is_redirection() {
                if let Some(location) = response.headers().get("location") {
                    let location = location.to_str()?;
                    current_url = if location.starts_with("http") {
                        location.to_string()
                    } else {
                        // Relative Location resolves against the current URL.
                        let base = Url::parse(&current_url)?;
                        base.join(location)?.to_string()
                    };
                    redirect_count += 1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(current_url)
    }

    fn mock_scan(&self, url: &str) -> UrlScanFinding {
        if url.contains("unreachable") {
            return UrlScanFinding::from_error(format!(
                "Sandbox scan timed out after {} polling attempts.",
                self.poll_attempts
            ));
        }

        if is_shortener(url) || url.contains("redirector") {
            return UrlScanFinding {
                final_url: Some("https://malicious-landing.example/login".to_string()),
                final_domain: Some("malicious-landing.example".to_string()),
                final_ip: Some("203.0.113.66".to_string()),
                final_ip_country: Some("NL".to_string()),
                final_ip_asn: Some("AS64500 EXAMPLE-HOSTING".to_string()),
                page_title: Some("Account Login".to_string()),
                server: Some("nginx".to_string()),
                tls_issuer: Some("Let's Encrypt".to_string()),
                contacted_domains: vec!["malicious-landing.example".to_string()],
                contacted_ips: vec!["203.0.113.66".to_string()],
                error: None,
            };
        }

        let host = url_host(url).unwrap_or_else(|| "unknown.invalid".to_string());
        UrlScanFinding {
            final_url: Some(url.to_string()),
            final_domain: Some(host.trim_start_matches("www.").to_string()),
            final_ip: Some("203.0.113.10".to_string()),
            final_ip_country: Some("US".to_string()),
            final_ip_asn: Some("AS64501 EXAMPLE-CDN".to_string()),
            page_title: Some("Example Domain".to_string()),
            server: Some("ECS".to_string()),
            tls_issuer: Some("DigiCert Inc".to_string()),
            contacted_domains: Vec::new(),
            contacted_ips: Vec::new(),
            error: None,
        }
    }
}

/// Known URL-shortening gateways, including the ones large platforms run.
/// A call-to-action link behind one of these is an indirection tactic.
pub fn is_shortener(url: &str) -> bool {
    let shorteners = [
        "bit.ly",
        "tinyurl.com",
        "t.co",
        "goo.gl",
        "ow.ly",
        "lnkd.in",
        "short.link",
        "is.gd",
        "v.gd",
        "tiny.cc",
        "rb.gy",
        "cutt.ly",
        "shorturl.at",
        "u.to",
    ];

    if let Some(host) = url_host(url) {
        return shorteners.iter().any(|s| host == *s || host.ends_with(&format!(".{s}")));
    }
    false
}

/// Lower-cased host of a URL, if it parses.
pub fn url_host(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|h| h.to_lowercase())
}
