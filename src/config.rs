use serde::{Deserialize, Serialize};

fn default_submission_tag() -> String {
    "#checkspam".to_string()
}

fn default_whois_timeout() -> u64 {
    10
}

fn default_tls_timeout() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    20
}

fn default_poll_interval() -> u64 {
    10
}

fn default_poll_attempts() -> u32 {
    12
}

fn default_max_url_length() -> usize {
    2000
}

fn default_max_redirects() -> u8 {
    5
}

/// Process-wide configuration, built once at startup and passed by reference
/// into every adapter. Credentials are optional: an adapter with no key
/// reports itself as not configured instead of failing the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reputation service API key (VirusTotal-compatible v3 API).
    pub vt_api_key: Option<String>,
    /// URL sandbox service API key (urlscan.io-compatible API).
    pub urlscan_api_key: Option<String>,
    /// Generative-text synthesis API key. Optional; the deterministic
    /// scoring engine is authoritative either way.
    pub assistant_api_key: Option<String>,
    /// Fallback recipient when the forwarded block carries no To: address.
    pub inbox_address: Option<String>,
    /// Token users put in the subject/body when submitting an email.
    #[serde(default = "default_submission_tag")]
    pub submission_tag: String,
    #[serde(default = "default_whois_timeout")]
    pub whois_timeout_seconds: u64,
    #[serde(default = "default_tls_timeout")]
    pub tls_timeout_seconds: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub sandbox_poll_interval_seconds: u64,
    #[serde(default = "default_poll_attempts")]
    pub sandbox_poll_attempts: u32,
    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u8,
    /// Serve fixture data from every adapter instead of touching the network.
    #[serde(default)]
    pub use_mock_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vt_api_key: None,
            urlscan_api_key: None,
            assistant_api_key: None,
            inbox_address: None,
            submission_tag: default_submission_tag(),
            whois_timeout_seconds: default_whois_timeout(),
            tls_timeout_seconds: default_tls_timeout(),
            http_timeout_seconds: default_http_timeout(),
            sandbox_poll_interval_seconds: default_poll_interval(),
            sandbox_poll_attempts: default_poll_attempts(),
            max_url_length: default_max_url_length(),
            max_redirects: default_max_redirects(),
            use_mock_data: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
