use serde::Deserialize;
use std::time::Duration;

const GEO_TIMEOUT_SECONDS: u64 = 5;
const MAX_LISTED_RESOLUTIONS: usize = 5;

/// Report enrichment around an IP address: keyless geolocation plus
/// vendor reverse-IP resolutions. Neither contributes to the score.
#[derive(Debug, Clone)]
pub struct IpIntelClient {
    client: reqwest::Client,
    vt_api_key: Option<String>,
    use_mock: bool,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    isp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolutionsResponse {
    #[serde(default)]
    data: Vec<Resolution>,
}

#[derive(Debug, Deserialize)]
struct Resolution {
    attributes: ResolutionAttributes,
}

#[derive(Debug, Deserialize)]
struct ResolutionAttributes {
    host_name: String,
}

impl IpIntelClient {
    pub fn new(vt_api_key: Option<String>, use_mock: bool) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GEO_TIMEOUT_SECONDS))
            .user_agent(concat!("phishhound/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            vt_api_key,
            use_mock,
        })
    }

    /// One-line location summary for an IP, or a failure note.
    pub async fn geolocate(&self, ip: &str) -> String {
        if ip.is_empty() {
            return "No IP address provided.".to_string();
        }
        if self.use_mock {
            return mock_geolocation(ip);
        }

        let endpoint = format!(
            "http://ip-api.com/json/{ip}?fields=status,message,country,regionName,city,isp,org,query"
        );
        let response = match self.client.get(&endpoint).send().await {
            Ok(response) => response,
            Err(e) => return format!("Geolocation request error: {e}"),
        };
        let geo: GeoResponse = match response.json().await {
            Ok(geo) => geo,
            Err(e) => return format!("Geolocation returned malformed JSON: {e}"),
        };

        if geo.status != "success" {
            return format!(
                "Geolocation failed: {}",
                geo.message.unwrap_or_else(|| "API returned a failure status.".to_string())
            );
        }
        let place = [geo.city, geo.region_name, geo.country]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        match geo.isp {
            Some(isp) => format!("{place} (ISP: {isp})"),
            None => place,
        }
    }

    /// Names of other domains recently resolving to the same IP. Shared
    /// hosting with known phishing kit domains shows up here.
    pub async fn reverse_ip_report(&self, ip: &str) -> String {
        if ip.is_empty() {
            return "No IP address to investigate.".to_string();
        }
        if self.use_mock {
            return mock_reverse_ip(ip);
        }
        let api_key = match &self.vt_api_key {
            Some(key) => key,
            None => return "Reverse IP lookup not configured.".to_string(),
        };

        let endpoint = format!("https://www.virustotal.com/api/v3/ip_addresses/{ip}/resolutions");
        let response = match self
            .client
            .get(&endpoint)
            .header("x-apikey", api_key.as_str())
            .send()
            .await
        {
            Ok(response) => response,
            Err(_) => return "Reverse IP lookup failed: API error or rate limit exceeded.".to_string(),
        };
        if !response.status().is_success() {
            return format!(
                "Reverse IP lookup failed: API returned status {}.",
                response.status().as_u16()
            );
        }
        let resolutions: ResolutionsResponse = match response.json().await {
            Ok(resolutions) => resolutions,
            Err(_) => return "Reverse IP lookup failed: malformed response.".to_string(),
        };

        format_resolutions(
            resolutions
                .data
                .iter()
                .map(|r| r.attributes.host_name.clone())
                .collect(),
        )
    }
}

fn format_resolutions(hosts: Vec<String>) -> String {
    if hosts.is_empty() {
        return "No other domains found hosted on this IP.".to_string();
    }
    let mut report = String::from("Other domains recently seen on this IP: ");
    report.push_str(
        &hosts
            .iter()
            .take(MAX_LISTED_RESOLUTIONS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    );
    if hosts.len() > MAX_LISTED_RESOLUTIONS {
        report.push_str(&format!(" ...and {} more", hosts.len() - MAX_LISTED_RESOLUTIONS));
    }
    report
}

fn mock_geolocation(ip: &str) -> String {
    if ip.starts_with("203.0.113.66") {
        "Amsterdam, North Holland, NL (ISP: Example Hosting BV)".to_string()
    } else {
        "Ashburn, Virginia, US (ISP: Example CDN LLC)".to_string()
    }
}

fn mock_reverse_ip(ip: &str) -> String {
    if ip.starts_with("203.0.113.66") {
        format_resolutions(vec![
            "malicious-landing.example".to_string(),
            "phish-kit.example".to_string(),
        ])
    } else {
        format_resolutions(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_resolutions_overflow() {
        let hosts: Vec<String> = (0..8).map(|i| format!("host{i}.example")).collect();
        let report = format_resolutions(hosts);
        assert!(report.contains("host0.example"));
        assert!(report.contains("host4.example"));
        assert!(!report.contains("host5.example"));
        assert!(report.contains("...and 3 more"));
    }

    #[test]
    fn test_format_resolutions_empty() {
        assert_eq!(
            format_resolutions(Vec::new()),
            "No other domains found hosted on this IP."
        );
    }

    #[tokio::test]
    async fn test_mock_lookups() {
        let client = IpIntelClient::new(None, true).unwrap();
        assert!(client.geolocate("203.0.113.66").await.contains("Amsterdam"));
        assert!(client
            .reverse_ip_report("203.0.113.66")
            .await
            .contains("phish-kit.example"));
        assert!(client
            .reverse_ip_report("203.0.113.10")
            .await
            .contains("No other domains"));
    }

    #[tokio::test]
    async fn test_unconfigured_reverse_ip() {
        let client = IpIntelClient::new(None, false).unwrap();
        assert_eq!(
            client.reverse_ip_report("198.51.100.7").await,
            "Reverse IP lookup not configured.".to_string()
        );
    }

    #[tokio::test]
    async fn test_empty_ip() {
        let client = IpIntelClient::new(None, true).unwrap();
        assert_eq!(client.geolocate("").await, "No IP address provided.");
    }
}
