use serde::Deserialize;
use std::time::Duration;

const MODEL_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Structured output the model is asked to produce. The deterministic
/// engine's verdict and score are always authoritative; a successful
/// synthesis contributes its prose summary to the report and nothing else.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Synthesis {
    pub verdict: String,
    pub score: u32,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: reqwest::Client,
    api_key: Option<String>,
    use_mock: bool,
}

impl AssistantClient {
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

    /// Ask the model for an analyst-style executive summary of the
    /// technical sections. Returns `None` when unconfigured, on any
    /// transport error, or when the model's output fails JSON validation -
    /// the caller falls back to the deterministic report unchanged.
    pub async fn synthesize(&self, sections: &[String]) -> Option<Synthesis> {
        let api_key = self.api_key.as_ref()?;

        if self.use_mock {
            return Some(Synthesis {
                verdict: "SUSPICIOUS".to_string(),
                score: 15,
                summary: "Mock analyst summary of the collected evidence.".to_string(),
            });
        }

        let prompt = format!(
            "You are a senior cybersecurity analyst. Write a concise threat \
             intelligence brief based on the technical reports below.\n\n\
             Technical Reports:\n---\n{}\n---\n\n\
             Your response MUST be a valid JSON object: \
             {{\"verdict\": \"SAFE/SUSPICIOUS/DANGEROUS\", \"score\": 0-30, \
             \"summary\": \"executive summary, then the key evidence\"}}",
            sections.join("\n\n")
        );

        let response = self
            .client
            .post(format!("{MODEL_ENDPOINT}?key={api_key}"))
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                log::warn!("Synthesis model returned status {}", response.status());
                return None;
            }
            Err(e) => {
                log::warn!("Synthesis request failed: {e}");
                return None;
            }
        };

        let parsed: ModelResponse = response.json().await.ok()?;
        let text = parsed
            .candidates
            .first()?
            .content
            .parts
            .first()
            .map(|p| p.text.clone())?;

        parse_model_json(&text)
    }
}

/// Validate the model's reply locally; model output is never trusted
/// without parsing. Code fences are tolerated, anything else malformed
/// returns `None`.
fn parse_model_json(text: &str) -> Option<Synthesis> {
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let mut synthesis: Synthesis = serde_json::from_str(cleaned).ok()?;
    if synthesis.summary.trim().is_empty() {
        return None;
    }
    synthesis.score = synthesis.score.min(crate::scoring::MAX_SCORE);
    Some(synthesis)
}
