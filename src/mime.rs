use crate::extractor::decode_quoted_printable;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use std::collections::HashMap;

/// One node of a MIME part tree. The tree is read-only and short-lived:
/// it exists only to locate the plain and HTML bodies of a raw message.
#[derive(Debug, Clone)]
pub struct MimePart {
    pub mime_type: String,
    pub body: String,
    pub parts: Vec<MimePart>,
}

/// Raw message reduced to the fields the triage engine consumes.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub sender: String,
    pub subject: String,
    pub auth_results: Option<String>,
    pub plain_body: String,
    pub html_body: Option<String>,
}

fn parse_headers(raw: &str) -> (HashMap<String, String>, &str) {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last_key: Option<String> = None;
    let mut body_start = raw.len();

    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            body_start = offset + line.len();
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header line.
            if let Some(key) = &last_key {
                if let Some(value) = headers.get_mut(key) {
                    value.push(' ');
                    value.push_str(trimmed.trim());
                }
            }
        } else if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim().to_lowercase();
            headers.insert(key.clone(), value.trim().to_string());
            last_key = Some(key);
        }
        offset += line.len();
    }

    (headers, &raw[body_start.min(raw.len())..])
}

fn content_boundary(content_type: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)boundary\s*=\s*"?([^";]+)"?"#).unwrap();
    re.captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn mime_type_of(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("text/plain")
        .trim()
        .to_lowercase()
}

fn decode_body(body: &str, transfer_encoding: Option<&str>, mime_type: &str) -> String {
    match transfer_encoding.map(|e| e.trim().to_lowercase()).as_deref() {
        // The content extractor owns quoted-printable decoding for the
        // plain body; decoding it here as well would apply the transform
        // twice and corrupt literal =XX sequences.
        Some("quoted-printable") if mime_type != "text/plain" => decode_quoted_printable(body),
        Some("base64") => {
            let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            match STANDARD.decode(compact.as_bytes()) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => body.to_string(),
            }
        }
        _ => body.to_string(),
    }
}

/// Parse one MIME entity (headers plus body), descending into multipart
/// children.
fn parse_part(raw: &str) -> MimePart {
    let (headers, body) = parse_headers(raw);
    let content_type = headers
        .get("content-type")
        .cloned()
        .unwrap_or_else(|| "text/plain".to_string());
    let mime_type = mime_type_of(&content_type);

    if mime_type.starts_with("multipart/") {
        if let Some(boundary) = content_boundary(&content_type) {
            let delimiter = format!("--{boundary}");
            let closing = format!("--{boundary}--");

            let mut children = Vec::new();
            let mut current: Option<Vec<&str>> = None;
            for line in body.lines() {
                let trimmed = line.trim_end();
                if trimmed == closing {
                    break;
                }
                if trimmed == delimiter {
                    if let Some(segment) = current.take() {
                        children.push(parse_part(&segment.join("\n")));
                    }
                    current = Some(Vec::new());
                } else if let Some(segment) = current.as_mut() {
                    segment.push(line);
                }
                // Lines before the first delimiter are preamble; dropped.
            }
            if let Some(segment) = current.take() {
                if !segment.is_empty() {
                    children.push(parse_part(&segment.join("\n")));
                }
            }

            return MimePart {
                mime_type,
                body: String::new(),
                parts: children,
            };
        }
    }

    let decoded = decode_body(
        body,
        headers.get("content-transfer-encoding").map(|s| s.as_str()),
        &mime_type,
    );
    MimePart {
        mime_type,
        body: decoded,
        parts: Vec::new(),
    }
}

impl MimePart {
    /// Depth-first search for the first leaf of the given type.
    pub fn find_body(&self, mime_type: &str) -> Option<&str> {
        if self.mime_type == mime_type && self.parts.is_empty() && !self.body.trim().is_empty() {
            return Some(&self.body);
        }
        for part in &self.parts {
            if let Some(body) = part.find_body(mime_type) {
                return Some(body);
            }
        }
        None
    }
}

/// Parse a raw RFC 822 message into the shape the engine consumes. Never
/// fails: a degenerate input yields empty bodies, not an error.
pub fn parse_email(raw: &str) -> ParsedEmail {
    let normalized = raw.replace("\r\n", "\n");
    let root = parse_part(&normalized);
    let (headers, _) = parse_headers(&normalized);

    let sender = headers
        .get("from")
        .cloned()
        .unwrap_or_else(|| "Unknown Sender".to_string());
    let subject = headers
        .get("subject")
        .cloned()
        .unwrap_or_else(|| "No Subject".to_string());
    let auth_results = headers.get("authentication-results").cloned();

    let plain_body = root
        .find_body("text/plain")
        .map(|b| b.to_string())
        .unwrap_or_default();
    let html_body = root.find_body("text/html").map(|b| b.to_string());

    // A bare HTML message has no text/plain leaf; keep the HTML and leave
    // the plain body empty rather than inventing one.
    ParsedEmail {
        sender,
        subject,
        auth_results,
        plain_body,
        html_body,
    }
}
