use regex::Regex;

/// Marker line Gmail-style clients insert above inlined forwards. Matched
/// case-insensitively; the exact matched text is reused to slice the HTML
/// body at the same boundary.
const FORWARD_MARKER: &str = r"(?i)-{10} Forwarded message -{9}";

/// Normalized view of an inbound submission after forward detection and
/// decoding. When `is_forwarded` is true, `original_sender` and
/// `original_subject` are always present ("Unknown" sentinel, never empty)
/// and `body_text` holds only the content after the forwarded-message marker.
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub is_forwarded: bool,
    pub original_sender: Option<String>,
    pub original_subject: Option<String>,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// Reverse quoted-printable transfer encoding: drop `=\r\n` / `=\n` soft
/// line breaks and decode `=XX` hex escapes. Best effort - escapes that do
/// not parse pass through unchanged, and the function never fails.
pub fn decode_quoted_printable(text: &str) -> String {
    let unfolded = text.replace("=\r\n", "").replace("=\n", "");

    let mut out = String::with_capacity(unfolded.len());
    let mut chars = unfolded.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c == '=' {
            let hex = unfolded.get(idx + 1..idx + 3);
            if let Some(hex) = hex {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte as char);
                    chars.next();
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Locate and unwrap a forwarded-message block. Returns `None` when the
/// marker is absent, in which case the email is treated as a direct
/// submission by the caller.
pub fn parse_forwarded_email(plain: &str, html: Option<&str>) -> Option<ParsedContent> {
    let marker = Regex::new(FORWARD_MARKER).unwrap();
    let m = marker.find(plain)?;
    let forwarded = &plain[m.start()..];

    let from_re = Regex::new(r"(?i)From:.*?<([^>]+)>").unwrap();
    let subject_re = Regex::new(r"(?i)Subject: (.*)").unwrap();

    let original_sender = from_re
        .captures(forwarded)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let original_subject = subject_re
        .captures(forwarded)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    // The forwarded headers end at the first blank line; everything after it
    // is the original message body. Without a blank line the whole block is
    // carried forward.
    let body_text = match forwarded.find("\n\n") {
        Some(pos) => forwarded[pos + 2..].to_string(),
        None => forwarded.to_string(),
    };

    // Slice the HTML at the same marker text so anchor extraction does not
    // pick up links from the submitter's own wrapper.
    let body_html = html.and_then(|h| {
        let matched = m.as_str();
        h.find(matched).map(|pos| h[pos..].to_string())
    });

    Some(ParsedContent {
        is_forwarded: true,
        original_sender: Some(original_sender),
        original_subject: Some(original_subject),
        body_text,
        body_html,
    })
}

/// Strip signature blocks and submission artifacts from a direct submission:
/// a `--` or "Sent from my" cue through end of text, literal occurrences of
/// the submitter's address, and the submission tag.
pub fn strip_signature(body: &str, sender: &str, tag: &str) -> String {
    let mut alternatives = vec![r"(--|Sent from my).*$".to_string()];
    for literal in [sender, tag] {
        if !literal.is_empty() {
            alternatives.push(regex::escape(literal));
        }
    }
    let pattern = format!("(?is){}", alternatives.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(body, "").trim().to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Full extraction for one submission: unwrap a forward when the marker is
/// present, otherwise decode and de-noise the direct submission.
pub fn parse_content(sender: &str, plain: &str, html: Option<&str>, tag: &str) -> ParsedContent {
    if let Some(mut parsed) = parse_forwarded_email(plain, html) {
        parsed.body_text = decode_quoted_printable(&parsed.body_text);
        return parsed;
    }

    let decoded = decode_quoted_printable(plain);
    ParsedContent {
        is_forwarded: false,
        original_sender: None,
        original_subject: None,
        body_text: strip_signature(&decoded, sender, tag),
        body_html: html.map(|h| h.to_string()),
    }
}

fn is_unsubscribe_link(href: &str, text: &str) -> bool {
    let haystack = format!("{} {}", href.to_lowercase(), text.to_lowercase());
    ["unsubscribe", "preference", "opt-out", "optout"]
        .iter()
        .any(|w| haystack.contains(w))
}

/// Pick the single URL most likely to be the email's call to action.
///
/// HTML anchors are preferred: the first link whose visible text matches the
/// call-to-action vocabulary wins; failing that, the longest surviving href.
/// Plain-text `http(s)://` tokens are the fallback. The returned value
/// always starts with `http`.
pub fn extract_call_to_action_url(plain: &str, html: Option<&str>) -> Option<String> {
    let anchor_re =
        Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    let tag_re = Regex::new(r"<[^>]+>").unwrap();
    let cta_re =
        Regex::new(r"(?i)(verif|continue|view|access|log\s*in|confirm|validat|button)").unwrap();

    if let Some(html) = html {
        let mut candidates: Vec<(String, String)> = Vec::new();
        for cap in anchor_re.captures_iter(html) {
            let href = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if !href.starts_with("http") {
                continue;
            }
            let text = tag_re.replace_all(cap.get(2).map(|m| m.as_str()).unwrap_or_default(), " ");
            let text = text.trim().to_string();
            if is_unsubscribe_link(href, &text) {
                continue;
            }
            candidates.push((href.to_string(), text));
        }

        // First call-to-action match wins, in order of appearance.
        for (href, text) in &candidates {
            if cta_re.is_match(text) {
                return Some(href.clone());
            }
        }

        // Otherwise the longest href; strict > keeps the earliest maximal.
        let mut best: Option<&str> = None;
        for (href, _) in &candidates {
            if best.map_or(true, |b| href.len() > b.len()) {
                best = Some(href.as_str());
            }
        }
        if let Some(best) = best {
            return Some(best.to_string());
        }
    }

    let token_re = Regex::new(r#"https?://[^\s<>"']+"#).unwrap();
    let mut best: Option<&str> = None;
    for m in token_re.find_iter(plain) {
        if best.map_or(true, |b| m.as_str().len() > b.len()) {
            best = Some(m.as_str());
        }
    }
    best.map(|b| b.to_string())
}

/// Address of the person the forwarded email was originally delivered to,
/// taken from the `To:` line inside the forwarded block. The triage report
/// goes back to this address when present.
pub fn original_recipient(plain: &str) -> Option<String> {
    let marker = Regex::new(FORWARD_MARKER).unwrap();
    let m = marker.find(plain)?;
    let to_re = Regex::new(r"(?i)To:.*?<([^>]+)>").unwrap();
    to_re
        .captures(&plain[m.start()..])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARDED: &str = "FYI, this looks off\n\n\
        ---------- Forwarded message ---------\n\
        From: Payroll Team <payroll@newdomain.test>\n\
        Date: Mon, 3 Aug 2026 09:12:00\n\
        Subject: Action required: verify your account\n\
        To: Jane Doe <jane@example.com>\n\n\
        Your account has been locked. Visit http://newdomain.test/verify now.\n";

    #[test]
    fn test_forwarded_marker_detected() {
        let parsed = parse_forwarded_email(FORWARDED, None).unwrap();
        assert!(parsed.is_forwarded);
        assert_eq!(parsed.original_sender.as_deref(), Some("payroll@newdomain.test"));
        assert_eq!(
            parsed.original_subject.as_deref(),
            Some("Action required: verify your account")
        );
        // Only content after the first blank line following the marker.
        assert!(parsed.body_text.starts_with("Your account has been locked"));
        assert!(!parsed.body_text.contains("Forwarded message"));
        assert!(!parsed.body_text.contains("FYI"));
    }

    #[test]
    fn test_no_marker_returns_none() {
        assert!(parse_forwarded_email("just a normal email body", None).is_none());
        assert!(parse_forwarded_email("", None).is_none());
    }

    #[test]
    fn test_forwarded_fallbacks_to_unknown() {
        let body = "---------- Forwarded message ---------\nno headers here";
        let parsed = parse_forwarded_email(body, None).unwrap();
        assert_eq!(parsed.original_sender.as_deref(), Some("Unknown"));
        assert_eq!(parsed.original_subject.as_deref(), Some("Unknown"));
        // No blank line: the whole forwarded block is the body.
        assert!(parsed.body_text.contains("no headers here"));
    }

    #[test]
    fn test_forwarded_html_sliced_at_marker() {
        let html = "<p>wrapper <a href=\"http://wrapper.test\">x</a></p>\
            ---------- Forwarded message ---------\
            <a href=\"http://inner.test/verify\">Verify</a>";
        let parsed = parse_forwarded_email(FORWARDED, Some(html)).unwrap();
        let sliced = parsed.body_html.unwrap();
        assert!(sliced.starts_with("---------- Forwarded message ---------"));
        assert!(!sliced.contains("wrapper.test"));
    }

    #[test]
    fn test_decode_quoted_printable() {
        assert_eq!(decode_quoted_printable("a=\r\nb"), "ab");
        assert_eq!(decode_quoted_printable("a=\nb"), "ab");
        assert_eq!(decode_quoted_printable("caf=E9"), "caf\u{e9}");
        assert_eq!(decode_quoted_printable("100=25 sure"), "100% sure");
        // Invalid escapes pass through unchanged.
        assert_eq!(decode_quoted_printable("a=ZZb"), "a=ZZb");
        assert_eq!(decode_quoted_printable("trailing="), "trailing=");
    }

    #[test]
    fn test_strip_signature() {
        let body = "Please check this email #checkspam\n\nthanks\n--\nJoe User\njoe@example.com";
        let cleaned = strip_signature(body, "joe@example.com", "#checkspam");
        assert!(cleaned.contains("Please check this email"));
        assert!(!cleaned.contains("#checkspam"));
        assert!(!cleaned.contains("joe@example.com"));
        assert!(!cleaned.contains("Joe User"));
    }

    #[test]
    fn test_strip_signature_sent_from_my() {
        let cleaned = strip_signature(
            "look at this\n\nSent from my iPhone",
            "user@example.com",
            "#checkspam",
        );
        assert_eq!(cleaned, "look at this");
    }

    #[test]
    fn test_cta_vocabulary_wins_over_length() {
        let html = r#"
            <a href="http://long.example/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa">Read newsletter</a>
            <a href="http://evil.example/v">Verify your account</a>
        "#;
        assert_eq!(
            extract_call_to_action_url("", Some(html)).as_deref(),
            Some("http://evil.example/v")
        );
    }

    #[test]
    fn test_first_cta_match_wins() {
        let html = r#"
            <a href="http://first.example/login">Login here</a>
            <a href="http://second.example/confirm">Confirm now</a>
        "#;
        assert_eq!(
            extract_call_to_action_url("", Some(html)).as_deref(),
            Some("http://first.example/login")
        );
    }

    #[test]
    fn test_unsubscribe_links_discarded() {
        let html = r#"
            <a href="http://news.example/unsubscribe">Unsubscribe</a>
            <a href="http://news.example/preferences/mail">Email preferences</a>
            <a href="http://news.example/story">Today's story</a>
        "#;
        assert_eq!(
            extract_call_to_action_url("", Some(html)).as_deref(),
            Some("http://news.example/story")
        );
    }

    #[test]
    fn test_longest_href_tie_break_keeps_first() {
        let html = r#"
            <a href="http://a.example/12345">one</a>
            <a href="http://b.example/12345">two</a>
        "#;
        assert_eq!(
            extract_call_to_action_url("", Some(html)).as_deref(),
            Some("http://a.example/12345")
        );
    }

    #[test]
    fn test_non_http_hrefs_discarded() {
        let html = r#"<a href="mailto:x@y.z">mail</a> <a href="javascript:void(0)">click</a>"#;
        assert_eq!(extract_call_to_action_url("", Some(html)), None);
    }

    #[test]
    fn test_plain_text_fallback_longest() {
        let plain = "see http://a.test/x and https://b.test/a/much/longer/path here";
        assert_eq!(
            extract_call_to_action_url(plain, None).as_deref(),
            Some("https://b.test/a/much/longer/path")
        );
    }

    #[test]
    fn test_no_url_anywhere() {
        assert_eq!(extract_call_to_action_url("nothing to see", None), None);
        assert_eq!(extract_call_to_action_url("", Some("<p>no links</p>")), None);
    }

    #[test]
    fn test_result_always_starts_with_http() {
        let samples = [
            ("ftp://files.example/pub", None),
            ("visit http://ok.example", None),
            ("", Some(r#"<a href="HTTP://odd.example">view</a>"#)),
        ];
        for (plain, html) in samples {
            if let Some(url) = extract_call_to_action_url(plain, html) {
                assert!(url.to_lowercase().starts_with("http"), "got {url}");
            }
        }
    }

    #[test]
    fn test_original_recipient() {
        assert_eq!(
            original_recipient(FORWARDED).as_deref(),
            Some("jane@example.com")
        );
        assert_eq!(original_recipient("no forward here"), None);
    }

    #[test]
    fn test_parse_content_direct_submission() {
        let parsed = parse_content(
            "joe@example.com",
            "check this out #checkspam\nhttp://odd.example/page",
            None,
            "#checkspam",
        );
        assert!(!parsed.is_forwarded);
        assert!(parsed.original_sender.is_none());
        assert!(parsed.body_text.contains("http://odd.example/page"));
        assert!(!parsed.body_text.contains("#checkspam"));
    }

    #[test]
    fn test_parse_content_forwarded_decodes_qp() {
        let body = "---------- Forwarded message ---------\n\
            From: A <a@b.test>\nSubject: hi\n\n\
            Click=20here: http://x.test/p=\nath";
        let parsed = parse_content("user@example.com", body, None, "#checkspam");
        assert!(parsed.is_forwarded);
        assert!(parsed.body_text.contains("Click here"));
        assert!(parsed.body_text.contains("http://x.test/path"));
    }
}
