use crate::analyzer::{AnalysisEngine, EmailContent};
use crate::config::Config;
use crate::extractor;
use crate::html_report;
use crate::scoring::Verdict;
use anyhow::{anyhow, Result};

/// Mailbox collaborator boundary. Implementations live outside the core
/// (IMAP, Gmail API, a maildir); the engine only needs these two calls.
pub trait Mailbox {
    fn fetch_inbound(&mut self) -> Result<Option<EmailContent>>;
    fn mark_processed(&mut self, message_id: &str) -> Result<()>;
}

/// Outbound-mail collaborator boundary.
pub trait ReportSender {
    fn send(&mut self, recipient: &str, plain_text: &str, html_text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoMail,
    Sent {
        recipient: String,
        verdict: Verdict,
        score: u32,
    },
}

/// Process at most one inbound submission end to end: fetch, analyze,
/// render, send the report back, mark the message handled. Analysis never
/// fails; fetch and send errors belong to the collaborators and propagate.
pub async fn process_one(
    mailbox: &mut dyn Mailbox,
    sender: &mut dyn ReportSender,
    engine: &AnalysisEngine,
    config: &Config,
) -> Result<Outcome> {
    let email = match mailbox.fetch_inbound()? {
        Some(email) => email,
        None => {
            log::info!("No new submissions to process");
            return Ok(Outcome::NoMail);
        }
    };
    log::info!("Processing submission {} from {}", email.id, email.sender);

    // The report goes to whoever originally received the phish when the
    // forwarded block names them, else to the configured inbox.
    let recipient = extractor::original_recipient(&email.plain_body)
        .or_else(|| config.inbox_address.clone())
        .ok_or_else(|| anyhow!("could not determine any report recipient"))?;

    let result = engine.analyze(&email).await;
    let html = html_report::render_html(&result);
    sender.send(&recipient, &result.report_text, &html)?;

    // Fire-and-forget: a marking failure means the message may be seen
    // again, which is preferable to losing the sent report.
    if let Err(e) = mailbox.mark_processed(&email.id) {
        log::warn!("Failed to mark message {} as processed: {e}", email.id);
    }

    log::info!("Report sent to {recipient}");
    Ok(Outcome::Sent {
        recipient,
        verdict: result.verdict,
        score: result.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMailbox {
        email: Option<EmailContent>,
        marked: Vec<String>,
        fail_mark: bool,
    }

    impl Mailbox for FakeMailbox {
        fn fetch_inbound(&mut self) -> Result<Option<EmailContent>> {
            Ok(self.email.take())
        }

        fn mark_processed(&mut self, message_id: &str) -> Result<()> {
            if self.fail_mark {
                return Err(anyhow!("mailbox unavailable"));
            }
            self.marked.push(message_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSender {
        sent: Vec<(String, String, String)>,
    }

    impl ReportSender for FakeSender {
        fn send(&mut self, recipient: &str, plain_text: &str, html_text: &str) -> Result<()> {
            self.sent.push((
                recipient.to_string(),
                plain_text.to_string(),
                html_text.to_string(),
            ));
            Ok(())
        }
    }

    fn mock_engine_and_config() -> (AnalysisEngine, Config) {
        let config = Config {
            use_mock_data: true,
            inbox_address: Some("triage@phishhound.example".to_string()),
            ..Default::default()
        };
        (AnalysisEngine::new(config.clone()).unwrap(), config)
    }

    fn forwarded_email() -> EmailContent {
        EmailContent {
            id: "msg-42".to_string(),
            sender: "submitter@example.com".to_string(),
            subject: "Fwd: urgent".to_string(),
            plain_body: "---------- Forwarded message ---------\n\
                From: Bad Actor <attacker@newdomain.test>\n\
                Subject: urgent\n\
                To: Victim <victim@example.com>\n\n\
                pay now\n"
                .to_string(),
            html_body: None,
            auth_results: None,
        }
    }

    #[tokio::test]
    async fn test_no_mail() {
        let (engine, config) = mock_engine_and_config();
        let mut mailbox = FakeMailbox {
            email: None,
            marked: Vec::new(),
            fail_mark: false,
        };
        let mut sender = FakeSender::default();
        let outcome = process_one(&mut mailbox, &mut sender, &engine, &config)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::NoMail);
        assert!(sender.sent.is_empty());
    }

    #[tokio::test]
    async fn test_report_goes_to_original_recipient() {
        let (engine, config) = mock_engine_and_config();
        let mut mailbox = FakeMailbox {
            email: Some(forwarded_email()),
            marked: Vec::new(),
            fail_mark: false,
        };
        let mut sender = FakeSender::default();
        let outcome = process_one(&mut mailbox, &mut sender, &engine, &config)
            .await
            .unwrap();

        match outcome {
            Outcome::Sent { recipient, score, .. } => {
                assert_eq!(recipient, "victim@example.com");
                assert_eq!(score, 30);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(mailbox.marked, vec!["msg-42".to_string()]);
        let (_, plain, html) = &sender.sent[0];
        assert!(plain.contains("ABSOLUTELY DANGEROUS"));
        assert!(html.contains("PhishHound Analysis Report"));
    }

    #[tokio::test]
    async fn test_falls_back_to_inbox_address() {
        let (engine, config) = mock_engine_and_config();
        let mut email = forwarded_email();
        email.plain_body = "a direct submission, nothing forwarded".to_string();
        let mut mailbox = FakeMailbox {
            email: Some(email),
            marked: Vec::new(),
            fail_mark: false,
        };
        let mut sender = FakeSender::default();
        let outcome = process_one(&mut mailbox, &mut sender, &engine, &config)
            .await
            .unwrap();
        match outcome {
            Outcome::Sent { recipient, .. } => {
                assert_eq!(recipient, "triage@phishhound.example")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_recipient_anywhere_is_an_error() {
        let (engine, mut config) = mock_engine_and_config();
        config.inbox_address = None;
        let mut email = forwarded_email();
        email.plain_body = "direct submission".to_string();
        let mut mailbox = FakeMailbox {
            email: Some(email),
            marked: Vec::new(),
            fail_mark: false,
        };
        let mut sender = FakeSender::default();
        assert!(process_one(&mut mailbox, &mut sender, &engine, &config)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mark_failure_does_not_lose_the_send() {
        let (engine, config) = mock_engine_and_config();
        let mut mailbox = FakeMailbox {
            email: Some(forwarded_email()),
            marked: Vec::new(),
            fail_mark: true,
        };
        let mut sender = FakeSender::default();
        let outcome = process_one(&mut mailbox, &mut sender, &engine, &config)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Sent { .. }));
        assert_eq!(sender.sent.len(), 1);
    }
}
