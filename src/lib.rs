pub mod analyzer;
pub mod config;
pub mod deep_dive;
pub mod extractor;
pub mod html_report;
pub mod intel;
pub mod mime;
pub mod pipeline;
pub mod report;
pub mod scoring;

pub use analyzer::{AnalysisEngine, AnalysisResult, EmailContent};
pub use config::Config;
pub use pipeline::{Mailbox, Outcome, ReportSender};
pub use scoring::Verdict;
