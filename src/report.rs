use crate::scoring::{Verdict, MAX_SCORE};

/// Separator between report sections. The HTML renderer splits on this
/// exact token, so it is a wire format, not cosmetics.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// One titled, bullet-formatted block of the plain-text report.
#[derive(Debug, Clone)]
pub struct ReportSection {
    pub title: String,
    pub lines: Vec<String>,
}

impl ReportSection {
    pub fn new(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            title: title.into(),
            lines,
        }
    }
}

/// Concatenate the summary block and each investigation section into the
/// final report text.
pub fn assemble(verdict: Verdict, score: u32, sections: &[ReportSection]) -> String {
    let mut blocks = Vec::with_capacity(sections.len() + 1);
    blocks.push(format!(
        "**Analysis Summary**\n- Final Verdict: {verdict}\n- Threat Score: {score}/{MAX_SCORE}"
    ));
    for section in sections {
        blocks.push(format!("**{}**\n{}", section.title, section.lines.join("\n")));
    }
    blocks.join(SECTION_SEPARATOR)
}
