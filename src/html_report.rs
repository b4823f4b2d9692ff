use crate::analyzer::AnalysisResult;
use crate::report::SECTION_SEPARATOR;
use crate::scoring::{Verdict, MAX_SCORE};
use chrono::Utc;

fn verdict_color(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::AbsolutelyDangerous => "#dc3545",
        Verdict::VerySuspicious | Verdict::Suspicious => "#ffc107",
        Verdict::BeCareful => "#17a2b8",
        Verdict::Safe => "#28a745",
    }
}

/// Render the plain-text report into the HTML email sent back to the
/// submitter. Consumes the assembler's section-separator format: the
/// first block is the summary (re-rendered as the banner), every later
/// block is a title line followed by bullet lines.
pub fn render_html(result: &AnalysisResult) -> String {
    let mut sections = result.report_text.split(SECTION_SEPARATOR);
    sections.next(); // summary block becomes the banner instead

    let formatted_sections: String = sections
        .map(|section| {
            let mut lines = section.lines();
            let title = lines.next().unwrap_or("").replace('*', "");
            let items: String = lines
                .map(|line| format!("<li>{}</li>", line.trim_start_matches("- ")))
                .collect();
            format!("<div class=\"section\"><h3>{title}</h3><ul>{items}</ul></div>")
        })
        .collect();

    let color = verdict_color(result.verdict);
    let verdict = result.verdict;
    let score = result.score;
    let timestamp = Utc::now().to_rfc2822();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<style>
    body {{ font-family: -apple-system, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif; margin: 0; padding: 20px; background-color: #f4f7f6; }}
    .container {{ max-width: 600px; margin: auto; background: #ffffff; border: 1px solid #e0e0e0; border-radius: 8px; overflow: hidden; }}
    .header {{ background-color: #343a40; color: #ffffff; padding: 20px; text-align: center; }}
    .header h1 {{ margin: 0; font-size: 24px; }}
    .verdict-banner {{ background-color: {color}; color: #ffffff; padding: 15px 20px; text-align: center; }}
    .verdict-banner h2 {{ margin: 0; font-size: 20px; }}
    .verdict-banner p {{ margin: 5px 0 0; font-size: 16px; }}
    .content {{ padding: 20px; }}
    .section {{ margin-bottom: 20px; }}
    .section h3 {{ font-size: 18px; color: #333; border-bottom: 2px solid #eee; padding-bottom: 5px; margin-top: 0; }}
    .section ul {{ list-style-type: none; padding-left: 0; }}
    .section li {{ background-color: #f8f9fa; padding: 10px; border-radius: 4px; margin-bottom: 5px; }}
    .footer {{ background-color: #f4f7f6; color: #777; padding: 15px; text-align: center; font-size: 12px; }}
</style>
</head>
<body>
    <div class="container">
        <div class="header"><h1>PhishHound Analysis Report</h1></div>
        <div class="verdict-banner">
            <h2>{verdict}</h2>
            <p>Threat Score: {score}/{MAX_SCORE}</p>
        </div>
        <div class="content">
            {formatted_sections}
        </div>
        <div class="footer">
            <p>Analysis completed at {timestamp}</p>
        </div>
    </div>
</body>
</html>
"#
    )
}
