use autodamage_core::format_utc;

use crate::Report;

pub const TEXT_TITLE: &str = "AUTODAMAGE AI REPORT";

/// Plain-text report: banner, optional reference and timestamp, then the
/// assessment lines in fixed order.
pub fn render_text(report: &Report) -> String {
    let mut s = String::new();
    s.push_str(TEXT_TITLE);
    s.push('\n');
    s.push_str(&"=".repeat(TEXT_TITLE.len()));
    s.push('\n');
    if let Some(reference) = &report.reference_id {
        s.push_str(&format!("- Claim Reference: {}\n", reference));
    }
    s.push_str(&format!("- Generated: {}\n", format_utc(report.created_at_unix)));
    for (label, value) in report.fields() {
        s.push_str(&format!("- {}: {}\n", label, value));
    }
    s
}

/// Read a field back out of a rendered text report.
pub fn text_field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let prefix = format!("- {}: ", label);
    text.lines().find_map(|line| line.trim().strip_prefix(prefix.as_str()))
}
