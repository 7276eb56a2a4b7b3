use serde::{Deserialize, Serialize};

use crate::Report;

pub const TEXT_FILE_NAME: &str = "damage_report.txt";
pub const PLOT_FILE_NAME: &str = "detections.png";

pub const MIME_TEXT: &str = "text/plain; charset=utf-8";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_PNG: &str = "image/png";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    Text,
    Document,
    Visualization,
}

/// A file offered back to the user, with the MIME type it is served under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub kind: DownloadKind,
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn text(text: String) -> Self {
        Self { kind: DownloadKind::Text, file_name: TEXT_FILE_NAME.to_string(), mime: MIME_TEXT, bytes: text.into_bytes() }
    }

    pub fn document(report: &Report, bytes: Vec<u8>) -> Self {
        Self { kind: DownloadKind::Document, file_name: document_file_name(report), mime: MIME_PDF, bytes }
    }

    pub fn visualization(png: Vec<u8>) -> Self {
        Self { kind: DownloadKind::Visualization, file_name: PLOT_FILE_NAME.to_string(), mime: MIME_PNG, bytes: png }
    }
}

/// `CAI_<reference>.pdf`, falling back to the report id when no claim
/// reference was set.
pub fn document_file_name(report: &Report) -> String {
    match &report.reference_id {
        Some(reference) => format!("CAI_{}.pdf", reference),
        None => format!("CAI_{}.pdf", report.id),
    }
}
