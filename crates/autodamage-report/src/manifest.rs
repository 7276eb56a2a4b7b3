use autodamage_core::Assessment;
use serde::{Deserialize, Serialize};

use crate::{Download, DownloadKind, EmbedFailure, Report};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadRecord {
    pub kind: DownloadKind,
    pub file_name: String,
    pub mime: String,
    pub size: u64,
}

impl From<&Download> for DownloadRecord {
    fn from(d: &Download) -> Self {
        Self { kind: d.kind, file_name: d.file_name.clone(), mime: d.mime.to_string(), size: d.bytes.len() as u64 }
    }
}

/// What one analysis produced, written next to its downloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportManifest {
    pub report_id: String,
    pub reference_id: Option<String>,
    pub created_at_unix: i64,
    pub assessment: Assessment,
    pub attached_images: Vec<String>,

    pub downloads: Vec<DownloadRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embed_failures: Vec<EmbedFailure>,
}

impl ReportManifest {
    pub fn new(report: &Report, downloads: &[Download], embed_failures: &[EmbedFailure]) -> Self {
        Self {
            report_id: report.id.to_string(),
            reference_id: report.reference_id.clone(),
            created_at_unix: report.created_at_unix,
            assessment: report.assessment.clone(),
            attached_images: report.attached_images.iter().map(|i| i.name.clone()).collect(),
            downloads: downloads.iter().map(DownloadRecord::from).collect(),
            embed_failures: embed_failures.to_vec(),
        }
    }
}
