use autodamage_core::{format_cost, now_unix, Assessment, ReportId, SeverityScale};
use serde::{Deserialize, Serialize};

/// At most this many attached images are rendered into the document.
pub const MAX_DOCUMENT_IMAGES: usize = 3;

/// An uploaded photo attached to a report, still encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ReportImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }
}

/// Wording used when rendering an assessment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub severity_scale: SeverityScale,
    pub currency: String,
}

impl Default for Presentation {
    fn default() -> Self {
        Self { severity_scale: SeverityScale::LowHigh, currency: "€".to_string() }
    }
}

/// Immutable record of one analysis run. Both renderings are pure functions
/// of this value.
#[derive(Clone, Debug)]
pub struct Report {
    pub id: ReportId,
    pub reference_id: Option<String>,
    pub assessment: Assessment,
    pub created_at_unix: i64,
    pub attached_images: Vec<ReportImage>,
    pub presentation: Presentation,
}

impl Report {
    /// `(label, value)` pairs in their fixed rendering order.
    pub fn fields(&self) -> [(&'static str, String); 4] {
        let a = &self.assessment;
        [
            ("Vehicle Type", a.vehicle_type.clone()),
            ("Damage Areas Found", a.damage_count.to_string()),
            ("Severity", self.presentation.severity_scale.label(a.severity).to_string()),
            ("Estimated Repair Cost", format_cost(a.estimated_cost, &self.presentation.currency)),
        ]
    }

    /// Images that make it into the document, in attachment order.
    pub fn document_images(&self) -> &[ReportImage] {
        let n = self.attached_images.len().min(MAX_DOCUMENT_IMAGES);
        &self.attached_images[..n]
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReportBuilder {
    presentation: Presentation,
}

impl ReportBuilder {
    pub fn new(presentation: Presentation) -> Self {
        Self { presentation }
    }

    pub fn build(&self, assessment: Assessment, reference_id: Option<String>, images: Vec<ReportImage>) -> Report {
        self.build_at(assessment, reference_id, images, now_unix())
    }

    pub fn build_at(
        &self,
        assessment: Assessment,
        reference_id: Option<String>,
        images: Vec<ReportImage>,
        created_at_unix: i64,
    ) -> Report {
        Report {
            id: ReportId::new(),
            reference_id,
            assessment,
            created_at_unix,
            attached_images: images,
            presentation: self.presentation.clone(),
        }
    }
}
