use autodamage_claims::ClaimSession;
use autodamage_core::SessionId;
use autodamage_report::ReportImage;

use crate::{AnalysisError, DEFAULT_CONFIDENCE};

/// Everything one user carries between operations: the claim reference, the
/// chosen threshold and photos attached for the report.
#[derive(Clone, Debug)]
pub struct Session {
    pub claim: ClaimSession,
    confidence: f32,
    attachments: Vec<ReportImage>,
}

impl Session {
    pub fn new(claim: ClaimSession) -> Self {
        Self { claim, confidence: DEFAULT_CONFIDENCE, attachments: vec![] }
    }

    pub fn id(&self) -> &SessionId {
        &self.claim.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_confidence(&mut self, t: f32) -> Result<(), AnalysisError> {
        if !(t > 0.0 && t < 1.0) {
            return Err(AnalysisError::InvalidConfidence(t));
        }
        self.confidence = t;
        Ok(())
    }

    /// Extra photos for the report, after the analyzed one.
    pub fn attach(&mut self, image: ReportImage) {
        self.attachments.push(image);
    }

    pub fn attachments(&self) -> &[ReportImage] {
        &self.attachments
    }

    pub fn reference(&self) -> Option<String> {
        self.claim.code().map(|c| c.to_string())
    }
}
