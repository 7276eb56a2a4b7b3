use std::sync::Arc;

use anyhow::Result;
use autodamage_core::{assess, Assessment, CostProfile, DetectionSet};
use autodamage_report::{
    render_document, render_text, Download, DocumentSettings, EmbedFailure, Presentation, Report, ReportBuilder,
    ReportImage, MAX_DOCUMENT_IMAGES,
};
use autodamage_vision::{decode_and_normalize, encode_png, plot_detections, DetectionAdapter, SharedDetector};
use tracing::{info, warn};

use crate::{AnalysisError, Config, Session};

/// Everything one analysis produced.
#[derive(Debug)]
pub struct Analysis {
    pub detections: DetectionSet,
    pub assessment: Assessment,
    pub report: Report,
    pub downloads: Vec<Download>,
    pub embed_failures: Vec<EmbedFailure>,
    /// Outputs that could not be produced at all.
    pub render_errors: Vec<String>,
}

impl Analysis {
    pub fn is_complete(&self) -> bool {
        self.embed_failures.is_empty() && self.render_errors.is_empty()
    }

    pub fn problems(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .embed_failures
            .iter()
            .map(|f| format!("image {} ({}) not embedded: {}", f.index + 1, f.name, f.reason))
            .collect();
        out.extend(self.render_errors.iter().cloned());
        out
    }

    pub fn download(&self, file_name: &str) -> Option<&Download> {
        self.downloads.iter().find(|d| d.file_name == file_name)
    }
}

/// decode, normalize, detect, assess, then render every download.
pub struct Analyzer {
    adapter: DetectionAdapter,
    costs: CostProfile,
    builder: ReportBuilder,
    document: DocumentSettings,
    max_images: usize,
}

impl Analyzer {
    pub fn new(adapter: DetectionAdapter, costs: CostProfile, presentation: Presentation) -> Self {
        Self {
            adapter,
            costs,
            builder: ReportBuilder::new(presentation),
            document: DocumentSettings::default(),
            max_images: MAX_DOCUMENT_IMAGES,
        }
    }

    pub fn from_config(cfg: &Config, detector: Arc<SharedDetector>) -> Result<Self> {
        let adapter = DetectionAdapter::new(detector, cfg.adapter_settings());
        Ok(Self::new(adapter, cfg.cost_profile()?, cfg.presentation()).with_max_images(cfg.max_images()))
    }

    pub fn with_max_images(mut self, n: usize) -> Self {
        self.max_images = n;
        self
    }

    pub fn with_document_settings(mut self, settings: DocumentSettings) -> Self {
        self.document = settings;
        self
    }

    pub fn adapter(&self) -> &DetectionAdapter {
        &self.adapter
    }

    /// Analyze `upload` for `session`. The upload itself is the first report
    /// image, followed by the session's attachments.
    ///
    /// Decode or detector failures return before anything is rendered. Once
    /// the text report exists, other rendering problems come back as
    /// `PartialReportFailure` carrying what was produced.
    pub fn analyze(&self, session: &Session, upload: ReportImage) -> Result<Analysis, AnalysisError> {
        let normalized = decode_and_normalize(&upload.bytes)?;
        if normalized.was_resized() {
            let (w, h) = normalized.original_dimensions();
            info!(image = %upload.name, from_w = w, from_h = h, "upload resized");
        }

        let detections = self.adapter.detect(&normalized, session.confidence())?;
        let assessment = assess(&detections, &self.costs);

        let mut render_errors = vec![];
        let visualization = match encode_png(&plot_detections(normalized.image(), &detections)) {
            Ok(png) => Some(Download::visualization(png)),
            Err(err) => {
                warn!("visualization not rendered: {}", err);
                render_errors.push(format!("visualization not rendered: {}", err));
                None
            }
        };

        let images: Vec<ReportImage> = std::iter::once(upload)
            .chain(session.attachments().iter().cloned())
            .take(self.max_images)
            .collect();
        let report = self.builder.build(assessment.clone(), session.reference(), images);

        let mut downloads = vec![Download::text(render_text(&report))];
        let mut embed_failures = vec![];
        match render_document(&report, &self.document) {
            Ok(doc) => {
                embed_failures = doc.failures;
                downloads.push(Download::document(&report, doc.bytes));
            }
            Err(err) => {
                warn!(report = %report.id, "document not rendered: {}", err);
                render_errors.push(format!("document not rendered: {}", err));
            }
        }
        downloads.extend(visualization);

        info!(
            report = %report.id,
            vehicle = %assessment.vehicle_type,
            damage = assessment.damage_count,
            cost = assessment.estimated_cost,
            "analysis complete"
        );

        let analysis = Analysis { detections, assessment, report, downloads, embed_failures, render_errors };
        if analysis.is_complete() {
            Ok(analysis)
        } else {
            Err(AnalysisError::PartialReportFailure(Box::new(analysis)))
        }
    }
}
