use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autodamage_core::ReportId;

use crate::{Download, ReportManifest};

pub const MANIFEST_FILE_NAME: &str = "report_manifest.json";

/// Where finished downloads end up.
pub trait DownloadStore: Send + Sync {
    fn create_report_dir(&self, report_id: &ReportId) -> Result<PathBuf>;
    fn write_manifest(&self, report_dir: &Path, manifest: &ReportManifest) -> Result<()>;
    fn write_download(&self, report_dir: &Path, download: &Download) -> Result<PathBuf>;
}

#[derive(Clone)]
pub struct FsDownloadStore {
    pub root: PathBuf,
}

impl FsDownloadStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl DownloadStore for FsDownloadStore {
    fn create_report_dir(&self, report_id: &ReportId) -> Result<PathBuf> {
        let dir = self.root.join(report_id.as_str());
        std::fs::create_dir_all(&dir).with_context(|| format!("create report dir {}", dir.display()))?;
        Ok(dir)
    }

    fn write_manifest(&self, report_dir: &Path, manifest: &ReportManifest) -> Result<()> {
        let path = report_dir.join(MANIFEST_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(manifest)?;
        std::fs::write(&path, bytes).with_context(|| format!("write manifest {}", path.display()))?;
        Ok(())
    }

    fn write_download(&self, report_dir: &Path, download: &Download) -> Result<PathBuf> {
        let path = report_dir.join(&download.file_name);
        std::fs::write(&path, &download.bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
