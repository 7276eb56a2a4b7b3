use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use autodamage_claims::{ClaimProtocol, ClaimSession, InMemoryOccupancyStore, OccupancyStore};
use autodamage_claims_sqlite::SqliteOccupancyStore;
use autodamage_core::SessionId;
use autodamage_report::{DownloadStore, FsDownloadStore, ReportManifest};
use autodamage_vision::{CommandDetectorLoader, DetectorLoader, SharedDetector};
use tracing::info;

use crate::{Analysis, Analyzer, ClaimsBackend, Config, Session};

pub struct Runner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub claims: ClaimProtocol,
    pub analyzer: Analyzer,
    pub downloads: FsDownloadStore,
}

impl Runner {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg = load_or_create_config(&repo_root)?;
        let loader = CommandDetectorLoader::new(cfg.detector.program.clone(), cfg.detector.args.clone());
        Self::with_loader(repo_root, cfg, Box::new(loader))
    }

    /// Same as `open` but with a caller-supplied detector.
    pub fn with_loader(repo_root: PathBuf, cfg: Config, loader: Box<dyn DetectorLoader>) -> Result<Self> {
        cfg.validate()?;
        let mut detector = SharedDetector::new(loader);
        if cfg.detector.warm_up.unwrap_or(true) {
            detector = detector.with_warm_up(cfg.adapter_settings().input_size);
        }
        let analyzer = Analyzer::from_config(&cfg, Arc::new(detector))?;
        let claims = ClaimProtocol::new(open_store(&cfg, &repo_root)?);
        let downloads = FsDownloadStore::new(cfg.output_dir(&repo_root));

        Ok(Self { repo_root, cfg, claims, analyzer, downloads })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg = load_or_create_config(repo_root)?;
        std::fs::create_dir_all(cfg.output_dir(repo_root)).ok();
        if cfg.claims_backend()? == ClaimsBackend::Sqlite {
            let _ = SqliteOccupancyStore::open(&cfg.claims_db_path(repo_root))?;
        }
        Ok(())
    }

    /// A session with the configured threshold and whatever claim reference
    /// `id` already holds. A fresh id is minted when none is given.
    pub fn session(&self, id: Option<&str>) -> Result<Session> {
        let id = id.map(SessionId::from_str).unwrap_or_default();
        let claim: ClaimSession = self.claims.restore(id)?;
        let mut session = Session::new(claim);
        session.set_confidence(self.cfg.detector.confidence)?;
        Ok(session)
    }

    /// Write every download plus a manifest under the report's directory.
    pub fn save(&self, analysis: &Analysis) -> Result<PathBuf> {
        let dir = self.downloads.create_report_dir(&analysis.report.id)?;
        for d in &analysis.downloads {
            self.downloads.write_download(&dir, d)?;
        }
        let manifest = ReportManifest::new(&analysis.report, &analysis.downloads, &analysis.embed_failures);
        self.downloads.write_manifest(&dir, &manifest)?;
        info!(report = %analysis.report.id, dir = %dir.display(), "downloads written");
        Ok(dir)
    }
}

fn load_or_create_config(repo_root: &Path) -> Result<Config> {
    let cfg_path = Config::config_path(repo_root);
    if cfg_path.exists() {
        Config::load_from(&cfg_path)
    } else {
        let cfg = Config::default_for_repo();
        cfg.save_to(&cfg_path)?;
        Ok(cfg)
    }
}

pub fn open_store(cfg: &Config, repo_root: &Path) -> Result<Arc<dyn OccupancyStore>> {
    Ok(match cfg.claims_backend()? {
        ClaimsBackend::Memory => Arc::new(InMemoryOccupancyStore::new()),
        ClaimsBackend::Sqlite => {
            let path = cfg.claims_db_path(repo_root);
            Arc::new(SqliteOccupancyStore::open(&path).with_context(|| format!("claims store {}", path.display()))?)
        }
    })
}
