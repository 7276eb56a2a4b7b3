use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use autodamage_core::{CostProfile, SeverityScale};
use autodamage_report::{Presentation, MAX_DOCUMENT_IMAGES};
use autodamage_vision::{AdapterSettings, DEFAULT_INPUT_SIZE};

use crate::util::expand_path;

pub const DEFAULT_CONFIDENCE: f32 = 0.4;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub detector: DetectorConfig,
    pub assessment: AssessmentConfig,
    pub claims: ClaimsConfig,
    pub report: ReportConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// External detector executable; see `CommandDetectorLoader`.
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub input_size: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub confidence: f32,
    #[serde(default)]
    pub warm_up: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssessmentConfig {
    pub profile: String, // "standard" | "compact"
    #[serde(default)]
    pub base_cost: Option<u64>,
    #[serde(default)]
    pub per_damage: Option<u64>,
    #[serde(default)]
    pub severity_labels: SeverityScale,
    pub currency: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimsConfig {
    pub backend: String, // "memory" | "sqlite"
    #[serde(default)]
    pub db_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_dir: String,
    #[serde(default)]
    pub max_images: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimsBackend {
    Memory,
    Sqlite,
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            detector: DetectorConfig {
                program: "autodamage-detect".to_string(),
                args: vec!["--weights".to_string(), "yolov8n.pt".to_string()],
                input_size: Some(DEFAULT_INPUT_SIZE),
                timeout_secs: Some(30),
                confidence: DEFAULT_CONFIDENCE,
                warm_up: Some(true),
            },
            assessment: AssessmentConfig {
                profile: "standard".to_string(),
                base_cost: None,
                per_damage: None,
                severity_labels: SeverityScale::LowHigh,
                currency: "€".to_string(),
            },
            claims: ClaimsConfig { backend: "sqlite".to_string(), db_path: Some(".autodamage/claims.db".to_string()) },
            report: ReportConfig { output_dir: ".autodamage/reports".to_string(), max_images: Some(MAX_DOCUMENT_IMAGES) },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse autodamage.toml")?;
        cfg.validate().with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_confidence(self.detector.confidence)?;
        self.cost_profile()?;
        self.claims_backend()?;
        if self.detector.input_size == Some(0) {
            bail!("detector.input_size must be positive");
        }
        if self.detector.timeout_secs == Some(0) {
            bail!("detector.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Named profile with any explicit overrides applied on top.
    pub fn cost_profile(&self) -> Result<CostProfile> {
        let a = &self.assessment;
        let mut profile = CostProfile::named(&a.profile)
            .ok_or_else(|| anyhow!("unknown cost profile {:?} (expected standard|compact)", a.profile))?;
        if let Some(base) = a.base_cost {
            profile.base_cost = base;
        }
        if let Some(per) = a.per_damage {
            profile.per_damage = per;
        }
        Ok(profile)
    }

    pub fn presentation(&self) -> Presentation {
        Presentation { severity_scale: self.assessment.severity_labels, currency: self.assessment.currency.clone() }
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        let defaults = AdapterSettings::default();
        AdapterSettings {
            input_size: self.detector.input_size.unwrap_or(defaults.input_size),
            timeout: self.detector.timeout_secs.map(Duration::from_secs).unwrap_or(defaults.timeout),
        }
    }

    pub fn claims_backend(&self) -> Result<ClaimsBackend> {
        match self.claims.backend.as_str() {
            "memory" => Ok(ClaimsBackend::Memory),
            "sqlite" => Ok(ClaimsBackend::Sqlite),
            other => Err(anyhow!("unknown claims backend {:?} (expected memory|sqlite)", other)),
        }
    }

    pub fn max_images(&self) -> usize {
        self.report.max_images.unwrap_or(MAX_DOCUMENT_IMAGES)
    }

    pub fn output_dir(&self, repo_root: &Path) -> PathBuf {
        expand_path(repo_root, &self.report.output_dir)
    }

    pub fn claims_db_path(&self, repo_root: &Path) -> PathBuf {
        match &self.claims.db_path {
            Some(p) => expand_path(repo_root, p),
            None => Self::db_path(repo_root),
        }
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".autodamage").join("autodamage.toml")
    }

    pub fn db_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".autodamage").join("claims.db")
    }
}

/// Thresholds must lie strictly inside (0, 1).
pub fn check_confidence(t: f32) -> Result<()> {
    if t > 0.0 && t < 1.0 {
        Ok(())
    } else {
        Err(anyhow!("confidence threshold must be inside (0, 1), got {}", t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        Config::default_for_repo().save_to(&path).unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.detector.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(cfg.cost_profile().unwrap(), CostProfile::STANDARD);
        assert_eq!(cfg.claims_backend().unwrap(), ClaimsBackend::Sqlite);
        assert_eq!(cfg.adapter_settings().timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_images(), 3);
    }

    #[test]
    fn overrides_apply_on_named_profile() {
        let mut cfg = Config::default_for_repo();
        cfg.assessment.profile = "compact".into();
        cfg.assessment.per_damage = Some(300);
        assert_eq!(cfg.cost_profile().unwrap(), CostProfile { base_cost: 500, per_damage: 300 });
        cfg.assessment.profile = "luxury".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn confidence_bounds_are_exclusive() {
        assert!(check_confidence(0.4).is_ok());
        assert!(check_confidence(0.0).is_err());
        assert!(check_confidence(1.0).is_err());
        assert!(check_confidence(f32::NAN).is_err());
    }

    #[test]
    fn rejects_bad_values_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autodamage.toml");
        let mut cfg = Config::default_for_repo();
        cfg.detector.confidence = 1.5;
        cfg.save_to(&path).unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autodamage.toml");
        std::fs::write(
            &path,
            r#"
[detector]
program = "detect"
confidence = 0.25

[assessment]
profile = "standard"
currency = "$"
severity_labels = "minor-major"

[claims]
backend = "memory"

[report]
output_dir = "out"
"#,
        )
        .unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert!(cfg.detector.args.is_empty());
        assert_eq!(cfg.adapter_settings().input_size, 640);
        assert_eq!(cfg.presentation().severity_scale, SeverityScale::MinorMajor);
        assert_eq!(cfg.claims_backend().unwrap(), ClaimsBackend::Memory);
        assert_eq!(cfg.output_dir(dir.path()), dir.path().join("out"));
    }
}
