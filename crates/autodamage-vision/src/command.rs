use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::{DetectRequest, Detector, DetectorLoader, RawDetection};

/// Loader for a detector that lives in an external process.
///
/// Every inference runs `program [args..] --image <png> --conf <t> --classes <ids> --imgsz <n>`
/// and expects a JSON array of `RawDetection` on stdout. Weight paths and
/// loader compatibility switches belong in `args`.
#[derive(Clone, Debug)]
pub struct CommandDetectorLoader {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandDetectorLoader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

impl DetectorLoader for CommandDetectorLoader {
    fn name(&self) -> &str {
        &self.program
    }

    fn load(&self) -> Result<Box<dyn Detector>> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("no detector program configured"));
        }
        // bare names are resolved through PATH at spawn time; the warm-up
        // inference is what proves those work
        let path = Path::new(&self.program);
        if path.components().count() > 1 && !path.exists() {
            return Err(anyhow!("detector program not found: {}", path.display()));
        }
        Ok(Box::new(CommandDetector { program: self.program.clone(), args: self.args.clone() }))
    }
}

pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl Detector for CommandDetector {
    fn detect(&self, image: &RgbImage, request: &DetectRequest) -> Result<Vec<RawDetection>> {
        // removed when `frame` drops, including on every early return below
        let frame = tempfile::Builder::new()
            .prefix("autodamage-frame-")
            .suffix(".png")
            .tempfile()
            .context("create detector frame file")?;
        image
            .save_with_format(frame.path(), ImageFormat::Png)
            .with_context(|| format!("write detector frame {}", frame.path().display()))?;

        let classes = request.classes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--image")
            .arg(frame.path())
            .arg("--conf")
            .arg(request.confidence.to_string())
            .arg("--classes")
            .arg(&classes)
            .arg("--imgsz")
            .arg(request.input_size.to_string());
        debug!(program = %self.program, classes = %classes, "running external detector");

        let out = cmd.output().with_context(|| format!("run {}", self.program))?;
        if !out.status.success() {
            return Err(anyhow!(
                "detector {} failed ({})\nstderr:{}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        parse_detections(&out.stdout)
    }

    // each call is its own process
    fn concurrent_inference(&self) -> bool {
        true
    }
}

pub fn parse_detections(stdout: &[u8]) -> Result<Vec<RawDetection>> {
    let text = std::str::from_utf8(stdout).context("detector output is not utf-8")?.trim();
    if text.is_empty() {
        return Ok(vec![]);
    }
    serde_json::from_str(text).context("parse detector output")
}
