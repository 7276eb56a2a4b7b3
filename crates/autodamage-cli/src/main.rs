use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use autodamage_claims::{validate, ClaimState, MAX_PARTIES};
use autodamage_report::ReportImage;
use autodamage_runner::{AnalysisError, Runner};

#[derive(Parser)]
#[command(name = "autodamage", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .autodamage/ with a default config and claims store
    Init,

    /// Assess one photo and write the report downloads
    Analyze {
        /// Photo to run detection on; also the first report image
        #[arg(long)]
        image: PathBuf,
        /// More photos for the report (only the first few are embedded)
        #[arg(long = "extra")]
        extra: Vec<PathBuf>,
        /// Detection confidence threshold in (0, 1); defaults to the config value
        #[arg(long)]
        confidence: Option<f32>,
        /// Session whose claim reference goes on the report
        #[arg(long)]
        session: Option<String>,
        /// Print the assessment as JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Claim reference handling
    Claim {
        #[command(subcommand)]
        cmd: ClaimCommand,
    },
}

#[derive(Subcommand)]
enum ClaimCommand {
    /// Generate a new reference and lock the session to it
    Generate {
        #[arg(long)]
        session: String,
    },
    /// Check a reference's format without locking anything
    Validate { code: String },
    /// Lock the session to a reference shared by the other party
    Lock {
        #[arg(long)]
        session: String,
        code: String,
    },
    /// Release the session's reference
    Unlock {
        #[arg(long)]
        session: String,
    },
    Status {
        #[arg(long)]
        session: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized autodamage in {}", repo_root.display());
        }
        Command::Analyze { image, extra, confidence, session, json } => {
            let r = Runner::open(repo_root)?;
            let mut s = r.session(session.as_deref())?;
            if let Some(t) = confidence {
                s.set_confidence(t)?;
            }
            for path in &extra {
                s.attach(read_image(path)?);
            }

            let analysis = match r.analyzer.analyze(&s, read_image(&image)?) {
                Ok(a) => a,
                Err(AnalysisError::PartialReportFailure(a)) => {
                    for problem in a.problems() {
                        warn!("{}", problem);
                        eprintln!("warning: {}", problem);
                    }
                    *a
                }
                Err(err) => return Err(err.into()),
            };
            let dir = r.save(&analysis)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis.assessment)?);
            } else if let Some(text) = analysis.download(autodamage_report::TEXT_FILE_NAME) {
                print!("{}", String::from_utf8_lossy(&text.bytes));
            }
            for d in &analysis.downloads {
                println!("wrote {} ({})", dir.join(&d.file_name).display(), d.mime);
            }
        }
        Command::Claim { cmd } => claim(repo_root, cmd)?,
    }

    Ok(())
}

fn claim(repo_root: PathBuf, cmd: ClaimCommand) -> anyhow::Result<()> {
    // validation needs no config or store
    let open = || Runner::open(repo_root.clone());
    match cmd {
        ClaimCommand::Validate { code } => {
            let code = validate(&code)?;
            println!("{} is a valid reference", code);
        }
        ClaimCommand::Generate { session } => {
            let r = open()?;
            let mut s = r.session(Some(&session))?;
            let code = r.claims.generate_and_lock(&mut s.claim)?;
            println!("{}", code);
        }
        ClaimCommand::Lock { session, code } => {
            let r = open()?;
            let mut s = r.session(Some(&session))?;
            let code = r.claims.lock_str(&mut s.claim, &code)?;
            println!("Locked {} to {}", session, code);
        }
        ClaimCommand::Unlock { session } => {
            let r = open()?;
            let mut s = r.session(Some(&session))?;
            match r.claims.unlock(&mut s.claim)? {
                Some(code) => println!("Released {} from {}", session, code),
                None => println!("{} holds no reference", session),
            }
        }
        ClaimCommand::Status { session } => {
            let r = open()?;
            let s = r.session(Some(&session))?;
            let status = r.claims.status(&s.claim)?;
            match (status.state, &status.code) {
                (ClaimState::Locked, Some(code)) => {
                    println!("{}: locked to {} ({} of {} parties)", session, code, status.parties, MAX_PARTIES)
                }
                _ => println!("{}: unset", session),
            }
        }
    }
    Ok(())
}

fn read_image(path: &Path) -> anyhow::Result<ReportImage> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string());
    Ok(ReportImage::new(name, bytes))
}
